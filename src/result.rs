use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use ukiryu_shell::ShellKind;

/// Outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    /// Resolved executable path.
    pub executable: String,
    pub args: Vec<String>,
    /// The full command line as the selected shell would read it.
    pub command_line: String,
    pub shell: ShellKind,
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    pub fn stdout_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines()
    }
}
