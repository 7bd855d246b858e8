use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::process::ProcessRunner;

/// Shell dialect a command line is formatted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase", try_from = "String")
)]
pub enum ShellKind {
    Bash,
    Zsh,
    Fish,
    Sh,
    Dash,
    Tcsh,
    PowerShell,
    Cmd,
}

impl ShellKind {
    pub const ALL: [ShellKind; 8] = [
        ShellKind::Bash,
        ShellKind::Zsh,
        ShellKind::Fish,
        ShellKind::Sh,
        ShellKind::Dash,
        ShellKind::Tcsh,
        ShellKind::PowerShell,
        ShellKind::Cmd,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Zsh => "zsh",
            Self::Fish => "fish",
            Self::Sh => "sh",
            Self::Dash => "dash",
            Self::Tcsh => "tcsh",
            Self::PowerShell => "powershell",
            Self::Cmd => "cmd",
        }
    }

    pub fn group(self) -> PlatformGroup {
        match self {
            Self::PowerShell => PlatformGroup::PowerShell,
            Self::Cmd => PlatformGroup::Windows,
            _ => PlatformGroup::Unix,
        }
    }

    /// Parse a shell name or a path to a shell binary (`/bin/zsh`,
    /// `C:\Windows\System32\cmd.exe`, `pwsh`).
    pub fn from_name(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        let base = trimmed
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(trimmed)
            .to_ascii_lowercase();
        let base = base.strip_suffix(".exe").unwrap_or(&base);
        match base {
            "bash" => Some(Self::Bash),
            "zsh" => Some(Self::Zsh),
            "fish" => Some(Self::Fish),
            "sh" => Some(Self::Sh),
            "dash" => Some(Self::Dash),
            "tcsh" | "csh" => Some(Self::Tcsh),
            "powershell" | "pwsh" => Some(Self::PowerShell),
            "cmd" => Some(Self::Cmd),
            _ => None,
        }
    }
}

impl fmt::Display for ShellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShellKind {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| ExecError::UnknownShell { name: s.to_string() })
    }
}

/// Deserialization accepts every name [`ShellKind::from_name`] does.
impl TryFrom<String> for ShellKind {
    type Error = ExecError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

/// Coarse family an adapter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum PlatformGroup {
    Unix,
    Windows,
    PowerShell,
}

/// Concrete program and argv used to launch a command for a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnPlan {
    pub program: String,
    pub args: Vec<String>,
    /// Pass `args` verbatim on Windows instead of applying MSVC argv quoting.
    pub raw_args: bool,
}

impl SpawnPlan {
    /// Run `program` directly with `args`, no intermediate shell.
    pub fn direct(program: impl Into<String>, args: &[String]) -> Self {
        Self {
            program: program.into(),
            args: args.to_vec(),
            raw_args: false,
        }
    }
}

/// Describes one process execution.
#[derive(Debug, Clone, Default)]
pub struct ExecRequest {
    pub executable: String,
    pub args: Vec<String>,
    /// Variables layered on top of the inherited environment.
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub stdin: Option<Vec<u8>>,
}

impl ExecRequest {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            ..Self::default()
        }
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code normalised across platforms (see [`crate::normalize_exit_status`]).
    pub status: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Escaping, quoting and execution rules for one shell dialect.
///
/// Adapters carry no mutable state and are shared as
/// `Arc<dyn ShellAdapter>` across threads.
#[async_trait]
pub trait ShellAdapter: Send + Sync + fmt::Debug {
    fn kind(&self) -> ShellKind;

    fn group(&self) -> PlatformGroup {
        self.kind().group()
    }

    /// Escape `raw` for embedding inside this shell's quoting context.
    fn escape(&self, raw: &str) -> String;

    /// Produce a single shell word that evaluates to `raw`.
    fn quote(&self, raw: &str) -> String;

    fn needs_quoting(&self, raw: &str) -> bool;

    /// Reference to an environment variable, e.g. `$HOME` or `%PATH%`.
    fn env_var(&self, name: &str) -> String;

    /// Render `executable` and `args` as a single command line.
    fn join(&self, executable: &str, args: &[String]) -> String;

    /// Convert a file path to the form the shell expects.
    fn format_path(&self, path: &str) -> String {
        path.to_string()
    }

    /// Variables that keep dual CLI/GUI tools from opening windows.
    fn headless_environment(&self) -> HashMap<String, String>;

    /// How `executable args...` is actually launched under this shell.
    fn spawn_plan(&self, executable: &str, args: &[String]) -> SpawnPlan;

    /// Exit status the shell itself uses for "command not found" when it
    /// wraps the executable. `execute` turns it into [`ExecError::Spawn`].
    fn command_not_found_status(&self) -> Option<i32> {
        None
    }

    /// Command that prints the definition of alias `name`, if the shell has aliases.
    fn alias_probe(&self, _name: &str) -> Option<SpawnPlan> {
        None
    }

    /// Extract the alias target from the output of [`ShellAdapter::alias_probe`].
    fn parse_alias(&self, _name: &str, _output: &str) -> Option<String> {
        None
    }

    async fn execute(&self, request: ExecRequest) -> Result<ProcessOutput, ExecError> {
        let plan = self.spawn_plan(&request.executable, &request.args);
        tracing::debug!(
            shell = %self.kind(),
            program = %plan.program,
            args = ?plan.args,
            "executing command"
        );
        let output = ProcessRunner::run(&plan, &request).await?;
        if self.command_not_found_status() == Some(output.status) {
            let message = output.stderr_lossy();
            tracing::debug!(
                shell = %self.kind(),
                executable = %request.executable,
                "shell could not find the executable"
            );
            return Err(ExecError::Spawn {
                executable: request.executable,
                source: io::Error::new(io::ErrorKind::NotFound, message.trim().to_string()),
            });
        }
        Ok(output)
    }

    async fn execute_with_stdin(
        &self,
        request: ExecRequest,
        stdin: Vec<u8>,
    ) -> Result<ProcessOutput, ExecError> {
        self.execute(request.stdin(stdin)).await
    }
}
