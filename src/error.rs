use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use ukiryu_shell::ExecError;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by argument building, discovery and execution.
#[derive(Debug, Error)]
pub enum Error {
    /// A parameter value violates its declared constraint. Raised before
    /// any process is spawned.
    #[error("invalid value for parameter '{parameter}': {reason}")]
    Validation { parameter: String, reason: String },

    #[error("executable for '{tool}' not found (searched: {})", display_paths(.searched))]
    ExecutableNotFound { tool: String, searched: Vec<PathBuf> },

    #[error("`{executable}` timed out after {timeout:?} (args: {args:?})")]
    Timeout {
        executable: String,
        args: Vec<String>,
        timeout: Duration,
    },

    #[error("failed to run `{executable}` (args: {args:?}): {source}")]
    Execution {
        executable: String,
        args: Vec<String>,
        #[source]
        source: ExecError,
    },

    #[error("unknown shell '{name}'")]
    UnknownShell { name: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid definition for command '{command}': {reason}")]
    Definition { command: String, reason: String },
}

impl Error {
    pub fn validation(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    pub fn definition(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Definition {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Attach the argument list to an error raised by the shell layer.
    pub fn from_exec(err: ExecError, args: &[String]) -> Self {
        match err {
            ExecError::Timeout {
                executable,
                timeout,
            } => Self::Timeout {
                executable,
                args: args.to_vec(),
                timeout,
            },
            ExecError::UnknownShell { name } => Self::UnknownShell { name },
            other => Self::Execution {
                executable: other.executable().unwrap_or_default().to_string(),
                args: args.to_vec(),
                source: other,
            },
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Config(format!("{err:#}"))
    }
}

impl From<ExecError> for Error {
    fn from(err: ExecError) -> Self {
        Self::from_exec(err, &[])
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "PATH".to_string();
    }
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_keeps_executable_args_and_limit() {
        let err = Error::from_exec(
            ExecError::Timeout {
                executable: "gs".into(),
                timeout: Duration::from_secs(2),
            },
            &["-q".to_string()],
        );
        assert!(err.is_timeout());
        let message = err.to_string();
        assert!(message.contains("gs"));
        assert!(message.contains("2s"));
        assert!(message.contains("-q"));
    }

    #[test]
    fn spawn_failures_become_execution_errors() {
        let err = Error::from_exec(
            ExecError::Spawn {
                executable: "magick".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
            },
            &[],
        );
        assert!(matches!(err, Error::Execution { ref executable, .. } if executable == "magick"));
    }

    #[test]
    fn not_found_lists_searched_directories() {
        let err = Error::ExecutableNotFound {
            tool: "inkscape".into(),
            searched: vec![PathBuf::from("/usr/bin"), PathBuf::from("/opt/bin")],
        };
        assert_eq!(
            err.to_string(),
            "executable for 'inkscape' not found (searched: /usr/bin, /opt/bin)"
        );
    }
}
