use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while resolving a shell or running a process through it.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The process outlived its deadline and was killed.
    #[error("`{executable}` timed out after {timeout:?}")]
    Timeout {
        executable: String,
        timeout: Duration,
    },

    /// The operating system refused to start the process.
    #[error("failed to spawn `{executable}`: {source}")]
    Spawn {
        executable: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while running `{executable}`: {source}")]
    Io {
        executable: String,
        #[source]
        source: io::Error,
    },

    #[error("unknown shell `{name}` (supported: bash, zsh, fish, sh, dash, tcsh, powershell, cmd)")]
    UnknownShell { name: String },
}

impl ExecError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Name of the executable the error refers to, when there is one.
    pub fn executable(&self) -> Option<&str> {
        match self {
            Self::Timeout { executable, .. }
            | Self::Spawn { executable, .. }
            | Self::Io { executable, .. } => Some(executable),
            Self::UnknownShell { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_executable_and_duration() {
        let err = ExecError::Timeout {
            executable: "magick".into(),
            timeout: Duration::from_secs(3),
        };
        let message = err.to_string();
        assert!(message.contains("magick"));
        assert!(message.contains("3s"));
        assert!(err.is_timeout());
        assert_eq!(err.executable(), Some("magick"));
    }

    #[test]
    fn unknown_shell_lists_supported_shells() {
        let err = ExecError::UnknownShell {
            name: "nushell".into(),
        };
        assert!(err.to_string().contains("nushell"));
        assert!(err.to_string().contains("powershell"));
        assert_eq!(err.executable(), None);
    }
}
