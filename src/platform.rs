use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ukiryu_shell::ShellKind;

use crate::error::Error;

/// Operating system a command definition can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[serde(alias = "darwin")]
    Macos,
    Linux,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::Macos
        } else {
            Self::Linux
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Macos => "macos",
            Self::Linux => "linux",
            Self::Windows => "windows",
        }
    }

    pub fn is_windows(self) -> bool {
        self == Self::Windows
    }

    /// Shell used when neither the caller nor configuration picks one.
    pub fn default_shell(self) -> ShellKind {
        match self {
            Self::Windows => ShellKind::Cmd,
            Self::Macos => ShellKind::Zsh,
            Self::Linux => ShellKind::Bash,
        }
    }

    /// True when `platforms` is empty (no restriction) or lists `self`.
    pub fn matches(self, platforms: &[Platform]) -> bool {
        platforms.is_empty() || platforms.contains(&self)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "macos" | "darwin" | "osx" => Ok(Self::Macos),
            "linux" => Ok(Self::Linux),
            "windows" | "win32" => Ok(Self::Windows),
            other => Err(Error::Config(format!(
                "unknown platform '{other}' (expected macos, linux or windows)"
            ))),
        }
    }
}
