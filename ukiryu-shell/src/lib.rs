//! Shell adapters for Ukiryu tool wrappers. Each supported shell dialect
//! (bash, zsh, fish, sh, dash, tcsh, PowerShell and cmd.exe) implements the
//! [`ShellAdapter`] trait so callers can escape, quote and join command
//! lines for that shell, then run them through the shared
//! [`ProcessRunner`] with timeout and stdin handling.

pub mod adapter;
pub mod alias;
pub mod cmd;
pub mod error;
pub mod posix;
pub mod powershell;
pub mod process;
#[cfg(unix)]
mod process_group;
pub mod registry;

pub use adapter::{ExecRequest, PlatformGroup, ProcessOutput, ShellAdapter, ShellKind, SpawnPlan};
pub use cmd::CmdShell;
pub use error::ExecError;
pub use posix::{BashShell, DashShell, FishShell, PosixQuoting, QuoteMode, ShShell, TcshShell, ZshShell};
pub use powershell::PowerShell;
pub use process::{ProcessRunner, normalize_exit_status};
pub use registry::ShellRegistry;
