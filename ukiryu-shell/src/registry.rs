use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::adapter::{PlatformGroup, ShellAdapter, ShellKind};
use crate::cmd::CmdShell;
use crate::error::ExecError;
use crate::posix::{BashShell, DashShell, FishShell, ShShell, TcshShell, ZshShell};
use crate::powershell::PowerShell;

/// Shell adapters keyed by [`ShellKind`].
///
/// Built-in adapters are constructed once; [`ShellRegistry::register`]
/// replaces the adapter for a kind (for example a selective-quoting bash).
#[derive(Debug)]
pub struct ShellRegistry {
    adapters: RwLock<HashMap<ShellKind, Arc<dyn ShellAdapter>>>,
}

impl Default for ShellRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellRegistry {
    pub fn new() -> Self {
        let builtins: [Arc<dyn ShellAdapter>; 8] = [
            Arc::new(BashShell::new()),
            Arc::new(ZshShell::new()),
            Arc::new(FishShell::new()),
            Arc::new(ShShell::new()),
            Arc::new(DashShell::new()),
            Arc::new(TcshShell::new()),
            Arc::new(PowerShell::new()),
            Arc::new(CmdShell::new()),
        ];
        let adapters = builtins
            .into_iter()
            .map(|adapter| (adapter.kind(), adapter))
            .collect();
        Self {
            adapters: RwLock::new(adapters),
        }
    }

    pub fn get(&self, kind: ShellKind) -> Option<Arc<dyn ShellAdapter>> {
        self.adapters.read().get(&kind).cloned()
    }

    /// Resolve a shell by name or binary path.
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn ShellAdapter>, ExecError> {
        let kind: ShellKind = name.parse()?;
        self.get(kind)
            .ok_or_else(|| ExecError::UnknownShell { name: name.to_string() })
    }

    /// Install `adapter`, returning the one it replaced.
    pub fn register(&self, adapter: Arc<dyn ShellAdapter>) -> Option<Arc<dyn ShellAdapter>> {
        let kind = adapter.kind();
        tracing::debug!(shell = %kind, "registering shell adapter");
        self.adapters.write().insert(kind, adapter)
    }

    pub fn kinds(&self) -> Vec<ShellKind> {
        let mut kinds: Vec<_> = self.adapters.read().keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Adapter for the shell the current process runs under.
    pub fn detect_current(&self) -> Arc<dyn ShellAdapter> {
        let kind = detect_from_env(cfg!(windows), |name| std::env::var(name).ok());
        tracing::debug!(shell = %kind, "detected current shell");
        self.get(kind)
            .unwrap_or_else(|| Arc::new(ShShell::new()) as Arc<dyn ShellAdapter>)
    }
}

/// Pick a shell from environment variables.
///
/// Windows: `PSModulePath` marks a PowerShell session, otherwise `ComSpec`
/// (normally cmd.exe). Unix: the basename of `SHELL`, falling back to bash
/// when it names nothing known.
pub fn detect_from_env(is_windows: bool, lookup: impl Fn(&str) -> Option<String>) -> ShellKind {
    if is_windows {
        if lookup("PSModulePath").is_some_and(|value| !value.is_empty()) {
            return ShellKind::PowerShell;
        }
        return lookup("ComSpec")
            .and_then(|comspec| ShellKind::from_name(&comspec))
            .unwrap_or(ShellKind::Cmd);
    }

    lookup("SHELL")
        .and_then(|shell| ShellKind::from_name(&shell))
        .filter(|kind| kind.group() == PlatformGroup::Unix || *kind == ShellKind::PowerShell)
        .unwrap_or(ShellKind::Bash)
}
