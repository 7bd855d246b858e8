//! Resolves a tool name to an executable path.
//!
//! Candidates are the tool name followed by its declared aliases. Each
//! candidate is tried as a shell alias first, then looked up on the search
//! path. Outcomes, negative ones included, are cached.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use ukiryu_shell::alias::alias_command;
use ukiryu_shell::{ShellAdapter, ShellKind};

use crate::cache::TtlLruCache;
use crate::platform::Platform;
use crate::probe::ProbeRunner;

const ALIAS_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// How an executable was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoverySource {
    Path,
    Alias,
    /// Supplied by the caller.
    Explicit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutableInfo {
    pub path: PathBuf,
    pub source: DiscoverySource,
    pub shell: ShellKind,
    /// Alias target text when `source` is [`DiscoverySource::Alias`].
    pub alias_definition: Option<String>,
}

impl ExecutableInfo {
    pub fn explicit(path: impl Into<PathBuf>, shell: ShellKind) -> Self {
        Self {
            path: path.into(),
            source: DiscoverySource::Explicit,
            shell,
            alias_definition: None,
        }
    }

    /// One-line explanation of where the executable came from.
    pub fn describe(&self) -> String {
        match (self.source, &self.alias_definition) {
            (DiscoverySource::Alias, Some(definition)) => format!(
                "{} (via {} alias '{definition}')",
                self.path.display(),
                self.shell
            ),
            (DiscoverySource::Explicit, _) => format!("{} (explicit)", self.path.display()),
            _ => format!("{} (found on PATH)", self.path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LocatorKey {
    tool: String,
    platform: Platform,
    shell: ShellKind,
    version: Option<String>,
}

#[derive(Debug)]
pub struct ExecutableLocator {
    cache: TtlLruCache<LocatorKey, Option<ExecutableInfo>>,
    runner: Arc<dyn ProbeRunner>,
    search_paths: Vec<PathBuf>,
    detect_aliases: bool,
    path_env: Option<OsString>,
}

impl ExecutableLocator {
    pub fn new(runner: Arc<dyn ProbeRunner>, capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: TtlLruCache::new(capacity, ttl),
            runner,
            search_paths: Vec::new(),
            detect_aliases: true,
            path_env: std::env::var_os("PATH"),
        }
    }

    /// Extra directories searched after `PATH`.
    pub fn with_search_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.search_paths = paths.into_iter().collect();
        self
    }

    pub fn with_alias_detection(mut self, enabled: bool) -> Self {
        self.detect_aliases = enabled;
        self
    }

    /// Replace the `PATH` value used for lookups.
    pub fn with_path_env(mut self, path: Option<OsString>) -> Self {
        self.path_env = path;
        self
    }

    /// Directories searched for `platform`, in order.
    pub fn search_dirs(&self, platform: Platform) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .path_env
            .as_ref()
            .map(|path| std::env::split_paths(path).collect())
            .unwrap_or_default();
        dirs.extend(self.search_paths.iter().cloned());
        dirs.extend(platform_default_dirs(platform));

        let mut seen = std::collections::HashSet::new();
        dirs.retain(|dir| !dir.as_os_str().is_empty() && seen.insert(dir.clone()));
        dirs
    }

    pub async fn find(
        &self,
        tool: &str,
        aliases: &[String],
        platform: Platform,
        shell: &dyn ShellAdapter,
    ) -> Option<PathBuf> {
        self.find_with_info(tool, aliases, platform, shell, None)
            .await
            .map(|info| info.path)
    }

    /// Resolve `tool`, returning `None` when no candidate is found.
    pub async fn find_with_info(
        &self,
        tool: &str,
        aliases: &[String],
        platform: Platform,
        shell: &dyn ShellAdapter,
        version: Option<&str>,
    ) -> Option<ExecutableInfo> {
        let key = LocatorKey {
            tool: tool.to_string(),
            platform,
            shell: shell.kind(),
            version: version.map(str::to_string),
        };
        if let Some(cached) = self.cache.get(&key) {
            tracing::trace!(tool, "executable lookup served from cache");
            return cached;
        }

        let dirs = self.search_dirs(platform);
        let mut found = None;
        for candidate in candidates(tool, aliases) {
            if self.detect_aliases
                && let Some(info) = self.resolve_alias(candidate, shell, &dirs).await
            {
                found = Some(info);
                break;
            }
            if let Some(path) = lookup(candidate, &dirs) {
                found = Some(ExecutableInfo {
                    path,
                    source: DiscoverySource::Path,
                    shell: shell.kind(),
                    alias_definition: None,
                });
                break;
            }
        }

        match &found {
            Some(info) => tracing::debug!(tool, resolved = %info.describe(), "executable resolved"),
            None => tracing::debug!(tool, searched = dirs.len(), "executable not found"),
        }
        self.cache.insert(key, found.clone());
        found
    }

    async fn resolve_alias(
        &self,
        name: &str,
        shell: &dyn ShellAdapter,
        dirs: &[PathBuf],
    ) -> Option<ExecutableInfo> {
        let plan = shell.alias_probe(name)?;
        let output = match self.runner.probe(&plan, ALIAS_PROBE_TIMEOUT).await {
            Ok(output) if output.success() => output,
            Ok(_) => return None,
            Err(err) => {
                tracing::debug!(alias = name, error = %err, "alias probe failed");
                return None;
            }
        };

        let definition = shell.parse_alias(name, &output.stdout_lossy())?;
        let command = alias_command(&definition)?;
        let path = lookup(command, dirs)?;
        Some(ExecutableInfo {
            path,
            source: DiscoverySource::Alias,
            shell: shell.kind(),
            alias_definition: Some(definition),
        })
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }
}

fn candidates<'a>(tool: &'a str, aliases: &'a [String]) -> Vec<&'a str> {
    let mut names = vec![tool];
    for alias in aliases {
        if !names.contains(&alias.as_str()) {
            names.push(alias);
        }
    }
    names
}

fn platform_default_dirs(platform: Platform) -> Vec<PathBuf> {
    let dirs: &[&str] = match platform {
        Platform::Macos => &["/opt/homebrew/bin", "/usr/local/bin"],
        Platform::Linux => &["/usr/local/bin", "/snap/bin"],
        Platform::Windows => &[],
    };
    dirs.iter().map(PathBuf::from).collect()
}

/// Absolute or relative paths are checked directly; bare names are searched
/// in `dirs`.
fn lookup(name: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    let as_path = Path::new(name);
    if as_path.components().count() > 1 || as_path.is_absolute() {
        return which::which(as_path).ok();
    }
    let joined = std::env::join_paths(dirs).ok()?;
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    which::which_in(name, Some(joined), cwd).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use ukiryu_shell::{BashShell, CmdShell, ExecError, ProcessOutput, SpawnPlan};

    #[derive(Debug, Default)]
    struct FakeAliases {
        stdout: String,
        probes: Mutex<usize>,
    }

    #[async_trait]
    impl ProbeRunner for FakeAliases {
        async fn probe(&self, _plan: &SpawnPlan, _timeout: Duration) -> Result<ProcessOutput, ExecError> {
            *self.probes.lock() += 1;
            Ok(ProcessOutput {
                status: 0,
                stdout: self.stdout.as_bytes().to_vec(),
                stderr: Vec::new(),
                duration: Duration::ZERO,
            })
        }
    }

    #[cfg(unix)]
    fn fake_executable(dir: &Path, name: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").expect("write");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
        path
    }

    fn locator(runner: Arc<FakeAliases>, dir: &Path) -> ExecutableLocator {
        ExecutableLocator::new(runner, 16, Duration::ZERO)
            .with_path_env(Some(dir.as_os_str().to_os_string()))
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn finds_tool_on_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let expected = fake_executable(dir.path(), "magick");
        let locator = locator(Arc::new(FakeAliases::default()), dir.path());

        let info = locator
            .find_with_info("magick", &[], Platform::Linux, &BashShell::new(), None)
            .await
            .expect("found");
        assert_eq!(info.path, expected);
        assert_eq!(info.source, DiscoverySource::Path);
        assert_eq!(info.shell, ShellKind::Bash);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn falls_back_to_declared_aliases() {
        let dir = tempfile::tempdir().expect("tempdir");
        let expected = fake_executable(dir.path(), "gs");
        let locator = locator(Arc::new(FakeAliases::default()), dir.path()).with_alias_detection(false);

        let path = locator
            .find("ghostscript", &["gswin64c".into(), "gs".into()], Platform::Linux, &BashShell::new())
            .await;
        assert_eq!(path, Some(expected));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_alias_resolves_to_its_first_word() {
        let dir = tempfile::tempdir().expect("tempdir");
        let expected = fake_executable(dir.path(), "magick7");
        let runner = Arc::new(FakeAliases {
            stdout: "alias convert='magick7 convert -quiet'\n".into(),
            ..FakeAliases::default()
        });
        let locator = locator(Arc::clone(&runner), dir.path());

        let info = locator
            .find_with_info("convert", &[], Platform::Linux, &BashShell::new(), None)
            .await
            .expect("alias found");
        assert_eq!(info.path, expected);
        assert_eq!(info.source, DiscoverySource::Alias);
        assert_eq!(info.alias_definition.as_deref(), Some("magick7 convert -quiet"));
        assert!(info.describe().contains("bash alias"));
    }

    #[tokio::test]
    async fn missing_tools_are_cached_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(FakeAliases::default());
        let locator = locator(Arc::clone(&runner), dir.path());
        let shell = BashShell::new();

        assert!(locator.find_with_info("nope-tool", &[], Platform::Linux, &shell, None).await.is_none());
        assert!(locator.find_with_info("nope-tool", &[], Platform::Linux, &shell, None).await.is_none());
        assert_eq!(*runner.probes.lock(), 1);
        assert_eq!(locator.cache_stats().hits, 1);

        locator.clear_cache();
        assert!(locator.find_with_info("nope-tool", &[], Platform::Linux, &shell, None).await.is_none());
        assert_eq!(*runner.probes.lock(), 2);
    }

    #[tokio::test]
    async fn shells_without_aliases_skip_the_probe() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(FakeAliases::default());
        let locator = locator(Arc::clone(&runner), dir.path());
        let found = locator
            .find_with_info("nope-tool", &[], Platform::Windows, &CmdShell::new(), None)
            .await;
        assert!(found.is_none());
        assert_eq!(*runner.probes.lock(), 0);
    }

    #[test]
    fn search_dirs_append_configured_and_platform_defaults() {
        let locator = ExecutableLocator::new(Arc::new(FakeAliases::default()), 1, Duration::ZERO)
            .with_path_env(Some(OsString::from("/usr/local/bin")))
        .with_search_paths([PathBuf::from("/opt/tools/bin")]);

        assert_eq!(
            locator.search_dirs(Platform::Macos),
            vec![
                PathBuf::from("/usr/local/bin"),
                PathBuf::from("/opt/tools/bin"),
                PathBuf::from("/opt/homebrew/bin"),
            ]
        );
    }
}
