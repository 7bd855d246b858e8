//! Top-level execution context tying argument building, discovery and the
//! shell layer together.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use ukiryu_shell::{ExecError, ExecRequest, ShellAdapter, ShellKind, ShellRegistry};

use crate::args::ArgumentBuilder;
use crate::cache::TtlLruCache;
use crate::config::Config;
use crate::definition::{Params, ToolDefinition};
use crate::error::{Error, Result};
use crate::locator::{ExecutableInfo, ExecutableLocator};
use crate::platform::Platform;
use crate::probe::{ProbeRunner, SystemProbeRunner};
use crate::result::ExecutionResult;
use crate::version::{CompatibilityReport, VersionCompatibility, VersionDetector};

/// Exit status reported for processes that could not be started when the
/// caller allows failure.
pub const SPAWN_FAILURE_STATUS: i32 = 127;

/// One request to run a command of a tool.
#[derive(Debug, Clone)]
pub struct ToolInvocation<'a> {
    pub tool: &'a ToolDefinition,
    pub command: &'a str,
    pub params: Params,
    pub shell: Option<ShellKind>,
    pub platform: Option<Platform>,
    /// Skip discovery and run this path.
    pub executable: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub stdin: Option<Vec<u8>>,
    /// Overrides the configured timeout.
    pub timeout: Option<Duration>,
    /// Report spawn failures as a result with status 127 instead of an error.
    pub allow_failure: bool,
}

impl<'a> ToolInvocation<'a> {
    pub fn new(tool: &'a ToolDefinition, command: &'a str) -> Self {
        Self {
            tool,
            command,
            params: Params::new(),
            shell: None,
            platform: None,
            executable: None,
            env: HashMap::new(),
            cwd: None,
            stdin: None,
            timeout: None,
            allow_failure: false,
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<crate::ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn shell(mut self, shell: ShellKind) -> Self {
        self.shell = Some(shell);
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn allow_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }
}

/// Detected version of a resolved executable and its compatibility with the
/// tool's requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionReport {
    pub executable: PathBuf,
    pub version: Option<String>,
    /// `None` when the tool declares no requirement.
    pub compatibility: Option<CompatibilityReport>,
}

impl VersionReport {
    /// False only when a requirement exists and is not met.
    pub fn is_compatible(&self) -> bool {
        self.compatibility
            .as_ref()
            .is_none_or(|report| report.compatible)
    }
}

#[derive(Debug)]
pub struct Executor {
    config: Config,
    registry: ShellRegistry,
    locator: ExecutableLocator,
    versions: VersionDetector,
}

impl Executor {
    pub fn new(config: Config) -> Self {
        Self::with_runner(config, Arc::new(SystemProbeRunner))
    }

    /// Use `runner` for alias and version probes.
    pub fn with_runner(config: Config, runner: Arc<dyn ProbeRunner>) -> Self {
        let ttl = config.cache.ttl();
        let locator = ExecutableLocator::new(Arc::clone(&runner), config.cache.capacity, ttl)
            .with_search_paths(config.search_paths.iter().cloned())
            .with_alias_detection(config.detect_aliases);
        let versions = VersionDetector::new(runner, TtlLruCache::new(config.cache.capacity, ttl));
        Self {
            config,
            registry: ShellRegistry::new(),
            locator,
            versions,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ShellRegistry {
        &self.registry
    }

    pub fn locator(&self) -> &ExecutableLocator {
        &self.locator
    }

    /// Adapter for `requested`, else the configured shell, else the one the
    /// current process runs under.
    pub fn shell(&self, requested: Option<ShellKind>) -> Result<Arc<dyn ShellAdapter>> {
        self.shell_for(requested, Platform::current())
    }

    /// Like [`Executor::shell`], but a command targeting another platform
    /// falls back to that platform's default shell instead of the current one.
    pub fn shell_for(
        &self,
        requested: Option<ShellKind>,
        platform: Platform,
    ) -> Result<Arc<dyn ShellAdapter>> {
        let kind = match requested.or(self.config.shell) {
            Some(kind) => kind,
            None if platform == Platform::current() => return Ok(self.registry.detect_current()),
            None => platform.default_shell(),
        };
        self.registry.get(kind).ok_or_else(|| Error::UnknownShell {
            name: kind.to_string(),
        })
    }

    /// Resolve the executable for `tool` or fail with the searched directories.
    pub async fn locate(
        &self,
        tool: &ToolDefinition,
        platform: Platform,
        shell: &dyn ShellAdapter,
    ) -> Result<ExecutableInfo> {
        self.locator
            .find_with_info(
                tool.executable_name(),
                &tool.aliases,
                platform,
                shell,
                tool.version_requirement.as_deref(),
            )
            .await
            .ok_or_else(|| Error::ExecutableNotFound {
                tool: tool.name.clone(),
                searched: self.locator.search_dirs(platform),
            })
    }

    /// Detect the version of `executable` and check it against the tool's
    /// requirement. Tools without a detection method report `None`.
    pub async fn check_version(&self, tool: &ToolDefinition, executable: &Path) -> VersionReport {
        let version = match &tool.version_detection {
            Some(detection) => self.versions.detect(executable, detection).await,
            None => None,
        };
        let compatibility = tool.version_requirement.as_deref().map(|requirement| {
            match version.as_deref() {
                Some(version) => VersionCompatibility::check(version, requirement),
                None => CompatibilityReport {
                    compatible: false,
                    reason: format!(
                        "could not detect the version of {} to check '{requirement}'",
                        tool.name
                    ),
                },
            }
        });
        VersionReport {
            executable: executable.to_path_buf(),
            version,
            compatibility,
        }
    }

    /// Build, resolve and run one command.
    pub async fn run(&self, invocation: ToolInvocation<'_>) -> Result<ExecutionResult> {
        let tool = invocation.tool;
        let platform = invocation.platform.unwrap_or_else(|| self.config.platform());
        if !platform.matches(&tool.platforms) {
            return Err(Error::definition(
                &tool.name,
                format!("tool is not available on {platform}"),
            ));
        }
        let command = tool.command(invocation.command).ok_or_else(|| {
            Error::definition(
                invocation.command,
                format!("tool '{}' has no such command", tool.name),
            )
        })?;

        let shell = self.shell_for(invocation.shell, platform)?;
        let args = ArgumentBuilder::new(shell.as_ref(), platform).build(command, &invocation.params)?;

        let info = match &invocation.executable {
            Some(path) => ExecutableInfo::explicit(path, shell.kind()),
            None => self.locate(tool, platform, shell.as_ref()).await?,
        };
        let executable = info.path.display().to_string();

        let mut env = HashMap::new();
        if self.config.headless {
            env.extend(shell.headless_environment());
        }
        for env_var in command.env_vars.iter().filter(|var| platform.matches(&var.platforms)) {
            if let Some(value) = env_var.resolve(&invocation.params) {
                env.insert(env_var.name.clone(), value);
            }
        }
        env.extend(invocation.env);

        let mut request = ExecRequest::new(executable.clone()).args(args.clone()).env(env);
        if let Some(timeout) = invocation.timeout.or_else(|| self.config.timeout()) {
            request = request.timeout(timeout);
        }
        if let Some(cwd) = &invocation.cwd {
            request = request.cwd(cwd);
        }
        let command_line = shell.join(&executable, &args);

        tracing::debug!(
            tool = %tool.name,
            command = %command.name,
            shell = %shell.kind(),
            executable = %info.describe(),
            command_line = %command_line,
            "running tool command"
        );

        let started_at = Utc::now();
        let outcome = match invocation.stdin {
            Some(data) => shell.execute_with_stdin(request, data).await,
            None => shell.execute(request).await,
        };
        let finished_at = Utc::now();

        let (exit_status, stdout, stderr) = match outcome {
            Ok(output) => (output.status, output.stdout_lossy(), output.stderr_lossy()),
            Err(err @ ExecError::Spawn { .. }) if invocation.allow_failure => {
                tracing::debug!(error = %err, "spawn failed; reporting as exit status 127");
                (SPAWN_FAILURE_STATUS, String::new(), err.to_string())
            }
            Err(err) => return Err(Error::from_exec(err, &args)),
        };

        Ok(ExecutionResult {
            executable,
            args,
            command_line,
            shell: shell.kind(),
            stdout,
            stderr,
            exit_status,
            started_at,
            finished_at,
        })
    }

    pub fn clear_caches(&self) {
        self.locator.clear_cache();
        self.versions.clear_cache();
    }
}
