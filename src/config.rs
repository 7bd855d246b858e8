use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use ukiryu_shell::ShellKind;

use crate::cache::{DEFAULT_CAPACITY, DEFAULT_TTL};
use crate::platform::Platform;

/// Runtime settings for an [`crate::Executor`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Per-invocation timeout in seconds. `0` disables the limit.
    #[serde(default = "Config::default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Shell override; detected from the environment when unset.
    #[serde(default)]
    pub shell: Option<ShellKind>,
    /// Platform override; the host platform when unset.
    #[serde(default)]
    pub platform: Option<Platform>,
    /// Add the shell's headless variables to every child environment.
    #[serde(default = "Config::default_true")]
    pub headless: bool,
    #[serde(default = "Config::default_true")]
    pub detect_aliases: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Directories searched after `PATH`.
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_seconds: Self::default_timeout_seconds(),
            shell: None,
            platform: None,
            headless: true,
            detect_aliases: true,
            debug: false,
            cache: CacheConfig::default(),
            search_paths: Vec::new(),
        }
    }
}

impl Config {
    const MAX_TIMEOUT_SECONDS: u64 = 24 * 60 * 60;

    const fn default_timeout_seconds() -> u64 {
        90
    }

    const fn default_true() -> bool {
        true
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("failed to parse ukiryu configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Overlay `UKIRYU_*` variables read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup("UKIRYU_TIMEOUT") {
            self.timeout_seconds = value
                .trim()
                .parse()
                .with_context(|| format!("UKIRYU_TIMEOUT must be a number of seconds, got '{value}'"))?;
        }
        if let Some(value) = lookup("UKIRYU_SHELL").filter(|value| !value.trim().is_empty()) {
            self.shell = Some(value.parse().with_context(|| format!("UKIRYU_SHELL='{value}'"))?);
        }
        if let Some(value) = lookup("UKIRYU_PLATFORM").filter(|value| !value.trim().is_empty()) {
            self.platform = Some(value.parse().with_context(|| format!("UKIRYU_PLATFORM='{value}'"))?);
        }
        if let Some(value) = lookup("UKIRYU_DEBUG") {
            self.debug = parse_switch("UKIRYU_DEBUG", &value)?;
        }
        if let Some(value) = lookup("UKIRYU_HEADLESS") {
            self.headless = parse_switch("UKIRYU_HEADLESS", &value)?;
        }
        if let Some(value) = lookup("UKIRYU_DETECT_ALIASES") {
            self.detect_aliases = parse_switch("UKIRYU_DETECT_ALIASES", &value)?;
        }
        self.validate()
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.timeout_seconds <= Self::MAX_TIMEOUT_SECONDS,
            "timeout_seconds must be at most {} (or 0 to disable)",
            Self::MAX_TIMEOUT_SECONDS
        );
        ensure!(self.cache.capacity > 0, "cache.capacity must be at least 1");
        for path in &self.search_paths {
            ensure!(
                !path.as_os_str().is_empty(),
                "search_paths must not contain empty entries"
            );
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0).then_some(Duration::from_secs(self.timeout_seconds))
    }

    pub fn platform(&self) -> Platform {
        self.platform.unwrap_or_else(Platform::current)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "CacheConfig::default_capacity")]
    pub capacity: usize,
    /// Entry lifetime in seconds; `0` keeps entries until evicted.
    #[serde(default = "CacheConfig::default_ttl_seconds")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: Self::default_capacity(),
            ttl_seconds: Self::default_ttl_seconds(),
        }
    }
}

impl CacheConfig {
    const fn default_capacity() -> usize {
        DEFAULT_CAPACITY
    }

    const fn default_ttl_seconds() -> u64 {
        DEFAULT_TTL.as_secs()
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

fn parse_switch(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("{name} must be a boolean, got '{other}'"),
    }
}
