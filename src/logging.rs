//! Tracing bootstrap for binaries and tests embedding the library.

use crate::config::Config;

const DEBUG_TARGETS: &str = "ukiryu=debug,ukiryu_shell=debug";
const DEFAULT_LEVEL: &str = "warn";

/// Filter directives for `config`. `rust_log`, when set, takes precedence.
pub fn filter_directives(config: &Config, rust_log: Option<&str>) -> String {
    if let Some(directives) = rust_log.map(str::trim).filter(|value| !value.is_empty()) {
        return directives.to_string();
    }
    if config.debug {
        format!("{DEFAULT_LEVEL},{DEBUG_TARGETS}")
    } else {
        DEFAULT_LEVEL.to_string()
    }
}

/// Install a stderr subscriber. Safe to call more than once; later calls
/// leave the first subscriber in place.
///
/// Set `UKIRYU_DEBUG=1` (or `debug = true` in the config) to trace quoting
/// and argument-building decisions.
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::prelude::*;

    let mut config = config.clone();
    if let Some(value) = std::env::var("UKIRYU_DEBUG").ok().filter(|value| !value.is_empty()) {
        config.debug = !matches!(value.trim(), "0" | "false" | "off" | "no");
    }
    let rust_log = std::env::var("RUST_LOG").ok();
    let directives = filter_directives(&config, rust_log.as_deref());

    let env_filter = tracing_subscriber::EnvFilter::try_new(&directives)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LEVEL));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let init_result = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();

    if let Err(err) = init_result {
        tracing::warn!(error = %err, "tracing already initialized; skipping ukiryu tracing setup");
    }
}
