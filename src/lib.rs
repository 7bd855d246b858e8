//! Ukiryu wraps command-line tools behind typed command definitions.
//!
//! A [`CommandDefinition`] describes a tool command's options, flags and
//! positional arguments. Given caller parameters, the [`ArgumentBuilder`]
//! produces a deterministic argument list, the [`ExecutableLocator`] finds
//! the executable (shell aliases first, then the search path), and the
//! [`Executor`] runs it through the selected shell adapter with a timeout.
//!
//! ```no_run
//! use ukiryu::{Config, Executor, ToolDefinition, ToolInvocation};
//!
//! # async fn demo(tool: ToolDefinition) -> ukiryu::Result<()> {
//! let executor = Executor::new(Config::from_env()?);
//! let result = executor
//!     .run(
//!         ToolInvocation::new(&tool, "convert")
//!             .param("inputs", vec!["a.png", "b.png"])
//!             .param("output", "out.pdf"),
//!     )
//!     .await?;
//! println!("{} exited with {}", result.command_line, result.exit_status);
//! # Ok(())
//! # }
//! ```

pub mod args;
pub mod cache;
pub mod config;
pub mod definition;
pub mod error;
pub mod executor;
pub mod locator;
pub mod logging;
pub mod platform;
pub mod probe;
pub mod result;
pub mod validation;
pub mod version;

pub use args::ArgumentBuilder;
pub use cache::{CacheStats, TtlLruCache};
pub use config::{CacheConfig, Config};
pub use definition::{
    ArgPosition, ArgumentDefinition, CommandDefinition, EnvVarDefinition, FlagDefinition,
    OptionDefinition, OptionFormat, ParamValue, Params, ToolDefinition, ValueType,
};
pub use error::{Error, Result};
pub use executor::{Executor, ToolInvocation, VersionReport};
pub use locator::{DiscoverySource, ExecutableInfo, ExecutableLocator};
pub use logging::init_tracing;
pub use platform::Platform;
pub use probe::{ProbeRunner, SystemProbeRunner};
pub use result::ExecutionResult;
pub use version::{
    CompatibilityReport, DetectionMethod, VersionCompatibility, VersionDetection, VersionDetector,
    compare_versions,
};

pub use ukiryu_shell::{ShellAdapter, ShellKind, ShellRegistry};
