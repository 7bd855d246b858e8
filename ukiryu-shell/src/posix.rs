//! POSIX-family adapters: bash, zsh, fish, sh, dash and tcsh.
//!
//! All of them single-quote words. The shared rules live in
//! [`PosixQuoting`]; each adapter only spells out what it does differently
//! (alias probing, and fish's backslash handling inside single quotes).

use std::collections::HashMap;

use crate::adapter::{ShellAdapter, ShellKind, SpawnPlan};
use crate::alias;

/// Characters that force quoting in a POSIX word.
const POSIX_SPECIAL: &[char] = &[
    '&', '*', '(', ')', '[', ']', '{', '}', '|', ';', '<', '>', '?', '`', '~', '!', '@', '%',
    '"', '$', '\'', '\\', '#',
];

/// Whether `join` quotes every word or only the words that need it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuoteMode {
    #[default]
    Always,
    WhenNeeded,
}

/// Single-quote rules shared by the POSIX-family shells.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixQuoting {
    pub mode: QuoteMode,
}

impl PosixQuoting {
    pub const fn always() -> Self {
        Self {
            mode: QuoteMode::Always,
        }
    }

    pub const fn when_needed() -> Self {
        Self {
            mode: QuoteMode::WhenNeeded,
        }
    }

    /// Replace each `'` with `'\''` (close, escaped quote, reopen).
    pub fn escape(&self, raw: &str) -> String {
        raw.replace('\'', r"'\''")
    }

    pub fn quote(&self, raw: &str) -> String {
        format!("'{}'", self.escape(raw))
    }

    pub fn needs_quoting(&self, raw: &str) -> bool {
        raw.is_empty()
            || raw
                .chars()
                .any(|ch| ch.is_whitespace() || POSIX_SPECIAL.contains(&ch))
    }

    /// Format one word according to [`QuoteMode`], using `quote` for the
    /// words that get quoted.
    pub fn word(&self, raw: &str, quote: impl Fn(&str) -> String) -> String {
        match self.mode {
            QuoteMode::Always => quote(raw),
            QuoteMode::WhenNeeded if self.needs_quoting(raw) => quote(raw),
            QuoteMode::WhenNeeded => raw.to_string(),
        }
    }

    pub fn join(
        &self,
        executable: &str,
        args: &[String],
        quote: impl Fn(&str) -> String,
    ) -> String {
        let mut parts = Vec::with_capacity(args.len() + 1);
        parts.push(self.word(executable, &quote));
        parts.extend(args.iter().map(|arg| self.word(arg, &quote)));
        let line = parts.join(" ");
        tracing::trace!(line = %line, "joined POSIX command line");
        line
    }
}

/// Environment that keeps X11/macOS GUI toolkits from initialising.
pub fn unix_headless_environment() -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert("DISPLAY".to_string(), String::new());
    if cfg!(target_os = "macos") {
        // Background-only agent, no AppleEvents, X11 backend for GTK builds.
        env.insert("LSBackgroundOnly".to_string(), "1".to_string());
        env.insert("LSUIElement".to_string(), "1".to_string());
        env.insert("NSAppleEventsDisabled".to_string(), "1".to_string());
        env.insert("GDK_BACKEND".to_string(), "x11".to_string());
    }
    env
}

macro_rules! posix_shell_adapter {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:expr, probe = $probe:expr, parse = $parse:path
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name {
            quoting: PosixQuoting,
        }

        impl $name {
            pub const fn new() -> Self {
                Self {
                    quoting: PosixQuoting::always(),
                }
            }

            /// Adapter whose `join` only quotes words that need it.
            pub const fn selective() -> Self {
                Self {
                    quoting: PosixQuoting::when_needed(),
                }
            }
        }

        impl ShellAdapter for $name {
            fn kind(&self) -> ShellKind {
                $kind
            }

            fn escape(&self, raw: &str) -> String {
                self.quoting.escape(raw)
            }

            fn quote(&self, raw: &str) -> String {
                self.quoting.quote(raw)
            }

            fn needs_quoting(&self, raw: &str) -> bool {
                self.quoting.needs_quoting(raw)
            }

            fn env_var(&self, name: &str) -> String {
                format!("${name}")
            }

            fn join(&self, executable: &str, args: &[String]) -> String {
                self.quoting
                    .join(executable, args, |raw| self.quoting.quote(raw))
            }

            fn headless_environment(&self) -> HashMap<String, String> {
                unix_headless_environment()
            }

            fn spawn_plan(&self, executable: &str, args: &[String]) -> SpawnPlan {
                SpawnPlan::direct(executable, args)
            }

            fn alias_probe(&self, name: &str) -> Option<SpawnPlan> {
                if !alias::is_alias_name(name) {
                    return None;
                }
                let (program, flag): (&str, &str) = $probe;
                Some(SpawnPlan::direct(
                    program,
                    &[flag.to_string(), format!("alias {name}")],
                ))
            }

            fn parse_alias(&self, name: &str, output: &str) -> Option<String> {
                $parse(name, output)
            }
        }
    };
}

posix_shell_adapter!(
    /// GNU bash.
    BashShell,
    ShellKind::Bash,
    probe = ("bash", "-ic"),
    parse = alias::parse_assignment_alias
);

posix_shell_adapter!(
    /// Z shell.
    ZshShell,
    ShellKind::Zsh,
    probe = ("zsh", "-ic"),
    parse = alias::parse_assignment_alias
);

posix_shell_adapter!(
    /// The system `sh`.
    ShShell,
    ShellKind::Sh,
    probe = ("sh", "-ic"),
    parse = alias::parse_assignment_alias
);

posix_shell_adapter!(
    /// Debian Almquist shell.
    DashShell,
    ShellKind::Dash,
    probe = ("dash", "-ic"),
    parse = alias::parse_assignment_alias
);

posix_shell_adapter!(
    /// tcsh; `alias NAME` prints the bare definition.
    TcshShell,
    ShellKind::Tcsh,
    probe = ("tcsh", "-c"),
    parse = alias::parse_tcsh_alias
);

/// fish. Inside fish single quotes `\\` and `\'` are escape sequences, so
/// backslashes are doubled as well as quotes being escaped.
#[derive(Debug, Clone, Copy, Default)]
pub struct FishShell {
    quoting: PosixQuoting,
}

impl FishShell {
    pub const fn new() -> Self {
        Self {
            quoting: PosixQuoting::always(),
        }
    }

    pub const fn selective() -> Self {
        Self {
            quoting: PosixQuoting::when_needed(),
        }
    }
}

impl ShellAdapter for FishShell {
    fn kind(&self) -> ShellKind {
        ShellKind::Fish
    }

    fn escape(&self, raw: &str) -> String {
        raw.replace('\\', r"\\").replace('\'', r"\'")
    }

    fn quote(&self, raw: &str) -> String {
        format!("'{}'", self.escape(raw))
    }

    fn needs_quoting(&self, raw: &str) -> bool {
        self.quoting.needs_quoting(raw)
    }

    fn env_var(&self, name: &str) -> String {
        format!("${name}")
    }

    fn join(&self, executable: &str, args: &[String]) -> String {
        self.quoting.join(executable, args, |raw| self.quote(raw))
    }

    fn headless_environment(&self) -> HashMap<String, String> {
        unix_headless_environment()
    }

    fn spawn_plan(&self, executable: &str, args: &[String]) -> SpawnPlan {
        SpawnPlan::direct(executable, args)
    }

    fn alias_probe(&self, name: &str) -> Option<SpawnPlan> {
        if !alias::is_alias_name(name) {
            return None;
        }
        Some(SpawnPlan::direct("fish", &["-c".to_string(), "alias".to_string()]))
    }

    fn parse_alias(&self, name: &str, output: &str) -> Option<String> {
        alias::parse_fish_alias(name, output)
    }
}
