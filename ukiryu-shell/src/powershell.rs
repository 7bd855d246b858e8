//! PowerShell adapter.
//!
//! PowerShell's parameter binder treats an unquoted token starting with `-`
//! as a parameter name, so `-sDEVICE=pdfwrite` reaches a native tool as
//! `=pdfwrite` unless it is quoted. Such tokens, and anything containing `$`,
//! are always quoted.
//!
//! Commands run as `pwsh -Command "try { & 'exe' args } catch ...; exit $LASTEXITCODE"`
//! on every OS so the child's exit code replaces the wrapper's own. A
//! missing executable exits with [`COMMAND_NOT_FOUND_STATUS`].

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::adapter::{ShellAdapter, ShellKind, SpawnPlan};
use crate::posix::unix_headless_environment;

const SPECIAL: &[char] = &[
    '&', '*', '(', ')', '[', ']', '{', '}', '|', ';', '<', '>', '?', '`', '~', '!', '@', '%',
    '"', '$', '\'', ',', '#',
];

/// Wrapper exit status when PowerShell cannot resolve the executable.
pub const COMMAND_NOT_FOUND_STATUS: i32 = 127;

/// Parameters after which PowerShell reads a script body rather than a value.
const SCRIPT_PARAMETERS: &[&str] = &["-command", "-file"];

#[derive(Debug, Default)]
pub struct PowerShell {
    program: OnceLock<String>,
}

impl PowerShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific PowerShell binary instead of probing for `pwsh`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: OnceLock::from(program.into()),
        }
    }

    /// `pwsh` (PowerShell 7+) when installed, otherwise Windows PowerShell.
    pub fn program(&self) -> &str {
        self.program.get_or_init(|| {
            if which::which("pwsh").is_ok() {
                "pwsh".to_string()
            } else {
                "powershell".to_string()
            }
        })
    }

    /// Quote for a single-quoted context: embedded `'` are doubled.
    pub fn single_quoted(raw: &str) -> String {
        format!("'{}'", raw.replace('\'', "''"))
    }

    /// Escape for a double-quoted context: backtick before `` ` ``, `$` and `"`.
    pub fn double_quoted_escape(raw: &str) -> String {
        let mut escaped = String::with_capacity(raw.len());
        for ch in raw.chars() {
            if matches!(ch, '`' | '$' | '"') {
                escaped.push('`');
            }
            escaped.push(ch);
        }
        escaped
    }

    fn is_script_parameter(token: &str) -> bool {
        SCRIPT_PARAMETERS
            .iter()
            .any(|param| token.eq_ignore_ascii_case(param))
    }
}

impl ShellAdapter for PowerShell {
    fn kind(&self) -> ShellKind {
        ShellKind::PowerShell
    }

    fn escape(&self, raw: &str) -> String {
        Self::double_quoted_escape(raw)
    }

    fn quote(&self, raw: &str) -> String {
        Self::single_quoted(raw)
    }

    fn needs_quoting(&self, raw: &str) -> bool {
        raw.is_empty()
            || raw.starts_with('-')
            || raw
                .chars()
                .any(|ch| ch.is_whitespace() || SPECIAL.contains(&ch))
    }

    fn env_var(&self, name: &str) -> String {
        format!("$ENV:{name}")
    }

    fn join(&self, executable: &str, args: &[String]) -> String {
        let mut parts = Vec::with_capacity(args.len() + 2);
        parts.push("&".to_string());
        parts.push(Self::single_quoted(executable));

        let mut previous: Option<&str> = None;
        for arg in args {
            let token = match previous {
                Some(prev) if Self::is_script_parameter(prev) => {
                    tracing::trace!(token = %arg, "script body after {prev} left unquoted");
                    arg.clone()
                }
                _ if self.needs_quoting(arg) => Self::single_quoted(arg),
                _ => arg.clone(),
            };
            parts.push(token);
            previous = Some(arg.as_str());
        }

        let line = parts.join(" ");
        tracing::debug!(line = %line, "joined PowerShell command line");
        line
    }

    fn headless_environment(&self) -> HashMap<String, String> {
        if cfg!(windows) {
            HashMap::new()
        } else {
            unix_headless_environment()
        }
    }

    fn command_not_found_status(&self) -> Option<i32> {
        Some(COMMAND_NOT_FOUND_STATUS)
    }

    fn spawn_plan(&self, executable: &str, args: &[String]) -> SpawnPlan {
        let script = format!(
            "try {{ {} }} catch [System.Management.Automation.CommandNotFoundException] \
             {{ [Console]::Error.WriteLine($_.Exception.Message); exit {COMMAND_NOT_FOUND_STATUS} }}; \
             exit $LASTEXITCODE",
            self.join(executable, args)
        );
        SpawnPlan {
            program: self.program().to_string(),
            args: vec![
                "-NoLogo".to_string(),
                "-NoProfile".to_string(),
                "-NonInteractive".to_string(),
                "-Command".to_string(),
                script,
            ],
            raw_args: false,
        }
    }
}
