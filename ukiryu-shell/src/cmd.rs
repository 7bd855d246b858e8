//! cmd.exe adapter.

use std::collections::HashMap;

use crate::adapter::{ShellAdapter, ShellKind, SpawnPlan};

/// Characters cmd.exe interprets outside quotes; each is prefixed with `^`.
const CARET_ESCAPED: &[char] = &['%', '^', '<', '>', '&', '|'];

/// Status cmd.exe exits with when the command is not recognised.
pub const COMMAND_NOT_FOUND_STATUS: i32 = 9009;

/// Tokens kept verbatim in a `/c` command line so cmd.exe still parses them.
const OPERATORS: &[&str] = &[
    "&&", "||", "|", "&", ">", ">>", "<", "1>", "1>>", "2>", "2>>", "2>&1", "1>&2",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct CmdShell;

impl CmdShell {
    pub const fn new() -> Self {
        Self
    }

    fn has_whitespace(raw: &str) -> bool {
        raw.chars().any(char::is_whitespace)
    }

    fn word(&self, raw: &str) -> String {
        if raw.is_empty() || Self::has_whitespace(raw) {
            format!("\"{}\"", raw.replace('"', "\"\""))
        } else {
            Self::protect_quotes(&self.escape(raw))
        }
    }

    /// A bare `"` would flip cmd's quote state for the rest of the line.
    /// `^"` keeps it literal for cmd; the backslashes are for the child's
    /// argv parser, which also doubles any backslashes right before a quote.
    fn protect_quotes(word: &str) -> String {
        let mut out = String::with_capacity(word.len());
        let mut backslashes = 0;
        for ch in word.chars() {
            if ch == '"' {
                out.extend(std::iter::repeat_n('\\', backslashes + 1));
                out.push_str("^\"");
            } else {
                out.push(ch);
            }
            backslashes = if ch == '\\' { backslashes + 1 } else { 0 };
        }
        out
    }

    /// `/c` tail: operators stay raw, everything else is escaped per token.
    fn passthrough_token(&self, token: &str) -> String {
        if OPERATORS.contains(&token) {
            token.to_string()
        } else {
            self.word(token)
        }
    }
}

impl ShellAdapter for CmdShell {
    fn kind(&self) -> ShellKind {
        ShellKind::Cmd
    }

    fn escape(&self, raw: &str) -> String {
        let mut escaped = String::with_capacity(raw.len());
        for ch in raw.chars() {
            if CARET_ESCAPED.contains(&ch) {
                escaped.push('^');
            }
            escaped.push(ch);
        }
        escaped
    }

    fn quote(&self, raw: &str) -> String {
        self.word(raw)
    }

    fn needs_quoting(&self, raw: &str) -> bool {
        raw.is_empty() || Self::has_whitespace(raw)
    }

    fn env_var(&self, name: &str) -> String {
        format!("%{name}%")
    }

    fn join(&self, executable: &str, args: &[String]) -> String {
        let mut parts = Vec::with_capacity(args.len() + 1);
        parts.push(self.word(executable));

        match args.split_first() {
            Some((first, rest)) if first.eq_ignore_ascii_case("/c") && !rest.is_empty() => {
                parts.push(first.clone());
                parts.extend(rest.iter().map(|token| self.passthrough_token(token)));
                tracing::debug!(tokens = rest.len(), "joined cmd.exe /c passthrough");
            }
            _ => parts.extend(args.iter().map(|arg| self.word(arg))),
        }

        parts.join(" ")
    }

    fn format_path(&self, path: &str) -> String {
        path.replace('/', "\\")
    }

    fn headless_environment(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    fn command_not_found_status(&self) -> Option<i32> {
        Some(COMMAND_NOT_FOUND_STATUS)
    }

    /// `cmd.exe /d /s /c "<line>"`: `/s` strips exactly the outer quotes, so
    /// the line is reparsed as written.
    fn spawn_plan(&self, executable: &str, args: &[String]) -> SpawnPlan {
        let line = self.join(executable, args);
        SpawnPlan {
            program: "cmd.exe".to_string(),
            args: vec![
                "/d".to_string(),
                "/s".to_string(),
                "/c".to_string(),
                format!("\"{line}\""),
            ],
            raw_args: true,
        }
    }
}
