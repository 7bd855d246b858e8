//! Parsing of alias listings printed by the POSIX-family shells.

/// Alias names are passed to the probing shell inside a script, so only
/// plain words are accepted.
pub fn is_alias_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.' | '+'))
}

/// Parse `alias NAME='value'` (bash) or `NAME='value'` (zsh, sh, dash).
pub fn parse_assignment_alias(name: &str, output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let line = line.trim();
        let line = line.strip_prefix("alias ").unwrap_or(line);
        let (key, value) = line.split_once('=')?;
        if key.trim() != name {
            return None;
        }
        non_empty(unquote(value.trim()))
    })
}

/// Parse `alias NAME 'value'` lines as printed by fish's `alias`.
pub fn parse_fish_alias(name: &str, output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("alias ")?;
        let (key, value) = rest.split_once(char::is_whitespace)?;
        if key != name {
            return None;
        }
        non_empty(unquote(value.trim()))
    })
}

/// tcsh prints only the definition, wrapped in parentheses when it holds
/// several words in some builds.
pub fn parse_tcsh_alias(_name: &str, output: &str) -> Option<String> {
    let line = output.lines().map(str::trim).find(|line| !line.is_empty())?;
    let line = line
        .strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
        .unwrap_or(line);
    non_empty(line.trim().to_string())
}

/// First whitespace-delimited word of an alias target: the command it runs.
pub fn alias_command(target: &str) -> Option<&str> {
    target.split_whitespace().next()
}

fn unquote(value: &str) -> String {
    if let Some(inner) = value
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return inner.replace(r"'\''", "'").replace(r"\'", "'");
    }
    if let Some(inner) = value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        return inner.to_string();
    }
    value.to_string()
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_alias_names_only() {
        assert!(is_alias_name("convert"));
        assert!(is_alias_name("g++"));
        assert!(is_alias_name("magick-7.1"));
        assert!(!is_alias_name(""));
        assert!(!is_alias_name("a b"));
        assert!(!is_alias_name("x;y"));
        assert!(!is_alias_name("$HOME"));
    }

    #[test]
    fn parses_bash_alias_output() {
        let output = "alias gs='/opt/ghostscript/bin/gs -q'\n";
        assert_eq!(
            parse_assignment_alias("gs", output).as_deref(),
            Some("/opt/ghostscript/bin/gs -q")
        );
    }

    #[test]
    fn parses_zsh_alias_output_with_and_without_quotes() {
        assert_eq!(
            parse_assignment_alias("ll", "ll='ls -la'").as_deref(),
            Some("ls -la")
        );
        assert_eq!(
            parse_assignment_alias("vi", "vi=nvim").as_deref(),
            Some("nvim")
        );
        assert_eq!(parse_assignment_alias("vi", "vim=nvim"), None);
    }

    #[test]
    fn restores_escaped_single_quotes() {
        let output = r"alias say='echo '\''hi'\'''";
        assert_eq!(
            parse_assignment_alias("say", output).as_deref(),
            Some("echo 'hi'")
        );
    }

    #[test]
    fn parses_fish_alias_listing() {
        let output = "alias ll 'ls -la'\nalias magick '/opt/im/bin/magick'\n";
        assert_eq!(
            parse_fish_alias("magick", output).as_deref(),
            Some("/opt/im/bin/magick")
        );
        assert_eq!(parse_fish_alias("git", output), None);
    }

    #[test]
    fn parses_tcsh_definition() {
        assert_eq!(parse_tcsh_alias("ll", "(ls -la)\n").as_deref(), Some("ls -la"));
        assert_eq!(parse_tcsh_alias("ll", "ls -la\n").as_deref(), Some("ls -la"));
        assert_eq!(parse_tcsh_alias("ll", "\n"), None);
    }

    #[test]
    fn alias_command_takes_first_word() {
        assert_eq!(alias_command("/opt/gs/bin/gs -q -dSAFER"), Some("/opt/gs/bin/gs"));
        assert_eq!(alias_command("   "), None);
    }
}
