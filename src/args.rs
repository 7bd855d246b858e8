//! Turns a [`CommandDefinition`] and caller parameters into an ordered
//! argument list.
//!
//! Output order is fixed by the definition, never by the parameter map:
//! `[subcommand] [options] [flags] [positional by position] [post_options] [last]`.

use std::collections::{HashMap, HashSet};

use ukiryu_shell::ShellAdapter;

use crate::definition::{
    ArgPosition, ArgumentDefinition, CommandDefinition, FlagDefinition, OptionDefinition,
    OptionFormat, ParamValue, Params, ValueType,
};
use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::validation::{Constraints, validate_value};

pub struct ArgumentBuilder<'a> {
    shell: &'a dyn ShellAdapter,
    platform: Platform,
}

impl<'a> ArgumentBuilder<'a> {
    pub fn new(shell: &'a dyn ShellAdapter, platform: Platform) -> Self {
        Self { shell, platform }
    }

    /// Build the argument list. Fails on the first invalid parameter without
    /// returning partial output.
    pub fn build(&self, command: &CommandDefinition, params: &Params) -> Result<Vec<String>> {
        command.validate()?;
        self.log_unknown_parameters(command, params);

        let mut args = Vec::new();

        if let Some(subcommand) = &command.subcommand {
            args.extend(subcommand.split_whitespace().map(str::to_string));
        }

        self.push_options(&mut args, &command.options, params)?;
        args.extend(self.flag_tokens(command, params)?);

        let mut regular: Vec<(usize, &ArgumentDefinition)> = Vec::new();
        let mut last = None;
        for (position, argument) in command.argument_positions() {
            match position {
                ArgPosition::Index(index) => regular.push((index, argument)),
                ArgPosition::Last => last = Some(argument),
            }
        }
        regular.sort_by_key(|(index, _)| *index);
        for (_, argument) in regular {
            args.extend(self.argument_tokens(argument, params)?);
        }

        self.push_options(&mut args, &command.post_options, params)?;

        if let Some(argument) = last {
            args.extend(self.argument_tokens(argument, params)?);
        }

        tracing::debug!(
            command = %command.name,
            shell = %self.shell.kind(),
            platform = %self.platform,
            args = ?args,
            "built arguments"
        );
        Ok(args)
    }

    fn push_options(
        &self,
        args: &mut Vec<String>,
        options: &[OptionDefinition],
        params: &Params,
    ) -> Result<()> {
        for option in options {
            if !self.platform.matches(&option.platforms) {
                tracing::trace!(option = %option.name, platform = %self.platform, "option skipped on platform");
                continue;
            }
            let Some(value) = params.get(&option.name).filter(|value| !value.is_null()) else {
                continue;
            };
            args.extend(self.format_option(option, value)?);
        }
        Ok(())
    }

    /// Tokens for one option value, laid out per its [`OptionFormat`].
    pub fn format_option(&self, option: &OptionDefinition, value: &ParamValue) -> Result<Vec<String>> {
        validate_value(&option.name, value, Constraints::from(option))?;

        if option.value_type == ValueType::Boolean {
            let enabled = value.as_bool().unwrap_or(false);
            return Ok(if enabled { vec![option.cli.clone()] } else { Vec::new() });
        }

        let rendered = match value {
            ParamValue::List(items) => {
                if items.is_empty() {
                    return Ok(Vec::new());
                }
                let element_type = option.element_type.unwrap_or(ValueType::String);
                items
                    .iter()
                    .map(|item| self.render(item, element_type))
                    .collect::<Vec<_>>()
                    .join(&option.delimiter)
            }
            scalar => self.render(scalar, option.value_type),
        };

        let cli = &option.cli;
        let tokens = match option.format {
            format if format.is_space_separated() => vec![cli.clone(), rendered],
            OptionFormat::SlashColon => vec![format!("{cli}:{rendered}")],
            _ => vec![format!("{cli}{}{rendered}", option.separator)],
        };
        Ok(tokens)
    }

    fn render(&self, value: &ParamValue, value_type: ValueType) -> String {
        let rendered = value.render();
        if value_type == ValueType::File {
            self.shell.format_path(&rendered)
        } else {
            rendered
        }
    }

    /// Enabled flags, conflict-checked and ordered by `after`/`before`.
    fn flag_tokens(&self, command: &CommandDefinition, params: &Params) -> Result<Vec<String>> {
        let mut enabled: Vec<&FlagDefinition> = Vec::new();
        for flag in &command.flags {
            if !self.platform.matches(&flag.platforms) {
                continue;
            }
            let on = match params.get(&flag.name) {
                None | Some(ParamValue::Null) => flag.default,
                Some(value) => value.as_bool().ok_or_else(|| {
                    Error::validation(&flag.name, format!("expected a boolean, got '{value}'"))
                })?,
            };
            if on {
                enabled.push(flag);
            }
        }

        let names: HashSet<&str> = enabled.iter().map(|flag| flag.name.as_str()).collect();
        for flag in &enabled {
            if let Some(other) = flag
                .conflicts_with
                .iter()
                .find(|other| names.contains(other.as_str()))
            {
                return Err(Error::validation(
                    &flag.name,
                    format!("cannot be combined with '{other}'"),
                ));
            }
        }

        let ordered = order_flags(&enabled).map_err(|cycle| {
            Error::definition(
                &command.name,
                format!("flag ordering constraints form a cycle through '{cycle}'"),
            )
        })?;
        Ok(ordered.into_iter().map(|flag| flag.cli.clone()).collect())
    }

    fn argument_tokens(&self, argument: &ArgumentDefinition, params: &Params) -> Result<Vec<String>> {
        let value = params.get(&argument.name).filter(|value| !value.is_null());
        let Some(value) = value else {
            if argument.min > 0 {
                return Err(Error::validation(&argument.name, "required argument is missing"));
            }
            return Ok(Vec::new());
        };

        let constraints = Constraints::from(argument);
        let items: Vec<&ParamValue> = match value {
            ParamValue::List(items) if argument.variadic => items.iter().collect(),
            ParamValue::List(_) => {
                return Err(Error::validation(
                    &argument.name,
                    "expected a single value; declare the argument variadic to pass a list",
                ));
            }
            scalar => vec![scalar],
        };

        if items.len() < argument.min {
            return Err(Error::validation(
                &argument.name,
                format!("expected at least {} value(s), got {}", argument.min, items.len()),
            ));
        }
        if let Some(max) = argument.max
            && items.len() > max
        {
            return Err(Error::validation(
                &argument.name,
                format!("expected at most {max} value(s), got {}", items.len()),
            ));
        }

        items
            .into_iter()
            .map(|item| {
                validate_value(&argument.name, item, constraints)?;
                Ok(self.render(item, argument.value_type))
            })
            .collect()
    }

    fn log_unknown_parameters(&self, command: &CommandDefinition, params: &Params) {
        let known: HashSet<&str> = command.parameter_names().collect();
        let mut unknown: Vec<&str> = params
            .keys()
            .map(String::as_str)
            .filter(|name| !known.contains(name))
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            tracing::debug!(command = %command.name, unknown = ?unknown, "ignoring undeclared parameters");
        }
    }
}

/// Stable topological order: among flags whose constraints are satisfied,
/// the earliest declared goes first. Returns the name of a flag on a cycle.
fn order_flags<'f>(
    flags: &[&'f FlagDefinition],
) -> std::result::Result<Vec<&'f FlagDefinition>, String> {
    let index_of: HashMap<&str, usize> = flags
        .iter()
        .enumerate()
        .map(|(index, flag)| (flag.name.as_str(), index))
        .collect();

    // predecessors[i]: flags that must come before flag i.
    let mut predecessors: Vec<HashSet<usize>> = vec![HashSet::new(); flags.len()];
    for (index, flag) in flags.iter().enumerate() {
        if let Some(&earlier) = flag.after.as_deref().and_then(|name| index_of.get(name)) {
            predecessors[index].insert(earlier);
        }
        if let Some(&later) = flag.before.as_deref().and_then(|name| index_of.get(name)) {
            predecessors[later].insert(index);
        }
    }

    let mut placed = vec![false; flags.len()];
    let mut ordered = Vec::with_capacity(flags.len());
    while ordered.len() < flags.len() {
        let ready = (0..flags.len())
            .find(|&candidate| !placed[candidate] && predecessors[candidate].iter().all(|&p| placed[p]));
        let Some(next) = ready else {
            let stuck = placed.iter().position(|done| !done).unwrap_or_default();
            return Err(flags[stuck].name.clone());
        };
        placed[next] = true;
        ordered.push(flags[next]);
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::OptionDefinition;
    use pretty_assertions::assert_eq;
    use ukiryu_shell::{BashShell, CmdShell, PowerShell};

    fn params(pairs: &[(&str, ParamValue)]) -> Params {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    fn build(command: &CommandDefinition, params: &Params) -> Result<Vec<String>> {
        ArgumentBuilder::new(&BashShell::new(), Platform::Linux).build(command, params)
    }

    #[test]
    fn double_dash_equals_option() {
        let command = CommandDefinition::new("render").option(OptionDefinition::new("output", "--output"));
        let args = build(&command, &params(&[("output", "/tmp/x.png".into())])).expect("args");
        assert_eq!(args, vec!["--output=/tmp/x.png"]);
    }

    #[test]
    fn every_format_style() {
        let cases = [
            (OptionFormat::DoubleDashEquals, vec!["--q=5"]),
            (OptionFormat::SingleDashEquals, vec!["--q=5"]),
            (OptionFormat::DoubleDashSpace, vec!["--q", "5"]),
            (OptionFormat::SingleDashSpace, vec!["--q", "5"]),
            (OptionFormat::SlashColon, vec!["--q:5"]),
            (OptionFormat::SlashSpace, vec!["--q", "5"]),
        ];
        for (format, expected) in cases {
            let command = CommandDefinition::new("c").option(OptionDefinition::new("q", "--q").format(format));
            let args = build(&command, &params(&[("q", 5.into())])).expect("args");
            assert_eq!(args, expected, "{format:?}");
        }
    }

    #[test]
    fn custom_separator_and_array_delimiter() {
        let mut option = OptionDefinition::new("define", "-define")
            .format(OptionFormat::SingleDashEquals)
            .separator(" ")
            .value_type(ValueType::Array);
        option.delimiter = ";".to_string();
        let command = CommandDefinition::new("c").option(option);
        let args = build(&command, &params(&[("define", vec!["a", "b"].into())])).expect("args");
        assert_eq!(args, vec!["-define a;b"]);

        let option = OptionDefinition::new("pages", "--pages")
            .format(OptionFormat::DoubleDashSpace)
            .value_type(ValueType::Array);
        let command = CommandDefinition::new("c").option(option);
        let args = build(&command, &params(&[("pages", vec![1, 3].into())])).expect("args");
        assert_eq!(args, vec!["--pages", "1,3"]);
    }

    #[test]
    fn boolean_options_emit_bare_flag_only_when_true() {
        let command = CommandDefinition::new("c").option(
            OptionDefinition::new("verbose", "--verbose").value_type(ValueType::Boolean),
        );
        assert_eq!(
            build(&command, &params(&[("verbose", true.into())])).expect("on"),
            vec!["--verbose"]
        );
        assert!(build(&command, &params(&[("verbose", false.into())])).expect("off").is_empty());
    }

    #[test]
    fn flags_follow_default_and_override() {
        let command = CommandDefinition::new("c").flag(FlagDefinition::new("strip", "-strip"));
        assert!(build(&command, &Params::new()).expect("default").is_empty());
        assert_eq!(
            build(&command, &params(&[("strip", true.into())])).expect("on"),
            vec!["-strip"]
        );

        let command = CommandDefinition::new("c").flag(FlagDefinition::new("color", "--color").default_on());
        assert_eq!(build(&command, &Params::new()).expect("default on"), vec!["--color"]);
        assert!(build(&command, &params(&[("color", false.into())])).expect("off").is_empty());
    }

    #[test]
    fn non_boolean_flag_value_is_rejected() {
        let command = CommandDefinition::new("c").flag(FlagDefinition::new("strip", "-strip"));
        let err = build(&command, &params(&[("strip", "sometimes".into())])).unwrap_err();
        assert!(matches!(err, Error::Validation { ref parameter, .. } if parameter == "strip"));
    }

    #[test]
    fn conflicting_flags_are_rejected() {
        let command = CommandDefinition::new("c")
            .flag(FlagDefinition::new("quiet", "-q").conflicts_with("verbose"))
            .flag(FlagDefinition::new("verbose", "-v"));
        let err = build(&command, &params(&[("quiet", true.into()), ("verbose", true.into())]))
            .unwrap_err();
        assert!(err.to_string().contains("verbose"));
        assert_eq!(build(&command, &params(&[("quiet", true.into())])).expect("one"), vec!["-q"]);
    }

    #[test]
    fn after_and_before_reorder_flags() {
        let command = CommandDefinition::new("c")
            .flag(FlagDefinition::new("overwrite", "-y").after("input_first"))
            .flag(FlagDefinition::new("input_first", "-i"))
            .flag(FlagDefinition::new("quiet", "-q").before("input_first"));
        let all = params(&[
            ("overwrite", true.into()),
            ("input_first", true.into()),
            ("quiet", true.into()),
        ]);
        assert_eq!(build(&command, &all).expect("ordered"), vec!["-q", "-i", "-y"]);

        // Constraints naming a disabled flag are ignored.
        let partial = params(&[("overwrite", true.into()), ("quiet", true.into())]);
        assert_eq!(build(&command, &partial).expect("partial"), vec!["-y", "-q"]);
    }

    #[test]
    fn cyclic_flag_order_is_a_definition_error() {
        let command = CommandDefinition::new("c")
            .flag(FlagDefinition::new("a", "-a").after("b"))
            .flag(FlagDefinition::new("b", "-b").after("a"));
        let err = build(&command, &params(&[("a", true.into()), ("b", true.into())])).unwrap_err();
        assert!(matches!(err, Error::Definition { .. }));
    }

    #[test]
    fn full_ordering_is_independent_of_parameter_order() {
        let command = CommandDefinition::new("encode")
            .subcommand("run")
            .option(OptionDefinition::new("preset", "--preset"))
            .flag(FlagDefinition::new("fast", "--fast"))
            .argument(ArgumentDefinition::new("second").position(1))
            .argument(ArgumentDefinition::new("output").last())
            .argument(ArgumentDefinition::new("first").position(0))
            .post_option(OptionDefinition::new("bitrate", "-b").format(OptionFormat::SingleDashSpace));

        let expected = vec![
            "run", "--preset=slow", "--fast", "one", "two", "-b", "128k", "out.mkv",
        ];
        let entries: Vec<(&str, ParamValue)> = vec![
            ("output", "out.mkv".into()),
            ("bitrate", "128k".into()),
            ("second", "two".into()),
            ("first", "one".into()),
            ("fast", true.into()),
            ("preset", "slow".into()),
        ];
        for rotation in 0..entries.len() {
            let mut rotated = entries.clone();
            rotated.rotate_left(rotation);
            let args = build(&command, &params(&rotated)).expect("args");
            assert_eq!(args, expected);
        }
    }

    #[test]
    fn variadic_arguments_expand_and_check_cardinality() {
        let command = CommandDefinition::new("convert")
            .subcommand("convert")
            .argument(
                ArgumentDefinition::new("inputs")
                    .value_type(ValueType::File)
                    .variadic()
                    .cardinality(1, Some(3)),
            )
            .argument(ArgumentDefinition::new("output").value_type(ValueType::File).last());

        let args = build(
            &command,
            &params(&[("inputs", vec!["a.png", "b.png"].into()), ("output", "out.pdf".into())]),
        )
        .expect("args");
        assert_eq!(args, vec!["convert", "a.png", "b.png", "out.pdf"]);

        let too_many = params(&[
            ("inputs", vec!["a", "b", "c", "d"].into()),
            ("output", "o".into()),
        ]);
        assert!(build(&command, &too_many).is_err());

        let none = params(&[("inputs", Vec::<String>::new().into()), ("output", "o".into())]);
        assert!(build(&command, &none).is_err());
    }

    #[test]
    fn missing_required_argument_fails_without_partial_output() {
        let command = CommandDefinition::new("c")
            .option(OptionDefinition::new("output", "--output"))
            .argument(ArgumentDefinition::new("input"));
        let err = build(&command, &params(&[("output", "x".into())])).unwrap_err();
        assert!(matches!(err, Error::Validation { ref parameter, .. } if parameter == "input"));

        let optional = CommandDefinition::new("c").argument(ArgumentDefinition::new("input").optional());
        assert!(build(&optional, &Params::new()).expect("optional").is_empty());
    }

    #[test]
    fn list_for_non_variadic_argument_is_rejected() {
        let command = CommandDefinition::new("c").argument(ArgumentDefinition::new("input"));
        assert!(build(&command, &params(&[("input", vec!["a", "b"].into())])).is_err());
    }

    #[test]
    fn platform_specific_options_and_flags_are_skipped() {
        let command = CommandDefinition::new("c")
            .option(OptionDefinition::new("dpi", "--dpi").platforms([Platform::Windows]))
            .flag(FlagDefinition::new("mac", "--mac").default_on().platforms([Platform::Macos]))
            .flag(FlagDefinition::new("all", "--all").default_on());
        let args = build(&command, &params(&[("dpi", 300.into())])).expect("args");
        assert_eq!(args, vec!["--all"]);
    }

    #[test]
    fn file_values_use_the_shell_path_format() {
        let command = CommandDefinition::new("c")
            .option(OptionDefinition::new("out", "/Fo").format(OptionFormat::SlashColon).value_type(ValueType::File))
            .argument(ArgumentDefinition::new("input").value_type(ValueType::File));
        let cmd = CmdShell::new();
        let args = ArgumentBuilder::new(&cmd, Platform::Windows)
            .build(
                &command,
                &params(&[("out", "C:/build/out.obj".into()), ("input", "src/main.c".into())]),
            )
            .expect("args");
        assert_eq!(args, vec![r"/Fo:C:\build\out.obj", r"src\main.c"]);
    }

    #[test]
    fn output_is_shell_independent_before_joining() {
        let command = CommandDefinition::new("gs")
            .option(OptionDefinition::new("device", "-sDEVICE").format(OptionFormat::SingleDashEquals));
        let ps = PowerShell::with_program("pwsh");
        let args = ArgumentBuilder::new(&ps, Platform::Linux)
            .build(&command, &params(&[("device", "pdfwrite".into())]))
            .expect("args");
        assert_eq!(args, vec!["-sDEVICE=pdfwrite"]);
        assert_eq!(ps.join("gs", &args), "& 'gs' '-sDEVICE=pdfwrite'");
    }

    #[test]
    fn invalid_option_value_names_the_parameter() {
        let command = CommandDefinition::new("c").option(
            OptionDefinition::new("quality", "-quality")
                .value_type(ValueType::Integer)
                .range(1.0, 100.0),
        );
        let err = build(&command, &params(&[("quality", 0.into())])).unwrap_err();
        assert!(matches!(err, Error::Validation { ref parameter, .. } if parameter == "quality"));
    }
}
