//! Typed command definitions.
//!
//! These are produced by whatever loads tool profiles; the core only reads
//! them. Every type deserializes with serde so a profile loader can hand
//! over YAML/JSON/TOML documents directly.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::version::VersionDetection;

/// Parameter values keyed by parameter name, as supplied by the caller.
pub type Params = HashMap<String, ParamValue>;

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<ParamValue>),
}

impl ParamValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Boolean reading used for flags: `true`, non-zero numbers and the
    /// strings `true`/`yes`/`on`/`1` are truthy.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Null => Some(false),
            Self::Bool(value) => Some(*value),
            Self::Integer(value) => Some(*value != 0),
            Self::String(value) => match value.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" | "" => Some(false),
                _ => None,
            },
            Self::Float(_) | Self::List(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::String(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Float(value) if value.fract() == 0.0 => Some(*value as i64),
            Self::String(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ParamValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Scalar rendered as it appears on a command line.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::String(value) => f.write_str(value),
            Self::List(items) => {
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for ParamValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null | serde_json::Value::Object(_) => Self::Null,
            serde_json::Value::Bool(value) => Self::Bool(value),
            serde_json::Value::Number(number) => number
                .as_i64()
                .map(Self::Integer)
                .or_else(|| number.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            serde_json::Value::String(value) => Self::String(value),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from).collect())
            }
        }
    }
}

/// How an option's flag and value are laid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionFormat {
    /// `--name=value`
    #[default]
    DoubleDashEquals,
    /// `--name value`
    DoubleDashSpace,
    /// `-name=value`
    SingleDashEquals,
    /// `-name value`
    SingleDashSpace,
    /// `/name:value`
    SlashColon,
    /// `/name value`
    SlashSpace,
}

impl OptionFormat {
    pub fn is_space_separated(self) -> bool {
        matches!(
            self,
            Self::DoubleDashSpace | Self::SingleDashSpace | Self::SlashSpace
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
    File,
    /// One of a declared set of values.
    Symbol,
    Array,
}

fn default_separator() -> String {
    "=".to_string()
}

fn default_delimiter() -> String {
    ",".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDefinition {
    pub name: String,
    pub cli: String,
    #[serde(default)]
    pub format: OptionFormat,
    /// Joins `cli` and the value in the `*_equals` formats.
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Joins the elements of an array value.
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default, rename = "type", alias = "value_type")]
    pub value_type: ValueType,
    /// Element type when `value_type` is `array`.
    #[serde(default)]
    pub element_type: Option<ValueType>,
    #[serde(default)]
    pub range: Option<(f64, f64)>,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub description: Option<String>,
}

impl OptionDefinition {
    pub fn new(name: impl Into<String>, cli: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cli: cli.into(),
            format: OptionFormat::default(),
            separator: default_separator(),
            delimiter: default_delimiter(),
            value_type: ValueType::default(),
            element_type: None,
            range: None,
            values: Vec::new(),
            pattern: None,
            platforms: Vec::new(),
            description: None,
        }
    }

    pub fn format(mut self, format: OptionFormat) -> Self {
        self.format = format;
        self
    }

    pub fn value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    pub fn values(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn platforms(mut self, platforms: impl IntoIterator<Item = Platform>) -> Self {
        self.platforms = platforms.into_iter().collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagDefinition {
    pub name: String,
    pub cli: String,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub platforms: Vec<Platform>,
    /// Emit this flag after the named flag.
    #[serde(default)]
    pub after: Option<String>,
    /// Emit this flag before the named flag.
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub conflicts_with: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl FlagDefinition {
    pub fn new(name: impl Into<String>, cli: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cli: cli.into(),
            default: false,
            platforms: Vec::new(),
            after: None,
            before: None,
            conflicts_with: Vec::new(),
            description: None,
        }
    }

    pub fn default_on(mut self) -> Self {
        self.default = true;
        self
    }

    pub fn after(mut self, flag: impl Into<String>) -> Self {
        self.after = Some(flag.into());
        self
    }

    pub fn before(mut self, flag: impl Into<String>) -> Self {
        self.before = Some(flag.into());
        self
    }

    pub fn conflicts_with(mut self, flag: impl Into<String>) -> Self {
        self.conflicts_with.push(flag.into());
        self
    }

    pub fn platforms(mut self, platforms: impl IntoIterator<Item = Platform>) -> Self {
        self.platforms = platforms.into_iter().collect();
        self
    }
}

/// Where a positional argument goes: a numeric slot, or after everything
/// else (`last`, usually an output path).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArgPosition {
    Index(usize),
    Last,
}

impl Serialize for ArgPosition {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Index(index) => serializer.serialize_u64(*index as u64),
            Self::Last => serializer.serialize_str("last"),
        }
    }
}

impl<'de> Deserialize<'de> for ArgPosition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Index(usize),
            Name(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Index(index) => Ok(Self::Index(index)),
            Repr::Name(name) if name.eq_ignore_ascii_case("last") => Ok(Self::Last),
            Repr::Name(name) => name.trim().parse().map(Self::Index).map_err(|_| {
                serde::de::Error::custom(format!(
                    "invalid argument position '{name}' (expected a number or \"last\")"
                ))
            }),
        }
    }
}

const fn default_min() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentDefinition {
    pub name: String,
    #[serde(default, rename = "type", alias = "value_type")]
    pub value_type: ValueType,
    /// Declaration order is used when omitted.
    #[serde(default)]
    pub position: Option<ArgPosition>,
    /// Expand a list value into one token per element.
    #[serde(default)]
    pub variadic: bool,
    /// Minimum number of values; zero makes the argument optional.
    #[serde(default = "default_min")]
    pub min: usize,
    #[serde(default)]
    pub max: Option<usize>,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub range: Option<(f64, f64)>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ArgumentDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type: ValueType::default(),
            position: None,
            variadic: false,
            min: default_min(),
            max: None,
            values: Vec::new(),
            pattern: None,
            range: None,
            description: None,
        }
    }

    pub fn value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn position(mut self, index: usize) -> Self {
        self.position = Some(ArgPosition::Index(index));
        self
    }

    pub fn last(mut self) -> Self {
        self.position = Some(ArgPosition::Last);
        self
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn cardinality(mut self, min: usize, max: Option<usize>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn optional(self) -> Self {
        let max = self.max;
        self.cardinality(0, max)
    }

    pub fn is_last(&self) -> bool {
        self.position == Some(ArgPosition::Last)
    }
}

/// An environment variable set for the child process, either literally
/// or from a parameter's value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVarDefinition {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub from_param: Option<String>,
    #[serde(default)]
    pub platforms: Vec<Platform>,
}

impl EnvVarDefinition {
    /// Value for this variable given the caller's parameters, if any.
    pub fn resolve(&self, params: &Params) -> Option<String> {
        if let Some(param) = &self.from_param
            && let Some(value) = params.get(param).filter(|value| !value.is_null())
        {
            return Some(value.render());
        }
        self.value.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDefinition {
    pub name: String,
    /// Leading token(s) such as `convert` or `remote add`.
    #[serde(default)]
    pub subcommand: Option<String>,
    #[serde(default)]
    pub options: Vec<OptionDefinition>,
    #[serde(default)]
    pub flags: Vec<FlagDefinition>,
    #[serde(default)]
    pub arguments: Vec<ArgumentDefinition>,
    /// Options emitted after positional input but before the `last` argument.
    #[serde(default)]
    pub post_options: Vec<OptionDefinition>,
    #[serde(default)]
    pub env_vars: Vec<EnvVarDefinition>,
    #[serde(default)]
    pub description: Option<String>,
}

impl CommandDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subcommand: None,
            options: Vec::new(),
            flags: Vec::new(),
            arguments: Vec::new(),
            post_options: Vec::new(),
            env_vars: Vec::new(),
            description: None,
        }
    }

    pub fn subcommand(mut self, subcommand: impl Into<String>) -> Self {
        self.subcommand = Some(subcommand.into());
        self
    }

    pub fn option(mut self, option: OptionDefinition) -> Self {
        self.options.push(option);
        self
    }

    pub fn flag(mut self, flag: FlagDefinition) -> Self {
        self.flags.push(flag);
        self
    }

    pub fn argument(mut self, argument: ArgumentDefinition) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn post_option(mut self, option: OptionDefinition) -> Self {
        self.post_options.push(option);
        self
    }

    pub fn env_var(mut self, env_var: EnvVarDefinition) -> Self {
        self.env_vars.push(env_var);
        self
    }

    /// Effective position of each argument: explicit, or declaration index.
    pub fn argument_positions(&self) -> Vec<(ArgPosition, &ArgumentDefinition)> {
        self.arguments
            .iter()
            .enumerate()
            .map(|(index, argument)| {
                (argument.position.unwrap_or(ArgPosition::Index(index)), argument)
            })
            .collect()
    }

    pub fn last_argument(&self) -> Option<&ArgumentDefinition> {
        self.arguments.iter().find(|argument| argument.is_last())
    }

    /// Every parameter name this command understands.
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.options
            .iter()
            .chain(&self.post_options)
            .map(|option| option.name.as_str())
            .chain(self.flags.iter().map(|flag| flag.name.as_str()))
            .chain(self.arguments.iter().map(|argument| argument.name.as_str()))
    }

    /// Check the structural invariants a loader cannot express in types.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| Err(Error::definition(&self.name, reason));

        let last_count = self.arguments.iter().filter(|arg| arg.is_last()).count();
        if last_count > 1 {
            return fail(format!("{last_count} arguments are marked last; at most one is allowed"));
        }

        let mut positions = HashSet::new();
        for (position, argument) in self.argument_positions() {
            if let ArgPosition::Index(index) = position
                && !positions.insert(index)
            {
                return fail(format!(
                    "argument '{}' reuses position {index}",
                    argument.name
                ));
            }
            if argument.max.is_some_and(|max| max < argument.min) {
                return fail(format!("argument '{}' has max below min", argument.name));
            }
        }

        let mut names = HashSet::new();
        for name in self.parameter_names() {
            if !names.insert(name) {
                return fail(format!("parameter '{name}' is declared more than once"));
            }
        }

        for option in self.options.iter().chain(&self.post_options) {
            if option.cli.trim().is_empty() {
                return fail(format!("option '{}' has an empty cli string", option.name));
            }
            if let Some(pattern) = &option.pattern
                && let Err(err) = crate::validation::compiled_pattern(pattern)
            {
                return fail(format!("option '{}' has an invalid pattern: {err}", option.name));
            }
        }

        let flag_names: HashSet<&str> = self.flags.iter().map(|flag| flag.name.as_str()).collect();
        for flag in &self.flags {
            let referenced = flag
                .after
                .iter()
                .chain(&flag.before)
                .chain(&flag.conflicts_with);
            for other in referenced {
                if !flag_names.contains(other.as_str()) {
                    return fail(format!(
                        "flag '{}' refers to undeclared flag '{other}'",
                        flag.name
                    ));
                }
            }
        }

        for env_var in &self.env_vars {
            match (&env_var.value, &env_var.from_param) {
                (None, None) => {
                    return fail(format!(
                        "env var '{}' needs a value or from_param",
                        env_var.name
                    ));
                }
                (_, Some(param)) if !names.contains(param.as_str()) => {
                    return fail(format!(
                        "env var '{}' reads undeclared parameter '{param}'",
                        env_var.name
                    ));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// A wrapped tool: how to find it, how to check its version, and its
/// commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    /// Executable name when it differs from `name` (e.g. `gs` for ghostscript).
    #[serde(default)]
    pub executable: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub version_detection: Option<VersionDetection>,
    /// Comma-separated constraints such as `>= 7.0, < 8`.
    #[serde(default)]
    pub version_requirement: Option<String>,
    #[serde(default)]
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub commands: Vec<CommandDefinition>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executable: None,
            aliases: Vec::new(),
            version_detection: None,
            version_requirement: None,
            platforms: Vec::new(),
            commands: Vec::new(),
        }
    }

    pub fn executable_name(&self) -> &str {
        self.executable.as_deref().unwrap_or(&self.name)
    }

    pub fn command(&self, name: &str) -> Option<&CommandDefinition> {
        self.commands.iter().find(|command| command.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        self.commands.iter().try_for_each(CommandDefinition::validate)
    }
}
