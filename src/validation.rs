//! Value checks applied while building arguments.

use std::collections::HashMap;
use std::sync::LazyLock;

use parking_lot::RwLock;
use regex::Regex;

use crate::definition::{ArgumentDefinition, OptionDefinition, ParamValue, ValueType};
use crate::error::{Error, Result};

/// Patterns compiled so far, keyed by source. Definitions declare a small
/// fixed set, so the map stays small.
static PATTERNS: LazyLock<RwLock<HashMap<String, Regex>>> = LazyLock::new(Default::default);

/// Compiled form of `pattern`, built on first use. `Regex` clones share
/// the compiled program.
pub fn compiled_pattern(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    if let Some(regex) = PATTERNS.read().get(pattern) {
        return Ok(regex.clone());
    }
    let regex = Regex::new(pattern)?;
    PATTERNS
        .write()
        .entry(pattern.to_string())
        .or_insert_with(|| regex.clone());
    Ok(regex)
}

/// Constraints declared for one parameter.
#[derive(Debug, Clone, Copy)]
pub struct Constraints<'a> {
    pub value_type: ValueType,
    pub element_type: Option<ValueType>,
    pub range: Option<(f64, f64)>,
    pub values: &'a [String],
    pub pattern: Option<&'a str>,
}

impl<'a> From<&'a OptionDefinition> for Constraints<'a> {
    fn from(option: &'a OptionDefinition) -> Self {
        Self {
            value_type: option.value_type,
            element_type: option.element_type,
            range: option.range,
            values: &option.values,
            pattern: option.pattern.as_deref(),
        }
    }
}

impl<'a> From<&'a ArgumentDefinition> for Constraints<'a> {
    fn from(argument: &'a ArgumentDefinition) -> Self {
        Self {
            value_type: argument.value_type,
            element_type: None,
            range: argument.range,
            values: &argument.values,
            pattern: argument.pattern.as_deref(),
        }
    }
}

impl Constraints<'_> {
    /// Constraints for the elements of an array value.
    fn for_elements(self) -> Self {
        Self {
            value_type: self.element_type.unwrap_or(ValueType::String),
            element_type: None,
            ..self
        }
    }
}

/// Validate `value` for parameter `name`.
pub fn validate_value(name: &str, value: &ParamValue, constraints: Constraints<'_>) -> Result<()> {
    if constraints.value_type == ValueType::Array {
        let elements = constraints.for_elements();
        return match value {
            ParamValue::List(items) => items
                .iter()
                .try_for_each(|item| validate_value(name, item, elements)),
            scalar => validate_value(name, scalar, elements),
        };
    }

    if let ParamValue::List(_) = value {
        return Err(Error::validation(name, "expected a single value, got a list"));
    }
    check_type(name, value, constraints.value_type)?;

    if let Some((min, max)) = constraints.range {
        let number = value
            .as_f64()
            .ok_or_else(|| Error::validation(name, format!("'{value}' is not numeric")))?;
        if number < min || number > max {
            return Err(Error::validation(
                name,
                format!("{number} is outside the range {min}..={max}"),
            ));
        }
    }

    let rendered = value.render();
    if !constraints.values.is_empty() && !constraints.values.iter().any(|allowed| *allowed == rendered) {
        return Err(Error::validation(
            name,
            format!(
                "'{rendered}' is not one of: {}",
                constraints.values.join(", ")
            ),
        ));
    }

    if let Some(pattern) = constraints.pattern {
        let regex = compiled_pattern(pattern)
            .map_err(|err| Error::validation(name, format!("invalid pattern '{pattern}': {err}")))?;
        if !regex.is_match(&rendered) {
            return Err(Error::validation(
                name,
                format!("'{rendered}' does not match pattern '{pattern}'"),
            ));
        }
    }

    Ok(())
}

fn check_type(name: &str, value: &ParamValue, value_type: ValueType) -> Result<()> {
    let ok = match value_type {
        ValueType::Integer => value.as_i64().is_some(),
        ValueType::Float => value.as_f64().is_some(),
        ValueType::Boolean => value.as_bool().is_some(),
        ValueType::File => matches!(value, ParamValue::String(path) if !path.is_empty()),
        ValueType::String | ValueType::Symbol => !matches!(value, ParamValue::Null),
        ValueType::Array => true,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::validation(
            name,
            format!("expected {}, got '{value}'", type_name(value_type)),
        ))
    }
}

fn type_name(value_type: ValueType) -> &'static str {
    match value_type {
        ValueType::String => "a string",
        ValueType::Integer => "an integer",
        ValueType::Float => "a number",
        ValueType::Boolean => "a boolean",
        ValueType::File => "a file path",
        ValueType::Symbol => "one of the declared values",
        ValueType::Array => "a list",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::OptionDefinition;

    fn reason(result: Result<()>) -> String {
        match result {
            Err(Error::Validation { reason, .. }) => reason,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn integer_range_is_enforced() {
        let option = OptionDefinition::new("quality", "-quality")
            .value_type(ValueType::Integer)
            .range(1.0, 100.0);
        assert!(validate_value("quality", &ParamValue::from(85), (&option).into()).is_ok());
        assert!(validate_value("quality", &ParamValue::from("90"), (&option).into()).is_ok());
        let why = reason(validate_value("quality", &ParamValue::from(101), (&option).into()));
        assert!(why.contains("outside the range"));
        let why = reason(validate_value("quality", &ParamValue::from("high"), (&option).into()));
        assert!(why.contains("an integer"));
    }

    #[test]
    fn symbol_values_are_enforced() {
        let option = OptionDefinition::new("device", "-sDEVICE")
            .value_type(ValueType::Symbol)
            .values(["pdfwrite", "png16m"]);
        assert!(validate_value("device", &"png16m".into(), (&option).into()).is_ok());
        let why = reason(validate_value("device", &"jpeg".into(), (&option).into()));
        assert!(why.contains("pdfwrite, png16m"));
    }

    #[test]
    fn pattern_is_matched_against_rendered_value() {
        let mut option = OptionDefinition::new("geometry", "-resize");
        option.pattern = Some(r"^\d+x\d+$".to_string());
        assert!(validate_value("geometry", &"800x600".into(), (&option).into()).is_ok());
        assert!(validate_value("geometry", &"big".into(), (&option).into()).is_err());
    }

    #[test]
    fn patterns_compile_once_and_are_reused() {
        let source = r"^ukiryu-\d+$";
        let mut option = OptionDefinition::new("tag", "--tag");
        option.pattern = Some(source.to_string());
        for value in ["ukiryu-1", "ukiryu-22"] {
            assert!(validate_value("tag", &value.into(), (&option).into()).is_ok());
        }
        assert!(PATTERNS.read().contains_key(source));

        assert!(compiled_pattern("(unclosed").is_err());
        assert!(!PATTERNS.read().contains_key("(unclosed"));
    }

    #[test]
    fn arrays_validate_each_element() {
        let mut option = OptionDefinition::new("pages", "--pages").value_type(ValueType::Array);
        option.element_type = Some(ValueType::Integer);
        assert!(validate_value("pages", &vec![1, 2, 3].into(), (&option).into()).is_ok());
        assert!(validate_value("pages", &vec!["1", "x"].into(), (&option).into()).is_err());
    }

    #[test]
    fn scalar_types_reject_lists() {
        let option = OptionDefinition::new("output", "--output");
        let why = reason(validate_value("output", &vec!["a", "b"].into(), (&option).into()));
        assert!(why.contains("single value"));
    }

    #[test]
    fn file_values_must_be_non_empty_strings() {
        let option = OptionDefinition::new("input", "-i").value_type(ValueType::File);
        assert!(validate_value("input", &"in.png".into(), (&option).into()).is_ok());
        assert!(validate_value("input", &"".into(), (&option).into()).is_err());
        assert!(validate_value("input", &ParamValue::from(3), (&option).into()).is_err());
    }
}
