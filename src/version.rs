//! Version probing and constraint checks.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use ukiryu_shell::SpawnPlan;

use crate::cache::TtlLruCache;
use crate::probe::ProbeRunner;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Reported when no detection method produced a match.
pub const UNKNOWN_VERSION: &str = "unknown";

/// How a tool reports its version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionDetection {
    /// Ordered fallbacks; the first that matches wins.
    Methods(Vec<DetectionMethod>),
    /// A single command and pattern.
    Legacy {
        #[serde(deserialize_with = "string_or_seq")]
        command: Vec<String>,
        pattern: String,
    },
}

impl VersionDetection {
    pub fn command(args: impl IntoIterator<Item = impl Into<String>>, pattern: impl Into<String>) -> Self {
        Self::Legacy {
            command: args.into_iter().map(Into::into).collect(),
            pattern: pattern.into(),
        }
    }

    pub fn methods(&self) -> Vec<DetectionMethod> {
        match self {
            Self::Methods(methods) => methods.clone(),
            Self::Legacy { command, pattern } => vec![DetectionMethod::Command {
                args: command.clone(),
                pattern: pattern.clone(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Run the executable with `args` and match its output.
    Command {
        #[serde(deserialize_with = "string_or_seq")]
        args: Vec<String>,
        pattern: String,
    },
    /// Render `man <page>` and match the text.
    ManPage { page: String, pattern: String },
}

impl DetectionMethod {
    fn pattern(&self) -> &str {
        match self {
            Self::Command { pattern, .. } | Self::ManPage { pattern, .. } => pattern,
        }
    }

    fn plan(&self, executable: &Path) -> SpawnPlan {
        match self {
            Self::Command { args, .. } => SpawnPlan::direct(executable.display().to_string(), args),
            Self::ManPage { page, .. } => SpawnPlan::direct(
                "man",
                &["-P".to_string(), "cat".to_string(), page.clone()],
            ),
        }
    }
}

fn string_or_seq<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Repr::deserialize(deserializer)? {
        Repr::One(arg) => arg.split_whitespace().map(str::to_string).collect(),
        Repr::Many(args) => args,
    })
}

/// Runs detection methods against an executable and caches the outcome per
/// path.
#[derive(Debug)]
pub struct VersionDetector {
    runner: Arc<dyn ProbeRunner>,
    cache: TtlLruCache<PathBuf, Option<String>>,
}

impl VersionDetector {
    pub fn new(runner: Arc<dyn ProbeRunner>, cache: TtlLruCache<PathBuf, Option<String>>) -> Self {
        Self { runner, cache }
    }

    /// Detected version, or `None` when every method failed.
    pub async fn detect(&self, executable: &Path, detection: &VersionDetection) -> Option<String> {
        let key = executable.to_path_buf();
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let mut detected = None;
        for method in detection.methods() {
            if let Some(version) = self.try_method(executable, &method).await {
                detected = Some(version);
                break;
            }
        }

        tracing::debug!(
            executable = %executable.display(),
            version = detected.as_deref().unwrap_or(UNKNOWN_VERSION),
            "version detection finished"
        );
        self.cache.insert(key, detected.clone());
        detected
    }

    async fn try_method(&self, executable: &Path, method: &DetectionMethod) -> Option<String> {
        let regex = match Regex::new(method.pattern()) {
            Ok(regex) => regex,
            Err(err) => {
                tracing::warn!(pattern = method.pattern(), error = %err, "invalid version pattern");
                return None;
            }
        };

        let plan = method.plan(executable);
        let output = match self.runner.probe(&plan, PROBE_TIMEOUT).await {
            Ok(output) => output,
            Err(err) => {
                tracing::debug!(program = %plan.program, error = %err, "version probe failed");
                return None;
            }
        };

        // Many tools print their banner on stderr.
        [output.stdout_lossy(), output.stderr_lossy()]
            .iter()
            .find_map(|text| extract_version(&regex, text))
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

/// First capture group when the pattern has one, else the whole match.
pub fn extract_version(regex: &Regex, text: &str) -> Option<String> {
    let captures = regex.captures(text)?;
    captures
        .get(1)
        .or_else(|| captures.get(0))
        .map(|found| found.as_str().trim().to_string())
        .filter(|version| !version.is_empty())
}

/// Numeric components of a version string: leading `v` dropped, digits and
/// dots up to the first other character.
fn numeric_components(version: &str) -> Option<Vec<u64>> {
    let trimmed = version.trim();
    let trimmed = trimmed
        .strip_prefix(['v', 'V'])
        .unwrap_or(trimmed);
    let end = trimmed
        .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
        .unwrap_or(trimmed.len());
    let numeric = trimmed[..end].trim_end_matches('.');
    if numeric.is_empty() {
        return None;
    }
    numeric
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

fn compare_components(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    (0..len)
        .map(|index| {
            let left = a.get(index).copied().unwrap_or(0);
            let right = b.get(index).copied().unwrap_or(0);
            left.cmp(&right)
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Component-wise numeric comparison, zero-padding the shorter side.
/// Unparsable versions sort before parsable ones.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (numeric_components(a), numeric_components(b)) {
        (Some(left), Some(right)) => compare_components(&left, &right),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Ge,
    Gt,
    Le,
    Lt,
    Eq,
    Ne,
    /// `~> 2.4` means `>= 2.4, < 3`; `~> 2.4.1` means `>= 2.4.1, < 2.5`.
    Pessimistic,
}

impl Operator {
    fn symbol(self) -> &'static str {
        match self {
            Self::Ge => ">=",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Lt => "<",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Pessimistic => "~>",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Constraint {
    operator: Operator,
    version: Vec<u64>,
    text: String,
}

impl Constraint {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        const OPERATORS: [(&str, Operator); 8] = [
            (">=", Operator::Ge),
            ("<=", Operator::Le),
            ("==", Operator::Eq),
            ("!=", Operator::Ne),
            ("~>", Operator::Pessimistic),
            (">", Operator::Gt),
            ("<", Operator::Lt),
            ("=", Operator::Eq),
        ];
        let (operator, rest) = OPERATORS
            .iter()
            .find_map(|(symbol, operator)| raw.strip_prefix(symbol).map(|rest| (*operator, rest)))
            .unwrap_or((Operator::Eq, raw));
        let version = numeric_components(rest)?;
        Some(Self {
            operator,
            version,
            text: raw.to_string(),
        })
    }

    /// Exclusive upper bound of `~>`. `None` when the bumped component
    /// would overflow, which leaves the range open.
    fn upper_bound(&self) -> Option<Vec<u64>> {
        let mut bound = self.version.clone();
        if bound.len() >= 2 {
            bound.pop();
        }
        let last = bound.last_mut()?;
        *last = last.checked_add(1)?;
        Some(bound)
    }

    fn is_satisfied_by(&self, installed: &[u64]) -> bool {
        let ordering = compare_components(installed, &self.version);
        match self.operator {
            Operator::Ge => ordering.is_ge(),
            Operator::Gt => ordering.is_gt(),
            Operator::Le => ordering.is_le(),
            Operator::Lt => ordering.is_lt(),
            Operator::Eq => ordering.is_eq(),
            Operator::Ne => ordering.is_ne(),
            Operator::Pessimistic => {
                ordering.is_ge()
                    && self
                        .upper_bound()
                        .is_none_or(|bound| compare_components(installed, &bound).is_lt())
            }
        }
    }
}

/// Outcome of a requirement check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompatibilityReport {
    pub compatible: bool,
    pub reason: String,
}

impl fmt::Display for CompatibilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

pub struct VersionCompatibility;

impl VersionCompatibility {
    /// Check `installed` against a comma-separated constraint list such as
    /// `>= 7.0, < 8`. An empty requirement accepts any version.
    pub fn check(installed: &str, requirement: &str) -> CompatibilityReport {
        let requirement = requirement.trim();
        if requirement.is_empty() {
            return CompatibilityReport {
                compatible: true,
                reason: "no version requirement".to_string(),
            };
        }

        let Some(version) = numeric_components(installed) else {
            return CompatibilityReport {
                compatible: false,
                reason: format!("cannot parse installed version '{installed}'"),
            };
        };

        for raw in requirement.split(',').filter(|part| !part.trim().is_empty()) {
            let Some(constraint) = Constraint::parse(raw) else {
                return CompatibilityReport {
                    compatible: false,
                    reason: format!("cannot parse version constraint '{}'", raw.trim()),
                };
            };
            if !constraint.is_satisfied_by(&version) {
                return CompatibilityReport {
                    compatible: false,
                    reason: format!(
                        "version {installed} does not satisfy '{}' ({} required)",
                        constraint.text,
                        constraint.operator.symbol()
                    ),
                };
            }
        }

        CompatibilityReport {
            compatible: true,
            reason: format!("version {installed} satisfies '{requirement}'"),
        }
    }
}
