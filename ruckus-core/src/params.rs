//! Global parameters shared by every chaos action.
//!
//! [`GlobalParams`] is built once per CLI invocation and passed by value
//! into each action constructor.

use std::time::Duration;

use crate::error::ValidationError;
use crate::selector::{LabelFilter, SelectionCriteria};

/// Prefix that marks a positional argument as an RE2 name pattern.
pub const PATTERN_PREFIX: &str = "re2:";

/// Options that apply to every action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalParams {
    /// Collapse the target set to one randomly chosen container.
    pub random: bool,
    /// Label filters (all must match).
    pub labels: Vec<LabelFilter>,
    /// Exact container names.
    pub names: Vec<String>,
    /// RE2 name pattern (exclusive with `names`).
    pub pattern: Option<String>,
    /// Repeat interval; `None` runs once.
    pub interval: Option<Duration>,
    /// Log intended engine calls without making them.
    pub dry_run: bool,
    /// Keep ticking when a cycle fails.
    pub skip_errors: bool,
}

impl GlobalParams {
    /// Selection criteria for these params with an optional limit.
    pub fn criteria(&self, limit: usize) -> SelectionCriteria {
        SelectionCriteria {
            names: self.names.clone(),
            pattern: self.pattern.clone(),
            labels: self.labels.clone(),
            limit,
        }
    }
}

/// Split positional arguments into a name list or a single pattern.
///
/// One argument starting with `re2:` is a pattern; otherwise every argument
/// is a name. No arguments selects every container.
pub fn names_or_pattern(args: &[String]) -> (Vec<String>, Option<String>) {
    match args {
        [single] if single.starts_with(PATTERN_PREFIX) => {
            (Vec::new(), Some(single[PATTERN_PREFIX.len()..].to_string()))
        }
        _ => (args.to_vec(), None),
    }
}

/// Parse `--label` values; each value may hold a comma-separated list.
pub fn parse_labels(values: &[String]) -> Result<Vec<LabelFilter>, ValidationError> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse())
        .collect()
}

/// Effect duration must be positive and strictly shorter than the interval.
pub fn check_duration_within_interval(
    duration: Duration,
    interval: Option<Duration>,
) -> Result<(), ValidationError> {
    if duration.is_zero() {
        return Err(ValidationError::MissingDuration);
    }
    match interval {
        Some(interval) if duration >= interval => {
            Err(ValidationError::DurationNotBelowInterval { duration, interval })
        }
        _ => Ok(()),
    }
}

/// Parse a duration such as `300ms`, `10s`, `1m30s` or `1.5h`.
///
/// Units: `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`. A bare `0` is zero.
pub fn parse_duration(s: &str) -> Result<Duration, ValidationError> {
    let invalid = || ValidationError::InvalidDuration(s.to_string());
    let input = s.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    if input.is_empty() {
        return Err(invalid());
    }

    let mut rest = input;
    let mut total_nanos = 0f64;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let value: f64 = rest[..num_len].parse().map_err(|_| invalid())?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];
        total_nanos += value * nanos_per_unit;
    }

    Ok(Duration::from_nanos(total_nanos.round() as u64))
}
