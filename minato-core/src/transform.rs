//! Pure transforms from raw HL7 field text to typed FHIR fragments.
//!
//! Every transform is total: bad input produces absence (`None`), never
//! a panic and never a guessed value. Absence tells the mapping engine
//! to omit the FHIR path, which is the safe rendition of "I don't know".

use serde::Deserialize;
use serde_json::{Value, json};

/// Named transform referenced by mapping rules.
///
/// The names are part of the spec-file contract; an unknown name fails
/// deserialization, which makes it a load-time configuration error
/// rather than a per-message one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    Date,
    DateTime,
    Gender,
    Identifier,
    Quantity,
}

/// Message- and rule-level context a transform may need.
pub struct TransformContext<'a> {
    /// Component separator declared by the message header.
    pub component: char,
    /// Identifier system used when the source field carries none.
    pub default_system: &'a str,
}

impl Transform {
    /// Apply to a resolved value.
    ///
    /// Absent input yields absent output, except `gender`, which maps
    /// absence to `"unknown"`.
    pub fn apply(self, raw: Option<&str>, context: &TransformContext<'_>) -> Option<Value> {
        match self {
            Transform::Date => date(raw?),
            Transform::DateTime => date_time(raw?),
            Transform::Gender => Some(Value::String(gender(raw).to_string())),
            Transform::Identifier => identifier(raw?, context),
            Transform::Quantity => quantity(raw?),
        }
    }
}

/// `YYYYMMDD…` → `YYYY-MM-DD`. Fewer than 8 digits (after stripping
/// non-digits) is absent, never a guess.
pub fn date(raw: &str) -> Option<Value> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 8 {
        return None;
    }
    Some(Value::String(format!(
        "{}-{}-{}",
        &digits[0..4],
        &digits[4..6],
        &digits[6..8]
    )))
}

/// `YYYYMMDDHHMMSS…` → `YYYY-MM-DDTHH:MM:SSZ`.
///
/// Digit pairs past the date fill hour, minute and second; missing
/// trailing pairs default to `00`. The trailing `Z` is a fixed
/// simplifying assumption, not a timezone read from the input.
pub fn date_time(raw: &str) -> Option<Value> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 8 {
        return None;
    }
    let pair = |start: usize| {
        if digits.len() >= start + 2 {
            &digits[start..start + 2]
        } else {
            "00"
        }
    };
    Some(Value::String(format!(
        "{}-{}-{}T{}:{}:{}Z",
        &digits[0..4],
        &digits[4..6],
        &digits[6..8],
        pair(8),
        pair(10),
        pair(12)
    )))
}

/// Administrative sex: case-insensitive `M`/`F`; anything else,
/// absence included, is `"unknown"`.
pub fn gender(raw: Option<&str>) -> &'static str {
    match raw.map(str::trim) {
        Some(code) if code.eq_ignore_ascii_case("M") => "male",
        Some(code) if code.eq_ignore_ascii_case("F") => "female",
        _ => "unknown",
    }
}

/// CX-style identifier: component 1 is the value, component 4 the
/// assigning authority; the rule's default system stands in when the
/// field carries none. Absent when the field or its value component is
/// empty.
pub fn identifier(raw: &str, context: &TransformContext<'_>) -> Option<Value> {
    let value = raw.split(context.component).next().unwrap_or("");
    if value.is_empty() {
        return None;
    }
    let system = raw
        .split(context.component)
        .nth(3)
        .filter(|s| !s.is_empty())
        .unwrap_or(context.default_system);
    Some(json!({ "system": system, "value": value }))
}

/// Numeric parse; absent (not zero, not NaN) on failure so callers omit
/// the path instead of emitting a corrupted value.
pub fn quantity(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Some(Value::Number(integer.into()));
    }
    let float: f64 = trimmed.parse().ok()?;
    serde_json::Number::from_f64(float).map(Value::Number)
}
