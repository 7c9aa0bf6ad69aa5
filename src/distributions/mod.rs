//! Rate-shape evaluators: pluggable functions of elapsed time producing a
//! requests-per-second value for the dispatcher's token bucket.
//!
//! Each shape is a small state machine: `initialize` parses a JSON config
//! map into typed fields (recording a parse-error flag rather than failing
//! outright — a malformed shape still has to answer `validate()` with
//! `false`), `validate` checks the parsed fields are in range, and
//! `get_rate` is the pure (poisson excepted) per-tick evaluation.

mod constant;
mod linear;
mod mix;
mod poisson;
mod sequence;
mod sine;
mod step;
pub mod validation;

pub use constant::ConstantDistribution;
pub use linear::LinearDistribution;
pub use mix::MixDistribution;
pub use poisson::PoissonDistribution;
pub use sequence::SequenceDistribution;
pub use sine::SineDistribution;
pub use step::StepDistribution;

use serde_json::Value;
use std::collections::HashMap;

/// One entry in a shape's parameter schema.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub param_type: &'static str,
    pub default: Option<Value>,
    pub description: &'static str,
    pub required: bool,
}

/// Static metadata describing a shape: name, version, description, and its
/// parameter schema (name -> spec).
#[derive(Debug, Clone)]
pub struct Metadata {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub parameters: HashMap<&'static str, ParamSpec>,
}

/// A rate-shape instance. Created per-run from a named factory in
/// [`crate::registry::ShapeRegistry`], configured once via `initialize`,
/// then polled every dispatcher tick via `get_rate`.
pub trait Distribution: Send + Sync {
    fn metadata(&self) -> Metadata;

    /// Parses `config` into this shape's fields. Malformed required numeric
    /// fields set an internal parse-error flag (queryable via `validate`)
    /// rather than returning an error — a shape is always constructible,
    /// only sometimes valid.
    fn initialize(&mut self, config: &Value);

    /// Whether this shape's parsed configuration is usable. Does not imply
    /// `get_rate` will panic if false — callers are expected to check this
    /// before dispatching a run.
    fn validate(&self) -> bool;

    /// Evaluates the shape at `elapsed_seconds` given the run's
    /// `target_rps`. Always non-negative; never panics, even with an
    /// invalid configuration (falls back to `target_rps`).
    fn get_rate(&self, elapsed_seconds: f64, target_rps: f64) -> f64;
}

pub type ShapeFactory = fn() -> Box<dyn Distribution>;

/// Parses a single config value into `(value, ok)`, mirroring the
/// original `parse_float`: `None`/absent is always valid and falls back to
/// `default`; booleans are explicitly rejected (never coerced to 0/1);
/// numbers and decimal strings are accepted; anything else is invalid.
pub fn parse_float_field(config: &Value, key: &str, default: f64) -> (f64, bool) {
    match config.get(key) {
        None | Some(Value::Null) => (default, true),
        Some(Value::Bool(_)) => (default, false),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) => (v, true),
            None => (default, false),
        },
        Some(Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(v) => (v, true),
            Err(_) => (default, false),
        },
        Some(_) => (default, false),
    }
}

/// Same coercion rules as [`parse_float_field`] but for an optional field
/// with no default — returns `(None, true)` when absent, `(Some(v), true)`
/// on a valid numeric value, `(None, false)` on a malformed one.
pub fn parse_optional_float_field(config: &Value, key: &str) -> (Option<f64>, bool) {
    match config.get(key) {
        None | Some(Value::Null) => (None, true),
        Some(Value::Bool(_)) => (None, false),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) => (Some(v), true),
            None => (None, false),
        },
        Some(Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(v) => (Some(v), true),
            Err(_) => (None, false),
        },
        Some(_) => (None, false),
    }
}

/// Coerces a value to a positive-checkable float for validation helpers
/// that accept a raw `serde_json::Value` directly (used by composite
/// validation, which works over unparsed JSON rather than an initialized
/// shape). Explicitly rejects booleans, matching `to_float`.
pub fn value_to_float(value: &Value, default: f64) -> f64 {
    match value {
        Value::Bool(_) => default,
        Value::Number(n) => n.as_f64().unwrap_or(default),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(default),
        _ => default,
    }
}

/// Accepts a JSON array directly, or a string containing a JSON-encoded
/// array, mirroring `parse_json_or_list`. Absent/null is an empty list;
/// anything else is a parse error.
pub fn parse_json_or_list(value: Option<&Value>) -> Result<Vec<Value>, ()> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => Ok(items),
            _ => Err(()),
        },
        Some(_) => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_float_field_none_is_valid_default() {
        let (v, ok) = parse_float_field(&json!({}), "rps", 5.0);
        assert_eq!(v, 5.0);
        assert!(ok);
    }

    #[test]
    fn parse_float_field_rejects_bool() {
        let (v, ok) = parse_float_field(&json!({"rps": true}), "rps", 5.0);
        assert_eq!(v, 5.0);
        assert!(!ok);
    }

    #[test]
    fn parse_float_field_accepts_numeric_string() {
        let (v, ok) = parse_float_field(&json!({"rps": "12.5"}), "rps", 5.0);
        assert_eq!(v, 12.5);
        assert!(ok);
    }

    #[test]
    fn parse_float_field_rejects_malformed_string() {
        let (v, ok) = parse_float_field(&json!({"rps": "abc"}), "rps", 5.0);
        assert_eq!(v, 5.0);
        assert!(!ok);
    }
}
