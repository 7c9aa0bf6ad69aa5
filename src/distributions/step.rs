use serde_json::Value;
use std::collections::HashMap;

use super::{parse_float_field, Distribution, Metadata, ParamSpec};

/// A step function: `rate(t)` is the rate of the last `(time, rate)` step
/// whose `time <= t`, or `default_rps` before the first step.
#[derive(Debug, Default)]
pub struct StepDistribution {
    steps: Vec<(f64, f64)>,
    default_rps: f64,
    parse_error: bool,
}

fn parse_steps(value: &Value) -> Result<Vec<(f64, f64)>, ()> {
    let raw = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items.clone(),
        Value::String(s) => {
            let parsed: Value = serde_json::from_str(s).map_err(|_| ())?;
            match parsed {
                Value::Array(items) => items,
                _ => return Err(()),
            }
        }
        _ => return Err(()),
    };

    let mut steps = Vec::with_capacity(raw.len());
    for item in raw {
        let pair = item.as_array().ok_or(())?;
        if pair.len() != 2 {
            return Err(());
        }
        let time = pair[0].as_f64().ok_or(())?;
        let rate = pair[1].as_f64().ok_or(())?;
        steps.push((time, rate));
    }
    steps.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    Ok(steps)
}

impl Distribution for StepDistribution {
    fn metadata(&self) -> Metadata {
        let mut parameters = HashMap::new();
        parameters.insert(
            "steps",
            ParamSpec {
                param_type: "str",
                default: None,
                description: "JSON array of [time_seconds, rps] pairs, time strictly increasing",
                required: false,
            },
        );
        parameters.insert(
            "default_rps",
            ParamSpec {
                param_type: "float",
                default: Some(Value::from(0.0)),
                description: "Rate used before the first step's time",
                required: false,
            },
        );
        Metadata {
            name: "step",
            version: "1.0",
            description: "Piecewise-constant rate defined by explicit time/rps steps",
            parameters,
        }
    }

    fn initialize(&mut self, config: &Value) {
        let (default_rps, default_ok) = parse_float_field(config, "default_rps", 0.0);
        self.default_rps = default_rps;
        match config.get("steps") {
            None | Some(Value::Null) => {
                self.steps = Vec::new();
                self.parse_error = !default_ok;
            }
            Some(v) => match parse_steps(v) {
                Ok(steps) => {
                    self.steps = steps;
                    self.parse_error = !default_ok;
                }
                Err(()) => {
                    self.steps = Vec::new();
                    self.parse_error = true;
                }
            },
        }
    }

    fn validate(&self) -> bool {
        if self.parse_error || self.default_rps < 0.0 {
            return false;
        }
        let mut prev_time = -1.0;
        for &(time, rate) in &self.steps {
            if time < 0.0 || rate < 0.0 || time <= prev_time {
                return false;
            }
            prev_time = time;
        }
        true
    }

    fn get_rate(&self, elapsed_seconds: f64, target_rps: f64) -> f64 {
        if self.parse_error {
            return target_rps.max(0.0);
        }
        if self.steps.is_empty() {
            return self.default_rps.max(0.0);
        }
        let mut rate = self.default_rps;
        for &(time, step_rate) in &self.steps {
            if time <= elapsed_seconds {
                rate = step_rate;
            } else {
                break;
            }
        }
        rate.max(0.0)
    }
}
