use serde_json::Value;
use std::collections::HashMap;

use super::{parse_float_field, Distribution, Metadata, ParamSpec};

/// Ramps linearly from 0 to `target_rps` over `ramp_duration` seconds, then
/// holds at `target_rps`.
#[derive(Debug)]
pub struct LinearDistribution {
    ramp_duration: f64,
    parse_error: bool,
}

impl Default for LinearDistribution {
    fn default() -> Self {
        Self {
            ramp_duration: 60.0,
            parse_error: false,
        }
    }
}

impl Distribution for LinearDistribution {
    fn metadata(&self) -> Metadata {
        let mut parameters = HashMap::new();
        parameters.insert(
            "ramp_duration",
            ParamSpec {
                param_type: "float",
                default: Some(Value::from(60.0)),
                description: "Seconds to ramp from 0 to target_rps",
                required: false,
            },
        );
        Metadata {
            name: "linear",
            version: "1.0",
            description: "Linear ramp from 0 to target_rps",
            parameters,
        }
    }

    fn initialize(&mut self, config: &Value) {
        let (ramp_duration, ok) = parse_float_field(config, "ramp_duration", 60.0);
        self.ramp_duration = ramp_duration;
        self.parse_error = !ok;
    }

    fn validate(&self) -> bool {
        !self.parse_error && self.ramp_duration > 0.0
    }

    fn get_rate(&self, elapsed_seconds: f64, target_rps: f64) -> f64 {
        if self.ramp_duration <= 0.0 || elapsed_seconds >= self.ramp_duration {
            return target_rps.max(0.0);
        }
        ((elapsed_seconds / self.ramp_duration) * target_rps).max(0.0)
    }
}
