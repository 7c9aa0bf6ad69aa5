use serde_json::Value;
use std::collections::HashMap;

use super::{parse_optional_float_field, Distribution, Metadata, ParamSpec};

/// Holds rate constant regardless of elapsed time; falls back to
/// `target_rps` when `rps` isn't configured.
#[derive(Debug, Default)]
pub struct ConstantDistribution {
    rps: Option<f64>,
    parse_error: bool,
}

impl Distribution for ConstantDistribution {
    fn metadata(&self) -> Metadata {
        let mut parameters = HashMap::new();
        parameters.insert(
            "rps",
            ParamSpec {
                param_type: "float",
                default: None,
                description: "Fixed requests per second; falls back to target_rps if unset",
                required: false,
            },
        );
        Metadata {
            name: "constant",
            version: "1.0",
            description: "Constant rate, time-invariant",
            parameters,
        }
    }

    fn initialize(&mut self, config: &Value) {
        let (rps, ok) = parse_optional_float_field(config, "rps");
        self.rps = rps;
        self.parse_error = !ok;
    }

    fn validate(&self) -> bool {
        if self.parse_error {
            return false;
        }
        match self.rps {
            Some(r) => r > 0.0,
            None => true,
        }
    }

    fn get_rate(&self, _elapsed_seconds: f64, target_rps: f64) -> f64 {
        match self.rps {
            Some(r) if r > 0.0 => r,
            _ => target_rps.max(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn falls_back_to_target_rps_when_unset() {
        let mut d = ConstantDistribution::default();
        d.initialize(&json!({}));
        assert!(d.validate());
        assert_eq!(d.get_rate(0.0, 10.0), 10.0);
        assert_eq!(d.get_rate(999.0, 10.0), 10.0);
    }

    #[test]
    fn uses_configured_rps_over_target() {
        let mut d = ConstantDistribution::default();
        d.initialize(&json!({"rps": 42.0}));
        assert!(d.validate());
        assert_eq!(d.get_rate(0.0, 10.0), 42.0);
    }

    #[test]
    fn negative_configured_rps_is_invalid() {
        let mut d = ConstantDistribution::default();
        d.initialize(&json!({"rps": -5.0}));
        assert!(!d.validate());
    }

    #[test]
    fn bool_rps_is_parse_error() {
        let mut d = ConstantDistribution::default();
        d.initialize(&json!({"rps": true}));
        assert!(!d.validate());
    }
}
