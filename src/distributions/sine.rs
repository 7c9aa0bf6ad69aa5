use serde_json::Value;
use std::collections::HashMap;
use std::f64::consts::TAU;

use super::{parse_float_field, parse_optional_float_field, Distribution, Metadata, ParamSpec};

/// Sinusoidal rate oscillating around `base_rps` (or `target_rps`) with the
/// given `period`, `amplitude`, and `phase_shift`.
#[derive(Debug)]
pub struct SineDistribution {
    period: f64,
    amplitude: f64,
    phase_shift: f64,
    base_rps: Option<f64>,
    parse_error: bool,
}

impl Default for SineDistribution {
    fn default() -> Self {
        Self {
            period: 3600.0,
            amplitude: 0.5,
            phase_shift: 0.0,
            base_rps: None,
            parse_error: false,
        }
    }
}

impl Distribution for SineDistribution {
    fn metadata(&self) -> Metadata {
        let mut parameters = HashMap::new();
        parameters.insert(
            "period",
            ParamSpec {
                param_type: "float",
                default: Some(Value::from(3600.0)),
                description: "Oscillation period in seconds",
                required: false,
            },
        );
        parameters.insert(
            "amplitude",
            ParamSpec {
                param_type: "float",
                default: Some(Value::from(0.5)),
                description: "Fractional amplitude in (0, 1]",
                required: false,
            },
        );
        parameters.insert(
            "phase_shift",
            ParamSpec {
                param_type: "float",
                default: Some(Value::from(0.0)),
                description: "Phase shift in seconds",
                required: false,
            },
        );
        parameters.insert(
            "base_rps",
            ParamSpec {
                param_type: "float",
                default: None,
                description: "Oscillation midpoint; falls back to target_rps if unset",
                required: false,
            },
        );
        Metadata {
            name: "sine",
            version: "1.0",
            description: "Sinusoidal rate around a base value",
            parameters,
        }
    }

    fn initialize(&mut self, config: &Value) {
        let (period, period_ok) = parse_float_field(config, "period", 3600.0);
        let (amplitude, amplitude_ok) = parse_float_field(config, "amplitude", 0.5);
        let (phase_shift, phase_ok) = parse_float_field(config, "phase_shift", 0.0);
        let (base_rps, base_ok) = parse_optional_float_field(config, "base_rps");
        self.period = period;
        self.amplitude = amplitude;
        self.phase_shift = phase_shift;
        self.base_rps = base_rps;
        self.parse_error = !period_ok || !amplitude_ok || !phase_ok || !base_ok;
    }

    fn validate(&self) -> bool {
        if self.parse_error {
            return false;
        }
        if self.period <= 0.0 {
            return false;
        }
        if !(self.amplitude > 0.0 && self.amplitude <= 1.0) {
            return false;
        }
        if self.phase_shift < 0.0 {
            return false;
        }
        if let Some(b) = self.base_rps {
            if b <= 0.0 {
                return false;
            }
        }
        true
    }

    fn get_rate(&self, elapsed_seconds: f64, target_rps: f64) -> f64 {
        if self.period <= 0.0 {
            return target_rps.max(0.0);
        }
        let base = match self.base_rps {
            Some(b) if b > 0.0 => b,
            _ => target_rps,
        };
        let angle = TAU * (elapsed_seconds + self.phase_shift) / self.period;
        (base * (1.0 + self.amplitude * angle.sin())).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn periodic_with_period() {
        let mut d = SineDistribution::default();
        d.initialize(&json!({"period": 100.0, "amplitude": 0.5, "base_rps": 10.0}));
        assert!(d.validate());
        let a = d.get_rate(30.0, 0.0);
        let b = d.get_rate(130.0, 0.0);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn bounded_by_amplitude() {
        let mut d = SineDistribution::default();
        d.initialize(&json!({"period": 100.0, "amplitude": 0.5, "base_rps": 10.0}));
        for t in 0..200 {
            let r = d.get_rate(t as f64, 0.0);
            assert!((r - 10.0).abs() <= 5.0 + 1e-9);
        }
    }

    #[test]
    fn rate_at_zero_matches_formula() {
        let mut d = SineDistribution::default();
        d.initialize(&json!({"period": 100.0, "amplitude": 0.5, "phase_shift": 25.0, "base_rps": 10.0}));
        let expected = 10.0 * (1.0 + 0.5 * (TAU * 25.0 / 100.0).sin());
        assert!((d.get_rate(0.0, 0.0) - expected).abs() < 1e-9);
    }

    #[test]
    fn amplitude_out_of_range_invalid() {
        let mut d = SineDistribution::default();
        d.initialize(&json!({"amplitude": 1.5}));
        assert!(!d.validate());
    }
}
