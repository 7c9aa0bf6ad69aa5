use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;

use super::{parse_float_field, parse_optional_float_field, Distribution, Metadata, ParamSpec};

/// Approximates Poisson-ish arrival variance by perturbing a mean rate with
/// gaussian noise: `mean * (1 + N(0, 0.1 * variance_scale))`, clamped at
/// zero. This is a deliberate RPS-modulating approximation, not a true
/// Poisson process — see the crate-level design notes.
#[derive(Debug, Default)]
pub struct PoissonDistribution {
    lambda_param: Option<f64>,
    variance_scale: f64,
    parse_error: bool,
}

impl PoissonDistribution {
    /// Standard-normal sample via the Box-Muller transform, using `rand`
    /// directly rather than pulling in `rand_distr` for a single
    /// distribution.
    fn sample_standard_normal(&self) -> f64 {
        let mut rng = rand::thread_rng();
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen_range(0.0..1.0);
        let radius = (-2.0 * u1.ln()).sqrt();
        let theta = std::f64::consts::TAU * u2;
        radius * theta.sin()
    }
}

impl Distribution for PoissonDistribution {
    fn metadata(&self) -> Metadata {
        let mut parameters = HashMap::new();
        parameters.insert(
            "lambda_param",
            ParamSpec {
                param_type: "float",
                default: None,
                description: "Mean rate; falls back to target_rps if unset",
                required: false,
            },
        );
        parameters.insert(
            "variance_scale",
            ParamSpec {
                param_type: "float",
                default: Some(Value::from(1.0)),
                description: "Scales the gaussian noise's standard deviation",
                required: false,
            },
        );
        Metadata {
            name: "poisson",
            version: "1.0",
            description: "Gaussian-perturbed mean rate approximating Poisson arrivals",
            parameters,
        }
    }

    fn initialize(&mut self, config: &Value) {
        let (lambda_param, lambda_ok) = parse_optional_float_field(config, "lambda_param");
        let (variance_scale, variance_ok) = parse_float_field(config, "variance_scale", 1.0);
        self.lambda_param = lambda_param;
        self.variance_scale = variance_scale;
        self.parse_error = !lambda_ok || !variance_ok;
    }

    fn validate(&self) -> bool {
        if self.parse_error {
            return false;
        }
        if let Some(l) = self.lambda_param {
            if l <= 0.0 {
                return false;
            }
        }
        self.variance_scale > 0.0
    }

    fn get_rate(&self, _elapsed_seconds: f64, target_rps: f64) -> f64 {
        let mean = match self.lambda_param {
            Some(l) => l,
            None => target_rps,
        };
        if mean <= 0.0 {
            return 0.0;
        }
        let noise = self.sample_standard_normal() * 0.1 * self.variance_scale;
        (mean * (1.0 + noise)).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mean_approximately_matches_over_many_samples() {
        let mut d = PoissonDistribution::default();
        d.initialize(&json!({"lambda_param": 100.0, "variance_scale": 1.0}));
        assert!(d.validate());
        let n = 5000;
        let sum: f64 = (0..n).map(|_| d.get_rate(0.0, 0.0)).sum();
        let mean = sum / n as f64;
        assert!((mean - 100.0).abs() < 5.0, "mean={}", mean);
    }

    #[test]
    fn never_negative() {
        let mut d = PoissonDistribution::default();
        d.initialize(&json!({"lambda_param": 1.0, "variance_scale": 5.0}));
        for _ in 0..2000 {
            assert!(d.get_rate(0.0, 0.0) >= 0.0);
        }
    }

    #[test]
    fn zero_mean_returns_zero() {
        let mut d = PoissonDistribution::default();
        d.initialize(&json!({}));
        assert_eq!(d.get_rate(0.0, 0.0), 0.0);
    }

    #[test]
    fn negative_lambda_invalid() {
        let mut d = PoissonDistribution::default();
        d.initialize(&json!({"lambda_param": -1.0}));
        assert!(!d.validate());
    }
}
