use serde_json::Value;
use std::collections::HashMap;

use super::{parse_json_or_list, Distribution, Metadata, ParamSpec};
use crate::registry;

struct Stage {
    plugin: Box<dyn Distribution>,
    duration: f64,
    start: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostBehavior {
    HoldLast,
    Zero,
    Repeat,
}

impl Default for PostBehavior {
    fn default() -> Self {
        Self::HoldLast
    }
}

impl PostBehavior {
    fn parse(value: Option<&Value>) -> (Self, bool) {
        match value {
            None => (Self::HoldLast, true),
            Some(Value::String(s)) => match s.as_str() {
                "hold_last" => (Self::HoldLast, true),
                "zero" => (Self::Zero, true),
                "repeat" => (Self::Repeat, true),
                _ => (Self::HoldLast, false),
            },
            Some(_) => (Self::HoldLast, false),
        }
    }
}

/// Runs a sequence of named child shapes back to back, each for its own
/// `duration_seconds`. Once the timeline is exhausted, `post_behavior`
/// decides what happens next: hold the last stage's rate, drop to zero, or
/// repeat the whole sequence.
#[derive(Default)]
pub struct SequenceDistribution {
    stages: Vec<Stage>,
    total_duration: f64,
    post_behavior: PostBehavior,
    parse_error: bool,
}

impl SequenceDistribution {
    fn parse_stage(&mut self, stage: &Value) -> Option<Stage> {
        let obj = stage.as_object()?;

        let duration = obj.get("duration_seconds")?.as_f64()?;

        let distribution = obj.get("distribution")?.as_object()?;
        let name = distribution.get("name")?.as_str()?;

        let stage_config = match distribution.get("config") {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(v @ Value::Object(_)) => v.clone(),
            Some(_) => return None,
        };

        let plugin = registry::instantiate(name, &stage_config).ok()?;

        Some(Stage {
            plugin,
            duration,
            start: 0.0,
        })
    }

    fn finalize_timeline(&mut self) {
        let mut elapsed = 0.0;
        for stage in &mut self.stages {
            stage.start = elapsed;
            elapsed += stage.duration;
        }
        self.total_duration = elapsed;
    }

    fn last_stage_index(&self) -> usize {
        self.stages.len().saturating_sub(1)
    }

    fn rate_for_stage(&self, index: usize, elapsed: f64, target_rps: f64) -> f64 {
        let stage = &self.stages[index];
        stage.plugin.get_rate(elapsed - stage.start, target_rps)
    }

    fn find_active_stage(&self, elapsed: f64) -> usize {
        for (index, stage) in self.stages.iter().enumerate() {
            if elapsed < stage.start + stage.duration {
                return index;
            }
        }
        self.last_stage_index()
    }
}

impl Distribution for SequenceDistribution {
    fn metadata(&self) -> Metadata {
        let mut parameters = HashMap::new();
        parameters.insert(
            "stages",
            ParamSpec {
                param_type: "str",
                default: None,
                description: "JSON array of {duration_seconds, distribution{name, config}}",
                required: true,
            },
        );
        parameters.insert(
            "post_behavior",
            ParamSpec {
                param_type: "str",
                default: Some(Value::from("hold_last")),
                description: "Behavior after stages: hold_last, zero, or repeat",
                required: false,
            },
        );
        Metadata {
            name: "sequence",
            version: "1.0",
            description: "Run distributions in order for fixed durations",
            parameters,
        }
    }

    fn initialize(&mut self, config: &Value) {
        self.parse_error = false;
        self.stages = Vec::new();
        self.total_duration = 0.0;

        let (post_behavior, post_ok) = PostBehavior::parse(config.get("post_behavior"));
        self.post_behavior = post_behavior;
        if !post_ok {
            self.parse_error = true;
        }

        let stages_raw = match parse_json_or_list(config.get("stages")) {
            Ok(items) => items,
            Err(()) => {
                self.parse_error = true;
                return;
            }
        };

        for raw in &stages_raw {
            match self.parse_stage(raw) {
                Some(stage) => self.stages.push(stage),
                None => self.parse_error = true,
            }
        }

        self.finalize_timeline();
    }

    fn validate(&self) -> bool {
        if self.parse_error || self.stages.is_empty() {
            return false;
        }
        for stage in &self.stages {
            if stage.duration <= 0.0 || !stage.duration.is_finite() {
                return false;
            }
            if stage.start < 0.0 {
                return false;
            }
            if !stage.plugin.validate() {
                return false;
            }
        }
        self.total_duration > 0.0
    }

    fn get_rate(&self, elapsed_seconds: f64, target_rps: f64) -> f64 {
        if self.parse_error || self.stages.is_empty() || self.total_duration <= 0.0 {
            return target_rps.max(0.0);
        }

        let behavior = self.post_behavior;
        let (elapsed, should_force_zero) = if behavior == PostBehavior::Repeat {
            (elapsed_seconds % self.total_duration, false)
        } else if elapsed_seconds < self.total_duration {
            (elapsed_seconds, false)
        } else {
            match behavior {
                PostBehavior::Zero => (elapsed_seconds, true),
                PostBehavior::HoldLast => {
                    return self.rate_for_stage(self.last_stage_index(), elapsed_seconds, target_rps);
                }
                PostBehavior::Repeat => unreachable!(),
            }
        };

        if should_force_zero {
            return 0.0;
        }

        let stage_index = self.find_active_stage(elapsed);
        self.rate_for_stage(stage_index, elapsed, target_rps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(stages: Value, post_behavior: Option<&str>) -> Value {
        let mut c = json!({"stages": stages});
        if let Some(p) = post_behavior {
            c["post_behavior"] = json!(p);
        }
        c
    }

    #[test]
    fn runs_stages_in_order() {
        let mut d = SequenceDistribution::default();
        d.initialize(&config(
            json!([
                {"duration_seconds": 10.0, "distribution": {"name": "constant", "config": {"rps": 5.0}}},
                {"duration_seconds": 10.0, "distribution": {"name": "constant", "config": {"rps": 50.0}}},
            ]),
            None,
        ));
        assert!(d.validate());
        assert_eq!(d.get_rate(0.0, 0.0), 5.0);
        assert_eq!(d.get_rate(15.0, 0.0), 50.0);
    }

    #[test]
    fn hold_last_continues_final_stage_rate() {
        let mut d = SequenceDistribution::default();
        d.initialize(&config(
            json!([{"duration_seconds": 10.0, "distribution": {"name": "constant", "config": {"rps": 5.0}}}]),
            Some("hold_last"),
        ));
        assert_eq!(d.get_rate(1000.0, 0.0), 5.0);
    }

    #[test]
    fn zero_behavior_drops_to_zero_after_timeline() {
        let mut d = SequenceDistribution::default();
        d.initialize(&config(
            json!([{"duration_seconds": 10.0, "distribution": {"name": "constant", "config": {"rps": 5.0}}}]),
            Some("zero"),
        ));
        assert_eq!(d.get_rate(15.0, 0.0), 0.0);
    }

    #[test]
    fn repeat_behavior_wraps_timeline() {
        let mut d = SequenceDistribution::default();
        d.initialize(&config(
            json!([
                {"duration_seconds": 10.0, "distribution": {"name": "constant", "config": {"rps": 5.0}}},
                {"duration_seconds": 10.0, "distribution": {"name": "constant", "config": {"rps": 50.0}}},
            ]),
            Some("repeat"),
        ));
        assert_eq!(d.get_rate(25.0, 0.0), 50.0);
        assert_eq!(d.get_rate(5.0, 0.0), 5.0);
    }

    #[test]
    fn empty_stages_invalid() {
        let mut d = SequenceDistribution::default();
        d.initialize(&config(json!([]), None));
        assert!(!d.validate());
    }

    #[test]
    fn unknown_post_behavior_is_parse_error() {
        let mut d = SequenceDistribution::default();
        d.initialize(&config(
            json!([{"duration_seconds": 10.0, "distribution": {"name": "constant", "config": {}}}]),
            Some("bogus"),
        ));
        assert!(!d.validate());
    }
}
