use serde_json::Value;
use std::collections::HashMap;

use super::{parse_json_or_list, parse_optional_float_field, Distribution, Metadata, ParamSpec};
use crate::registry;

struct Component {
    weight: f64,
    target_override: Option<f64>,
    plugin: Box<dyn Distribution>,
}

/// Weighted sum of named child shapes. Each component's weight is
/// normalized against the sum of all weights before mixing; a component may
/// override the target RPS its child sees, falling back to this shape's own
/// `target_rps` and then to the run's `target_rps`.
#[derive(Default)]
pub struct MixDistribution {
    mix_target_rps: Option<f64>,
    components: Vec<Component>,
    parse_error: bool,
}

impl MixDistribution {
    fn effective_target(&self, override_value: Option<f64>, target_rps: f64) -> f64 {
        if let Some(o) = override_value {
            return o;
        }
        if let Some(m) = self.mix_target_rps {
            return m;
        }
        target_rps
    }

    fn parse_component(&mut self, component: &Value) -> Option<Component> {
        let obj = component.as_object()?;

        let weight = match obj.get("weight") {
            Some(v) => v.as_f64()?,
            None => return None,
        };

        let distribution = obj.get("distribution")?.as_object()?;
        let name = distribution.get("name")?.as_str()?;

        let component_config = match distribution.get("config") {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(v @ Value::Object(_)) => v.clone(),
            Some(_) => return None,
        };

        let (target_override, target_ok) = parse_optional_float_field(&component_config, "target_rps");
        if !target_ok {
            return None;
        }

        let plugin = registry::instantiate(name, &component_config).ok()?;

        Some(Component {
            weight,
            target_override,
            plugin,
        })
    }
}

impl Distribution for MixDistribution {
    fn metadata(&self) -> Metadata {
        let mut parameters = HashMap::new();
        parameters.insert(
            "components",
            ParamSpec {
                param_type: "str",
                default: None,
                description: "JSON array of {weight, distribution{name, config}}",
                required: true,
            },
        );
        parameters.insert(
            "target_rps",
            ParamSpec {
                param_type: "float",
                default: None,
                description: "Default target RPS for all components",
                required: false,
            },
        );
        Metadata {
            name: "mix",
            version: "1.0",
            description: "Weighted sum of multiple distributions",
            parameters,
        }
    }

    fn initialize(&mut self, config: &Value) {
        self.parse_error = false;
        self.components = Vec::new();

        let (mix_target_rps, target_ok) = parse_optional_float_field(config, "target_rps");
        self.mix_target_rps = mix_target_rps;
        if !target_ok {
            self.parse_error = true;
        }

        let components_raw = match parse_json_or_list(config.get("components")) {
            Ok(items) => items,
            Err(()) => {
                self.parse_error = true;
                return;
            }
        };

        for raw in &components_raw {
            match self.parse_component(raw) {
                Some(component) => self.components.push(component),
                None => self.parse_error = true,
            }
        }
    }

    fn validate(&self) -> bool {
        if self.parse_error || self.components.is_empty() {
            return false;
        }
        if let Some(m) = self.mix_target_rps {
            if m <= 0.0 {
                return false;
            }
        }
        let mut total_weight = 0.0;
        for component in &self.components {
            if component.weight <= 0.0 {
                return false;
            }
            if let Some(t) = component.target_override {
                if t <= 0.0 {
                    return false;
                }
            }
            if !component.plugin.validate() {
                return false;
            }
            total_weight += component.weight;
        }
        total_weight > 0.0
    }

    fn get_rate(&self, elapsed_seconds: f64, target_rps: f64) -> f64 {
        if self.parse_error || self.components.is_empty() {
            return target_rps.max(0.0);
        }
        let total_weight: f64 = self.components.iter().map(|c| c.weight).sum();
        if total_weight <= 0.0 {
            return target_rps.max(0.0);
        }

        let mut mixed_rate = 0.0;
        for component in &self.components {
            let normalized_weight = component.weight / total_weight;
            let effective_target = self.effective_target(component.target_override, target_rps);
            let component_rate = component.plugin.get_rate(elapsed_seconds, effective_target);
            mixed_rate += normalized_weight * component_rate;
        }
        mixed_rate.max(0.0)
    }
}
