//! Path-qualified validation errors for composite shape configs, checked
//! before a shape is ever instantiated so a caller gets `"components[2]
//! .weight must be > 0"` instead of a bare `validate() == false`.

use serde_json::Value;

use crate::registry;

/// Normalizes a composite shape's list-valued field (`components` for
/// `mix`, `stages` for `sequence`) in place: a JSON-encoded string is
/// parsed into an array. Other shapes and fields are returned unchanged.
pub fn normalize_distribution_config(name: &str, config: &mut Value) {
    let field = match name {
        "mix" => "components",
        "sequence" => "stages",
        _ => return,
    };
    normalize_list_field(config, field);
}

fn normalize_list_field(config: &mut Value, field_name: &str) {
    let Some(obj) = config.as_object_mut() else {
        return;
    };
    let Some(value) = obj.get(field_name).cloned() else {
        return;
    };
    if let Value::String(s) = &value {
        if let Ok(parsed @ Value::Array(_)) = serde_json::from_str::<Value>(s) {
            obj.insert(field_name.to_string(), parsed);
        }
    }
}

/// Validates `config` for the named shape, returning one message per
/// problem found. An empty list means the config is valid. Unknown shape
/// names produce a single "not found" message.
pub fn validate_distribution_config(name: &str, config: &Value, path: &str) -> Vec<String> {
    if registry::REGISTRY.get(name).is_none() {
        return vec![format!("{}.name '{}' not found", path, name)];
    }

    let mut errors = match name {
        "mix" => validate_mix_config(config),
        "sequence" => validate_sequence_config(config),
        _ => Vec::new(),
    };
    if !errors.is_empty() {
        return errors;
    }

    match registry::instantiate(name, config) {
        Ok(instance) => {
            if !instance.validate() {
                errors.push(format!("{} validation failed", path));
            }
        }
        Err(_) => errors.push(format!("{}.name '{}' not found", path, name)),
    }
    errors
}

fn is_positive_number(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Number(n)) => n.as_f64().map(|v| v > 0.0).unwrap_or(false),
        _ => false,
    }
}

fn distribution_errors(container: &Value, index: usize, parent_field: &str) -> Vec<String> {
    let Some(distribution) = container.get("distribution") else {
        return vec![format!("{}[{}].distribution must be an object", parent_field, index)];
    };
    let Some(distribution_obj) = distribution.as_object() else {
        return vec![format!("{}[{}].distribution must be an object", parent_field, index)];
    };

    let name = match distribution_obj.get("name").and_then(Value::as_str) {
        Some(n) if !n.is_empty() => n,
        _ => return vec![format!("{}[{}].distribution.name is required", parent_field, index)],
    };

    let mut nested_config = match distribution_obj.get("config") {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(v @ Value::Object(_)) => v.clone(),
        Some(_) => {
            return vec![format!(
                "{}[{}].distribution.config must be an object",
                parent_field, index
            )]
        }
    };

    normalize_distribution_config(name, &mut nested_config);
    validate_distribution_config(name, &nested_config, &format!("{}[{}].distribution", parent_field, index))
}

fn validate_mix_config(config: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    let components = match config.get("components").and_then(Value::as_array) {
        Some(c) if !c.is_empty() => c,
        _ => return vec!["components must be a non-empty list".to_string()],
    };

    for (index, component) in components.iter().enumerate() {
        if !component.is_object() {
            errors.push(format!("components[{}] must be an object", index));
            continue;
        }
        if !is_positive_number(component.get("weight")) {
            errors.push(format!("components[{}].weight must be > 0", index));
        }
        errors.extend(distribution_errors(component, index, "components"));
    }
    errors
}

fn validate_sequence_config(config: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    let stages = match config.get("stages").and_then(Value::as_array) {
        Some(s) if !s.is_empty() => s,
        _ => return vec!["stages must be a non-empty list".to_string()],
    };

    for (index, stage) in stages.iter().enumerate() {
        if !stage.is_object() {
            errors.push(format!("stages[{}] must be an object", index));
            continue;
        }
        if !is_positive_number(stage.get("duration_seconds")) {
            errors.push(format!("stages[{}].duration_seconds must be > 0", index));
        }
        errors.extend(distribution_errors(stage, index, "stages"));
    }

    if let Some(post_behavior) = config.get("post_behavior") {
        let valid = matches!(post_behavior.as_str(), Some("hold_last") | Some("zero") | Some("repeat"));
        if !valid {
            errors.push("post_behavior must be one of: hold_last, zero, repeat".to_string());
        }
    }
    errors
}
