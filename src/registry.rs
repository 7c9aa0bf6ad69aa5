//! Shape registry and loader.
//!
//! Built-in shapes are registered once at process startup and the registry
//! is read-mostly after that (same lifecycle as
//! [`crate::connection_pool::GLOBAL_POOL_STATS`]). A secondary loader lets
//! an embedding process register additional shapes discovered however it
//! likes — Rust has no runtime equivalent of Python's
//! `importlib.metadata.entry_points`, so that discovery step is the
//! embedder's job; this registry only needs the resulting `(name, factory)`
//! pairs.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use tracing::warn;

use crate::distributions::{
    ConstantDistribution, Distribution, LinearDistribution, MixDistribution,
    PoissonDistribution, SequenceDistribution, ShapeFactory, SineDistribution, StepDistribution,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("distribution '{0}' not found")]
    NotFound(String),
}

pub struct ShapeRegistry {
    factories: RwLock<HashMap<String, ShapeFactory>>,
}

impl ShapeRegistry {
    fn empty() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    fn with_builtins() -> Self {
        let registry = Self::empty();
        registry.register("constant", || Box::new(ConstantDistribution::default()));
        registry.register("linear", || Box::new(LinearDistribution::default()));
        registry.register("poisson", || Box::new(PoissonDistribution::default()));
        registry.register("step", || Box::new(StepDistribution::default()));
        registry.register("sine", || Box::new(SineDistribution::default()));
        registry.register("mix", || Box::new(MixDistribution::default()));
        registry.register("sequence", || Box::new(SequenceDistribution::default()));
        registry
    }

    /// Registers a factory under `name`, overwriting any prior registration
    /// for the same name.
    pub fn register(&self, name: &str, factory: ShapeFactory) {
        self.factories
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), factory);
    }

    pub fn get(&self, name: &str) -> Option<ShapeFactory> {
        self.factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .copied()
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Registers every `(name, factory)` pair from an externally-supplied
    /// plugin table. Each entry is registered independently — a
    /// construction failure for one does not block the rest, mirroring
    /// `load_entry_points`'s per-symbol try/except.
    pub fn load_external(&self, entries: Vec<(&str, ShapeFactory)>) {
        for (name, factory) in entries {
            let probe = std::panic::catch_unwind(std::panic::AssertUnwindSafe(factory));
            match probe {
                Ok(_instance) => self.register(name, factory),
                Err(_) => {
                    warn!(name, "external distribution plugin failed to construct, skipping");
                }
            }
        }
    }

    /// Builds a shape instance and calls `initialize(config)`. Does not
    /// call `validate()` — the caller decides when validation happens.
    pub fn instantiate(
        &self,
        name: &str,
        config: &Value,
    ) -> Result<Box<dyn Distribution>, RegistryError> {
        let factory = self
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        let mut instance = factory();
        instance.initialize(config);
        Ok(instance)
    }
}

lazy_static::lazy_static! {
    pub static ref REGISTRY: ShapeRegistry = ShapeRegistry::with_builtins();
}

/// Convenience wrapper around the global registry, used by composite
/// shapes (`mix`, `sequence`) to instantiate their children by name.
pub fn instantiate(name: &str, config: &Value) -> Result<Box<dyn Distribution>, RegistryError> {
    REGISTRY.instantiate(name, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtins_are_preregistered() {
        let names = REGISTRY.list();
        for expected in ["constant", "linear", "poisson", "step", "sine", "mix", "sequence"] {
            assert!(names.contains(&expected.to_string()), "missing {}", expected);
        }
    }

    #[test]
    fn unknown_name_is_not_found() {
        let err = REGISTRY.instantiate("nope", &json!({})).unwrap_err();
        assert_eq!(err, RegistryError::NotFound("nope".to_string()));
    }

    #[test]
    fn register_overwrites_idempotently() {
        let registry = ShapeRegistry::empty();
        registry.register("constant", || Box::new(ConstantDistribution::default()));
        registry.register("constant", || Box::new(ConstantDistribution::default()));
        assert_eq!(registry.list(), vec!["constant".to_string()]);
    }

    #[test]
    fn instantiate_initializes_but_does_not_validate() {
        let instance = REGISTRY.instantiate("linear", &json!({"ramp_duration": -1.0})).unwrap();
        assert!(!instance.validate());
    }
}
