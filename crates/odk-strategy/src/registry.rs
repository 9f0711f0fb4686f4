//! Strategy registry — catalogue of available strategy types.
//!
//! The runtime manages *active* instances; the registry is the step
//! before that: `strategy_type → (default config, factory)`. Factories
//! are `Send + Sync` closures producing a fresh boxed [`Strategy`] on
//! every call, so instance state never leaks across activations.
//! Defaults are stored as JSON so activation overrides can deep-merge
//! (objects merge recursively, arrays and scalars replace).

use serde_json::Value;

use crate::types::{Strategy, StrategyConfig};

/// Thread-safe factory producing a fresh strategy instance.
pub type StrategyFactory = Box<dyn Fn() -> Box<dyn Strategy> + Send + Sync>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateType { strategy_type: String },
    UnknownType { strategy_type: String },
    EmptyType,
    /// The merged defaults+overrides JSON did not deserialize.
    BadConfig { strategy_type: String, detail: String },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateType { strategy_type } => {
                write!(f, "strategy type '{strategy_type}' is already registered")
            }
            Self::UnknownType { strategy_type } => {
                write!(f, "no strategy type '{strategy_type}' is registered")
            }
            Self::EmptyType => write!(f, "strategy type must not be empty"),
            Self::BadConfig {
                strategy_type,
                detail,
            } => write!(f, "bad config for '{strategy_type}': {detail}"),
        }
    }
}

impl std::error::Error for RegistryError {}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct Registration {
    strategy_type: String,
    defaults: Value,
    factory: StrategyFactory,
}

/// Catalogue of strategy types, insertion-ordered for deterministic
/// listing.
#[derive(Default)]
pub struct StrategyRegistry {
    entries: Vec<Registration>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy type with its default configuration.
    pub fn register<F>(
        &mut self,
        strategy_type: impl Into<String>,
        defaults: StrategyConfig,
        factory: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn() -> Box<dyn Strategy> + Send + Sync + 'static,
    {
        let strategy_type = strategy_type.into();
        if strategy_type.trim().is_empty() {
            return Err(RegistryError::EmptyType);
        }
        if self.contains(&strategy_type) {
            return Err(RegistryError::DuplicateType { strategy_type });
        }

        let defaults = serde_json::to_value(defaults)
            .expect("StrategyConfig serialization cannot fail");

        self.entries.push(Registration {
            strategy_type,
            defaults,
            factory: Box::new(factory),
        });
        Ok(())
    }

    pub fn contains(&self, strategy_type: &str) -> bool {
        self.entries.iter().any(|e| e.strategy_type == strategy_type)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered types in insertion order.
    pub fn list(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.strategy_type.as_str()).collect()
    }

    /// Produce a fresh instance plus its merged configuration.
    ///
    /// `overrides` deep-merges over the registered defaults; pass
    /// `Value::Null` for defaults-as-is.
    pub fn instantiate(
        &self,
        strategy_type: &str,
        overrides: &Value,
    ) -> Result<(Box<dyn Strategy>, StrategyConfig), RegistryError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.strategy_type == strategy_type)
            .ok_or_else(|| RegistryError::UnknownType {
                strategy_type: strategy_type.to_string(),
            })?;

        let mut merged = entry.defaults.clone();
        if !overrides.is_null() {
            deep_merge(&mut merged, overrides.clone());
        }

        let config: StrategyConfig =
            serde_json::from_value(merged).map_err(|e| RegistryError::BadConfig {
                strategy_type: strategy_type.to_string(),
                detail: e.to_string(),
            })?;

        Ok(((entry.factory)(), config))
    }
}

/// Objects merge recursively; arrays and scalars replace.
fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
