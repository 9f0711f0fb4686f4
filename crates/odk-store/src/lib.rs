//! odk-store
//!
//! The abstract key-document store the engine checkpoints into: orders
//! by id, orders by client token, positions, kill-switches, signals, and
//! strategies each live in their own collection.
//!
//! Real persistence adapters are external collaborators; the in-memory
//! implementation here is sufficient for tests and the paper runtime,
//! and is deterministic (BTreeMap iteration order is stable).

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

/// Collection names used by the engine.
pub mod collections {
    pub const ORDERS: &str = "orders";
    pub const ORDERS_BY_TOKEN: &str = "orders_by_token";
    pub const POSITIONS: &str = "positions";
    pub const KILL_SWITCHES: &str = "kill_switches";
    pub const SIGNALS: &str = "signals";
    pub const STRATEGIES: &str = "strategies";
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A document failed to (de)serialize.
    Codec { detail: String },
    /// Backend failure (unused by the in-memory store, present for
    /// adapter parity).
    Backend { detail: String },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Codec { detail } => write!(f, "store codec error: {detail}"),
            StoreError::Backend { detail } => write!(f, "store backend error: {detail}"),
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A key-document store: JSON documents addressed by (collection, key).
pub trait DocumentStore: Send {
    fn put(&mut self, collection: &str, key: &str, doc: Value) -> Result<(), StoreError>;

    fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError>;

    fn delete(&mut self, collection: &str, key: &str) -> Result<bool, StoreError>;

    /// All (key, document) pairs in a collection, key-ordered.
    fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StoreError>;
}

/// Typed convenience layer over the raw JSON contract.
pub trait DocumentStoreExt: DocumentStore {
    fn put_typed<T: Serialize>(
        &mut self,
        collection: &str,
        key: &str,
        doc: &T,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(doc).map_err(|e| StoreError::Codec {
            detail: e.to_string(),
        })?;
        self.put(collection, key, value)
    }

    fn get_typed<T: DeserializeOwned>(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.get(collection, key)? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::Codec {
                    detail: e.to_string(),
                }),
        }
    }
}

impl<S: DocumentStore + ?Sized> DocumentStoreExt for S {}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Deterministic in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: BTreeMap<(String, String), Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

impl DocumentStore for MemoryStore {
    fn put(&mut self, collection: &str, key: &str, doc: Value) -> Result<(), StoreError> {
        self.docs
            .insert((collection.to_string(), key.to_string()), doc);
        Ok(())
    }

    fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .docs
            .get(&(collection.to_string(), key.to_string()))
            .cloned())
    }

    fn delete(&mut self, collection: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .docs
            .remove(&(collection.to_string(), key.to_string()))
            .is_some())
    }

    fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StoreError> {
        Ok(self
            .docs
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|((_, k), v)| (k.clone(), v.clone()))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
