// ── Entity state domain types ──

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Immutable attribute document of an entity.
///
/// The hub sends attributes as an arbitrary JSON object. This wrapper
/// keeps it behind an `Arc` (cheap to clone, never mutated) and exposes
/// typed accessors instead of the raw bag. Typed projections of the
/// whole document go through [`deserialize`](Self::deserialize).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(Arc<Map<String, Value>>);

impl Attributes {
    /// Build from a raw JSON value. Anything but an object yields an empty set.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(Arc::new(map)),
            _ => Self::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key)?.as_str()
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key)?.as_f64()
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key)?.as_i64()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key)?.as_bool()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Project the whole document onto a typed struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object((*self.0).clone()))
    }
}

/// Correlation ids attached to a state write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    pub id: String,
    pub user_id: Option<String>,
    pub parent_id: Option<String>,
}

/// Most recently known state of one entity. Replaced wholesale, never
/// mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    pub attributes: Attributes,
    pub last_changed: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub context: Option<Context>,
}

/// One state transition as seen by the state cache.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub entity_id: String,
    pub old: Option<Arc<EntityState>>,
    pub new: Option<Arc<EntityState>>,
}

impl StateChange {
    /// `true` when the state value itself changed, not just attributes.
    pub fn is_state_change(&self) -> bool {
        self.old.as_deref().map(|s| s.state.as_str())
            != self.new.as_deref().map(|s| s.state.as_str())
    }
}
