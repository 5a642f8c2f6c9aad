//! Payload comparison and merging
//!
//! Payloads are opaque to the engine. The application decides how two
//! payloads compare and whether they can be combined by registering a
//! [`PayloadMerger`] per key resource prefix; keys without a registration
//! use [`ShallowMerge`].

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use offsync_core::domain::Key;

/// Marker field added to every shallow-merged payload
pub const MERGED_MARKER: &str = "_merged";

/// Comparable/mergeable capability for one family of payloads
pub trait PayloadMerger: Send + Sync {
    /// Combines `local` and `server`, or returns `None` if they cannot be merged
    fn merge(&self, local: &Value, server: &Value) -> Option<Value>;

    /// Whether two payloads describe the same content
    fn equivalent(&self, a: &Value, b: &Value) -> bool {
        a == b
    }
}

/// Shallow object merge with local fields taking precedence
///
/// `{...server, ...local, _merged: true}`. Anything other than two JSON
/// objects is not mergeable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShallowMerge;

impl PayloadMerger for ShallowMerge {
    fn merge(&self, local: &Value, server: &Value) -> Option<Value> {
        let (Value::Object(local), Value::Object(server)) = (local, server) else {
            return None;
        };

        let mut merged = server.clone();
        for (field, value) in local {
            merged.insert(field.clone(), value.clone());
        }
        merged.insert(MERGED_MARKER.to_string(), Value::Bool(true));
        Some(Value::Object(merged))
    }
}

/// Mergers keyed by resource prefix
pub struct MergeRegistry {
    by_resource: HashMap<String, Arc<dyn PayloadMerger>>,
    fallback: Arc<dyn PayloadMerger>,
}

impl MergeRegistry {
    /// Creates a registry that uses [`ShallowMerge`] for every key
    pub fn new() -> Self {
        Self {
            by_resource: HashMap::new(),
            fallback: Arc::new(ShallowMerge),
        }
    }

    /// Registers `merger` for keys whose resource is `resource`
    pub fn register(mut self, resource: impl Into<String>, merger: Arc<dyn PayloadMerger>) -> Self {
        self.by_resource.insert(resource.into(), merger);
        self
    }

    /// Replaces the merger used for unregistered resources
    pub fn with_fallback(mut self, merger: Arc<dyn PayloadMerger>) -> Self {
        self.fallback = merger;
        self
    }

    /// Returns the merger responsible for `key`
    pub fn merger_for(&self, key: &Key) -> &dyn PayloadMerger {
        self.by_resource
            .get(key.resource())
            .unwrap_or(&self.fallback)
            .as_ref()
    }
}

impl Default for MergeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
