use dashmap::{DashMap, mapref::entry::Entry};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Key/value state shared by every task of a session.
///
/// Clones share the same underlying map, so a value written through one
/// handle (for example a stop request arriving on another HTTP request) is
/// visible to a task that is still running with its own clone.
#[derive(Clone, Debug, Default)]
pub struct Context {
    data: Arc<DashMap<String, Value>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, key: impl Into<String>, value: impl Serialize) {
        self.set_sync(key, value);
    }

    /// Synchronous variant of [`Context::set`] for use inside closures and edge conditions.
    pub fn set_sync(&self, key: impl Into<String>, value: impl Serialize) {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(value) => {
                self.data.insert(key, value);
            }
            Err(e) => warn!(key = %key, "dropping context value that failed to serialize: {}", e),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_sync(key)
    }

    pub fn get_sync<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Read a boolean flag, treating a missing key as `false`.
    pub fn flag(&self, key: &str) -> bool {
        self.get_sync(key).unwrap_or(false)
    }

    /// Atomically set a boolean flag that is currently unset or `false`.
    /// Returns `false` without writing when the flag is already `true`.
    pub fn try_claim(&self, key: impl Into<String>) -> bool {
        match self.data.entry(key.into()) {
            Entry::Occupied(mut entry) => {
                if entry.get() == &Value::Bool(true) {
                    false
                } else {
                    entry.insert(Value::Bool(true));
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Value::Bool(true));
                true
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.data.remove(key).map(|(_, v)| v)
    }

    /// Snapshot of every entry, used by status endpoints.
    pub fn snapshot(&self) -> serde_json::Map<String, Value> {
        self.data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_writes() {
        let context = Context::new();
        let other = context.clone();

        other.set("stop_requested", true).await;

        assert!(context.flag("stop_requested"));
        assert!(!context.flag("missing"));
    }

    #[tokio::test]
    async fn typed_round_trip_and_remove() {
        let context = Context::new();
        context.set("segments", vec!["a", "b"]).await;

        let segments: Vec<String> = context.get("segments").await.unwrap();
        assert_eq!(segments, vec!["a".to_string(), "b".to_string()]);

        // Wrong type reads as absent rather than panicking
        assert!(context.get::<u32>("segments").await.is_none());

        assert!(context.remove("segments").await.is_some());
        assert!(!context.contains("segments"));
    }

    #[tokio::test]
    async fn claim_succeeds_once_until_released() {
        let context = Context::new();
        let other = context.clone();

        assert!(context.try_claim("solving"));
        assert!(!other.try_claim("solving"));
        assert!(context.flag("solving"));

        other.set("solving", false).await;
        assert!(context.try_claim("solving"));
    }
}
