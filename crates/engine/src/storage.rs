//! Namespaced persistent storage with optional expiry.
//!
//! Entries without a namespace live inside the app-scoped default object
//! (`<appId>-sessionInfo`) and are updated read-modify-write. Entries with a
//! namespace are stored under `<namespace>:<key>`. A TTL wraps the value in a
//! [`StorageEnvelope`]; expired envelopes are removed when read.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};
use trellis_types::{StorageArea, StorageEnvelope, session_info_key, storage_key};
use trellis_util::{millis_to_rfc3339, now_millis};

/// Raw string storage, one keyspace per area.
pub trait KeyValueStorage: Send + Sync {
    fn get_item(&self, area: StorageArea, key: &str) -> Option<String>;
    fn set_item(&self, area: StorageArea, key: &str, value: String);
    fn remove_item(&self, area: StorageArea, key: &str);
    fn keys(&self, area: StorageArea) -> Vec<String>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    areas: Mutex<HashMap<StorageArea, BTreeMap<String, String>>>,
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, area: StorageArea, key: &str) -> Option<String> {
        let areas = self.areas.lock().unwrap_or_else(PoisonError::into_inner);
        areas.get(&area).and_then(|entries| entries.get(key)).cloned()
    }

    fn set_item(&self, area: StorageArea, key: &str, value: String) {
        let mut areas = self.areas.lock().unwrap_or_else(PoisonError::into_inner);
        areas.entry(area).or_default().insert(key.to_string(), value);
    }

    fn remove_item(&self, area: StorageArea, key: &str) {
        let mut areas = self.areas.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entries) = areas.get_mut(&area) {
            entries.remove(key);
        }
    }

    fn keys(&self, area: StorageArea) -> Vec<String> {
        let areas = self.areas.lock().unwrap_or_else(PoisonError::into_inner);
        areas
            .get(&area)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage key must not be empty")]
    EmptyKey,
    #[error("could not encode value for '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub struct NamespacedStorage {
    backend: Arc<dyn KeyValueStorage>,
    app_id: String,
}

impl std::fmt::Debug for NamespacedStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespacedStorage").field("app_id", &self.app_id).finish()
    }
}

impl NamespacedStorage {
    pub fn new(backend: Arc<dyn KeyValueStorage>, app_id: impl Into<String>) -> Self {
        Self {
            backend,
            app_id: app_id.into(),
        }
    }

    pub fn in_memory(app_id: impl Into<String>) -> Self {
        Self::new(Arc::new(MemoryStorage::default()), app_id)
    }

    pub fn backend(&self) -> &Arc<dyn KeyValueStorage> {
        &self.backend
    }

    pub fn default_namespace_key(&self) -> String {
        session_info_key(&self.app_id)
    }

    pub fn write(
        &self,
        area: StorageArea,
        namespace: Option<&str>,
        key: &str,
        value: Value,
        ttl_ms: Option<u64>,
    ) -> Result<(), StorageError> {
        self.write_at(area, namespace, key, value, ttl_ms, now_millis())
    }

    pub fn write_at(
        &self,
        area: StorageArea,
        namespace: Option<&str>,
        key: &str,
        value: Value,
        ttl_ms: Option<u64>,
        now_ms: i64,
    ) -> Result<(), StorageError> {
        if key.is_empty() {
            return Err(StorageError::EmptyKey);
        }
        let stored = match ttl_ms {
            Some(ttl) => serde_json::to_value(StorageEnvelope::new(value, ttl, now_ms))
                .map_err(|source| StorageError::Encode { key: key.to_string(), source })?,
            None => value,
        };
        match namespace {
            Some(namespace) => {
                let physical = storage_key(namespace, key);
                let encoded = encode(&physical, &stored)?;
                self.backend.set_item(area, &physical, encoded);
            }
            None => {
                let physical = self.default_namespace_key();
                let mut object = self.default_object(area);
                object.insert(key.to_string(), stored);
                let encoded = encode(&physical, &Value::Object(object))?;
                self.backend.set_item(area, &physical, encoded);
            }
        }
        debug!(area = ?area, namespace, key, ttl_ms, "storage write");
        Ok(())
    }

    pub fn read(&self, area: StorageArea, namespace: Option<&str>, key: &str) -> Result<Option<Value>, StorageError> {
        self.read_at(area, namespace, key, now_millis())
    }

    pub fn read_at(
        &self,
        area: StorageArea,
        namespace: Option<&str>,
        key: &str,
        now_ms: i64,
    ) -> Result<Option<Value>, StorageError> {
        let stored = match namespace {
            Some(namespace) => self
                .backend
                .get_item(area, &storage_key(namespace, key))
                .map(|raw| decode(&raw)),
            None => self.default_object(area).remove(key),
        };
        let Some(stored) = stored else { return Ok(None) };
        match StorageEnvelope::from_stored(&stored) {
            Some(envelope) if envelope.is_expired(now_ms) => {
                debug!(
                    namespace,
                    key,
                    expired_at = millis_to_rfc3339(envelope.metadata.expires_at).as_deref(),
                    "stored value expired; removing"
                );
                self.remove(area, namespace, key)?;
                Ok(None)
            }
            Some(envelope) => Ok(Some(envelope.value)),
            None => Ok(Some(stored)),
        }
    }

    /// Remove an entry; returns whether anything was stored.
    pub fn remove(&self, area: StorageArea, namespace: Option<&str>, key: &str) -> Result<bool, StorageError> {
        match namespace {
            Some(namespace) => {
                let physical = storage_key(namespace, key);
                let existed = self.backend.get_item(area, &physical).is_some();
                self.backend.remove_item(area, &physical);
                Ok(existed)
            }
            None => {
                let physical = self.default_namespace_key();
                let mut object = self.default_object(area);
                let existed = object.remove(key).is_some();
                if existed {
                    let encoded = encode(&physical, &Value::Object(object))?;
                    self.backend.set_item(area, &physical, encoded);
                }
                Ok(existed)
            }
        }
    }

    /// Unwrapped view of the default namespace; expired entries are omitted.
    pub fn snapshot(&self, area: StorageArea) -> Value {
        self.snapshot_at(area, now_millis())
    }

    pub fn snapshot_at(&self, area: StorageArea, now_ms: i64) -> Value {
        let entries = self
            .default_object(area)
            .into_iter()
            .filter_map(|(key, stored)| match StorageEnvelope::from_stored(&stored) {
                Some(envelope) if envelope.is_expired(now_ms) => None,
                Some(envelope) => Some((key, envelope.value)),
                None => Some((key, stored)),
            })
            .collect();
        Value::Object(entries)
    }

    fn default_object(&self, area: StorageArea) -> Map<String, Value> {
        let physical = self.default_namespace_key();
        match self.backend.get_item(area, &physical).map(|raw| decode(&raw)) {
            Some(Value::Object(object)) => object,
            Some(other) => {
                warn!(key = %physical, found = %other, "default storage namespace is not an object; starting fresh");
                Map::new()
            }
            None => Map::new(),
        }
    }
}

fn encode(key: &str, value: &Value) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|source| StorageError::Encode {
        key: key.to_string(),
        source,
    })
}

/// Stored text that is not JSON is returned as a plain string.
fn decode(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_namespace_is_one_object() {
        let storage = NamespacedStorage::in_memory("shop");
        storage.write(StorageArea::Local, None, "theme", json!("dark"), None).unwrap();
        storage.write(StorageArea::Local, None, "cart", json!([1, 2]), None).unwrap();

        let raw = storage.backend().get_item(StorageArea::Local, "shop-sessionInfo").unwrap();
        assert_eq!(decode(&raw), json!({"theme": "dark", "cart": [1, 2]}));
        assert_eq!(storage.snapshot(StorageArea::Local), json!({"theme": "dark", "cart": [1, 2]}));
    }

    #[test]
    fn namespaced_entries_use_prefixed_keys() {
        let storage = NamespacedStorage::in_memory("shop");
        storage.write(StorageArea::Session, Some("prefs"), "lang", json!("en"), None).unwrap();
        assert_eq!(storage.backend().keys(StorageArea::Session), vec!["prefs:lang".to_string()]);
        assert_eq!(storage.read(StorageArea::Session, Some("prefs"), "lang").unwrap(), Some(json!("en")));
        assert_eq!(storage.read(StorageArea::Local, Some("prefs"), "lang").unwrap(), None);
    }

    #[test]
    fn expired_values_are_removed_on_read() {
        let storage = NamespacedStorage::in_memory("shop");
        storage
            .write_at(StorageArea::Local, Some("otp"), "code", json!("1234"), Some(1_000), 10_000)
            .unwrap();
        assert_eq!(
            storage.read_at(StorageArea::Local, Some("otp"), "code", 10_999).unwrap(),
            Some(json!("1234"))
        );
        assert_eq!(storage.read_at(StorageArea::Local, Some("otp"), "code", 11_000).unwrap(), None);
        assert!(storage.backend().keys(StorageArea::Local).is_empty());
    }

    #[test]
    fn remove_reports_presence() {
        let storage = NamespacedStorage::in_memory("shop");
        storage.write(StorageArea::Local, None, "token", json!("t"), None).unwrap();
        assert!(storage.remove(StorageArea::Local, None, "token").unwrap());
        assert!(!storage.remove(StorageArea::Local, None, "token").unwrap());
    }
}
