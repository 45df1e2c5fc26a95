//! Persisted storage layout.
//!
//! Ad hoc entries live under `<namespace>:<key>`; the app-scoped default
//! namespace is `<appId>-sessionInfo`. Values carrying a time-to-live are
//! wrapped in a [`StorageEnvelope`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which browser-like storage area an entry belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "camelCase")]
pub enum StorageArea {
    #[default]
    Local,
    Session,
}

/// Physical key for an ad hoc entry.
pub fn storage_key(namespace: &str, key: &str) -> String {
    format!("{}:{}", namespace, key)
}

/// Physical key of the app-scoped default namespace.
pub fn session_info_key(app_id: &str) -> String {
    format!("{}-sessionInfo", app_id)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageMetadata {
    /// Milliseconds since the Unix epoch.
    pub expires_at: i64,
    pub created_at: i64,
    /// Time-to-live in milliseconds.
    pub ttl: u64,
}

/// TTL wrapper written when a caller requests expiry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageEnvelope {
    pub value: Value,
    pub metadata: StorageMetadata,
}

impl StorageEnvelope {
    pub fn new(value: Value, ttl_ms: u64, now_ms: i64) -> Self {
        let ttl_offset = i64::try_from(ttl_ms).unwrap_or(i64::MAX);
        Self {
            value,
            metadata: StorageMetadata {
                expires_at: now_ms.saturating_add(ttl_offset),
                created_at: now_ms,
                ttl: ttl_ms,
            },
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.metadata.expires_at
    }

    /// Recognizes a stored JSON value as an envelope.
    pub fn from_stored(stored: &Value) -> Option<Self> {
        let object = stored.as_object()?;
        if object.len() != 2 || !object.contains_key("value") {
            return None;
        }
        serde_json::from_value(stored.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_follow_layout() {
        assert_eq!(storage_key("prefs", "theme"), "prefs:theme");
        assert_eq!(session_info_key("shop"), "shop-sessionInfo");
    }

    #[test]
    fn envelope_round_trips_camel_case_metadata() {
        let envelope = StorageEnvelope::new(json!({"a": 1}), 500, 1_000);
        let stored = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(stored["metadata"]["expiresAt"], json!(1_500));
        let parsed = StorageEnvelope::from_stored(&stored).expect("envelope");
        assert!(!parsed.is_expired(1_499));
        assert!(parsed.is_expired(1_500));
    }

    #[test]
    fn plain_values_are_not_envelopes() {
        assert!(StorageEnvelope::from_stored(&json!({"value": 1})).is_none());
        assert!(StorageEnvelope::from_stored(&json!("text")).is_none());
    }
}
