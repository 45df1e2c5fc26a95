//! `storage.set`, `storage.get` and `storage.remove`.
//!
//! Without a `namespace` the entry lives inside the app-scoped default
//! object; with one it is stored under `<namespace>:<key>`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use trellis_types::{ConfigSchema, FieldSpec, FieldType, StorageArea};

use crate::error::ActionError;
use crate::executor::{ActionEnv, ActionHandler, ActionOutput};
use crate::storage::StorageError;

fn storage_failure(error: StorageError) -> ActionError {
    ActionError::configuration(error.to_string())
}

fn location_schema() -> ConfigSchema {
    ConfigSchema::new()
        .field("key", FieldSpec::required(FieldType::String))
        .field("namespace", FieldSpec::optional(FieldType::String))
        .field(
            "area",
            FieldSpec::optional(FieldType::String).one_of([json!("local"), json!("session")]),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSetConfig {
    pub key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub area: StorageArea,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

pub struct StorageSetAction;

#[async_trait]
impl ActionHandler for StorageSetAction {
    type Config = StorageSetConfig;
    const KEY: &'static str = "storage.set";

    fn schema(&self) -> ConfigSchema {
        location_schema()
            .field("value", FieldSpec::optional(FieldType::Any))
            .field("ttlMs", FieldSpec::optional(FieldType::Number))
    }

    async fn run(&self, config: StorageSetConfig, env: &mut ActionEnv<'_>) -> Result<ActionOutput, ActionError> {
        env.services()
            .storage
            .write(config.area, config.namespace.as_deref(), &config.key, config.value.clone(), config.ttl_ms)
            .map_err(storage_failure)?;
        Ok(ActionOutput::new(json!({
            "key": config.key,
            "value": config.value,
            "ttlMs": config.ttl_ms,
        })))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageGetConfig {
    pub key: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub area: StorageArea,
    /// Returned when nothing (unexpired) is stored.
    #[serde(default)]
    pub default: Value,
}

pub struct StorageGetAction;

#[async_trait]
impl ActionHandler for StorageGetAction {
    type Config = StorageGetConfig;
    const KEY: &'static str = "storage.get";

    fn schema(&self) -> ConfigSchema {
        location_schema().field("default", FieldSpec::optional(FieldType::Any))
    }

    async fn run(&self, config: StorageGetConfig, env: &mut ActionEnv<'_>) -> Result<ActionOutput, ActionError> {
        let stored = env
            .services()
            .storage
            .read(config.area, config.namespace.as_deref(), &config.key)
            .map_err(storage_failure)?;
        Ok(ActionOutput::new(stored.unwrap_or(config.default)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageRemoveConfig {
    pub key: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub area: StorageArea,
}

pub struct StorageRemoveAction;

#[async_trait]
impl ActionHandler for StorageRemoveAction {
    type Config = StorageRemoveConfig;
    const KEY: &'static str = "storage.remove";

    fn schema(&self) -> ConfigSchema {
        location_schema()
    }

    async fn run(&self, config: StorageRemoveConfig, env: &mut ActionEnv<'_>) -> Result<ActionOutput, ActionError> {
        let removed = env
            .services()
            .storage
            .remove(config.area, config.namespace.as_deref(), &config.key)
            .map_err(storage_failure)?;
        Ok(ActionOutput::new(json!({ "key": config.key, "removed": removed })))
    }
}
