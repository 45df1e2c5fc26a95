//! State store command records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Mutation applied at a dot path of the state tree.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum StateOperation {
    #[default]
    Set,
    Merge,
    Append,
    Prepend,
    Delete,
    Toggle,
    Increment,
    Decrement,
}

/// Command dispatched to the host state store.
///
/// `key` is a dot path rooted at the view id, for example
/// `pageA.btn1.text`. `operation_config` carries per-operation options such
/// as `step` for counters or `unique` and `maxLength` for list edits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SetPartial {
    pub key: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub operation_type: StateOperation,
    #[serde(default)]
    pub operation_config: Map<String, Value>,
}

impl SetPartial {
    pub fn set(key: impl Into<String>, payload: Value) -> Self {
        Self {
            key: key.into(),
            payload,
            operation_type: StateOperation::Set,
            operation_config: Map::new(),
        }
    }

    pub fn with_operation(mut self, operation: StateOperation) -> Self {
        self.operation_type = operation;
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: Value) -> Self {
        self.operation_config.insert(name.into(), value);
        self
    }
}
