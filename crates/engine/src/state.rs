//! Host state store seam and an in-memory implementation.
//!
//! The state tree is keyed by view id, then element id, then field. Commands
//! address it with dot paths such as `pageA.btn1.text`.

use std::sync::{PoisonError, RwLock};

use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::debug;
use trellis_types::{SetPartial, StateOperation};
use trellis_util::{PathError, lookup, lookup_mut, remove_path, set_path};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StateError {
    #[error("state key cannot be empty")]
    EmptyKey,

    #[error("cannot {operation} at '{key}': expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        operation: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error(transparent)]
    Path(#[from] PathError),
}

/// Dispatch target for state commands.
pub trait StateStore: Send + Sync {
    fn dispatch(&self, command: SetPartial) -> Result<(), StateError>;

    /// Snapshot of the full state tree.
    fn get_state(&self) -> Value;

    /// Value at a dot path, if present.
    fn get(&self, path: &str) -> Option<Value> {
        lookup(&self.get_state(), path).cloned()
    }
}

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    tree: RwLock<Value>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::with_state(Value::Object(Map::new()))
    }

    pub fn with_state(initial: Value) -> Self {
        let initial = if initial.is_object() { initial } else { Value::Object(Map::new()) };
        Self {
            tree: RwLock::new(initial),
        }
    }
}

impl StateStore for MemoryStateStore {
    fn dispatch(&self, command: SetPartial) -> Result<(), StateError> {
        if command.key.trim().is_empty() {
            return Err(StateError::EmptyKey);
        }
        let mut tree = self.tree.write().unwrap_or_else(PoisonError::into_inner);
        debug!(key = %command.key, operation = ?command.operation_type, "dispatching state command");
        apply(&mut tree, command)
    }

    fn get_state(&self) -> Value {
        self.tree.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn get(&self, path: &str) -> Option<Value> {
        let tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);
        lookup(&tree, path).cloned()
    }
}

/// Apply a command to a state tree in place.
pub fn apply(tree: &mut Value, command: SetPartial) -> Result<(), StateError> {
    let SetPartial {
        key,
        payload,
        operation_type,
        operation_config,
    } = command;

    match operation_type {
        StateOperation::Set => set_path(tree, &key, payload)?,
        StateOperation::Merge => {
            let incoming = match payload {
                Value::Object(incoming) => incoming,
                other => return Err(mismatch(&key, "merge", "object payload", &other)),
            };
            match lookup_mut(tree, &key) {
                Some(Value::Object(existing)) => existing.extend(incoming),
                _ => set_path(tree, &key, Value::Object(incoming))?,
            }
        }
        StateOperation::Append | StateOperation::Prepend => {
            let prepend = operation_type == StateOperation::Prepend;
            let unique = option_bool(&operation_config, "unique");
            let spread = option_bool(&operation_config, "spread");
            let max_length = operation_config.get("maxLength").and_then(Value::as_u64).map(|n| n as usize);

            let mut items = match lookup(tree, &key) {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items.clone(),
                Some(other) => return Err(mismatch(&key, "append", "array", other)),
            };
            let incoming = match payload {
                Value::Array(values) if spread => values,
                other => vec![other],
            };
            for value in incoming {
                if unique && items.contains(&value) {
                    continue;
                }
                if prepend {
                    items.insert(0, value);
                } else {
                    items.push(value);
                }
            }
            if let Some(limit) = max_length
                && items.len() > limit
            {
                if prepend {
                    items.truncate(limit);
                } else {
                    items.drain(..items.len() - limit);
                }
            }
            set_path(tree, &key, Value::Array(items))?;
        }
        StateOperation::Delete => match (lookup_mut(tree, &key), &payload) {
            (Some(Value::Array(items)), _) if operation_config.contains_key("index") => {
                if let Some(index) = operation_config.get("index").and_then(Value::as_u64).map(|n| n as usize)
                    && index < items.len()
                {
                    items.remove(index);
                }
            }
            (Some(Value::Array(items)), value) if !value.is_null() => items.retain(|item| item != value),
            (Some(Value::Object(map)), Value::String(field)) => {
                map.remove(field);
            }
            _ => {
                remove_path(tree, &key);
            }
        },
        StateOperation::Toggle => {
            let next = match lookup(tree, &key) {
                None | Some(Value::Null) => true,
                Some(Value::Bool(current)) => !current,
                Some(other) => return Err(mismatch(&key, "toggle", "boolean", other)),
            };
            set_path(tree, &key, Value::Bool(next))?;
        }
        StateOperation::Increment | StateOperation::Decrement => {
            let step = operation_config
                .get("step")
                .and_then(Value::as_f64)
                .or_else(|| payload.as_f64())
                .unwrap_or(1.0);
            let signed_step = if operation_type == StateOperation::Decrement { -step } else { step };
            let current = match lookup(tree, &key) {
                None | Some(Value::Null) => 0.0,
                Some(Value::Number(number)) => number.as_f64().unwrap_or_default(),
                Some(other) => return Err(mismatch(&key, "increment", "number", other)),
            };
            set_path(tree, &key, number_value(current + signed_step))?;
        }
    }
    Ok(())
}

/// Integral results stay integers so `1 + 1` is stored as `2`, not `2.0`.
fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

fn option_bool(config: &Map<String, Value>, name: &str) -> bool {
    config.get(name).and_then(Value::as_bool).unwrap_or(false)
}

fn mismatch(key: &str, operation: &'static str, expected: &'static str, found: &Value) -> StateError {
    StateError::TypeMismatch {
        key: key.to_string(),
        operation,
        expected,
        found: found.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStateStore {
        MemoryStateStore::with_state(json!({"pageA": {"btn1": {"text": "Hi", "count": 1, "tags": ["a"]}}}))
    }

    #[test]
    fn set_and_get_by_dot_path() {
        let store = store();
        store.dispatch(SetPartial::set("pageA.btn1.text", json!("Bye"))).expect("set");
        assert_eq!(store.get("pageA.btn1.text"), Some(json!("Bye")));
    }

    #[test]
    fn merge_extends_existing_object() {
        let store = store();
        store
            .dispatch(SetPartial::set("pageA.btn1", json!({"color": "red"})).with_operation(StateOperation::Merge))
            .expect("merge");
        assert_eq!(store.get("pageA.btn1.text"), Some(json!("Hi")));
        assert_eq!(store.get("pageA.btn1.color"), Some(json!("red")));
    }

    #[test]
    fn append_respects_unique_and_max_length() {
        let store = store();
        let append = |value: Value| {
            SetPartial::set("pageA.btn1.tags", value)
                .with_operation(StateOperation::Append)
                .with_option("unique", json!(true))
                .with_option("maxLength", json!(2))
        };
        store.dispatch(append(json!("a"))).expect("append");
        store.dispatch(append(json!("b"))).expect("append");
        store.dispatch(append(json!("c"))).expect("append");
        assert_eq!(store.get("pageA.btn1.tags"), Some(json!(["b", "c"])));
    }

    #[test]
    fn prepend_creates_missing_list() {
        let store = store();
        store
            .dispatch(SetPartial::set("pageA.list", json!(1)).with_operation(StateOperation::Prepend))
            .expect("prepend");
        assert_eq!(store.get("pageA.list"), Some(json!([1])));
    }

    #[test]
    fn counters_and_toggles() {
        let store = store();
        store
            .dispatch(SetPartial::set("pageA.btn1.count", Value::Null).with_operation(StateOperation::Increment))
            .expect("increment");
        store
            .dispatch(
                SetPartial::set("pageA.btn1.count", Value::Null)
                    .with_operation(StateOperation::Decrement)
                    .with_option("step", json!(5)),
            )
            .expect("decrement");
        store
            .dispatch(SetPartial::set("pageA.btn1.open", Value::Null).with_operation(StateOperation::Toggle))
            .expect("toggle");
        assert_eq!(store.get("pageA.btn1.count"), Some(json!(-3)));
        assert_eq!(store.get("pageA.btn1.open"), Some(json!(true)));
    }

    #[test]
    fn increment_on_text_is_a_type_mismatch() {
        let error = store()
            .dispatch(SetPartial::set("pageA.btn1.text", Value::Null).with_operation(StateOperation::Increment))
            .expect_err("mismatch");
        assert!(matches!(error, StateError::TypeMismatch { operation: "increment", .. }));
    }

    #[test]
    fn delete_removes_paths_and_list_items() {
        let store = store();
        store
            .dispatch(SetPartial::set("pageA.btn1.tags", json!("a")).with_operation(StateOperation::Delete))
            .expect("delete item");
        assert_eq!(store.get("pageA.btn1.tags"), Some(json!([])));
        store
            .dispatch(SetPartial::set("pageA.btn1.text", Value::Null).with_operation(StateOperation::Delete))
            .expect("delete path");
        assert_eq!(store.get("pageA.btn1.text"), None);
    }

    #[test]
    fn empty_key_is_rejected() {
        assert_eq!(store().dispatch(SetPartial::set(" ", json!(1))), Err(StateError::EmptyKey));
    }
}
