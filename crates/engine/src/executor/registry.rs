//! Action catalog: handler lookup by key.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;
use trellis_types::SchemaViolation;

use super::handler::{ActionHandler, ErasedHandler, Typed};

#[derive(Debug, Error, PartialEq)]
pub enum RegistrationError {
    #[error("action key must not be empty")]
    EmptyKey,
    #[error("action key '{0}' is already registered")]
    Duplicate(String),
    #[error("schema for '{key}' is inconsistent: {violation}")]
    InvalidSchema { key: String, violation: SchemaViolation },
}

/// Handlers keyed by action key. Keys are unique.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: BTreeMap<String, Box<dyn ErasedHandler>>,
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry").field("keys", &self.keys().collect::<Vec<_>>()).finish()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in action.
    pub fn with_builtin_actions() -> Result<Self, RegistrationError> {
        let mut registry = Self::new();
        crate::actions::register_builtin_actions(&mut registry)?;
        Ok(registry)
    }

    pub fn register<H: ActionHandler>(&mut self, handler: H) -> Result<(), RegistrationError> {
        let key = H::KEY;
        if key.trim().is_empty() {
            return Err(RegistrationError::EmptyKey);
        }
        if self.handlers.contains_key(key) {
            return Err(RegistrationError::Duplicate(key.to_string()));
        }
        handler
            .schema()
            .check_consistency()
            .map_err(|violation| RegistrationError::InvalidSchema {
                key: key.to_string(),
                violation,
            })?;
        debug!(key, "registered action handler");
        self.handlers.insert(key.to_string(), Box::new(Typed(handler)));
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handlers.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub(crate) fn get(&self, key: &str) -> Option<&dyn ErasedHandler> {
        self.handlers.get(key).map(Box::as_ref)
    }
}
