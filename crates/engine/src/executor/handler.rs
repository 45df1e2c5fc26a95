//! The action handler contract.
//!
//! A handler declares its key, a configuration schema and a typed
//! configuration. The executor resolves templates, validates the result
//! against the schema and decodes it into `Config` before calling
//! [`ActionHandler::run`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use trellis_types::{ActionDescriptor, ConfigSchema, ElementBinding, StorageArea};

use super::{Executor, Services};
use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::resolve::{ResolveScope, Resolver, Template};
use crate::state::StateStore;

/// Successful handler output.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutput {
    pub value: Value,
    /// Attempts used, for handlers that retry.
    pub attempts: u32,
}

impl ActionOutput {
    pub fn new(value: Value) -> Self {
        Self { value, attempts: 1 }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

/// Everything a running handler may touch.
pub struct ActionEnv<'a> {
    pub executor: &'a Executor,
    pub context: &'a mut ExecutionContext,
    pub descriptor: &'a ActionDescriptor,
    /// Effective element binding: the descriptor's, else the context's.
    pub binding: Option<ElementBinding>,
}

impl ActionEnv<'_> {
    pub fn services(&self) -> &Services {
        self.executor.services()
    }

    pub fn resolver(&self) -> &Resolver {
        self.executor.resolver()
    }

    pub fn state(&self) -> Arc<dyn StateStore> {
        Arc::clone(self.context.state_store())
    }

    /// Fresh scope over the current context, for resolving deferred fields.
    pub fn scope(&self) -> ResolveScope {
        let local_store = self.services().storage.snapshot(StorageArea::Local);
        ResolveScope::from_context(&*self.context, self.binding.as_ref(), local_store)
    }
}

#[async_trait]
pub trait ActionHandler: Send + Sync + 'static {
    type Config: DeserializeOwned + Send;

    /// Registry key, e.g. `http.request`.
    const KEY: &'static str;

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new()
    }

    async fn run(&self, config: Self::Config, env: &mut ActionEnv<'_>) -> Result<ActionOutput, ActionError>;
}

/// Object-safe view of an [`ActionHandler`].
#[async_trait]
pub(crate) trait ErasedHandler: Send + Sync {
    fn key(&self) -> &'static str;

    fn schema(&self) -> ConfigSchema;

    async fn invoke(&self, config: Map<String, Value>, env: &mut ActionEnv<'_>) -> Result<ActionOutput, ActionError>;
}

pub(crate) struct Typed<H>(pub(crate) H);

#[async_trait]
impl<H: ActionHandler> ErasedHandler for Typed<H> {
    fn key(&self) -> &'static str {
        H::KEY
    }

    fn schema(&self) -> ConfigSchema {
        self.0.schema()
    }

    async fn invoke(&self, config: Map<String, Value>, env: &mut ActionEnv<'_>) -> Result<ActionOutput, ActionError> {
        let typed = Template::<H::Config>::decode(Value::Object(config))
            .map_err(|error| ActionError::configuration(format!("invalid configuration for '{}': {}", H::KEY, error)))?;
        self.0.run(typed, env).await
    }
}
