//! Per-trigger execution context.
//!
//! A context is created for each host event, mutated in place by the actions
//! of one pipeline run, and dropped afterwards. It is never shared between
//! concurrent runs; timers receive a [`ExecutionContext::fork`].

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use trellis_types::ElementBinding;

use crate::state::StateStore;

pub struct ExecutionContext {
    /// Payload of the triggering host event.
    pub event: Value,
    /// Successful action outputs keyed by action name.
    pub results: IndexMap<String, Value>,
    /// Structured error records keyed by action name.
    pub errors: IndexMap<String, Value>,
    pub page_params: Value,
    pub session_key: Option<String>,
    /// Window facts supplied by the host (location, viewport, ...).
    pub window: Value,
    /// Extra named roots such as `item` and `index`.
    pub extras: Map<String, Value>,
    /// Default element binding for `self.` lookups.
    pub binding: Option<ElementBinding>,
    state: Arc<dyn StateStore>,
}

impl ExecutionContext {
    pub fn new(state: Arc<dyn StateStore>) -> Self {
        Self {
            event: Value::Null,
            results: IndexMap::new(),
            errors: IndexMap::new(),
            page_params: Value::Object(Map::new()),
            session_key: None,
            window: Value::Object(Map::new()),
            extras: Map::new(),
            binding: None,
            state,
        }
    }

    pub fn with_event(mut self, event: Value) -> Self {
        self.event = event;
        self
    }

    pub fn with_page_params(mut self, page_params: Value) -> Self {
        self.page_params = page_params;
        self
    }

    pub fn with_window(mut self, window: Value) -> Self {
        self.window = window;
        self
    }

    pub fn with_session_key(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = Some(session_key.into());
        self
    }

    pub fn with_binding(mut self, binding: ElementBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn with_extra(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extras.insert(name.into(), value);
        self
    }

    pub fn state_store(&self) -> &Arc<dyn StateStore> {
        &self.state
    }

    pub fn state_snapshot(&self) -> Value {
        self.state.get_state()
    }

    /// Record a success; clears any earlier error under the same name.
    pub fn record_result(&mut self, name: &str, value: Value) {
        self.errors.shift_remove(name);
        self.results.insert(name.to_string(), value);
    }

    pub fn record_error(&mut self, name: &str, record: Value) {
        self.errors.insert(name.to_string(), record);
    }

    /// A fresh context for background work: same event, state store and
    /// binding, empty result and error maps.
    pub fn fork(&self) -> Self {
        Self {
            event: self.event.clone(),
            results: IndexMap::new(),
            errors: IndexMap::new(),
            page_params: self.page_params.clone(),
            session_key: self.session_key.clone(),
            window: self.window.clone(),
            extras: self.extras.clone(),
            binding: self.binding.clone(),
            state: Arc::clone(&self.state),
        }
    }

    pub(crate) fn results_value(&self) -> Value {
        Value::Object(self.results.iter().map(|(name, value)| (name.clone(), value.clone())).collect())
    }

    pub(crate) fn errors_value(&self) -> Value {
        Value::Object(self.errors.iter().map(|(name, value)| (name.clone(), value.clone())).collect())
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("event", &self.event)
            .field("results", &self.results)
            .field("errors", &self.errors)
            .field("page_params", &self.page_params)
            .field("session_key", &self.session_key)
            .field("binding", &self.binding)
            .finish_non_exhaustive()
    }
}
