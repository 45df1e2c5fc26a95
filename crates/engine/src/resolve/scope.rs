//! Named data sources visible to template expressions.

use std::borrow::Cow;

use serde_json::{Map, Value};
use trellis_types::ElementBinding;
use trellis_util::lookup;

use crate::context::ExecutionContext;
use crate::expr::Scope;

/// Root names a template may read from.
///
/// `controller` and `results` both expose prior action outputs.
pub const TEMPLATE_ROOTS: &[&str] = &[
    "event",
    "window",
    "localStore",
    "state",
    "controller",
    "results",
    "errors",
    "pageParams",
];

/// Snapshot of the data a resolution may read.
#[derive(Debug, Clone, Default)]
pub struct ResolveScope {
    roots: Map<String, Value>,
    binding: Option<ElementBinding>,
}

impl ResolveScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope over an execution context. `local_store` is the decoded
    /// app-scoped storage namespace.
    pub fn from_context(context: &ExecutionContext, binding: Option<&ElementBinding>, local_store: Value) -> Self {
        let results = context.results_value();
        let mut roots = Map::new();
        roots.insert("event".into(), context.event.clone());
        roots.insert("window".into(), context.window.clone());
        roots.insert("localStore".into(), local_store);
        roots.insert("state".into(), context.state_snapshot());
        roots.insert("controller".into(), results.clone());
        roots.insert("results".into(), results);
        roots.insert("errors".into(), context.errors_value());
        roots.insert("pageParams".into(), context.page_params.clone());
        for (name, value) in &context.extras {
            roots.insert(name.clone(), value.clone());
        }
        Self {
            roots,
            binding: binding.cloned().or_else(|| context.binding.clone()),
        }
    }

    pub fn with_root(mut self, name: impl Into<String>, value: Value) -> Self {
        self.roots.insert(name.into(), value);
        self
    }

    pub fn set_root(&mut self, name: impl Into<String>, value: Value) {
        self.roots.insert(name.into(), value);
    }

    pub fn with_binding(mut self, binding: Option<ElementBinding>) -> Self {
        self.binding = binding;
        self
    }

    pub fn binding(&self) -> Option<&ElementBinding> {
        self.binding.as_ref()
    }

    pub fn root_value(&self, name: &str) -> Option<&Value> {
        self.roots.get(name)
    }

    /// The bound element's state slice, if both binding and slice exist.
    pub fn self_slice(&self) -> Option<&Value> {
        let binding = self.binding.as_ref()?;
        let state = self.roots.get("state")?;
        lookup(state, &binding.state_path())
    }
}

impl Scope for ResolveScope {
    fn root(&self, name: &str) -> Option<Cow<'_, Value>> {
        if name == "self" {
            return Some(match self.self_slice() {
                Some(slice) => Cow::Borrowed(slice),
                None => Cow::Owned(Value::Null),
            });
        }
        self.roots.get(name).map(Cow::Borrowed)
    }
}
