//! Raw configuration paired with the type it resolves into.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::{ResolveError, ResolveScope, Resolver};

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("resolved value does not fit the expected shape: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Unresolved value that decodes into `T` once its markers are substituted.
///
/// Keeping the raw form in its own type stops resolved and unresolved data
/// from being mixed up, and lets deferred fields travel unresolved inside a
/// typed configuration.
#[derive(Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Template<T> {
    raw: Value,
    #[serde(skip)]
    _target: PhantomData<fn() -> T>,
}

impl<T> Clone for Template<T> {
    fn clone(&self) -> Self {
        Self::new(self.raw.clone())
    }
}

impl<T> Template<T> {
    pub fn new(raw: Value) -> Self {
        Self {
            raw,
            _target: PhantomData,
        }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

impl<T: DeserializeOwned> Template<T> {
    /// Resolve and decode. `Ok(None)` when the template is undefined.
    pub fn resolve(&self, resolver: &Resolver, scope: &ResolveScope) -> Result<Option<T>, TemplateError> {
        match resolver.resolve(&self.raw, scope)? {
            Some(value) => Ok(Some(Self::decode(value)?)),
            None => Ok(None),
        }
    }

    /// Resolve the fields of an object template, leaving those `keep_raw`
    /// selects untouched. The result is still undecoded so it can be
    /// validated first.
    pub fn resolve_fields(
        &self,
        resolver: &Resolver,
        scope: &ResolveScope,
        keep_raw: impl Fn(&str) -> bool,
    ) -> Result<Map<String, Value>, ResolveError> {
        match &self.raw {
            Value::Object(fields) => resolver.resolve_map(fields, scope, keep_raw),
            _ => Ok(Map::new()),
        }
    }

    pub fn decode(value: Value) -> Result<T, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Target {
        url: String,
        retries: u32,
    }

    #[test]
    fn resolves_into_typed_value() {
        let scope = ResolveScope::new().with_root("state", json!({"base": "https://api.test", "n": 2}));
        let template: Template<Target> = Template::new(json!({"url": "{{state.base}}/items", "retries": "{{state.n}}"}));
        let target = template.resolve(&Resolver::default(), &scope).unwrap().unwrap();
        assert_eq!(
            target,
            Target {
                url: "https://api.test/items".into(),
                retries: 2
            }
        );
    }

    #[test]
    fn deferred_fields_stay_raw() {
        let scope = ResolveScope::new().with_root("state", json!({"x": 1}));
        let template: Template<Value> = Template::new(json!({"now": "{{state.x}}", "later": "{{state.x}}"}));
        let fields = template
            .resolve_fields(&Resolver::default(), &scope, |field| field == "later")
            .unwrap();
        assert_eq!(Value::Object(fields), json!({"now": 1, "later": "{{state.x}}"}));
    }

    #[test]
    fn deserializes_transparently() {
        let template: Template<String> = serde_json::from_value(json!("{{event.value}}")).unwrap();
        assert_eq!(template.raw(), &json!("{{event.value}}"));
    }
}
