//! Template resolution for action configuration.
//!
//! Any configuration value may contain `{{ ... }}` markers. Resolution walks
//! objects and arrays structurally, keeps function-looking strings inert,
//! short-circuits a few scoped prefixes (`self.`, `element.`, ...), and
//! otherwise substitutes markers in bounded passes. A string that is exactly
//! one marker yields the typed value; markers inside larger strings are
//! spliced as text.

mod markers;
mod scope;
mod template;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};
use trellis_util::lookup;

use crate::expr::{Capabilities, Evaluator, ExprError, contains_expression_operator, display_string};
use crate::guard::{looks_like_function, report_inert_function};
use markers::{MarkerScan, has_complete_marker, is_balanced, next_marker, whole_marker};

pub use scope::{ResolveScope, TEMPLATE_ROOTS};
pub use template::{Template, TemplateError};

/// Default cap on substitution passes for one string.
pub const DEFAULT_MAX_PASSES: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("malformed template marker {marker}: {reason}")]
    Malformed { marker: String, reason: String },
    #[error("template still contains markers after {passes} passes")]
    PassLimit { passes: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct Resolver {
    max_passes: usize,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PASSES)
    }
}

impl Resolver {
    pub fn new(max_passes: usize) -> Self {
        Self {
            max_passes: max_passes.max(1),
        }
    }

    pub fn max_passes(&self) -> usize {
        self.max_passes
    }

    /// Resolve one value. `Ok(None)` means the value resolved to undefined.
    ///
    /// Hitting the pass cap is not an error here: the value is logged and
    /// treated as undefined.
    pub fn resolve(&self, raw: &Value, scope: &ResolveScope) -> Result<Option<Value>, ResolveError> {
        match raw {
            Value::String(text) => self.resolve_string(text, scope),
            Value::Array(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    resolved.push(self.resolve(item, scope)?.unwrap_or(Value::Null));
                }
                Ok(Some(Value::Array(resolved)))
            }
            Value::Object(fields) => Ok(Some(Value::Object(self.resolve_map(fields, scope, |_| false)?))),
            other => Ok(Some(other.clone())),
        }
    }

    /// Resolve every field of a configuration map except those `keep_raw`
    /// selects. Fields resolving to undefined are dropped.
    pub fn resolve_map(
        &self,
        raw: &Map<String, Value>,
        scope: &ResolveScope,
        keep_raw: impl Fn(&str) -> bool,
    ) -> Result<Map<String, Value>, ResolveError> {
        let mut resolved = Map::new();
        for (key, value) in raw {
            if keep_raw(key) {
                resolved.insert(key.clone(), value.clone());
                continue;
            }
            if let Some(value) = self.resolve(value, scope)? {
                resolved.insert(key.clone(), value);
            }
        }
        Ok(resolved)
    }

    /// Evaluate a data-only condition. Evaluation errors count as false.
    pub fn evaluate_condition(&self, expression: &str, scope: &ResolveScope) -> bool {
        let expression = strip_marker(expression);
        match Evaluator::new(scope, Capabilities::DataOnly).evaluate_truthy(expression) {
            Ok(flag) => flag,
            Err(error) => {
                debug!(expression, error = %error, "condition evaluation failed; treating as false");
                false
            }
        }
    }

    /// Evaluate inline code with the helper table enabled.
    pub fn evaluate_code(&self, code: &str, scope: &ResolveScope) -> Result<Option<Value>, ExprError> {
        let code = strip_marker(code);
        let code = code.strip_prefix("code:").map(str::trim).unwrap_or(code);
        Evaluator::new(scope, Capabilities::Sandbox).evaluate(code)
    }

    fn resolve_string(&self, text: &str, scope: &ResolveScope) -> Result<Option<Value>, ResolveError> {
        if looks_like_function(text) {
            report_inert_function(text);
            return Ok(Some(Value::String(text.to_string())));
        }

        if let Some(parsed) = deep_parse(text) {
            return match parsed {
                structured @ (Value::Object(_) | Value::Array(_)) => self.resolve(&structured, scope),
                scalar => Ok(Some(scalar)),
            };
        }

        if let Some(inner) = whole_marker(text)? {
            if let Some(scoped) = resolve_scoped(inner.trim(), scope) {
                return Ok(scoped);
            }
        }

        match self.interpolate(text, scope) {
            Err(ResolveError::PassLimit { passes }) => {
                warn!(passes, template = text, "template did not settle; resolving to undefined");
                Ok(None)
            }
            other => other,
        }
    }

    fn interpolate(&self, text: &str, scope: &ResolveScope) -> Result<Option<Value>, ResolveError> {
        let mut current = text.to_string();
        let mut passes = 0;
        loop {
            if let Some(inner) = whole_marker(&current)? {
                if passes >= self.max_passes {
                    return Err(ResolveError::PassLimit { passes });
                }
                passes += 1;
                match self.evaluate_marker(inner, scope)? {
                    Some(Value::String(next)) if has_complete_marker(&next)? => {
                        current = next;
                        continue;
                    }
                    value => return Ok(value),
                }
            }
            if !has_complete_marker(&current)? {
                break;
            }
            if passes >= self.max_passes {
                return Err(ResolveError::PassLimit { passes });
            }
            current = self.substitute_once(&current, scope)?;
            passes += 1;
        }
        Ok(Some(settle(current)))
    }

    /// Replace every complete marker in `text` with its display string.
    fn substitute_once(&self, text: &str, scope: &ResolveScope) -> Result<String, ResolveError> {
        let mut output = String::with_capacity(text.len());
        let mut cursor = 0;
        loop {
            match next_marker(text, cursor)? {
                MarkerScan::Complete { start, end, inner } => {
                    output.push_str(&text[cursor..start]);
                    let value = self.evaluate_marker(inner, scope)?;
                    output.push_str(&display_string(value.as_ref()));
                    cursor = end;
                }
                MarkerScan::Incomplete { .. } | MarkerScan::NotFound => {
                    output.push_str(&text[cursor..]);
                    return Ok(output);
                }
            }
        }
    }

    fn evaluate_marker(&self, inner: &str, scope: &ResolveScope) -> Result<Option<Value>, ResolveError> {
        let expression = inner.trim();
        if expression.is_empty() {
            return Ok(Some(Value::String(String::new())));
        }

        if expression.starts_with('{') || expression.starts_with('[') {
            if !is_balanced(expression) {
                return Err(ResolveError::Malformed {
                    marker: format!("{{{{{inner}}}}}"),
                    reason: "unbalanced delimiters in literal".into(),
                });
            }
            if let Ok(literal) = serde_json::from_str::<Value>(expression) {
                return Ok(Some(literal));
            }
        }

        let evaluator = Evaluator::new(scope, Capabilities::DataOnly);
        if contains_expression_operator(expression) {
            let flag = evaluator.evaluate_truthy(expression).unwrap_or_else(|error| {
                debug!(expression, error = %error, "template expression failed; treating as false");
                false
            });
            return Ok(Some(Value::Bool(flag)));
        }

        match evaluator.evaluate(expression) {
            Ok(Some(value)) => Ok(Some(value)),
            Ok(None) => Ok(Some(Value::String(String::new()))),
            Err(error) => {
                if error.is_violation() {
                    warn!(expression, error = %error, "template requested a capability it does not have");
                } else {
                    debug!(expression, error = %error, "template path could not be evaluated");
                }
                Ok(Some(Value::String(String::new())))
            }
        }
    }
}

/// Structured values and scalars serialized as strings.
fn deep_parse(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    match trimmed {
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        _ => {}
    }
    let first = trimmed.chars().next()?;
    let candidate = first == '{' || first == '[' || first == '-' || first.is_ascii_digit();
    if !candidate || trimmed.starts_with("{{") {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ (Value::Object(_) | Value::Array(_) | Value::Number(_))) => Some(value),
        _ => None,
    }
}

/// Fully substituted text is parsed as JSON when possible.
fn settle(text: String) -> Value {
    serde_json::from_str(text.trim()).unwrap_or(Value::String(text))
}

/// Prefixes answered without the general evaluator.
///
/// Returns `Some(None)` for a recognized prefix that resolves to undefined.
fn resolve_scoped(inner: &str, scope: &ResolveScope) -> Option<Option<Value>> {
    if contains_expression_operator(inner) {
        return None;
    }
    if let Some(path) = inner.strip_prefix("self.") {
        let value = scope.self_slice().and_then(|slice| lookup(slice, path)).cloned();
        return Some(value);
    }
    if inner.starts_with("tagKeys.") || inner.starts_with("antComponentKeys.") {
        let parts: Vec<&str> = inner.split('.').collect();
        let name = parts.get(2).or_else(|| parts.get(1)).copied().unwrap_or_default();
        return Some(Some(Value::String(name.to_string())));
    }
    for prefix in ["element.", "styleKeys."] {
        if let Some(rest) = inner.strip_prefix(prefix) {
            return Some(Some(Value::String(rest.to_string())));
        }
    }
    None
}

fn strip_marker(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
        .map(str::trim)
        .unwrap_or(trimmed)
}
