//! Mapping and default rule evaluation for instantiated elements.
//!
//! A rule value takes one of three forms:
//!
//! - inline code (`code:<expr>` or `{{code:<expr>}}`), evaluated with the
//!   helper table against a scope that only exposes `item`, `index`, `self`,
//!   `element` and `blueprint`;
//! - a className operation list such as `+active; -hidden?{{item.done}}`;
//! - anything else, resolved as an ordinary template.

use serde_json::{Value, json};
use tracing::warn;
use trellis_types::{Element, FieldRule};

use crate::expr::helpers::{class_add, class_remove, class_toggle};
use crate::guard::looks_like_function;
use crate::resolve::{ResolveScope, Resolver, Template};

use super::InstantiateError;

pub const CLASS_NAME_FIELD: &str = "className";

/// Where a rule's value ends up and what it may read.
pub(crate) struct RuleTarget<'a> {
    pub element: &'a Element,
    pub blueprint_id: &'a str,
    /// The element's current state slice.
    pub slice: Option<&'a Value>,
    pub item: Option<&'a Value>,
    pub index: Option<usize>,
}

impl RuleTarget<'_> {
    fn metadata(&self) -> Value {
        json!({
            "id": self.element.id,
            "originId": self.element.origin_id,
            "type": self.element.kind,
            "parent": self.element.parent,
            "viewId": self.element.view_id,
        })
    }

    /// Constrained scope for inline code.
    fn sandbox_scope(&self) -> ResolveScope {
        ResolveScope::new()
            .with_root("item", self.item.cloned().unwrap_or(Value::Null))
            .with_root("index", self.index.map(|index| json!(index)).unwrap_or(Value::Null))
            .with_root("self", self.slice.cloned().unwrap_or(Value::Null))
            .with_root("element", self.metadata())
            .with_root("blueprint", json!({ "id": self.blueprint_id }))
    }
}

/// Inline code carried by a rule value, if any.
pub fn inline_code(value: &Value) -> Option<&str> {
    let text = value.as_str()?.trim();
    if let Some(code) = text.strip_prefix("code:") {
        return Some(code.trim());
    }
    text.strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
        .map(str::trim)
        .and_then(|inner| inner.strip_prefix("code:"))
        .map(str::trim)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassOp {
    Add,
    Remove,
    Toggle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDirective {
    pub op: ClassOp,
    pub names: Vec<String>,
    pub condition: Option<String>,
}

/// Parse `+a b; -c?cond; ~d`. Returns `None` unless every part is an op.
pub fn parse_class_ops(text: &str) -> Option<Vec<ClassDirective>> {
    let mut directives = Vec::new();
    for part in text.split(';').map(str::trim).filter(|part| !part.is_empty()) {
        let mut chars = part.chars();
        let op = match chars.next()? {
            '+' => ClassOp::Add,
            '-' => ClassOp::Remove,
            '~' => ClassOp::Toggle,
            _ => return None,
        };
        let rest = chars.as_str();
        let (names, condition) = match rest.split_once('?') {
            Some((names, condition)) => (names, Some(condition.trim().to_string())),
            None => (rest, None),
        };
        let names: Vec<String> = names.split_whitespace().map(str::to_string).collect();
        if names.is_empty() {
            return None;
        }
        directives.push(ClassDirective { op, names, condition });
    }
    (!directives.is_empty()).then_some(directives)
}

/// Compute the value a rule writes, or `None` when it resolves to undefined.
pub(crate) fn evaluate_rule(
    resolver: &Resolver,
    rule: &FieldRule,
    target: &RuleTarget<'_>,
    template_scope: &ResolveScope,
) -> Result<Option<Value>, InstantiateError> {
    if let Some(code) = inline_code(&rule.value) {
        return Ok(Some(run_code(resolver, rule, code, target)));
    }

    if rule.field == CLASS_NAME_FIELD
        && let Some(text) = rule.value.as_str()
        && !looks_like_function(text)
        && let Some(directives) = parse_class_ops(text)
    {
        let current = target
            .slice
            .and_then(|slice| slice.get(CLASS_NAME_FIELD))
            .or_else(|| target.element.config.get(CLASS_NAME_FIELD))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let mut classes = current.to_string();
        for directive in directives {
            let applies = directive
                .condition
                .as_deref()
                .is_none_or(|condition| resolver.evaluate_condition(condition, template_scope));
            if !applies {
                continue;
            }
            classes = match directive.op {
                ClassOp::Add => class_add(&classes, &directive.names),
                ClassOp::Remove => class_remove(&classes, &directive.names),
                ClassOp::Toggle => directive
                    .names
                    .iter()
                    .fold(classes, |acc, name| class_toggle(&acc, name, None)),
            };
        }
        return Ok(Some(Value::String(classes)));
    }

    Template::<Value>::new(rule.value.clone())
        .resolve(resolver, template_scope)
        .map_err(|error| InstantiateError::Rule {
            element: rule.element.clone(),
            field: rule.field.clone(),
            reason: error.to_string(),
        })
}

/// Failed or rejected code is kept as inert text.
fn run_code(resolver: &Resolver, rule: &FieldRule, code: &str, target: &RuleTarget<'_>) -> Value {
    match resolver.evaluate_code(code, &target.sandbox_scope()) {
        Ok(value) => value.unwrap_or(Value::Null),
        Err(error) => {
            warn!(
                element = %target.element.id,
                field = %rule.field,
                violation = error.is_violation(),
                error = %error,
                "rule code rejected; storing it as inert text"
            );
            rule.value.clone()
        }
    }
}
