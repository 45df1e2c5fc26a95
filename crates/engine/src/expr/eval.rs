use std::borrow::Cow;
use std::cmp::Ordering;

use serde_json::Value;
use thiserror::Error;
use tracing::trace;
use trellis_util::lookup;

use super::helpers;
use super::syntax::{
    Comparison, find_comparison, parse_string_literal, split_arguments, split_call, split_expression, split_path,
    strip_leading_negations, strip_wrapping_parens,
};

const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExprError {
    #[error("expression is empty")]
    Empty,

    #[error("unsupported expression '{0}'")]
    Unsupported(String),

    #[error("'{0}' is not available in this scope")]
    UnknownIdentifier(String),

    #[error("'{0}' is not an allowed function")]
    UnknownFunction(String),

    #[error("function calls are not allowed here: '{0}'")]
    CallsNotAllowed(String),

    #[error("{function}: {reason}")]
    InvalidArguments { function: String, reason: String },

    #[error("expression nesting is too deep")]
    TooDeep,
}

impl ExprError {
    /// Errors raised because the expression reached outside its scope.
    pub fn is_violation(&self) -> bool {
        matches!(
            self,
            ExprError::UnknownIdentifier(_) | ExprError::UnknownFunction(_) | ExprError::CallsNotAllowed(_)
        )
    }
}

/// Named roots an expression may read.
pub trait Scope {
    /// `None` when `name` is not a root this scope exposes.
    fn root(&self, name: &str) -> Option<Cow<'_, Value>>;
}

/// What an evaluation is permitted to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capabilities {
    /// Template expressions: data lookups and operators only. Unknown roots
    /// read as undefined.
    DataOnly,
    /// Inline code: adds the helper table. Unknown roots are violations.
    Sandbox,
}

pub struct Evaluator<'s> {
    scope: &'s dyn Scope,
    capabilities: Capabilities,
}

impl<'s> Evaluator<'s> {
    pub fn new(scope: &'s dyn Scope, capabilities: Capabilities) -> Self {
        Self { scope, capabilities }
    }

    /// Evaluate an expression; `Ok(None)` is JavaScript's `undefined`.
    pub fn evaluate(&self, expression: &str) -> Result<Option<Value>, ExprError> {
        self.eval(expression, 0)
    }

    /// Evaluate and coerce the result to a boolean.
    pub fn evaluate_truthy(&self, expression: &str) -> Result<bool, ExprError> {
        self.evaluate(expression).map(|value| truthy(value.as_ref()))
    }

    fn eval(&self, expression: &str, depth: usize) -> Result<Option<Value>, ExprError> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(ExprError::Empty);
        }
        if depth > MAX_DEPTH {
            return Err(ExprError::TooDeep);
        }

        if let Some(parts) = split_expression(expression, "||") {
            let mut last = None;
            for part in parts {
                last = self.eval(part, depth + 1)?;
                if truthy(last.as_ref()) {
                    break;
                }
            }
            return Ok(last);
        }

        if let Some(parts) = split_expression(expression, "&&") {
            let mut last = None;
            for part in parts {
                last = self.eval(part, depth + 1)?;
                if !truthy(last.as_ref()) {
                    break;
                }
            }
            return Ok(last);
        }

        if let Some((position, comparison)) = find_comparison(expression) {
            let left_expression = &expression[..position];
            let right_expression = &expression[position + comparison.symbol().len()..];
            if left_expression.trim().is_empty() || right_expression.trim().is_empty() {
                return Err(ExprError::Unsupported(expression.to_string()));
            }
            let left = self.eval(left_expression, depth + 1)?;
            let right = self.eval(right_expression, depth + 1)?;
            let outcome = compare(comparison, left.as_ref(), right.as_ref());
            trace!(operator = comparison.symbol(), outcome, "evaluated comparison");
            return Ok(Some(Value::Bool(outcome)));
        }

        let (negations, inner) = strip_leading_negations(expression);
        if negations > 0 {
            let value = self.eval(inner, depth + 1)?;
            let truth = truthy(value.as_ref());
            return Ok(Some(Value::Bool(if negations % 2 == 1 { !truth } else { truth })));
        }

        if let Some(inner) = strip_wrapping_parens(expression) {
            return self.eval(inner, depth + 1);
        }

        self.eval_operand(expression, depth)
    }

    fn eval_operand(&self, expression: &str, depth: usize) -> Result<Option<Value>, ExprError> {
        if let Some(text) = parse_string_literal(expression) {
            return Ok(Some(Value::String(text)));
        }
        match expression {
            "undefined" => return Ok(None),
            "null" => return Ok(Some(Value::Null)),
            "true" => return Ok(Some(Value::Bool(true))),
            "false" => return Ok(Some(Value::Bool(false))),
            _ => {}
        }
        if looks_numeric(expression)
            && let Ok(number) = serde_json::from_str::<Value>(expression)
            && number.is_number()
        {
            return Ok(Some(number));
        }
        if expression.starts_with('[') || expression.starts_with('{') {
            if let Ok(literal) = serde_json::from_str::<Value>(expression) {
                return Ok(Some(literal));
            }
            if let Some(body) = expression.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
                let mut items = Vec::new();
                for element in split_arguments(body) {
                    items.push(self.eval(element, depth + 1)?.unwrap_or(Value::Null));
                }
                return Ok(Some(Value::Array(items)));
            }
            return Err(ExprError::Unsupported(expression.to_string()));
        }

        if let Some((name, arguments)) = split_call(expression) {
            if self.capabilities == Capabilities::DataOnly {
                return Err(ExprError::CallsNotAllowed(name.to_string()));
            }
            if !helpers::is_helper(name) {
                return Err(ExprError::UnknownFunction(name.to_string()));
            }
            let mut values = Vec::new();
            for argument in split_arguments(arguments) {
                values.push(self.eval(argument, depth + 1)?);
            }
            return helpers::call(name, values);
        }

        let Some((root, path)) = split_path(expression) else {
            return Err(ExprError::Unsupported(expression.to_string()));
        };
        match self.scope.root(root) {
            Some(root_value) => Ok(lookup(&root_value, path).cloned()),
            None if self.capabilities == Capabilities::DataOnly => Ok(None),
            None => Err(ExprError::UnknownIdentifier(root.to_string())),
        }
    }
}

fn looks_numeric(expression: &str) -> bool {
    expression
        .chars()
        .next()
        .is_some_and(|character| character == '-' || character.is_ascii_digit())
}

/// JavaScript truthiness; `None` is `undefined`.
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn compare(comparison: Comparison, left: Option<&Value>, right: Option<&Value>) -> bool {
    match comparison {
        Comparison::StrictEq => strict_equals(left, right),
        Comparison::StrictNe => !strict_equals(left, right),
        Comparison::LooseEq => loose_equals(left, right),
        Comparison::LooseNe => !loose_equals(left, right),
        Comparison::Gt => ordering(left, right) == Some(Ordering::Greater),
        Comparison::Lt => ordering(left, right) == Some(Ordering::Less),
        Comparison::Ge => matches!(ordering(left, right), Some(Ordering::Greater | Ordering::Equal)),
        Comparison::Le => matches!(ordering(left, right), Some(Ordering::Less | Ordering::Equal)),
    }
}

fn strict_equals(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(Value::Number(a)), Some(Value::Number(b))) => a.as_f64() == b.as_f64(),
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn loose_equals(left: Option<&Value>, right: Option<&Value>) -> bool {
    let nullish = |value: Option<&Value>| matches!(value, None | Some(Value::Null));
    if nullish(left) || nullish(right) {
        return nullish(left) && nullish(right);
    }
    match (as_number(left), as_number(right)) {
        (Some(a), Some(b)) if !(left.is_some_and(Value::is_string) && right.is_some_and(Value::is_string)) => a == b,
        _ => strict_equals(left, right),
    }
}

fn ordering(left: Option<&Value>, right: Option<&Value>) -> Option<Ordering> {
    match (left?, right?) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (a, b) => as_number(Some(a))?.partial_cmp(&as_number(Some(b))?),
    }
}

fn as_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}
