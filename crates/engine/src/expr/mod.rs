//! Restricted expression language shared by templates and inline code.
//!
//! Supported: literals, dotted paths with `[index]` segments, `!`,
//! comparisons (`=== !== == != >= <= > <`), `&&`, `||`, parentheses and,
//! with [`Capabilities::Sandbox`], calls into a fixed helper table. There
//! are no assignments, loops, closures or host objects.

mod eval;
pub mod helpers;
mod syntax;

use serde_json::Value;

pub use eval::{Capabilities, Evaluator, ExprError, Scope, truthy};
pub use syntax::contains_expression_operator;

/// Text form used when a value is spliced into a string.
///
/// Strings are inserted as-is; null and undefined become empty.
pub fn display_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        Some(other) => other.to_string(),
    }
}
