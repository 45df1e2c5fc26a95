//! Pure helper functions callable from sandboxed expressions.
//!
//! The table is closed: a call to any other name is a sandbox violation.
//! Helpers never touch the host; they only transform their arguments.

use heck::{ToKebabCase, ToLowerCamelCase, ToSnakeCase};
use serde_json::{Value, json};
use trellis_util::lookup;

use super::{ExprError, display_string, truthy};

/// Names of every helper, for diagnostics.
pub const HELPER_NAMES: &[&str] = &[
    "classAdd",
    "classRemove",
    "classToggle",
    "classHas",
    "upper",
    "lower",
    "capitalize",
    "camelCase",
    "snakeCase",
    "kebabCase",
    "trim",
    "get",
    "select",
    "coalesce",
    "len",
    "concat",
    "toString",
    "toNumber",
];

pub fn is_helper(name: &str) -> bool {
    HELPER_NAMES.contains(&name)
}

/// Invoke a helper with already-evaluated arguments.
pub(crate) fn call(name: &str, arguments: Vec<Option<Value>>) -> Result<Option<Value>, ExprError> {
    let text = |index: usize| display_string(arguments.get(index).and_then(Option::as_ref));
    let result = match name {
        "classAdd" => json!(class_add(&text(0), &class_names(&arguments[1.min(arguments.len())..]))),
        "classRemove" => json!(class_remove(&text(0), &class_names(&arguments[1.min(arguments.len())..]))),
        "classToggle" => {
            expect_arguments(name, &arguments, 2)?;
            let force = arguments.get(2).and_then(|value| value.as_ref()).map(|value| truthy(Some(value)));
            json!(class_toggle(&text(0), &text(1), force))
        }
        "classHas" => {
            expect_arguments(name, &arguments, 2)?;
            json!(class_tokens(&text(0)).any(|token| token == text(1)))
        }
        "upper" => json!(text(0).to_uppercase()),
        "lower" => json!(text(0).to_lowercase()),
        "capitalize" => json!(capitalize(&text(0))),
        "camelCase" => json!(text(0).to_lower_camel_case()),
        "snakeCase" => json!(text(0).to_snake_case()),
        "kebabCase" => json!(text(0).to_kebab_case()),
        "trim" => json!(text(0).trim()),
        "get" => {
            expect_arguments(name, &arguments, 2)?;
            let found = arguments[0].as_ref().and_then(|object| lookup(object, &text(1)).cloned());
            return Ok(found.or_else(|| arguments.get(2).cloned().flatten()));
        }
        "select" => {
            expect_arguments(name, &arguments, 3)?;
            let chosen = if truthy(arguments[0].as_ref()) { &arguments[1] } else { &arguments[2] };
            return Ok(chosen.clone());
        }
        "coalesce" => {
            return Ok(arguments.into_iter().flatten().find(|value| !value.is_null()));
        }
        "len" => {
            let length = match arguments.first().and_then(Option::as_ref) {
                Some(Value::String(text)) => text.chars().count(),
                Some(Value::Array(items)) => items.len(),
                Some(Value::Object(map)) => map.len(),
                _ => 0,
            };
            json!(length)
        }
        "concat" => concat(arguments),
        "toString" => json!(text(0)),
        "toNumber" => to_number(arguments.first().and_then(Option::as_ref)),
        other => return Err(ExprError::UnknownFunction(other.to_string())),
    };
    Ok(Some(result))
}

fn expect_arguments(name: &str, arguments: &[Option<Value>], minimum: usize) -> Result<(), ExprError> {
    if arguments.len() < minimum {
        return Err(ExprError::InvalidArguments {
            function: name.to_string(),
            reason: format!("expected at least {} argument(s), got {}", minimum, arguments.len()),
        });
    }
    Ok(())
}

fn class_names(arguments: &[Option<Value>]) -> Vec<String> {
    arguments
        .iter()
        .flat_map(|argument| {
            let text = display_string(argument.as_ref());
            class_tokens(&text).map(str::to_string).collect::<Vec<_>>()
        })
        .collect()
}

fn class_tokens(classes: &str) -> impl Iterator<Item = &str> {
    classes.split_whitespace()
}

/// Add class names, keeping existing order and skipping duplicates.
pub fn class_add(classes: &str, names: &[String]) -> String {
    let mut tokens: Vec<&str> = Vec::new();
    for token in class_tokens(classes).chain(names.iter().map(String::as_str)) {
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens.join(" ")
}

pub fn class_remove(classes: &str, names: &[String]) -> String {
    class_tokens(classes)
        .filter(|token| !names.iter().any(|name| name == token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Toggle one class; `force` pins the outcome like `DOMTokenList.toggle`.
pub fn class_toggle(classes: &str, name: &str, force: Option<bool>) -> String {
    let present = class_tokens(classes).any(|token| token == name);
    let want = force.unwrap_or(!present);
    let names = [name.to_string()];
    if want { class_add(classes, &names) } else { class_remove(classes, &names) }
}

fn capitalize(text: &str) -> String {
    let mut characters = text.chars();
    match characters.next() {
        Some(first) => first.to_uppercase().chain(characters).collect(),
        None => String::new(),
    }
}

fn concat(arguments: Vec<Option<Value>>) -> Value {
    if matches!(arguments.first(), Some(Some(Value::Array(_)))) {
        let mut items = Vec::new();
        for argument in arguments.into_iter().flatten() {
            match argument {
                Value::Array(values) => items.extend(values),
                other => items.push(other),
            }
        }
        return Value::Array(items);
    }
    let joined: String = arguments.iter().map(|argument| display_string(argument.as_ref())).collect();
    Value::String(joined)
}

fn to_number(value: Option<&Value>) -> Value {
    match value {
        Some(Value::Number(number)) => Value::Number(number.clone()),
        Some(Value::Bool(flag)) => json!(if *flag { 1 } else { 0 }),
        Some(Value::String(text)) => serde_json::from_str::<Value>(text.trim())
            .ok()
            .filter(Value::is_number)
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}
