//! Locating `{{ ... }}` markers.
//!
//! The closing `}}` is matched with brace depth and quote awareness, so a
//! marker may contain object literals or quoted braces.

use super::ResolveError;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum MarkerScan<'a> {
    Complete { start: usize, end: usize, inner: &'a str },
    /// An opening `{{` with no closing `}}` anywhere after it.
    Incomplete { start: usize },
    NotFound,
}

/// Find the next marker at or after `from`.
pub(crate) fn next_marker(text: &str, from: usize) -> Result<MarkerScan<'_>, ResolveError> {
    let Some(relative) = text[from..].find("{{") else {
        return Ok(MarkerScan::NotFound);
    };
    let start = from + relative;
    let body_start = start + 2;

    if let Some(inner_end) = balanced_close(&text[body_start..]) {
        let end = body_start + inner_end + 2;
        return Ok(MarkerScan::Complete {
            start,
            end,
            inner: &text[body_start..body_start + inner_end],
        });
    }

    match text[body_start..].find("}}") {
        Some(naive_end) => {
            let inner = &text[body_start..body_start + naive_end];
            let trimmed = inner.trim_start();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                return Err(ResolveError::Malformed {
                    marker: format!("{{{{{}}}}}", inner),
                    reason: "unbalanced delimiters in literal".into(),
                });
            }
            Ok(MarkerScan::Complete {
                start,
                end: body_start + naive_end + 2,
                inner,
            })
        }
        None => Ok(MarkerScan::Incomplete { start }),
    }
}

/// Byte offset of the `}}` closing a marker body, honoring nesting.
fn balanced_close(body: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escaped = false;
    let bytes = body.as_bytes();
    for (index, character) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        let quoted = in_single_quote || in_double_quote;
        match character {
            '\\' if quoted => escaped = true,
            '\'' if !in_double_quote => in_single_quote = !in_single_quote,
            '"' if !in_single_quote => in_double_quote = !in_double_quote,
            '{' | '[' if !quoted => depth += 1,
            ']' if !quoted => depth -= 1,
            '}' if !quoted => {
                if depth > 0 {
                    depth -= 1;
                } else if bytes.get(index + 1) == Some(&b'}') {
                    return Some(index);
                } else {
                    return None;
                }
            }
            _ => {}
        }
        if depth < 0 {
            return None;
        }
    }
    None
}

/// The inner text when `text` is exactly one complete marker.
pub(crate) fn whole_marker(text: &str) -> Result<Option<&str>, ResolveError> {
    let trimmed = text.trim();
    match next_marker(trimmed, 0)? {
        MarkerScan::Complete { start: 0, end, inner } if end == trimmed.len() => Ok(Some(inner)),
        _ => Ok(None),
    }
}

/// An incomplete first marker has no `}}` after it, so nothing later can close.
pub(crate) fn has_complete_marker(text: &str) -> Result<bool, ResolveError> {
    Ok(matches!(next_marker(text, 0)?, MarkerScan::Complete { .. }))
}

/// True when the delimiters of a literal are balanced outside quotes.
pub(crate) fn is_balanced(text: &str) -> bool {
    let mut stack = Vec::new();
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    for character in text.chars() {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if character == '\\' {
                escaped = true;
            } else if character == quote {
                in_string = None;
            }
            continue;
        }
        match character {
            '"' | '\'' => in_string = Some(character),
            '{' | '[' => stack.push(character),
            '}' => {
                if stack.pop() != Some('{') {
                    return false;
                }
            }
            ']' => {
                if stack.pop() != Some('[') {
                    return false;
                }
            }
            _ => {}
        }
    }
    stack.is_empty() && in_string.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_simple_and_nested_markers() {
        assert_eq!(
            next_marker("Hi {{user.name}}!", 0).unwrap(),
            MarkerScan::Complete {
                start: 3,
                end: 16,
                inner: "user.name"
            }
        );
        assert_eq!(whole_marker(r#" {{ {"a": {"b": 1}} }} "#).unwrap(), Some(r#" {"a": {"b": 1}} "#));
        assert_eq!(whole_marker("{{ state.x == '}}' }}").unwrap(), Some(" state.x == '}}' "));
    }

    #[test]
    fn unclosed_marker_is_incomplete() {
        assert_eq!(next_marker("price {{ state.x", 0).unwrap(), MarkerScan::Incomplete { start: 6 });
        assert!(!has_complete_marker("price {{ state.x").unwrap());
    }

    #[test]
    fn unbalanced_literal_marker_is_malformed() {
        assert!(matches!(next_marker(r#"{{ {"a": 1 }}"#, 0), Err(ResolveError::Malformed { .. })));
    }

    #[test]
    fn balance_ignores_quoted_brackets() {
        assert!(is_balanced(r#"{"a": "]"}"#));
        assert!(!is_balanced(r#"{"a": [1}"#));
    }
}
