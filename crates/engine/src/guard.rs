//! Detection of serialized function bodies in configuration.
//!
//! Configuration values that look like JavaScript functions are never
//! executed. The resolver returns them verbatim as inert strings. The
//! capability scan below only feeds diagnostics.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static FUNCTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"^\s*(async\s+)?function\b[^(]*\(").unwrap(),
        Regex::new(r"^\s*(async\s*)?\([^)]*\)\s*=>").unwrap(),
        Regex::new(r"^\s*(async\s+)?[A-Za-z_$][\w$]*\s*=>").unwrap(),
    ]
});

/// Host capabilities a serialized body would reach for if it were executed.
static CAPABILITY_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(localStorage|sessionStorage|document|window|globalThis|eval|Function|fetch|XMLHttpRequest|WebSocket|import|require|process|setTimeout|setInterval|cookie)\b",
    )
    .unwrap()
});

/// True when the text looks like a function declaration or arrow function.
pub fn looks_like_function(text: &str) -> bool {
    FUNCTION_PATTERNS.iter().any(|pattern| pattern.is_match(text))
}

/// Capability keywords mentioned in the text, deduplicated, in order.
pub fn scan_capabilities(text: &str) -> Vec<&str> {
    let mut found: Vec<&str> = Vec::new();
    for capture in CAPABILITY_KEYWORDS.find_iter(text) {
        if !found.contains(&capture.as_str()) {
            found.push(capture.as_str());
        }
    }
    found
}

/// Log a function-looking value that is being kept inert.
pub fn report_inert_function(text: &str) {
    let capabilities = scan_capabilities(text);
    if capabilities.is_empty() {
        return;
    }
    warn!(
        capabilities = %capabilities.join(","),
        "configuration contains a function body referencing host capabilities; kept as inert text"
    );
}
