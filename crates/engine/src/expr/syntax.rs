//! Top-level scanning helpers for expression text.
//!
//! Expressions are never tokenized up front. Operators are located at the
//! top level (outside quotes and brackets) and the text is split around
//! them, lowest precedence first.

/// Comparison operators, longest spelling first so `===` wins over `==`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Comparison {
    StrictEq,
    StrictNe,
    LooseEq,
    LooseNe,
    Ge,
    Le,
    Gt,
    Lt,
}

const COMPARISONS: &[(&str, Comparison)] = &[
    ("===", Comparison::StrictEq),
    ("!==", Comparison::StrictNe),
    ("==", Comparison::LooseEq),
    ("!=", Comparison::LooseNe),
    (">=", Comparison::Ge),
    ("<=", Comparison::Le),
    (">", Comparison::Gt),
    ("<", Comparison::Lt),
];

impl Comparison {
    pub(crate) fn symbol(self) -> &'static str {
        COMPARISONS
            .iter()
            .find(|(_, comparison)| *comparison == self)
            .map(|(symbol, _)| *symbol)
            .unwrap_or("==")
    }
}

/// True when the text contains any operator the evaluator understands.
pub fn contains_expression_operator(expression: &str) -> bool {
    ["&&", "||"].iter().any(|operator| find_top_level_operator(expression, operator).is_some())
        || find_comparison(expression).is_some()
        || find_top_level_operator(expression, "!").is_some()
}

/// Tracks quote and bracket nesting while walking expression text.
#[derive(Default)]
struct Nesting {
    in_single_quote: bool,
    in_double_quote: bool,
    escaped: bool,
    depth: i32,
}

impl Nesting {
    /// Feed one character; returns true when it sits at the top level and
    /// is not itself a quote or bracket.
    fn top_level(&mut self, character: char) -> bool {
        if self.escaped {
            self.escaped = false;
            return false;
        }
        let quoted = self.in_single_quote || self.in_double_quote;
        match character {
            '\\' if quoted => {
                self.escaped = true;
                false
            }
            '\'' if !self.in_double_quote => {
                self.in_single_quote = !self.in_single_quote;
                false
            }
            '"' if !self.in_single_quote => {
                self.in_double_quote = !self.in_double_quote;
                false
            }
            '(' | '[' | '{' if !quoted => {
                self.depth += 1;
                false
            }
            ')' | ']' | '}' if !quoted => {
                if self.depth > 0 {
                    self.depth -= 1;
                }
                false
            }
            _ => !quoted && self.depth == 0,
        }
    }
}

pub(crate) fn find_top_level_operator(expression: &str, operator: &str) -> Option<usize> {
    let mut nesting = Nesting::default();
    for (index, character) in expression.char_indices() {
        if nesting.top_level(character) && expression[index..].starts_with(operator) {
            return Some(index);
        }
    }
    None
}

/// Rightmost top-level comparison, so chains associate to the left.
pub(crate) fn find_comparison(expression: &str) -> Option<(usize, Comparison)> {
    let mut nesting = Nesting::default();
    let mut found = None;
    let mut skip_until = 0usize;
    for (index, character) in expression.char_indices() {
        let top_level = nesting.top_level(character);
        if index < skip_until || !top_level {
            continue;
        }
        let rest = &expression[index..];
        if let Some((symbol, comparison)) = COMPARISONS.iter().find(|(symbol, _)| rest.starts_with(symbol)) {
            found = Some((index, *comparison));
            skip_until = index + symbol.len();
        }
    }
    found
}

pub(crate) fn split_expression<'a>(expression: &'a str, operator: &str) -> Option<Vec<&'a str>> {
    let mut parts = Vec::new();
    let mut start = 0usize;
    let length = expression.len();

    while start < length {
        if let Some(relative_index) = find_top_level_operator(&expression[start..], operator) {
            let absolute_index = start + relative_index;
            parts.push(expression[start..absolute_index].trim());
            start = absolute_index + operator.len();
        } else {
            parts.push(expression[start..].trim());
            break;
        }
    }

    if parts.len() > 1 { Some(parts) } else { None }
}

pub(crate) fn strip_leading_negations(expression: &str) -> (usize, &str) {
    let mut count = 0usize;
    let mut remainder = expression.trim_start();
    while let Some(stripped) = remainder.strip_prefix('!') {
        if stripped.starts_with('=') {
            break;
        }
        count += 1;
        remainder = stripped.trim_start();
    }
    (count, remainder)
}

/// Inner text when the whole expression is wrapped in one pair of parens.
pub(crate) fn strip_wrapping_parens(expression: &str) -> Option<&str> {
    let inner = expression.strip_prefix('(')?.strip_suffix(')')?;
    let mut nesting = Nesting::default();
    // The opening paren must not close before the end.
    nesting.top_level('(');
    for character in inner.chars() {
        nesting.top_level(character);
        if nesting.depth == 0 {
            return None;
        }
    }
    Some(inner)
}

/// Split call arguments on top-level commas.
pub(crate) fn split_arguments(arguments: &str) -> Vec<&str> {
    if arguments.trim().is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut nesting = Nesting::default();
    let mut start = 0usize;
    for (index, character) in arguments.char_indices() {
        if nesting.top_level(character) && character == ',' {
            parts.push(arguments[start..index].trim());
            start = index + 1;
        }
    }
    parts.push(arguments[start..].trim());
    parts
}

/// `name(args)` where the parens span the rest of the expression.
pub(crate) fn split_call(expression: &str) -> Option<(&str, &str)> {
    let open = expression.find('(')?;
    let name = expression[..open].trim();
    if !is_identifier(name) {
        return None;
    }
    let call_part = &expression[open..];
    strip_wrapping_parens(call_part).map(|arguments| (name, arguments))
}

pub(crate) fn is_identifier(text: &str) -> bool {
    let mut characters = text.chars();
    match characters.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    characters.all(|character| character.is_ascii_alphanumeric() || character == '_' || character == '$')
}

/// Root identifier and the remaining path of a plain path expression.
pub(crate) fn split_path(expression: &str) -> Option<(&str, &str)> {
    let root_end = expression.find(['.', '[']).unwrap_or(expression.len());
    let (root, rest) = expression.split_at(root_end);
    if !is_identifier(root) {
        return None;
    }
    let valid_rest = rest
        .chars()
        .all(|character| character.is_ascii_alphanumeric() || matches!(character, '_' | '$' | '-' | '.' | '[' | ']'));
    if valid_rest { Some((root, rest)) } else { None }
}

/// Parse a fully quoted string literal with `\` escapes.
pub(crate) fn parse_string_literal(expression: &str) -> Option<String> {
    let quote = expression.chars().next().filter(|character| *character == '\'' || *character == '"')?;
    let body = expression.strip_prefix(quote)?.strip_suffix(quote)?;
    let mut out = String::with_capacity(body.len());
    let mut characters = body.chars();
    while let Some(character) = characters.next() {
        match character {
            '\\' => match characters.next()? {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                other => out.push(other),
            },
            c if c == quote => return None,
            other => out.push(other),
        }
    }
    Some(out)
}
