//! Dot-path navigation over JSON values.
//!
//! Paths look like `a.b[0].c`. A numeric segment applied to an array is
//! treated as an index, so `items.0.id` and `items[0].id` are equivalent.

use serde_json::{Map, Value};
use thiserror::Error;

/// Largest array index a write may address. Writes past the end pad with
/// nulls, so the bound also caps how much a single write can allocate.
pub const MAX_ARRAY_INDEX: usize = 100_000;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("array index {index} in '{path}' exceeds the maximum of {max}", max = MAX_ARRAY_INDEX)]
    IndexTooLarge { path: String, index: usize },
}

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment<'a> {
    Key(&'a str),
    Index(usize),
}

/// Split a dot path into keys and bracketed indices.
pub fn parse_path(path: &str) -> Vec<PathSegment<'_>> {
    let mut segments = Vec::new();
    for segment in path.trim().split('.') {
        if segment.is_empty() {
            continue;
        }
        let (key, indices) = split_indices(segment);
        if !key.is_empty() {
            segments.push(PathSegment::Key(key));
        }
        segments.extend(indices.into_iter().map(PathSegment::Index));
    }
    segments
}

/// Select a nested JSON value by dot path.
///
/// Returns `None` when any segment is missing or applied to the wrong JSON
/// type. When `path` is `None` or blank, the input is cloned as-is.
pub fn select_path(value: &Value, path: Option<&str>) -> Option<Value> {
    let Some(path) = path else {
        return Some(value.clone());
    };
    lookup(value, path).cloned()
}

/// Borrowing variant of [`select_path`].
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in parse_path(path) {
        current = step(current, &segment)?;
    }
    Some(current)
}

fn step<'a>(current: &'a Value, segment: &PathSegment<'_>) -> Option<&'a Value> {
    match (segment, current) {
        (PathSegment::Key(key), Value::Object(map)) => map.get(*key),
        (PathSegment::Key(key), Value::Array(items)) => key.parse::<usize>().ok().and_then(|index| items.get(index)),
        (PathSegment::Index(index), Value::Array(items)) => items.get(*index),
        _ => None,
    }
}

/// Mutable lookup without creating intermediate nodes.
pub fn lookup_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = value;
    for segment in parse_path(path) {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.get_mut(key)?,
            (PathSegment::Key(key), Value::Array(items)) => items.get_mut(key.parse::<usize>().ok()?)?,
            (PathSegment::Index(index), Value::Array(items)) => items.get_mut(index)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write `new_value` at `path`, creating objects and arrays along the way.
///
/// Non-container intermediates are replaced. Array writes past the end pad
/// with nulls. The path is checked before anything is modified, so a
/// rejected write leaves `root` untouched.
pub fn set_path(root: &mut Value, path: &str, new_value: Value) -> Result<(), PathError> {
    let segments = parse_path(path);
    if let Some(index) = segments.iter().find_map(|segment| match segment {
        PathSegment::Index(index) if *index > MAX_ARRAY_INDEX => Some(*index),
        _ => None,
    }) {
        return Err(PathError::IndexTooLarge {
            path: path.to_string(),
            index,
        });
    }

    let mut current = root;
    for segment in segments {
        current = match segment {
            PathSegment::Key(key) => {
                if !current.is_object() {
                    *current = Value::Object(Map::new());
                }
                match current {
                    Value::Object(map) => map.entry(key.to_string()).or_insert(Value::Null),
                    _ => return Ok(()),
                }
            }
            PathSegment::Index(index) => {
                if !current.is_array() {
                    *current = Value::Array(Vec::new());
                }
                match current {
                    Value::Array(items) => {
                        if items.len() <= index {
                            items.resize(index + 1, Value::Null);
                        }
                        &mut items[index]
                    }
                    _ => return Ok(()),
                }
            }
        };
    }
    *current = new_value;
    Ok(())
}

/// Remove and return the value at `path`.
pub fn remove_path(root: &mut Value, path: &str) -> Option<Value> {
    let segments = parse_path(path);
    let (last, parents) = segments.split_last()?;
    let mut current = root;
    for segment in parents {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.get_mut(*key)?,
            (PathSegment::Index(index), Value::Array(items)) => items.get_mut(*index)?,
            _ => return None,
        };
    }
    match (last, current) {
        (PathSegment::Key(key), Value::Object(map)) => map.remove(*key),
        (PathSegment::Index(index), Value::Array(items)) if *index < items.len() => Some(items.remove(*index)),
        _ => None,
    }
}

fn split_indices(segment: &str) -> (&str, Vec<usize>) {
    let mut key_end = segment.len();
    let mut indices = Vec::new();
    let bytes = segment.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'[' {
            key_end = i;
            break;
        }
    }
    let key = &segment[..key_end];
    let mut i = key_end;
    while i < bytes.len() {
        if bytes[i] != b'[' {
            break;
        }
        i += 1; // skip [
        let start = i;
        while i < bytes.len() && bytes[i] != b']' {
            i += 1;
        }
        if i <= start {
            break;
        }
        if let Ok(n) = segment[start..i].trim().parse::<usize>() {
            indices.push(n);
        }
        i += 1; // skip ]
    }
    (key, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn selects_nested_keys_and_indices() {
        let value = json!({"items": [{"id": "a"}, {"id": "b", "tags": ["x", "y"]}]});
        assert_eq!(select_path(&value, Some("items[1].tags[0]")), Some(json!("x")));
        assert_eq!(select_path(&value, Some("items.1.id")), Some(json!("b")));
        assert_eq!(select_path(&value, Some("items[5].id")), None);
        assert_eq!(select_path(&value, None), Some(value.clone()));
    }

    #[test]
    fn set_path_creates_intermediate_containers() {
        let mut root = json!({});
        set_path(&mut root, "pageA.list[2]", json!("c")).unwrap();
        set_path(&mut root, "pageA.btn1.text", json!("Hi")).unwrap();
        assert_eq!(root, json!({"pageA": {"list": [null, null, "c"], "btn1": {"text": "Hi"}}}));
    }

    #[test]
    fn oversized_index_is_rejected_without_writing() {
        let mut root = json!({"pageA": {"list": ["a"]}});
        let error = set_path(&mut root, "pageA.list[18446744073709551615]", json!("x")).unwrap_err();
        assert_eq!(
            error,
            PathError::IndexTooLarge {
                path: "pageA.list[18446744073709551615]".into(),
                index: usize::MAX,
            }
        );
        assert!(set_path(&mut root, "other[4000000000].name", json!("x")).is_err());
        assert_eq!(root, json!({"pageA": {"list": ["a"]}}));
    }

    #[test]
    fn remove_path_detaches_leaf() {
        let mut root = json!({"a": {"b": 1, "c": [1, 2, 3]}});
        assert_eq!(remove_path(&mut root, "a.b"), Some(json!(1)));
        assert_eq!(remove_path(&mut root, "a.c[1]"), Some(json!(2)));
        assert_eq!(remove_path(&mut root, "a.missing"), None);
        assert_eq!(root, json!({"a": {"c": [1, 3]}}));
    }

    #[test]
    fn lookup_mut_does_not_create_nodes() {
        let mut root = json!({"a": 1});
        assert!(lookup_mut(&mut root, "b.c").is_none());
        assert_eq!(root, json!({"a": 1}));
    }
}
