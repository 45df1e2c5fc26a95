//! Id namespacing for cloned subtrees.
//!
//! The clone root takes the new root id; every other element becomes
//! `<rootId>-child-<originalId>`. Parent and children pointers are rewritten
//! into the new namespace, and the root is parented to the target container.

use std::collections::{HashMap, HashSet};

use trellis_types::Element;

use super::InstantiateError;
use super::blueprint::Blueprint;

pub const VIRTUAL_ID_PREFIX: &str = "virtual-";

pub fn child_id(root_id: &str, original_id: &str) -> String {
    format!("{root_id}-child-{original_id}")
}

/// Smallest `virtual-<n>` not present in `existing`.
pub fn next_virtual_id(existing: &HashSet<String>) -> String {
    (0..)
        .map(|n: u64| format!("{VIRTUAL_ID_PREFIX}{n}"))
        .find(|candidate| !existing.contains(candidate))
        .unwrap_or_else(|| format!("{VIRTUAL_ID_PREFIX}0"))
}

/// Clone the blueprint under `root_id`, attached to `target`.
pub fn namespace(blueprint: &Blueprint, root_id: &str, target: Option<&str>) -> Vec<Element> {
    let root_original = blueprint.root().id.clone();
    let mapping: HashMap<&str, String> = blueprint
        .elements
        .iter()
        .map(|element| {
            let new_id = if element.id == root_original {
                root_id.to_string()
            } else {
                child_id(root_id, &element.id)
            };
            (element.id.as_str(), new_id)
        })
        .collect();

    blueprint
        .elements
        .iter()
        .map(|element| {
            let mut clone = element.clone();
            clone.id = mapping[element.id.as_str()].clone();
            clone.parent = if element.id == root_original {
                target.map(str::to_string)
            } else {
                element
                    .parent
                    .as_deref()
                    .and_then(|parent| mapping.get(parent).cloned())
                    .or_else(|| Some(root_id.to_string()))
            };
            clone.children = element
                .children
                .iter()
                .filter_map(|child| mapping.get(child.as_str()).cloned())
                .collect();
            clone.origin_id = Some(element.id.clone());
            clone.is_virtual = true;
            clone.view_ref = None;
            clone
        })
        .collect()
}

/// Every parent must be in the batch or be the target container.
pub fn validate_batch(batch: &[Element], target: Option<&str>) -> Result<(), InstantiateError> {
    let ids: HashSet<&str> = batch.iter().map(|element| element.id.as_str()).collect();
    if ids.len() != batch.len() {
        let mut seen = HashSet::new();
        if let Some(duplicate) = batch.iter().find(|element| !seen.insert(element.id.as_str())) {
            return Err(InstantiateError::DuplicateId(duplicate.id.clone()));
        }
    }
    for element in batch {
        if let Some(parent) = &element.parent
            && !ids.contains(parent.as_str())
            && Some(parent.as_str()) != target
        {
            return Err(InstantiateError::DanglingParent {
                id: element.id.clone(),
                parent: parent.clone(),
            });
        }
    }
    Ok(())
}

/// Ids belonging to an earlier instantiation under `root_id`.
pub fn batch_ids(root_id: &str, existing: impl IntoIterator<Item = String>) -> Vec<String> {
    let prefix = format!("{root_id}-child-");
    existing
        .into_iter()
        .filter(|id| id == root_id || id.starts_with(&prefix))
        .collect()
}
