//! Blueprint loading: flattening an element or view into a parented list.

use std::collections::{HashSet, VecDeque};

use trellis_types::{Element, View};

use super::InstantiateError;
use super::catalog::HostCatalog;

/// Kind given to the synthetic container a view blueprint is rooted at.
pub const VIEW_CONTAINER_KIND: &str = "container";

/// A flattened blueprint. `elements[0]` is the root.
#[derive(Debug, Clone, PartialEq)]
pub struct Blueprint {
    pub id: String,
    /// View the blueprint element lives in; `None` for view blueprints.
    pub source_view: Option<String>,
    pub elements: Vec<Element>,
}

impl Blueprint {
    pub fn root(&self) -> &Element {
        &self.elements[0]
    }

    pub fn contains(&self, id: &str) -> bool {
        self.elements.iter().any(|element| element.id == id)
    }
}

/// Look the id up as an element first, then as a view.
pub fn load_blueprint(catalog: &dyn HostCatalog, id: &str) -> Result<Blueprint, InstantiateError> {
    let all_elements = catalog.all_elements();
    if let Some(root) = all_elements.iter().find(|element| element.id == id) {
        let source_view = root.view_id.clone();
        let mut elements = subtree(&all_elements, root);
        let mut stack = Vec::new();
        expand_view_refs(catalog, &mut elements, &mut stack)?;
        return Ok(Blueprint {
            id: id.to_string(),
            source_view,
            elements,
        });
    }

    let view = catalog
        .view(id)
        .ok_or_else(|| InstantiateError::BlueprintNotFound(id.to_string()))?;
    let mut elements = view_as_tree(&view);
    let mut stack = vec![view.id.clone()];
    expand_view_refs(catalog, &mut elements, &mut stack)?;
    Ok(Blueprint {
        id: id.to_string(),
        source_view: None,
        elements,
    })
}

/// The root and every descendant, breadth first.
fn subtree(all_elements: &[Element], root: &Element) -> Vec<Element> {
    let mut collected = vec![root.clone()];
    let mut seen: HashSet<String> = HashSet::from([root.id.clone()]);
    let mut queue = VecDeque::from([root.id.clone()]);
    while let Some(parent_id) = queue.pop_front() {
        let listed: Vec<String> = all_elements
            .iter()
            .find(|element| element.id == parent_id)
            .map(|element| element.children.clone())
            .unwrap_or_default();
        let children = all_elements.iter().filter(|element| {
            element.parent.as_deref() == Some(parent_id.as_str()) || listed.contains(&element.id)
        });
        for child in children {
            if seen.insert(child.id.clone()) {
                let mut child = child.clone();
                child.parent = Some(parent_id.clone());
                queue.push_back(child.id.clone());
                collected.push(child);
            }
        }
    }
    collected
}

/// Synthetic container carrying the view's configuration, with the view's
/// root elements reparented under it.
fn view_as_tree(view: &View) -> Vec<Element> {
    let root_ids: Vec<String> = view.roots().map(|element| element.id.clone()).collect();
    let container = Element {
        id: view.id.clone(),
        kind: VIEW_CONTAINER_KIND.to_string(),
        config: view.config.clone(),
        children: root_ids.clone(),
        ..Element::default()
    };
    let mut elements = vec![container];
    for element in &view.elements {
        let mut element = element.clone();
        if root_ids.contains(&element.id) {
            element.parent = Some(view.id.clone());
        }
        elements.push(element);
    }
    elements
}

/// Inline the elements of component views referenced through `view_ref`.
fn expand_view_refs(
    catalog: &dyn HostCatalog,
    elements: &mut Vec<Element>,
    stack: &mut Vec<String>,
) -> Result<(), InstantiateError> {
    let mut index = 0;
    while index < elements.len() {
        let Some(view_id) = elements[index].view_ref.clone() else {
            index += 1;
            continue;
        };
        if stack.contains(&view_id) {
            let mut chain = stack.clone();
            chain.push(view_id);
            return Err(InstantiateError::ViewCycle(chain.join(" -> ")));
        }
        let view = catalog
            .view(&view_id)
            .ok_or_else(|| InstantiateError::BlueprintNotFound(view_id.clone()))?;

        let host_id = elements[index].id.clone();
        let root_ids: Vec<String> = view.roots().map(|element| element.id.clone()).collect();
        let mut nested: Vec<Element> = Vec::with_capacity(view.elements.len());
        for element in &view.elements {
            if elements.iter().any(|existing| existing.id == element.id) {
                return Err(InstantiateError::DuplicateId(element.id.clone()));
            }
            let mut element = element.clone();
            if root_ids.contains(&element.id) {
                element.parent = Some(host_id.clone());
            }
            nested.push(element);
        }

        stack.push(view_id);
        expand_view_refs(catalog, &mut nested, stack)?;
        stack.pop();

        if let Some(duplicate) = nested
            .iter()
            .find(|element| elements.iter().any(|existing| existing.id == element.id))
        {
            return Err(InstantiateError::DuplicateId(duplicate.id.clone()));
        }
        for root_id in &root_ids {
            if !elements[index].children.contains(root_id) {
                elements[index].children.push(root_id.clone());
            }
        }
        elements.extend(nested);
        index += 1;
    }
    Ok(())
}
