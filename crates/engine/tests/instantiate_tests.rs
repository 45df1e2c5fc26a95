mod common;

use std::collections::HashSet;

use common::{catalog, context_with_state, executor, test_config};
use serde_json::json;
use trellis_engine::{HostCatalog, Services, StateStore};
use trellis_types::ActionDescriptor;

fn render_card(root: &str) -> ActionDescriptor {
    ActionDescriptor::new("tree.instantiate", format!("render-{root}"))
        .with_config("blueprintId", json!("card"))
        .with_config("targetId", json!("list"))
        .with_config("newRootId", json!(root))
}

#[tokio::test]
async fn instantiations_get_disjoint_namespaces() {
    let catalog = catalog();
    let executor = executor(Services::in_memory(test_config()).with_catalog(catalog.clone()));
    let (mut context, _) = context_with_state(json!({}));

    let first = executor.execute(&render_card("virtual-0"), &mut context).await.unwrap();
    let second = executor.execute(&render_card("virtual-1"), &mut context).await.unwrap();

    let ids = |value: &serde_json::Value| -> HashSet<String> {
        value["elementIds"]
            .as_array()
            .unwrap()
            .iter()
            .map(|id| id.as_str().unwrap().to_string())
            .collect()
    };
    let (first_ids, second_ids) = (ids(&first), ids(&second));
    assert!(first_ids.is_disjoint(&second_ids));
    assert!(first_ids.contains("virtual-0-child-title"));
    assert_eq!(first["created"], json!(true));

    let elements = catalog.all_elements();
    let known: HashSet<&str> = elements.iter().map(|element| element.id.as_str()).collect();
    for element in &elements {
        if let Some(parent) = &element.parent {
            assert!(known.contains(parent.as_str()), "{} has dangling parent {}", element.id, parent);
        }
    }
    let list = catalog.element("list").unwrap();
    assert_eq!(list.children, vec!["virtual-0", "virtual-1"]);
}

#[tokio::test]
async fn reinstantiating_the_same_root_is_a_noop() {
    let catalog = catalog();
    let executor = executor(Services::in_memory(test_config()).with_catalog(catalog.clone()));
    let (mut context, _) = context_with_state(json!({}));

    executor.execute(&render_card("virtual-0"), &mut context).await.unwrap();
    let before = catalog.all_elements().len();
    let again = executor.execute(&render_card("virtual-0"), &mut context).await.unwrap();

    assert_eq!(again["created"], json!(false));
    assert_eq!(catalog.all_elements().len(), before);
    assert_eq!(catalog.element("list").unwrap().children, vec!["virtual-0"]);
}

#[tokio::test]
async fn mappings_and_defaults_write_element_slices() {
    let catalog = catalog();
    let executor = executor(Services::in_memory(test_config()).with_catalog(catalog));
    let (context, store) = context_with_state(json!({}));
    let mut context = context.with_event(json!({"row": {"title": "Order #9", "done": true}}));

    let descriptor = render_card("virtual-0")
        .with_config("item", json!("{{event.row}}"))
        .with_config("index", json!(0))
        .with_config(
            "mappings",
            json!([
                {"element": "title", "field": "text", "value": "{{item.title}}"},
                {"element": "card", "field": "className", "value": "+row; +done?item.done"},
                {"element": "body", "field": "label", "value": "{{code: upper(item.title)}}"}
            ]),
        )
        .with_config(
            "defaults",
            json!([{"element": "body", "field": "text", "value": "(empty)"}]),
        );

    executor.execute(&descriptor, &mut context).await.unwrap();

    assert_eq!(store.get("pageA.virtual-0-child-title.text"), Some(json!("Order #9")));
    assert_eq!(store.get("pageA.virtual-0.className"), Some(json!("row done")));
    assert_eq!(store.get("pageA.virtual-0-child-body.label"), Some(json!("ORDER #9")));
    assert_eq!(store.get("pageA.virtual-0-child-body.text"), Some(json!("(empty)")));
}

#[tokio::test]
async fn inject_mode_updates_the_existing_element() {
    let catalog = catalog();
    let executor = executor(Services::in_memory(test_config()).with_catalog(catalog.clone()));
    let (mut context, store) = context_with_state(json!({"pageA": {"btn1": {"text": "Keep"}}}));
    let before = catalog.all_elements().len();

    let descriptor = ActionDescriptor::new("tree.instantiate", "inject")
        .with_config("blueprintId", json!("btn1"))
        .with_config("mode", json!("inject"))
        .with_config(
            "defaults",
            json!([
                {"element": "btn1", "field": "text", "value": "Default"},
                {"element": "btn1", "field": "tooltip", "value": "Saves {{self.text}}"}
            ]),
        );

    let result = executor.execute(&descriptor, &mut context).await.unwrap();

    assert_eq!(result["created"], json!(false));
    assert_eq!(catalog.all_elements().len(), before);
    assert_eq!(store.get("pageA.btn1.text"), Some(json!("Keep")));
    assert_eq!(store.get("pageA.btn1.tooltip"), Some(json!("Saves Keep")));
}

#[tokio::test]
async fn view_blueprints_render_under_a_synthetic_container() {
    let catalog = catalog();
    let executor = executor(Services::in_memory(test_config()).with_catalog(catalog.clone()));
    let (mut context, _) = context_with_state(json!({}));

    let descriptor = ActionDescriptor::new("tree.instantiate", "badge")
        .with_config("blueprintId", json!("badge"))
        .with_config("targetId", json!("btn1"));
    let result = executor.execute(&descriptor, &mut context).await.unwrap();

    let root_id = result["rootId"].as_str().unwrap().to_string();
    let root = catalog.element(&root_id).unwrap();
    assert_eq!(root.kind, "container");
    assert_eq!(root.parent.as_deref(), Some("btn1"));
    assert_eq!(root.config["className"], json!("badge"));
    let label = catalog.element(&format!("{root_id}-child-badgeLabel")).unwrap();
    assert_eq!(label.parent.as_deref(), Some(root_id.as_str()));
}

#[tokio::test]
async fn unknown_blueprints_are_configuration_errors() {
    let executor = executor(Services::in_memory(test_config()).with_catalog(catalog()));
    let (mut context, _) = context_with_state(json!({}));
    let descriptor = ActionDescriptor::new("tree.instantiate", "ghost").with_config("blueprintId", json!("nope"));

    executor.execute(&descriptor, &mut context).await.unwrap_err();
    assert_eq!(context.errors["ghost"]["kind"], json!("configuration"));
}
