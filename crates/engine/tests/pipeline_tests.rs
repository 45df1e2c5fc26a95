mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{RecordingNotifier, ScriptedHttp, context_with_state, executor, ok, status, test_config};
use serde_json::json;
use trellis_engine::{ActionError, ActionPhase, ManualClock, Services, StateStore};
use trellis_types::{ActionDescriptor, OnError, Pipeline};

fn services_with(http: Arc<ScriptedHttp>) -> Services {
    Services::in_memory(test_config()).with_http(http)
}

fn get(name: &str, url: &str) -> ActionDescriptor {
    ActionDescriptor::new("http.request", name).with_config("url", json!(url))
}

#[tokio::test(start_paused = true)]
async fn http_retries_transient_failures_then_succeeds() {
    let http = ScriptedHttp::with_replies([status(503), status(503), ok(json!({"users": [1, 2]}))]);
    let executor = executor(services_with(http.clone()));
    let (mut context, _) = context_with_state(json!({}));

    let (report, outcome) = executor
        .execute_reported(&get("load", "https://api.test/users"), &mut context)
        .await;

    assert_eq!(outcome.unwrap()["data"]["users"], json!([1, 2]));
    assert_eq!(report.attempts, 3);
    assert_eq!(report.phase, ActionPhase::Succeeded);
    assert_eq!(http.calls(), 3);
    assert_eq!(context.results["load"]["status"], json!(200));
}

#[tokio::test(start_paused = true)]
async fn single_attempt_policy_fails_after_one_call() {
    let http = ScriptedHttp::with_replies([status(503), ok(json!({}))]);
    let executor = executor(services_with(http.clone()));
    let (mut context, _) = context_with_state(json!({}));

    let descriptor = get("load", "https://api.test/users").with_config("retryAttempts", json!(1));
    let error = executor.execute(&descriptor, &mut context).await.unwrap_err();

    assert!(matches!(error, ActionError::Operation { attempts: 1, .. }));
    assert_eq!(http.calls(), 1);
    assert_eq!(context.errors["load"]["kind"], json!("operation"));
    assert_eq!(context.errors["load"]["attempts"], json!(1));
    assert_eq!(context.errors["load"]["status"], json!(503));
    assert!(!context.results.contains_key("load"));
}

#[tokio::test(start_paused = true)]
async fn client_errors_are_semantic_and_not_retried() {
    let http = ScriptedHttp::with_replies([status(404)]);
    let notifier = Arc::new(RecordingNotifier::default());
    let executor = executor(services_with(http.clone()).with_notifier(notifier.clone()));
    let (mut context, _) = context_with_state(json!({}));

    let error = executor
        .execute(&get("load", "https://api.test/missing"), &mut context)
        .await
        .unwrap_err();

    assert!(matches!(error, ActionError::Semantic { status: Some(404), .. }));
    assert_eq!(http.calls(), 1);
    assert_eq!(context.errors["load"]["kind"], json!("semantic"));
    let notices = notifier.notices.lock().unwrap();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].action, "load");
}

#[tokio::test]
async fn cached_responses_short_circuit_the_transport() {
    let http = ScriptedHttp::with_replies([ok(json!({"n": 1})), ok(json!({"n": 2}))]);
    let executor = executor(services_with(http.clone()));
    let (mut context, _) = context_with_state(json!({}));

    let first = executor.execute(&get("a", "https://api.test/n"), &mut context).await.unwrap();
    let second = executor.execute(&get("b", "https://api.test/n"), &mut context).await.unwrap();

    assert_eq!(http.calls(), 1);
    assert_eq!(first, second);
    assert_eq!(context.results["b"]["data"]["n"], json!(1));
}

#[tokio::test]
async fn requests_with_different_credentials_do_not_share_cache_entries() {
    let http = ScriptedHttp::with_replies([ok(json!({"user": "alice"})), ok(json!({"user": "bob"}))]);
    let executor = executor(services_with(http.clone()));
    let (mut context, _) = context_with_state(json!({}));
    let as_user = |name: &str, token: &str| {
        get(name, "https://api.test/me").with_config("headers", json!({"Authorization": format!("Bearer {token}")}))
    };

    let alice = executor.execute(&as_user("alice", "alice"), &mut context).await.unwrap();
    let bob = executor.execute(&as_user("bob", "bob"), &mut context).await.unwrap();
    assert_eq!(http.calls(), 2);
    assert_eq!(alice["data"]["user"], json!("alice"));
    assert_eq!(bob["data"]["user"], json!("bob"));

    let again = executor.execute(&as_user("again", "alice"), &mut context).await.unwrap();
    assert_eq!(http.calls(), 2);
    assert_eq!(again["data"]["user"], json!("alice"));
}

#[tokio::test]
async fn graphql_cache_entries_are_scoped_by_headers() {
    let http = ScriptedHttp::with_replies([
        ok(json!({"data": {"viewer": "alice"}})),
        ok(json!({"data": {"viewer": "bob"}})),
    ]);
    let executor = executor(services_with(http.clone()));
    let (mut context, _) = context_with_state(json!({}));
    let viewer = |name: &str, token: &str| {
        ActionDescriptor::new("graphql.query", name)
            .with_config("url", json!("https://api.test/graphql"))
            .with_config("query", json!("{ viewer }"))
            .with_config("headers", json!({"Authorization": format!("Bearer {token}")}))
    };

    executor.execute(&viewer("first", "alice"), &mut context).await.unwrap();
    let second = executor.execute(&viewer("second", "bob"), &mut context).await.unwrap();
    assert_eq!(http.calls(), 2);
    assert_eq!(second["data"]["viewer"], json!("bob"));
}

#[tokio::test]
async fn cache_entries_expire_after_their_ttl() {
    let http = ScriptedHttp::with_replies([ok(json!({"n": 1})), ok(json!({"n": 2}))]);
    let clock = Arc::new(ManualClock::new(0));
    let executor = executor(services_with(http.clone()).with_clock(clock.clone()));
    let (mut context, _) = context_with_state(json!({}));
    let descriptor = get("poll", "https://api.test/n").with_config("cacheTtlMs", json!(1000));

    executor.execute(&descriptor, &mut context).await.unwrap();
    executor.execute(&descriptor, &mut context).await.unwrap();
    assert_eq!(http.calls(), 1);

    clock.advance(Duration::from_millis(1001));
    let refreshed = executor.execute(&descriptor, &mut context).await.unwrap();
    assert_eq!(http.calls(), 2);
    assert_eq!(refreshed["data"]["n"], json!(2));
}

#[tokio::test]
async fn post_requests_are_not_cached_by_default() {
    let http = ScriptedHttp::with_replies([]);
    let executor = executor(services_with(http.clone()));
    let (mut context, _) = context_with_state(json!({}));
    let descriptor = get("save", "https://api.test/items")
        .with_config("method", json!("POST"))
        .with_config("body", json!({"name": "{{event.name}}"}));
    let mut context_with_event = context.fork().with_event(json!({"name": "widget"}));

    executor.execute(&descriptor, &mut context_with_event).await.unwrap();
    executor.execute(&descriptor, &mut context).await.unwrap();

    assert_eq!(http.calls(), 2);
    let requests = http.requests.lock().unwrap();
    assert_eq!(requests[0].body, Some(json!({"name": "widget"})));
    assert_eq!(requests[0].method, "POST");
}

#[tokio::test]
async fn graphql_errors_keep_partial_data() {
    let http = ScriptedHttp::with_replies([ok(json!({
        "data": {"viewer": {"id": 1}},
        "errors": [{"message": "field 'secret' denied"}]
    }))]);
    let executor = executor(services_with(http.clone()));
    let (mut context, _) = context_with_state(json!({}));
    let descriptor = ActionDescriptor::new("graphql.query", "viewer")
        .with_config("url", json!("https://api.test/graphql"))
        .with_config("query", json!("query { viewer { id secret } }"));

    let error = executor.execute(&descriptor, &mut context).await.unwrap_err();

    assert!(matches!(error, ActionError::Semantic { .. }));
    assert_eq!(http.calls(), 1);
    assert_eq!(context.errors["viewer"]["kind"], json!("semantic"));
    assert_eq!(context.errors["viewer"]["error"], json!("semantic error: field 'secret' denied"));
    assert_eq!(context.errors["viewer"]["context"]["errors"][0]["message"], json!("field 'secret' denied"));
    assert_eq!(context.results["viewer"]["data"]["viewer"]["id"], json!(1));
}

#[tokio::test]
async fn later_actions_read_earlier_results() {
    let http = ScriptedHttp::with_replies([ok(json!({"id": 7}))]);
    let executor = executor(services_with(http));
    let (mut context, store) = context_with_state(json!({}));
    let pipeline = Pipeline {
        name: "profile".into(),
        description: None,
        actions: vec![
            get("load", "https://api.test/me"),
            ActionDescriptor::new("state.update", "show")
                .with_config("key", json!("pageA.btn1.text"))
                .with_config("payload", json!("User {{results.load.data.id}}")),
        ],
    };

    let report = executor.run_pipeline(&pipeline, &mut context).await;

    assert!(report.succeeded());
    assert_eq!(store.get("pageA.btn1.text"), Some(json!("User 7")));
}

#[tokio::test]
async fn templates_read_page_params_and_window() {
    let executor = executor(Services::in_memory(test_config()));
    let (context, store) = context_with_state(json!({}));
    let mut context = context
        .with_page_params(json!({"orderId": 42}))
        .with_window(json!({"location": {"pathname": "/orders"}}))
        .with_session_key("session-1");
    let descriptor = ActionDescriptor::new("state.update", "title")
        .with_config("key", json!("pageA.title.text"))
        .with_config("payload", json!("Order {{pageParams.orderId}} at {{window.location.pathname}}"));

    executor.execute(&descriptor, &mut context).await.unwrap();

    assert_eq!(store.get("pageA.title.text"), Some(json!("Order 42 at /orders")));
    assert_eq!(context.session_key.as_deref(), Some("session-1"));
}

#[tokio::test]
async fn oversized_state_indices_are_configuration_errors() {
    let executor = executor(Services::in_memory(test_config()));
    let (mut context, store) = context_with_state(json!({"pageA": {"list": ["a"]}}));
    let descriptor = ActionDescriptor::new("state.update", "grow")
        .with_config("key", json!("pageA.list[18446744073709551615]"))
        .with_config("payload", json!("x"));

    let error = executor.execute(&descriptor, &mut context).await.unwrap_err();

    assert!(matches!(error, ActionError::Configuration { .. }));
    assert_eq!(context.errors["grow"]["kind"], json!("configuration"));
    assert_eq!(store.get("pageA.list"), Some(json!(["a"])));
}

#[tokio::test]
async fn self_lookups_follow_the_element_binding() {
    let executor = executor(Services::in_memory(test_config()));
    let (mut context, store) = context_with_state(json!({"pageA": {"btn1": {"text": "Hi"}}}));
    let descriptor = ActionDescriptor::new("state.update", "echo")
        .bound_to("pageA", "btn1")
        .with_config("key", json!("self.label"))
        .with_config("payload", json!("{{self.text}}"));

    executor.execute(&descriptor, &mut context).await.unwrap();

    assert_eq!(store.get("pageA.btn1.label"), Some(json!("Hi")));
}

#[tokio::test]
async fn boolean_templates_compare_state() {
    let executor = executor(Services::in_memory(test_config()));
    let flag = ActionDescriptor::new("state.update", "flag")
        .with_config("key", json!("pageA.big"))
        .with_config("payload", json!("{{state.count > 5}}"));

    for (state, expected) in [
        (json!({"count": 10}), true),
        (json!({"count": 3}), false),
        (json!({}), false),
    ] {
        let (mut context, store) = context_with_state(state);
        executor.execute(&flag, &mut context).await.unwrap();
        assert_eq!(store.get("pageA.big"), Some(json!(expected)));
    }
}

#[tokio::test]
async fn function_bodies_stay_inert() {
    let executor = executor(Services::in_memory(test_config()));
    let (mut context, store) = context_with_state(json!({}));
    let source = "function(){ localStorage.clear() }";

    let store_it = ActionDescriptor::new("state.update", "keep")
        .with_config("key", json!("pageA.handler"))
        .with_config("payload", json!(source));
    executor.execute(&store_it, &mut context).await.unwrap();
    assert_eq!(store.get("pageA.handler"), Some(json!(source)));

    let run_it = ActionDescriptor::new("code.run", "run").with_config("code", json!(source));
    let error = executor.execute(&run_it, &mut context).await.unwrap_err();
    assert!(matches!(error, ActionError::SandboxViolation { .. }));
}

#[tokio::test]
async fn code_outside_the_sandbox_is_rejected() {
    let executor = executor(Services::in_memory(test_config()));
    let (mut context, _) = context_with_state(json!({"cart": {"items": [1, 2, 3]}}));

    let allowed = ActionDescriptor::new("code.run", "count").with_config("code", json!("{{code: len(state.cart.items)}}"));
    assert_eq!(executor.execute(&allowed, &mut context).await.unwrap(), json!(3));

    let escaping = ActionDescriptor::new("code.run", "steal").with_config("code", json!("document.cookie"));
    executor.execute(&escaping, &mut context).await.unwrap_err();
    assert_eq!(context.errors["steal"]["kind"], json!("sandbox"));
}

#[tokio::test]
async fn failures_halt_unless_descriptor_continues() {
    let http = ScriptedHttp::with_replies([status(400), status(400)]);
    let executor = executor(services_with(http));
    let after = ActionDescriptor::new("storage.set", "remember")
        .with_config("key", json!("seen"))
        .with_config("value", json!(true));

    let halting = Pipeline {
        name: "halting".into(),
        description: None,
        actions: vec![get("bad", "https://api.test/a"), after.clone()],
    };
    let (mut context, _) = context_with_state(json!({}));
    let report = executor.run_pipeline(&halting, &mut context).await;
    assert!(report.halted);
    assert_eq!(report.failures().count(), 1);
    assert!(!context.results.contains_key("remember"));

    let continuing = Pipeline {
        name: "continuing".into(),
        description: None,
        actions: vec![
            get("bad", "https://api.test/b").with_on_error(OnError::Continue),
            after,
        ],
    };
    let (mut context, _) = context_with_state(json!({}));
    let report = executor.run_pipeline(&continuing, &mut context).await;
    assert!(!report.halted);
    assert_eq!(report.actions.len(), 2);
    assert!(context.results.contains_key("remember"));
    assert!(context.errors.contains_key("bad"));
}

#[tokio::test]
async fn storage_actions_use_the_app_namespace() {
    let services = Services::in_memory(test_config());
    let storage = services.storage.clone();
    let executor = executor(services);
    let (mut context, _) = context_with_state(json!({}));

    let set = ActionDescriptor::new("storage.set", "save")
        .with_config("key", json!("theme"))
        .with_config("value", json!("dark"));
    executor.execute(&set, &mut context).await.unwrap();

    let read = ActionDescriptor::new("storage.get", "load").with_config("key", json!("theme"));
    assert_eq!(executor.execute(&read, &mut context).await.unwrap(), json!("dark"));
    assert_eq!(storage.default_namespace_key(), "demo-sessionInfo");

    let templated = ActionDescriptor::new("state.update", "apply")
        .with_config("key", json!("pageA.theme"))
        .with_config("payload", json!("{{localStore.theme}}"));
    executor.execute(&templated, &mut context).await.unwrap();
    assert_eq!(context.state_store().get("pageA.theme"), Some(json!("dark")));

    let remove = ActionDescriptor::new("storage.remove", "forget").with_config("key", json!("theme"));
    assert_eq!(executor.execute(&remove, &mut context).await.unwrap()["removed"], json!(true));
    assert_eq!(executor.execute(&read, &mut context).await.unwrap(), json!(null));
}

#[tokio::test]
async fn dom_effects_require_their_options() {
    let dom = Arc::new(common::RecordingDom::default());
    let executor = executor(Services::in_memory(test_config()).with_dom(dom.clone()));
    let (mut context, _) = context_with_state(json!({}));

    let missing = ActionDescriptor::new("dom.effect", "go").with_config("actionType", json!("navigate"));
    let error = executor.execute(&missing, &mut context).await.unwrap_err();
    assert!(matches!(error, ActionError::Configuration { .. }));
    assert!(dom.performed.lock().unwrap().is_empty());

    let navigate = missing.clone().with_config("url", json!("/orders/{{event.id}}"));
    let mut context = context.with_event(json!({"id": 42}));
    let result = executor.execute(&navigate, &mut context).await.unwrap();
    assert_eq!(result["success"], json!(true));
    assert_eq!(result["actionType"], json!("navigate"));
    assert_eq!(dom.performed.lock().unwrap()[0].1["url"], json!("/orders/42"));
}

#[test]
fn validation_reports_unknown_keys_in_nested_actions() {
    let executor = executor(Services::in_memory(test_config()));
    let pipeline = Pipeline {
        name: "nested".into(),
        description: None,
        actions: vec![
            ActionDescriptor::new("timer.timeout", "later")
                .with_config("actions", json!([{"key": "does.not.exist", "name": "ghost"}])),
        ],
    };
    let problems = executor.validate_pipeline(&pipeline);
    assert_eq!(problems.len(), 1);
    assert!(problems[0].contains("does.not.exist"));
}
