mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeSocketFactory, context_with_state, executor, test_config};
use serde_json::json;
use trellis_engine::{ActionError, Services, StateStore};
use trellis_types::ActionDescriptor;

fn bump(name: &str) -> serde_json::Value {
    json!({
        "key": "state.update",
        "name": name,
        "config": {"key": "pageA.ticks", "operationType": "increment"}
    })
}

#[tokio::test(start_paused = true)]
async fn timeout_runs_nested_actions_once() {
    let services = Services::in_memory(test_config());
    let timers = services.timers.clone();
    let executor = executor(services);
    let (context, store) = context_with_state(json!({}));

    let descriptor = ActionDescriptor::new("timer.timeout", "later")
        .with_config("id", json!("welcome"))
        .with_config("delayMs", json!(1000))
        .with_config(
            "actions",
            json!([{
                "key": "state.update",
                "name": "greet",
                "config": {"key": "pageA.banner", "payload": "Hello {{event.user}}"}
            }]),
        );
    let mut context_with_event = context.fork().with_event(json!({"user": "Ada"}));
    let scheduled = executor.execute(&descriptor, &mut context_with_event).await.unwrap();
    assert_eq!(scheduled["id"], json!("welcome"));
    assert_eq!(store.get("pageA.banner"), None);
    assert_eq!(timers.active(), vec!["welcome".to_string()]);

    tokio::time::sleep(Duration::from_millis(1001)).await;
    assert_eq!(store.get("pageA.banner"), Some(json!("Hello Ada")));
    assert!(timers.active().is_empty());
    assert!(!context.results.contains_key("greet"));
}

#[tokio::test(start_paused = true)]
async fn interval_stops_after_max_ticks() {
    let executor = executor(Services::in_memory(test_config()));
    let (mut context, store) = context_with_state(json!({}));

    let descriptor = ActionDescriptor::new("timer.interval", "poll")
        .with_config("intervalMs", json!(100))
        .with_config("maxTicks", json!(3))
        .with_config("actions", json!([bump("tick")]));
    executor.execute(&descriptor, &mut context).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(store.get("pageA.ticks"), Some(json!(3)));
}

#[tokio::test(start_paused = true)]
async fn clear_cancels_a_running_interval() {
    let executor = executor(Services::in_memory(test_config()));
    let (mut context, store) = context_with_state(json!({}));

    let start = ActionDescriptor::new("timer.interval", "poll")
        .with_config("id", json!("poller"))
        .with_config("intervalMs", json!(100))
        .with_config("actions", json!([bump("tick")]));
    executor.execute(&start, &mut context).await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    let clear = ActionDescriptor::new("timer.clear", "stop").with_config("id", json!("poller"));
    assert_eq!(executor.execute(&clear, &mut context).await.unwrap()["cleared"], json!(true));

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(store.get("pageA.ticks"), Some(json!(2)));
}

#[tokio::test]
async fn timers_reject_unknown_nested_keys() {
    let executor = executor(Services::in_memory(test_config()));
    let (mut context, _) = context_with_state(json!({}));
    let descriptor = ActionDescriptor::new("timer.timeout", "later")
        .with_config("actions", json!([{"key": "nope.nope", "name": "x"}]));

    let error = executor.execute(&descriptor, &mut context).await.unwrap_err();
    assert!(matches!(error, ActionError::Configuration { .. }));
    assert!(executor.services().timers.active().is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_connects_share_one_socket() {
    let factory = Arc::new(FakeSocketFactory {
        latency: Duration::from_millis(50),
        ..FakeSocketFactory::default()
    });
    let executor = executor(Services::in_memory(test_config()).with_socket_factory(factory.clone()));
    let connect = ActionDescriptor::new("socket.connect", "live").with_config("url", json!("wss://feed.test/orders"));

    let (mut first_context, _) = context_with_state(json!({}));
    let (mut second_context, _) = context_with_state(json!({}));
    let (first, second) = tokio::join!(
        executor.execute(&connect, &mut first_context),
        executor.execute(&connect, &mut second_context)
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(factory.connect_count(), 1);
    assert_eq!(first["id"], second["id"]);
    assert_eq!(second["status"], json!("connected"));
    assert_eq!(second["target"], json!("wss://feed.test/orders"));
    assert_eq!(second["retryCount"], json!(0));
}

#[tokio::test]
async fn send_and_disconnect_use_the_registry() {
    let factory = Arc::new(FakeSocketFactory::default());
    let executor = executor(Services::in_memory(test_config()).with_socket_factory(factory.clone()));
    let (mut context, _) = context_with_state(json!({}));

    let connect = ActionDescriptor::new("socket.connect", "live").with_config("url", json!("wss://feed.test"));
    executor.execute(&connect, &mut context).await.unwrap();

    let send = ActionDescriptor::new("socket.send", "subscribe")
        .with_config("target", json!("wss://feed.test"))
        .with_config("message", json!({"op": "subscribe", "channel": "{{results.live.id}}"}));
    executor.execute(&send, &mut context).await.unwrap();
    let sent = factory.sockets.lock().unwrap()[0].sent.lock().unwrap().clone();
    assert_eq!(sent, vec![json!({"op": "subscribe", "channel": context.results["live"]["id"]})]);

    let disconnect = ActionDescriptor::new("socket.disconnect", "close").with_config("target", json!("wss://feed.test"));
    let closed = executor.execute(&disconnect, &mut context).await.unwrap();
    assert_eq!(closed["status"], json!("closed"));
    assert!(executor.services().connections.snapshot("wss://feed.test").is_none());
}

#[tokio::test]
async fn socket_urls_must_use_a_socket_scheme() {
    let executor = executor(Services::in_memory(test_config()));
    let (mut context, _) = context_with_state(json!({}));
    let connect = ActionDescriptor::new("socket.connect", "live").with_config("url", json!("https://not.a.socket"));

    let error = executor.execute(&connect, &mut context).await.unwrap_err();
    assert!(matches!(error, ActionError::Configuration { .. }));
}
