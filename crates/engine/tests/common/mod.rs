#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use trellis_engine::connection::{SocketEvent, SocketFactory, SocketTransport};
use trellis_engine::dom::{DomActionType, DomEffects};
use trellis_engine::executor::{FailureNotice, Notifier};
use trellis_engine::{
    CatalogDocument, EngineConfig, ExecutionContext, Executor, HttpTransport, MemoryCatalog, MemoryStateStore, Services,
    TransportError,
};
use trellis_types::{HttpRequest, HttpResponse};

/// Replays queued responses in order, then answers `200 {}`.
#[derive(Default)]
pub struct ScriptedHttp {
    replies: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    pub requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttp {
    pub fn with_replies(replies: impl IntoIterator<Item = Result<HttpResponse, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedHttp {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(HttpResponse::new(200, json!({}))))
    }
}

pub fn ok(data: Value) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse::new(200, data))
}

pub fn status(code: u16) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse::new(code, json!({ "message": format!("status {code}") })))
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<FailureNotice>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &FailureNotice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}

#[derive(Default)]
pub struct RecordingDom {
    pub performed: Mutex<Vec<(DomActionType, Map<String, Value>)>>,
}

#[async_trait]
impl DomEffects for RecordingDom {
    async fn perform(&self, action: DomActionType, options: &Map<String, Value>) -> Result<Value, String> {
        self.performed.lock().unwrap().push((action, options.clone()));
        Ok(json!({ "handled": true }))
    }
}

pub struct FakeSocket {
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<SocketEvent>>,
    pub sent: Mutex<Vec<Value>>,
}

#[async_trait]
impl SocketTransport for FakeSocket {
    async fn send(&self, payload: &Value) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(payload.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_event(&self) -> Option<SocketEvent> {
        self.events.lock().await.recv().await
    }
}

/// Opens sockets after `latency`; every socket stays open until dropped.
#[derive(Default)]
pub struct FakeSocketFactory {
    pub connects: AtomicUsize,
    pub latency: std::time::Duration,
    pub feeds: Mutex<Vec<mpsc::UnboundedSender<SocketEvent>>>,
    pub sockets: Mutex<Vec<Arc<FakeSocket>>>,
}

impl FakeSocketFactory {
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SocketFactory for FakeSocketFactory {
    async fn connect(&self, _target: &str, _protocols: &[String]) -> Result<Arc<dyn SocketTransport>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let (feed, events) = mpsc::unbounded_channel();
        let socket = Arc::new(FakeSocket {
            events: tokio::sync::Mutex::new(events),
            sent: Mutex::new(Vec::new()),
        });
        self.feeds.lock().unwrap().push(feed);
        self.sockets.lock().unwrap().push(Arc::clone(&socket));
        Ok(socket)
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        app_id: "demo".into(),
        retry_attempts: 3,
        retry_delay_ms: 100,
        ..EngineConfig::default()
    }
}

pub fn catalog() -> Arc<MemoryCatalog> {
    let document: CatalogDocument = serde_json::from_str(include_str!("../data/catalog.json")).expect("catalog fixture");
    Arc::new(MemoryCatalog::from_document(document))
}

pub fn executor(services: Services) -> Executor {
    Executor::with_builtin_actions(services).expect("builtin actions register")
}

pub fn context_with_state(state: Value) -> (ExecutionContext, Arc<MemoryStateStore>) {
    let store = Arc::new(MemoryStateStore::with_state(state));
    (ExecutionContext::new(store.clone()), store)
}
