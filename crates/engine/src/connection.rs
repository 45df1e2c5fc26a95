//! Registry of long-lived socket connections.
//!
//! At most one live connection exists per target. Callers arriving while a
//! connection is being established wait for that attempt instead of opening
//! their own. Each connected entry runs a pump task that records inbound
//! messages into a capped log and reconnects after unclean closes until the
//! reconnect budget is spent.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use trellis_types::ConnectionStatus;

use crate::config::EngineConfig;
use crate::retry::{Attempted, RetryError, RetryPolicy, with_retry};
use crate::transport::TransportError;

#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Message(Value),
    Closed {
        clean: bool,
        code: Option<u16>,
        reason: Option<String>,
    },
    Error(String),
}

/// One open socket.
#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn send(&self, payload: &Value) -> Result<(), TransportError>;
    async fn close(&self) -> Result<(), TransportError>;
    /// Next inbound event; `None` once the stream has ended.
    async fn next_event(&self) -> Option<SocketEvent>;
}

#[async_trait]
pub trait SocketFactory: Send + Sync {
    async fn connect(&self, target: &str, protocols: &[String]) -> Result<Arc<dyn SocketTransport>, TransportError>;
}

/// Factory for hosts without a socket implementation.
#[derive(Debug, Default)]
pub struct NullSocketFactory;

#[async_trait]
impl SocketFactory for NullSocketFactory {
    async fn connect(&self, target: &str, _protocols: &[String]) -> Result<Arc<dyn SocketTransport>, TransportError> {
        Err(TransportError::Unsupported(format!("no socket transport configured for {target}")))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("could not connect to {target} after {attempts} attempts: {reason}")]
    Exhausted { target: String, attempts: u32, reason: String },
    #[error("no connection for '{0}'")]
    NotFound(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ConnectionError {
    pub fn is_transient(&self) -> bool {
        match self {
            ConnectionError::Transport(error) => error.is_transient(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectionOptions {
    pub connect_policy: RetryPolicy,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub message_log_limit: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ConnectionOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            connect_policy: RetryPolicy::new(config.socket_connect_attempts, Duration::from_millis(config.retry_delay_ms)),
            reconnect_attempts: config.socket_reconnect_attempts,
            reconnect_delay: Duration::from_millis(config.socket_reconnect_delay_ms),
            message_log_limit: config.message_log_limit,
        }
    }
}

/// Point-in-time view of a connection record.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub id: String,
    pub target: String,
    pub status: ConnectionStatus,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub messages: Vec<Value>,
}

#[derive(Debug, Default)]
struct EntryState {
    retry_count: u32,
    last_error: Option<String>,
    messages: VecDeque<Value>,
    reconnects_remaining: u32,
}

struct Entry {
    id: String,
    target: String,
    protocols: Vec<String>,
    status: watch::Sender<ConnectionStatus>,
    socket: Mutex<Option<Arc<dyn SocketTransport>>>,
    state: Mutex<EntryState>,
    closing: AtomicBool,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Entry {
    fn state(&self) -> std::sync::MutexGuard<'_, EntryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn socket(&self) -> Option<Arc<dyn SocketTransport>> {
        self.socket.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn install(&self, socket: Arc<dyn SocketTransport>) {
        *self.socket.lock().unwrap_or_else(PoisonError::into_inner) = Some(socket);
        self.status.send_replace(ConnectionStatus::Connected);
    }

    fn take_socket(&self) -> Option<Arc<dyn SocketTransport>> {
        self.socket.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    fn set_error(&self, message: impl Into<String>) {
        self.state().last_error = Some(message.into());
    }

    fn push_message(&self, message: Value, limit: usize) {
        let mut state = self.state();
        state.messages.push_back(message);
        while state.messages.len() > limit {
            state.messages.pop_front();
        }
    }

    fn snapshot(&self) -> ConnectionSnapshot {
        let state = self.state();
        ConnectionSnapshot {
            id: self.id.clone(),
            target: self.target.clone(),
            status: self.status(),
            retry_count: state.retry_count,
            last_error: state.last_error.clone(),
            messages: state.messages.iter().cloned().collect(),
        }
    }
}

pub struct ConnectionRegistry {
    factory: Arc<dyn SocketFactory>,
    options: ConnectionOptions,
    entries: Mutex<HashMap<String, Arc<Entry>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("options", &self.options)
            .field("targets", &self.entries().keys().cloned().collect::<Vec<_>>())
            .finish()
    }
}

impl ConnectionRegistry {
    pub fn new(factory: Arc<dyn SocketFactory>, options: ConnectionOptions) -> Arc<Self> {
        Arc::new(Self {
            factory,
            options,
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Entry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Entry by target or by connection id.
    fn find(&self, target_or_id: &str) -> Option<Arc<Entry>> {
        let entries = self.entries();
        entries
            .get(target_or_id)
            .or_else(|| entries.values().find(|entry| entry.id == target_or_id))
            .cloned()
    }

    /// Remove the entry for `target` only if it is still the one with `id`.
    fn forget(&self, target: &str, id: &str) {
        let mut entries = self.entries();
        if entries.get(target).is_some_and(|entry| entry.id == id) {
            entries.remove(target);
        }
    }

    /// Return the live connection for `target`, joining an in-flight
    /// attempt or establishing a new one.
    pub async fn connect_or_join(
        self: &Arc<Self>,
        target: &str,
        protocols: &[String],
    ) -> Result<ConnectionSnapshot, ConnectionError> {
        let (entry, owner) = {
            let mut entries = self.entries();
            // Only `connecting`/`connected` records are joinable; stale ones are replaced.
            match entries.get(target).filter(|existing| existing.status().is_live()) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let id = format!("socket-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
                    let (status, _) = watch::channel(ConnectionStatus::Connecting);
                    let entry = Arc::new(Entry {
                        id,
                        target: target.to_string(),
                        protocols: protocols.to_vec(),
                        status,
                        socket: Mutex::new(None),
                        state: Mutex::new(EntryState {
                            reconnects_remaining: self.options.reconnect_attempts,
                            ..EntryState::default()
                        }),
                        closing: AtomicBool::new(false),
                        pump: Mutex::new(None),
                    });
                    entries.insert(target.to_string(), Arc::clone(&entry));
                    (entry, true)
                }
            }
        };

        if !owner {
            return self.join(entry).await;
        }

        let factory = Arc::clone(&self.factory);
        let outcome = with_retry(self.options.connect_policy, TransportError::is_transient, |attempt| {
            entry.state().retry_count = attempt - 1;
            let factory = Arc::clone(&factory);
            let target = target.to_string();
            let protocols = protocols.to_vec();
            async move { factory.connect(&target, &protocols).await }
        })
        .await;

        match outcome {
            Ok(Attempted { value: socket, attempts }) => {
                entry.install(socket);
                info!(id = %entry.id, target, attempts, "socket connected");
                let handle = tokio::spawn(pump(
                    Arc::downgrade(self),
                    Arc::clone(&self.factory),
                    self.options,
                    Arc::clone(&entry),
                ));
                *entry.pump.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                Ok(entry.snapshot())
            }
            Err(RetryError { error, attempts }) => {
                warn!(id = %entry.id, target, attempts, error = %error, "socket connection failed");
                entry.set_error(error.to_string());
                entry.status.send_replace(ConnectionStatus::Error);
                self.forget(target, &entry.id);
                Err(ConnectionError::Exhausted {
                    target: target.to_string(),
                    attempts,
                    reason: error.to_string(),
                })
            }
        }
    }

    async fn join(&self, entry: Arc<Entry>) -> Result<ConnectionSnapshot, ConnectionError> {
        let mut status = entry.status.subscribe();
        loop {
            let current = *status.borrow_and_update();
            match current {
                ConnectionStatus::Connected => return Ok(entry.snapshot()),
                ConnectionStatus::Connecting => {
                    debug!(id = %entry.id, "joining in-flight connection attempt");
                    if status.changed().await.is_err() {
                        break;
                    }
                }
                ConnectionStatus::Closed | ConnectionStatus::Error => break,
            }
        }
        let snapshot = entry.snapshot();
        Err(ConnectionError::Exhausted {
            target: entry.target.clone(),
            attempts: snapshot.retry_count + 1,
            reason: snapshot.last_error.unwrap_or_else(|| "connection closed".to_string()),
        })
    }

    /// Close a connection by target or id and drop its record.
    pub async fn disconnect(&self, target_or_id: &str) -> Result<ConnectionSnapshot, ConnectionError> {
        let entry = self
            .find(target_or_id)
            .ok_or_else(|| ConnectionError::NotFound(target_or_id.to_string()))?;
        entry.closing.store(true, Ordering::SeqCst);
        self.forget(&entry.target, &entry.id);
        if let Some(handle) = entry.pump.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
        if let Some(socket) = entry.take_socket() {
            if let Err(error) = socket.close().await {
                debug!(id = %entry.id, error = %error, "socket close reported an error");
            }
        }
        entry.status.send_replace(ConnectionStatus::Closed);
        info!(id = %entry.id, target = %entry.target, "socket disconnected");
        Ok(entry.snapshot())
    }

    pub async fn send(&self, target_or_id: &str, payload: &Value) -> Result<(), ConnectionError> {
        let entry = self
            .find(target_or_id)
            .ok_or_else(|| TransportError::NotConnected(target_or_id.to_string()))?;
        if entry.status() != ConnectionStatus::Connected {
            return Err(TransportError::NotConnected(target_or_id.to_string()).into());
        }
        let socket = entry
            .socket()
            .ok_or_else(|| TransportError::NotConnected(target_or_id.to_string()))?;
        socket.send(payload).await?;
        Ok(())
    }

    pub fn messages(&self, target_or_id: &str) -> Vec<Value> {
        self.find(target_or_id)
            .map(|entry| entry.state().messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn snapshot(&self, target_or_id: &str) -> Option<ConnectionSnapshot> {
        self.find(target_or_id).map(|entry| entry.snapshot())
    }
}

async fn pump(
    registry: Weak<ConnectionRegistry>,
    factory: Arc<dyn SocketFactory>,
    options: ConnectionOptions,
    entry: Arc<Entry>,
) {
    loop {
        let Some(socket) = entry.socket() else { break };
        match socket.next_event().await {
            Some(SocketEvent::Message(message)) => entry.push_message(message, options.message_log_limit),
            Some(SocketEvent::Error(message)) => {
                warn!(id = %entry.id, error = %message, "socket reported an error");
                entry.set_error(message);
            }
            Some(SocketEvent::Closed { clean: true, code, .. }) => {
                info!(id = %entry.id, code, "socket closed cleanly");
                break;
            }
            Some(SocketEvent::Closed { clean: false, code, reason }) => {
                warn!(id = %entry.id, code, reason = reason.as_deref().unwrap_or(""), "socket closed unexpectedly");
                if !reconnect(&factory, &options, &entry).await {
                    entry.status.send_replace(ConnectionStatus::Error);
                    return finish(&registry, &entry);
                }
            }
            None => {
                if entry.closing.load(Ordering::SeqCst) {
                    break;
                }
                warn!(id = %entry.id, "socket stream ended");
                if !reconnect(&factory, &options, &entry).await {
                    entry.status.send_replace(ConnectionStatus::Error);
                    return finish(&registry, &entry);
                }
            }
        }
    }
    entry.take_socket();
    entry.status.send_replace(ConnectionStatus::Closed);
    finish(&registry, &entry);
}

fn finish(registry: &Weak<ConnectionRegistry>, entry: &Entry) {
    if let Some(registry) = registry.upgrade() {
        registry.forget(&entry.target, &entry.id);
    }
}

/// Spend reconnect budget until a socket is open again. The budget is not
/// refilled by a successful reconnect.
async fn reconnect(factory: &Arc<dyn SocketFactory>, options: &ConnectionOptions, entry: &Entry) -> bool {
    entry.take_socket();
    loop {
        {
            let mut state = entry.state();
            if state.reconnects_remaining == 0 {
                state.last_error.get_or_insert_with(|| "reconnect attempts exhausted".to_string());
                return false;
            }
            state.reconnects_remaining -= 1;
            state.retry_count += 1;
        }
        entry.status.send_replace(ConnectionStatus::Connecting);
        tokio::time::sleep(options.reconnect_delay).await;
        if entry.closing.load(Ordering::SeqCst) {
            return false;
        }
        match factory.connect(&entry.target, &entry.protocols).await {
            Ok(socket) => {
                info!(id = %entry.id, target = %entry.target, "socket reconnected");
                entry.install(socket);
                return true;
            }
            Err(error) => {
                warn!(id = %entry.id, error = %error, "socket reconnect failed");
                entry.set_error(error.to_string());
            }
        }
    }
}
