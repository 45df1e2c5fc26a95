//! Socket actions over the shared connection registry.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use trellis_types::{ConfigSchema, FieldSpec, FieldType};

use crate::connection::{ConnectionError, ConnectionSnapshot};
use crate::error::ActionError;
use crate::executor::{ActionEnv, ActionHandler, ActionOutput};
use crate::retry::{Attempted, RetryError, with_retry};

/// `{id, target, status, retryCount}`.
fn socket_result(snapshot: &ConnectionSnapshot) -> Value {
    json!({
        "id": snapshot.id,
        "target": snapshot.target,
        "status": snapshot.status,
        "retryCount": snapshot.retry_count,
    })
}

fn connection_failure(error: ConnectionError) -> ActionError {
    match error {
        ConnectionError::Exhausted { target, attempts, reason } => ActionError::Operation {
            message: format!("could not connect to {}: {}", target, reason),
            attempts,
            status: None,
        },
        ConnectionError::NotFound(target) => ActionError::configuration(format!("no connection for '{}'", target)),
        ConnectionError::Transport(error) if error.is_transient() => ActionError::transient(error.to_string()),
        ConnectionError::Transport(error) => ActionError::operation(error.to_string()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketConnectConfig {
    pub url: String,
    #[serde(default)]
    pub protocols: Vec<String>,
}

pub struct SocketConnectAction;

#[async_trait]
impl ActionHandler for SocketConnectAction {
    type Config = SocketConnectConfig;
    const KEY: &'static str = "socket.connect";

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field("url", FieldSpec::required(FieldType::String).pattern("^wss?://"))
            .field("protocols", FieldSpec::optional(FieldType::Array))
    }

    async fn run(&self, config: SocketConnectConfig, env: &mut ActionEnv<'_>) -> Result<ActionOutput, ActionError> {
        let connections = Arc::clone(&env.services().connections);
        let snapshot = connections
            .connect_or_join(&config.url, &config.protocols)
            .await
            .map_err(connection_failure)?;
        Ok(ActionOutput::new(socket_result(&snapshot)).with_attempts(snapshot.retry_count + 1))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketSendConfig {
    /// Target url or connection id.
    pub target: String,
    pub message: Value,
}

pub struct SocketSendAction;

#[async_trait]
impl ActionHandler for SocketSendAction {
    type Config = SocketSendConfig;
    const KEY: &'static str = "socket.send";

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field("target", FieldSpec::required(FieldType::String))
            .field("message", FieldSpec::required(FieldType::Any))
    }

    async fn run(&self, config: SocketSendConfig, env: &mut ActionEnv<'_>) -> Result<ActionOutput, ActionError> {
        let connections = Arc::clone(&env.services().connections);
        let policy = env.services().config.retry_policy();
        let outcome = with_retry(policy, ActionError::is_retryable, |_| {
            let connections = Arc::clone(&connections);
            let target = config.target.clone();
            let message = config.message.clone();
            async move { connections.send(&target, &message).await.map_err(connection_failure) }
        })
        .await;
        match outcome {
            Ok(Attempted { attempts, .. }) => {
                let status = connections.snapshot(&config.target).map(|snapshot| socket_result(&snapshot));
                Ok(ActionOutput::new(json!({
                    "sent": true,
                    "target": config.target,
                    "connection": status,
                }))
                .with_attempts(attempts))
            }
            Err(RetryError { error, attempts }) => Err(error.exhausted(attempts)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SocketDisconnectConfig {
    pub target: String,
}

pub struct SocketDisconnectAction;

#[async_trait]
impl ActionHandler for SocketDisconnectAction {
    type Config = SocketDisconnectConfig;
    const KEY: &'static str = "socket.disconnect";

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new().field("target", FieldSpec::required(FieldType::String))
    }

    async fn run(&self, config: SocketDisconnectConfig, env: &mut ActionEnv<'_>) -> Result<ActionOutput, ActionError> {
        let snapshot = env
            .services()
            .connections
            .disconnect(&config.target)
            .await
            .map_err(connection_failure)?;
        Ok(ActionOutput::new(socket_result(&snapshot)))
    }
}
