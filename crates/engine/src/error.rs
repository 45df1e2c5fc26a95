//! Error taxonomy for action execution.
//!
//! Every failure an action can produce maps onto one [`ErrorKind`]. The kind
//! decides whether the retry loop tries again and how the failure is written
//! into the execution context's error map.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use trellis_util::now_rfc3339;

use crate::resolve::ResolveError;

/// Classification recorded with every error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Configuration,
    Transient,
    Operation,
    Semantic,
    Sandbox,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Transient => "transient",
            ErrorKind::Operation => "operation",
            ErrorKind::Semantic => "semantic",
            ErrorKind::Sandbox => "sandbox",
        }
    }
}

/// Failure raised by an action handler or by the executor around it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActionError {
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("transient error: {message}")]
    Transient { message: String, status: Option<u16> },

    #[error("operation failed after {attempts} attempt(s): {message}")]
    Operation {
        message: String,
        attempts: u32,
        status: Option<u16>,
    },

    #[error("semantic error: {message}")]
    Semantic {
        message: String,
        status: Option<u16>,
        /// Data returned alongside the error, written to the result map.
        partial: Option<Value>,
        /// Response context such as a GraphQL `errors` array.
        details: Value,
    },

    #[error("sandbox violation: {message}")]
    SandboxViolation { message: String },
}

impl ActionError {
    pub fn configuration(message: impl Into<String>) -> Self {
        ActionError::Configuration { message: message.into() }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        ActionError::Transient {
            message: message.into(),
            status: None,
        }
    }

    pub fn semantic(message: impl Into<String>, status: Option<u16>, details: Value) -> Self {
        ActionError::Semantic {
            message: message.into(),
            status,
            partial: None,
            details,
        }
    }

    pub fn sandbox(message: impl Into<String>) -> Self {
        ActionError::SandboxViolation { message: message.into() }
    }

    /// Single-attempt failure of a host collaborator.
    pub fn operation(message: impl Into<String>) -> Self {
        ActionError::Operation {
            message: message.into(),
            attempts: 1,
            status: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionError::Configuration { .. } => ErrorKind::Configuration,
            ActionError::Transient { .. } => ErrorKind::Transient,
            ActionError::Operation { .. } => ErrorKind::Operation,
            ActionError::Semantic { .. } => ErrorKind::Semantic,
            ActionError::SandboxViolation { .. } => ErrorKind::Sandbox,
        }
    }

    /// Only transient failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActionError::Transient { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ActionError::Transient { status, .. } | ActionError::Operation { status, .. } | ActionError::Semantic { status, .. } => *status,
            _ => None,
        }
    }

    pub fn attempts(&self) -> Option<u32> {
        match self {
            ActionError::Operation { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    pub fn partial(&self) -> Option<&Value> {
        match self {
            ActionError::Semantic { partial, .. } => partial.as_ref(),
            _ => None,
        }
    }

    /// Converts a retry-exhausted transient failure into an operation error.
    ///
    /// Other kinds pass through unchanged.
    pub fn exhausted(self, attempts: u32) -> Self {
        match self {
            ActionError::Transient { message, status } => ActionError::Operation { message, attempts, status },
            other => other,
        }
    }

    /// Structured record written to the error map.
    pub fn to_record(&self, key: &str) -> Value {
        let mut record = Map::new();
        record.insert("error".into(), json!(self.to_string()));
        record.insert("kind".into(), json!(self.kind().as_str()));
        record.insert("timestamp".into(), json!(now_rfc3339()));
        record.insert("action".into(), json!(key));
        if let Some(attempts) = self.attempts() {
            record.insert("attempts".into(), json!(attempts));
        }
        if let Some(status) = self.status() {
            record.insert("status".into(), json!(status));
        }
        if let ActionError::Semantic { details, .. } = self
            && !details.is_null()
        {
            record.insert("context".into(), details.clone());
        }
        Value::Object(record)
    }
}

/// Markers that cannot be parsed are malformed configuration.
impl From<ResolveError> for ActionError {
    fn from(error: ResolveError) -> Self {
        ActionError::configuration(error.to_string())
    }
}
