//! Non-blocking failure notifications.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use trellis_util::redact_json;

use crate::error::ErrorKind;

/// What a user-facing toast or log line needs to know about a failure.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FailureNotice {
    pub action: String,
    pub key: String,
    pub kind: ErrorKind,
    pub message: String,
    pub record: Value,
}

/// Receives one notice per failed action. Must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &FailureNotice);
}

/// Writes notices to the log.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: &FailureNotice) {
        warn!(
            action = %notice.action,
            key = %notice.key,
            kind = notice.kind.as_str(),
            "action failed: {}",
            notice.message
        );
        debug!(action = %notice.action, record = %redact_json(&notice.record), "failure record");
    }
}
