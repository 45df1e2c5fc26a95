//! Host page effects (navigation, focus, clipboard, ...).
//!
//! The engine never touches a document itself; it hands a typed request to
//! the host's [`DomEffects`] implementation and normalizes the outcome.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::info;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum DomActionType {
    Navigate,
    OpenUrl,
    ScrollTo,
    Focus,
    Blur,
    CopyToClipboard,
    Download,
    Print,
    SetTitle,
    ShowNotification,
    Reload,
    Back,
}

impl DomActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            DomActionType::Navigate => "navigate",
            DomActionType::OpenUrl => "openUrl",
            DomActionType::ScrollTo => "scrollTo",
            DomActionType::Focus => "focus",
            DomActionType::Blur => "blur",
            DomActionType::CopyToClipboard => "copyToClipboard",
            DomActionType::Download => "download",
            DomActionType::Print => "print",
            DomActionType::SetTitle => "setTitle",
            DomActionType::ShowNotification => "showNotification",
            DomActionType::Reload => "reload",
            DomActionType::Back => "back",
        }
    }

    /// Options that must be present for the effect to make sense.
    pub fn required_options(self) -> &'static [&'static str] {
        match self {
            DomActionType::Navigate | DomActionType::OpenUrl | DomActionType::Download => &["url"],
            DomActionType::Focus | DomActionType::Blur => &["selector"],
            DomActionType::CopyToClipboard => &["text"],
            DomActionType::SetTitle => &["title"],
            DomActionType::ShowNotification => &["message"],
            DomActionType::ScrollTo | DomActionType::Print | DomActionType::Reload | DomActionType::Back => &[],
        }
    }
}

#[async_trait]
pub trait DomEffects: Send + Sync {
    /// Perform the effect; the returned value is merged into the result.
    async fn perform(&self, action: DomActionType, options: &Map<String, Value>) -> Result<Value, String>;
}

/// Effects sink for headless runs: logs each request and reports success.
#[derive(Debug, Default)]
pub struct LoggingDom;

#[async_trait]
impl DomEffects for LoggingDom {
    async fn perform(&self, action: DomActionType, options: &Map<String, Value>) -> Result<Value, String> {
        let requested = Value::Object(options.clone());
        info!(action = action.as_str(), options = %requested, "dom effect requested");
        Ok(Value::Object(Map::new()))
    }
}

/// Uniform result: `{success, actionType, ...host fields}`.
pub fn normalize_dom_result(action: DomActionType, outcome: Value) -> Value {
    let mut result = Map::new();
    result.insert("success".into(), Value::Bool(true));
    result.insert("actionType".into(), json!(action.as_str()));
    match outcome {
        Value::Object(fields) => {
            for (key, value) in fields {
                if key != "actionType" {
                    result.insert(key, value);
                }
            }
        }
        Value::Null => {}
        other => {
            result.insert("value".into(), other);
        }
    }
    Value::Object(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_types_use_camel_case_names() {
        let parsed: DomActionType = serde_json::from_value(json!("copyToClipboard")).unwrap();
        assert_eq!(parsed, DomActionType::CopyToClipboard);
        assert_eq!(parsed.as_str(), "copyToClipboard");
        assert_eq!(DomActionType::Navigate.required_options(), &["url"]);
    }

    #[test]
    fn normalizes_host_outcomes() {
        assert_eq!(
            normalize_dom_result(DomActionType::Focus, json!({"focused": "#name"})),
            json!({"success": true, "actionType": "focus", "focused": "#name"})
        );
        assert_eq!(
            normalize_dom_result(DomActionType::Print, json!("queued")),
            json!({"success": true, "actionType": "print", "value": "queued"})
        );
    }

    #[tokio::test]
    async fn logging_dom_accepts_every_request() {
        let mut options = Map::new();
        options.insert("url".into(), json!("/orders"));
        let outcome = LoggingDom.perform(DomActionType::Navigate, &options).await.unwrap();
        assert_eq!(outcome, json!({}));
    }
}
