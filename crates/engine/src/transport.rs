//! Outbound request transport used by the HTTP and GraphQL actions.

use async_trait::async_trait;
use thiserror::Error;
use trellis_api::{ApiClient, ApiClientOptions, ApiError};
use trellis_types::{HttpRequest, HttpResponse};

use crate::config::EngineConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("transport unavailable: {0}")]
    Unsupported(String),
    #[error("not connected: {0}")]
    NotConnected(String),
    #[error("connection closed: {0}")]
    Closed(String),
}

impl TransportError {
    /// Whether a later attempt might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout(_)
                | TransportError::Network(_)
                | TransportError::NotConnected(_)
                | TransportError::Closed(_)
        )
    }
}

impl From<ApiError> for TransportError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::Timeout(message) => TransportError::Timeout(message),
            ApiError::Network(message) => TransportError::Network(message),
            other => TransportError::InvalidRequest(other.to_string()),
        }
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Transport backed by the shared reqwest client.
#[derive(Debug)]
pub struct ReqwestTransport {
    client: ApiClient,
}

impl ReqwestTransport {
    pub fn new(config: &EngineConfig) -> anyhow::Result<Self> {
        let options = ApiClientOptions {
            timeout: config.http_timeout(),
            default_headers: config.default_headers.clone(),
            ..ApiClientOptions::default()
        };
        Ok(Self {
            client: ApiClient::new(options)?,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        Ok(self.client.execute(request).await?)
    }
}

/// Placeholder for hosts without network access.
#[derive(Debug, Default)]
pub struct UnavailableHttpTransport;

#[async_trait]
impl HttpTransport for UnavailableHttpTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        Err(TransportError::Unsupported(format!(
            "no HTTP transport configured for {} {}",
            request.method, request.url
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_map_to_transport_errors() {
        assert!(TransportError::from(ApiError::Network("reset".into())).is_transient());
        assert!(!TransportError::from(ApiError::InvalidMethod("FETCH".into())).is_transient());
    }

    #[tokio::test]
    async fn unavailable_transport_rejects() {
        let error = UnavailableHttpTransport
            .send(&HttpRequest::new("get", "https://example.test"))
            .await
            .unwrap_err();
        assert!(matches!(error, TransportError::Unsupported(_)));
    }
}
