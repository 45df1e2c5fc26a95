//! HTTP client utilities.
//!
//! This module provides a lightweight client used by network-bound actions.
//! It focuses on:
//!
//! - Constructing an HTTP client with sensible defaults
//! - Validating request targets before anything is sent
//! - Building requests with a consistent User-Agent and Accept headers
//! - Decoding responses into the shared [`HttpResponse`] record
//!
//! The primary entry point is [`ApiClient`].
//!
//! # Example
//!
//! ```ignore
//! use trellis_api::{ApiClient, ApiClientOptions};
//! use trellis_types::HttpRequest;
//!
//! let client = ApiClient::new(ApiClientOptions::default())?;
//! let response = client.execute(&HttpRequest::new("GET", "https://api.example.com/users")).await?;
//! println!("status: {}", response.status);
//! ```

use std::time::Duration;
use std::env;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use reqwest::{Client, Method, Url, header};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use trellis_types::{HttpRequest, HttpResponse, ResponseType};
use trellis_util::redact_sensitive;

/// Hostnames allowed to use plain `http` without a warning.
const LOCALHOST_DOMAINS: &[&str] = &["localhost", "127.0.0.1", "[::1]"];

/// Failure while sending a request.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid request method '{0}'")]
    InvalidMethod(String),

    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("request failed: {0}")]
    Network(String),
}

impl ApiError {
    /// Network failures and timeouts may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Timeout(_) | ApiError::Network(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        let message = redact_sensitive(&error.to_string());
        if error.is_timeout() {
            ApiError::Timeout(message)
        } else {
            ApiError::Network(message)
        }
    }
}

/// Construction options for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ApiClientOptions {
    pub timeout: Duration,
    pub default_headers: IndexMap<String, String>,
    pub user_agent: String,
}

impl Default for ApiClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            default_headers: IndexMap::new(),
            user_agent: format!("trellis/{}; {}", env!("CARGO_PKG_VERSION"), env::consts::OS),
        }
    }
}

#[derive(Debug, Clone)]
/// Thin wrapper around a configured `reqwest::Client`.
///
/// The client pre-configures default headers and a request timeout. Every
/// request target is validated before sending.
pub struct ApiClient {
    pub http: Client,
    pub user_agent: String,
}

impl ApiClient {
    pub fn new(options: ApiClientOptions) -> Result<Self> {
        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json, text/plain, */*"));
        for (name, value) in &options.default_headers {
            let header_name =
                header::HeaderName::from_bytes(name.as_bytes()).with_context(|| format!("invalid default header name '{}'", name))?;
            let header_value = header::HeaderValue::from_str(value).with_context(|| format!("invalid default header value for '{}'", name))?;
            default_headers.insert(header_name, header_value);
        }

        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(options.timeout)
            .build()
            .context("build http client")?;

        Ok(Self {
            http,
            user_agent: options.user_agent,
        })
    }

    /// Send a request and decode the response.
    ///
    /// Non-2xx statuses are returned as responses, not errors; callers decide
    /// how to classify them.
    pub async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let url = validate_target_url(&request.url)?;
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| ApiError::InvalidMethod(request.method.clone()))?;
        debug!(method = %method, url = %redact_sensitive(url.as_str()), "sending request");

        let mut builder = self.http.request(method, url).header(header::USER_AGENT, &self.user_agent);
        for (name, value) in &request.headers {
            let header_name = header::HeaderName::from_bytes(name.as_bytes()).map_err(|error| ApiError::InvalidHeader {
                name: name.clone(),
                reason: error.to_string(),
            })?;
            builder = builder.header(header_name, value);
        }
        if !request.query.is_empty() {
            let pairs: Vec<(&str, &str)> = request.query.iter().map(|(key, value)| (key.as_str(), value.as_str())).collect();
            builder = builder.query(&pairs);
        }
        match &request.body {
            None | Some(Value::Null) => {}
            Some(Value::String(text)) => builder = builder.body(text.clone()),
            Some(body) => builder = builder.json(body),
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|text| (name.as_str().to_string(), text.to_string())))
            .collect::<IndexMap<_, _>>();
        let text = response.text().await?;
        debug!(status, bytes = text.len(), "received response");

        Ok(HttpResponse {
            status,
            data: decode_body(&text, request.response_type),
            headers,
        })
    }
}

/// Decode a response body according to the requested response type.
///
/// JSON decoding falls back to the raw text when the body is not JSON; an
/// empty body decodes to null.
pub fn decode_body(text: &str, response_type: ResponseType) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    match response_type {
        ResponseType::Text => Value::String(text.to_string()),
        ResponseType::Json => serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())),
    }
}

/// Validate that a request target is an absolute http(s) URL with a host.
///
/// Plain `http` to a non-local host is allowed but logged.
pub fn validate_target_url(raw: &str) -> Result<Url, ApiError> {
    let parsed = Url::parse(raw.trim()).map_err(|error| ApiError::InvalidUrl {
        url: redact_sensitive(raw),
        reason: error.to_string(),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::InvalidUrl {
            url: redact_sensitive(raw),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }

    let host_name = parsed.host_str().ok_or_else(|| ApiError::InvalidUrl {
        url: redact_sensitive(raw),
        reason: "url must include a host".to_string(),
    })?;

    let is_local = LOCALHOST_DOMAINS.iter().any(|&allowed| host_name.eq_ignore_ascii_case(allowed));
    if parsed.scheme() == "http" && !is_local {
        warn!(host = %host_name, "sending request over plain http");
    }

    Ok(parsed)
}
