//! `http.request` and `graphql.query`.
//!
//! Both go through [`perform`]: consult the cache, run the request inside
//! the retry loop, then cache the successful result. 5xx responses and
//! network failures are transient; 4xx responses and GraphQL `errors`
//! arrays are semantic and never retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};
use trellis_types::{ConfigSchema, FieldSpec, FieldType, HttpRequest, HttpResponse, ResponseType};
use trellis_util::redact_sensitive;

use crate::cache::fingerprint;
use crate::error::ActionError;
use crate::executor::{ActionEnv, ActionHandler, ActionOutput};
use crate::expr::display_string;
use crate::retry::{Attempted, RetryError, RetryPolicy, with_retry};
use crate::transport::{HttpTransport, TransportError};

/// Cache and retry overrides shared by the network actions.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkOptions {
    /// Force caching on or off; the default depends on the action.
    #[serde(default)]
    pub cache: Option<bool>,
    #[serde(default)]
    pub cache_ttl_ms: Option<u64>,
    #[serde(default)]
    pub retry_attempts: Option<u32>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
}

impl NetworkOptions {
    fn retry_policy(&self, env: &ActionEnv<'_>) -> RetryPolicy {
        let defaults = env.services().config.retry_policy();
        RetryPolicy::new(
            self.retry_attempts.unwrap_or(defaults.attempts),
            self.retry_delay_ms.map(Duration::from_millis).unwrap_or(defaults.delay),
        )
    }

    fn cache_ttl(&self, env: &ActionEnv<'_>) -> Duration {
        self.cache_ttl_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| env.services().config.cache_ttl())
    }
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: IndexMap<String, Value>,
    #[serde(default)]
    pub query: IndexMap<String, Value>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub response_type: ResponseType,
    #[serde(flatten)]
    pub network: NetworkOptions,
}

impl HttpRequestConfig {
    fn to_request(&self) -> HttpRequest {
        let mut request = HttpRequest::new(&self.method, &self.url);
        request.headers = stringify_map(&self.headers);
        request.query = stringify_map(&self.query);
        request.body = self.body.clone().filter(|body| !body.is_null());
        request.response_type = self.response_type;
        request
    }
}

fn stringify_map(values: &IndexMap<String, Value>) -> IndexMap<String, String> {
    values
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| (name.clone(), display_string(Some(value))))
        .collect()
}

pub struct HttpRequestAction;

#[async_trait]
impl ActionHandler for HttpRequestAction {
    type Config = HttpRequestConfig;
    const KEY: &'static str = "http.request";

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field("url", FieldSpec::required(FieldType::String))
            .field(
                "method",
                FieldSpec::optional(FieldType::String).one_of(
                    ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"]
                        .into_iter()
                        .map(Value::from),
                ),
            )
            .field("headers", FieldSpec::optional(FieldType::Object))
            .field("query", FieldSpec::optional(FieldType::Object))
            .field("responseType", FieldSpec::optional(FieldType::String).one_of([json!("json"), json!("text")]))
            .field("cache", FieldSpec::optional(FieldType::Boolean))
            .field("cacheTtlMs", FieldSpec::optional(FieldType::Number))
            .field("retryAttempts", FieldSpec::optional(FieldType::Number))
            .field("retryDelayMs", FieldSpec::optional(FieldType::Number))
    }

    async fn run(&self, config: HttpRequestConfig, env: &mut ActionEnv<'_>) -> Result<ActionOutput, ActionError> {
        let request = config.to_request();
        // Reads are cacheable unless switched off; writes only on request.
        let cacheable = config.network.cache.unwrap_or(request.method == "GET");
        let cache_key = cacheable.then(|| {
            fingerprint(
                &request.method,
                &request.url,
                &json!({
                    "query": request.query,
                    "body": request.body,
                    "headers": header_shape(&request),
                }),
            )
        });
        perform(env, request, cache_key, &config.network, http_result).await
    }
}

/// Request headers with case-folded names, so `Authorization` and
/// `authorization` land on the same cache entry.
fn header_shape(request: &HttpRequest) -> Value {
    let headers: serde_json::Map<String, Value> = request
        .headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), Value::String(value.clone())))
        .collect();
    Value::Object(headers)
}

/// `{status, data, headers}` for 2xx and 3xx responses.
fn http_result(response: HttpResponse) -> Result<Value, ActionError> {
    check_status(&response)?;
    Ok(response_value(response))
}

fn response_value(response: HttpResponse) -> Value {
    json!({
        "status": response.status,
        "data": response.data,
        "headers": response.headers,
    })
}

fn check_status(response: &HttpResponse) -> Result<(), ActionError> {
    if response.is_server_error() {
        return Err(ActionError::Transient {
            message: format!("server responded with {}", response.status),
            status: Some(response.status),
        });
    }
    if response.is_client_error() {
        return Err(ActionError::semantic(
            format!("request rejected with {}", response.status),
            Some(response.status),
            json!({ "data": response.data }),
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlQueryConfig {
    pub url: String,
    pub query: String,
    #[serde(default)]
    pub variables: Option<Value>,
    #[serde(default)]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub headers: IndexMap<String, Value>,
    #[serde(flatten)]
    pub network: NetworkOptions,
}

impl GraphqlQueryConfig {
    fn is_mutation(&self) -> bool {
        self.query.trim_start().starts_with("mutation")
    }

    fn to_request(&self) -> HttpRequest {
        let mut body = serde_json::Map::new();
        body.insert("query".into(), json!(self.query));
        if let Some(variables) = self.variables.as_ref().filter(|variables| !variables.is_null()) {
            body.insert("variables".into(), variables.clone());
        }
        if let Some(operation_name) = &self.operation_name {
            body.insert("operationName".into(), json!(operation_name));
        }
        let mut request = HttpRequest::new("POST", &self.url).with_body(Value::Object(body));
        request.headers = stringify_map(&self.headers);
        request.headers.entry("Content-Type".into()).or_insert_with(|| "application/json".into());
        request
    }
}

pub struct GraphqlQueryAction;

#[async_trait]
impl ActionHandler for GraphqlQueryAction {
    type Config = GraphqlQueryConfig;
    const KEY: &'static str = "graphql.query";

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field("url", FieldSpec::required(FieldType::String))
            .field("query", FieldSpec::required(FieldType::String))
            .field("variables", FieldSpec::optional(FieldType::Object))
            .field("operationName", FieldSpec::optional(FieldType::String))
            .field("headers", FieldSpec::optional(FieldType::Object))
            .field("cache", FieldSpec::optional(FieldType::Boolean))
            .field("cacheTtlMs", FieldSpec::optional(FieldType::Number))
            .field("retryAttempts", FieldSpec::optional(FieldType::Number))
            .field("retryDelayMs", FieldSpec::optional(FieldType::Number))
    }

    async fn run(&self, config: GraphqlQueryConfig, env: &mut ActionEnv<'_>) -> Result<ActionOutput, ActionError> {
        let request = config.to_request();
        let cacheable = config.network.cache.unwrap_or(!config.is_mutation());
        let cache_key = cacheable.then(|| {
            fingerprint(
                "POST",
                &request.url,
                &json!({
                    "query": config.query,
                    "variables": config.variables,
                    "operationName": config.operation_name,
                    "headers": header_shape(&request),
                }),
            )
        });
        perform(env, request, cache_key, &config.network, graphql_result).await
    }
}

/// GraphQL reports failures in the body; an `errors` array is semantic and
/// any `data` next to it is kept as partial output.
fn graphql_result(response: HttpResponse) -> Result<Value, ActionError> {
    check_status(&response)?;
    let errors = response
        .data
        .get("errors")
        .and_then(Value::as_array)
        .filter(|errors| !errors.is_empty())
        .cloned();
    let data = response.data.get("data").cloned().unwrap_or(Value::Null);
    let value = json!({
        "status": response.status,
        "data": data,
        "headers": response.headers,
    });
    match errors {
        Some(errors) => {
            let message = errors
                .first()
                .and_then(|error| error.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("GraphQL request returned errors")
                .to_string();
            Err(ActionError::Semantic {
                message,
                status: Some(response.status),
                partial: (!data.is_null()).then_some(value),
                details: json!({ "errors": errors }),
            })
        }
        None => Ok(value),
    }
}

fn transport_failure(error: TransportError) -> ActionError {
    match error {
        error if error.is_transient() => ActionError::transient(error.to_string()),
        TransportError::InvalidRequest(message) => ActionError::configuration(message),
        other => ActionError::operation(other.to_string()),
    }
}

/// Cache lookup, retried send, cache fill.
async fn perform(
    env: &ActionEnv<'_>,
    request: HttpRequest,
    cache_key: Option<String>,
    network: &NetworkOptions,
    interpret: fn(HttpResponse) -> Result<Value, ActionError>,
) -> Result<ActionOutput, ActionError> {
    let cache = Arc::clone(&env.services().cache);
    if let Some(key) = &cache_key
        && let Some(hit) = cache.get(key)
    {
        debug!(action = %env.descriptor.name, key = %redact_sensitive(key), "cache hit");
        return Ok(ActionOutput::new(hit).with_attempts(0));
    }

    let transport: Arc<dyn HttpTransport> = Arc::clone(&env.services().http);
    let policy = network.retry_policy(env);
    let target = redact_sensitive(&request.url);
    let outcome = with_retry(policy, ActionError::is_retryable, |attempt| {
        let transport = Arc::clone(&transport);
        let request = request.clone();
        let target = target.clone();
        async move {
            debug!(method = %request.method, url = %target, attempt, "sending request");
            let response = transport.send(&request).await.map_err(transport_failure)?;
            interpret(response)
        }
    })
    .await;

    match outcome {
        Ok(Attempted { value, attempts }) => {
            if let Some(key) = cache_key {
                cache.put(key, value.clone(), network.cache_ttl(env));
            }
            Ok(ActionOutput::new(value).with_attempts(attempts))
        }
        Err(RetryError { error, attempts }) => {
            warn!(
                action = %env.descriptor.name,
                url = %target,
                attempts,
                error = %error,
                "request failed"
            );
            Err(error.exhausted(attempts))
        }
    }
}
