//! Generic JSON request wrapper around the REST backend.
//!
//! Every call is normalized to an [`ApiResponse`] (`status`, `data` or
//! `error`); a request that never got a response reports `status: 0`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ApiError, NETWORK_ERROR_MESSAGE};

/// Fallback message for a failed response without a readable error field.
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred.";

/// HTTP method of an [`ApiRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A request against the backend, relative to the configured base URL
/// unless `path` is an absolute URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Serialize `body` as the JSON request body.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body).map_err(|e| ApiError::Encode(e.to_string()))?);
        Ok(self)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Override the transport's default timeout for this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Normalized result of one HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl ApiResponse {
    pub fn ok(status: u16, data: Value) -> Self {
        Self {
            status,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(status: u16, error: impl Into<String>) -> Self {
        Self {
            status,
            data: None,
            error: Some(error.into()),
        }
    }

    /// No response was received at all.
    pub fn network(error: impl Into<String>) -> Self {
        Self::failure(0, error)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Turn the normalized response into a typed result.
    pub fn into_result(self) -> Result<ApiReply, ApiError> {
        if self.status == 0 {
            return Err(ApiError::Transport(
                self.error
                    .unwrap_or_else(|| NETWORK_ERROR_MESSAGE.to_string()),
            ));
        }

        if self.is_success() {
            Ok(ApiReply {
                status: self.status,
                data: self.data.unwrap_or(Value::Null),
            })
        } else {
            Err(ApiError::Server {
                status: self.status,
                message: self
                    .error
                    .unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string()),
            })
        }
    }
}

/// A successful (2xx) response body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    pub status: u16,
    pub data: Value,
}

impl ApiReply {
    /// Decode the body into the endpoint's schema.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        serde_json::from_value(self.data).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Sends requests to the backend.
///
/// `bearer` is attached as `Authorization: Bearer <token>` when present.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest, bearer: Option<&str>) -> ApiResponse;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_timeouts(
            &config.api.base_url,
            config.request_timeout(),
            config.connect_timeout(),
        )
    }

    pub fn with_timeouts(base_url: &str, timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        Url::parse(base_url).with_context(|| format!("Invalid API base URL: {}", base_url))?;

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Resolve `path` against the base URL unless it is already absolute.
    pub fn resolve(&self, path: &str) -> Result<Url, url::ParseError> {
        if let Ok(url) = Url::parse(path) {
            return Ok(url);
        }

        if path.starts_with('/') {
            Url::parse(&format!("{}{}", self.base_url, path))
        } else {
            Url::parse(&format!("{}/{}", self.base_url, path))
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest, bearer: Option<&str>) -> ApiResponse {
        let request_id = Uuid::new_v4();

        let mut url = match self.resolve(&request.path) {
            Ok(url) => url,
            Err(e) => return ApiResponse::network(format!("Invalid request URL: {}", e)),
        };

        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }

        debug!(%request_id, method = ?request.method, %url, "Sending request");

        let mut builder = self
            .http_client
            .request(request.method.as_reqwest(), url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(%request_id, "Request failed without a response: {}", e);
                return ApiResponse::network(e.to_string());
            }
        };

        let status = response.status().as_u16();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return ApiResponse::network(e.to_string()),
        };

        debug!(%request_id, status, "Received response");
        normalize(status, &bytes)
    }
}

/// Map a raw status and body to an [`ApiResponse`].
pub fn normalize(status: u16, body: &[u8]) -> ApiResponse {
    let parsed = if body.iter().all(u8::is_ascii_whitespace) {
        Ok(Value::Null)
    } else {
        serde_json::from_slice::<Value>(body)
    };

    if (200..300).contains(&status) {
        return match parsed {
            Ok(value) => ApiResponse::ok(status, value),
            Err(e) => ApiResponse::network(e.to_string()),
        };
    }

    let message = parsed
        .ok()
        .and_then(|value| error_message(&value))
        .unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string());

    ApiResponse::failure(status, message)
}

/// Pull a human-readable message out of an error body.
///
/// Looks at `error`, `detail` and `details` first, then falls back to the
/// first field-level validation message (`{"username": ["..."]}`).
fn error_message(body: &Value) -> Option<String> {
    for key in ["error", "detail", "details"] {
        match body.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Null) | None => {}
            Some(other) => return first_message(other),
        }
    }

    let object = body.as_object()?;
    object.iter().find_map(|(field, value)| {
        first_message(value).map(|msg| {
            if field == "non_field_errors" {
                msg
            } else {
                format!("{}: {}", field, msg)
            }
        })
    })
}

fn first_message(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_message),
        Value::Object(map) => map.values().find_map(first_message),
        _ => None,
    }
}
