//! REST transport for the Pine backend.
//!
//! All endpoints hang off `{base_url}/api` and wrap their result in the
//! standard response shape `{ "status": "success", "data": <data> }`;
//! [`HttpClient`] unwraps that envelope before returning. Non-2xx
//! responses become [`PineError::Api`] with the status and a truncated
//! body.

use std::path::Path;

use parking_lot::RwLock;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use pine_core::{PineError, Result};

use crate::config::ApiConfig;

/// Production Pine backend.
pub const DEFAULT_BASE_URL: &str = "https://www.19pine.ai";

const USER_AGENT: &str = concat!("pine-rs/", env!("CARGO_PKG_VERSION"));

/// Body snippet length kept in error messages.
const ERROR_BODY_LIMIT: usize = 200;

/// Authenticated JSON client for the Pine REST API.
///
/// The bearer token may be set after construction (the auth flow obtains
/// it through this same client); all methods are safe to call
/// concurrently.
pub struct HttpClient {
    base: String,
    token: RwLock<Option<String>>,
    client: reqwest::Client,
}

impl HttpClient {
    /// Build a client from API settings.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| api_error("client_error", e.to_string()))?;
        Ok(Self {
            base: format!("{}/api", config.base_url.trim_end_matches('/')),
            token: RwLock::new(config.token.clone()),
            client,
        })
    }

    /// Install the bearer token used for authenticated requests.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    /// Whether a bearer token is installed.
    #[must_use]
    pub fn has_token(&self) -> bool {
        self.token.read().is_some()
    }

    /// GET a path. Authenticated.
    pub async fn get(&self, path: &str) -> Result<Value> {
        self.execute(Method::GET, path, None, true).await
    }

    /// POST a JSON body.
    pub async fn post(&self, path: &str, body: Option<Value>, authenticated: bool) -> Result<Value> {
        self.execute(Method::POST, path, body, authenticated).await
    }

    /// PUT a JSON body. Authenticated.
    pub async fn put(&self, path: &str, body: Option<Value>) -> Result<Value> {
        self.execute(Method::PUT, path, body, true).await
    }

    /// DELETE a path. Authenticated.
    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.execute(Method::DELETE, path, None, true).await
    }

    /// Multipart file upload. Authenticated.
    pub async fn upload(&self, path: &str, file_path: &Path) -> Result<Value> {
        let bytes = tokio::fs::read(file_path)
            .await
            .map_err(|e| api_error("upload_error", format!("cannot read {}: {e}", file_path.display())))?;
        let file_name = file_path
            .file_name()
            .map_or_else(|| "attachment".to_owned(), |n| n.to_string_lossy().into_owned());
        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name));

        let request = self
            .authorize(self.client.request(Method::POST, self.url(path)), true)
            .multipart(form);
        self.dispatch(path, request).await
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        authenticated: bool,
    ) -> Result<Value> {
        let mut request = self.authorize(self.client.request(method, self.url(path)), authenticated);
        if let Some(body) = body {
            request = request.json(&body);
        }
        self.dispatch(path, request).await
    }

    async fn dispatch(&self, path: &str, request: RequestBuilder) -> Result<Value> {
        debug!(path, "api request");
        let response = request
            .send()
            .await
            .map_err(|e| api_error("network_error", e.to_string()))?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            warn!(path, status = status.as_u16(), "api request failed");
            return Err(api_error(
                "http_error",
                format!("HTTP {}: {snippet}", status.as_u16()),
            ));
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let json: Value = response
            .json()
            .await
            .map_err(|e| api_error("decode_error", e.to_string()))?;
        Ok(unwrap_response(json))
    }

    fn authorize(&self, request: RequestBuilder, authenticated: bool) -> RequestBuilder {
        if authenticated {
            if let Some(token) = self.token.read().as_deref() {
                return request.bearer_auth(token);
            }
        }
        request
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }
}

/// Unwrap the standard response shape, passing other shapes through.
fn unwrap_response(json: Value) -> Value {
    match json {
        Value::Object(mut map) if map.contains_key("status") && map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn api_error(code: &str, message: impl Into<String>) -> PineError {
    PineError::Api {
        code: code.to_owned(),
        message: message.into(),
    }
}
