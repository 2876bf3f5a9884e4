//! Two-step email verification.
//!
//! 1. [`AuthApi::request_code`]: the backend emails a verification code
//!    and returns a request token binding the attempt.
//! 2. [`AuthApi::verify_code`]: exchange email, code, and request token
//!    for an access token, which is installed on the shared HTTP client
//!    so subsequent requests are authenticated.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use pine_core::{PineError, Result};

use crate::http::HttpClient;

/// Outcome of [`AuthApi::request_code`].
#[derive(Clone, Debug, Deserialize)]
pub struct CodeRequest {
    /// Token binding the verification attempt; echo it back with the code.
    pub request_token: String,
}

/// Outcome of [`AuthApi::verify_code`].
#[derive(Clone, Debug, Deserialize)]
pub struct AuthTokens {
    /// Bearer token for subsequent requests.
    pub access_token: String,
    /// Refresh token, when the backend issues one.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Email verification flow.
pub struct AuthApi {
    http: Arc<HttpClient>,
}

impl AuthApi {
    pub(crate) fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    /// Request a verification code for `email`.
    pub async fn request_code(&self, email: &str) -> Result<CodeRequest> {
        let data = self
            .http
            .post(
                "/v2/auth/email/request",
                Some(json!({ "email": email })),
                false,
            )
            .await?;
        decode("auth_error", data)
    }

    /// Verify the emailed code and install the resulting access token.
    pub async fn verify_code(
        &self,
        email: &str,
        code: &str,
        request_token: &str,
    ) -> Result<AuthTokens> {
        let data = self
            .http
            .post(
                "/v2/auth/email/verify",
                Some(json!({
                    "email": email,
                    "code": code,
                    "request_token": request_token,
                })),
                false,
            )
            .await?;
        let tokens: AuthTokens = decode("auth_error", data)?;
        self.http.set_token(tokens.access_token.clone());
        info!("authenticated, bearer token installed");
        Ok(tokens)
    }
}

fn decode<T: serde::de::DeserializeOwned>(code: &str, data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| PineError::Api {
        code: code.to_owned(),
        message: format!("unexpected response shape: {e}"),
    })
}
