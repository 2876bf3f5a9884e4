//! # pine-api
//!
//! REST collaborators for the Pine client engine:
//!
//! - **Config** ([`config`]): defaults, `~/.pine/settings.json` deep
//!   merge, `PINE_*` environment overrides
//! - **HTTP** ([`http`]): authenticated JSON transport with the standard
//!   response-envelope unwrap
//! - **Auth** ([`auth`]): two-step email verification
//! - **Sessions** ([`sessions`]): session CRUD, task control, and
//!   attachments; implements the stream engine's authoritative-state
//!   lookup

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod http;
pub mod sessions;

use std::sync::Arc;

use pine_core::Result;

pub use auth::{AuthApi, AuthTokens, CodeRequest};
pub use config::{load_config, ConfigError, PineConfig};
pub use http::{HttpClient, DEFAULT_BASE_URL};
pub use sessions::{SessionInfo, SessionList, SessionsApi};

/// The REST surface, grouped.
pub struct PineApi {
    http: Arc<HttpClient>,
    /// Email verification flow.
    pub auth: AuthApi,
    /// Session CRUD, task control, and attachments.
    pub sessions: Arc<SessionsApi>,
}

impl PineApi {
    /// Build the REST surface from configuration.
    pub fn new(config: &PineConfig) -> Result<Self> {
        let http = Arc::new(HttpClient::new(&config.api)?);
        Ok(Self {
            auth: AuthApi::new(Arc::clone(&http)),
            sessions: Arc::new(SessionsApi::new(Arc::clone(&http))),
            http,
        })
    }

    /// Whether a bearer token is installed.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.http.has_token()
    }
}
