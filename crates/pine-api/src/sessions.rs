//! Sessions and attachments REST API.
//!
//! Also the authoritative-state collaborator: [`SessionsApi`] implements
//! [`SessionStateApi`], so a client wired with it reconciles idle turns
//! against `GET /v2/sessions/{id}`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use pine_core::{MessageId, PineError, Result, SessionId};
use pine_stream::SessionStateApi;

use crate::http::HttpClient;

/// A session as the backend reports it.
#[derive(Clone, Debug, Deserialize)]
pub struct SessionInfo {
    /// Session identifier.
    pub id: SessionId,
    /// Session kind, when reported.
    #[serde(default, rename = "type")]
    pub session_type: Option<String>,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Whether the backend marked the session stale.
    #[serde(default)]
    pub is_stale: Option<bool>,
    /// Lifecycle state (`init`, `in_progress`, `task_finished`, ...).
    #[serde(default = "default_state")]
    pub state: String,
    /// Creation timestamp, RFC 3339.
    #[serde(default)]
    pub created_at: String,
    /// Last-update timestamp, RFC 3339.
    #[serde(default)]
    pub updated_at: String,
}

fn default_state() -> String {
    "init".to_owned()
}

/// One page of the session list.
#[derive(Clone, Debug, Deserialize)]
pub struct SessionList {
    /// Sessions in this page.
    pub sessions: Vec<SessionInfo>,
    /// Total sessions matching the query.
    pub total: u64,
    /// Requested page size.
    pub limit: u32,
    /// Requested offset.
    pub offset: u32,
}

/// Session CRUD, task control, and attachments.
pub struct SessionsApi {
    http: Arc<HttpClient>,
}

impl SessionsApi {
    pub(crate) fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    /// List sessions, optionally filtered by lifecycle state.
    pub async fn list(
        &self,
        state: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<SessionList> {
        let mut path = format!("/v2/sessions?limit={limit}&offset={offset}");
        if let Some(state) = state {
            path.push_str(&format!("&state={state}"));
        }
        decode(self.http.get(&path).await?)
    }

    /// Fetch one session.
    pub async fn get(&self, session_id: &SessionId) -> Result<SessionInfo> {
        decode(self.http.get(&format!("/v2/sessions/{session_id}")).await?)
    }

    /// Create a fresh session.
    pub async fn create(&self) -> Result<SessionInfo> {
        decode(self.http.post("/v2/sessions", None, true).await?)
    }

    /// Delete a session. `force` removes it even when still active.
    pub async fn delete(&self, session_id: &SessionId, force: bool) -> Result<()> {
        let path = if force {
            format!("/v2/sessions/{session_id}?force_delete=true")
        } else {
            format!("/v2/sessions/{session_id}")
        };
        let _ = self.http.delete(&path).await?;
        Ok(())
    }

    /// Start the session's task.
    pub async fn start_task(&self, session_id: &SessionId) -> Result<Value> {
        self.http
            .post(&format!("/v2/sessions/{session_id}/start"), None, true)
            .await
    }

    /// Stop the session's task.
    pub async fn stop_task(&self, session_id: &SessionId) -> Result<Value> {
        self.http
            .post(&format!("/v2/sessions/{session_id}/stop"), None, true)
            .await
    }

    /// Enable or reschedule the reminder for a scheduled call message.
    pub async fn update_scheduled_call_reminder(
        &self,
        session_id: &SessionId,
        message_id: &MessageId,
        scheduled_time: &str,
        enabled: bool,
    ) -> Result<Value> {
        self.http
            .put(
                &format!("/v2/sessions/{session_id}/scheduled-call-reminder"),
                Some(json!({
                    "message_id": message_id,
                    "scheduled_time": scheduled_time,
                    "scheduled_call_reminder": enabled,
                })),
            )
            .await
    }

    /// Report a social share of the session's result.
    pub async fn social_share(
        &self,
        session_id: &SessionId,
        platform: &str,
        shared_url: &str,
    ) -> Result<Value> {
        self.http
            .post(
                &format!("/v2/sessions/{session_id}/social-share"),
                Some(json!({
                    "metadata": {"platform": platform, "shared_url": shared_url},
                })),
                true,
            )
            .await
    }

    /// Upload a file as an attachment. Multipart form upload.
    pub async fn upload_attachment(&self, file_path: &Path) -> Result<Value> {
        self.http.upload("/v2/attachments", file_path).await
    }

    /// Delete an attachment.
    pub async fn delete_attachment(&self, attachment_id: &str) -> Result<()> {
        let _ = self
            .http
            .delete(&format!("/v2/attachments/{attachment_id}"))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStateApi for SessionsApi {
    async fn session_state(&self, session_id: &SessionId) -> Result<Option<String>> {
        match self.get(session_id).await {
            Ok(info) => Ok(Some(info.state)),
            Err(err) => Err(PineError::StateLookup {
                message: err.to_string(),
            }),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| PineError::Api {
        code: "decode_error".to_owned(),
        message: format!("unexpected response shape: {e}"),
    })
}
