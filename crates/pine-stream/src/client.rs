//! The `PineClient` facade.
//!
//! Ties the engine together for callers: correlated session membership
//! and history, fire-and-forget message and response sends, and turn
//! construction. The client owns no transport state beyond the shared
//! channel handle; everything here is safe to call concurrently.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::debug;

use pine_core::{
    ClientEvent, DeviceId, Envelope, EnvelopeParams, MessageId, Result, SessionId, UserId,
};

use crate::channel::EventChannel;
use crate::correlator::Correlator;
use crate::turn::{SessionStateApi, Turn, TurnOptions};

/// Default wait for correlated requests (join, history).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Options for [`PineClient::chat`].
#[derive(Clone, Debug, Default)]
pub struct ChatOptions {
    /// Message being quoted/replied to.
    pub quoted_message_id: Option<MessageId>,
    /// Previously uploaded attachments to reference.
    pub attachments: Vec<Value>,
    /// Other sessions the message refers to.
    pub referenced_sessions: Vec<SessionId>,
    /// Turn tunables.
    pub turn: TurnOptions,
}

/// High-level Pine conversation client.
pub struct PineClient {
    channel: Arc<dyn EventChannel>,
    correlator: Correlator,
    user_id: UserId,
    device_id: DeviceId,
    state_api: Option<Arc<dyn SessionStateApi>>,
    request_timeout: Duration,
}

impl PineClient {
    /// Create a client over an established channel.
    #[must_use]
    pub fn new(channel: Arc<dyn EventChannel>, user_id: UserId, device_id: DeviceId) -> Self {
        let correlator =
            Correlator::new(Arc::clone(&channel), user_id.clone(), device_id.clone());
        Self {
            channel,
            correlator,
            user_id,
            device_id,
            state_api: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Attach the authoritative state lookup used for idle reconciliation.
    #[must_use]
    pub fn with_state_api(mut self, state_api: Arc<dyn SessionStateApi>) -> Self {
        self.state_api = Some(state_api);
        self
    }

    /// Override the correlated-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Join a session room. Resolves with the backend's join reply data.
    pub async fn join_session(&self, session_id: &SessionId) -> Result<Value> {
        self.correlator
            .request(
                ClientEvent::SessionJoin,
                None,
                Some(session_id),
                self.request_timeout,
            )
            .await
    }

    /// Leave a session room. Fire-and-forget.
    pub async fn leave_session(&self, session_id: &SessionId) -> Result<()> {
        self.send_raw(
            ClientEvent::SessionLeave,
            EnvelopeParams {
                session_id: Some(session_id.clone()),
                ..Default::default()
            },
        )
        .await
    }

    /// Fetch up to `max_messages` of session history.
    pub async fn history(&self, session_id: &SessionId, max_messages: u32) -> Result<Value> {
        self.correlator
            .request(
                ClientEvent::SessionHistory,
                Some(json!({ "max_messages": max_messages })),
                Some(session_id),
                self.request_timeout,
            )
            .await
    }

    /// Send a user message without waiting for any reply. Returns the
    /// stamped message id.
    pub async fn send_message(
        &self,
        session_id: &SessionId,
        content: &str,
        quoted_message_id: Option<&MessageId>,
    ) -> Result<MessageId> {
        let options = ChatOptions {
            quoted_message_id: quoted_message_id.cloned(),
            ..Default::default()
        };
        self.send_user_message(session_id, content, &options).await
    }

    /// Send a message and collect the agent's turn.
    ///
    /// The turn subscribes before the message goes out, so no reply event
    /// can slip between send and subscribe.
    pub async fn chat(
        &self,
        session_id: &SessionId,
        content: &str,
        options: ChatOptions,
    ) -> Result<Turn> {
        let turn = self.listen(session_id, options.turn).await;
        let message_id = self.send_user_message(session_id, content, &options).await?;
        debug!(session_id = %session_id, message_id = %message_id, "chat turn started");
        Ok(turn)
    }

    async fn send_user_message(
        &self,
        session_id: &SessionId,
        content: &str,
        options: &ChatOptions,
    ) -> Result<MessageId> {
        let message_id = MessageId::new();
        self.send_raw(
            ClientEvent::SessionMessage,
            EnvelopeParams {
                session_id: Some(session_id.clone()),
                message_id: Some(message_id.clone()),
                quoted_message_id: options.quoted_message_id.clone(),
                data: Some(json!({
                    "content": content,
                    "attachments": options.attachments,
                    "referenced_sessions": options.referenced_sessions,
                    "client_now_date": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                })),
                ..Default::default()
            },
        )
        .await?;
        Ok(message_id)
    }

    /// Collect a turn without sending anything, e.g. to observe a task
    /// already in flight.
    pub async fn listen(&self, session_id: &SessionId, options: TurnOptions) -> Turn {
        Turn::begin(
            &self.channel,
            session_id.clone(),
            self.state_api.clone(),
            options,
        )
        .await
    }

    /// Submit a response to a `session:form_to_user` request. The backend
    /// reads `data.content` as the form's key/value pairs.
    pub async fn send_form_response(
        &self,
        session_id: &SessionId,
        message_id: &MessageId,
        form: Value,
    ) -> Result<()> {
        self.send_to_message(
            ClientEvent::SessionFormToUser,
            session_id,
            message_id,
            json!({ "content": form }),
        )
        .await
    }

    /// Confirm or decline an interactive auth request.
    pub async fn send_auth_confirmation(
        &self,
        session_id: &SessionId,
        message_id: &MessageId,
        confirmation: Value,
    ) -> Result<()> {
        self.send_to_message(
            ClientEvent::SessionInteractiveAuthConfirmation,
            session_id,
            message_id,
            json!({ "content": confirmation }),
        )
        .await
    }

    /// Answer a `session:ask_for_location` request with coordinates.
    pub async fn send_location_response(
        &self,
        session_id: &SessionId,
        message_id: &MessageId,
        latitude: &str,
        longitude: &str,
    ) -> Result<()> {
        self.send_to_message(
            ClientEvent::SessionAskForLocation,
            session_id,
            message_id,
            json!({ "content": { "latitude": latitude, "longitude": longitude } }),
        )
        .await
    }

    /// Answer a `session:location_selection` request with the chosen
    /// places. The backend reads `data.list`.
    pub async fn send_location_selection(
        &self,
        session_id: &SessionId,
        message_id: &MessageId,
        places: Vec<Value>,
    ) -> Result<()> {
        self.send_to_message(
            ClientEvent::SessionLocationSelection,
            session_id,
            message_id,
            json!({ "list": places }),
        )
        .await
    }

    async fn send_to_message(
        &self,
        event: ClientEvent,
        session_id: &SessionId,
        message_id: &MessageId,
        data: Value,
    ) -> Result<()> {
        self.send_raw(
            event,
            EnvelopeParams {
                session_id: Some(session_id.clone()),
                message_id: Some(message_id.clone()),
                data: Some(data),
                ..Default::default()
            },
        )
        .await
    }

    async fn send_raw(&self, event: ClientEvent, params: EnvelopeParams) -> Result<()> {
        let wire_type = event.as_wire();
        let envelope = Envelope::build(wire_type, &self.user_id, &self.device_id, params);
        self.channel.send(wire_type, envelope.to_value()).await
    }
}
