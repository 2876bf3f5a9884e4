//! The wire envelope: metadata, event type, and session payload.
//!
//! Every event on the channel, in both directions, is wrapped in this
//! envelope. Outbound envelopes are built with [`Envelope::build`]; inbound
//! raw values are validated with [`Envelope::parse`], which returns `None`
//! on malformed input so callers can drop backend noise without failing.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{DeviceId, EventId, MessageId, RequestId, SessionId, UserId};

/// Identity of the party that emitted an envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventSource {
    /// `user`, `agent`, or `system`.
    pub role: String,
    /// The emitting user, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// The emitting device, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
}

impl EventSource {
    /// Whether this envelope came from the user side (including echoes of
    /// our own sends).
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == "user"
    }
}

/// Envelope metadata: identity, correlation, and timing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    /// Unique per-envelope identifier.
    pub event_id: EventId,
    /// Correlation id threading a request/response pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    /// Wall-clock UTC timestamp, RFC 3339.
    pub timestamp: String,
    /// Who emitted the envelope.
    pub source: EventSource,
    /// Volatile events may be dropped by the backend under load.
    #[serde(default)]
    pub is_volatile: bool,
}

/// The session-scoped payload of an envelope.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventPayload {
    /// Session the event belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Message the event belongs to, if message-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    /// Message being quoted/replied to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_message_id: Option<MessageId>,
    /// Payload type, mirroring the envelope event type.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub payload_type: Option<String>,
    /// Opaque event data. Shape varies by event type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A complete wire envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    /// Identity, correlation, and timing metadata.
    pub metadata: EnvelopeMetadata,
    /// Event type string (e.g. `session:message`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Session-scoped payload.
    pub payload: EventPayload,
}

/// Inputs for building an outbound envelope.
#[derive(Debug, Default)]
pub struct EnvelopeParams {
    /// Target session.
    pub session_id: Option<SessionId>,
    /// Target message (for responses to a specific message).
    pub message_id: Option<MessageId>,
    /// Message being quoted/replied to.
    pub quoted_message_id: Option<MessageId>,
    /// Correlation id; a fresh one is generated when absent.
    pub request_id: Option<RequestId>,
    /// Event data.
    pub data: Option<Value>,
    /// Mark the envelope as volatile.
    pub is_volatile: bool,
}

impl Envelope {
    /// Build an outbound envelope.
    ///
    /// Stamps a fresh [`EventId`], the current UTC time, and, when no
    /// correlation id is supplied, a fresh [`RequestId`]. The request id
    /// is generated even for non-request sends so every envelope can be
    /// traced end to end.
    #[must_use]
    pub fn build(
        event_type: &str,
        user_id: &UserId,
        device_id: &DeviceId,
        params: EnvelopeParams,
    ) -> Self {
        Self {
            metadata: EnvelopeMetadata {
                event_id: EventId::new(),
                request_id: Some(params.request_id.unwrap_or_default()),
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                source: EventSource {
                    role: "user".to_owned(),
                    user_id: Some(user_id.clone()),
                    device_id: Some(device_id.clone()),
                },
                is_volatile: params.is_volatile,
            },
            event_type: event_type.to_owned(),
            payload: EventPayload {
                session_id: params.session_id,
                message_id: params.message_id,
                quoted_message_id: params.quoted_message_id,
                payload_type: Some(event_type.to_owned()),
                data: params.data,
            },
        }
    }

    /// Validate an inbound raw value against the envelope shape.
    ///
    /// Returns `None` on malformation. Callers drop the event; a parse
    /// failure must never take down the stream.
    #[must_use]
    pub fn parse(raw: &Value) -> Option<Self> {
        serde_json::from_value(raw.clone()).ok()
    }

    /// Serialize to the raw JSON value sent on the channel.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
