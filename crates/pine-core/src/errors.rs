//! Error hierarchy for the Pine client engine.
//!
//! [`PineError`] covers the failure modes the engine surfaces to callers.
//! Malformed inbound envelopes are deliberately *not* represented here:
//! parsing returns `Option` and the event is dropped, because backend noise
//! must never tear down a long-lived stream.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the Pine client engine.
#[derive(Debug, Error)]
pub enum PineError {
    /// Transport failure: not connected, or the underlying send failed.
    /// Fatal to the current operation; the core never auto-retries.
    #[error("channel error: {message}")]
    Channel {
        /// Describes the transport failure.
        message: String,
    },

    /// A correlated wait or the connect-readiness wait expired.
    #[error("timeout waiting for {event_type} after {waited:?}")]
    Timeout {
        /// The event type the wait was registered for.
        event_type: String,
        /// How long the caller waited.
        waited: Duration,
    },

    /// The authoritative-state collaborator failed during a lookup.
    ///
    /// Idle reconciliation swallows this variant; it only reaches callers
    /// through direct API use.
    #[error("state lookup failed: {message}")]
    StateLookup {
        /// Describes the lookup failure.
        message: String,
    },

    /// REST collaborator error (auth, sessions, attachments).
    #[error("api error [{code}]: {message}")]
    Api {
        /// Machine-readable error code (e.g. `http_error`).
        code: String,
        /// Human-readable message.
        message: String,
    },
}

impl PineError {
    /// Build a [`PineError::Channel`] from any message.
    #[must_use]
    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
        }
    }

    /// Build a [`PineError::Timeout`] naming the awaited event type.
    #[must_use]
    pub fn timeout(event_type: impl Into<String>, waited: Duration) -> Self {
        Self::Timeout {
            event_type: event_type.into(),
            waited,
        }
    }
}

/// Convenience alias for results in the Pine client engine.
pub type Result<T> = std::result::Result<T, PineError>;
