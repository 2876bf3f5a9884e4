//! Branded ID newtypes for type safety.
//!
//! Every identifier threaded through the Pine wire protocol has a distinct
//! type implemented as a newtype wrapper around `String`. This prevents
//! accidentally passing a message ID where a session ID is expected.
//!
//! Locally generated IDs are UUID v7 (time-ordered) via
//! [`uuid::Uuid::now_v7`]. Backend-issued IDs are wrapped as-is.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generate a new UUID v7 string (time-ordered).
fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7())
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Unique identifier stamped on every outbound envelope.
    EventId
}

branded_id! {
    /// Correlation identifier threaded through a request/response pair.
    RequestId
}

branded_id! {
    /// Unique identifier for a conversation session.
    SessionId
}

branded_id! {
    /// Unique identifier for a message within a session.
    MessageId
}

branded_id! {
    /// Unique identifier for a work-log step.
    StepId
}

branded_id! {
    /// Unique identifier for the authenticated user.
    UserId
}

branded_id! {
    /// Stable identifier for the client device.
    DeviceId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        let a = EventId::new();
        let b = EventId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn ids_are_v7_parseable() {
        let id = RequestId::new();
        let parsed = Uuid::parse_str(id.as_str()).unwrap();
        assert_eq!(parsed.get_version_num(), 7);
    }

    #[test]
    fn from_str_preserves_value() {
        let id = SessionId::from("sess_123");
        assert_eq!(id.as_str(), "sess_123");
        assert_eq!(String::from(id), "sess_123");
    }

    #[test]
    fn serde_is_transparent() {
        let id = MessageId::from("msg_1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"msg_1\"");
        let back: MessageId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn display_matches_inner() {
        let id = StepId::from("step_9");
        assert_eq!(id.to_string(), "step_9");
    }
}
