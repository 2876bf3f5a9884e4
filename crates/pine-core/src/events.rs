//! Wire event types and delivery-tier classification.
//!
//! [`ClientEvent`] and [`ServerEvent`] enumerate the `session:*` event
//! strings the Pine backend speaks. The string values must match the
//! backend exactly; the web and mobile clients depend on them.
//!
//! [`ServerEvent`] is a closed enumeration with an [`ServerEvent::Other`]
//! catch-all so event types this client does not know yet still flow
//! through: unknown types classify as [`DeliveryTier::Immediate`] and are
//! passed to the caller unchanged.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Content value of a `session:input_state` event that marks the session
/// as idle and waiting for the user.
pub const WAITING_INPUT: &str = "waiting_input";

/// Events emitted by this client (C2S).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClientEvent {
    /// Join a session room. Correlated request.
    SessionJoin,
    /// Leave a session room. Fire-and-forget.
    SessionLeave,
    /// Send a user message into the session.
    SessionMessage,
    /// Request message history. Correlated request.
    SessionHistory,
    /// Submit a form response.
    SessionFormToUser,
    /// Submit an interactive auth confirmation (OTP etc).
    SessionInteractiveAuthConfirmation,
    /// Submit a location response.
    SessionAskForLocation,
    /// Submit a location selection.
    SessionLocationSelection,
}

impl ClientEvent {
    /// The wire string for this event.
    #[must_use]
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::SessionJoin => "session:join",
            Self::SessionLeave => "session:leave",
            Self::SessionMessage => "session:message",
            Self::SessionHistory => "session:history",
            Self::SessionFormToUser => "session:form_to_user",
            Self::SessionInteractiveAuthConfirmation => "session:interactive_auth_confirmation",
            Self::SessionAskForLocation => "session:ask_for_location",
            Self::SessionLocationSelection => "session:location_selection",
        }
    }
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Events delivered by the backend (S2C).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ServerEvent {
    /// Complete assistant text (also the reassembled output of text parts).
    SessionText,
    /// Incremental text fragment. Never reaches callers directly.
    SessionTextPart,
    /// Session lifecycle state change.
    SessionState,
    /// Input-state change (`waiting_input` when idle).
    SessionInputState,
    /// Rich content block (markdown, media).
    SessionRichContent,
    /// Form the agent wants the user to fill in.
    SessionFormToUser,
    /// Agent asks for the user's location.
    SessionAskForLocation,
    /// Agent offers a location selection.
    SessionLocationSelection,
    /// Reward / service-fee proposal.
    SessionReward,
    /// Payment status update.
    SessionPayment,
    /// Task is ready to start.
    SessionTaskReady,
    /// Task finished with a completion summary.
    SessionTaskFinished,
    /// Interactive auth confirmation request.
    SessionInteractiveAuthConfirmation,
    /// Three-way call invitation.
    SessionThreeWayCall,
    /// Backend-reported error event.
    SessionError,
    /// Agent thinking/progress indicator.
    SessionThinking,
    /// Full work-log snapshot.
    SessionWorkLog,
    /// Incremental work-log fragment. Debounced before reaching callers.
    SessionWorkLogPart,
    /// Session title update.
    SessionUpdateTitle,
    /// Per-message delivery status.
    SessionMessageStatus,
    /// Card content block.
    SessionCard,
    /// Suggested follow-up tasks.
    SessionNextTasks,
    /// Prompt to continue in a new task.
    SessionContinueInNewTask,
    /// Social sharing prompt.
    SessionSocialSharing,
    /// Retry prompt.
    SessionRetry,
    /// Debug payload.
    SessionDebug,
    /// Action status update.
    SessionActionStatus,
    /// Computer-use intervention request.
    SessionComputerUseIntervention,
    /// Any event type this client does not know. Passed through unchanged.
    Other(String),
}

/// All known server event variants, for exhaustive testing.
pub const ALL_SERVER_EVENTS: &[ServerEvent] = &[
    ServerEvent::SessionText,
    ServerEvent::SessionTextPart,
    ServerEvent::SessionState,
    ServerEvent::SessionInputState,
    ServerEvent::SessionRichContent,
    ServerEvent::SessionFormToUser,
    ServerEvent::SessionAskForLocation,
    ServerEvent::SessionLocationSelection,
    ServerEvent::SessionReward,
    ServerEvent::SessionPayment,
    ServerEvent::SessionTaskReady,
    ServerEvent::SessionTaskFinished,
    ServerEvent::SessionInteractiveAuthConfirmation,
    ServerEvent::SessionThreeWayCall,
    ServerEvent::SessionError,
    ServerEvent::SessionThinking,
    ServerEvent::SessionWorkLog,
    ServerEvent::SessionWorkLogPart,
    ServerEvent::SessionUpdateTitle,
    ServerEvent::SessionMessageStatus,
    ServerEvent::SessionCard,
    ServerEvent::SessionNextTasks,
    ServerEvent::SessionContinueInNewTask,
    ServerEvent::SessionSocialSharing,
    ServerEvent::SessionRetry,
    ServerEvent::SessionDebug,
    ServerEvent::SessionActionStatus,
    ServerEvent::SessionComputerUseIntervention,
];

impl ServerEvent {
    /// Parse a wire string. Unknown strings become [`ServerEvent::Other`].
    #[must_use]
    pub fn from_wire(s: &str) -> Self {
        match s {
            "session:text" => Self::SessionText,
            "session:text_part" => Self::SessionTextPart,
            "session:state" => Self::SessionState,
            "session:input_state" => Self::SessionInputState,
            "session:rich_content" => Self::SessionRichContent,
            "session:form_to_user" => Self::SessionFormToUser,
            "session:ask_for_location" => Self::SessionAskForLocation,
            "session:location_selection" => Self::SessionLocationSelection,
            "session:reward" => Self::SessionReward,
            "session:payment" => Self::SessionPayment,
            "session:task_ready" => Self::SessionTaskReady,
            "session:task_finished" => Self::SessionTaskFinished,
            "session:interactive_auth_confirmation" => Self::SessionInteractiveAuthConfirmation,
            "session:three_way_call" => Self::SessionThreeWayCall,
            "session:error" => Self::SessionError,
            "session:thinking" => Self::SessionThinking,
            "session:work_log" => Self::SessionWorkLog,
            "session:work_log_part" => Self::SessionWorkLogPart,
            "session:update_title" => Self::SessionUpdateTitle,
            "session:message_status" => Self::SessionMessageStatus,
            "session:card" => Self::SessionCard,
            "session:next_tasks" => Self::SessionNextTasks,
            "session:continue_in_new_task" => Self::SessionContinueInNewTask,
            "session:social_sharing" => Self::SessionSocialSharing,
            "session:retry" => Self::SessionRetry,
            "session:debug" => Self::SessionDebug,
            "session:action_status" => Self::SessionActionStatus,
            "session:computer_use_intervention" => Self::SessionComputerUseIntervention,
            other => Self::Other(other.to_owned()),
        }
    }

    /// The wire string for this event.
    #[must_use]
    pub fn as_wire(&self) -> &str {
        match self {
            Self::SessionText => "session:text",
            Self::SessionTextPart => "session:text_part",
            Self::SessionState => "session:state",
            Self::SessionInputState => "session:input_state",
            Self::SessionRichContent => "session:rich_content",
            Self::SessionFormToUser => "session:form_to_user",
            Self::SessionAskForLocation => "session:ask_for_location",
            Self::SessionLocationSelection => "session:location_selection",
            Self::SessionReward => "session:reward",
            Self::SessionPayment => "session:payment",
            Self::SessionTaskReady => "session:task_ready",
            Self::SessionTaskFinished => "session:task_finished",
            Self::SessionInteractiveAuthConfirmation => "session:interactive_auth_confirmation",
            Self::SessionThreeWayCall => "session:three_way_call",
            Self::SessionError => "session:error",
            Self::SessionThinking => "session:thinking",
            Self::SessionWorkLog => "session:work_log",
            Self::SessionWorkLogPart => "session:work_log_part",
            Self::SessionUpdateTitle => "session:update_title",
            Self::SessionMessageStatus => "session:message_status",
            Self::SessionCard => "session:card",
            Self::SessionNextTasks => "session:next_tasks",
            Self::SessionContinueInNewTask => "session:continue_in_new_task",
            Self::SessionSocialSharing => "session:social_sharing",
            Self::SessionRetry => "session:retry",
            Self::SessionDebug => "session:debug",
            Self::SessionActionStatus => "session:action_status",
            Self::SessionComputerUseIntervention => "session:computer_use_intervention",
            Self::Other(s) => s,
        }
    }

    /// Delivery tier for this event type.
    ///
    /// The classification table is closed over the two fragment types;
    /// every other type, known or unknown, passes through immediately.
    #[must_use]
    pub fn tier(&self) -> DeliveryTier {
        match self {
            Self::SessionTextPart => DeliveryTier::Reassemble,
            Self::SessionWorkLogPart => DeliveryTier::Debounce,
            _ => DeliveryTier::Immediate,
        }
    }

    /// Whether this event counts as substantive agent output for
    /// termination gating.
    ///
    /// An initial `waiting_input` reflects the session's default state;
    /// only after one of these has been seen does `waiting_input` mean
    /// the turn is over.
    #[must_use]
    pub fn is_substantive(&self) -> bool {
        matches!(
            self,
            Self::SessionText
                | Self::SessionFormToUser
                | Self::SessionAskForLocation
                | Self::SessionTaskReady
                | Self::SessionTaskFinished
                | Self::SessionInteractiveAuthConfirmation
                | Self::SessionThreeWayCall
                | Self::SessionReward
        )
    }
}

impl fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl Serialize for ServerEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for ServerEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&s))
    }
}

/// How an inbound event is handled before it reaches the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryTier {
    /// Fragment-with-terminator: buffered per message id, emitted once
    /// on the final fragment.
    Reassemble,
    /// Emitted as a finished event unchanged.
    Immediate,
    /// Accumulated per step id, emitted after a 3 s silence period.
    Debounce,
}

/// Terminal session states. A `session:state` event carrying one of
/// these ends the turn unconditionally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalState {
    /// The task completed.
    Finished,
    /// The task was cancelled.
    Cancelled,
    /// The session went stale.
    Stale,
}

impl TerminalState {
    /// Parse a `session:state` content string; `None` for non-terminal
    /// states.
    #[must_use]
    pub fn from_content(content: &str) -> Option<Self> {
        match content {
            "task_finished" => Some(Self::Finished),
            "task_cancelled" => Some(Self::Cancelled),
            "task_stale" => Some(Self::Stale),
            _ => None,
        }
    }

    /// The wire content string for this state.
    #[must_use]
    pub fn as_content(self) -> &'static str {
        match self {
            Self::Finished => "task_finished",
            Self::Cancelled => "task_cancelled",
            Self::Stale => "task_stale",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_server_events_count() {
        assert_eq!(ALL_SERVER_EVENTS.len(), 28);
    }

    #[test]
    fn server_event_wire_roundtrip() {
        for event in ALL_SERVER_EVENTS {
            let parsed = ServerEvent::from_wire(event.as_wire());
            assert_eq!(&parsed, event, "roundtrip failed for {event}");
        }
    }

    #[test]
    fn server_event_exact_strings() {
        assert_eq!(ServerEvent::SessionText.as_wire(), "session:text");
        assert_eq!(ServerEvent::SessionTextPart.as_wire(), "session:text_part");
        assert_eq!(
            ServerEvent::SessionWorkLogPart.as_wire(),
            "session:work_log_part"
        );
        assert_eq!(
            ServerEvent::SessionInputState.as_wire(),
            "session:input_state"
        );
        assert_eq!(
            ServerEvent::SessionComputerUseIntervention.as_wire(),
            "session:computer_use_intervention"
        );
    }

    #[test]
    fn client_event_exact_strings() {
        assert_eq!(ClientEvent::SessionJoin.as_wire(), "session:join");
        assert_eq!(ClientEvent::SessionMessage.as_wire(), "session:message");
        assert_eq!(ClientEvent::SessionHistory.as_wire(), "session:history");
    }

    #[test]
    fn unknown_event_is_other() {
        let event = ServerEvent::from_wire("notification:new_message");
        assert_eq!(
            event,
            ServerEvent::Other("notification:new_message".into())
        );
        assert_eq!(event.as_wire(), "notification:new_message");
    }

    #[test]
    fn tier_classification() {
        assert_eq!(
            ServerEvent::SessionTextPart.tier(),
            DeliveryTier::Reassemble
        );
        assert_eq!(
            ServerEvent::SessionWorkLogPart.tier(),
            DeliveryTier::Debounce
        );
        assert_eq!(ServerEvent::SessionText.tier(), DeliveryTier::Immediate);
        assert_eq!(ServerEvent::SessionState.tier(), DeliveryTier::Immediate);
    }

    #[test]
    fn unknown_events_default_to_immediate() {
        let event = ServerEvent::from_wire("session:brand_new_thing");
        assert_eq!(event.tier(), DeliveryTier::Immediate);
    }

    #[test]
    fn substantive_events() {
        assert!(ServerEvent::SessionText.is_substantive());
        assert!(ServerEvent::SessionFormToUser.is_substantive());
        assert!(ServerEvent::SessionReward.is_substantive());
        assert!(!ServerEvent::SessionThinking.is_substantive());
        assert!(!ServerEvent::SessionInputState.is_substantive());
        assert!(!ServerEvent::Other("x".into()).is_substantive());
    }

    #[test]
    fn terminal_state_parsing() {
        assert_eq!(
            TerminalState::from_content("task_finished"),
            Some(TerminalState::Finished)
        );
        assert_eq!(
            TerminalState::from_content("task_cancelled"),
            Some(TerminalState::Cancelled)
        );
        assert_eq!(
            TerminalState::from_content("task_stale"),
            Some(TerminalState::Stale)
        );
        assert_eq!(TerminalState::from_content("in_progress"), None);
        assert_eq!(TerminalState::from_content(WAITING_INPUT), None);
    }

    #[test]
    fn terminal_state_roundtrip() {
        for state in [
            TerminalState::Finished,
            TerminalState::Cancelled,
            TerminalState::Stale,
        ] {
            assert_eq!(TerminalState::from_content(state.as_content()), Some(state));
        }
    }

    #[test]
    fn server_event_serde() {
        let json = serde_json::to_string(&ServerEvent::SessionTextPart).unwrap();
        assert_eq!(json, "\"session:text_part\"");
        let back: ServerEvent = serde_json::from_str("\"session:unknown_kind\"").unwrap();
        assert_eq!(back, ServerEvent::Other("session:unknown_kind".into()));
    }
}
