//! Typed payloads for structured one-shot events.
//!
//! These mirror the backend's JSON shapes. Every struct tolerates unknown
//! fields and missing optionals, because the backend adds fields freely
//! and the client must keep working.
//!
//! The engine itself only reads [`TextPartData`], [`WorkLogPartData`], and
//! [`StateData`]; the rest are conveniences for callers decoding the
//! `data` value of finished events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Engine-read payloads ─────────────────────────────────────────────

/// `session:text_part` data: one text fragment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TextPartData {
    /// Fragment content. May be empty.
    #[serde(default)]
    pub content: String,
    /// True on the terminating fragment of a message.
    #[serde(default, rename = "final")]
    pub is_final: bool,
}

/// `session:work_log_part` data: one work-log delta.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorkLogPartData {
    /// Step the delta belongs to.
    #[serde(default)]
    pub step_id: String,
    /// Appended text, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_delta: Option<String>,
    /// Structured delta, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_delta: Option<Value>,
    /// New step status, if it changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// `session:state` / `session:input_state` data: a bare state string.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StateData {
    /// The state value (e.g. `waiting_input`, `task_finished`).
    #[serde(default)]
    pub content: String,
}

// ── Forms and locations ──────────────────────────────────────────────

/// One field of a form the agent asks the user to fill.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FormField {
    /// Field name, the key used in the response.
    #[serde(default)]
    pub name: String,
    /// Field input type (`text`, `select`, ...).
    #[serde(default)]
    pub r#type: String,
    /// Display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Placeholder text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// Whether the field must be filled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_required: Option<bool>,
    /// Prefilled value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefilled: Option<String>,
    /// Options for select-style fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

/// A form definition plus submission state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FormData {
    /// The form's fields.
    #[serde(default)]
    pub fields: Vec<FormField>,
    /// Submitted key/value content, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    /// Whether the form was already submitted.
    #[serde(default)]
    pub is_submitted: bool,
}

/// `session:form_to_user` / `session:ask_for_location` data.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FormToUserData {
    /// Message shown alongside the form.
    #[serde(default)]
    pub message_to_user: String,
    /// The form itself.
    #[serde(default)]
    pub form: FormData,
}

/// `session:location_selection` data.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LocationSelectionData {
    /// Message shown alongside the selection.
    #[serde(default)]
    pub message_to_user: String,
    /// Candidate places.
    #[serde(default, rename = "list")]
    pub locations: Vec<Value>,
    /// Already-selected places.
    #[serde(default)]
    pub selected: Vec<Value>,
    /// Maximum number of selections.
    #[serde(default)]
    pub limit: u32,
}

// ── Tasks and work log ───────────────────────────────────────────────

/// `session:task_ready` data.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskReadyData {
    /// Credits required to start.
    #[serde(default)]
    pub required: i64,
    /// Suggested credit amount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested: Option<i64>,
    /// Whether the user already confirmed.
    #[serde(default)]
    pub confirmed: bool,
}

/// One step of the agent's work log.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorkLogStep {
    /// Step identifier.
    #[serde(default)]
    pub id: String,
    /// Step kind.
    #[serde(default)]
    pub step_type: String,
    /// Human-readable title.
    #[serde(default)]
    pub step_title: String,
    /// Details text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_details: Option<String>,
    /// Step status.
    #[serde(default)]
    pub status: String,
    /// Start time, epoch millis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    /// Step-specific structured data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// `session:work_log` data: a full snapshot.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorkLogData {
    /// All steps, in order.
    #[serde(default)]
    pub steps: Vec<WorkLogStep>,
}

/// Completion summary attached to a finished task.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskCompletionSummary {
    /// Minutes of user time saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_saved_minutes: Option<i64>,
    /// Phone calls made by the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calls_made: Option<i64>,
    /// Emails sent by the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emails_sent: Option<i64>,
    /// Money saved, in `money_saved_currency`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub money_saved: Option<f64>,
    /// Currency of `money_saved`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub money_saved_currency: Option<String>,
    /// Credits spent on the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits_invested: Option<i64>,
}

/// Result block of a finished task.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskCompletion {
    /// Result headline.
    #[serde(default)]
    pub result_title: String,
    /// Result details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_description: Option<String>,
    /// Aggregate summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<TaskCompletionSummary>,
    /// Suggested share text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_text: Option<String>,
}

/// `session:task_finished` data.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskFinishedData {
    /// Final task status.
    #[serde(default)]
    pub status: String,
    /// Completion details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<TaskCompletion>,
}

/// `session:interactive_auth_confirmation` data (S2C).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InteractiveAuthData {
    /// Identifier to echo back in the confirmation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_id: Option<String>,
    /// Message shown to the user.
    #[serde(default)]
    pub message_to_user: String,
    /// Accepted verification methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_types: Option<Vec<String>>,
    /// When the confirmation expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// `session:three_way_call` data.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ThreeWayCallData {
    /// Call title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Call description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Caller ID number to expect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_id_number: Option<String>,
}

// ── Payments ─────────────────────────────────────────────────────────

/// `session:reward` data: a service-fee proposal.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RewardData {
    /// Payment identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    /// Message shown to the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Charge model (`percentage`, `fixed`).
    #[serde(default)]
    pub charge_type: String,
    /// Currency code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency_code: Option<String>,
    /// Estimated savings in the bill currency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_savings: Option<f64>,
    /// Proposed percentage charge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge_percentage: Option<f64>,
    /// Proposed fixed charge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_charge_amount: Option<f64>,
    /// Proposal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// `session:payment` data: a payment status update.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PaymentData {
    /// Payment identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    /// Message shown to the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Charge model.
    #[serde(default)]
    pub charge_type: String,
    /// Actual savings achieved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_savings: Option<f64>,
    /// Amount actually charged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_payment_amount: Option<f64>,
    /// Payment status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Cancellation reason, if cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
}
