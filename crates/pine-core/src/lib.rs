//! # pine-core
//!
//! Foundation types for the Pine client engine.
//!
//! This crate provides the shared vocabulary the engine crates depend on:
//!
//! - **Branded IDs**: `EventId`, `RequestId`, `SessionId`, `MessageId` as
//!   newtypes for type safety
//! - **Wire events**: `ClientEvent` / `ServerEvent` enums matching the
//!   backend's `session:*` string values exactly, with delivery-tier
//!   classification
//! - **Envelope**: the metadata/type/payload wire envelope with build and
//!   parse operations
//! - **Payloads**: typed payload structs for structured one-shot events
//! - **Errors**: `PineError` hierarchy via `thiserror`

#![deny(unsafe_code)]

pub mod envelope;
pub mod errors;
pub mod events;
pub mod ids;
pub mod payloads;

pub use envelope::{Envelope, EnvelopeMetadata, EnvelopeParams, EventPayload, EventSource};
pub use errors::{PineError, Result};
pub use events::{ClientEvent, DeliveryTier, ServerEvent, TerminalState, WAITING_INPUT};
pub use ids::{DeviceId, EventId, MessageId, RequestId, SessionId, StepId, UserId};
