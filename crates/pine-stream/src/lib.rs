//! # pine-stream
//!
//! The Pine client engine: turns the backend's multiplexed event stream
//! into a clean, ordered sequence of complete application events.
//!
//! Subsystems:
//!
//! - **Channel** ([`channel`]): the abstract bidirectional event transport
//!   plus the handler fan-out registry transports are built on
//! - **Correlator** ([`correlator`]): request/response emulation with
//!   timeouts over the fire-and-forget channel
//! - **Reassembler** ([`reassembler`]): tiered buffering. Text fragments
//!   are reassembled on their final flag, work-log deltas debounced over
//!   3 s silence periods, and everything else passed through
//! - **Turn** ([`turn`]): termination detection and idle-timeout
//!   reconciliation around a per-turn event queue
//! - **Client** ([`client`]): the `PineClient` facade callers use

#![deny(unsafe_code)]

pub mod channel;
pub mod client;
pub mod correlator;
pub mod reassembler;
pub mod turn;

pub use channel::{EventChannel, EventHandler, HandlerRegistry, SubscriptionGuard};
pub use client::{ChatOptions, PineClient};
pub use correlator::Correlator;
pub use reassembler::ChatEvent;
pub use turn::{SessionStateApi, Turn, TurnOptions};
