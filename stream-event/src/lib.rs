//! Stream event protocol for the `Run` streaming response: type +
//! payload + envelope.
//!
//! This crate defines the wire shape of a single stream event and envelope
//! injection. It does not depend on `loom`; `serve` maps `loom::agent::Progress`
//! and `loom::agent::FinalMessage` into `ProtocolEvent` and calls `to_json`.

pub mod envelope;
pub mod event;

pub use envelope::{to_json, Envelope, EnvelopeState};
pub use event::ProtocolEvent;
