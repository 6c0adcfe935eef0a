//! Wire-level streaming event protocol: type + payload + envelope.
//!
//! This crate defines the wire shape of one engine event and envelope
//! injection. It does not depend on `mote`; `mote`'s orchestrators emit
//! internal events that the SSE writer and WebSocket hub convert to
//! [`ProtocolEvent`] and serialize via [`to_json`].

pub mod envelope;
pub mod event;

pub use envelope::{to_json, Envelope, EnvelopeState};
pub use event::ProtocolEvent;
