//! Domain events and their stream envelope.

pub mod envelope;
pub mod event;

pub use envelope::EventEnvelope;
pub use event::Event;
