//! Scenario replay for the purchasing engine.
//!
//! Stands in for the persistence and presentation collaborators: commands
//! are read from a JSON scenario, dispatched against a purchase order with
//! optimistic concurrency, and the resulting events are wrapped in stream
//! envelopes for output.

pub mod config;
pub mod replay;

pub use config::ReplayConfig;
pub use replay::{Replay, ReplayError, ReplaySummary, Scenario, Step, StepCommand, run, run_with};
