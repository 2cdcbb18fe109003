//! Core types and polling logic for the kerbside waste collection watcher.

/// Polling coordinator and its refresh cadence rules.
pub mod coordinator;
/// Domain models for addresses, schedules, and snapshots.
pub mod model;
/// Traits describing the remote service interfaces.
pub mod ports;

pub use coordinator::*;
pub use model::*;
pub use ports::*;
