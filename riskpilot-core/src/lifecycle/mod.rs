//! Lifecycle orchestration: entry planning and per-tick position management.

pub mod controller;
pub mod entry;

pub use controller::{FillError, LifecycleController, TickContext, TickOutcome};
pub use entry::{BookState, EntryPlanner, EntryRejection};
