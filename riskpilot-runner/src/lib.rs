//! RiskPilot Runner — async runtime around the lifecycle core.
//!
//! This crate builds on `riskpilot-core` to provide:
//! - Async ports for snapshots, scoring, trade history and execution
//! - A paper execution gateway and in-memory data sources
//! - One worker task per open position, fed by a fixed-cadence scheduler
//! - Config hot-swap over a watch channel
//! - An event journal with CSV and JSON export
//! - Tracing subscriber setup for binaries

pub mod journal;
pub mod memory;
pub mod paper;
pub mod ports;
pub mod scheduler;
pub mod telemetry;
pub mod worker;

pub use journal::{EventJournal, JournalError, SharedJournal};
pub use memory::{InMemoryHistory, InMemoryScoring, InMemorySnapshots};
pub use paper::{PaperConfig, PaperGateway, DEFAULT_TAKER_FEE_RATE};
pub use ports::{
    ExecutionError, ExecutionGateway, Ports, ProviderError, ScoringGate, SnapshotProvider,
    TradeHistorySource,
};
pub use scheduler::{CycleReport, RunnerError, Scheduler};
pub use worker::{Command, PositionWorker, TickReport, WorkerHandle};
