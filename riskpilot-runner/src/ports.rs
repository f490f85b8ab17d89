//! Async ports to the outside world.
//!
//! The lifecycle core is synchronous and pure; everything that waits on a
//! network or a broker sits behind one of these traits. Workers and the
//! scheduler hold them as `Arc<dyn ...>` so a paper setup, an in-memory test
//! double and a live adapter are interchangeable.
//!
//! Responsibilities:
//! - Fetch the latest indicator snapshot per ticker
//! - List entry candidates from the external scoring filter
//! - Look up trade history for edge-stop eligibility
//! - Submit orders and report portfolio equity
//!
//! Non-Responsibilities:
//! - Deciding what to trade (lifecycle core)
//! - Timeouts and retries (worker)

use std::sync::Arc;

use async_trait::async_trait;
use riskpilot_core::domain::{
    FillReport, IndicatorSnapshot, OrderInstruction, ScoringResult, TradeHistory,
};
use thiserror::Error;

/// Failure of a data source.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    #[error("no data for '{0}'")]
    NotFound(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Failure to get an order filled.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn latest(&self, ticker: &str) -> Result<IndicatorSnapshot, ProviderError>;
}

/// External entry-eligibility filter.
#[async_trait]
pub trait ScoringGate: Send + Sync {
    /// Current candidates. Results for tickers already held are ignored.
    async fn candidates(&self) -> Result<Vec<ScoringResult>, ProviderError>;
}

#[async_trait]
pub trait TradeHistorySource: Send + Sync {
    /// `Ok(None)` means no history is recorded, which is not an error.
    async fn history(&self, ticker: &str) -> Result<Option<TradeHistory>, ProviderError>;
}

/// Order execution.
///
/// `submit` resolves once the order is filled (fully or partially) or
/// rejected. Market orders only.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    async fn submit(&self, order: &OrderInstruction) -> Result<FillReport, ExecutionError>;

    async fn portfolio_equity(&self) -> Result<f64, ExecutionError>;
}

/// The set of ports one runtime is wired to.
#[derive(Clone)]
pub struct Ports {
    pub snapshots: Arc<dyn SnapshotProvider>,
    pub scoring: Arc<dyn ScoringGate>,
    pub history: Arc<dyn TradeHistorySource>,
    pub gateway: Arc<dyn ExecutionGateway>,
}
