//! RiskPilot Core — risk-managed position lifecycle engine.
//!
//! This crate is synchronous and side-effect free apart from `tracing` output:
//! - Validated, immutable strategy configuration
//! - Domain types (snapshots, scoring, positions, legs, orders, fills, events)
//! - Position sizing with per-leg decay and volatility reduction
//! - Pyramiding triggers and safety vetoes
//! - Stop state machine with edge-based and trailing modes
//! - Multi-level profit taking
//! - Lifecycle controller tying the above into one tick per position

pub mod config;
pub mod domain;
pub mod lifecycle;
pub mod profit;
pub mod pyramid;
pub mod sizers;
pub mod stops;

pub use config::{ConfigError, StrategyConfig};
pub use lifecycle::{LifecycleController, TickContext, TickOutcome};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything a worker task owns or shares is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<config::StrategyConfig>();
        require_sync::<config::StrategyConfig>();

        require_send::<domain::IndicatorSnapshot>();
        require_sync::<domain::IndicatorSnapshot>();
        require_send::<domain::ScoringResult>();
        require_sync::<domain::ScoringResult>();
        require_send::<domain::TradeHistory>();
        require_sync::<domain::TradeHistory>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::OrderInstruction>();
        require_sync::<domain::OrderInstruction>();
        require_send::<domain::FillReport>();
        require_sync::<domain::FillReport>();
        require_send::<domain::PositionEvent>();
        require_sync::<domain::PositionEvent>();

        require_send::<stops::StopState>();
        require_sync::<stops::StopState>();
        require_send::<profit::ProfitPlan>();
        require_sync::<profit::ProfitPlan>();

        require_send::<lifecycle::LifecycleController>();
        require_sync::<lifecycle::LifecycleController>();
        require_send::<lifecycle::TickOutcome>();
        require_sync::<lifecycle::TickOutcome>();
        require_send::<lifecycle::FillError>();
        require_sync::<lifecycle::FillError>();
    }

    #[test]
    fn default_config_drives_a_controller() {
        let controller = LifecycleController::new(std::sync::Arc::new(StrategyConfig::default()));
        assert_eq!(controller.config().pyramiding.max_legs(), 4);
    }
}
