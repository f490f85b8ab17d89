//! Paper execution gateway.
//!
//! Fills every market order in full at its reference price and charges a
//! taker fee on the notional. Rejections can be forced (`reject_next`) or
//! drawn from a seeded RNG so failure paths are reproducible.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use riskpilot_core::domain::{FillReport, OrderInstruction};
use tokio::sync::Mutex;
use tracing::debug;

use crate::ports::{ExecutionError, ExecutionGateway};

/// Taker fee charged per fill, as a fraction of notional.
pub const DEFAULT_TAKER_FEE_RATE: f64 = 0.00139;

#[derive(Debug, Clone)]
pub struct PaperConfig {
    pub starting_equity: f64,
    pub taker_fee_rate: f64,
    /// Chance in [0, 1] that any submission is rejected.
    pub rejection_probability: f64,
    /// Simulated round-trip delay before the fill is reported.
    pub latency: Duration,
    pub seed: u64,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            starting_equity: 100_000.0,
            taker_fee_rate: DEFAULT_TAKER_FEE_RATE,
            rejection_probability: 0.0,
            latency: Duration::ZERO,
            seed: 42,
        }
    }
}

struct PaperState {
    rng: StdRng,
    equity: f64,
    forced_rejections: u32,
    submitted: Vec<OrderInstruction>,
}

pub struct PaperGateway {
    config: PaperConfig,
    state: Mutex<PaperState>,
}

impl PaperGateway {
    pub fn new(config: PaperConfig) -> Self {
        let state = PaperState {
            rng: StdRng::seed_from_u64(config.seed),
            equity: config.starting_equity,
            forced_rejections: 0,
            submitted: Vec::new(),
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    pub fn with_equity(equity: f64) -> Self {
        Self::new(PaperConfig {
            starting_equity: equity,
            ..PaperConfig::default()
        })
    }

    /// Reject the next `n` submissions regardless of the RNG.
    pub async fn reject_next(&self, n: u32) {
        self.state.lock().await.forced_rejections = n;
    }

    pub async fn set_equity(&self, equity: f64) {
        self.state.lock().await.equity = equity;
    }

    /// Every order seen so far, including rejected ones.
    pub async fn submitted(&self) -> Vec<OrderInstruction> {
        self.state.lock().await.submitted.clone()
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    async fn submit(&self, order: &OrderInstruction) -> Result<FillReport, ExecutionError> {
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }

        let mut state = self.state.lock().await;
        state.submitted.push(order.clone());

        if state.forced_rejections > 0 {
            state.forced_rejections -= 1;
            return Err(ExecutionError::Rejected("forced rejection".into()));
        }
        let p = self.config.rejection_probability;
        if p > 0.0 && state.rng.gen::<f64>() < p {
            return Err(ExecutionError::Rejected("simulated rejection".into()));
        }
        if !(order.reference_price > 0.0 && order.quantity > 0.0) {
            return Err(ExecutionError::Rejected(format!(
                "invalid order: quantity {} @ {}",
                order.quantity, order.reference_price
            )));
        }

        let fee = order.notional() * self.config.taker_fee_rate;
        state.equity -= fee;
        debug!(
            ticker = %order.ticker,
            reason = %order.reason,
            side = ?order.side,
            quantity = order.quantity,
            price = order.reference_price,
            fee,
            "paper fill"
        );

        Ok(FillReport {
            client_order_id: order.client_order_id,
            price: order.reference_price,
            quantity: order.quantity,
            fee,
            filled_at: Utc::now(),
        })
    }

    async fn portfolio_equity(&self) -> Result<f64, ExecutionError> {
        Ok(self.state.lock().await.equity)
    }
}
