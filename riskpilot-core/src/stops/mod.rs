//! StopEngine — protective stop state machine.
//!
//! Modes: FIXED → EDGE_DYNAMIC → TRAILING_ACTIVE ⇄ DISABLED_STRONG_UPTREND → CLOSED.
//!
//! - FIXED and EDGE_DYNAMIC are recomputed from the reference price each tick.
//! - Once trailing is armed it never falls back to FIXED or EDGE_DYNAMIC.
//! - In TRAILING_ACTIVE the stop only ratchets up.
//! - DISABLED_STRONG_UPTREND freezes the stop while the guard holds and hands
//!   back to TRAILING_ACTIVE the first tick any guard condition fails.
//! - CLOSED is terminal.

pub mod edge;
pub mod ratchet;
pub mod state;
pub mod trailing;

pub use state::{StopMode, StopState};

use crate::config::{ExitManagementConfig, TrailingStopConfig};
use crate::domain::{Indicators, TradeHistory};
use chrono::{DateTime, Utc};

/// Everything the stop engine reads for one tick.
#[derive(Debug, Clone, Copy)]
pub struct StopInput<'a> {
    pub close: f64,
    /// `None` when the snapshot failed validation: only the breach check runs.
    pub indicators: Option<&'a Indicators>,
    pub reference_price: f64,
    pub holding_days: i64,
    pub history: Option<&'a TradeHistory>,
    /// Recent closes trend up. Read only when `recent_trend_check` is on.
    pub recent_uptrend: bool,
    pub now: DateTime<Utc>,
}

/// Result of one stop evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct StopDecision {
    pub state: StopState,
    pub previous_mode: StopMode,
    pub previous_stop: f64,
    pub breached: bool,
}

impl StopDecision {
    pub fn mode_changed(&self) -> bool {
        !self.previous_mode.same_kind(&self.state.mode)
    }

    pub fn raised(&self) -> bool {
        self.state.current_stop_price > self.previous_stop
    }
}

pub struct StopEngine<'a> {
    trailing: &'a TrailingStopConfig,
    exit: &'a ExitManagementConfig,
}

impl<'a> StopEngine<'a> {
    pub fn new(trailing: &'a TrailingStopConfig, exit: &'a ExitManagementConfig) -> Self {
        Self { trailing, exit }
    }

    fn trailing_enabled(&self) -> bool {
        self.trailing.enabled && self.exit.trailing_stop_enabled
    }

    /// Advance the stop state by one tick and check for a breach.
    pub fn evaluate(&self, prev: &StopState, input: &StopInput<'_>) -> StopDecision {
        let mut state = prev.clone();

        if !prev.is_closed() {
            if let Some(ind) = input.indicators {
                let (mode, stop) = self.next_mode(prev, ind, input);
                state.mode = mode;
                state.current_stop_price = stop;
                state.last_updated_at = input.now;
            }
        }

        let breached = !prev.is_closed() && state.is_breached_by(input.close);
        if breached {
            state.mode = StopMode::Closed {
                breach_price: input.close,
            };
            state.last_updated_at = input.now;
        }

        StopDecision {
            state,
            previous_mode: prev.mode,
            previous_stop: prev.current_stop_price,
            breached,
        }
    }

    fn next_mode(&self, prev: &StopState, ind: &Indicators, input: &StopInput<'_>) -> (StopMode, f64) {
        let gain = if input.reference_price > 0.0 {
            (input.close - input.reference_price) / input.reference_price
        } else {
            0.0
        };

        let armed = prev.mode.is_trailing_armed();
        let activation = gain >= self.trailing.min_rise_pct
            && input.holding_days >= self.trailing.min_holding_days
            && (!self.trailing.recent_trend_check || input.recent_uptrend);

        if self.trailing_enabled() && (armed || activation) {
            let activation_price = prev
                .mode
                .trailing_activation_price()
                .unwrap_or(input.close);

            if self.trailing.strong_uptrend_disable
                && trailing::is_strong_uptrend(ind, gain, &self.trailing.strong_uptrend_conditions)
            {
                return (
                    StopMode::DisabledStrongUptrend { activation_price },
                    prev.current_stop_price,
                );
            }

            let distance = trailing::trailing_distance(ind.atr_pct, input.holding_days, self.trailing);
            let stop = ratchet::tighten(prev.current_stop_price, input.close * (1.0 - distance));
            return (
                StopMode::TrailingActive {
                    activation_price,
                    trailing_pct: distance,
                },
                stop,
            );
        }

        if armed {
            // Trailing switched off by config reload: keep the frozen stop.
            return (prev.mode, prev.current_stop_price);
        }

        let edge_cfg = &self.trailing.edge_stop_loss;
        if edge::is_eligible(input.history, input.holding_days, gain, edge_cfg) {
            let stop_pct = edge::stop_pct(ind.atr_pct, edge_cfg);
            return (
                StopMode::EdgeDynamic { stop_pct },
                input.reference_price * (1.0 - stop_pct),
            );
        }

        (
            StopMode::Fixed,
            input.reference_price * (1.0 - self.exit.stop_loss_from_avg),
        )
    }
}
