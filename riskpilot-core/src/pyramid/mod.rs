//! PyramidEngine — decides whether a winning position gets another leg.
//!
//! Gate order per tick:
//! 1. capacity: leg cap, allocation cap, no add-on already outstanding
//! 2. spacing: close ≥ last leg fill × (1 + pyramid_threshold_pct)
//! 3. safety vetoes (RSI, ATR%, liquidity)
//! 4. triggers: condition A or condition B (A wins when both hold)

pub mod conditions;
pub mod safety;

pub use safety::SafetyVeto;

use crate::config::PyramidConfig;
use crate::domain::{Indicators, PendingAction, Position, TriggerKind};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockReason {
    Disabled,
    LegCapReached { legs: usize },
    AllocationCapReached { committed_pct: f64 },
    AddOnPending,
    SpacingNotMet { required: f64 },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::Disabled => f.write_str("pyramiding disabled"),
            BlockReason::LegCapReached { legs } => write!(f, "leg cap reached ({legs} legs)"),
            BlockReason::AllocationCapReached { committed_pct } => {
                write!(f, "allocation cap reached ({:.2}%)", committed_pct * 100.0)
            }
            BlockReason::AddOnPending => f.write_str("add-on order outstanding"),
            BlockReason::SpacingNotMet { required } => {
                write!(f, "spacing not met (needs {required:.4})")
            }
        }
    }
}

/// Outcome of one pyramid evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PyramidVerdict {
    Triggered(TriggerKind),
    Blocked(BlockReason),
    Vetoed(SafetyVeto),
    NoTrigger,
}

pub struct PyramidEngine<'a> {
    config: &'a PyramidConfig,
}

impl<'a> PyramidEngine<'a> {
    pub fn new(config: &'a PyramidConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, position: &Position, ind: &Indicators) -> PyramidVerdict {
        if !self.config.enabled {
            return PyramidVerdict::Blocked(BlockReason::Disabled);
        }
        if position.legs.len() >= self.config.max_legs() {
            return PyramidVerdict::Blocked(BlockReason::LegCapReached {
                legs: position.legs.len(),
            });
        }
        let committed_pct = position.committed_pct();
        if committed_pct >= self.config.max_total_position_pct - 1e-12 {
            return PyramidVerdict::Blocked(BlockReason::AllocationCapReached { committed_pct });
        }
        if position.has_pending(|a| matches!(a, PendingAction::AddOn { .. })) {
            return PyramidVerdict::Blocked(BlockReason::AddOnPending);
        }

        let Some(last_fill) = position.legs.last().map(|l| l.fill_price) else {
            return PyramidVerdict::NoTrigger;
        };
        let required = last_fill * (1.0 + self.config.pyramid_threshold_pct);
        if ind.close < required {
            return PyramidVerdict::Blocked(BlockReason::SpacingNotMet { required });
        }

        if let Some(veto) = safety::check(ind, &self.config.safety) {
            return PyramidVerdict::Vetoed(veto);
        }

        if conditions::condition_a(ind, &self.config.condition_a) {
            PyramidVerdict::Triggered(TriggerKind::ConditionA)
        } else if conditions::condition_b(ind, last_fill, &self.config.condition_b) {
            PyramidVerdict::Triggered(TriggerKind::ConditionB)
        } else {
            PyramidVerdict::NoTrigger
        }
    }
}
