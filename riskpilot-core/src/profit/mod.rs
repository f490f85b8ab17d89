//! ProfitTaker — multi-level take-profit against the reference price.

use crate::config::ExitManagementConfig;
use crate::domain::{OrderReason, QTY_EPSILON};
use serde::{Deserialize, Serialize};

const RATIO_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitLevel {
    /// Gain over the reference price that triggers this level.
    pub target_pct: f64,
    pub quantity_ratio: f64,
    pub executed: bool,
}

/// Ordered take-profit levels of one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitPlan {
    pub levels: Vec<ProfitLevel>,
}

impl ProfitPlan {
    pub fn from_config(config: &ExitManagementConfig) -> Self {
        let levels = config
            .profit_taking_levels
            .iter()
            .zip(&config.profit_taking_ratios)
            .map(|(&target_pct, &quantity_ratio)| ProfitLevel {
                target_pct,
                quantity_ratio,
                executed: false,
            })
            .collect();
        Self { levels }
    }

    pub fn executed_ratio(&self) -> f64 {
        self.levels
            .iter()
            .filter(|l| l.executed)
            .map(|l| l.quantity_ratio)
            .sum()
    }

    /// Mark a level executed. Returns false if it already was.
    pub fn mark_executed(&mut self, level: usize) -> bool {
        match self.levels.get_mut(level) {
            Some(l) if !l.executed => {
                l.executed = true;
                true
            }
            _ => false,
        }
    }

    pub fn all_executed(&self) -> bool {
        self.levels.iter().all(|l| l.executed)
    }

    /// Share of the position no level ever sells; left to the stop.
    pub fn runner_ratio(&self) -> f64 {
        let total: f64 = self.levels.iter().map(|l| l.quantity_ratio).sum();
        (1.0 - total).max(0.0)
    }
}

/// A level crossed this tick and the quantity to sell for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfitExit {
    pub level: usize,
    pub target_pct: f64,
    pub quantity: f64,
    pub reason: OrderReason,
}

#[derive(Debug, Clone, Copy)]
pub struct ProfitInput<'a> {
    pub close: f64,
    pub reference_price: f64,
    /// Open quantity not already covered by outstanding sells.
    pub available_quantity: f64,
    /// Levels whose order is still outstanding.
    pub pending_levels: &'a [usize],
}

pub struct ProfitTaker;

impl ProfitTaker {
    /// Levels newly crossed at `close`, each sized from what remains.
    ///
    /// Sell quantity = remaining × ratio / (sum of ratios still open + runner),
    /// where the runner is the share the ratios leave unsold. With no runner
    /// the last open level liquidates everything left and carries FULL_EXIT.
    pub fn evaluate(plan: &ProfitPlan, input: &ProfitInput<'_>) -> Vec<ProfitExit> {
        let mut exits = Vec::new();
        if input.reference_price <= 0.0 || input.available_quantity < QTY_EPSILON {
            return exits;
        }
        let gain = (input.close - input.reference_price) / input.reference_price;

        let is_open = |idx: usize, level: &ProfitLevel| {
            !level.executed && !input.pending_levels.contains(&idx)
        };
        let mut open_ratio: f64 = plan
            .levels
            .iter()
            .enumerate()
            .filter(|(i, l)| is_open(*i, l))
            .map(|(_, l)| l.quantity_ratio)
            .sum();
        let runner = plan.runner_ratio();
        let mut remaining = input.available_quantity;

        for (idx, level) in plan.levels.iter().enumerate() {
            if !is_open(idx, level) || gain < level.target_pct {
                continue;
            }
            if open_ratio <= 0.0 || remaining < QTY_EPSILON {
                break;
            }
            let last_open = runner < RATIO_EPSILON && (open_ratio - level.quantity_ratio) < RATIO_EPSILON;
            let quantity = if last_open {
                remaining
            } else {
                remaining * level.quantity_ratio / (open_ratio + runner)
            };
            exits.push(ProfitExit {
                level: idx,
                target_pct: level.target_pct,
                quantity,
                reason: if last_open {
                    OrderReason::FullExit
                } else {
                    OrderReason::PartialProfit
                },
            });
            remaining -= quantity;
            open_ratio -= level.quantity_ratio;
        }
        exits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> ProfitPlan {
        ProfitPlan::from_config(&ExitManagementConfig::default())
    }

    fn input(close: f64, qty: f64, pending: &[usize]) -> ProfitInput<'_> {
        ProfitInput {
            close,
            reference_price: 100.0,
            available_quantity: qty,
            pending_levels: pending,
        }
    }

    #[test]
    fn below_first_level_does_nothing() {
        assert!(ProfitTaker::evaluate(&plan(), &input(105.9, 100.0, &[])).is_empty());
    }

    #[test]
    fn first_level_sells_thirty_percent() {
        let exits = ProfitTaker::evaluate(&plan(), &input(106.0, 100.0, &[]));
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].level, 0);
        assert!((exits[0].quantity - 30.0).abs() < 1e-9);
        assert_eq!(exits[0].reason, OrderReason::PartialProfit);
    }

    #[test]
    fn gap_through_all_levels_emits_each_and_liquidates() {
        let exits = ProfitTaker::evaluate(&plan(), &input(125.0, 100.0, &[]));
        let qty: Vec<f64> = exits.iter().map(|e| e.quantity).collect();
        assert_eq!(exits.len(), 3);
        assert!((qty[0] - 30.0).abs() < 1e-9);
        assert!((qty[1] - 40.0).abs() < 1e-9);
        assert!((qty[2] - 30.0).abs() < 1e-9);
        assert_eq!(exits[2].reason, OrderReason::FullExit);
    }

    #[test]
    fn executed_and_pending_levels_are_skipped() {
        let mut p = plan();
        p.mark_executed(0);
        assert!(!p.mark_executed(0));
        // Level 1 pending with its 40 units already reserved.
        let exits = ProfitTaker::evaluate(&p, &input(121.0, 30.0, &[1]));
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].level, 2);
        assert!((exits[0].quantity - 30.0).abs() < 1e-9);
        assert_eq!(exits[0].reason, OrderReason::FullExit);
    }

    #[test]
    fn ratios_below_one_keep_a_runner() {
        let config = ExitManagementConfig {
            profit_taking_ratios: vec![0.2, 0.2, 0.2],
            ..ExitManagementConfig::default()
        };
        let mut p = ProfitPlan::from_config(&config);
        assert!((p.runner_ratio() - 0.4).abs() < 1e-12);

        let exits = ProfitTaker::evaluate(&p, &input(106.0, 100.0, &[]));
        assert_eq!(exits.len(), 1);
        assert!((exits[0].quantity - 20.0).abs() < 1e-9);
        assert_eq!(exits[0].reason, OrderReason::PartialProfit);

        // Gap through the remaining levels after the first one filled.
        p.mark_executed(0);
        let exits = ProfitTaker::evaluate(&p, &input(121.0, 80.0, &[]));
        let sold: f64 = exits.iter().map(|e| e.quantity).sum();
        assert_eq!(exits.len(), 2);
        assert!((exits[0].quantity - 20.0).abs() < 1e-9);
        assert!((exits[1].quantity - 20.0).abs() < 1e-9);
        assert!(exits.iter().all(|e| e.reason == OrderReason::PartialProfit));
        assert!((80.0 - sold - 40.0).abs() < 1e-9);
    }

    #[test]
    fn gap_with_runner_sells_only_configured_share() {
        let config = ExitManagementConfig {
            profit_taking_ratios: vec![0.2, 0.2, 0.2],
            ..ExitManagementConfig::default()
        };
        let p = ProfitPlan::from_config(&config);
        let exits = ProfitTaker::evaluate(&p, &input(121.0, 100.0, &[]));
        let sold: f64 = exits.iter().map(|e| e.quantity).sum();
        assert_eq!(exits.len(), 3);
        assert!((sold - 60.0).abs() < 1e-9);
        assert!(exits.iter().all(|e| e.reason != OrderReason::FullExit));
    }

    #[test]
    fn executed_ratio_accumulates() {
        let mut p = plan();
        p.mark_executed(0);
        p.mark_executed(1);
        assert!((p.executed_ratio() - 0.7).abs() < 1e-12);
        assert!(!p.all_executed());
    }
}
