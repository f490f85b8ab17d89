//! Position Sizer — determines leg size as a fraction of equity
//!
//! The sizer translates a leg index and current volatility into a capital
//! allocation, then into a quantity at the reference price.
//!
//! # Responsibilities
//! - Initial and add-on allocations with per-leg decay
//! - ATR-driven volatility reduction
//! - Capping cumulative commitment at `max_total_position_pct`
//! - Skipping orders below the minimum notional
//!
//! # Non-Responsibilities
//! - The sizer does NOT decide whether to add (that's the pyramid engine's job)
//! - The sizer does NOT place orders

use crate::config::{EntryConfig, PyramidConfig};

/// A sized leg ready to become an order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizedLeg {
    /// Fraction of equity this leg commits.
    pub size_ratio: f64,
    pub notional: f64,
    pub quantity: f64,
}

/// Why no order could be sized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizingSkip {
    /// Cumulative commitment already at the cap.
    AllocationExhausted { committed_pct: f64, cap_pct: f64 },
    /// Capped notional is below `entry.min_order_notional`.
    BelowMinimumNotional { notional: f64, minimum: f64 },
    /// Equity or price is not a positive finite number.
    InvalidInput,
}

pub struct PositionSizer<'a> {
    entry: &'a EntryConfig,
    pyramid: &'a PyramidConfig,
}

impl<'a> PositionSizer<'a> {
    pub fn new(entry: &'a EntryConfig, pyramid: &'a PyramidConfig) -> Self {
        Self { entry, pyramid }
    }

    /// Fractional size reduction for the current ATR%.
    ///
    /// Zero up to `normal_atr_pct`, ramping linearly to
    /// `max_volatility_reduction_pct` at `atr_pct_ceiling`.
    pub fn volatility_reduction(&self, atr_pct: f64) -> f64 {
        let risk = &self.pyramid.risk_management;
        if !risk.volatility_adjustment || !atr_pct.is_finite() {
            return 0.0;
        }
        let span = risk.atr_pct_ceiling - risk.normal_atr_pct;
        if span <= 0.0 {
            return 0.0;
        }
        let excess = ((atr_pct - risk.normal_atr_pct) / span).clamp(0.0, 1.0);
        risk.max_volatility_reduction_pct * excess
    }

    /// Combined size multiplier for leg `leg_index` (0 = initial entry).
    ///
    /// `(1 − decay)^(n−1) × (1 − volatility_reduction)`; the decay term is 1
    /// for the initial leg and for the first add-on.
    pub fn effective_size_multiplier(&self, leg_index: usize, atr_pct: f64) -> f64 {
        let decay = if leg_index <= 1 {
            1.0
        } else {
            let retain = 1.0 - self.pyramid.risk_management.size_decay_factor;
            retain.powi((leg_index - 1) as i32)
        };
        decay * (1.0 - self.volatility_reduction(atr_pct))
    }

    /// Target allocation of leg `leg_index` before capping.
    pub fn target_fraction(&self, leg_index: usize, atr_pct: f64) -> f64 {
        let base = self.entry.initial_position_pct;
        let ratio = if leg_index == 0 {
            1.0
        } else {
            self.pyramid.add_on_ratio
        };
        base * ratio * self.effective_size_multiplier(leg_index, atr_pct)
    }

    /// Size leg `leg_index` against equity, the current commitment and price.
    pub fn size_leg(
        &self,
        leg_index: usize,
        atr_pct: f64,
        equity: f64,
        committed_pct: f64,
        price: f64,
    ) -> Result<SizedLeg, SizingSkip> {
        if !(equity.is_finite() && equity > 0.0 && price.is_finite() && price > 0.0) {
            return Err(SizingSkip::InvalidInput);
        }
        let cap_pct = self.pyramid.max_total_position_pct;
        let headroom = cap_pct - committed_pct;
        let size_ratio = self.target_fraction(leg_index, atr_pct).min(headroom);
        if size_ratio <= 1e-12 {
            return Err(SizingSkip::AllocationExhausted {
                committed_pct,
                cap_pct,
            });
        }

        let notional = equity * size_ratio;
        let minimum = self.entry.min_order_notional;
        if notional < minimum {
            return Err(SizingSkip::BelowMinimumNotional { notional, minimum });
        }

        Ok(SizedLeg {
            size_ratio,
            notional,
            quantity: notional / price,
        })
    }
}
