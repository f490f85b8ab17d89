//! Trailing distance shaping and the strong-uptrend guard.

use crate::config::{StrongUptrendConditions, TrailingStopConfig};
use crate::domain::Indicators;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolatilityRegime {
    High,
    Medium,
    Low,
}

pub fn volatility_regime(atr_pct: f64, config: &TrailingStopConfig) -> VolatilityRegime {
    let regimes = &config.volatility_regimes;
    if atr_pct > regimes.high_atr_pct {
        VolatilityRegime::High
    } else if atr_pct > regimes.medium_atr_pct {
        VolatilityRegime::Medium
    } else {
        VolatilityRegime::Low
    }
}

pub fn volatility_multiplier(atr_pct: f64, config: &TrailingStopConfig) -> f64 {
    let m = &config.volatility_multipliers;
    match volatility_regime(atr_pct, config) {
        VolatilityRegime::High => m.high,
        VolatilityRegime::Medium => m.medium,
        VolatilityRegime::Low => m.low,
    }
}

/// Slack factor for young positions; 1.0 once past every bucket.
pub fn holding_adjustment(holding_days: i64, config: &TrailingStopConfig) -> f64 {
    config
        .holding_adjustments
        .iter()
        .find(|adj| holding_days <= adj.max_days)
        .map(|adj| adj.factor)
        .unwrap_or(1.0)
}

/// `clamp(atr_pct × holding_adjustment × volatility_multiplier, min, max)`.
pub fn trailing_distance(atr_pct: f64, holding_days: i64, config: &TrailingStopConfig) -> f64 {
    let raw = atr_pct.max(0.0)
        * holding_adjustment(holding_days, config)
        * volatility_multiplier(atr_pct, config);
    raw.clamp(config.min_trailing_pct, config.max_trailing_pct)
}

/// Every condition of the strong-uptrend guard holds.
pub fn is_strong_uptrend(
    indicators: &Indicators,
    unrealized_gain_pct: f64,
    conditions: &StrongUptrendConditions,
) -> bool {
    let rsi_in_band = (conditions.rsi_min..=conditions.rsi_max).contains(&indicators.rsi_14);
    let above_ma20 = indicators.ma20_rise_pct() >= conditions.ma20_rise_pct;
    let momentum_ok = !conditions.momentum_positive || indicators.macd_histogram > 0.0;
    let profit_ok = unrealized_gain_pct >= conditions.min_profit_pct;
    rsi_in_band && above_ma20 && momentum_ok && profit_ok
}
