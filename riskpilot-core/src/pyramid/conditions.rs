//! Add-on trigger conditions.

use crate::config::{ConditionAConfig, ConditionBConfig};
use crate::domain::Indicators;

/// Condition A: close breaks the rolling high by `high_breakout_pct` on
/// volume above `volume_surge_ratio` × average.
pub fn condition_a(ind: &Indicators, config: &ConditionAConfig) -> bool {
    if !config.enabled {
        return false;
    }
    let breakout = ind.close > ind.rolling_high_20 * (1.0 + config.high_breakout_pct);
    let surge = ind.volume > ind.rolling_avg_volume_20 * config.volume_surge_ratio;
    breakout && surge
}

/// Condition B: trend signal, ADX strength, rising MA20 and an advance over
/// the last leg's fill.
pub fn condition_b(ind: &Indicators, last_fill_price: f64, config: &ConditionBConfig) -> bool {
    if !config.enabled {
        return false;
    }
    let trend_ok = !config.trend_signal_required || ind.trend_signal;
    let adx_ok = ind.adx >= config.adx_threshold;
    let ma_ok = !config.ma20_rising_required || ind.ma20_slope > 0.0;
    let advance_ok = ind.close >= last_fill_price * (1.0 + config.price_advance_pct);
    trend_ok && adx_ok && ma_ok && advance_ok
}
