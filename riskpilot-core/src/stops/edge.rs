//! Edge-based dynamic stop-loss.

use crate::config::EdgeStopConfig;
use crate::domain::TradeHistory;

/// Trade history proves enough edge, the position is old enough and it sits
/// in the profit zone. `gain` is measured against the reference price.
pub fn is_eligible(
    history: Option<&TradeHistory>,
    holding_days: i64,
    gain: f64,
    config: &EdgeStopConfig,
) -> bool {
    let Some(history) = history else {
        return false;
    };
    config.enabled
        && holding_days >= config.min_holding_days
        && gain >= config.profit_threshold_pct
        && history.win_rate >= config.min_win_rate
        && history.edge_ratio >= config.min_edge_ratio
}

/// `clamp(atr_multiplier × atr_pct, min_stop_loss_pct, max_stop_loss_pct)`.
pub fn stop_pct(atr_pct: f64, config: &EdgeStopConfig) -> f64 {
    (config.atr_multiplier * atr_pct.max(0.0))
        .clamp(config.min_stop_loss_pct, config.max_stop_loss_pct)
}
