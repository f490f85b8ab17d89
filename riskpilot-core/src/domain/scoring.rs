//! Inputs from the external scoring filter and trade-history store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cap on the Kelly fraction derived from trade outcomes.
pub const MAX_EDGE_RATIO: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Buy,
    Hold,
    Sell,
}

/// Verdict of the entry-eligibility filter for one ticker.
///
/// Only gates new entries. An open position is managed regardless of what
/// later scoring results say about its ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringResult {
    pub ticker: String,
    /// Market stage classification (2 = confirmed uptrend).
    pub stage: u8,
    pub quality_score: f64,
    pub confidence: f64,
    pub recommendation: Recommendation,
    pub evaluated_at: DateTime<Utc>,
}

impl ScoringResult {
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age_secs: i64) -> bool {
        let age = (now - self.evaluated_at).num_seconds();
        (0..=max_age_secs).contains(&age)
    }
}

/// Realized performance of past trades for a ticker or strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeHistory {
    pub ticker_or_strategy: String,
    pub win_rate: f64,
    /// Kelly-style edge ratio in [0, MAX_EDGE_RATIO].
    pub edge_ratio: f64,
}

impl TradeHistory {
    /// Build a history from win rate and average win/loss magnitudes.
    ///
    /// Edge ratio is the Kelly fraction `(b·p − q) / b` with payoff ratio
    /// `b = avg_win / avg_loss`, clamped to `[0, MAX_EDGE_RATIO]`. A history
    /// without losses or wins has no measurable edge.
    pub fn from_outcomes(
        ticker_or_strategy: impl Into<String>,
        win_rate: f64,
        avg_win_pct: f64,
        avg_loss_pct: f64,
    ) -> Self {
        let p = win_rate.clamp(0.0, 1.0);
        let avg_win = avg_win_pct.abs();
        let avg_loss = avg_loss_pct.abs();
        let edge_ratio = if avg_win > 0.0 && avg_loss > 0.0 {
            let b = avg_win / avg_loss;
            ((b * p - (1.0 - p)) / b).clamp(0.0, MAX_EDGE_RATIO)
        } else {
            0.0
        };
        Self {
            ticker_or_strategy: ticker_or_strategy.into(),
            win_rate: p,
            edge_ratio,
        }
    }
}
