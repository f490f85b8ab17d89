//! IndicatorSnapshot — one bar of price, volume and derived indicators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a snapshot cannot drive growth decisions this tick.
///
/// Every variant maps to MissingIndicatorData: pyramid and profit evaluation
/// are skipped, the last-known stop is still checked when `close` is usable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    #[error("{ticker}: indicator `{field}` is missing")]
    MissingField { ticker: String, field: &'static str },

    #[error("{ticker}: indicator `{field}` is not finite ({value})")]
    NonFinite {
        ticker: String,
        field: &'static str,
        value: f64,
    },

    #[error("{ticker}: close price {close} is not a usable price")]
    InvalidPrice { ticker: String, close: f64 },

    #[error("{ticker}: snapshot is {age_secs}s old (limit {max_age_secs}s)")]
    Stale {
        ticker: String,
        age_secs: i64,
        max_age_secs: i64,
    },

    #[error("{ticker}: snapshot is timestamped {ahead_secs}s in the future")]
    FromFuture { ticker: String, ahead_secs: i64 },
}

/// Per-bar market view delivered by the indicator provider.
///
/// Rolling values (`rolling_high_20`, `rolling_avg_volume_20`) cover the
/// previous 20 bars and exclude the current one. Indicator fields are
/// optional on the wire; a missing or NaN value makes the snapshot unusable
/// for growth decisions (see [`IndicatorSnapshot::indicators`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    #[serde(default)]
    pub atr: Option<f64>,
    /// ATR as a fraction of close. Derived from `atr / close` when absent.
    #[serde(default)]
    pub atr_pct: Option<f64>,
    #[serde(default)]
    pub rsi_14: Option<f64>,
    #[serde(default)]
    pub adx: Option<f64>,
    #[serde(default)]
    pub macd_histogram: Option<f64>,
    #[serde(default)]
    pub ma20: Option<f64>,
    #[serde(default)]
    pub ma20_slope: Option<f64>,
    /// Bullish trend-following signal (e.g. supertrend long).
    #[serde(default)]
    pub trend_signal: bool,
    #[serde(default)]
    pub rolling_high_20: Option<f64>,
    #[serde(default)]
    pub rolling_avg_volume_20: Option<f64>,
    /// Closes of the latest bars, oldest first, ending with this bar.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_closes: Vec<f64>,
}

/// Fully populated indicator values, produced only by a validated snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Indicators {
    pub close: f64,
    pub volume: f64,
    pub atr_pct: f64,
    pub rsi_14: f64,
    pub adx: f64,
    pub macd_histogram: f64,
    pub ma20: f64,
    pub ma20_slope: f64,
    pub trend_signal: bool,
    pub rolling_high_20: f64,
    pub rolling_avg_volume_20: f64,
}

impl Indicators {
    /// Distance of price above the 20-bar average, as a fraction of the average.
    pub fn ma20_rise_pct(&self) -> f64 {
        (self.close - self.ma20) / self.ma20
    }

    /// Current volume relative to the 20-bar average volume.
    pub fn liquidity_ratio(&self) -> f64 {
        if self.rolling_avg_volume_20 <= 0.0 {
            return 0.0;
        }
        self.volume / self.rolling_avg_volume_20
    }
}

impl IndicatorSnapshot {
    /// Returns true when `close` can be compared against a stop.
    pub fn has_usable_close(&self) -> bool {
        self.close.is_finite() && self.close > 0.0
    }

    /// At least `min_up_ratio` of the last `days` closes rose on the prior
    /// one. Too few closes is never an uptrend.
    pub fn is_recent_uptrend(&self, days: usize, min_up_ratio: f64) -> bool {
        if days < 2 || self.recent_closes.len() < days {
            return false;
        }
        let window = &self.recent_closes[self.recent_closes.len() - days..];
        let ups = window.windows(2).filter(|w| w[1] > w[0]).count();
        ups as f64 >= days as f64 * min_up_ratio
    }

    /// Reject snapshots older than `max_age_secs` relative to `now`, or
    /// stamped after it.
    pub fn check_freshness(&self, now: DateTime<Utc>, max_age_secs: i64) -> Result<(), SnapshotError> {
        let age_secs = (now - self.timestamp).num_seconds();
        if age_secs < 0 {
            return Err(SnapshotError::FromFuture {
                ticker: self.ticker.clone(),
                ahead_secs: -age_secs,
            });
        }
        if age_secs > max_age_secs {
            return Err(SnapshotError::Stale {
                ticker: self.ticker.clone(),
                age_secs,
                max_age_secs,
            });
        }
        Ok(())
    }

    /// Validate every required field and return the populated view.
    pub fn indicators(&self) -> Result<Indicators, SnapshotError> {
        if !self.has_usable_close() {
            return Err(SnapshotError::InvalidPrice {
                ticker: self.ticker.clone(),
                close: self.close,
            });
        }
        let volume = self.finite("volume", Some(self.volume))?;
        let atr_pct = match self.atr_pct {
            Some(v) => self.finite("atr_pct", Some(v))?,
            None => self.finite("atr", self.atr)? / self.close,
        };

        Ok(Indicators {
            close: self.close,
            volume,
            atr_pct,
            rsi_14: self.finite("rsi_14", self.rsi_14)?,
            adx: self.finite("adx", self.adx)?,
            macd_histogram: self.finite("macd_histogram", self.macd_histogram)?,
            ma20: self.positive("ma20", self.ma20)?,
            ma20_slope: self.finite("ma20_slope", self.ma20_slope)?,
            trend_signal: self.trend_signal,
            rolling_high_20: self.positive("rolling_high_20", self.rolling_high_20)?,
            rolling_avg_volume_20: self.finite(
                "rolling_avg_volume_20",
                self.rolling_avg_volume_20,
            )?,
        })
    }

    fn finite(&self, field: &'static str, value: Option<f64>) -> Result<f64, SnapshotError> {
        match value {
            None => Err(SnapshotError::MissingField {
                ticker: self.ticker.clone(),
                field,
            }),
            Some(v) if !v.is_finite() => Err(SnapshotError::NonFinite {
                ticker: self.ticker.clone(),
                field,
                value: v,
            }),
            Some(v) => Ok(v),
        }
    }

    fn positive(&self, field: &'static str, value: Option<f64>) -> Result<f64, SnapshotError> {
        let v = self.finite(field, value)?;
        if v <= 0.0 {
            return Err(SnapshotError::NonFinite {
                ticker: self.ticker.clone(),
                field,
                value: v,
            });
        }
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> IndicatorSnapshot {
        IndicatorSnapshot {
            ticker: "005930".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 6, 30, 0).unwrap(),
            close: 104.0,
            high: 105.0,
            low: 101.0,
            volume: 1_500_000.0,
            atr: Some(2.08),
            atr_pct: Some(0.02),
            rsi_14: Some(62.0),
            adx: Some(28.0),
            macd_histogram: Some(0.4),
            ma20: Some(100.0),
            ma20_slope: Some(0.3),
            trend_signal: true,
            rolling_high_20: Some(102.0),
            rolling_avg_volume_20: Some(1_000_000.0),
            recent_closes: Vec::new(),
        }
    }

    #[test]
    fn complete_snapshot_validates() {
        let ind = sample().indicators().unwrap();
        assert_eq!(ind.atr_pct, 0.02);
        assert!((ind.ma20_rise_pct() - 0.04).abs() < 1e-12);
        assert!((ind.liquidity_ratio() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn atr_pct_is_derived_from_atr() {
        let mut snap = sample();
        snap.atr_pct = None;
        let ind = snap.indicators().unwrap();
        assert!((ind.atr_pct - 0.02).abs() < 1e-12);
    }

    #[test]
    fn missing_rsi_is_reported() {
        let mut snap = sample();
        snap.rsi_14 = None;
        assert_eq!(
            snap.indicators().unwrap_err(),
            SnapshotError::MissingField {
                ticker: "005930".into(),
                field: "rsi_14"
            }
        );
    }

    #[test]
    fn nan_indicator_is_reported() {
        let mut snap = sample();
        snap.adx = Some(f64::NAN);
        assert!(matches!(
            snap.indicators(),
            Err(SnapshotError::NonFinite { field: "adx", .. })
        ));
    }

    #[test]
    fn nan_close_is_unusable() {
        let mut snap = sample();
        snap.close = f64::NAN;
        assert!(!snap.has_usable_close());
        assert!(matches!(snap.indicators(), Err(SnapshotError::InvalidPrice { .. })));
    }

    #[test]
    fn stale_snapshot_is_rejected() {
        let snap = sample();
        let now = snap.timestamp + chrono::Duration::days(3);
        assert!(matches!(
            snap.check_freshness(now, 2 * 24 * 3600),
            Err(SnapshotError::Stale { .. })
        ));
        assert!(snap.check_freshness(snap.timestamp, 60).is_ok());
    }

    #[test]
    fn recent_uptrend_needs_enough_rising_closes() {
        let mut snap = sample();
        assert!(!snap.is_recent_uptrend(3, 0.6));

        snap.recent_closes = vec![90.0, 95.0, 97.0, 99.0];
        assert!(snap.is_recent_uptrend(3, 0.6));

        snap.recent_closes = vec![95.0, 99.0, 98.0];
        assert!(!snap.is_recent_uptrend(3, 0.6));
        assert!(snap.is_recent_uptrend(3, 0.3));
    }

    #[test]
    fn future_snapshot_is_rejected() {
        let snap = sample();
        let earlier = snap.timestamp - chrono::Duration::minutes(5);
        assert!(matches!(
            snap.check_freshness(earlier, 2 * 24 * 3600),
            Err(SnapshotError::FromFuture { ahead_secs: 300, .. })
        ));
    }

    #[test]
    fn indicators_may_be_omitted_on_the_wire() {
        let json = r#"{
            "ticker": "AAPL",
            "timestamp": "2024-03-04T21:00:00Z",
            "close": 180.0, "high": 181.0, "low": 178.5, "volume": 5000000.0
        }"#;
        let snap: IndicatorSnapshot = serde_json::from_str(json).unwrap();
        assert!(snap.has_usable_close());
        assert!(snap.indicators().is_err());
    }
}
