//! In-memory data sources.
//!
//! Used by tests, the paper runtime and anything that replays recorded
//! snapshots. Each source is updated with `publish`/`set` and read through
//! its port trait.

use std::collections::HashMap;

use async_trait::async_trait;
use riskpilot_core::domain::{IndicatorSnapshot, ScoringResult, TradeHistory};
use tokio::sync::RwLock;

use crate::ports::{ProviderError, ScoringGate, SnapshotProvider, TradeHistorySource};

/// Latest snapshot per ticker.
#[derive(Default)]
pub struct InMemorySnapshots {
    latest: RwLock<HashMap<String, IndicatorSnapshot>>,
}

impl InMemorySnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the latest snapshot for the snapshot's ticker.
    pub async fn publish(&self, snapshot: IndicatorSnapshot) {
        self.latest
            .write()
            .await
            .insert(snapshot.ticker.clone(), snapshot);
    }

    pub async fn remove(&self, ticker: &str) {
        self.latest.write().await.remove(ticker);
    }
}

#[async_trait]
impl SnapshotProvider for InMemorySnapshots {
    async fn latest(&self, ticker: &str) -> Result<IndicatorSnapshot, ProviderError> {
        self.latest
            .read()
            .await
            .get(ticker)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(ticker.to_string()))
    }
}

/// Scoring results, one per ticker; newer publications replace older ones.
#[derive(Default)]
pub struct InMemoryScoring {
    results: RwLock<HashMap<String, ScoringResult>>,
}

impl InMemoryScoring {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, result: ScoringResult) {
        self.results
            .write()
            .await
            .insert(result.ticker.clone(), result);
    }

    pub async fn clear(&self) {
        self.results.write().await.clear();
    }
}

#[async_trait]
impl ScoringGate for InMemoryScoring {
    async fn candidates(&self) -> Result<Vec<ScoringResult>, ProviderError> {
        let mut out: Vec<ScoringResult> = self.results.read().await.values().cloned().collect();
        out.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        Ok(out)
    }
}

#[derive(Default)]
pub struct InMemoryHistory {
    by_ticker: RwLock<HashMap<String, TradeHistory>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, history: TradeHistory) {
        self.by_ticker
            .write()
            .await
            .insert(history.ticker_or_strategy.clone(), history);
    }
}

#[async_trait]
impl TradeHistorySource for InMemoryHistory {
    async fn history(&self, ticker: &str) -> Result<Option<TradeHistory>, ProviderError> {
        Ok(self.by_ticker.read().await.get(ticker).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use riskpilot_core::domain::Recommendation;

    fn scoring(ticker: &str) -> ScoringResult {
        ScoringResult {
            ticker: ticker.into(),
            stage: 2,
            quality_score: 70.0,
            confidence: 0.8,
            recommendation: Recommendation::Buy,
            evaluated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn missing_snapshot_is_not_found() {
        let snaps = InMemorySnapshots::new();
        assert_eq!(
            snaps.latest("QQQ").await.unwrap_err(),
            ProviderError::NotFound("QQQ".into())
        );
    }

    #[tokio::test]
    async fn candidates_are_sorted_and_deduplicated_by_ticker() {
        let gate = InMemoryScoring::new();
        gate.publish(scoring("TSLA")).await;
        gate.publish(scoring("AAPL")).await;
        gate.publish(scoring("TSLA")).await;
        let tickers: Vec<_> = gate
            .candidates()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.ticker)
            .collect();
        assert_eq!(tickers, vec!["AAPL", "TSLA"]);
    }

    #[tokio::test]
    async fn absent_history_is_none() {
        let source = InMemoryHistory::new();
        assert_eq!(source.history("AAPL").await.unwrap(), None);
        source
            .set(TradeHistory::from_outcomes("AAPL", 0.6, 0.05, 0.03))
            .await;
        assert!(source.history("AAPL").await.unwrap().is_some());
    }
}
