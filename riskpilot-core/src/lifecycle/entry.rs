//! EntryPlanner — turns a fresh scoring confirmation into an INITIAL_ENTRY order.

use crate::config::StrategyConfig;
use crate::domain::{
    IndicatorSnapshot, OrderInstruction, OrderReason, PositionId, Recommendation, ScoringResult,
    SnapshotError,
};
use crate::sizers::{PositionSizer, SizingSkip};
use chrono::{DateTime, Utc};
use std::fmt;

/// Why a candidate did not produce an entry order.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryRejection {
    TickerMismatch,
    NotConfirmed(Recommendation),
    WrongStage { stage: u8, required: u8 },
    LowConfidence(f64),
    LowQuality(f64),
    StaleScoring,
    PositionAlreadyOpen,
    MaxOpenPositions(usize),
    Snapshot(SnapshotError),
    Sizing(SizingSkip),
}

impl fmt::Display for EntryRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryRejection::TickerMismatch => f.write_str("scoring and snapshot tickers differ"),
            EntryRejection::NotConfirmed(r) => write!(f, "recommendation is {r:?}"),
            EntryRejection::WrongStage { stage, required } => {
                write!(f, "stage {stage}, requires {required}")
            }
            EntryRejection::LowConfidence(c) => write!(f, "confidence {c:.2} below minimum"),
            EntryRejection::LowQuality(q) => write!(f, "quality {q:.1} below minimum"),
            EntryRejection::StaleScoring => f.write_str("scoring result is stale"),
            EntryRejection::PositionAlreadyOpen => f.write_str("position already open"),
            EntryRejection::MaxOpenPositions(n) => write!(f, "{n} positions already open"),
            EntryRejection::Snapshot(e) => write!(f, "{e}"),
            EntryRejection::Sizing(s) => write!(f, "sizing skipped: {s:?}"),
        }
    }
}

/// Facts about the book the planner needs but does not own.
#[derive(Debug, Clone, Copy)]
pub struct BookState {
    pub equity: f64,
    pub open_positions: usize,
    pub ticker_already_open: bool,
}

pub struct EntryPlanner<'a> {
    config: &'a StrategyConfig,
}

impl<'a> EntryPlanner<'a> {
    pub fn new(config: &'a StrategyConfig) -> Self {
        Self { config }
    }

    pub fn plan(
        &self,
        scoring: &ScoringResult,
        snapshot: &IndicatorSnapshot,
        book: BookState,
        now: DateTime<Utc>,
    ) -> Result<OrderInstruction, EntryRejection> {
        let entry = &self.config.entry;
        let engine = &self.config.engine;

        if scoring.ticker != snapshot.ticker {
            return Err(EntryRejection::TickerMismatch);
        }
        if scoring.recommendation != Recommendation::Buy {
            return Err(EntryRejection::NotConfirmed(scoring.recommendation));
        }
        if scoring.stage != entry.required_stage {
            return Err(EntryRejection::WrongStage {
                stage: scoring.stage,
                required: entry.required_stage,
            });
        }
        if scoring.confidence < entry.min_confidence {
            return Err(EntryRejection::LowConfidence(scoring.confidence));
        }
        if scoring.quality_score < entry.min_quality_score {
            return Err(EntryRejection::LowQuality(scoring.quality_score));
        }
        if !scoring.is_fresh(now, engine.max_scoring_age_secs) {
            return Err(EntryRejection::StaleScoring);
        }
        if book.ticker_already_open {
            return Err(EntryRejection::PositionAlreadyOpen);
        }
        if book.open_positions >= entry.max_open_positions {
            return Err(EntryRejection::MaxOpenPositions(book.open_positions));
        }

        snapshot
            .check_freshness(now, engine.max_snapshot_age_secs)
            .map_err(EntryRejection::Snapshot)?;
        let indicators = snapshot.indicators().map_err(EntryRejection::Snapshot)?;

        let sized = PositionSizer::new(entry, &self.config.pyramiding)
            .size_leg(0, indicators.atr_pct, book.equity, 0.0, indicators.close)
            .map_err(EntryRejection::Sizing)?;

        tracing::info!(
            ticker = %snapshot.ticker,
            quantity = sized.quantity,
            size_ratio = sized.size_ratio,
            "initial entry planned"
        );
        Ok(OrderInstruction::market(
            PositionId::new(),
            snapshot.ticker.clone(),
            sized.quantity,
            OrderReason::InitialEntry,
            indicators.close,
        ))
    }
}
