//! Observability events emitted by the lifecycle controller.

use super::ids::PositionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Opened,
    LegAdded,
    StopModeChanged,
    StopRaised,
    StopTriggered,
    ProfitLevelTriggered,
    PartialExitFilled,
    Closed,
    OrderEmitted,
    OrderRejected,
    RetryLimitReached,
    TickSkipped,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Opened => "OPENED",
            EventType::LegAdded => "LEG_ADDED",
            EventType::StopModeChanged => "STOP_MODE_CHANGED",
            EventType::StopRaised => "STOP_RAISED",
            EventType::StopTriggered => "STOP_TRIGGERED",
            EventType::ProfitLevelTriggered => "PROFIT_LEVEL_TRIGGERED",
            EventType::PartialExitFilled => "PARTIAL_EXIT_FILLED",
            EventType::Closed => "CLOSED",
            EventType::OrderEmitted => "ORDER_EMITTED",
            EventType::OrderRejected => "ORDER_REJECTED",
            EventType::RetryLimitReached => "RETRY_LIMIT_REACHED",
            EventType::TickSkipped => "TICK_SKIPPED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEvent {
    pub position_id: PositionId,
    pub ticker: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub detail: String,
}

impl PositionEvent {
    pub fn new(
        position_id: PositionId,
        ticker: impl Into<String>,
        event_type: EventType,
        timestamp: DateTime<Utc>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            position_id,
            ticker: ticker.into(),
            event_type,
            timestamp,
            detail: detail.into(),
        }
    }
}
