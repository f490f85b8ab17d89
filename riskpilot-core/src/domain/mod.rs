//! Domain types for the position lifecycle engine

pub mod event;
pub mod fill;
pub mod ids;
pub mod order;
pub mod position;
pub mod scoring;
pub mod snapshot;

pub use event::{EventType, PositionEvent};
pub use fill::FillReport;
pub use ids::{ClientOrderId, PositionId};
pub use order::{OrderInstruction, OrderReason, OrderSide, OrderType};
pub use position::{
    Leg, LegBook, PendingAction, PendingOrder, Position, PositionError, PositionStatus,
    RetryCounters, RetryKey, TriggerKind, QTY_EPSILON,
};
pub use scoring::{Recommendation, ScoringResult, TradeHistory};
pub use snapshot::{IndicatorSnapshot, Indicators, SnapshotError};
