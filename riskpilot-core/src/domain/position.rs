//! Position, its legs, and the orders it is waiting on.

use super::fill::FillReport;
use super::ids::{ClientOrderId, PositionId};
use super::order::{OrderInstruction, OrderReason, OrderSide};
use crate::config::StrategyConfig;
use crate::profit::ProfitPlan;
use crate::stops::StopState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Quantities below this are treated as zero.
pub const QTY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PositionError {
    #[error("leg capacity of {capacity} reached")]
    LegCapacityExceeded { capacity: usize },

    #[error("invalid fill: {0}")]
    InvalidFill(String),

    #[error("position is already closed")]
    AlreadyClosed,

    #[error("order reason {0} cannot open a position")]
    NotAnEntry(OrderReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Open,
    PartiallyClosed,
    Closed,
}

/// What caused a leg to be added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerKind {
    Initial,
    ConditionA,
    ConditionB,
}

/// One filled buy contributing to the position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub index: usize,
    pub fill_price: f64,
    pub quantity: f64,
    /// Fraction of portfolio equity committed by this leg.
    pub size_ratio: f64,
    pub trigger_kind: TriggerKind,
    pub filled_at: DateTime<Utc>,
}

/// Owned, capacity-bounded sequence of legs (`max_add_ons + 1`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegBook {
    legs: Vec<Leg>,
    capacity: usize,
}

impl LegBook {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            legs: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn try_push(&mut self, leg: Leg) -> Result<(), PositionError> {
        if self.legs.len() >= self.capacity {
            return Err(PositionError::LegCapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.legs.push(leg);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.legs.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn first(&self) -> Option<&Leg> {
        self.legs.first()
    }

    pub fn last(&self) -> Option<&Leg> {
        self.legs.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Leg> {
        self.legs.iter()
    }

    /// Quantity-weighted average fill price over all legs.
    pub fn weighted_average_price(&self) -> f64 {
        let qty: f64 = self.legs.iter().map(|l| l.quantity).sum();
        if qty <= 0.0 {
            return 0.0;
        }
        self.legs.iter().map(|l| l.fill_price * l.quantity).sum::<f64>() / qty
    }

    /// Cumulative fraction of equity committed across all legs.
    pub fn committed_pct(&self) -> f64 {
        self.legs.iter().map(|l| l.size_ratio).sum()
    }
}

/// The action an outstanding order performs once filled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PendingAction {
    AddOn {
        trigger: TriggerKind,
        /// Equity fraction the full order quantity commits.
        size_ratio: f64,
    },
    ProfitLevel {
        level: usize,
    },
    StopExit,
    OperatorExit,
}

impl PendingAction {
    pub fn retry_key(&self) -> RetryKey {
        match self {
            PendingAction::AddOn { .. } => RetryKey::AddOn,
            PendingAction::ProfitLevel { .. } => RetryKey::ProfitTaking,
            PendingAction::StopExit | PendingAction::OperatorExit => RetryKey::ProtectiveExit,
        }
    }
}

/// An emitted order with no fill or rejection yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub client_order_id: ClientOrderId,
    pub reason: OrderReason,
    pub side: OrderSide,
    pub quantity: f64,
    pub action: PendingAction,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryKey {
    AddOn,
    ProfitTaking,
    ProtectiveExit,
}

/// Consecutive rejections per action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryCounters {
    pub add_on: u32,
    pub profit_taking: u32,
    pub protective_exit: u32,
}

impl RetryCounters {
    pub fn get(&self, key: RetryKey) -> u32 {
        match key {
            RetryKey::AddOn => self.add_on,
            RetryKey::ProfitTaking => self.profit_taking,
            RetryKey::ProtectiveExit => self.protective_exit,
        }
    }

    fn slot(&mut self, key: RetryKey) -> &mut u32 {
        match key {
            RetryKey::AddOn => &mut self.add_on,
            RetryKey::ProfitTaking => &mut self.profit_taking,
            RetryKey::ProtectiveExit => &mut self.protective_exit,
        }
    }

    /// Record a rejection and return the new count.
    pub fn record_rejection(&mut self, key: RetryKey) -> u32 {
        let slot = self.slot(key);
        *slot = slot.saturating_add(1);
        *slot
    }

    pub fn reset(&mut self, key: RetryKey) {
        *self.slot(key) = 0;
    }
}

/// A managed long position.
///
/// Legs, quantity and realized P&L change only through confirmed fills.
/// Stop state, profit plan and pending orders are owned here so a single
/// worker holds the whole lifecycle of one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub ticker: String,
    pub opened_at: DateTime<Utc>,
    pub status: PositionStatus,
    pub average_entry_price: f64,
    pub total_quantity: f64,
    pub legs: LegBook,
    pub stop: StopState,
    pub profit_plan: ProfitPlan,
    #[serde(default)]
    pub pending: Vec<PendingOrder>,
    #[serde(default)]
    pub retries: RetryCounters,
    #[serde(default)]
    pub realized_pnl: f64,
    #[serde(default)]
    pub fees_paid: f64,
    /// Timestamp of the last snapshot fully evaluated.
    #[serde(default)]
    pub last_tick_at: Option<DateTime<Utc>>,
}

impl Position {
    /// Create a position from the confirmed fill of an INITIAL_ENTRY order.
    pub fn open_from_fill(
        instruction: &OrderInstruction,
        fill: &FillReport,
        equity: f64,
        config: &StrategyConfig,
    ) -> Result<Self, PositionError> {
        if instruction.reason != OrderReason::InitialEntry {
            return Err(PositionError::NotAnEntry(instruction.reason));
        }
        if !fill.is_valid() {
            return Err(PositionError::InvalidFill(format!(
                "price {} quantity {} fee {}",
                fill.price, fill.quantity, fill.fee
            )));
        }
        if !(equity.is_finite() && equity > 0.0) {
            return Err(PositionError::InvalidFill(format!("equity {equity}")));
        }

        let mut legs = LegBook::with_capacity(config.pyramiding.max_legs());
        legs.try_push(Leg {
            index: 0,
            fill_price: fill.price,
            quantity: fill.quantity,
            size_ratio: fill.notional() / equity,
            trigger_kind: TriggerKind::Initial,
            filled_at: fill.filled_at,
        })?;

        let stop_pct = config.pyramiding.exit_management.stop_loss_from_avg;
        Ok(Self {
            id: instruction.position_id,
            ticker: instruction.ticker.clone(),
            opened_at: fill.filled_at,
            status: PositionStatus::Open,
            average_entry_price: fill.price,
            total_quantity: fill.quantity,
            legs,
            stop: StopState::fixed(fill.price * (1.0 - stop_pct), fill.filled_at),
            profit_plan: ProfitPlan::from_config(&config.pyramiding.exit_management),
            pending: Vec::new(),
            retries: RetryCounters::default(),
            realized_pnl: -fill.fee,
            fees_paid: fill.fee,
            last_tick_at: None,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.status == PositionStatus::Closed
    }

    /// Price that stops and profit levels are measured from.
    pub fn reference_price(&self, use_average_entry_price: bool) -> f64 {
        if use_average_entry_price {
            return self.average_entry_price;
        }
        self.legs
            .first()
            .map(|l| l.fill_price)
            .unwrap_or(self.average_entry_price)
    }

    pub fn unrealized_gain_pct(&self, price: f64, use_average_entry_price: bool) -> f64 {
        let reference = self.reference_price(use_average_entry_price);
        if reference <= 0.0 {
            return 0.0;
        }
        (price - reference) / reference
    }

    /// Whole days elapsed since the position opened.
    pub fn holding_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.opened_at).num_days().max(0)
    }

    pub fn committed_pct(&self) -> f64 {
        self.legs.committed_pct()
    }

    pub fn has_pending(&self, predicate: impl Fn(&PendingAction) -> bool) -> bool {
        self.pending.iter().any(|p| predicate(&p.action))
    }

    /// Quantity already covered by outstanding sell orders.
    pub fn pending_sell_quantity(&self) -> f64 {
        self.pending
            .iter()
            .filter(|p| p.side == OrderSide::Sell)
            .map(|p| p.quantity)
            .sum()
    }

    /// Quantity not yet spoken for by outstanding sells.
    pub fn unencumbered_quantity(&self) -> f64 {
        (self.total_quantity - self.pending_sell_quantity()).max(0.0)
    }

    pub(crate) fn take_pending(&mut self, id: ClientOrderId) -> Option<PendingOrder> {
        let idx = self.pending.iter().position(|p| p.client_order_id == id)?;
        Some(self.pending.remove(idx))
    }

    /// Append an add-on leg and recompute the weighted average entry.
    pub(crate) fn add_leg(&mut self, leg: Leg, fee: f64) -> Result<(), PositionError> {
        if self.is_closed() {
            return Err(PositionError::AlreadyClosed);
        }
        let quantity = leg.quantity;
        self.legs.try_push(leg)?;
        self.average_entry_price = self.legs.weighted_average_price();
        self.total_quantity += quantity;
        self.fees_paid += fee;
        self.realized_pnl -= fee;
        Ok(())
    }

    /// Reduce quantity by a confirmed sell; returns the quantity actually sold.
    ///
    /// Fills larger than the open quantity are clamped.
    pub(crate) fn reduce(&mut self, quantity: f64, price: f64, fee: f64) -> Result<f64, PositionError> {
        if self.is_closed() {
            return Err(PositionError::AlreadyClosed);
        }
        let sold = quantity.min(self.total_quantity);
        self.realized_pnl += (price - self.average_entry_price) * sold - fee;
        self.fees_paid += fee;
        self.total_quantity -= sold;
        if self.total_quantity < QTY_EPSILON {
            self.total_quantity = 0.0;
            self.status = PositionStatus::Closed;
        } else {
            self.status = PositionStatus::PartiallyClosed;
        }
        Ok(sold)
    }
}
