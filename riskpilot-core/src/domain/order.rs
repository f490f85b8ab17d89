//! Sized order instructions handed to the execution gateway.

use super::ids::{ClientOrderId, PositionId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Only market orders are produced; the gateway decides how to work them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
}

/// Why an order was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderReason {
    InitialEntry,
    #[serde(rename = "ADDON")]
    AddOn,
    PartialProfit,
    StopLoss,
    FullExit,
}

impl OrderReason {
    pub fn side(self) -> OrderSide {
        match self {
            OrderReason::InitialEntry | OrderReason::AddOn => OrderSide::Buy,
            OrderReason::PartialProfit | OrderReason::StopLoss | OrderReason::FullExit => {
                OrderSide::Sell
            }
        }
    }
}

impl fmt::Display for OrderReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderReason::InitialEntry => "INITIAL_ENTRY",
            OrderReason::AddOn => "ADDON",
            OrderReason::PartialProfit => "PARTIAL_PROFIT",
            OrderReason::StopLoss => "STOP_LOSS",
            OrderReason::FullExit => "FULL_EXIT",
        };
        f.write_str(s)
    }
}

/// A sized instruction for the execution gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderInstruction {
    pub client_order_id: ClientOrderId,
    pub position_id: PositionId,
    pub ticker: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub order_type: OrderType,
    pub reason: OrderReason,
    /// Close of the snapshot the decision was made on.
    pub reference_price: f64,
}

impl OrderInstruction {
    /// Market order whose side follows from `reason`.
    pub fn market(
        position_id: PositionId,
        ticker: impl Into<String>,
        quantity: f64,
        reason: OrderReason,
        reference_price: f64,
    ) -> Self {
        Self {
            client_order_id: ClientOrderId::new(),
            position_id,
            ticker: ticker.into(),
            side: reason.side(),
            quantity,
            order_type: OrderType::Market,
            reason,
            reference_price,
        }
    }

    pub fn notional(&self) -> f64 {
        self.quantity * self.reference_price
    }
}
