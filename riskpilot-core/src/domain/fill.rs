use crate::domain::ids::ClientOrderId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Confirmed execution of an [`OrderInstruction`](super::OrderInstruction).
///
/// The only input that changes legs, quantity or realized P&L.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillReport {
    pub client_order_id: ClientOrderId,
    pub price: f64,
    pub quantity: f64,
    pub fee: f64,
    pub filled_at: DateTime<Utc>,
}

impl FillReport {
    pub fn is_valid(&self) -> bool {
        self.price.is_finite()
            && self.price > 0.0
            && self.quantity.is_finite()
            && self.quantity > 0.0
            && self.fee.is_finite()
            && self.fee >= 0.0
    }

    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }
}
