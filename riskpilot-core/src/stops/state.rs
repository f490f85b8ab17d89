use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stop mode with its mode-specific payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopMode {
    /// Stop sits a fixed distance below the reference price.
    Fixed,
    /// Edge-based stop; `stop_pct` below the reference price.
    EdgeDynamic { stop_pct: f64 },
    /// Ratcheting trailing stop at `trailing_pct` below the latest close.
    TrailingActive {
        activation_price: f64,
        trailing_pct: f64,
    },
    /// Trailing suspended by the strong-uptrend guard; stop frozen.
    DisabledStrongUptrend { activation_price: f64 },
    /// Terminal: the stop was breached.
    Closed { breach_price: f64 },
}

impl StopMode {
    pub fn name(&self) -> &'static str {
        match self {
            StopMode::Fixed => "FIXED",
            StopMode::EdgeDynamic { .. } => "EDGE_DYNAMIC",
            StopMode::TrailingActive { .. } => "TRAILING_ACTIVE",
            StopMode::DisabledStrongUptrend { .. } => "DISABLED_STRONG_UPTREND",
            StopMode::Closed { .. } => "CLOSED",
        }
    }

    /// Trailing has activated at least once (active or suspended).
    pub fn is_trailing_armed(&self) -> bool {
        matches!(
            self,
            StopMode::TrailingActive { .. } | StopMode::DisabledStrongUptrend { .. }
        )
    }

    pub fn trailing_activation_price(&self) -> Option<f64> {
        match *self {
            StopMode::TrailingActive {
                activation_price, ..
            }
            | StopMode::DisabledStrongUptrend { activation_price } => Some(activation_price),
            _ => None,
        }
    }

    pub fn same_kind(&self, other: &StopMode) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for StopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Protective stop of one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopState {
    pub current_stop_price: f64,
    pub mode: StopMode,
    pub last_updated_at: DateTime<Utc>,
}

impl StopState {
    pub fn fixed(stop_price: f64, at: DateTime<Utc>) -> Self {
        Self {
            current_stop_price: stop_price,
            mode: StopMode::Fixed,
            last_updated_at: at,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.mode, StopMode::Closed { .. })
    }

    pub fn is_breached_by(&self, price: f64) -> bool {
        price <= self.current_stop_price
    }
}
