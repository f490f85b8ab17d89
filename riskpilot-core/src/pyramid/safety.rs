//! Safety vetoes applied to every add-on.

use crate::config::SafetyConfig;
use crate::domain::Indicators;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SafetyVeto {
    Overbought { rsi: f64 },
    ExcessVolatility { atr_pct: f64 },
    Illiquid { liquidity_ratio: f64 },
}

impl fmt::Display for SafetyVeto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyVeto::Overbought { rsi } => write!(f, "overbought (RSI {rsi:.1})"),
            SafetyVeto::ExcessVolatility { atr_pct } => {
                write!(f, "excess volatility (ATR {:.2}%)", atr_pct * 100.0)
            }
            SafetyVeto::Illiquid { liquidity_ratio } => {
                write!(f, "illiquid (volume ratio {liquidity_ratio:.2})")
            }
        }
    }
}

/// First veto that applies, checked in order RSI, ATR%, liquidity.
pub fn check(ind: &Indicators, config: &SafetyConfig) -> Option<SafetyVeto> {
    if ind.rsi_14 >= config.rsi_overbought_threshold {
        return Some(SafetyVeto::Overbought { rsi: ind.rsi_14 });
    }
    if ind.atr_pct > config.max_volatility_pct {
        return Some(SafetyVeto::ExcessVolatility {
            atr_pct: ind.atr_pct,
        });
    }
    let liquidity_ratio = ind.liquidity_ratio();
    if liquidity_ratio < config.min_liquidity_ratio {
        return Some(SafetyVeto::Illiquid { liquidity_ratio });
    }
    None
}
