//! Strategy configuration — one validated, immutable value loaded once.
//!
//! The TOML surface has four sections:
//! - `[pyramiding]` — add-on triggers, safety gates, sizing decay, exit levels
//! - `[trailing_stop]` — trailing activation, distance shaping, strong-uptrend guard,
//!   edge-based dynamic stop
//! - `[entry]` — initial allocation and eligibility thresholds for new positions
//! - `[engine]` — cadence, timeouts and retry budget for the runner
//!
//! All percentages are fractions (`0.08` = 8%). Every section carries
//! `#[serde(default)]`, so a partial file overrides only what it names.
//! [`StrategyConfig::from_toml`] always validates; a config that fails
//! validation never reaches the engine.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading a configuration. All are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn check_fraction(field: &'static str, value: f64, allow_zero: bool) -> Result<(), ConfigError> {
    let lower_ok = if allow_zero { value >= 0.0 } else { value > 0.0 };
    if !value.is_finite() || !lower_ok || value > 1.0 {
        let bound = if allow_zero { "[0, 1]" } else { "(0, 1]" };
        return Err(invalid(field, format!("{value} is outside {bound}")));
    }
    Ok(())
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(field, format!("{value} must be > 0")));
    }
    Ok(())
}

// ─── Top level ───────────────────────────────────────────────────────

/// Complete engine configuration.
///
/// Shared as `Arc<StrategyConfig>`; a reload builds a new value and swaps the
/// `Arc`, it never mutates one in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub pyramiding: PyramidConfig,
    pub trailing_stop: TrailingStopConfig,
    pub entry: EntryConfig,
    pub engine: EngineConfig,
}

impl StrategyConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: StrategyConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Render the config as TOML (used by `init-config`).
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Content hash of the canonical JSON form.
    ///
    /// Two configs with identical values always share a fingerprint, so logs
    /// can tell which config generation produced a decision.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex()[..16].to_string()
    }

    /// Check every section and the cross-section constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pyramiding.validate()?;
        self.trailing_stop.validate()?;
        self.entry.validate()?;
        self.engine.validate()?;

        if self.entry.initial_position_pct > self.pyramiding.max_total_position_pct {
            return Err(invalid(
                "entry.initial_position_pct",
                format!(
                    "{} exceeds pyramiding.max_total_position_pct {}",
                    self.entry.initial_position_pct, self.pyramiding.max_total_position_pct
                ),
            ));
        }
        Ok(())
    }
}

// ─── Pyramiding ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PyramidConfig {
    pub enabled: bool,
    /// Maximum number of add-on legs after the initial entry.
    pub max_add_ons: usize,
    /// First add-on size relative to the initial leg.
    pub add_on_ratio: f64,
    /// Spacing gate: minimum rise since the last filled leg.
    pub pyramid_threshold_pct: f64,
    /// Cap on cumulative committed size as a fraction of portfolio equity.
    pub max_total_position_pct: f64,
    pub condition_a: ConditionAConfig,
    pub condition_b: ConditionBConfig,
    pub safety: SafetyConfig,
    pub risk_management: RiskManagementConfig,
    pub exit_management: ExitManagementConfig,
}

impl Default for PyramidConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_add_ons: 3,
            add_on_ratio: 0.5,
            pyramid_threshold_pct: 0.05,
            max_total_position_pct: 0.08,
            condition_a: ConditionAConfig::default(),
            condition_b: ConditionBConfig::default(),
            safety: SafetyConfig::default(),
            risk_management: RiskManagementConfig::default(),
            exit_management: ExitManagementConfig::default(),
        }
    }
}

impl PyramidConfig {
    /// Leg capacity of a position: the initial leg plus every add-on.
    pub fn max_legs(&self) -> usize {
        self.max_add_ons + 1
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_fraction("pyramiding.add_on_ratio", self.add_on_ratio, false)?;
        if !(self.pyramid_threshold_pct >= 0.0) {
            return Err(invalid(
                "pyramiding.pyramid_threshold_pct",
                "must be >= 0",
            ));
        }
        check_fraction(
            "pyramiding.max_total_position_pct",
            self.max_total_position_pct,
            false,
        )?;
        self.condition_a.validate()?;
        self.condition_b.validate()?;
        self.safety.validate()?;
        self.risk_management.validate()?;
        self.exit_management.validate()
    }
}

/// Condition A: breakout above the rolling high on surging volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionAConfig {
    pub enabled: bool,
    pub high_breakout_pct: f64,
    pub volume_surge_ratio: f64,
    /// Window the snapshot's rolling high/volume were computed over.
    pub lookback_days: u32,
}

impl Default for ConditionAConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            high_breakout_pct: 0.01,
            volume_surge_ratio: 1.3,
            lookback_days: 20,
        }
    }
}

impl ConditionAConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.high_breakout_pct >= 0.0) {
            return Err(invalid("pyramiding.condition_a.high_breakout_pct", "must be >= 0"));
        }
        check_positive(
            "pyramiding.condition_a.volume_surge_ratio",
            self.volume_surge_ratio,
        )
    }
}

/// Condition B: trend-following indicator combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionBConfig {
    pub enabled: bool,
    pub trend_signal_required: bool,
    pub adx_threshold: f64,
    pub ma20_rising_required: bool,
    /// Required advance over the last leg's fill price.
    pub price_advance_pct: f64,
}

impl Default for ConditionBConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trend_signal_required: true,
            adx_threshold: 25.0,
            ma20_rising_required: true,
            price_advance_pct: 0.05,
        }
    }
}

impl ConditionBConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.adx_threshold) {
            return Err(invalid(
                "pyramiding.condition_b.adx_threshold",
                format!("{} is outside [0, 100]", self.adx_threshold),
            ));
        }
        if !(self.price_advance_pct >= 0.0) {
            return Err(invalid("pyramiding.condition_b.price_advance_pct", "must be >= 0"));
        }
        Ok(())
    }
}

/// Vetoes applied to every add-on regardless of trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub rsi_overbought_threshold: f64,
    pub max_volatility_pct: f64,
    pub min_liquidity_ratio: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            rsi_overbought_threshold: 75.0,
            max_volatility_pct: 0.10,
            min_liquidity_ratio: 1.0,
        }
    }
}

impl SafetyConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.rsi_overbought_threshold > 0.0 && self.rsi_overbought_threshold <= 100.0) {
            return Err(invalid(
                "pyramiding.safety.rsi_overbought_threshold",
                format!("{} is outside (0, 100]", self.rsi_overbought_threshold),
            ));
        }
        check_fraction("pyramiding.safety.max_volatility_pct", self.max_volatility_pct, false)?;
        if !(self.min_liquidity_ratio >= 0.0) {
            return Err(invalid("pyramiding.safety.min_liquidity_ratio", "must be >= 0"));
        }
        Ok(())
    }
}

/// Size shaping: per-leg decay and ATR-driven volatility reduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskManagementConfig {
    pub volatility_adjustment: bool,
    /// Largest reduction the volatility adjustment may apply.
    pub max_volatility_reduction_pct: f64,
    /// Shrink factor applied per add-on beyond the first.
    pub size_decay_factor: f64,
    /// Upper edge of the normal ATR% range; no reduction at or below it.
    pub normal_atr_pct: f64,
    /// ATR% at which the full reduction applies.
    pub atr_pct_ceiling: f64,
}

impl Default for RiskManagementConfig {
    fn default() -> Self {
        Self {
            volatility_adjustment: true,
            max_volatility_reduction_pct: 0.30,
            size_decay_factor: 0.3,
            normal_atr_pct: 0.03,
            atr_pct_ceiling: 0.10,
        }
    }
}

impl RiskManagementConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.max_volatility_reduction_pct) {
            return Err(invalid(
                "pyramiding.risk_management.max_volatility_reduction_pct",
                format!("{} is outside [0, 1)", self.max_volatility_reduction_pct),
            ));
        }
        if !(0.0..1.0).contains(&self.size_decay_factor) {
            return Err(invalid(
                "pyramiding.risk_management.size_decay_factor",
                format!("{} is outside [0, 1)", self.size_decay_factor),
            ));
        }
        check_fraction(
            "pyramiding.risk_management.normal_atr_pct",
            self.normal_atr_pct,
            true,
        )?;
        check_fraction(
            "pyramiding.risk_management.atr_pct_ceiling",
            self.atr_pct_ceiling,
            false,
        )?;
        if self.normal_atr_pct >= self.atr_pct_ceiling {
            return Err(invalid(
                "pyramiding.risk_management.normal_atr_pct",
                format!(
                    "{} must be below atr_pct_ceiling {}",
                    self.normal_atr_pct, self.atr_pct_ceiling
                ),
            ));
        }
        Ok(())
    }
}

/// Exit levels measured against the position's reference price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitManagementConfig {
    /// Measure stops and profit levels from the average entry price
    /// (otherwise from the initial leg's fill price).
    pub use_average_entry_price: bool,
    pub trailing_stop_enabled: bool,
    pub profit_taking_levels: Vec<f64>,
    pub profit_taking_ratios: Vec<f64>,
    /// FIXED stop distance below the reference price.
    pub stop_loss_from_avg: f64,
}

impl Default for ExitManagementConfig {
    fn default() -> Self {
        Self {
            use_average_entry_price: true,
            trailing_stop_enabled: true,
            profit_taking_levels: vec![0.06, 0.12, 0.20],
            profit_taking_ratios: vec![0.3, 0.4, 0.3],
            stop_loss_from_avg: 0.08,
        }
    }
}

impl ExitManagementConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.profit_taking_levels.is_empty() {
            return Err(invalid(
                "pyramiding.exit_management.profit_taking_levels",
                "at least one level is required",
            ));
        }
        if self.profit_taking_levels.len() != self.profit_taking_ratios.len() {
            return Err(invalid(
                "pyramiding.exit_management.profit_taking_ratios",
                format!(
                    "{} ratios for {} levels",
                    self.profit_taking_ratios.len(),
                    self.profit_taking_levels.len()
                ),
            ));
        }
        for &level in &self.profit_taking_levels {
            check_positive("pyramiding.exit_management.profit_taking_levels", level)?;
        }
        if self.profit_taking_levels.windows(2).any(|w| w[1] <= w[0]) {
            return Err(invalid(
                "pyramiding.exit_management.profit_taking_levels",
                "levels must be strictly increasing",
            ));
        }
        for &ratio in &self.profit_taking_ratios {
            check_fraction("pyramiding.exit_management.profit_taking_ratios", ratio, false)?;
        }
        let total: f64 = self.profit_taking_ratios.iter().sum();
        if total > 1.0 + 1e-9 {
            return Err(invalid(
                "pyramiding.exit_management.profit_taking_ratios",
                format!("ratios sum to {total}, more than the whole position"),
            ));
        }
        if !(self.stop_loss_from_avg > 0.0 && self.stop_loss_from_avg < 1.0) {
            return Err(invalid(
                "pyramiding.exit_management.stop_loss_from_avg",
                format!("{} is outside (0, 1)", self.stop_loss_from_avg),
            ));
        }
        Ok(())
    }
}

// ─── Trailing stop ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailingStopConfig {
    pub enabled: bool,
    /// Unrealized gain required before trailing activates.
    pub min_rise_pct: f64,
    pub min_holding_days: i64,
    pub min_trailing_pct: f64,
    pub max_trailing_pct: f64,
    /// Ascending by `max_days`; the first bucket containing the holding period wins.
    pub holding_adjustments: Vec<HoldingAdjustment>,
    pub volatility_multipliers: VolatilityMultipliers,
    pub volatility_regimes: VolatilityRegimes,
    pub strong_uptrend_disable: bool,
    pub strong_uptrend_conditions: StrongUptrendConditions,
    pub edge_stop_loss: EdgeStopConfig,
    /// Also require rising recent closes before trailing activates.
    pub recent_trend_check: bool,
    pub recent_trend_check_days: usize,
    /// Share of the last `recent_trend_check_days` closes that must be up moves.
    pub recent_trend_min_up_ratio: f64,
}

impl Default for TrailingStopConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_rise_pct: 0.08,
            min_holding_days: 3,
            min_trailing_pct: 0.03,
            max_trailing_pct: 0.10,
            holding_adjustments: vec![
                HoldingAdjustment { max_days: 3, factor: 2.0 },
                HoldingAdjustment { max_days: 7, factor: 1.5 },
                HoldingAdjustment { max_days: 14, factor: 1.2 },
            ],
            volatility_multipliers: VolatilityMultipliers::default(),
            volatility_regimes: VolatilityRegimes::default(),
            strong_uptrend_disable: true,
            strong_uptrend_conditions: StrongUptrendConditions::default(),
            edge_stop_loss: EdgeStopConfig::default(),
            recent_trend_check: false,
            recent_trend_check_days: 3,
            recent_trend_min_up_ratio: 0.6,
        }
    }
}

impl TrailingStopConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_fraction("trailing_stop.min_rise_pct", self.min_rise_pct, true)?;
        if self.min_holding_days < 0 {
            return Err(invalid("trailing_stop.min_holding_days", "must be >= 0"));
        }
        check_fraction("trailing_stop.min_trailing_pct", self.min_trailing_pct, false)?;
        check_fraction("trailing_stop.max_trailing_pct", self.max_trailing_pct, false)?;
        if self.min_trailing_pct > self.max_trailing_pct {
            return Err(invalid(
                "trailing_stop.min_trailing_pct",
                format!(
                    "{} exceeds max_trailing_pct {}",
                    self.min_trailing_pct, self.max_trailing_pct
                ),
            ));
        }
        if self.max_trailing_pct >= 1.0 {
            return Err(invalid("trailing_stop.max_trailing_pct", "must be below 1.0"));
        }
        for adj in &self.holding_adjustments {
            check_positive("trailing_stop.holding_adjustments.factor", adj.factor)?;
        }
        if self
            .holding_adjustments
            .windows(2)
            .any(|w| w[1].max_days <= w[0].max_days)
        {
            return Err(invalid(
                "trailing_stop.holding_adjustments",
                "max_days must be strictly increasing",
            ));
        }
        self.volatility_multipliers.validate()?;
        self.volatility_regimes.validate()?;
        self.strong_uptrend_conditions.validate()?;
        if self.recent_trend_check_days < 2 {
            return Err(invalid("trailing_stop.recent_trend_check_days", "must be >= 2"));
        }
        check_fraction(
            "trailing_stop.recent_trend_min_up_ratio",
            self.recent_trend_min_up_ratio,
            false,
        )?;
        self.edge_stop_loss.validate()
    }
}

/// Relaxation of the trailing distance for positions held up to `max_days`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoldingAdjustment {
    pub max_days: i64,
    pub factor: f64,
}

/// ATR% multipliers per volatility regime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityMultipliers {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for VolatilityMultipliers {
    fn default() -> Self {
        Self {
            high: 1.5,
            medium: 2.0,
            low: 2.5,
        }
    }
}

impl VolatilityMultipliers {
    fn validate(&self) -> Result<(), ConfigError> {
        check_positive("trailing_stop.volatility_multipliers.high", self.high)?;
        check_positive("trailing_stop.volatility_multipliers.medium", self.medium)?;
        check_positive("trailing_stop.volatility_multipliers.low", self.low)
    }
}

/// ATR% boundaries between volatility regimes (strictly above = that regime).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityRegimes {
    pub high_atr_pct: f64,
    pub medium_atr_pct: f64,
}

impl Default for VolatilityRegimes {
    fn default() -> Self {
        Self {
            high_atr_pct: 0.05,
            medium_atr_pct: 0.03,
        }
    }
}

impl VolatilityRegimes {
    fn validate(&self) -> Result<(), ConfigError> {
        check_fraction("trailing_stop.volatility_regimes.medium_atr_pct", self.medium_atr_pct, true)?;
        check_fraction("trailing_stop.volatility_regimes.high_atr_pct", self.high_atr_pct, false)?;
        if self.medium_atr_pct >= self.high_atr_pct {
            return Err(invalid(
                "trailing_stop.volatility_regimes.medium_atr_pct",
                "must be below high_atr_pct",
            ));
        }
        Ok(())
    }
}

/// All conditions must hold for the strong-uptrend guard to suspend trailing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrongUptrendConditions {
    pub rsi_min: f64,
    pub rsi_max: f64,
    /// Minimum distance of price above MA20.
    pub ma20_rise_pct: f64,
    pub momentum_positive: bool,
    pub min_profit_pct: f64,
}

impl Default for StrongUptrendConditions {
    fn default() -> Self {
        Self {
            rsi_min: 60.0,
            rsi_max: 80.0,
            ma20_rise_pct: 0.02,
            momentum_positive: true,
            min_profit_pct: 0.10,
        }
    }
}

impl StrongUptrendConditions {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.rsi_min) || !(0.0..=100.0).contains(&self.rsi_max) {
            return Err(invalid(
                "trailing_stop.strong_uptrend_conditions.rsi_min",
                "RSI bounds must lie in [0, 100]",
            ));
        }
        if self.rsi_min > self.rsi_max {
            return Err(invalid(
                "trailing_stop.strong_uptrend_conditions.rsi_min",
                format!("{} exceeds rsi_max {}", self.rsi_min, self.rsi_max),
            ));
        }
        Ok(())
    }
}

/// Edge-based (Kelly) dynamic stop-loss.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeStopConfig {
    pub enabled: bool,
    pub min_holding_days: i64,
    pub min_win_rate: f64,
    pub min_edge_ratio: f64,
    pub min_stop_loss_pct: f64,
    pub max_stop_loss_pct: f64,
    pub atr_multiplier: f64,
    /// Unrealized gain the position needs before the edge stop replaces FIXED.
    pub profit_threshold_pct: f64,
}

impl Default for EdgeStopConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_holding_days: 3,
            min_win_rate: 0.4,
            min_edge_ratio: 0.05,
            min_stop_loss_pct: 0.05,
            max_stop_loss_pct: 0.15,
            atr_multiplier: 2.0,
            profit_threshold_pct: 0.05,
        }
    }
}

impl EdgeStopConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_fraction("trailing_stop.edge_stop_loss.min_win_rate", self.min_win_rate, true)?;
        check_fraction("trailing_stop.edge_stop_loss.min_edge_ratio", self.min_edge_ratio, true)?;
        check_fraction(
            "trailing_stop.edge_stop_loss.min_stop_loss_pct",
            self.min_stop_loss_pct,
            false,
        )?;
        check_fraction(
            "trailing_stop.edge_stop_loss.max_stop_loss_pct",
            self.max_stop_loss_pct,
            false,
        )?;
        if self.min_stop_loss_pct > self.max_stop_loss_pct {
            return Err(invalid(
                "trailing_stop.edge_stop_loss.min_stop_loss_pct",
                format!(
                    "{} exceeds max_stop_loss_pct {}",
                    self.min_stop_loss_pct, self.max_stop_loss_pct
                ),
            ));
        }
        if self.max_stop_loss_pct >= 1.0 {
            return Err(invalid(
                "trailing_stop.edge_stop_loss.max_stop_loss_pct",
                "must be below 1.0",
            ));
        }
        check_fraction(
            "trailing_stop.edge_stop_loss.profit_threshold_pct",
            self.profit_threshold_pct,
            true,
        )?;
        check_positive("trailing_stop.edge_stop_loss.atr_multiplier", self.atr_multiplier)
    }
}

// ─── Entry ───────────────────────────────────────────────────────────

/// Thresholds for opening a new position from a scoring confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryConfig {
    /// Capital allocation of the initial leg as a fraction of equity.
    pub initial_position_pct: f64,
    /// Market stage a candidate must be classified in (2 = confirmed uptrend).
    pub required_stage: u8,
    pub min_quality_score: f64,
    pub min_confidence: f64,
    /// Orders below this notional are not placed. 0 disables the check.
    pub min_order_notional: f64,
    pub max_open_positions: usize,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            initial_position_pct: 0.02,
            required_stage: 2,
            min_quality_score: 0.0,
            min_confidence: 0.0,
            min_order_notional: 0.0,
            max_open_positions: 8,
        }
    }
}

impl EntryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_fraction("entry.initial_position_pct", self.initial_position_pct, false)?;
        check_fraction("entry.min_confidence", self.min_confidence, true)?;
        if !(self.min_order_notional >= 0.0) {
            return Err(invalid("entry.min_order_notional", "must be >= 0"));
        }
        if self.max_open_positions == 0 {
            return Err(invalid("entry.max_open_positions", "must be >= 1"));
        }
        Ok(())
    }
}

// ─── Engine ──────────────────────────────────────────────────────────

/// Runtime cadence and robustness knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_interval_secs: u64,
    pub fetch_timeout_ms: u64,
    pub order_timeout_ms: u64,
    /// Rejections tolerated per action before an alert is raised.
    pub max_order_retries: u32,
    /// Snapshots older than this are treated as missing data.
    pub max_snapshot_age_secs: i64,
    /// Scoring confirmations older than this cannot open a position.
    pub max_scoring_age_secs: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            fetch_timeout_ms: 5_000,
            order_timeout_ms: 10_000,
            max_order_retries: 3,
            max_snapshot_age_secs: 2 * 24 * 60 * 60,
            max_scoring_age_secs: 24 * 60 * 60,
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_secs == 0 {
            return Err(invalid("engine.tick_interval_secs", "must be >= 1"));
        }
        if self.fetch_timeout_ms == 0 || self.order_timeout_ms == 0 {
            return Err(invalid("engine.fetch_timeout_ms", "timeouts must be >= 1 ms"));
        }
        if self.max_snapshot_age_secs <= 0 || self.max_scoring_age_secs <= 0 {
            return Err(invalid("engine.max_snapshot_age_secs", "ages must be > 0"));
        }
        Ok(())
    }
}
