//! Ratchet invariant enforcement
//!
//! **Core Rule:** A trailing stop may tighten, never loosen (even if ATR expands).
//!
//! Positions are long-only, so tightening means the stop rises.

/// Apply the ratchet to a proposed stop level.
///
/// Returns `max(current, proposed)`. A non-finite proposal leaves the
/// current level untouched.
///
/// # Example
/// ```
/// use riskpilot_core::stops::ratchet::tighten;
///
/// // Tightening: 95 → 100 (allowed)
/// assert_eq!(tighten(95.0, 100.0), 100.0);
///
/// // Loosening: 100 → 90 (blocked, stays at 100)
/// assert_eq!(tighten(100.0, 90.0), 100.0);
/// ```
pub fn tighten(current: f64, proposed: f64) -> f64 {
    if !proposed.is_finite() {
        return current;
    }
    current.max(proposed)
}
