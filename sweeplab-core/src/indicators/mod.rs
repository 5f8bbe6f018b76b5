//! Indicators used by the strategy kinds.
//!
//! Indicators are pure functions: bar history in, numeric series out, same
//! length as the input. Warmup positions are `f64::NAN`.

pub mod rsi;
pub mod sma;

pub use rsi::Rsi;
pub use sma::Sma;

use crate::domain::Bar;

/// Trait for indicators.
///
/// No value at bar t may depend on bars after t; the first `lookback()`
/// values are `f64::NAN`.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "sma_20", "rsi_14").
    fn name(&self) -> &str;

    /// Number of bars needed before the indicator produces valid output.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire bar series.
    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

/// Create synthetic bars from close prices for testing.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    crate::domain::bar::make_series(closes).bars().to_vec()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

#[cfg(test)]
mod tests {
    use super::*;

    /// Truncating the input must not change any earlier value.
    #[test]
    fn indicators_have_no_lookahead() {
        let closes = [
            100.0, 102.0, 101.0, 99.0, 104.0, 108.0, 103.0, 101.0, 107.0, 110.0, 106.0, 111.0,
        ];
        let full = make_bars(&closes);
        let indicators: Vec<Box<dyn Indicator>> = vec![Box::new(Sma::new(3)), Box::new(Rsi::new(4))];
        for indicator in &indicators {
            let whole = indicator.compute(&full);
            for cut in 1..full.len() {
                let partial = indicator.compute(&full[..cut]);
                for (i, v) in partial.iter().enumerate() {
                    assert!(
                        (v.is_nan() && whole[i].is_nan()) || (v - whole[i]).abs() < DEFAULT_EPSILON,
                        "{} differs at {i} when truncated to {cut}",
                        indicator.name()
                    );
                }
            }
        }
    }
}
