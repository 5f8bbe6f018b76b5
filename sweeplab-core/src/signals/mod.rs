//! Signal Evaluator — (price series, parameter set) → discrete signals.
//!
//! Two modes:
//! - **batch**: one signal per bar of the series, aligned to its dates.
//! - **live**: a single signal for the latest bar.
//!
//! Dispatch is on the `StrategyParams` variant. Every rule needs at least
//! `max(period fields) + 1` bars; shorter inputs are an explicit
//! `SignalError::InsufficientHistory`, never a fabricated signal.
//!
//! Signals never depend on account state; they are pure market timing.

pub mod cross;
pub mod rsi;

pub use cross::CrossRule;
pub use rsi::RsiRule;

use thiserror::Error;

use crate::domain::{
    Bar, LiveSignal, ParamId, ParameterSet, PriceSeries, Signal, SignalPoint, SignalSeries,
    StrategyParams,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    #[error("parameter set {param_id} needs {required} bars, only {available} available")]
    InsufficientHistory {
        param_id: ParamId,
        required: usize,
        available: usize,
    },
}

/// A strategy rule evaluated over a bar history.
///
/// # Invariants
/// - `batch()` returns exactly one signal per input bar
/// - a signal at bar t depends only on bars 0..=t
/// - callers guarantee `bars.len() >= required_history()`
pub trait SignalRule: Send + Sync {
    fn name(&self) -> &str;

    /// Minimum bars before a signal can be evaluated.
    fn required_history(&self) -> usize;

    /// Per-bar signals over the whole history.
    fn batch(&self, bars: &[Bar]) -> Vec<Signal>;

    /// Signal for the last bar of `bars`.
    fn live(&self, bars: &[Bar]) -> Signal;
}

/// Build the rule for a parameter variant.
pub fn rule_for(params: &StrategyParams) -> Box<dyn SignalRule> {
    match *params {
        StrategyParams::Rsi {
            period,
            upper,
            lower,
        } => Box::new(RsiRule::new(period, upper, lower)),
        StrategyParams::Cross {
            fast_period,
            slow_period,
        } => Box::new(CrossRule::new(fast_period, slow_period)),
    }
}

fn check_history(
    set: &ParameterSet,
    rule: &dyn SignalRule,
    series: &PriceSeries,
) -> Result<(), SignalError> {
    let required = rule.required_history();
    if series.len() < required {
        return Err(SignalError::InsufficientHistory {
            param_id: set.id.clone(),
            required,
            available: series.len(),
        });
    }
    Ok(())
}

/// Batch mode: one signal per bar, aligned to the series dates.
pub fn evaluate_batch(set: &ParameterSet, series: &PriceSeries) -> Result<SignalSeries, SignalError> {
    let rule = rule_for(&set.params);
    check_history(set, rule.as_ref(), series)?;

    let signals = rule.batch(series.bars());
    debug_assert_eq!(signals.len(), series.len());

    let points = series
        .bars()
        .iter()
        .zip(signals)
        .map(|(bar, signal)| SignalPoint {
            date: bar.date,
            signal,
            close: bar.close,
        })
        .collect();

    Ok(SignalSeries {
        param_id: set.id.clone(),
        points,
    })
}

/// Live mode: the signal for the latest bar of `series`.
pub fn evaluate_live(set: &ParameterSet, series: &PriceSeries) -> Result<LiveSignal, SignalError> {
    let rule = rule_for(&set.params);
    check_history(set, rule.as_ref(), series)?;

    // check_history guarantees at least one bar
    let bars = series.bars();
    let last = &bars[bars.len() - 1];
    Ok(LiveSignal {
        param_id: set.id.clone(),
        date: last.date,
        signal: rule.live(bars),
        price: last.close,
    })
}
