//! Live decisions — one signal per selected parameter set for the simulated day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sweeplab_core::domain::{ParamId, ParameterSet, PriceSeries, Signal, StrategyKind};
use sweeplab_core::signals::{evaluate_live, SignalError};

pub const DEFAULT_LIVE_WINDOW: usize = 30;

/// One row of the trade decision table, consumed by the account simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeDecision {
    pub date: NaiveDate,
    pub symbol: String,
    pub strategy: StrategyKind,
    pub param_id: ParamId,
    pub signal: Signal,
    pub price: f64,
}

/// Bars needed to evaluate `sets` live: the configured window, widened to
/// the longest history any set requires.
pub fn trailing_window(sets: &[ParameterSet], window: usize) -> usize {
    sets.iter()
        .map(|s| s.params.required_history())
        .max()
        .map_or(window, |required| required.max(window))
}

/// Evaluate `set` on the trailing `series` and stamp the decision with `date`.
pub fn decide(
    set: &ParameterSet,
    series: &PriceSeries,
    date: NaiveDate,
) -> Result<TradeDecision, SignalError> {
    let live = evaluate_live(set, series)?;
    Ok(TradeDecision {
        date,
        symbol: series.symbol().to_string(),
        strategy: set.kind(),
        param_id: live.param_id,
        signal: live.signal,
        price: live.price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweeplab_core::domain::{Bar, StrategyParams};

    fn series(closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                date: start + chrono::Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1000.0,
            })
            .collect();
        PriceSeries::new("SPY", bars).unwrap()
    }

    fn cross(fast: usize, slow: usize) -> ParameterSet {
        ParameterSet::new(
            ParamId::new("CROSS_live"),
            StrategyParams::Cross {
                fast_period: fast,
                slow_period: slow,
            },
        )
    }

    #[test]
    fn window_widens_for_long_periods() {
        assert_eq!(trailing_window(&[cross(5, 20)], 30), 30);
        assert_eq!(trailing_window(&[cross(5, 60)], 30), 61);
        assert_eq!(trailing_window(&[], 30), 30);
    }

    #[test]
    fn decision_carries_symbol_and_last_close() {
        // Flat then a jump on the last bar: fast crosses above slow today.
        let mut closes = vec![100.0; 10];
        closes.push(120.0);
        let as_of = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let d = decide(&cross(2, 5), &series(&closes), as_of).unwrap();
        assert_eq!(d.symbol, "SPY");
        assert_eq!(d.strategy, StrategyKind::Cross);
        assert_eq!(d.date, as_of);
        assert_eq!(d.price, 120.0);
        assert_eq!(d.signal, Signal::Buy);
    }

    #[test]
    fn unbounded_period_fails_as_short_history() {
        let huge = cross(5, usize::MAX);
        assert_eq!(trailing_window(std::slice::from_ref(&huge), 30), usize::MAX);
        let err = decide(&huge, &series(&[100.0; 40]), NaiveDate::MIN).unwrap_err();
        assert!(matches!(
            err,
            SignalError::InsufficientHistory {
                required: usize::MAX,
                available: 40,
                ..
            }
        ));
    }

    #[test]
    fn short_history_is_reported() {
        let err = decide(&cross(5, 20), &series(&[100.0; 10]), NaiveDate::MIN).unwrap_err();
        assert!(matches!(err, SignalError::InsufficientHistory { .. }));
    }
}
