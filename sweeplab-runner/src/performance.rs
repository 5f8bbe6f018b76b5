//! Performance Evaluator — signal series in, return/risk metrics out.
//!
//! Every metric is a pure function of the signals and closes. The procedure:
//! 1. forward-fill nonzero signals into a held position (leading zeros stay 0)
//! 2. drop every bar before the first nonzero position
//! 3. daily return = yesterday's position × today's pct change (0 on the first kept bar)
//! 4. NAV = cumulative product of (1 + daily return), starting at 1.0
//!
//! Degenerate input (no nonzero signal, or fewer than 2 kept bars) yields
//! `NaN` for all three metrics. That is a value, not an error.

use serde::{Deserialize, Serialize};
use sweeplab_core::domain::{ParamId, Signal, SignalSeries};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Metrics for one parameter set. Column order matches the persisted table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub param_id: ParamId,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub sharpe: f64,
}

impl PerformanceRecord {
    pub fn degenerate(param_id: ParamId) -> Self {
        Self {
            param_id,
            total_return: f64::NAN,
            max_drawdown: f64::NAN,
            sharpe: f64::NAN,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.total_return.is_nan() && self.max_drawdown.is_nan() && self.sharpe.is_nan()
    }
}

/// Evaluate a batch signal series against the closes it carries.
pub fn evaluate_series(series: &SignalSeries) -> PerformanceRecord {
    evaluate(series.param_id.clone(), &series.signals(), &series.closes())
}

/// Evaluate aligned signals and closes. Extra elements in the longer slice are ignored.
pub fn evaluate(param_id: ParamId, signals: &[Signal], closes: &[f64]) -> PerformanceRecord {
    let n = signals.len().min(closes.len());
    let position = forward_fill_position(&signals[..n]);

    let Some(first) = position.iter().position(|&p| p != 0.0) else {
        return PerformanceRecord::degenerate(param_id);
    };

    let returns = daily_returns(&position[first..], &closes[first..n]);
    if returns.len() <= 1 {
        return PerformanceRecord::degenerate(param_id);
    }

    let nav = nav_curve(&returns);
    PerformanceRecord {
        param_id,
        total_return: nav.last().copied().unwrap_or(1.0) - 1.0,
        max_drawdown: max_drawdown(&nav),
        sharpe: sharpe_ratio(&returns),
    }
}

/// Carry the last nonzero signal forward. Bars before any nonzero signal are 0.
pub fn forward_fill_position(signals: &[Signal]) -> Vec<f64> {
    let mut held = 0.0;
    signals
        .iter()
        .map(|s| {
            if !s.is_hold() {
                held = s.as_f64();
            }
            held
        })
        .collect()
}

/// Per-bar returns: `position[t-1] × (close[t] / close[t-1] - 1)`, 0 at t = 0.
pub fn daily_returns(position: &[f64], closes: &[f64]) -> Vec<f64> {
    let n = position.len().min(closes.len());
    (0..n)
        .map(|t| {
            if t == 0 {
                0.0
            } else {
                position[t - 1] * (closes[t] / closes[t - 1] - 1.0)
            }
        })
        .collect()
}

/// Compounded value of a unit investment.
pub fn nav_curve(returns: &[f64]) -> Vec<f64> {
    let mut nav = 1.0;
    returns
        .iter()
        .map(|r| {
            nav *= 1.0 + r;
            nav
        })
        .collect()
}

/// Worst fractional decline from the running peak. Always <= 0.
pub fn max_drawdown(nav: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &v in nav {
        peak = peak.max(v);
        if peak > 0.0 {
            max_dd = max_dd.min((v - peak) / peak);
        }
    }
    max_dd
}

/// Annualized Sharpe: (mean × 252) / (population std × √252); 0 when std is 0.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mean = mean_f64(returns);
    let std = population_std(returns);
    if std <= 0.0 || !std.is_finite() {
        return 0.0;
    }
    (mean * TRADING_DAYS_PER_YEAR) / (std * TRADING_DAYS_PER_YEAR.sqrt())
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// count/mean/min/max of one metric, `NaN` sentinels excluded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl MetricSummary {
    pub fn of(values: impl Iterator<Item = f64>) -> Self {
        let finite: Vec<f64> = values.filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Self {
                count: 0,
                mean: f64::NAN,
                min: f64::NAN,
                max: f64::NAN,
            };
        }
        Self {
            count: finite.len(),
            mean: mean_f64(&finite),
            min: finite.iter().copied().fold(f64::INFINITY, f64::min),
            max: finite.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Descriptive statistics over a performance table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub rows: usize,
    pub degenerate: usize,
    pub total_return: MetricSummary,
    pub max_drawdown: MetricSummary,
    pub sharpe: MetricSummary,
}

impl PerformanceSummary {
    pub fn describe(records: &[PerformanceRecord]) -> Self {
        Self {
            rows: records.len(),
            degenerate: records.iter().filter(|r| r.is_degenerate()).count(),
            total_return: MetricSummary::of(records.iter().map(|r| r.total_return)),
            max_drawdown: MetricSummary::of(records.iter().map(|r| r.max_drawdown)),
            sharpe: MetricSummary::of(records.iter().map(|r| r.sharpe)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sig(values: &[i8]) -> Vec<Signal> {
        values.iter().map(|&v| Signal::try_from(v).unwrap()).collect()
    }

    fn id() -> ParamId {
        ParamId::new("RSI_t")
    }

    #[test]
    fn forward_fill_keeps_leading_zeros() {
        let pos = forward_fill_position(&sig(&[0, 0, 1, 0, -1, 0, 0, 1]));
        assert_eq!(pos, vec![0.0, 0.0, 1.0, 1.0, -1.0, -1.0, -1.0, 1.0]);
    }

    #[test]
    fn worked_example_matches_compounded_product() {
        let closes = [100.0, 101.0, 99.0, 102.0, 105.0];
        let rec = evaluate(id(), &sig(&[0, 1, 1, -1, 0]), &closes);

        // position after fill: [0, 1, 1, -1, -1]; trimmed to bars 1..=4
        let r1 = 1.0 * (99.0 / 101.0 - 1.0);
        let r2 = 1.0 * (102.0 / 99.0 - 1.0);
        let r3 = -1.0 * (105.0 / 102.0 - 1.0);
        let expected_nav = (1.0 + r1) * (1.0 + r2) * (1.0 + r3);
        assert!((rec.total_return - (expected_nav - 1.0)).abs() < 1e-9);

        let nav = nav_curve(&[0.0, r1, r2, r3]);
        let peak_dd = (nav[1] - 1.0) / 1.0;
        assert!(rec.max_drawdown <= 0.0);
        assert!((rec.max_drawdown - max_drawdown(&nav)).abs() < 1e-12);
        assert!(rec.max_drawdown <= peak_dd + 1e-12);
    }

    #[test]
    fn sharpe_uses_population_std_including_first_zero() {
        let closes = [100.0, 101.0, 99.0, 102.0, 105.0];
        let rec = evaluate(id(), &sig(&[0, 1, 1, -1, 0]), &closes);
        let returns = [
            0.0,
            99.0 / 101.0 - 1.0,
            102.0 / 99.0 - 1.0,
            -(105.0 / 102.0 - 1.0),
        ];
        let mean = returns.iter().sum::<f64>() / 4.0;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / 4.0;
        let expected = mean * 252.0 / (var.sqrt() * 252.0_f64.sqrt());
        assert!((rec.sharpe - expected).abs() < 1e-9);
    }

    #[test]
    fn all_zero_signals_yield_sentinels() {
        let rec = evaluate(id(), &sig(&[0, 0, 0, 0]), &[1.0, 2.0, 3.0, 4.0]);
        assert!(rec.is_degenerate());
    }

    #[test]
    fn single_kept_bar_yields_sentinels() {
        let rec = evaluate(id(), &sig(&[0, 0, 0, 1]), &[1.0, 2.0, 3.0, 4.0]);
        assert!(rec.is_degenerate());
    }

    #[test]
    fn empty_input_yields_sentinels() {
        assert!(evaluate(id(), &[], &[]).is_degenerate());
    }

    #[test]
    fn flat_returns_give_zero_sharpe() {
        let rec = evaluate(id(), &sig(&[1, 0, 0]), &[10.0, 10.0, 10.0]);
        assert_eq!(rec.total_return, 0.0);
        assert_eq!(rec.max_drawdown, 0.0);
        assert_eq!(rec.sharpe, 0.0);
    }

    #[test]
    fn max_drawdown_known() {
        let nav = [1.0, 1.1, 0.9, 0.95];
        let expected = (0.9 - 1.1) / 1.1;
        assert!((max_drawdown(&nav) - expected).abs() < 1e-12);
    }

    #[test]
    fn summary_skips_sentinels() {
        let records = vec![
            PerformanceRecord {
                param_id: ParamId::new("a"),
                total_return: 0.1,
                max_drawdown: -0.2,
                sharpe: 1.0,
            },
            PerformanceRecord::degenerate(ParamId::new("b")),
            PerformanceRecord {
                param_id: ParamId::new("c"),
                total_return: 0.3,
                max_drawdown: -0.1,
                sharpe: 2.0,
            },
        ];
        let s = PerformanceSummary::describe(&records);
        assert_eq!(s.rows, 3);
        assert_eq!(s.degenerate, 1);
        assert_eq!(s.sharpe.count, 2);
        assert!((s.sharpe.mean - 1.5).abs() < 1e-12);
        assert_eq!(s.total_return.min, 0.1);
        assert_eq!(s.total_return.max, 0.3);
    }

    proptest! {
        #[test]
        fn drawdown_bounded_for_any_nav_from_one(
            returns in prop::collection::vec(-0.99f64..1.0, 1..200)
        ) {
            let mut r = vec![0.0];
            r.extend(returns);
            let dd = max_drawdown(&nav_curve(&r));
            prop_assert!(dd <= 0.0);
            prop_assert!(dd >= -1.0);
        }

        #[test]
        fn evaluated_drawdown_bounded(
            closes in prop::collection::vec(1.0f64..500.0, 2..100),
            raw in prop::collection::vec(-1i8..=1, 2..100),
        ) {
            let n = closes.len().min(raw.len());
            let signals: Vec<Signal> = raw[..n].iter().map(|&v| Signal::try_from(v).unwrap()).collect();
            let rec = evaluate(ParamId::new("p"), &signals, &closes[..n]);
            if !rec.is_degenerate() {
                prop_assert!(rec.max_drawdown <= 0.0);
                // a short position can lose more than 100% of NAV, so only
                // long-only paths are bounded below by -1
                if signals.iter().all(|s| *s != Signal::Sell) {
                    prop_assert!(rec.max_drawdown >= -1.0);
                }
            }
        }
    }
}
