//! Relative Strength Index over simple rolling means of gains and losses.
//!
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss); a window with no losing
//! change reads 100. The first value lands on bar `period`, after `period` changes.

use super::sma::rolling_mean;
use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    label: String,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            label: format!("rsi_{period}"),
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.label
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let mut out = vec![f64::NAN; bars.len()];
        if bars.len() <= self.period {
            return out;
        }

        let (gains, losses): (Vec<f64>, Vec<f64>) = bars
            .windows(2)
            .map(|w| {
                let change = w[1].close - w[0].close;
                (change.max(0.0), (-change).max(0.0))
            })
            .unzip();
        let avg_gain = rolling_mean(&gains, self.period);
        let avg_loss = rolling_mean(&losses, self.period);

        // losing changes inside the window, counted exactly
        let mut losing = 0usize;
        for (i, &loss) in losses.iter().enumerate() {
            if loss > 0.0 {
                losing += 1;
            }
            if i >= self.period && losses[i - self.period] > 0.0 {
                losing -= 1;
            }
            // change i sits between bars i and i + 1
            if i + 1 >= self.period {
                out[i + 1] = strength(avg_gain[i], avg_loss[i], losing > 0);
            }
        }
        out
    }
}

fn strength(avg_gain: f64, avg_loss: f64, has_loss: bool) -> f64 {
    if !has_loss {
        return 100.0;
    }
    // running sums can leave a residue of either sign
    let avg_loss = avg_loss.max(f64::MIN_POSITIVE);
    100.0 - 100.0 / (1.0 + avg_gain.max(0.0) / avg_loss)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars};
    use proptest::prelude::*;

    #[test]
    fn rising_closes_read_100() {
        let rsi = Rsi::new(2).compute(&make_bars(&[1.0, 2.0, 3.0, 4.0]));
        assert!(rsi[0].is_nan() && rsi[1].is_nan());
        assert_eq!(&rsi[2..], &[100.0, 100.0]);
    }

    #[test]
    fn falling_closes_read_0() {
        let rsi = Rsi::new(2).compute(&make_bars(&[9.0, 8.0, 6.0, 3.0]));
        assert_approx(rsi[2], 0.0, 1e-9);
        assert_approx(rsi[3], 0.0, 1e-9);
    }

    #[test]
    fn unchanged_closes_read_100() {
        let rsi = Rsi::new(2).compute(&make_bars(&[5.0, 5.0, 5.0]));
        assert_eq!(rsi[2], 100.0);
    }

    #[test]
    fn averages_are_simple_not_smoothed() {
        // changes: +2, -1, +3, -2
        let rsi = Rsi::new(2).compute(&make_bars(&[10.0, 12.0, 11.0, 14.0, 12.0]));
        // window {+2, -1}: gain 1.0, loss 0.5
        assert_approx(rsi[2], 100.0 - 100.0 / 3.0, 1e-9);
        // window {-1, +3}: gain 1.5, loss 0.5
        assert_approx(rsi[3], 75.0, 1e-9);
        // window {+3, -2}: gain 1.5, loss 1.0
        assert_approx(rsi[4], 60.0, 1e-9);
    }

    #[test]
    fn tiny_prices_keep_real_losses() {
        // changes: +2e-16, -1e-16
        let rsi = Rsi::new(2).compute(&make_bars(&[1.0e-15, 1.2e-15, 1.1e-15]));
        assert_approx(rsi[2], 100.0 - 100.0 / 3.0, 1e-6);
    }

    #[test]
    fn flat_window_after_losses_reads_100() {
        let rsi = Rsi::new(2).compute(&make_bars(&[50.0, 40.0, 30.0, 30.0, 30.0]));
        assert_approx(rsi[2], 0.0, 1e-9);
        assert_eq!(rsi[4], 100.0);
    }

    #[test]
    fn exactly_period_bars_is_all_warmup() {
        let rsi = Rsi::new(3).compute(&make_bars(&[1.0, 2.0, 3.0]));
        assert!(rsi.iter().all(|v| v.is_nan()));
        assert_eq!(Rsi::new(14).lookback(), 14);
    }

    proptest! {
        #[test]
        fn rsi_stays_within_bounds(
            closes in prop::collection::vec(1.0f64..1000.0, 2..80),
            period in 1usize..20,
        ) {
            for v in Rsi::new(period).compute(&make_bars(&closes)) {
                prop_assert!(v.is_nan() || (0.0..=100.0).contains(&v), "RSI out of bounds: {v}");
            }
        }
    }
}
