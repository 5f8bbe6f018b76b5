//! Moving-average cross rule.
//!
//! Batch mode is level-triggered: +1 on every bar where fast > slow, -1 where
//! fast < slow. Live mode is edge-triggered: +1 only on the bar where fast
//! moves from <= slow to > slow, -1 only on the symmetric downward flip.
//! The two modes intentionally disagree; downstream performance numbers are
//! computed from the level-triggered form.

use super::SignalRule;
use crate::domain::{Bar, Signal};
use crate::indicators::{Indicator, Sma};

#[derive(Debug, Clone)]
pub struct CrossRule {
    fast: Sma,
    slow: Sma,
    name: String,
}

impl CrossRule {
    pub fn new(fast_period: usize, slow_period: usize) -> Self {
        Self {
            fast: Sma::new(fast_period),
            slow: Sma::new(slow_period),
            name: format!("cross_{fast_period}_{slow_period}"),
        }
    }
}

fn level(fast: f64, slow: f64) -> Signal {
    if fast > slow {
        Signal::Buy
    } else if fast < slow {
        Signal::Sell
    } else {
        Signal::Hold
    }
}

impl SignalRule for CrossRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_history(&self) -> usize {
        self.fast.period().max(self.slow.period()).saturating_add(1)
    }

    fn batch(&self, bars: &[Bar]) -> Vec<Signal> {
        let fast = self.fast.compute(bars);
        let slow = self.slow.compute(bars);
        fast.iter().zip(&slow).map(|(&f, &s)| level(f, s)).collect()
    }

    fn live(&self, bars: &[Bar]) -> Signal {
        let n = bars.len();
        if n < 2 {
            return Signal::Hold;
        }
        let fast = self.fast.compute(bars);
        let slow = self.slow.compute(bars);
        let (prev_fast, prev_slow) = (fast[n - 2], slow[n - 2]);
        let (curr_fast, curr_slow) = (fast[n - 1], slow[n - 1]);

        if prev_fast <= prev_slow && curr_fast > curr_slow {
            Signal::Buy
        } else if prev_fast >= prev_slow && curr_fast < curr_slow {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }
}
