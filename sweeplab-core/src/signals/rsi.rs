//! RSI threshold rule.
//!
//! +1 where RSI < lower, -1 where RSI > upper, else 0. Level-triggered in
//! both modes: each bar is judged on its own RSI value.

use super::SignalRule;
use crate::domain::{Bar, Signal};
use crate::indicators::{Indicator, Rsi};

#[derive(Debug, Clone)]
pub struct RsiRule {
    rsi: Rsi,
    period: usize,
    upper: f64,
    lower: f64,
    name: String,
}

impl RsiRule {
    pub fn new(period: usize, upper: f64, lower: f64) -> Self {
        Self {
            rsi: Rsi::new(period),
            period,
            upper,
            lower,
            name: format!("rsi_{period}_{upper}_{lower}"),
        }
    }

    fn classify(&self, value: f64) -> Signal {
        if value < self.lower {
            Signal::Buy
        } else if value > self.upper {
            Signal::Sell
        } else {
            // NaN falls through here as well
            Signal::Hold
        }
    }
}

impl SignalRule for RsiRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_history(&self) -> usize {
        self.period.saturating_add(1)
    }

    fn batch(&self, bars: &[Bar]) -> Vec<Signal> {
        self.rsi
            .compute(bars)
            .into_iter()
            .map(|v| self.classify(v))
            .collect()
    }

    fn live(&self, bars: &[Bar]) -> Signal {
        self.rsi
            .compute(bars)
            .last()
            .map_or(Signal::Hold, |&v| self.classify(v))
    }
}
