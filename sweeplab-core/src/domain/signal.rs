//! Discrete trading signals and their series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ids::ParamId;

/// One-period trading signal: +1 buy, 0 hold, -1 sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Signal {
    Sell,
    #[default]
    Hold,
    Buy,
}

impl Signal {
    pub fn value(self) -> i8 {
        match self {
            Self::Sell => -1,
            Self::Hold => 0,
            Self::Buy => 1,
        }
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.value())
    }

    pub fn is_hold(self) -> bool {
        self == Self::Hold
    }
}

impl From<Signal> for i8 {
    fn from(signal: Signal) -> Self {
        signal.value()
    }
}

impl TryFrom<i8> for Signal {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Sell),
            0 => Ok(Self::Hold),
            1 => Ok(Self::Buy),
            other => Err(format!("signal must be -1, 0 or 1, got {other}")),
        }
    }
}

/// A signal on one date, with the close it was evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalPoint {
    pub date: NaiveDate,
    pub signal: Signal,
    pub close: f64,
}

/// Batch-mode output: one signal per bar of the source series, same dates.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSeries {
    pub param_id: ParamId,
    pub points: Vec<SignalPoint>,
}

impl SignalSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.points.iter().map(|p| p.signal).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }
}

/// Live-mode output: the single signal for the latest bar.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSignal {
    pub param_id: ParamId,
    pub date: NaiveDate,
    pub signal: Signal,
    pub price: f64,
}
