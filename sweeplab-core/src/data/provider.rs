//! Price source trait and structured error types.

use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::{DateRange, PriceSeries, SeriesError};

/// Structured error types for price data access.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no price data for symbol '{symbol}' at {}", path.display())]
    NotFound { symbol: String, path: PathBuf },

    #[error("no bars for '{symbol}' in the requested window")]
    Empty { symbol: String },

    #[error("malformed price row for '{symbol}' (line {line}): {reason}")]
    Malformed {
        symbol: String,
        line: u64,
        reason: String,
    },

    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error("failed to read price data: {0}")]
    Csv(#[from] csv::Error),
}

/// Read access to daily price series, keyed by symbol.
///
/// Implementations return bars sorted ascending by date with no duplicates.
pub trait PriceSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Full history for a symbol.
    fn load_all(&self, symbol: &str) -> Result<PriceSeries, DataError>;

    /// Bars within `range` (inclusive). An empty window is an error.
    fn load(&self, symbol: &str, range: &DateRange) -> Result<PriceSeries, DataError> {
        let all = self.load_all(symbol)?;
        let bars = all
            .bars()
            .iter()
            .filter(|b| range.contains(b.date))
            .cloned()
            .collect::<Vec<_>>();
        if bars.is_empty() {
            return Err(DataError::Empty {
                symbol: symbol.to_string(),
            });
        }
        Ok(PriceSeries::new(symbol, bars)?)
    }

    /// The most recent `window` bars dated on or before `as_of`
    /// (or the latest bars when `as_of` is `None`).
    fn recent(
        &self,
        symbol: &str,
        as_of: Option<NaiveDate>,
        window: usize,
    ) -> Result<PriceSeries, DataError> {
        let all = self.load_all(symbol)?;
        let cut = match as_of {
            Some(date) => all.up_to(date),
            None => all,
        };
        if cut.is_empty() {
            return Err(DataError::Empty {
                symbol: symbol.to_string(),
            });
        }
        Ok(cut.tail(window))
    }
}
