//! CSV price adapter: one `{symbol}.csv` per symbol under a base directory.
//!
//! Required header columns: date, open, high, low, close, volume. Extra
//! columns are ignored. Dates may carry a time suffix (`2024-01-02 00:00:00`);
//! only the date part is used.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;

use super::provider::{DataError, PriceSource};
use crate::domain::{Bar, PriceSeries, DATE_FORMAT};

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

#[derive(Debug, Clone)]
pub struct CsvPriceSource {
    base_path: PathBuf,
}

impl CsvPriceSource {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }
}

impl PriceSource for CsvPriceSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn load_all(&self, symbol: &str) -> Result<PriceSeries, DataError> {
        let path = self.csv_path(symbol);
        if !path.exists() {
            return Err(DataError::NotFound {
                symbol: symbol.to_string(),
                path,
            });
        }

        let mut rdr = csv::Reader::from_path(&path)?;
        let mut bars = Vec::new();
        for (i, row) in rdr.deserialize::<CsvRow>().enumerate() {
            // header is line 1
            let line = i as u64 + 2;
            let row = row.map_err(|e| DataError::Malformed {
                symbol: symbol.to_string(),
                line,
                reason: e.to_string(),
            })?;
            let date_part = row.date.split_whitespace().next().unwrap_or_default();
            let date = NaiveDate::parse_from_str(date_part, DATE_FORMAT).map_err(|e| {
                DataError::Malformed {
                    symbol: symbol.to_string(),
                    line,
                    reason: format!("invalid date '{}': {e}", row.date),
                }
            })?;
            bars.push(Bar {
                date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }

        bars.sort_by_key(|b| b.date);
        Ok(PriceSeries::new(symbol, bars)?)
    }
}
