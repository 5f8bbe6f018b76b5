//! In-memory price source for tests and synthetic runs.

use std::collections::HashMap;
use std::path::PathBuf;

use super::provider::{DataError, PriceSource};
use crate::domain::PriceSeries;

#[derive(Debug, Clone, Default)]
pub struct MemoryPriceSource {
    series: HashMap<String, PriceSeries>,
}

impl MemoryPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, series: PriceSeries) {
        self.series.insert(series.symbol().to_string(), series);
    }

    pub fn with(mut self, series: PriceSeries) -> Self {
        self.insert(series);
        self
    }
}

impl PriceSource for MemoryPriceSource {
    fn name(&self) -> &str {
        "memory"
    }

    fn load_all(&self, symbol: &str) -> Result<PriceSeries, DataError> {
        self.series
            .get(symbol)
            .cloned()
            .ok_or_else(|| DataError::NotFound {
                symbol: symbol.to_string(),
                path: PathBuf::from(format!("memory://{symbol}")),
            })
    }
}
