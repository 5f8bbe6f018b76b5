//! Price data port and adapters.
//!
//! Stages never fetch data themselves: they consume a `PriceSource`. The
//! CSV adapter reads the `{symbol}.csv` files the external downloader
//! leaves behind; the in-memory source backs tests and synthetic runs.

pub mod csv_source;
pub mod memory;
pub mod provider;

pub use csv_source::CsvPriceSource;
pub use memory::MemoryPriceSource;
pub use provider::{DataError, PriceSource};
