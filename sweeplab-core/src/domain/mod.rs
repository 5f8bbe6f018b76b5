//! Domain types shared by every pipeline stage.

pub mod bar;
pub mod date_range;
pub mod ids;
pub mod params;
pub mod signal;
pub mod symbol;

pub use bar::{Bar, PriceSeries, SeriesError};
pub use date_range::{parse_date, DateRange, DateRangeError, DATE_FORMAT};
pub use ids::{ParamId, VersionId};
pub use params::{FieldMap, ParamError, MAX_PERIOD, ParameterSet, StrategyKind, StrategyParams};
pub use signal::{LiveSignal, Signal, SignalPoint, SignalSeries};
pub use symbol::{normalize_symbol, normalize_symbols, SymbolError};
