//! SweepLab Core — domain types, indicators, and the signal evaluator.
//!
//! This crate is pure computation plus one read-only adapter:
//! - Domain types (bars, price series, date ranges, parameter sets, signals)
//! - Deterministic parameter identifiers
//! - Indicators (SMA, rolling-mean RSI)
//! - Signal Evaluator in batch and live modes
//! - `PriceSource` port with CSV and in-memory adapters
//!
//! No threads and no artifact persistence live here; orchestration is in
//! `sweeplab-runner`.

pub mod data;
pub mod domain;
pub mod fingerprint;
pub mod indicators;
pub mod signals;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types handed to worker threads are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::PriceSeries>();
        require_sync::<domain::PriceSeries>();
        require_send::<domain::ParameterSet>();
        require_sync::<domain::ParameterSet>();
        require_send::<domain::SignalSeries>();
        require_sync::<domain::SignalSeries>();
        require_send::<domain::LiveSignal>();
        require_sync::<domain::LiveSignal>();
        require_send::<domain::DateRange>();
        require_sync::<domain::DateRange>();

        require_send::<signals::SignalError>();
        require_sync::<signals::SignalError>();
        require_send::<data::DataError>();
        require_sync::<data::DataError>();
        require_send::<data::CsvPriceSource>();
        require_sync::<data::CsvPriceSource>();
        require_send::<data::MemoryPriceSource>();
        require_sync::<data::MemoryPriceSource>();
    }

    /// Architecture contract: rules see only bars.
    #[test]
    fn signal_rule_takes_only_bars() {
        fn _check_trait_object_builds(
            rule: &dyn signals::SignalRule,
            bars: &[domain::Bar],
        ) -> domain::Signal {
            rule.live(bars)
        }
    }
}
