//! SweepLab Runner — versioned pipeline orchestration.
//!
//! This crate builds on `sweeplab-core` to provide:
//! - Artifact versioning (one directory tree per experiment run)
//! - Typed artifact store with an append-only index
//! - Parameter generation (grid and seeded random sampling)
//! - Bounded task scheduler with per-unit failure collection
//! - Performance metrics, strategy selection and promotion
//! - Live decisions and the daily account simulator
//! - TOML pipeline configuration and the stage functions a front end calls

pub mod artifacts;
pub mod config;
pub mod generator;
pub mod live;
pub mod performance;
pub mod scheduler;
pub mod selection;
pub mod simulator;
pub mod stages;
pub mod versioning;

pub use artifacts::{
    ArtifactError, ArtifactKey, ArtifactKind, ArtifactRecord, ArtifactScope, ArtifactStore,
    LoadedParams, MalformedParam,
};
pub use config::{ConfigError, GeneratorConfig, LiveConfig, PipelineConfig, SelectionConfig};
pub use generator::{
    generate_for_symbol, generate_grid, generate_random, FieldDomain, GenerationMode,
    GeneratorError, GeneratorSpec, ParamBatch,
};
pub use live::{decide, TradeDecision, DEFAULT_LIVE_WINDOW};
pub use performance::{MetricSummary, PerformanceRecord, PerformanceSummary};
pub use scheduler::{BatchOutcome, TaskScheduler, UnitFailure, DEFAULT_MAX_WORKERS};
pub use selection::{
    promote, select, RankField, SelectionCriteria, SelectionResult, SortDirection, Thresholds,
};
pub use simulator::{
    simulate_day, Account, AccountState, DayOutcome, TradeAction, DEFAULT_INITIAL_CAPITAL,
};
pub use stages::{
    evaluate_performance, evaluate_signals, generate_live_signals, generate_params, run_pipeline,
    select_strategies, simulate_accounts, SampleWindow, SignalRow, StageError, StageReport,
};
pub use versioning::{StageKind, VersionContext, VersionError, VersionInfo, VersionStore};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn stores_are_send_sync() {
        assert_send::<VersionStore>();
        assert_sync::<VersionStore>();
        assert_send::<ArtifactStore>();
        assert_sync::<ArtifactStore>();
    }

    #[test]
    fn stage_outputs_are_send_sync() {
        assert_send::<PerformanceRecord>();
        assert_sync::<PerformanceRecord>();
        assert_send::<TradeDecision>();
        assert_sync::<TradeDecision>();
        assert_send::<Account>();
        assert_sync::<Account>();
        assert_send::<SignalRow>();
        assert_sync::<SignalRow>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<StageError>();
        assert_sync::<StageError>();
        assert_send::<ConfigError>();
        assert_sync::<ConfigError>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<PipelineConfig>();
        assert_sync::<PipelineConfig>();
        assert_send::<GeneratorSpec>();
        assert_sync::<GeneratorSpec>();
    }
}
