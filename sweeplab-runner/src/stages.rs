//! Stage functions — the calls a front end makes, one per pipeline step.
//!
//! Every stage takes an `ArtifactStore` bound to an explicit version and
//! returns a `StageReport` with attempted/succeeded counts. Missing upstream
//! artifacts are checked for every symbol before anything is written, so a
//! failing stage leaves no partial output. Per-parameter-set problems
//! (insufficient history, malformed records) are recorded as unit failures
//! and the rest of the batch continues.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use sweeplab_core::data::{DataError, PriceSource};
use sweeplab_core::domain::{
    normalize_symbols, DateRange, ParamId, ParameterSet, PriceSeries, Signal, StrategyKind,
    SymbolError,
};
use sweeplab_core::signals::evaluate_batch;
use thiserror::Error;
use tracing::{info, warn};

use crate::artifacts::{ArtifactError, ArtifactKey, ArtifactKind, ArtifactStore, LoadedParams};
use crate::config::{PipelineConfig, SelectionConfig};
use crate::generator::{generate_for_symbol, GeneratorError, GeneratorSpec};
use crate::live::{decide, trailing_window, TradeDecision};
use crate::performance::{evaluate, PerformanceRecord, PerformanceSummary};
use crate::scheduler::{BatchOutcome, TaskScheduler, UnitFailure};
use crate::selection::{promote, select};
use crate::simulator::{simulate_day, Account};
use crate::versioning::{StageKind, VersionError};

#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Symbol(#[from] SymbolError),

    #[error("{0}")]
    Invalid(String),
}

/// Historical fitting window or later holdout window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleWindow {
    InSample,
    OutSample,
}

impl SampleWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InSample => "in_sample",
            Self::OutSample => "out_sample",
        }
    }

    pub fn params_stage(&self) -> StageKind {
        match self {
            Self::InSample => StageKind::InSampleParams,
            Self::OutSample => StageKind::OutSampleParams,
        }
    }

    pub fn signals_stage(&self) -> StageKind {
        match self {
            Self::InSample => StageKind::InSampleSignals,
            Self::OutSample => StageKind::OutSampleSignals,
        }
    }

    pub fn performance_stage(&self) -> StageKind {
        match self {
            Self::InSample => StageKind::InSamplePerformance,
            Self::OutSample => StageKind::OutSamplePerformance,
        }
    }

    pub fn best_stage(&self) -> StageKind {
        match self {
            Self::InSample => StageKind::InSampleBest,
            Self::OutSample => StageKind::OutSampleBest,
        }
    }
}

impl fmt::Display for SampleWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SampleWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "in" | "in_sample" => Ok(Self::InSample),
            "out" | "out_sample" => Ok(Self::OutSample),
            other => Err(format!("unknown sample window '{other}' (expected in or out)")),
        }
    }
}

/// One row of a signal table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRow {
    pub date: NaiveDate,
    pub param_id: ParamId,
    pub signal: Signal,
    pub close: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
}

/// Human-readable stage summary.
#[derive(Debug, Clone, Default)]
pub struct StageReport {
    pub stage: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<UnitFailure>,
    pub artifacts: Vec<PathBuf>,
    pub notes: Vec<String>,
}

impl StageReport {
    fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            ..Default::default()
        }
    }

    fn absorb<T>(&mut self, outcome: &mut BatchOutcome<T>) {
        self.attempted += outcome.attempted();
        self.succeeded += outcome.succeeded.len();
        self.failures.append(&mut outcome.failures);
    }

    fn fail(&mut self, unit: String, cause: impl fmt::Display) {
        warn!(stage = %self.stage, unit = %unit, cause = %cause, "unit skipped");
        self.attempted += 1;
        self.failures.push(UnitFailure {
            unit,
            cause: cause.to_string(),
        });
    }

    fn skip_malformed(&mut self, symbol: &str, loaded: &LoadedParams) {
        for m in &loaded.malformed {
            let unit = format!("{symbol}/{}", m.id.as_deref().unwrap_or("?"));
            self.fail(unit, format!("malformed parameter {m}"));
        }
    }

    fn finish(self) -> Self {
        info!(
            stage = %self.stage,
            attempted = self.attempted,
            succeeded = self.succeeded,
            failed = self.failures.len(),
            "stage finished"
        );
        self
    }
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {}/{} succeeded, {} failed",
            self.stage,
            self.succeeded,
            self.attempted,
            self.failures.len()
        )?;
        for note in &self.notes {
            writeln!(f, "  {note}")?;
        }
        for failure in &self.failures {
            writeln!(f, "  failed {failure}")?;
        }
        for path in &self.artifacts {
            writeln!(f, "  wrote {}", path.display())?;
        }
        Ok(())
    }
}

// ── Parameter generation ────────────────────────────────────────────

/// Generate one batch per symbol into the in-sample parameter store.
pub fn generate_params(
    store: &ArtifactStore,
    spec: &GeneratorSpec,
    symbols: &[String],
    scheduler: &TaskScheduler,
) -> Result<StageReport, StageError> {
    let symbols = normalize_symbols(symbols)?;
    let symbols = symbols.as_slice();
    let mut report = StageReport::new(format!("generate {}", spec.strategy));
    info!(stage = %report.stage, symbols = symbols.len(), mode = ?spec.mode, "stage started");

    let salt = Local::now().format("%Y%m%d_%H%M%S%.f").to_string();
    let mut outcome = scheduler.run(
        symbols,
        |symbol| symbol.clone(),
        |symbol| -> Result<(String, usize, Vec<PathBuf>), StageError> {
            let batch = generate_for_symbol(spec, symbol, &salt)?;
            let paths =
                store.write_params(StageKind::InSampleParams, spec.strategy, symbol, &batch.sets)?;
            Ok((symbol.clone(), batch.len(), paths))
        },
    );
    report.absorb(&mut outcome);
    for (symbol, count, paths) in outcome.succeeded {
        report.notes.push(format!("{symbol}: {count} parameter sets"));
        report.artifacts.extend(paths);
    }
    Ok(report.finish())
}

// ── Batch signals ───────────────────────────────────────────────────

/// Evaluate every logged parameter set of `strategy` over `range`.
pub fn evaluate_signals(
    store: &ArtifactStore,
    source: &dyn PriceSource,
    strategy: StrategyKind,
    symbols: &[String],
    window: SampleWindow,
    range: &DateRange,
    scheduler: &TaskScheduler,
) -> Result<StageReport, StageError> {
    let symbols = normalize_symbols(symbols)?;
    let symbols = symbols.as_slice();
    let mut report = StageReport::new(format!("signals {strategy} {window}"));
    info!(stage = %report.stage, symbols = symbols.len(), "stage started");

    let mut inputs: Vec<(&String, LoadedParams, PriceSeries)> = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let params = store.read_params(window.params_stage(), strategy, symbol)?;
        let series = source.load(symbol, range)?;
        inputs.push((symbol, params, series));
    }

    for (symbol, params, series) in inputs {
        report.skip_malformed(symbol, &params);
        let mut outcome = scheduler.run(
            &params.sets,
            |set| format!("{symbol}/{}", set.id),
            |set| evaluate_batch(set, &series),
        );

        let rows: Vec<SignalRow> = outcome
            .succeeded
            .iter()
            .flat_map(|signals| {
                signals
                    .points
                    .iter()
                    .zip(series.bars())
                    .map(move |(point, bar)| SignalRow {
                        date: point.date,
                        param_id: signals.param_id.clone(),
                        signal: point.signal,
                        close: point.close,
                        open: bar.open,
                        high: bar.high,
                        low: bar.low,
                        volume: bar.volume,
                    })
            })
            .collect();

        let key = ArtifactKey::symbol(ArtifactKind::Signals, window.signals_stage(), strategy, symbol.as_str());
        report.artifacts.push(store.write_table(&key, &rows)?);
        report.notes.push(format!(
            "{symbol}: {} sets over {} bars",
            outcome.succeeded.len(),
            series.len()
        ));
        report.absorb(&mut outcome);
    }
    Ok(report.finish())
}

// ── Performance ─────────────────────────────────────────────────────

/// Turn each signal table into a performance table.
pub fn evaluate_performance(
    store: &ArtifactStore,
    strategy: StrategyKind,
    symbols: &[String],
    window: SampleWindow,
    scheduler: &TaskScheduler,
) -> Result<StageReport, StageError> {
    let symbols = normalize_symbols(symbols)?;
    let symbols = symbols.as_slice();
    let mut report = StageReport::new(format!("performance {strategy} {window}"));
    info!(stage = %report.stage, symbols = symbols.len(), "stage started");

    let mut tables = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let key = ArtifactKey::symbol(ArtifactKind::Signals, window.signals_stage(), strategy, symbol.as_str());
        let rows: Vec<SignalRow> = store.read_table(&key)?;
        tables.push((symbol, rows));
    }

    for (symbol, rows) in tables {
        let groups = group_by_param(rows);
        let mut outcome = scheduler.run(
            &groups,
            |(id, _)| format!("{symbol}/{id}"),
            |(id, rows)| -> Result<PerformanceRecord, Infallible> {
                let signals: Vec<Signal> = rows.iter().map(|r| r.signal).collect();
                let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();
                Ok(evaluate(id.clone(), &signals, &closes))
            },
        );

        let summary = PerformanceSummary::describe(&outcome.succeeded);
        report.notes.push(format!(
            "{symbol}: {} rows ({} degenerate); sharpe mean {:.3} min {:.3} max {:.3}; \
             total_return mean {:.4}; max_drawdown min {:.4}",
            summary.rows,
            summary.degenerate,
            summary.sharpe.mean,
            summary.sharpe.min,
            summary.sharpe.max,
            summary.total_return.mean,
            summary.max_drawdown.min,
        ));

        let key = ArtifactKey::symbol(
            ArtifactKind::Performance,
            window.performance_stage(),
            strategy,
            symbol.as_str(),
        );
        report.artifacts.push(store.write_table(&key, &outcome.succeeded)?);
        report.absorb(&mut outcome);
    }
    Ok(report.finish())
}

/// Split signal rows by parameter id, keeping first-appearance order.
fn group_by_param(rows: Vec<SignalRow>) -> Vec<(ParamId, Vec<SignalRow>)> {
    let mut index: HashMap<ParamId, usize> = HashMap::new();
    let mut groups: Vec<(ParamId, Vec<SignalRow>)> = Vec::new();
    for row in rows {
        match index.get(&row.param_id) {
            Some(&i) => groups[i].1.push(row),
            None => {
                index.insert(row.param_id.clone(), groups.len());
                groups.push((row.param_id.clone(), vec![row]));
            }
        }
    }
    groups
}

// ── Selection ───────────────────────────────────────────────────────

/// Rank each performance table and persist the top N. In-sample selections
/// are promoted into the out-of-sample parameter store when `config.promote`.
pub fn select_strategies(
    store: &ArtifactStore,
    strategy: StrategyKind,
    symbols: &[String],
    window: SampleWindow,
    config: &SelectionConfig,
) -> Result<StageReport, StageError> {
    let symbols = normalize_symbols(symbols)?;
    let symbols = symbols.as_slice();
    let mut report = StageReport::new(format!("select {strategy} {window}"));
    let promoting = config.promote && window == SampleWindow::InSample;
    info!(stage = %report.stage, symbols = symbols.len(), promoting, "stage started");

    let mut inputs = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let key = ArtifactKey::symbol(
            ArtifactKind::Performance,
            window.performance_stage(),
            strategy,
            symbol.as_str(),
        );
        let table: Vec<PerformanceRecord> = store.read_table(&key)?;
        let log = if promoting {
            Some(store.read_params(window.params_stage(), strategy, symbol)?)
        } else {
            None
        };
        inputs.push((symbol, table, log));
    }

    for (symbol, table, log) in inputs {
        let selection = select(&table, &config.criteria);
        let key = ArtifactKey::symbol(ArtifactKind::Selection, window.best_stage(), strategy, symbol.as_str());
        report.artifacts.push(store.write_table(&key, &selection.records)?);
        report.attempted += table.len();
        report.succeeded += selection.records.len();
        report.notes.push(format!(
            "{symbol}: kept {} of {} ({} passed thresholds) by {} {}",
            selection.records.len(),
            table.len(),
            selection.eligible,
            selection.rank_field,
            selection.direction
        ));

        if let Some(log) = log {
            let promoted = promote(&selection, &log.sets);
            for id in selection.ids() {
                if !promoted.iter().any(|s| s.id == id) {
                    report.failures.push(UnitFailure {
                        unit: format!("{symbol}/{id}"),
                        cause: "selected id not found in parameter log".into(),
                    });
                }
            }
            let paths = store.write_params(StageKind::OutSampleParams, strategy, symbol, &promoted)?;
            report.artifacts.extend(paths);
            report
                .notes
                .push(format!("{symbol}: promoted {} definitions", promoted.len()));
        }
    }
    Ok(report.finish())
}

// ── Live decisions ──────────────────────────────────────────────────

/// Evaluate every out-of-sample selection live as of `as_of`.
pub fn generate_live_signals(
    store: &ArtifactStore,
    source: &dyn PriceSource,
    strategies: &[StrategyKind],
    symbols: &[String],
    as_of: NaiveDate,
    window: usize,
    scheduler: &TaskScheduler,
) -> Result<StageReport, StageError> {
    let symbols = normalize_symbols(symbols)?;
    let symbols = symbols.as_slice();
    let mut report = StageReport::new(format!("live {as_of}"));
    info!(stage = %report.stage, strategies = strategies.len(), symbols = symbols.len(), "stage started");

    let mut inputs = Vec::new();
    for &strategy in strategies {
        for symbol in symbols {
            let key = ArtifactKey::symbol(
                ArtifactKind::Selection,
                StageKind::OutSampleBest,
                strategy,
                symbol.as_str(),
            );
            let selected: Vec<PerformanceRecord> = store.read_table(&key)?;
            let log = store.read_params(StageKind::OutSampleParams, strategy, symbol)?;
            inputs.push((strategy, symbol, selected, log));
        }
    }

    let mut decisions: Vec<TradeDecision> = Vec::new();
    for (strategy, symbol, selected, log) in inputs {
        report.skip_malformed(symbol, &log);
        let sets = selected_sets(&mut report, symbol, &selected, &log.sets);
        if sets.is_empty() {
            continue;
        }

        let bars = trailing_window(&sets, window);
        let series = match source.recent(symbol, Some(as_of), bars) {
            Ok(series) => series,
            Err(e) => {
                let cause = e.to_string();
                for set in &sets {
                    report.fail(format!("{symbol}/{}", set.id), &cause);
                }
                continue;
            }
        };
        if let Some(last) = series.last() {
            if last.date < as_of {
                warn!(symbol = %symbol, last_bar = %last.date, %as_of, "no bar on the simulated date");
            }
        }

        let mut outcome = scheduler.run(
            &sets,
            |set| format!("{symbol}/{}", set.id),
            |set| decide(set, &series, as_of),
        );
        report.notes.push(format!(
            "{strategy} {symbol}: {} decisions",
            outcome.succeeded.len()
        ));
        report.absorb(&mut outcome);
        decisions.append(&mut outcome.succeeded);
    }
    let key = ArtifactKey::day(ArtifactKind::TradeDecisions, StageKind::TradingSignal, as_of);
    report.artifacts.push(store.write_table(&key, &decisions)?);
    Ok(report.finish())
}

fn selected_sets(
    report: &mut StageReport,
    symbol: &str,
    selected: &[PerformanceRecord],
    log: &[ParameterSet],
) -> Vec<ParameterSet> {
    let by_id: HashMap<&ParamId, &ParameterSet> = log.iter().map(|s| (&s.id, s)).collect();
    let mut sets = Vec::with_capacity(selected.len());
    for record in selected {
        match by_id.get(&record.param_id) {
            Some(set) => sets.push((*set).clone()),
            None => report.fail(
                format!("{symbol}/{}", record.param_id),
                "selected id not found in out-of-sample parameter log",
            ),
        }
    }
    sets
}

// ── Account simulation ──────────────────────────────────────────────

/// Advance every account by the decisions dated `as_of`.
pub fn simulate_accounts(
    store: &ArtifactStore,
    as_of: NaiveDate,
    initial_capital: f64,
) -> Result<StageReport, StageError> {
    let mut report = StageReport::new(format!("simulate {as_of}"));
    info!(stage = %report.stage, "stage started");

    let key = ArtifactKey::day(ArtifactKind::TradeDecisions, StageKind::TradingSignal, as_of);
    let decisions: Vec<TradeDecision> = store.read_table(&key)?;

    let prior: Vec<Account> = match store.latest_snapshot_before(as_of)? {
        Some(date) => {
            report.notes.push(format!("starting from snapshot of {date}"));
            let prev = ArtifactKey::day(ArtifactKind::AccountSnapshot, StageKind::TradingPerformance, date);
            store.read_table(&prev)?
        }
        None => {
            report.notes.push("no prior snapshot; new accounts start flat".into());
            Vec::new()
        }
    };

    let mut outcome = simulate_day(prior, &decisions, as_of, initial_capital);
    report.attempted = decisions.len();
    report.succeeded = outcome.updated;
    report.failures.append(&mut outcome.rejected);
    report.notes.push(format!(
        "{} new accounts, {} trades",
        outcome.created, outcome.trades
    ));
    report.notes.push(outcome.to_string());

    let snapshot = ArtifactKey::day(ArtifactKind::AccountSnapshot, StageKind::TradingPerformance, as_of);
    report.artifacts.push(store.write_table(&snapshot, &outcome.accounts)?);
    Ok(report.finish())
}

// ── Whole pipeline ──────────────────────────────────────────────────

/// Run every configured stage in order for each strategy kind.
pub fn run_pipeline(
    store: &ArtifactStore,
    source: &dyn PriceSource,
    config: &PipelineConfig,
) -> Result<Vec<StageReport>, StageError> {
    let scheduler = TaskScheduler::new(config.generator.max_workers);
    let symbols = &config.generator.symbols;
    let mut reports = Vec::new();

    for &strategy in &config.generator.strategies {
        let spec = config.generator.spec_for(strategy);
        reports.push(generate_params(store, &spec, symbols, &scheduler)?);

        let window = SampleWindow::InSample;
        reports.push(evaluate_signals(store, source, strategy, symbols, window, &config.in_sample, &scheduler)?);
        reports.push(evaluate_performance(store, strategy, symbols, window, &scheduler)?);
        reports.push(select_strategies(store, strategy, symbols, window, &config.selection)?);

        if !config.selection.promote {
            info!(%strategy, "promotion disabled; stopping after in-sample selection");
            continue;
        }

        let window = SampleWindow::OutSample;
        reports.push(evaluate_signals(store, source, strategy, symbols, window, &config.out_sample, &scheduler)?);
        reports.push(evaluate_performance(store, strategy, symbols, window, &scheduler)?);
        reports.push(select_strategies(store, strategy, symbols, window, &config.selection)?);
    }

    if let Some(live) = &config.live {
        if !config.selection.promote {
            return Err(StageError::Invalid(
                "live decisions need out-of-sample selections; enable selection.promote".into(),
            ));
        }
        reports.push(generate_live_signals(
            store,
            source,
            &config.generator.strategies,
            symbols,
            live.as_of,
            live.window,
            &scheduler,
        )?);
        reports.push(simulate_accounts(store, live.as_of, config.initial_capital)?);
    }
    Ok(reports)
}
