//! Pipeline configuration loaded from TOML.
//!
//! ```toml
//! [generator]
//! strategies = ["RSI", "CROSS"]
//! symbols = ["AAPL", "MSFT"]
//! count = 100
//! mode = "grid"          # or "random"
//! max_workers = 3
//!
//! [generator.domains.RSI]
//! period = { min = 5, max = 30 }
//! upper = [70, 80]
//!
//! [in_sample]
//! start = "2018-01-01"
//! end = "2021-12-31"
//!
//! [out_sample]
//! start = "2022-01-01"
//! end = "2023-12-31"
//!
//! [selection]
//! rank_field = "sharpe"
//! top_n = 10
//! min_sharpe = 0.5
//!
//! [live]
//! as_of = "2024-01-02"
//! window = 30
//!
//! [simulation]
//! initial_capital = 10000
//! ```
//!
//! Dates are checked when the file is loaded; a malformed date is an error.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use sweeplab_core::domain::{
    normalize_symbols, parse_date, DateRange, DateRangeError, StrategyKind,
};
use thiserror::Error;

use crate::generator::{FieldDomain, GenerationMode, GeneratorSpec, DEFAULT_COUNT};
use crate::live::DEFAULT_LIVE_WINDOW;
use crate::scheduler::DEFAULT_MAX_WORKERS;
use crate::selection::{RankField, SelectionCriteria, SortDirection, Thresholds, DEFAULT_TOP_N};
use crate::simulator::DEFAULT_INITIAL_CAPITAL;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Date(#[from] DateRangeError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    pub strategies: Vec<StrategyKind>,
    pub symbols: Vec<String>,
    pub count: usize,
    pub mode: GenerationMode,
    pub seed: Option<u64>,
    pub max_workers: usize,
    /// Per-strategy overrides merged over the built-in domains.
    pub domains: BTreeMap<StrategyKind, BTreeMap<String, FieldDomain>>,
}

impl GeneratorConfig {
    /// Generator input for one strategy kind.
    pub fn spec_for(&self, strategy: StrategyKind) -> GeneratorSpec {
        let mut spec = GeneratorSpec::default_for(strategy);
        if let Some(overrides) = self.domains.get(&strategy) {
            for (field, domain) in overrides {
                spec.domains.insert(field.clone(), domain.clone());
            }
        }
        spec.count = self.count;
        spec.mode = self.mode;
        spec.seed = self.seed;
        spec
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionConfig {
    pub criteria: SelectionCriteria,
    /// Copy surviving in-sample definitions into the out-of-sample parameter store.
    pub promote: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveConfig {
    /// Defaults to the end of the out-of-sample window.
    pub as_of: NaiveDate,
    pub window: usize,
}

/// Validated pipeline configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub generator: GeneratorConfig,
    pub in_sample: DateRange,
    pub out_sample: DateRange,
    pub selection: SelectionConfig,
    /// Live decisions and the account simulation run only when `[live]` is present.
    pub live: Option<LiveConfig>,
    pub initial_capital: f64,
}

impl PipelineConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        raw.validate()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ── Raw TOML shape ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    generator: RawGenerator,
    in_sample: RawWindow,
    out_sample: RawWindow,
    #[serde(default)]
    selection: RawSelection,
    live: Option<RawLive>,
    #[serde(default)]
    simulation: RawSimulation,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGenerator {
    #[serde(default = "default_strategies")]
    strategies: Vec<String>,
    symbols: Vec<String>,
    #[serde(default = "default_count")]
    count: usize,
    #[serde(default)]
    mode: GenerationMode,
    seed: Option<u64>,
    #[serde(default = "default_max_workers")]
    max_workers: usize,
    #[serde(default)]
    domains: BTreeMap<String, BTreeMap<String, FieldDomain>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawWindow {
    start: String,
    end: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSelection {
    #[serde(default)]
    rank_field: Option<String>,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default = "default_top_n")]
    top_n: usize,
    min_sharpe: Option<f64>,
    max_drawdown: Option<f64>,
    min_total_return: Option<f64>,
    #[serde(default = "default_true")]
    promote: bool,
}

impl Default for RawSelection {
    fn default() -> Self {
        Self {
            rank_field: None,
            direction: None,
            top_n: DEFAULT_TOP_N,
            min_sharpe: None,
            max_drawdown: None,
            min_total_return: None,
            promote: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLive {
    as_of: Option<String>,
    #[serde(default = "default_live_window")]
    window: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSimulation {
    #[serde(default = "default_initial_capital")]
    initial_capital: f64,
}

impl Default for RawSimulation {
    fn default() -> Self {
        Self {
            initial_capital: DEFAULT_INITIAL_CAPITAL,
        }
    }
}

fn default_strategies() -> Vec<String> {
    StrategyKind::ALL.iter().map(|k| k.as_str().to_string()).collect()
}
fn default_count() -> usize {
    DEFAULT_COUNT
}
fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}
fn default_top_n() -> usize {
    DEFAULT_TOP_N
}
fn default_true() -> bool {
    true
}
fn default_live_window() -> usize {
    DEFAULT_LIVE_WINDOW
}
fn default_initial_capital() -> f64 {
    DEFAULT_INITIAL_CAPITAL
}

impl RawConfig {
    fn validate(self) -> Result<PipelineConfig, ConfigError> {
        let g = self.generator;
        let symbols = normalize_symbols(&g.symbols)
            .map_err(|e| ConfigError::Invalid(format!("generator.symbols: {e}")))?;
        let strategies = g
            .strategies
            .iter()
            .map(|s| s.parse::<StrategyKind>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if strategies.is_empty() {
            return Err(ConfigError::Invalid("generator.strategies is empty".into()));
        }
        let mut domains = BTreeMap::new();
        for (name, fields) in g.domains {
            let kind = name
                .parse::<StrategyKind>()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            domains.insert(kind, fields);
        }

        let in_sample = DateRange::parse(&self.in_sample.start, &self.in_sample.end)?;
        let out_sample = DateRange::parse(&self.out_sample.start, &self.out_sample.end)?;

        let s = self.selection;
        let rank_field = s
            .rank_field
            .as_deref()
            .map(str::parse::<RankField>)
            .transpose()
            .map_err(ConfigError::Invalid)?
            .unwrap_or_default();
        let direction = s
            .direction
            .as_deref()
            .map(str::parse::<SortDirection>)
            .transpose()
            .map_err(ConfigError::Invalid)?;

        let live = self
            .live
            .map(|l| -> Result<LiveConfig, ConfigError> {
                let as_of = match l.as_of {
                    Some(raw) => parse_date("as_of", &raw)?,
                    None => out_sample.end,
                };
                Ok(LiveConfig {
                    as_of,
                    window: l.window.max(1),
                })
            })
            .transpose()?;

        let initial_capital = self.simulation.initial_capital;
        if !(initial_capital.is_finite() && initial_capital > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "simulation.initial_capital must be positive, got {initial_capital}"
            )));
        }

        Ok(PipelineConfig {
            generator: GeneratorConfig {
                strategies,
                symbols,
                count: g.count,
                mode: g.mode,
                seed: g.seed,
                max_workers: g.max_workers,
                domains,
            },
            in_sample,
            out_sample,
            selection: SelectionConfig {
                criteria: SelectionCriteria {
                    rank_field,
                    direction,
                    top_n: s.top_n,
                    thresholds: Thresholds {
                        min_sharpe: s.min_sharpe,
                        max_drawdown: s.max_drawdown,
                        min_total_return: s.min_total_return,
                    },
                },
                promote: s.promote,
            },
            live,
            initial_capital,
        })
    }
}
