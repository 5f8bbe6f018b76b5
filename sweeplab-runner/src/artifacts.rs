//! Artifact store — typed reads and writes of every persisted table.
//!
//! Each artifact is addressed by an `ArtifactKey` (kind, stage, and either a
//! strategy/symbol pair or a date). File names are derived from the key and
//! never parsed back: the metadata of every write is appended to
//! `versions/<v>/artifacts.jsonl` as an `ArtifactRecord`, and lookups such as
//! "latest account snapshot before a date" go through that index.
//!
//! Tables are CSV (header row, `NaN` for undefined metrics); parameter logs and
//! maps are pretty-printed JSON.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sweeplab_core::domain::{normalize_symbol, ParamId, ParameterSet, StrategyKind, SymbolError};
use thiserror::Error;

use crate::versioning::{write_atomic, StageKind, VersionContext};

pub const INDEX_FILE: &str = "artifacts.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    ParamLog,
    ParamMap,
    Signals,
    Performance,
    Selection,
    TradeDecisions,
    AccountSnapshot,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParamLog => "param_log",
            Self::ParamMap => "param_map",
            Self::Signals => "signals",
            Self::Performance => "performance",
            Self::Selection => "best",
            Self::TradeDecisions => "trade_decisions",
            Self::AccountSnapshot => "accounts",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Self::ParamLog | Self::ParamMap => "json",
            _ => "csv",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an artifact is about: one strategy on one symbol, or one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactScope {
    Symbol {
        strategy: StrategyKind,
        symbol: String,
    },
    Day(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactKey {
    pub kind: ArtifactKind,
    pub stage: StageKind,
    pub scope: ArtifactScope,
}

impl ArtifactKey {
    pub fn symbol(
        kind: ArtifactKind,
        stage: StageKind,
        strategy: StrategyKind,
        symbol: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            stage,
            scope: ArtifactScope::Symbol {
                strategy,
                symbol: symbol.into(),
            },
        }
    }

    pub fn day(kind: ArtifactKind, stage: StageKind, date: NaiveDate) -> Self {
        Self {
            kind,
            stage,
            scope: ArtifactScope::Day(date),
        }
    }

    pub fn file_name(&self) -> String {
        let scope = match &self.scope {
            ArtifactScope::Symbol { strategy, symbol } => format!("{strategy}_{symbol}"),
            ArtifactScope::Day(date) => date.format("%Y%m%d").to_string(),
        };
        format!("{}_{}.{}", self.kind.as_str(), scope, self.kind.extension())
    }
}

/// One line of the artifact index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub kind: ArtifactKind,
    pub stage: StageKind,
    pub strategy: Option<StrategyKind>,
    pub symbol: Option<String>,
    pub as_of: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
    /// Relative to the artifact root.
    pub path: PathBuf,
    pub rows: usize,
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("missing {kind} artifact: {}", path.display())]
    Missing { kind: ArtifactKind, path: PathBuf },

    #[error("artifact key rejected: {0}")]
    Symbol(#[from] SymbolError),

    #[error("artifact I/O at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("bad CSV in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("bad JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A parameter-log record that could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedParam {
    pub index: usize,
    pub id: Option<String>,
    pub reason: String,
}

impl fmt::Display for MalformedParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "record {} ({id}): {}", self.index, self.reason),
            None => write!(f, "record {}: {}", self.index, self.reason),
        }
    }
}

/// Decoded parameter log: valid sets in log order plus the records skipped.
#[derive(Debug, Clone, Default)]
pub struct LoadedParams {
    pub sets: Vec<ParameterSet>,
    pub malformed: Vec<MalformedParam>,
}

/// Typed access to one version's artifacts.
#[derive(Debug)]
pub struct ArtifactStore {
    ctx: VersionContext,
    index_lock: Mutex<()>,
}

impl ArtifactStore {
    pub fn new(ctx: VersionContext) -> Self {
        Self {
            ctx,
            index_lock: Mutex::new(()),
        }
    }

    pub fn context(&self) -> &VersionContext {
        &self.ctx
    }

    pub fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        self.ctx.resolve(key.stage).join(key.file_name())
    }

    /// `path_for`, refusing symbols that could leave the stage directory.
    fn checked_path(&self, key: &ArtifactKey) -> Result<PathBuf, ArtifactError> {
        if let ArtifactScope::Symbol { symbol, .. } = &key.scope {
            normalize_symbol(symbol)?;
        }
        Ok(self.path_for(key))
    }

    fn existing_path(&self, key: &ArtifactKey) -> Result<PathBuf, ArtifactError> {
        let path = self.checked_path(key)?;
        if !path.is_file() {
            return Err(ArtifactError::Missing {
                kind: key.kind,
                path,
            });
        }
        Ok(path)
    }

    // ── CSV tables ──────────────────────────────────────────────────

    /// Write `rows` as a CSV table and index it.
    pub fn write_table<T: Serialize>(
        &self,
        key: &ArtifactKey,
        rows: &[T],
    ) -> Result<PathBuf, ArtifactError> {
        let path = self.checked_path(key)?;
        let mut wtr = csv::Writer::from_writer(vec![]);
        for row in rows {
            wtr.serialize(row).map_err(|source| ArtifactError::Csv {
                path: path.clone(),
                source,
            })?;
        }
        let bytes = wtr.into_inner().map_err(|e| ArtifactError::Io {
            path: path.clone(),
            source: e.into_error(),
        })?;
        self.commit(key, &path, &bytes, rows.len())?;
        Ok(path)
    }

    pub fn read_table<T: DeserializeOwned>(&self, key: &ArtifactKey) -> Result<Vec<T>, ArtifactError> {
        let path = self.existing_path(key)?;
        let mut rdr = csv::Reader::from_path(&path).map_err(|source| ArtifactError::Csv {
            path: path.clone(),
            source,
        })?;
        rdr.deserialize()
            .collect::<Result<Vec<T>, _>>()
            .map_err(|source| ArtifactError::Csv { path, source })
    }

    // ── Parameter logs ──────────────────────────────────────────────

    /// Write the ordered log and the id-keyed map for one (strategy, symbol).
    pub fn write_params(
        &self,
        stage: StageKind,
        strategy: StrategyKind,
        symbol: &str,
        sets: &[ParameterSet],
    ) -> Result<Vec<PathBuf>, ArtifactError> {
        let log_key = ArtifactKey::symbol(ArtifactKind::ParamLog, stage, strategy, symbol);
        let map_key = ArtifactKey::symbol(ArtifactKind::ParamMap, stage, strategy, symbol);

        let map: BTreeMap<&ParamId, &ParameterSet> = sets.iter().map(|s| (&s.id, s)).collect();
        let log_path = self.write_json(&log_key, sets, sets.len())?;
        let map_path = self.write_json(&map_key, &map, map.len())?;
        Ok(vec![log_path, map_path])
    }

    /// Read a parameter log, decoding each record for `strategy`.
    ///
    /// Records that fail to decode are returned in `malformed`, not as an error.
    pub fn read_params(
        &self,
        stage: StageKind,
        strategy: StrategyKind,
        symbol: &str,
    ) -> Result<LoadedParams, ArtifactError> {
        let key = ArtifactKey::symbol(ArtifactKind::ParamLog, stage, strategy, symbol);
        let records: Vec<serde_json::Value> = self.read_json(&key)?;

        let mut loaded = LoadedParams::default();
        for (index, record) in records.iter().enumerate() {
            match ParameterSet::from_record(strategy, record) {
                Ok(set) => loaded.sets.push(set),
                Err(e) => loaded.malformed.push(MalformedParam {
                    index,
                    id: record_id(record),
                    reason: e.to_string(),
                }),
            }
        }
        Ok(loaded)
    }

    fn write_json<T: Serialize + ?Sized>(
        &self,
        key: &ArtifactKey,
        value: &T,
        rows: usize,
    ) -> Result<PathBuf, ArtifactError> {
        let path = self.checked_path(key)?;
        let json = serde_json::to_vec_pretty(value).map_err(|source| ArtifactError::Json {
            path: path.clone(),
            source,
        })?;
        self.commit(key, &path, &json, rows)?;
        Ok(path)
    }

    fn read_json<T: DeserializeOwned>(&self, key: &ArtifactKey) -> Result<T, ArtifactError> {
        let path = self.existing_path(key)?;
        let raw = fs::read(&path).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| ArtifactError::Json { path, source })
    }

    // ── Index ───────────────────────────────────────────────────────

    fn commit(
        &self,
        key: &ArtifactKey,
        path: &Path,
        bytes: &[u8],
        rows: usize,
    ) -> Result<(), ArtifactError> {
        write_atomic(path, bytes).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let (strategy, symbol, as_of) = match &key.scope {
            ArtifactScope::Symbol { strategy, symbol } => (Some(*strategy), Some(symbol.clone()), None),
            ArtifactScope::Day(date) => (None, None, Some(*date)),
        };
        let record = ArtifactRecord {
            kind: key.kind,
            stage: key.stage,
            strategy,
            symbol,
            as_of,
            created_at: Local::now().naive_local(),
            path: path
                .strip_prefix(self.ctx.root())
                .unwrap_or(path)
                .to_path_buf(),
            rows,
        };
        self.append_index(&record)
    }

    fn index_path(&self) -> PathBuf {
        self.ctx.version_root().join(INDEX_FILE)
    }

    fn append_index(&self, record: &ArtifactRecord) -> Result<(), ArtifactError> {
        let path = self.index_path();
        let json = serde_json::to_string(record).map_err(|source| ArtifactError::Json {
            path: path.clone(),
            source,
        })?;

        let _guard = self.index_lock.lock().unwrap_or_else(|e| e.into_inner());
        let io_err = |source: io::Error| ArtifactError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        writeln!(file, "{json}").map_err(io_err)?;
        file.flush().map_err(io_err)
    }

    /// Every index entry in write order. Malformed lines are skipped.
    pub fn records(&self) -> Result<Vec<ArtifactRecord>, ArtifactError> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let io_err = |source: io::Error| ArtifactError::Io {
            path: path.clone(),
            source,
        };
        let file = fs::File::open(&path).map_err(io_err)?;
        let mut records = Vec::new();
        for line in io::BufReader::new(file).lines() {
            let line = line.map_err(io_err)?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(record) = serde_json::from_str::<ArtifactRecord>(&line) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Index entries of one kind in one stage.
    fn list(&self, kind: ArtifactKind, stage: StageKind) -> Result<Vec<ArtifactRecord>, ArtifactError> {
        Ok(self
            .records()?
            .into_iter()
            .filter(|r| r.kind == kind && r.stage == stage)
            .collect())
    }

    /// Date of the most recent account snapshot strictly before `date`.
    pub fn latest_snapshot_before(&self, date: NaiveDate) -> Result<Option<NaiveDate>, ArtifactError> {
        Ok(self
            .list(ArtifactKind::AccountSnapshot, StageKind::TradingPerformance)?
            .into_iter()
            .filter_map(|r| r.as_of)
            .filter(|d| *d < date)
            .max())
    }
}

fn record_id(record: &serde_json::Value) -> Option<String> {
    record.get("id").and_then(|v| v.as_str()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performance::PerformanceRecord;
    use crate::versioning::VersionStore;
    use sweeplab_core::domain::StrategyParams;

    fn store(dir: &Path) -> ArtifactStore {
        let versions = VersionStore::open(dir).unwrap();
        versions.create_version(None).unwrap();
        ArtifactStore::new(versions.current_context().unwrap())
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn file_names_come_from_keys() {
        let k = ArtifactKey::symbol(
            ArtifactKind::ParamLog,
            StageKind::InSampleParams,
            StrategyKind::Rsi,
            "AAPL",
        );
        assert_eq!(k.file_name(), "param_log_RSI_AAPL.json");
        let k = ArtifactKey::symbol(
            ArtifactKind::Selection,
            StageKind::OutSampleBest,
            StrategyKind::Cross,
            "TSLA",
        );
        assert_eq!(k.file_name(), "best_CROSS_TSLA.csv");
        let k = ArtifactKey::day(ArtifactKind::AccountSnapshot, StageKind::TradingPerformance, date(5));
        assert_eq!(k.file_name(), "accounts_20240105.csv");
    }

    #[test]
    fn symbols_cannot_escape_the_stage_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let err = store
            .write_params(StageKind::InSampleParams, StrategyKind::Rsi, "../../EVIL", &[])
            .unwrap_err();
        assert!(matches!(err, ArtifactError::Symbol(_)));
        assert!(matches!(
            store.read_params(StageKind::InSampleParams, StrategyKind::Rsi, "a/b"),
            Err(ArtifactError::Symbol(_))
        ));
        assert!(store.records().unwrap().is_empty());
    }

    #[test]
    fn table_write_read_keeps_nan() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let key = ArtifactKey::symbol(
            ArtifactKind::Performance,
            StageKind::InSamplePerformance,
            StrategyKind::Rsi,
            "AAPL",
        );
        let rows = vec![
            PerformanceRecord {
                param_id: ParamId::new("RSI_a"),
                total_return: 0.1,
                max_drawdown: -0.05,
                sharpe: 1.2,
            },
            PerformanceRecord::degenerate(ParamId::new("RSI_b")),
        ];
        let path = store.write_table(&key, &rows).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("param_id,total_return,max_drawdown,sharpe"));
        assert!(raw.contains("NaN"));

        let back: Vec<PerformanceRecord> = store.read_table(&key).unwrap();
        assert_eq!(back[0], rows[0]);
        assert!(back[1].is_degenerate());
    }

    #[test]
    fn missing_table_reports_resolved_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let key = ArtifactKey::symbol(
            ArtifactKind::Signals,
            StageKind::InSampleSignals,
            StrategyKind::Rsi,
            "NOPE",
        );
        match store.read_table::<PerformanceRecord>(&key) {
            Err(ArtifactError::Missing { kind, path }) => {
                assert_eq!(kind, ArtifactKind::Signals);
                assert_eq!(path, store.path_for(&key));
            }
            other => panic!("expected Missing, got {other:?}"),
        }
    }

    #[test]
    fn params_round_trip_and_skip_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let sets = vec![ParameterSet::new(
            ParamId::new("RSI_x"),
            StrategyParams::Rsi {
                period: 14,
                upper: 70.0,
                lower: 30.0,
            },
        )];
        store
            .write_params(StageKind::InSampleParams, StrategyKind::Rsi, "AAPL", &sets)
            .unwrap();
        let loaded = store
            .read_params(StageKind::InSampleParams, StrategyKind::Rsi, "AAPL")
            .unwrap();
        assert_eq!(loaded.sets, sets);
        assert!(loaded.malformed.is_empty());

        // Hand-edited log with one broken record.
        let key = ArtifactKey::symbol(
            ArtifactKind::ParamLog,
            StageKind::InSampleParams,
            StrategyKind::Rsi,
            "MSFT",
        );
        let path = store.path_for(&key);
        fs::write(
            &path,
            r#"[{"id":"RSI_ok","period":10,"upper":80,"lower":20},{"id":"RSI_bad","period":10}]"#,
        )
        .unwrap();
        let loaded = store
            .read_params(StageKind::InSampleParams, StrategyKind::Rsi, "MSFT")
            .unwrap();
        assert_eq!(loaded.sets.len(), 1);
        assert_eq!(loaded.malformed.len(), 1);
        assert_eq!(loaded.malformed[0].id.as_deref(), Some("RSI_bad"));
    }

    #[test]
    fn param_map_is_keyed_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let sets = vec![ParameterSet::new(
            ParamId::new("CROSS_y"),
            StrategyParams::Cross {
                fast_period: 5,
                slow_period: 20,
            },
        )];
        let paths = store
            .write_params(StageKind::InSampleParams, StrategyKind::Cross, "SPY", &sets)
            .unwrap();
        let raw = fs::read_to_string(&paths[1]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["CROSS_y"]["fast_period"], 5);
        assert_eq!(value["CROSS_y"]["id"], "CROSS_y");
    }

    #[test]
    fn index_tracks_writes_and_snapshot_dates() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let empty: Vec<PerformanceRecord> = Vec::new();
        for d in [2, 3, 5] {
            let key = ArtifactKey::day(ArtifactKind::AccountSnapshot, StageKind::TradingPerformance, date(d));
            store.write_table(&key, &empty).unwrap();
        }
        let records = store.records().unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.path.is_relative()));

        assert_eq!(store.latest_snapshot_before(date(5)).unwrap(), Some(date(3)));
        assert_eq!(store.latest_snapshot_before(date(9)).unwrap(), Some(date(5)));
        assert_eq!(store.latest_snapshot_before(date(2)).unwrap(), None);
    }

    #[test]
    fn malformed_index_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let empty: Vec<PerformanceRecord> = Vec::new();
        let key = ArtifactKey::day(ArtifactKind::TradeDecisions, StageKind::TradingSignal, date(2));
        store.write_table(&key, &empty).unwrap();
        let mut f = OpenOptions::new().append(true).open(store.index_path()).unwrap();
        writeln!(f, "{{garbage").unwrap();
        assert_eq!(store.records().unwrap().len(), 1);
    }
}
