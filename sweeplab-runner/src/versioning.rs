//! Artifact versioning — every pipeline output lives under a named version.
//!
//! A version is an experiment run identified by its creation timestamp
//! (`%Y%m%d_%H%M%S`, with a zero-padded `_NNN` suffix when several versions
//! are created in the same second). Creating a version materializes the
//! directory for every `StageKind`, appends to `version_metadata.json`, and
//! makes the new version current.
//!
//! Stages never consult the "current" pointer themselves: callers resolve a
//! `VersionContext` once and pass it down.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sweeplab_core::domain::VersionId;
use thiserror::Error;
use tracing::info;

pub const METADATA_FILE: &str = "version_metadata.json";
pub const VERSION_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Closed set of artifact locations inside a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    InSampleParams,
    InSampleBest,
    OutSampleParams,
    OutSampleBest,
    InSampleSignals,
    OutSampleSignals,
    InSamplePerformance,
    OutSamplePerformance,
    TradingSignal,
    TradingPerformance,
}

impl StageKind {
    pub const ALL: [StageKind; 10] = [
        StageKind::InSampleParams,
        StageKind::InSampleBest,
        StageKind::OutSampleParams,
        StageKind::OutSampleBest,
        StageKind::InSampleSignals,
        StageKind::OutSampleSignals,
        StageKind::InSamplePerformance,
        StageKind::OutSamplePerformance,
        StageKind::TradingSignal,
        StageKind::TradingPerformance,
    ];

    /// Directory under the artifact root; the version id is appended.
    pub fn base_dir(&self) -> &'static str {
        match self {
            Self::InSampleParams => "strategies/in_sample/all_params",
            Self::InSampleBest => "strategies/in_sample/best",
            Self::OutSampleParams => "strategies/out_sample/param_logs",
            Self::OutSampleBest => "strategies/out_sample/best",
            Self::InSampleSignals => "signals/in_sample",
            Self::OutSampleSignals => "signals/out_sample",
            Self::InSamplePerformance => "performance/in_sample",
            Self::OutSamplePerformance => "performance/out_sample",
            Self::TradingSignal => "trading_simulation/signal",
            Self::TradingPerformance => "trading_simulation/performance",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InSampleParams => "in_sample_params",
            Self::InSampleBest => "in_sample_best",
            Self::OutSampleParams => "out_sample_params",
            Self::OutSampleBest => "out_sample_best",
            Self::InSampleSignals => "in_sample_signals",
            Self::OutSampleSignals => "out_sample_signals",
            Self::InSamplePerformance => "in_sample_performance",
            Self::OutSamplePerformance => "out_sample_performance",
            Self::TradingSignal => "trading_signal",
            Self::TradingPerformance => "trading_performance",
        }
    }
}

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("no current version; create one with `version new` first")]
    NoCurrentVersion,

    #[error("unknown version '{0}'")]
    UnknownVersion(VersionId),

    #[error("version metadata I/O at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no version id sorts after '{latest}'")]
    IdExhausted { latest: VersionId },

    #[error("corrupt version metadata at {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One entry of the version log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version_id: VersionId,
    pub created_at: NaiveDateTime,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct VersionMetadata {
    versions: Vec<VersionInfo>,
    current_version: Option<VersionId>,
}

/// Version log for one artifact root.
///
/// Metadata writes (create, set-current) take the write lock; reads of the
/// current pointer and the log take the read lock.
#[derive(Debug)]
pub struct VersionStore {
    root: PathBuf,
    metadata: RwLock<VersionMetadata>,
}

impl VersionStore {
    /// Open the version log under `root`, creating an empty one if absent.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, VersionError> {
        let root = root.into();
        let path = root.join(METADATA_FILE);
        let metadata = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|source| VersionError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&raw).map_err(|source| VersionError::Metadata {
                path: path.clone(),
                source,
            })?
        } else {
            VersionMetadata::default()
        };
        Ok(Self {
            root,
            metadata: RwLock::new(metadata),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self) -> RwLockReadGuard<'_, VersionMetadata> {
        self.metadata.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, VersionMetadata> {
        self.metadata.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a version stamped with the local wall clock.
    pub fn create_version(&self, description: Option<&str>) -> Result<VersionId, VersionError> {
        self.create_version_at(Local::now().naive_local(), description)
    }

    /// Create a version stamped with `now`. The new version becomes current.
    pub fn create_version_at(
        &self,
        now: NaiveDateTime,
        description: Option<&str>,
    ) -> Result<VersionId, VersionError> {
        let mut meta = self.write();

        let latest = meta.versions.iter().map(|v| &v.version_id).max().cloned();
        let candidate = next_version_id(now, latest.as_ref())?;

        for stage in StageKind::ALL {
            let dir = resolve_path(&self.root, &candidate, stage);
            fs::create_dir_all(&dir).map_err(|source| VersionError::Io { path: dir, source })?;
        }
        let version_root = version_root(&self.root, &candidate);
        fs::create_dir_all(&version_root).map_err(|source| VersionError::Io {
            path: version_root,
            source,
        })?;

        let description = description
            .map(str::to_string)
            .unwrap_or_else(|| format!("Version created at {candidate}"));
        let mut next = meta.clone();
        next.versions.push(VersionInfo {
            version_id: candidate.clone(),
            created_at: now,
            description,
        });
        next.current_version = Some(candidate.clone());
        self.persist(&next)?;
        *meta = next;

        info!(version = %candidate, root = %self.root.display(), "created version");
        Ok(candidate)
    }

    pub fn current_version(&self) -> Option<VersionId> {
        self.read().current_version.clone()
    }

    /// Context for the current version, or `NoCurrentVersion`.
    pub fn current_context(&self) -> Result<VersionContext, VersionError> {
        let id = self.current_version().ok_or(VersionError::NoCurrentVersion)?;
        Ok(VersionContext::new(self.root.clone(), id))
    }

    /// Context for a named version; the id must exist in the log.
    pub fn context(&self, id: &VersionId) -> Result<VersionContext, VersionError> {
        if !self.contains(id) {
            return Err(VersionError::UnknownVersion(id.clone()));
        }
        Ok(VersionContext::new(self.root.clone(), id.clone()))
    }

    pub fn resolve_path(&self, version: &VersionId, stage: StageKind) -> PathBuf {
        resolve_path(&self.root, version, stage)
    }

    pub fn list_versions(&self) -> Vec<VersionInfo> {
        self.read().versions.clone()
    }

    pub fn latest_version(&self) -> Option<VersionId> {
        self.read().versions.last().map(|v| v.version_id.clone())
    }

    pub fn contains(&self, id: &VersionId) -> bool {
        self.read().versions.iter().any(|v| &v.version_id == id)
    }

    pub fn set_current_version(&self, id: &VersionId) -> Result<(), VersionError> {
        let mut meta = self.write();
        if !meta.versions.iter().any(|v| &v.version_id == id) {
            return Err(VersionError::UnknownVersion(id.clone()));
        }
        let mut next = meta.clone();
        next.current_version = Some(id.clone());
        self.persist(&next)?;
        *meta = next;
        info!(version = %id, "current version set");
        Ok(())
    }

    fn persist(&self, meta: &VersionMetadata) -> Result<(), VersionError> {
        let path = self.root.join(METADATA_FILE);
        let json = serde_json::to_string_pretty(meta).map_err(|source| VersionError::Metadata {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, json.as_bytes()).map_err(|source| VersionError::Io { path, source })
    }
}

/// Suffixes tried per timestamp before giving up.
const MAX_SUFFIX: u32 = 9_999;

/// First id stamped at `now` (or at `latest`'s stamp when the clock is not
/// past it) that sorts strictly after `latest`.
fn next_version_id(
    now: NaiveDateTime,
    latest: Option<&VersionId>,
) -> Result<VersionId, VersionError> {
    let fresh = VersionId::new(now.format(VERSION_ID_FORMAT).to_string());
    let Some(latest) = latest else {
        return Ok(fresh);
    };
    if fresh > *latest {
        return Ok(fresh);
    }

    let stamp_len = fresh.as_str().len();
    let base = latest
        .as_str()
        .get(..stamp_len)
        .filter(|stamp| NaiveDateTime::parse_from_str(stamp, VERSION_ID_FORMAT).is_ok())
        .unwrap_or(fresh.as_str())
        .to_string();
    (1..=MAX_SUFFIX)
        .map(|suffix| VersionId::new(format!("{base}_{suffix:03}")))
        .find(|candidate| candidate > latest)
        .ok_or_else(|| VersionError::IdExhausted {
            latest: latest.clone(),
        })
}

/// Explicit version handle passed into every stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionContext {
    root: PathBuf,
    version: VersionId,
}

impl VersionContext {
    pub fn new(root: impl Into<PathBuf>, version: VersionId) -> Self {
        Self {
            root: root.into(),
            version,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn version(&self) -> &VersionId {
        &self.version
    }

    pub fn resolve(&self, stage: StageKind) -> PathBuf {
        resolve_path(&self.root, &self.version, stage)
    }

    /// Per-version directory holding the artifact index.
    pub fn version_root(&self) -> PathBuf {
        version_root(&self.root, &self.version)
    }
}

/// Pure mapping from (version, stage) to a directory under `root`.
pub fn resolve_path(root: &Path, version: &VersionId, stage: StageKind) -> PathBuf {
    root.join(stage.base_dir()).join(version.as_str())
}

fn version_root(root: &Path, version: &VersionId) -> PathBuf {
    root.join("versions").join(version.as_str())
}

/// Write to a sibling temp file, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn create_materializes_every_stage_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::open(dir.path()).unwrap();
        let v = store.create_version_at(at(9, 30, 0), None).unwrap();
        assert_eq!(v.as_str(), "20240301_093000");
        for stage in StageKind::ALL {
            assert!(store.resolve_path(&v, stage).is_dir(), "{stage:?} not created");
        }
        assert_eq!(store.current_version(), Some(v));
    }

    #[test]
    fn resolve_path_matches_layout() {
        let v = VersionId::new("20240301_093000");
        let p = resolve_path(Path::new("/data"), &v, StageKind::OutSampleParams);
        assert_eq!(
            p,
            PathBuf::from("/data/strategies/out_sample/param_logs/20240301_093000")
        );
    }

    #[test]
    fn same_second_versions_get_increasing_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::open(dir.path()).unwrap();
        let a = store.create_version_at(at(9, 30, 0), None).unwrap();
        let b = store.create_version_at(at(9, 30, 0), None).unwrap();
        let c = store.create_version_at(at(9, 30, 0), None).unwrap();
        let d = store.create_version_at(at(9, 30, 1), None).unwrap();
        assert_eq!(b.as_str(), "20240301_093000_001");
        assert_eq!(c.as_str(), "20240301_093000_002");
        assert!(a < b && b < c && c < d);
        assert_eq!(store.latest_version(), Some(d));
    }

    #[test]
    fn clock_going_backwards_still_yields_a_later_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::open(dir.path()).unwrap();
        let ten = store.create_version_at(at(10, 0, 0), None).unwrap();
        let nine = store.create_version_at(at(9, 0, 0), None).unwrap();
        let again = store.create_version_at(at(9, 0, 0), None).unwrap();
        assert_eq!(nine.as_str(), "20240301_100000_001");
        assert_eq!(again.as_str(), "20240301_100000_002");
        assert!(ten < nine && nine < again);
        assert_eq!(store.current_version(), Some(again));
    }

    #[test]
    fn foreign_latest_id_is_outranked_or_reported() {
        let latest = VersionId::new("20240301_100000_007");
        let next = next_version_id(at(8, 0, 0), Some(&latest)).unwrap();
        assert_eq!(next.as_str(), "20240301_100000_008");

        let odd = VersionId::new("zz-imported");
        assert!(matches!(
            next_version_id(at(8, 0, 0), Some(&odd)),
            Err(VersionError::IdExhausted { .. })
        ));
    }

    #[test]
    fn metadata_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let v = {
            let store = VersionStore::open(dir.path()).unwrap();
            store.create_version_at(at(10, 0, 0), Some("baseline")).unwrap()
        };
        let store = VersionStore::open(dir.path()).unwrap();
        let versions = store.list_versions();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].description, "baseline");
        assert_eq!(store.current_version(), Some(v));
    }

    #[test]
    fn metadata_file_shape() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::open(dir.path()).unwrap();
        store.create_version_at(at(10, 0, 0), None).unwrap();
        let raw = fs::read_to_string(dir.path().join(METADATA_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["current_version"], "20240301_100000");
        assert_eq!(value["versions"][0]["version_id"], "20240301_100000");
        assert_eq!(
            value["versions"][0]["description"],
            "Version created at 20240301_100000"
        );
    }

    #[test]
    fn no_current_version_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::open(dir.path()).unwrap();
        assert_eq!(store.current_version(), None);
        assert!(matches!(
            store.current_context(),
            Err(VersionError::NoCurrentVersion)
        ));
    }

    #[test]
    fn set_current_rejects_unknown_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::open(dir.path()).unwrap();
        let a = store.create_version_at(at(9, 0, 0), None).unwrap();
        let _b = store.create_version_at(at(9, 0, 1), None).unwrap();
        store.set_current_version(&a).unwrap();
        assert_eq!(store.current_version(), Some(a));

        let err = store
            .set_current_version(&VersionId::new("19990101_000000"))
            .unwrap_err();
        assert!(matches!(err, VersionError::UnknownVersion(_)));
    }

    #[test]
    fn corrupt_metadata_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(METADATA_FILE), "{not json").unwrap();
        assert!(matches!(
            VersionStore::open(dir.path()),
            Err(VersionError::Metadata { .. })
        ));
    }
}
