//! Estimator snapshots.
//!
//! One estimator is one `<name>.json` file under the store directory. The
//! snapshot holds everything needed to resume a stream: config, users and
//! subjects with their histories, the last threshold record, the last
//! classification id, the dedup set and the classification log. Writes go
//! to a temporary file that is renamed over the snapshot, so readers see
//! either the old or the new state.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use swap_common::{ClassificationId, Config, SubjectId, UserId, SCHEMA_VERSION};
use thiserror::Error;

use crate::collection::{subject_factory, user_factory, Collection};
use crate::logging::{event_names, LogContext, Stage};
use crate::log_event;
use crate::model::{ClassificationRecord, Subject, User};
use crate::swap::Swap;
use crate::thresholds::Thresholds;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid estimator name `{0}`")]
    InvalidName(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("snapshot {} is corrupted: {source}", path.display())]
    Corrupted {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("snapshot schema {actual} is incompatible with {expected}")]
    Schema { expected: String, actual: String },

    #[error("snapshot config is invalid: {0}")]
    Config(String),
}

impl From<StoreError> for swap_common::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io { ref source, .. } => {
                swap_common::Error::Io(io::Error::new(source.kind(), err.to_string()))
            }
            StoreError::Corrupted { .. } => swap_common::Error::SnapshotCorrupted(err.to_string()),
            StoreError::Schema { expected, actual } => {
                swap_common::Error::SchemaMismatch { expected, actual }
            }
            StoreError::InvalidName(_) | StoreError::Config(_) => {
                swap_common::Error::Store(err.to_string())
            }
        }
    }
}

/// Serialized estimator state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapSnapshot {
    pub schema_version: String,
    pub name: String,
    pub saved_at: DateTime<Utc>,
    pub config: Config,
    pub users: Vec<User>,
    pub subjects: Vec<Subject>,
    pub thresholds: Option<Thresholds>,
    pub last_id: Option<ClassificationId>,
    /// Dedup set, sorted for stable output.
    pub seen_classifications: Vec<(UserId, SubjectId)>,
    pub classifications: Vec<ClassificationRecord>,
}

fn major(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

impl Swap {
    pub fn snapshot(&self) -> SwapSnapshot {
        let mut seen: Vec<(UserId, SubjectId)> = self.seen.iter().cloned().collect();
        seen.sort();
        SwapSnapshot {
            schema_version: SCHEMA_VERSION.to_string(),
            name: self.name.clone(),
            saved_at: Utc::now(),
            config: self.config.clone(),
            users: self.users.dump(),
            subjects: self.subjects.dump(),
            thresholds: self.thresholds.clone(),
            last_id: self.last_id,
            seen_classifications: seen,
            classifications: self.classifications.clone(),
        }
    }

    /// Rebuild an estimator. Snapshots from another major schema version
    /// are rejected.
    pub fn from_snapshot(snapshot: SwapSnapshot) -> Result<Self, StoreError> {
        if major(&snapshot.schema_version) != major(SCHEMA_VERSION) {
            return Err(StoreError::Schema {
                expected: SCHEMA_VERSION.to_string(),
                actual: snapshot.schema_version,
            });
        }
        snapshot
            .config
            .validate()
            .map_err(|e| StoreError::Config(e.to_string()))?;

        let SwapSnapshot {
            name,
            config,
            users,
            subjects,
            thresholds,
            last_id,
            seen_classifications,
            classifications,
            ..
        } = snapshot;
        Ok(Swap {
            ctx: LogContext::for_estimator(name.clone()),
            users: Collection::from_items(users, user_factory(config.gamma)),
            subjects: Collection::from_items(subjects, subject_factory(config.p0)),
            name,
            config,
            thresholds,
            last_id,
            seen: seen_classifications.into_iter().collect(),
            classifications,
        })
    }
}

/// Directory of estimator snapshots.
#[derive(Debug, Clone)]
pub struct SwapStore {
    dir: PathBuf,
}

impl SwapStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot path for `name`. Names are plain file stems.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\'])
            && !name.starts_with('.');
        if !valid {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", name)))
    }

    pub fn exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.path_for(name)?.exists())
    }

    /// Load a snapshot; `None` when the estimator has never been saved.
    pub fn load(&self, name: &str) -> Result<Option<Swap>, StoreError> {
        let path = self.path_for(name)?;
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let snapshot: SwapSnapshot = serde_json::from_str(&contents)
            .map_err(|source| StoreError::Corrupted { path: path.clone(), source })?;
        let swap = Swap::from_snapshot(snapshot)?;
        log_event!(
            swap.ctx,
            INFO,
            event_names::PERSIST_LOADED,
            Stage::Persist,
            "estimator loaded",
            users = swap.users.len(),
            subjects = swap.subjects.len(),
            classifications = swap.classifications.len()
        );
        Ok(Some(swap))
    }

    /// Load `name`, or start a fresh estimator with `config`.
    pub fn load_or_init(&self, name: &str, config: Config) -> Result<Swap, StoreError> {
        if let Some(swap) = self.load(name)? {
            return Ok(swap);
        }
        let swap = Swap::new(name, config);
        log_event!(
            swap.ctx,
            INFO,
            event_names::PERSIST_INITIALIZED,
            Stage::Persist,
            "no snapshot found, starting a fresh estimator"
        );
        Ok(swap)
    }

    /// Write the snapshot atomically and return its path.
    pub fn save(&self, swap: &Swap) -> Result<PathBuf, StoreError> {
        let path = self.path_for(&swap.name)?;
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let json = serde_json::to_vec(&swap.snapshot()).map_err(|source| StoreError::Corrupted {
            path: path.clone(),
            source,
        })?;

        let tmp_path = path.with_extension(format!("json.tmp.{}", std::process::id()));
        if let Err(source) = write_and_rename(&tmp_path, &path, &json) {
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::Io { path, source });
        }

        log_event!(
            swap.ctx,
            INFO,
            event_names::PERSIST_SAVED,
            Stage::Persist,
            "estimator saved",
            bytes = json.len()
        );
        Ok(path)
    }

    /// Delete a snapshot. Returns whether one existed.
    pub fn remove(&self, name: &str) -> Result<bool, StoreError> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(
                    target: event_names::PERSIST_REMOVED,
                    estimator = name,
                    stage = %Stage::Persist,
                    message = "estimator snapshot removed"
                );
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

fn write_and_rename(tmp_path: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(tmp_path)?;
    file.write_all(bytes)?;
    file.flush()?;
    let _ = file.sync_all();
    drop(file);
    fs::rename(tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Gold, Vote};
    use tempfile::tempdir;

    fn populated() -> Swap {
        let mut swap = Swap::new("lens", Config::default());
        swap.apply_gold(SubjectId(1), Gold::Real);
        swap.classify(UserId::Id(1), SubjectId(1), Vote::Real, ClassificationId(1));
        swap.classify(UserId::from("guest"), SubjectId(2), Vote::Bogus, ClassificationId(2));
        swap.cycle();
        swap.retire_default();
        swap
    }

    #[test]
    fn snapshot_round_trip_is_exact() {
        let swap = populated();
        let snapshot = swap.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: SwapSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);

        let restored = Swap::from_snapshot(back).unwrap();
        let mut again = restored.snapshot();
        again.saved_at = snapshot.saved_at;
        assert_eq!(again, snapshot);
        assert!(restored.is_seen(&UserId::from("guest"), SubjectId(2)));
    }

    #[test]
    fn store_saves_and_loads() {
        let dir = tempdir().unwrap();
        let store = SwapStore::new(dir.path());
        let swap = populated();
        let path = store.save(&swap).unwrap();
        assert_eq!(path, dir.path().join("lens.json"));
        assert!(!dir.path().join(format!("lens.json.tmp.{}", std::process::id())).exists());

        let loaded = store.load("lens").unwrap().unwrap();
        assert_eq!(loaded.last_id(), swap.last_id());
        assert_eq!(
            loaded.subject(&SubjectId(2)).unwrap(),
            swap.subject(&SubjectId(2)).unwrap()
        );
        assert_eq!(loaded.thresholds(), swap.thresholds());
    }

    #[test]
    fn failed_save_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let store = SwapStore::new(dir.path());
        // a non-empty directory where the snapshot should go blocks the rename
        fs::create_dir_all(dir.path().join("lens.json").join("occupied")).unwrap();

        let err = store.save(&populated()).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn missing_snapshot_initializes() {
        let dir = tempdir().unwrap();
        let store = SwapStore::new(dir.path().join("nested"));
        assert!(store.load("fresh").unwrap().is_none());
        let swap = store.load_or_init("fresh", Config::default()).unwrap();
        assert_eq!(swap.name(), "fresh");
        assert!(swap.users().is_empty());
        assert!(!store.remove("fresh").unwrap());
    }

    #[test]
    fn corrupted_snapshot_is_reported() {
        let dir = tempdir().unwrap();
        let store = SwapStore::new(dir.path());
        fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        let err = store.load("bad").unwrap_err();
        assert!(matches!(err, StoreError::Corrupted { .. }));
        let common: swap_common::Error = err.into();
        assert!(matches!(common, swap_common::Error::SnapshotCorrupted(_)));
    }

    #[test]
    fn foreign_schema_is_rejected() {
        let mut snapshot = populated().snapshot();
        snapshot.schema_version = "9.0.0".to_string();
        assert!(matches!(
            Swap::from_snapshot(snapshot),
            Err(StoreError::Schema { .. })
        ));
    }

    #[test]
    fn names_cannot_escape_the_store() {
        let store = SwapStore::new("/tmp/swap");
        assert!(store.path_for("../etc").is_err());
        assert!(store.path_for("").is_err());
        assert!(store.path_for("a/b").is_err());
        assert!(store.path_for("lens-2024").is_ok());
    }

    #[test]
    fn remove_deletes_snapshot() {
        let dir = tempdir().unwrap();
        let store = SwapStore::new(dir.path());
        store.save(&populated()).unwrap();
        assert!(store.remove("lens").unwrap());
        assert!(!store.exists("lens").unwrap());
    }
}
