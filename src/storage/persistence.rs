//! JSON snapshots of a cache and its index data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{IndexError, IndexResult};
use crate::indexing::CacheData;
use crate::indexing::cache_data::ENGINE_VERSION;
use crate::storage::memory::CacheEntry;

const SNAPSHOT_FILE: &str = "snapshot.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: String,
    pub created_at: String,
    pub entries: BTreeMap<String, CacheEntry>,
    pub data: CacheData,
}

/// Reads and writes `snapshot.json` under one directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Load the snapshot. A missing file or a different engine version yields `None`.
    pub fn load(&self) -> IndexResult<Option<Snapshot>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&path).map_err(|e| IndexError::io(&path, e))?;
        let snapshot: Snapshot = serde_json::from_str(&json).map_err(|e| IndexError::Snapshot {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        if snapshot.version != ENGINE_VERSION {
            tracing::info!(
                "[cache] ignoring snapshot from version {} (running {ENGINE_VERSION})",
                snapshot.version
            );
            return Ok(None);
        }
        Ok(Some(snapshot))
    }

    /// Write the snapshot through a temporary file so readers never see a partial one.
    pub fn save(&self, entries: &BTreeMap<String, CacheEntry>, data: &CacheData) -> IndexResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| IndexError::io(&self.dir, e))?;

        let snapshot = SnapshotRef {
            version: ENGINE_VERSION,
            created_at: chrono::Utc::now().to_rfc3339(),
            entries,
            data,
        };
        let json = serde_json::to_string(&snapshot)?;

        let path = self.path();
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| IndexError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| IndexError::io(&path, e))?;
        Ok(())
    }

    pub fn clear(&self) -> IndexResult<()> {
        let path = self.path();
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| IndexError::io(&path, e))?;
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Borrowing twin of [`Snapshot`] used for writing.
#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: &'a str,
    created_at: String,
    entries: &'a BTreeMap<String, CacheEntry>,
    data: &'a CacheData,
}
