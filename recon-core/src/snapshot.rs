//! Persisted snapshot: the lineage as of the last successful save.

use crate::error::Result;
use crate::hashing::lineage_hash;
use crate::operation::OperationRecord;
use crate::persistence;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Contents of `<dir>/<state_dir>/<name>/state.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSnapshot {
    pub name: String,
    /// Content hash of the example list at save time.
    pub commit: String,
    pub size: usize,
    #[serde(default)]
    pub operations: Vec<OperationRecord>,
    /// Hash chain over `operations`. Absent in snapshots from older writers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineage: Option<String>,
}

impl DatasetSnapshot {
    pub fn new(name: &str, commit: String, size: usize, operations: Vec<OperationRecord>) -> Self {
        let lineage = Some(lineage_hash(name, &operations));
        Self {
            name: name.to_string(),
            commit,
            size,
            operations,
            lineage,
        }
    }

    /// Whether the stored lineage hash still matches the stored history.
    /// Snapshots without a lineage hash are trusted.
    pub fn lineage_intact(&self) -> bool {
        match &self.lineage {
            Some(stored) => *stored == lineage_hash(&self.name, &self.operations),
            None => true,
        }
    }

    /// Read a snapshot; `Ok(None)` when none has been saved yet.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        Ok(persistence::load_json(path)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        persistence::atomic_write_json(path, self)?;
        Ok(())
    }
}

/// On-disk locations of a dataset's lineage state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub dir: PathBuf,
    pub state_file: PathBuf,
    pub store_file: PathBuf,
}

impl StatePaths {
    pub fn new(output_dir: &Path, state_dir: &str, name: &str) -> Self {
        let dir = output_dir.join(state_dir).join(name);
        Self {
            state_file: dir.join("state.json"),
            store_file: dir.join("example_store.jsonl"),
            dir,
        }
    }

    /// Paths for the example file at `data_path`; state lives beside it.
    pub fn for_data_file(data_path: &Path, state_dir: &str, name: &str) -> Self {
        Self::new(&parent_dir(data_path), state_dir, name)
    }
}

/// Directory containing `path`, treating a bare file name as the current dir.
pub(crate) fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
