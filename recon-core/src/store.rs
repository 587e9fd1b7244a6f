//! Raw example store: every example body a dataset has ever held, keyed by
//! content hash, so transformation mappings can be decoded later.

use crate::error::Result;
use crate::example::Example;
use crate::hashing::example_hash;
use crate::persistence;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreEntry {
    hash: String,
    example: Example,
}

/// Content-addressed store of example bodies.
#[derive(Debug, Clone, Default)]
pub struct ExampleStore {
    examples: BTreeMap<String, Example>,
}

impl ExampleStore {
    pub fn new() -> Self {
        Self {
            examples: BTreeMap::new(),
        }
    }

    pub fn from_examples(examples: &[Example]) -> Self {
        let mut store = Self::new();
        store.extend(examples);
        store
    }

    /// Add an example, returning its content hash.
    pub fn add(&mut self, example: &Example) -> String {
        let hash = example_hash(example);
        self.examples
            .entry(hash.clone())
            .or_insert_with(|| example.clone());
        hash
    }

    pub fn extend(&mut self, examples: &[Example]) {
        for example in examples {
            self.add(example);
        }
    }

    pub fn get(&self, hash: &str) -> Option<&Example> {
        self.examples.get(hash)
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.examples.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Write the store as JSONL, one `{hash, example}` per line, hash-ordered.
    pub fn to_disk(&self, path: &Path) -> Result<()> {
        let entries: Vec<StoreEntry> = self
            .examples
            .iter()
            .map(|(hash, example)| StoreEntry {
                hash: hash.clone(),
                example: example.clone(),
            })
            .collect();
        persistence::atomic_write_jsonl(path, &entries)?;
        tracing::debug!(path = %path.display(), entries = entries.len(), "Wrote example store");
        Ok(())
    }

    /// Read a store written by [`to_disk`](Self::to_disk). A missing file
    /// yields an empty store.
    pub fn from_disk(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let entries: Vec<StoreEntry> = persistence::read_jsonl(path)?;
        let mut store = Self::new();
        for entry in entries {
            // Re-key by recomputed hash so a hand-edited file can't alias bodies.
            let hash = example_hash(&entry.example);
            if hash != entry.hash {
                tracing::warn!(
                    stored = %entry.hash,
                    actual = %hash,
                    "Example store entry hash mismatch"
                );
            }
            store.examples.insert(hash, entry.example);
        }
        Ok(store)
    }
}
