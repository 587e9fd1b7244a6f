//! Operation records: the lineage entries a dataset accumulates.

use crate::error::{ReconError, Result};
use crate::example::Example;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle of an operation record. There is no failed state: a failing
/// operation aborts the apply call instead of being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    NotStarted,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransformationType {
    ExampleAdded,
    ExampleRemoved,
    ExampleChanged,
}

/// One per-example change: old content hash to new content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transformation {
    #[serde(default)]
    pub prev_example: Option<String>,
    #[serde(default)]
    pub example: Option<String>,
    #[serde(rename = "type")]
    pub kind: TransformationType,
}

impl Transformation {
    pub fn added(hash: String) -> Self {
        Self {
            prev_example: None,
            example: Some(hash),
            kind: TransformationType::ExampleAdded,
        }
    }

    pub fn removed(hash: String) -> Self {
        Self {
            prev_example: Some(hash),
            example: None,
            kind: TransformationType::ExampleRemoved,
        }
    }

    pub fn changed(prev: String, new: String) -> Self {
        Self {
            prev_example: Some(prev),
            example: Some(new),
            kind: TransformationType::ExampleChanged,
        }
    }
}

/// Positional and keyword parameters an operation was invoked with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
    #[serde(default)]
    pub kwargs: BTreeMap<String, serde_json::Value>,
}

impl Invocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: serde_json::Value) -> Self {
        self.args.push(value);
        self
    }

    pub fn kwarg(mut self, key: &str, value: serde_json::Value) -> Self {
        self.kwargs.insert(key.to_string(), value);
        self
    }
}

/// Record of a single operation applied to a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub name: String,
    pub status: OperationStatus,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    #[serde(default)]
    pub examples_added: usize,
    #[serde(default)]
    pub examples_removed: usize,
    #[serde(default)]
    pub examples_changed: usize,
    #[serde(default)]
    pub transformations: Vec<Transformation>,
    #[serde(flatten)]
    pub invocation: Invocation,
}

impl OperationRecord {
    /// A record that has not run yet, carrying the parameters to run it with.
    pub fn pending(name: &str, invocation: Invocation) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            status: OperationStatus::NotStarted,
            start_ts: now,
            end_ts: now,
            examples_added: 0,
            examples_removed: 0,
            examples_changed: 0,
            transformations: Vec::new(),
            invocation,
        }
    }

    /// A completed record with no per-example changes attached.
    pub fn completed(name: &str, start_ts: DateTime<Utc>, invocation: Invocation) -> Self {
        Self {
            status: OperationStatus::Completed,
            start_ts,
            end_ts: Utc::now(),
            ..Self::pending(name, invocation)
        }
    }

    /// Whether this record reports any change to the example list.
    pub fn changed_data(&self) -> bool {
        self.examples_added > 0 || self.examples_removed > 0 || self.examples_changed > 0
    }

    pub fn is_completed(&self) -> bool {
        self.status == OperationStatus::Completed
    }
}

/// What an operation hands back: the new example list and its record.
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub data: Vec<Example>,
    pub state: OperationRecord,
}

impl OperationOutcome {
    pub fn new(data: Vec<Example>, state: OperationRecord) -> Self {
        Self { data, state }
    }

    /// Check the outcome an operation named `expected_name` produced.
    pub fn validate(&self, expected_name: &str) -> Result<()> {
        let state = &self.state;
        if state.name != expected_name {
            return Err(ReconError::invalid_outcome(
                expected_name,
                format!("record is named '{}'", state.name),
            ));
        }
        if !state.is_completed() {
            return Err(ReconError::invalid_outcome(
                expected_name,
                "record status is not COMPLETED",
            ));
        }
        if state.end_ts < state.start_ts {
            return Err(ReconError::invalid_outcome(
                expected_name,
                "end_ts is before start_ts",
            ));
        }
        if !state.transformations.is_empty() {
            let tally = |kind: TransformationType| {
                state
                    .transformations
                    .iter()
                    .filter(|t| t.kind == kind)
                    .count()
            };
            let counts = [
                (
                    "added",
                    state.examples_added,
                    tally(TransformationType::ExampleAdded),
                ),
                (
                    "removed",
                    state.examples_removed,
                    tally(TransformationType::ExampleRemoved),
                ),
                (
                    "changed",
                    state.examples_changed,
                    tally(TransformationType::ExampleChanged),
                ),
            ];
            for (label, declared, actual) in counts {
                if declared != actual {
                    return Err(ReconError::invalid_outcome(
                        expected_name,
                        format!("examples_{label} is {declared} but {actual} transformations"),
                    ));
                }
            }
        }
        Ok(())
    }
}
