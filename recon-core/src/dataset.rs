//! The dataset lineage engine.
//!
//! A [`Dataset`] owns an ordered example list and the history of every
//! operation applied to it. Mutation happens only through [`Dataset::apply_`]
//! or load-time reconciliation, so the history always explains the data.
//!
//! ## Load / reconcile flow
//! 1. Read the persisted snapshot for the dataset name, if any.
//! 2. Load examples through the [`Loader`] and run the [`LoadingPipeline`].
//! 3. If the fresh commit hash differs from the snapshot's, record an
//!    `examples_added_external` operation and mark every earlier record
//!    `NOT_STARTED`.
//! 4. Replay pending records that the [`OperationRegistry`] can resolve, in
//!    place, per the [`ReplayPolicy`].
//!
//! There is no locking: one process owns a dataset's state directory at a time.

use crate::config::{CONFIG_FILE_NAME, ReconConfig, ReplayPolicy};
use crate::error::{ReconError, Result};
use crate::example::Example;
use crate::hashing::{dataset_hash, lineage_hash};
use crate::io::{JsonlLoader, JsonlWriter, Loader, LoadingPipeline, Writer};
use crate::operation::{Invocation, OperationOutcome, OperationRecord, OperationStatus};
use crate::registry::{Operation, OperationRegistry};
use crate::snapshot::{parent_dir, DatasetSnapshot, StatePaths};
use crate::store::ExampleStore;
use chrono::Utc;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Name of the synthetic record appended when data changed outside recon.
pub const EXTERNAL_CHANGE_OPERATION: &str = "examples_added_external";

/// How to read a dataset back from disk.
pub struct LoadOptions {
    pub loader: Box<dyn Loader>,
    pub pipeline: LoadingPipeline,
    pub replay_policy: ReplayPolicy,
    pub state_dir: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            loader: Box::new(JsonlLoader),
            pipeline: LoadingPipeline::new(),
            replay_policy: ReplayPolicy::default(),
            state_dir: ReconConfig::default().state_dir,
        }
    }
}

impl LoadOptions {
    pub fn from_config(config: &ReconConfig) -> Result<Self> {
        Ok(Self {
            pipeline: LoadingPipeline::from_names(&config.loading_pipeline)?,
            replay_policy: config.replay_policy,
            state_dir: config.state_dir.clone(),
            ..Default::default()
        })
    }
}

/// How to write a dataset to disk.
pub struct SaveOptions {
    pub writer: Box<dyn Writer>,
    /// Create the output directory if it does not exist.
    pub force: bool,
    /// Persist the raw example store alongside the state.
    pub save_examples: bool,
    pub state_dir: String,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            writer: Box::new(JsonlWriter),
            force: false,
            save_examples: true,
            state_dir: ReconConfig::default().state_dir,
        }
    }
}

impl SaveOptions {
    pub fn from_config(config: &ReconConfig) -> Self {
        Self {
            force: config.force,
            save_examples: config.save_examples,
            state_dir: config.state_dir.clone(),
            ..Default::default()
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn save_examples(mut self, save_examples: bool) -> Self {
        self.save_examples = save_examples;
        self
    }
}

/// A named, versioned example list with its operation history.
#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    examples: Vec<Example>,
    operations: Vec<OperationRecord>,
    example_store: ExampleStore,
}

impl Dataset {
    /// A fresh, empty dataset.
    pub fn new(name: &str) -> Self {
        Self::with_examples(name, Vec::new())
    }

    /// A fresh dataset over `examples` with an empty history.
    pub fn with_examples(name: &str, examples: Vec<Example>) -> Self {
        let example_store = ExampleStore::from_examples(&examples);
        Self {
            name: name.to_string(),
            examples,
            operations: Vec::new(),
            example_store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    pub fn operations(&self) -> &[OperationRecord] {
        &self.operations
    }

    pub fn example_store(&self) -> &ExampleStore {
        &self.example_store
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Content hash of the current example list. Computed on every call.
    pub fn commit_hash(&self) -> String {
        dataset_hash(&self.examples)
    }

    /// Hash chain over the current operation history.
    pub fn lineage_hash(&self) -> String {
        lineage_hash(&self.name, &self.operations)
    }

    /// Run a read-only function over the examples. Records nothing.
    pub fn apply<R>(&self, func: impl FnOnce(&[Example]) -> R) -> R {
        func(&self.examples)
    }

    /// Run `operation` and record its outcome.
    ///
    /// The record is always appended. The example list is replaced only if
    /// the record reports added, removed or changed examples; an operation
    /// that reports no change cannot swap in a different list. On error
    /// nothing is recorded and the examples are untouched.
    pub fn apply_(
        &mut self,
        operation: &dyn Operation,
        invocation: &Invocation,
        initial_state: Option<&OperationRecord>,
    ) -> Result<()> {
        let outcome = self.execute(operation, invocation, initial_state)?;
        self.absorb(outcome, None);
        Ok(())
    }

    /// Resolve `name` in `registry` and apply it.
    pub fn apply_named(
        &mut self,
        registry: &OperationRegistry,
        name: &str,
        invocation: &Invocation,
    ) -> Result<()> {
        let operation = registry
            .get(name)
            .ok_or_else(|| ReconError::not_found(format!("operation '{name}'")))?;
        self.apply_(operation.as_ref(), invocation, None)
    }

    fn execute(
        &self,
        operation: &dyn Operation,
        invocation: &Invocation,
        initial_state: Option<&OperationRecord>,
    ) -> Result<OperationOutcome> {
        let name = operation.name();
        debug!(
            dataset = %self.name,
            operation = %name,
            resume = initial_state.is_some(),
            "Running operation"
        );
        let outcome = operation.run(self, invocation, initial_state)?;
        outcome.validate(name)?;
        Ok(outcome)
    }

    /// Fold a validated outcome into the dataset. `slot` replaces an
    /// existing record in place (replay) instead of appending.
    fn absorb(&mut self, outcome: OperationOutcome, slot: Option<usize>) {
        let OperationOutcome { data, state } = outcome;
        let changed = state.changed_data();
        info!(
            dataset = %self.name,
            operation = %state.name,
            added = state.examples_added,
            removed = state.examples_removed,
            changed = state.examples_changed,
            "Operation completed"
        );

        match slot {
            Some(idx) => self.operations[idx] = state,
            None => self.operations.push(state),
        }
        if changed {
            self.example_store.extend(&data);
            self.examples = data;
        }
    }

    /// Load the dataset `name` from `path`, reconciling against its last
    /// saved snapshot and replaying pending operations found in `registry`.
    pub fn load(
        name: &str,
        path: &Path,
        registry: &OperationRegistry,
        options: &LoadOptions,
    ) -> Result<Self> {
        validate_name(name)?;
        let paths = StatePaths::for_data_file(path, &options.state_dir, name);

        let snapshot = DatasetSnapshot::read(&paths.state_file)?;
        if let Some(snapshot) = &snapshot {
            if !snapshot.lineage_intact() {
                warn!(
                    dataset = %name,
                    path = %paths.state_file.display(),
                    "Stored lineage hash does not match operation history"
                );
            }
        }

        let examples = options.pipeline.run(options.loader.load(path)?);
        let mut example_store = ExampleStore::from_disk(&paths.store_file)?;
        example_store.extend(&examples);

        let mut dataset = Self {
            name: name.to_string(),
            examples,
            operations: Vec::new(),
            example_store,
        };

        if let Some(snapshot) = snapshot {
            dataset.operations = snapshot.operations;
            dataset.detect_external_change(&snapshot.commit, snapshot.size);
        }

        let replayed = dataset.replay_pending(registry, options.replay_policy)?;
        info!(
            dataset = %dataset.name,
            examples = dataset.len(),
            operations = dataset.operations.len(),
            replayed,
            commit = %dataset.commit_hash(),
            "Loaded dataset"
        );
        Ok(dataset)
    }

    /// Compare the current content against a saved commit. On mismatch,
    /// append the synthetic external-change record and reset every earlier
    /// record to `NOT_STARTED`. Returns whether a change was detected.
    fn detect_external_change(&mut self, saved_commit: &str, saved_size: usize) -> bool {
        let commit = self.commit_hash();
        if commit == saved_commit {
            return false;
        }

        let size = self.len();
        warn!(
            dataset = %self.name,
            saved = %saved_commit,
            current = %commit,
            saved_size,
            size,
            "Examples changed outside recon"
        );

        for record in &mut self.operations {
            record.status = OperationStatus::NotStarted;
        }

        let mut record =
            OperationRecord::completed(EXTERNAL_CHANGE_OPERATION, Utc::now(), Invocation::new());
        record.examples_added = size.saturating_sub(saved_size);
        record.examples_removed = saved_size.saturating_sub(size);
        self.operations.push(record);
        true
    }

    /// Indices of the records reconciliation will replay, in history order.
    ///
    /// Under [`ReplayPolicy::FirstOccurrence`] only the oldest record of each
    /// name across the whole history is a candidate, whatever its status. A
    /// later duplicate is never selected, so it stays pending across loads.
    pub fn pending_replays(
        &self,
        registry: &OperationRegistry,
        policy: ReplayPolicy,
    ) -> Vec<usize> {
        let mut seen: HashSet<&str> = HashSet::new();
        self.operations
            .iter()
            .enumerate()
            .filter(|(_, record)| match policy {
                ReplayPolicy::FirstOccurrence => seen.insert(record.name.as_str()),
                ReplayPolicy::FullSequence => true,
            })
            .filter(|(_, record)| {
                record.status == OperationStatus::NotStarted && registry.contains(&record.name)
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Re-run pending records with their stored parameters. Each replayed
    /// record is replaced at its original position. Returns how many ran.
    pub fn replay_pending(
        &mut self,
        registry: &OperationRegistry,
        policy: ReplayPolicy,
    ) -> Result<usize> {
        let pending = self.pending_replays(registry, policy);
        for &idx in &pending {
            let record = self.operations[idx].clone();
            let operation = registry
                .get(&record.name)
                .ok_or_else(|| ReconError::not_found(format!("operation '{}'", record.name)))?;
            let outcome = self.execute(operation.as_ref(), &record.invocation, Some(&record))?;
            self.absorb(outcome, Some(idx));
        }
        Ok(pending.len())
    }

    /// Write the examples to `path` and the lineage state beside it.
    ///
    /// Without `force`, the directory containing `path` must already exist.
    /// The snapshot is written last, so it only ever describes a save whose
    /// example data made it to disk.
    pub fn save(&self, path: &Path, options: &SaveOptions) -> Result<()> {
        validate_name(&self.name)?;
        let output_dir = parent_dir(path);
        if !output_dir.exists() {
            if !options.force {
                return Err(ReconError::MissingDirectory(output_dir));
            }
            std::fs::create_dir_all(&output_dir)?;
        }

        let paths = StatePaths::new(&output_dir, &options.state_dir, &self.name);
        std::fs::create_dir_all(&paths.dir)?;

        options.writer.write(path, &self.examples)?;
        if options.save_examples {
            self.example_store.to_disk(&paths.store_file)?;
        }

        let snapshot = self.snapshot();
        snapshot.write(&paths.state_file)?;
        info!(
            dataset = %self.name,
            path = %path.display(),
            commit = %snapshot.commit,
            size = snapshot.size,
            "Saved dataset"
        );
        Ok(())
    }

    /// The snapshot [`save`](Self::save) would persist right now.
    pub fn snapshot(&self) -> DatasetSnapshot {
        DatasetSnapshot::new(
            &self.name,
            self.commit_hash(),
            self.len(),
            self.operations.clone(),
        )
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(ReconError::invalid_input(format!(
            "dataset name '{name}' must be a single path component"
        )));
    }
    // State lives in `.recon/<name>/`, next to the workspace config file.
    if name == CONFIG_FILE_NAME {
        return Err(ReconError::invalid_input(format!(
            "dataset name '{name}' is reserved"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::example::Span;
    use crate::registry::FnOperation;
    use serde_json::json;

    fn dedup(examples: &[Example], _: &Invocation) -> Result<Vec<Example>> {
        let mut out: Vec<Example> = Vec::new();
        for example in examples {
            if !out.contains(example) {
                out.push(example.clone());
            }
        }
        Ok(out)
    }

    /// Reports no change but hands back an empty list.
    struct LyingNoop;

    impl Operation for LyingNoop {
        fn name(&self) -> &str {
            "noop"
        }

        fn run(
            &self,
            _dataset: &Dataset,
            invocation: &Invocation,
            _initial_state: Option<&OperationRecord>,
        ) -> Result<OperationOutcome> {
            let state = OperationRecord::completed("noop", Utc::now(), invocation.clone());
            Ok(OperationOutcome::new(Vec::new(), state))
        }
    }

    struct Failing;

    impl Operation for Failing {
        fn name(&self) -> &str {
            "explode"
        }

        fn run(
            &self,
            _dataset: &Dataset,
            _invocation: &Invocation,
            _initial_state: Option<&OperationRecord>,
        ) -> Result<OperationOutcome> {
            Err(ReconError::operation("explode", "boom"))
        }
    }

    /// Records itself under a different name than it is registered with.
    struct Misnamed;

    impl Operation for Misnamed {
        fn name(&self) -> &str {
            "lowercase"
        }

        fn run(
            &self,
            dataset: &Dataset,
            invocation: &Invocation,
            _initial_state: Option<&OperationRecord>,
        ) -> Result<OperationOutcome> {
            let mut state = OperationRecord::completed("uppercase", Utc::now(), invocation.clone());
            state.examples_changed = 1;
            Ok(OperationOutcome::new(dataset.examples()[1..].to_vec(), state))
        }
    }

    fn ner() -> Dataset {
        let text = "Apple hired Tim";
        let tagged = Example::new(text).with_span(Span::over(text, 0, 5, "ORG").unwrap());
        Dataset::with_examples("ner", vec![tagged.clone(), tagged, Example::new("plain")])
    }

    #[test]
    fn test_new_datasets_do_not_share_examples() {
        let a = Dataset::new("a");
        let mut b = Dataset::new("b");
        b.apply_(
            &FnOperation::new(
                "add",
                |_: &[Example], _: &Invocation| -> Result<Vec<Example>> {
                    Ok(vec![Example::new("x")])
                },
            ),
            &Invocation::new(),
            None,
        )
        .unwrap();
        assert!(a.is_empty());
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_apply_is_read_only() {
        let dataset = ner();
        let before = dataset.commit_hash();
        let labels =
            dataset.apply(|examples| examples.iter().filter(|e| !e.spans.is_empty()).count());
        assert_eq!(labels, 2);
        assert_eq!(dataset.commit_hash(), before);
        assert!(dataset.operations().is_empty());
    }

    #[test]
    fn test_apply_records_dedup() {
        let mut dataset = ner();
        dataset
            .apply_(&FnOperation::new("dedup", dedup), &Invocation::new(), None)
            .unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.operations().len(), 1);
        let record = &dataset.operations()[0];
        assert_eq!(record.name, "dedup");
        assert_eq!(record.status, OperationStatus::Completed);
        assert_eq!(record.examples_removed, 1);
    }

    #[test]
    fn test_noop_outcome_keeps_examples() {
        let mut dataset = ner();
        let before = dataset.examples().to_vec();
        dataset.apply_(&LyingNoop, &Invocation::new(), None).unwrap();
        assert_eq!(dataset.examples(), before.as_slice());
        assert_eq!(dataset.operations().len(), 1);
    }

    #[test]
    fn test_reorder_only_operation_replaces_examples() {
        let mut dataset =
            Dataset::with_examples("ner", vec![Example::new("b"), Example::new("a")]);
        let before = dataset.commit_hash();
        let sort = FnOperation::new(
            "sort",
            |examples: &[Example], _: &Invocation| -> Result<Vec<Example>> {
                let mut sorted = examples.to_vec();
                sorted.sort_by(|a, b| a.text.cmp(&b.text));
                Ok(sorted)
            },
        );
        dataset.apply_(&sort, &Invocation::new(), None).unwrap();

        let texts: Vec<&str> = dataset.examples().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b"]);
        assert_eq!(dataset.operations()[0].examples_changed, 2);
        assert_ne!(dataset.commit_hash(), before);
    }

    #[test]
    fn test_failed_operation_records_nothing() {
        let mut dataset = ner();
        let before = dataset.commit_hash();
        let err = dataset.apply_(&Failing, &Invocation::new(), None).unwrap_err();
        assert!(matches!(err, ReconError::Operation { .. }));
        assert!(dataset.operations().is_empty());
        assert_eq!(dataset.commit_hash(), before);
    }

    #[test]
    fn test_invalid_outcome_is_rejected() {
        let mut dataset = ner();
        let err = dataset.apply_(&Misnamed, &Invocation::new(), None).unwrap_err();
        assert!(matches!(err, ReconError::InvalidOutcome { .. }));
        assert!(dataset.operations().is_empty());
        assert_eq!(dataset.len(), 3);
    }

    #[test]
    fn test_apply_named_unknown_operation() {
        let mut dataset = ner();
        let registry = OperationRegistry::new();
        let err = dataset
            .apply_named(&registry, "missing", &Invocation::new())
            .unwrap_err();
        assert!(matches!(err, ReconError::NotFound(_)));
    }

    #[test]
    fn test_store_keeps_replaced_examples() {
        let mut dataset = Dataset::with_examples("ner", vec![Example::new("old")]);
        dataset
            .apply_(
                &FnOperation::new(
                    "rewrite",
                    |_: &[Example], _: &Invocation| -> Result<Vec<Example>> {
                        Ok(vec![Example::new("new")])
                    },
                ),
                &Invocation::new(),
                None,
            )
            .unwrap();
        assert_eq!(dataset.example_store().len(), 2);
        let record = &dataset.operations()[0];
        let removed = record.transformations[0].prev_example.as_deref().unwrap();
        assert_eq!(dataset.example_store().get(removed).unwrap().text, "old");
    }

    #[test]
    fn test_external_change_resets_history() {
        let mut dataset = ner();
        dataset
            .apply_(&FnOperation::new("dedup", dedup), &Invocation::new(), None)
            .unwrap();
        let saved = dataset.commit_hash();
        assert!(!dataset.detect_external_change(&saved, 2));

        assert!(dataset.detect_external_change("stale", 5));
        let ops = dataset.operations();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].status, OperationStatus::NotStarted);
        assert_eq!(ops[1].name, EXTERNAL_CHANGE_OPERATION);
        assert_eq!(ops[1].status, OperationStatus::Completed);
        assert_eq!(ops[1].examples_removed, 3);
        assert_eq!(ops[1].examples_added, 0);
    }

    #[test]
    fn test_pending_replays_policies() {
        let mut dataset = Dataset::new("ner");
        dataset.operations = vec![
            OperationRecord::pending("lowercase_text", Invocation::new().arg(json!(1))),
            OperationRecord::pending("unregistered", Invocation::new()),
            OperationRecord::pending("lowercase_text", Invocation::new().arg(json!(2))),
        ];
        let mut registry = OperationRegistry::new();
        registry.register_fn("lowercase_text", dedup).unwrap();

        assert_eq!(
            dataset.pending_replays(&registry, ReplayPolicy::FirstOccurrence),
            vec![0]
        );
        assert_eq!(
            dataset.pending_replays(&registry, ReplayPolicy::FullSequence),
            vec![0, 2]
        );
    }

    #[test]
    fn test_first_occurrence_skips_duplicates_of_completed_records() {
        let mut dataset = Dataset::new("ner");
        let invocation = Invocation::new().arg(json!(1));
        let mut done = OperationRecord::completed("lowercase_text", Utc::now(), invocation);
        done.examples_changed = 1;
        dataset.operations = vec![
            done,
            OperationRecord::pending("lowercase_text", Invocation::new().arg(json!(2))),
        ];
        let mut registry = OperationRegistry::new();
        registry.register_fn("lowercase_text", dedup).unwrap();

        assert!(dataset
            .pending_replays(&registry, ReplayPolicy::FirstOccurrence)
            .is_empty());
        assert_eq!(
            dataset.pending_replays(&registry, ReplayPolicy::FullSequence),
            vec![1]
        );
    }

    #[test]
    fn test_invalid_dataset_names() {
        assert!(validate_name("ner").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name(CONFIG_FILE_NAME).is_err());
    }

    #[test]
    fn test_save_rejects_config_file_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("train.jsonl");
        let dataset = Dataset::with_examples("config.toml", vec![Example::new("a")]);
        let err = dataset.save(&path, &SaveOptions::default()).unwrap_err();
        assert!(matches!(err, ReconError::InvalidInput(_)));
        assert!(!dir.path().join(".recon").join("config.toml").exists());
    }
}
