//! Operation registry: resolves operation names to callable operations.
//!
//! The registry is an explicit value handed to the engine at load time, not
//! process-wide state, so two datasets can be reconciled against different
//! operation sets in the same process.

use crate::dataset::Dataset;
use crate::diff::record_from_diff;
use crate::error::{ReconError, Result};
use crate::example::Example;
use crate::operation::{Invocation, OperationOutcome, OperationRecord};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A named transformation over a dataset's examples.
pub trait Operation: Send + Sync {
    /// Stable name, used as the record name and the registry key.
    fn name(&self) -> &str;

    /// Run against `dataset`. `initial_state` is the stored record when the
    /// operation is being replayed, letting it resume instead of restarting.
    fn run(
        &self,
        dataset: &Dataset,
        invocation: &Invocation,
        initial_state: Option<&OperationRecord>,
    ) -> Result<OperationOutcome>;
}

/// Adapts a plain example-list function into an [`Operation`].
///
/// The record is derived by diffing the examples before and after the call,
/// so the function only has to produce the new list.
pub struct FnOperation<F> {
    name: String,
    func: F,
}

impl<F> FnOperation<F>
where
    F: Fn(&[Example], &Invocation) -> Result<Vec<Example>> + Send + Sync,
{
    pub fn new(name: &str, func: F) -> Self {
        Self {
            name: name.to_string(),
            func,
        }
    }
}

impl<F> Operation for FnOperation<F>
where
    F: Fn(&[Example], &Invocation) -> Result<Vec<Example>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(
        &self,
        dataset: &Dataset,
        invocation: &Invocation,
        _initial_state: Option<&OperationRecord>,
    ) -> Result<OperationOutcome> {
        let start_ts = Utc::now();
        let before = dataset.examples();
        let after = (self.func)(before, invocation)?;
        let state = record_from_diff(&self.name, invocation.clone(), start_ts, before, &after);
        Ok(OperationOutcome::new(after, state))
    }
}

/// Mapping from operation name to operation.
#[derive(Default, Clone)]
pub struct OperationRegistry {
    operations: HashMap<String, Arc<dyn Operation>>,
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.names())
            .finish()
    }
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            operations: HashMap::new(),
        }
    }

    /// Register an operation. Returns error if the name is already taken.
    pub fn register(&mut self, operation: Arc<dyn Operation>) -> Result<()> {
        let name = operation.name().to_string();
        if self.operations.contains_key(&name) {
            return Err(ReconError::AlreadyRegistered(name));
        }
        debug!(operation = %name, "Registering operation");
        self.operations.insert(name, operation);
        Ok(())
    }

    /// Register a plain function as an operation (see [`FnOperation`]).
    pub fn register_fn<F>(&mut self, name: &str, func: F) -> Result<()>
    where
        F: Fn(&[Example], &Invocation) -> Result<Vec<Example>> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnOperation::new(name, func)))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Operation>> {
        self.operations.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.operations.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
