//! # recon-core: Dataset lineage for labeled training data
//!
//! Tracks every operation applied to a collection of annotated examples so
//! that the data behind any saved snapshot can be explained, diffed or
//! replayed.
//!
//! - [`Dataset`]: applies operations, computes commit hashes, and saves
//!   and loads with automatic reconciliation.
//! - [`OperationRecord`] / [`OperationOutcome`]: lineage entries and what an
//!   operation returns.
//! - [`OperationRegistry`]: the explicit name → operation lookup used when
//!   replaying history.
//! - [`ExampleStore`]: content-addressed store of every example body seen.

pub mod config;
pub mod dataset;
pub mod diff;
pub mod error;
pub mod example;
pub mod hashing;
pub mod io;
pub mod operation;
pub mod persistence;
pub mod registry;
pub mod snapshot;
pub mod store;

// Re-exports
pub use config::{load_config, ReconConfig, ReplayPolicy};
pub use dataset::{Dataset, LoadOptions, SaveOptions, EXTERNAL_CHANGE_OPERATION};
pub use error::{ReconError, Result};
pub use example::{Example, Span, Token};
pub use hashing::{dataset_hash, example_hash};
pub use io::{JsonLoader, JsonlLoader, JsonlWriter, Loader, LoadingPipeline, Writer};
pub use operation::{
    Invocation, OperationOutcome, OperationRecord, OperationStatus, Transformation,
    TransformationType,
};
pub use registry::{FnOperation, Operation, OperationRegistry};
pub use snapshot::{DatasetSnapshot, StatePaths};
pub use store::ExampleStore;
