//! Error types for the recon-core crate.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for dataset lineage operations.
#[derive(Debug, Error)]
pub enum ReconError {
    #[error("Operation '{name}' failed: {message}")]
    Operation { name: String, message: String },

    #[error("Operation '{name}' returned an invalid outcome: {reason}")]
    InvalidOutcome { name: String, reason: String },

    #[error("Directory does not exist: {0} (save with force to create it)")]
    MissingDirectory(PathBuf),

    #[error("Operation already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ReconError {
    pub fn operation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Operation {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn invalid_outcome(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOutcome {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Result alias used throughout recon-core.
pub type Result<T> = std::result::Result<T, ReconError>;
