// ABOUTME: Error types surfaced by the compilers and the event aggregator
// ABOUTME: Collaborator failures are carried as anyhow errors, never retried here

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for entity-replicator operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The schema or configuration is invalid. Fatal, never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A schema or config file could not be read or parsed.
    #[error("Failed to load {}: {message}", path.display())]
    File { path: PathBuf, message: String },

    /// The database client failed. Propagated unmodified.
    #[error("Query execution error: {0:#}")]
    Query(anyhow::Error),

    /// The change callback failed; the batch stays pending.
    #[error("Change callback error: {0:#}")]
    Callback(anyhow::Error),

    /// The pending-id store failed.
    #[error("Id store error: {0:#}")]
    Store(anyhow::Error),

    /// The build scheduling hook failed.
    #[error("Scheduler error: {0:#}")]
    Scheduler(anyhow::Error),
}

impl SyncError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub(crate) fn file(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::File {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Whether retrying the same operation could succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::File { .. })
    }
}

/// Result type alias for entity-replicator operations.
pub type Result<T> = std::result::Result<T, SyncError>;
