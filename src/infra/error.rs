//! Repository error type and transient/fatal classification.
//!
//! The engine reacts to the classification, not to individual variants:
//! transient failures are logged and retried implicitly by the next
//! producer or scrape tick, fatal ones unwind the pipeline and the process.

use thiserror::Error;

/// Errors surfaced by the persistence layer.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row in a `save_batch` call failed; rows before it were committed.
    #[error("failed to insert batch item {index} ({address}): {source}")]
    BatchItem {
        index: usize,
        address: String,
        #[source]
        source: sqlx::Error,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, RepositoryError>;

impl RepositoryError {
    /// Whether the next periodic cycle may plausibly succeed without any
    /// operator intervention.
    pub fn is_transient(&self) -> bool {
        match self {
            RepositoryError::Database(err) => sqlx_is_transient(err),
            RepositoryError::BatchItem { source, .. } => sqlx_is_transient(source),
            RepositoryError::Configuration(_) => false,
        }
    }
}

/// SQLSTATE classes 08 (connection), 40 (rollback/serialization), 53
/// (resources) and 57 (operator intervention) recover on their own; schema,
/// syntax and auth classes do not.
fn sqlx_is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| {
                code.starts_with("08")
                    || code.starts_with("40")
                    || code.starts_with("53")
                    || code.starts_with("57")
            })
            .unwrap_or(false),
        _ => false,
    }
}
