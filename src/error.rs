use rusqlite::Error as RusqliteError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WikiStoreError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] RusqliteError), // Converts rusqlite::Error automatically

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    /// Bad connection string, or a schema newer than this build supports.
    /// Fatal at startup, never retried.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A legacy value could not be converted into the current model.
    /// Aborts the migration run and leaves the `_legacy` tables in place.
    #[error("Migration data error: {0}")]
    MigrationDataError(String),

    /// A single constraint or trigger toggle failed. Only ever logged.
    #[error("Transient backend error: {0}")]
    TransientBackendError(String),

    /// A host callback, such as the ACL sink, reported a failure.
    #[error("Host error: {0}")]
    HostError(String),

    #[error("Error: {0}")]
    Error(String), // Allows custom application errors
}
