//! Error types for the bucket-scan library.
//!
//! Every component boundary returns one of these as the `Err` side of a
//! `Result`. Scanner failures, store failures and configuration failures are
//! kept apart so workflows can decide which ones become an `ERROR` tag and
//! which ones abort.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by a scanning engine adapter.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The scanner process could not be started.
    #[error("failed to spawn scanner '{program}': {reason}")]
    SpawnFailed {
        /// Program that was invoked.
        program: String,
        /// Reason reported by the OS.
        reason: String,
    },

    /// The scanner did not finish in time and was killed.
    #[error("scanner '{program}' timed out after {elapsed:?}")]
    Timeout {
        /// Program that was invoked.
        program: String,
        /// How long the scanner was allowed to run.
        elapsed: Duration,
    },

    /// The scanner exited with a code that is neither clean nor infected.
    #[error("scanner '{program}' failed with exit code {exit_code:?}: {stderr}")]
    ScannerFailed {
        /// Program that was invoked.
        program: String,
        /// Exit code, `None` when killed by a signal.
        exit_code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// The definitions updater exited unsuccessfully.
    #[error("definitions update failed with exit code {exit_code:?}: {stderr}")]
    DefinitionsFailed {
        /// Exit code, `None` when killed by a signal.
        exit_code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// An I/O error occurred while preparing or reading scan input.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl ScanError {
    /// Returns `true` if a later attempt could plausibly succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::ScannerFailed { .. } | Self::Io(_)
        )
    }

    /// Returns the scanner program name if this error is associated with one.
    pub fn program(&self) -> Option<&str> {
        match self {
            Self::SpawnFailed { program, .. }
            | Self::Timeout { program, .. }
            | Self::ScannerFailed { program, .. } => Some(program),
            _ => None,
        }
    }

    /// Creates a `SpawnFailed` error.
    pub fn spawn_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            program: program.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Timeout` error.
    pub fn timeout(program: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            program: program.into(),
            elapsed,
        }
    }

    /// Creates an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Errors raised by an object store client.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced object does not exist.
    #[error("object not found: s3://{bucket}/{key}")]
    NotFound {
        /// Bucket that was queried.
        bucket: String,
        /// Key that was not found.
        key: String,
    },

    /// The store did not report a size for the object.
    #[error("no size reported for s3://{bucket}/{key}")]
    MissingSize {
        /// Bucket that was queried.
        bucket: String,
        /// Key without a size.
        key: String,
    },

    /// The store backend rejected or failed the request.
    #[error("{operation} failed: {message}")]
    Backend {
        /// Name of the store operation.
        operation: &'static str,
        /// Error reported by the backend.
        message: String,
    },

    /// A local I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns `true` if this error means the object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Creates a `NotFound` error.
    pub fn not_found(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Creates a `Backend` error.
    pub fn backend(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            operation,
            message: message.into(),
        }
    }
}

/// Configuration errors. These are fatal and surface before any work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting is absent.
    #[error("missing required setting {name}")]
    Missing {
        /// Environment variable or setting name.
        name: &'static str,
    },

    /// A setting could not be parsed.
    #[error("invalid value for {name}: '{value}' ({reason})")]
    Invalid {
        /// Environment variable or setting name.
        name: &'static str,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Errors returned by the scan workflows.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// An object store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A scan could not be completed.
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),

    /// One or more tag writes could not be completed.
    #[error("tagging could not be completed for {} object(s): {}", failed.len(), failed.join(", "))]
    Tagging {
        /// Keys whose tags could not be written.
        failed: Vec<String>,
    },

    /// A worker invocation failed as a whole.
    #[error("worker failed ({kind}): {message}")]
    Worker {
        /// Machine-readable failure kind.
        kind: String,
        /// Human-readable message.
        message: String,
    },

    /// A local I/O error occurred (scratch directory handling).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkflowError {
    /// Creates a `Worker` error.
    pub fn worker(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Worker {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Returns a short machine-readable kind for this error.
    pub fn kind(&self) -> &str {
        match self {
            Self::Store(StoreError::NotFound { .. }) => "not_found",
            Self::Store(_) => "store",
            Self::Scan(_) => "scan",
            Self::Tagging { .. } => "tagging",
            Self::Worker { kind, .. } => kind,
            Self::Io(_) => "io",
        }
    }
}

/// A specialized `Result` type for scanner operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// A specialized `Result` type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A specialized `Result` type for workflows.
pub type WorkflowResult<T> = Result<T, WorkflowError>;
