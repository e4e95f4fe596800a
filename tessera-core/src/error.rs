//! Error taxonomy shared by every feature store in the workspace.
//!
//! Lower layers (the catalog engine, the child store engine) keep their own
//! error enums and convert into [`FeatureStoreError`] at the boundary, so
//! callers of the federated store only ever match on one type.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors raised by feature stores and their collaborators.
#[derive(Debug, Error)]
pub enum FeatureStoreError {
    /// A caller supplied a path, identifier or value the store cannot act on.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Human readable description of the rejected argument.
        message: String,
    },
    /// The store is not in a state that permits the operation.
    #[error("illegal state: {message}")]
    IllegalState {
        /// Description of the violated precondition.
        message: &'static str,
    },
    /// Creating, inspecting or deleting a file failed.
    #[error("I/O failure at {path}")]
    Io {
        /// Path involved in the failing operation.
        path: Utf8PathBuf,
        /// Source error from std I/O.
        #[source]
        source: std::io::Error,
    },
    /// Preparing or executing a database statement failed.
    #[error("failed to {operation}")]
    Database {
        /// Description of the failed operation.
        operation: &'static str,
        /// Source error from `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// The store does not implement the requested operation.
    #[error("{operation} is not supported by this store")]
    Unsupported {
        /// Name of the rejected operation.
        operation: &'static str,
    },
    /// Encoding or decoding a persisted value failed.
    #[error("failed to encode or decode {what}")]
    Encoding {
        /// Description of the value being processed.
        what: &'static str,
        /// Underlying codec failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// A content producer failed while parsing a source.
    #[error("content producer failed for {path}: {message}")]
    Content {
        /// Source path being parsed.
        path: Utf8PathBuf,
        /// Producer supplied failure description.
        message: String,
    },
}

impl FeatureStoreError {
    /// Build an [`FeatureStoreError::InvalidArgument`] from any displayable message.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Build an [`FeatureStoreError::IllegalState`].
    #[must_use]
    pub const fn illegal_state(message: &'static str) -> Self {
        Self::IllegalState { message }
    }

    /// Build a [`FeatureStoreError::Database`] error for `operation`.
    #[must_use]
    pub const fn database(operation: &'static str, source: rusqlite::Error) -> Self {
        Self::Database { operation, source }
    }

    /// Build a [`FeatureStoreError::Io`] error for `path`.
    pub fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used across the store crates.
pub type Result<T, E = FeatureStoreError> = std::result::Result<T, E>;
