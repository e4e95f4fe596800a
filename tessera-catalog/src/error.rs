//! Errors raised by the catalog engine.

use camino::Utf8PathBuf;
use tessera_core::FeatureStoreError;
use thiserror::Error;

/// Errors raised while opening, querying or mutating a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Opening the `SQLite` database failed.
    #[error("failed to open catalog database at {path}")]
    OpenDatabase {
        /// Requested database path.
        path: Utf8PathBuf,
        /// Source error from `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// A schema build or migration step failed.
    #[error("catalog schema step failed: {step}")]
    Migration {
        /// Description of the failed step.
        step: &'static str,
        /// Source error from `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Preparing or executing a query failed.
    #[error("failed to query {operation}")]
    Query {
        /// Description of the failed operation.
        operation: &'static str,
        /// Source error from `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// No catalog entry exists for the path.
    #[error("no catalog entry for {path}")]
    MissingEntry {
        /// Requested path.
        path: Utf8PathBuf,
    },
    /// A currency failed to fingerprint the path.
    #[error("failed to fingerprint {path}")]
    Currency {
        /// Path being fingerprinted.
        path: Utf8PathBuf,
        /// Failure reported by the currency.
        #[source]
        source: Box<FeatureStoreError>,
    },
    /// A table or column name passed to the generic query was rejected.
    #[error("invalid SQL identifier {identifier:?}")]
    InvalidIdentifier {
        /// Rejected identifier.
        identifier: String,
    },
}

impl CatalogError {
    pub(crate) fn query(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| Self::Query { operation, source }
    }
}

impl From<CatalogError> for FeatureStoreError {
    fn from(value: CatalogError) -> Self {
        match value {
            CatalogError::OpenDatabase { source, .. } => {
                Self::database("open catalog database", source)
            }
            CatalogError::Migration { step, source } => Self::database(step, source),
            CatalogError::Query { operation, source } => Self::database(operation, source),
            CatalogError::MissingEntry { path } => {
                Self::invalid_argument(format!("{path} is not catalogued"))
            }
            CatalogError::Currency { source, .. } => *source,
            CatalogError::InvalidIdentifier { identifier } => {
                Self::invalid_argument(format!("invalid SQL identifier {identifier:?}"))
            }
        }
    }
}
