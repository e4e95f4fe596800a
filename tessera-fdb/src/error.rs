//! Errors raised by the `SQLite` child store engine.

use camino::Utf8PathBuf;
use tessera_core::FeatureStoreError;
use thiserror::Error;

/// Errors raised while reading or writing a feature database.
#[derive(Debug, Error)]
pub enum FeatureDatabaseError {
    /// Opening the `SQLite` database failed.
    #[error("failed to open feature database at {path}: {source}")]
    OpenDatabase {
        /// Location of the database on disk.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Removing or probing the database file failed.
    #[error("failed to prepare feature database file {path}")]
    Io {
        /// Location of the database on disk.
        path: Utf8PathBuf,
        /// Source error from std I/O.
        #[source]
        source: std::io::Error,
    },
    /// The file exists but was written by an incompatible schema.
    #[error("feature database {path} has schema version {found}, expected {expected}")]
    SchemaVersion {
        /// Location of the database on disk.
        path: Utf8PathBuf,
        /// Version found in the file.
        found: i32,
        /// Version this build writes.
        expected: i32,
    },
    /// The database was closed.
    #[error("feature database is closed")]
    Closed,
    /// A bulk insertion was started while another is open.
    #[error("a bulk insertion is already open")]
    BulkInsertionOpen,
    /// A bulk insertion was committed without being started.
    #[error("no bulk insertion is open")]
    NoBulkInsertion,
    /// No feature set with the id exists.
    #[error("no feature set with id {fsid}")]
    MissingFeatureSet {
        /// Requested feature set id.
        fsid: i64,
    },
    /// No feature with the id exists.
    #[error("no feature with id {fid}")]
    MissingFeature {
        /// Requested feature id.
        fid: i64,
    },
    /// The feature set rejects feature modification.
    #[error("feature set {fsid} is read-only")]
    ReadOnly {
        /// Locked feature set id.
        fsid: i64,
    },
    /// A geometry could not be encoded for storage.
    #[error("failed to encode geometry: {source}")]
    EncodeGeometry {
        /// Encoder failure from `bincode`.
        #[source]
        source: bincode::Error,
    },
    /// A stored geometry could not be decoded.
    #[error("failed to decode geometry of feature {fid}: {source}")]
    DecodeGeometry {
        /// Feature whose geometry is corrupt.
        fid: i64,
        /// Decoder failure from `bincode`.
        #[source]
        source: bincode::Error,
    },
    /// Attributes could not be encoded or decoded as JSON.
    #[error("failed to process attributes of feature {fid:?}: {source}")]
    Attributes {
        /// Feature whose attributes failed, when known.
        fid: Option<i64>,
        /// JSON failure.
        #[source]
        source: serde_json::Error,
    },
    /// Generic `SQLite` error when reading or writing rows.
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}

impl From<FeatureDatabaseError> for FeatureStoreError {
    fn from(value: FeatureDatabaseError) -> Self {
        match value {
            FeatureDatabaseError::OpenDatabase { source, .. } => {
                Self::database("open feature database", source)
            }
            FeatureDatabaseError::Io { path, source } => Self::io(path, source),
            error @ FeatureDatabaseError::SchemaVersion { .. } => {
                Self::invalid_argument(error.to_string())
            }
            FeatureDatabaseError::Closed => Self::illegal_state("feature database is closed"),
            FeatureDatabaseError::BulkInsertionOpen => {
                Self::illegal_state("a bulk insertion is already open")
            }
            FeatureDatabaseError::NoBulkInsertion => Self::illegal_state("no bulk insertion is open"),
            error @ (FeatureDatabaseError::MissingFeatureSet { .. }
            | FeatureDatabaseError::MissingFeature { .. }) => {
                Self::invalid_argument(error.to_string())
            }
            FeatureDatabaseError::ReadOnly { .. } => {
                Self::illegal_state("feature set is read-only")
            }
            FeatureDatabaseError::EncodeGeometry { source }
            | FeatureDatabaseError::DecodeGeometry { source, .. } => Self::Encoding {
                what: "feature geometry",
                source,
            },
            FeatureDatabaseError::Attributes { source, .. } => Self::Encoding {
                what: "feature attributes",
                source: Box::new(source),
            },
            FeatureDatabaseError::Database(source) => {
                Self::database("access feature database", source)
            }
        }
    }
}
