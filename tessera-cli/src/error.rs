//! Error types emitted by the Tessera CLI.
//!
//! Keep this error type reasonably small, as every command helper returns
//! `Result<_, CliError>` and the workspace enables `clippy::result_large_err`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use tessera_core::FeatureStoreError;
use thiserror::Error;

/// Errors emitted by the Tessera CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        /// Name of the offending option.
        field: &'static str,
        /// Environment variable that can supply the option.
        env: &'static str,
    },
    /// A referenced source path does not exist on disk.
    #[error("{field} path {path:?} does not exist")]
    MissingSourceFile {
        /// Name of the offending option.
        field: &'static str,
        /// Path involved in the failure.
        path: Utf8PathBuf,
    },
    /// A referenced source path could not be inspected due to an IO error.
    #[error("failed to inspect {field} path {path:?}: {source}")]
    InspectSourcePath {
        /// Name of the offending option.
        field: &'static str,
        /// Path involved in the failure.
        path: Utf8PathBuf,
        #[source]
        /// Underlying error.
        source: std::io::Error,
    },
    /// Opening the store directory failed.
    #[error("failed to open store at {path:?}: {source}")]
    OpenStore {
        /// Path involved in the failure.
        path: Utf8PathBuf,
        #[source]
        /// Underlying error.
        source: FeatureStoreError,
    },
    /// A store operation failed.
    #[error("failed to {operation}: {source}")]
    Store {
        /// Store operation that failed.
        operation: &'static str,
        #[source]
        /// Underlying error.
        source: FeatureStoreError,
    },
    /// Serialising command output failed.
    #[error("failed to serialise output: {0}")]
    SerialiseOutput(#[source] serde_json::Error),
    /// Writing command output failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}

impl CliError {
    pub(crate) fn store(operation: &'static str) -> impl FnOnce(FeatureStoreError) -> Self {
        move |source| Self::Store { operation, source }
    }
}
