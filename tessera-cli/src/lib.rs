//! Command-line interface driving a Tessera store directory.
//!
//! Sources are parsed with [`JsonContentParser`]; see the `json` module for
//! the document shape.
#![forbid(unsafe_code)]

use std::io::Write;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::Parser;
use tessera_core::{ContentParser, ContentParsers};
use tessera_store::{FederatedFeatureStore, StoreOptions};

mod commands;
mod error;
mod json;

use commands::Command;
pub use error::CliError;
pub use json::{GeometryDocument, JSON_PARSE_VERSION, JSON_PARSER_NAME, JsonContentParser, Position};

pub(crate) const ARG_STORE: &str = "store";
pub(crate) const ENV_STORE: &str = "TESSERA_STORE";
pub(crate) const ARG_FEATURE_SET_LIMIT: &str = "feature-set-limit";
pub(crate) const ARG_SOURCE: &str = "source";
pub(crate) const ENV_ADD_SOURCE: &str = "TESSERA_CMDS_ADD_SOURCE";

/// Run the Tessera CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    let mut stdout = std::io::stdout().lock();
    run_with(cli, &mut stdout)
}

pub(crate) fn run_with(cli: Cli, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = StoreConfig::try_from(&cli)?;
    let store = config.open()?;
    let outcome = commands::execute(cli.command, &store, writer);
    let closed = store.close().map_err(CliError::store("close store"));
    outcome.and(closed)
}

#[derive(Debug, Parser)]
#[command(
    name = "tessera",
    about = "Ingest sources into a federated feature store and query it",
    version
)]
pub(crate) struct Cli {
    /// Store directory holding the route index and child stores.
    #[arg(long = ARG_STORE, env = ENV_STORE, value_name = "dir", global = true)]
    store: Option<Utf8PathBuf>,
    /// Feature sets written to one child store before ingestion starts another.
    #[arg(long = ARG_FEATURE_SET_LIMIT, value_name = "count", global = true)]
    feature_set_limit: Option<usize>,
    #[command(subcommand)]
    command: Command,
}

/// Resolved store location and tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoreConfig {
    pub(crate) directory: Utf8PathBuf,
    pub(crate) options: StoreOptions,
}

impl StoreConfig {
    fn open(&self) -> Result<FederatedFeatureStore, CliError> {
        let parsers = Arc::new(ContentParsers::with_parsers([
            Arc::new(JsonContentParser) as Arc<dyn ContentParser>
        ]));
        FederatedFeatureStore::open(&self.directory, parsers, self.options.clone()).map_err(
            |source| CliError::OpenStore {
                path: self.directory.clone(),
                source,
            },
        )
    }
}

impl TryFrom<&Cli> for StoreConfig {
    type Error = CliError;

    fn try_from(cli: &Cli) -> Result<Self, Self::Error> {
        let directory = cli.store.clone().ok_or(CliError::MissingArgument {
            field: ARG_STORE,
            env: ENV_STORE,
        })?;
        let options = cli
            .feature_set_limit
            .map_or_else(StoreOptions::default, |limit| {
                StoreOptions::default().with_feature_set_limit(limit)
            });
        Ok(Self { directory, options })
    }
}

#[cfg(test)]
mod tests;
