//! Subcommand arguments and their execution against an open store.

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use tessera_core::{Attributes, Feature, FeatureDataStore, FeatureQuery, FeatureSetQuery};
use tessera_store::{AddOutcome, FederatedFeatureStore};

use crate::{ARG_SOURCE, CliError, ENV_ADD_SOURCE, GeometryDocument};

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Parse a source and add its feature sets to the store.
    Add(AddArgs),
    /// Re-parse a catalogued source, keeping the ids of surviving feature sets.
    Update(SourceArgs),
    /// Remove a source and every feature set it produced.
    Remove(SourceArgs),
    /// List catalogued sources.
    Files(FilesArgs),
    /// Print feature sets as JSON.
    Sets(SetsArgs),
    /// Print features as JSON.
    Features(FeaturesArgs),
    /// Drop sources whose content changed on disk since ingestion.
    Refresh,
}

/// CLI arguments for the `add` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Parse a source with the registered content parsers and add \
                 its feature sets to the store. Adding a source that is \
                 already catalogued is a no-op.",
    about = "Add a source to the store"
)]
#[ortho_config(prefix = "TESSERA")]
pub(crate) struct AddArgs {
    /// Source file to ingest.
    #[arg(value_name = "path")]
    #[serde(default)]
    pub(crate) source: Option<Utf8PathBuf>,
    /// Name of the only parser to try.
    #[arg(long, value_name = "parser")]
    #[serde(default)]
    pub(crate) hint: Option<String>,
}

impl AddArgs {
    fn into_config(self) -> Result<AddConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        AddConfig::try_from(merged)
    }
}

/// Resolved `add` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AddConfig {
    pub(crate) source: Utf8PathBuf,
    pub(crate) hint: Option<String>,
}

impl TryFrom<AddArgs> for AddConfig {
    type Error = CliError;

    fn try_from(args: AddArgs) -> Result<Self, Self::Error> {
        let source = args.source.ok_or(CliError::MissingArgument {
            field: ARG_SOURCE,
            env: ENV_ADD_SOURCE,
        })?;
        Ok(Self {
            source,
            hint: args.hint,
        })
    }
}

/// CLI arguments naming one source.
#[derive(Debug, Clone, Parser)]
pub(crate) struct SourceArgs {
    /// Catalogued source path.
    #[arg(value_name = "path")]
    pub(crate) source: Utf8PathBuf,
}

/// CLI arguments for the `files` subcommand.
#[derive(Debug, Clone, Parser)]
pub(crate) struct FilesArgs {
    /// Only list sources with edits since they were last ingested.
    #[arg(long)]
    pub(crate) modified: bool,
}

/// CLI arguments for the `sets` subcommand.
#[derive(Debug, Clone, Parser)]
pub(crate) struct SetsArgs {
    /// Wildcard pattern on feature set names.
    #[arg(long, value_name = "pattern")]
    pub(crate) name: Option<String>,
    /// Only list visible feature sets.
    #[arg(long)]
    pub(crate) visible_only: bool,
}

/// CLI arguments for the `features` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Print matching features as a JSON array ordered by \
                 federated id. Paging defaults can come from configuration \
                 files or environment variables.",
    about = "Print features as JSON"
)]
#[ortho_config(prefix = "TESSERA")]
pub(crate) struct FeaturesArgs {
    /// Wildcard pattern on the owning feature set's name.
    #[arg(long = "set", value_name = "pattern")]
    #[serde(default)]
    pub(crate) set: Option<String>,
    /// Maximum number of features to print; zero prints all.
    #[arg(long, value_name = "count")]
    #[serde(default)]
    pub(crate) limit: Option<usize>,
    /// Number of matching features to skip.
    #[arg(long, value_name = "count")]
    #[serde(default)]
    pub(crate) offset: Option<usize>,
}

impl FeaturesArgs {
    fn into_query(self) -> Result<FeatureQuery, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        Ok(features_query(merged))
    }
}

pub(crate) fn features_query(args: FeaturesArgs) -> FeatureQuery {
    let query = args
        .set
        .map_or_else(FeatureQuery::default, |pattern| {
            FeatureQuery::default().with_feature_set_name(pattern)
        });
    query.paged(args.limit.unwrap_or(0), args.offset.unwrap_or(0))
}

/// One printed feature.
#[derive(Debug, Serialize)]
struct FeatureRow {
    id: i64,
    feature_set_id: i64,
    name: String,
    geometry: Option<GeometryDocument>,
    attributes: Attributes,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<String>,
    version: i64,
}

impl From<Feature> for FeatureRow {
    fn from(feature: Feature) -> Self {
        Self {
            geometry: GeometryDocument::from_geometry(&feature.geometry),
            id: feature.id,
            feature_set_id: feature.feature_set_id,
            name: feature.name,
            attributes: feature.attributes,
            style: feature.style,
            version: feature.version,
        }
    }
}

/// Run `command` against `store`, writing its report to `writer`.
pub(crate) fn execute(
    command: Command,
    store: &FederatedFeatureStore,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    match command {
        Command::Add(args) => {
            let config = args.into_config()?;
            require_existing(&config.source)?;
            let outcome = store
                .add(&config.source, config.hint.as_deref())
                .map_err(CliError::store("add source"))?;
            let verb = match outcome {
                AddOutcome::Ingested => "ingested",
                AddOutcome::AlreadyPresent => "already present",
            };
            write_line(writer, &format!("{verb} {}", config.source))
        }
        Command::Update(args) => {
            require_existing(&args.source)?;
            store
                .update(&args.source)
                .map_err(CliError::store("update source"))?;
            write_line(writer, &format!("updated {}", args.source))
        }
        Command::Remove(args) => {
            store
                .remove(&args.source)
                .map_err(CliError::store("remove source"))?;
            write_line(writer, &format!("removed {}", args.source))
        }
        Command::Files(args) => {
            let files = store
                .query_files(args.modified)
                .map_err(CliError::store("list sources"))?;
            for file in files {
                write_line(writer, file.as_str())?;
            }
            Ok(())
        }
        Command::Sets(args) => {
            let mut query = FeatureSetQuery::default().sorted_by_name();
            if let Some(pattern) = args.name {
                query = query.with_name(pattern);
            }
            if args.visible_only {
                query = query.visible_only();
            }
            let sets = store
                .query_feature_sets(&query)
                .map_err(CliError::store("query feature sets"))?;
            write_json(writer, &sets)
        }
        Command::Features(args) => {
            let query = args.into_query()?;
            let rows: Vec<FeatureRow> = store
                .query_features(&query)
                .map_err(CliError::store("query features"))?
                .map(FeatureRow::from)
                .collect();
            write_json(writer, &rows)
        }
        Command::Refresh => {
            let removed = store.refresh().map_err(CliError::store("refresh store"))?;
            write_line(writer, &format!("removed {removed} stale sources"))
        }
    }
}

fn require_existing(path: &Utf8Path) -> Result<(), CliError> {
    match tessera_fs::path_exists(path) {
        Ok(true) => Ok(()),
        Ok(false) => Err(CliError::MissingSourceFile {
            field: ARG_SOURCE,
            path: path.to_path_buf(),
        }),
        Err(source) => Err(CliError::InspectSourcePath {
            field: ARG_SOURCE,
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_line(writer: &mut dyn Write, line: &str) -> Result<(), CliError> {
    writeln!(writer, "{line}").map_err(CliError::WriteOutput)
}

fn write_json<T: Serialize>(writer: &mut dyn Write, value: &T) -> Result<(), CliError> {
    let payload = serde_json::to_string_pretty(value).map_err(CliError::SerialiseOutput)?;
    write_line(writer, &payload)
}
