//! Fingerprints for ingested sources.
//!
//! The fingerprint records which parsers (and versions) produced the content
//! and a stamp of the source entry on disk. Validation recomputes the stamp
//! and checks the parsers against the live registry.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tessera_core::{ContentParsers, Currency, FeatureStoreError, ParserStamp, Result};
use tessera_fs::EntryStamp;

/// Currency name recorded on every catalog entry the store creates.
pub const CURRENCY_NAME: &str = "PersistentDataSourceFeatureDataStore.Currency";

/// Version of the fingerprint layout.
pub const CURRENCY_VERSION: i32 = 2;

const ARCHIVE_EXTENSION: &str = ".zip";

/// Path under which `path` is catalogued.
///
/// Content read from inside an archive is catalogued under the archive
/// itself, so everything after the first `.zip` (any case) is dropped.
#[must_use]
pub fn catalog_path(path: &Utf8Path) -> Utf8PathBuf {
    let lowered = path.as_str().to_ascii_lowercase();
    lowered
        .find(ARCHIVE_EXTENSION)
        .and_then(|start| path.as_str().get(..start + ARCHIVE_EXTENSION.len()))
        .map_or_else(|| path.to_path_buf(), Utf8PathBuf::from)
}

/// Serialised fingerprint of one ingested source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Parsers whose versions the content depends on.
    pub parsers: Vec<ParserStamp>,
    /// Whether the source is a directory.
    pub is_directory: bool,
    /// Length of the source in bytes.
    pub len: u64,
    /// Modification time in milliseconds since the Unix epoch.
    pub modified_millis: i64,
}

impl Fingerprint {
    /// Stamp `path` on disk.
    ///
    /// # Errors
    /// Returns [`FeatureStoreError::InvalidArgument`] when the path does not
    /// exist and [`FeatureStoreError::Io`] when it cannot be inspected.
    pub fn capture(path: &Utf8Path, parsers: Vec<ParserStamp>) -> Result<Self> {
        let stamp = current_stamp(path)?.ok_or_else(|| {
            FeatureStoreError::invalid_argument(format!("{path} does not exist"))
        })?;
        Ok(Self {
            parsers,
            is_directory: stamp.is_directory,
            len: stamp.len,
            modified_millis: stamp.modified_millis,
        })
    }

    /// Encode as `bincode`.
    ///
    /// # Errors
    /// Returns [`FeatureStoreError::Encoding`] if serialisation fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|source| FeatureStoreError::Encoding {
            what: "source fingerprint",
            source,
        })
    }

    /// Decode a fingerprint written by [`Fingerprint::encode`].
    ///
    /// # Errors
    /// Returns [`FeatureStoreError::Encoding`] for malformed bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|source| FeatureStoreError::Encoding {
            what: "source fingerprint",
            source,
        })
    }

    const fn matches_stamp(&self, stamp: &EntryStamp) -> bool {
        self.is_directory == stamp.is_directory
            && self.len == stamp.len
            && self.modified_millis == stamp.modified_millis
    }
}

fn current_stamp(path: &Utf8Path) -> Result<Option<EntryStamp>> {
    tessera_fs::entry_stamp(path).map_err(|source| FeatureStoreError::io(path, source))
}

/// Currency used while a source is being catalogued.
///
/// It carries the parser stamps of the parsed content, which the catalog
/// cannot know on its own.
#[derive(Debug, Clone)]
pub struct IngestCurrency {
    parsers: Vec<ParserStamp>,
}

impl IngestCurrency {
    /// Currency fingerprinting content produced by `parsers`.
    #[must_use]
    pub const fn new(parsers: Vec<ParserStamp>) -> Self {
        Self { parsers }
    }
}

impl Currency for IngestCurrency {
    fn name(&self) -> &str {
        CURRENCY_NAME
    }

    fn app_version(&self) -> i32 {
        CURRENCY_VERSION
    }

    fn fingerprint(&self, path: &Utf8Path) -> Result<Vec<u8>> {
        Fingerprint::capture(&catalog_path(path), self.parsers.clone())?.encode()
    }

    fn is_valid(&self, path: &Utf8Path, version: i32, fingerprint: &[u8]) -> Result<bool> {
        if version != CURRENCY_VERSION {
            return Ok(false);
        }
        let Ok(recorded) = Fingerprint::decode(fingerprint) else {
            return Ok(false);
        };
        if recorded.parsers != self.parsers {
            return Ok(false);
        }
        Ok(current_stamp(&catalog_path(path))?
            .is_some_and(|current| recorded.matches_stamp(&current)))
    }
}

/// Currency registered with the catalog to validate stored fingerprints
/// against the live parser registry.
#[derive(Debug, Clone)]
pub struct SourceCurrency {
    parsers: Arc<ContentParsers>,
}

impl SourceCurrency {
    /// Validate against the parsers in `parsers`.
    #[must_use]
    pub const fn new(parsers: Arc<ContentParsers>) -> Self {
        Self { parsers }
    }

    fn parsers_current(&self, recorded: &[ParserStamp]) -> bool {
        for recorded_parser in recorded {
            let Some(parser) = self.parsers.lookup(&recorded_parser.name) else {
                // Uninstalled parser: skip the remaining parser checks.
                break;
            };
            if parser.parse_version() != recorded_parser.parse_version {
                return false;
            }
        }
        true
    }
}

impl Currency for SourceCurrency {
    fn name(&self) -> &str {
        CURRENCY_NAME
    }

    fn app_version(&self) -> i32 {
        CURRENCY_VERSION
    }

    fn fingerprint(&self, _path: &Utf8Path) -> Result<Vec<u8>> {
        // Parser stamps come from parsed content; see `IngestCurrency`.
        Err(FeatureStoreError::Unsupported {
            operation: "fingerprinting without parsed content",
        })
    }

    fn is_valid(&self, path: &Utf8Path, version: i32, fingerprint: &[u8]) -> Result<bool> {
        if version != CURRENCY_VERSION {
            return Ok(false);
        }
        let recorded = match Fingerprint::decode(fingerprint) {
            Ok(recorded) => recorded,
            Err(err) => {
                log::warn!("discarding unreadable fingerprint for {path}: {err}");
                return Ok(false);
            }
        };
        if !self.parsers_current(&recorded.parsers) {
            return Ok(false);
        }
        Ok(current_stamp(&catalog_path(path))?
            .is_some_and(|current| recorded.matches_stamp(&current)))
    }
}
