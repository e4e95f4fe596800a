//! Federated feature store over many child feature databases.
//!
//! Responsibilities:
//! - [`RouteIndex`]: catalog hooks keeping the `featuresets` and
//!   `catalog_ex` routing tables consistent with catalog entries, plus the
//!   in-memory [`RouteEntry`] index.
//! - [`SharedDatabase`]: reference-counted child store handles whose files
//!   are deleted once the last reference goes.
//! - [`IngestionGuard`]: single-flight ingestion with rollback.
//! - [`IngestCurrency`] and [`SourceCurrency`]: fingerprints of ingested
//!   sources.
//! - [`FederatedFeatureStore`]: the facade, implementing
//!   [`tessera_core::FeatureDataStore`] over federated ids.
//!
//! Boundaries: parsing belongs to [`tessera_core::ContentParser`]
//! implementations and child storage to [`tessera_core::ChildStore`]
//! implementations such as `tessera_fdb::FeatureDatabase`.

#![forbid(unsafe_code)]

mod currency;
mod cursor;
mod guard;
mod index;
mod listener;
mod options;
mod plan;
mod route;
mod shared;
mod store;

pub use currency::{
    CURRENCY_NAME, CURRENCY_VERSION, Fingerprint, IngestCurrency, SourceCurrency, catalog_path,
};
pub use guard::IngestionGuard;
pub use index::{PersistedRoute, ROUTE_INDEX_SCHEMA_VERSION, RouteIndex, SourceRecord};
pub use listener::StoreListener;
pub use options::{DEFAULT_CLOSE_CHECK_INTERVAL, DEFAULT_FEATURE_SET_LIMIT, StoreOptions};
pub use route::RouteEntry;
pub use shared::SharedDatabase;
pub use store::{AddOutcome, FederatedFeatureStore};
