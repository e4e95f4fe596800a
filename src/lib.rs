//! Facade crate for the Tessera federated feature store.
//!
//! This crate re-exports the domain contracts, the catalog engine, the SQLite
//! child store and the federated store so applications depend on one crate.

#![forbid(unsafe_code)]

pub use tessera_core::{
    ChildStore, ChildStoreFactory, ContentFeature, ContentFeatureSet, ContentParser,
    ContentParsers, ContentSource, Currency, CurrencyRegistry, Feature, FeatureCursor,
    FeatureDataStore, FeatureDefinition, FeatureQuery, FeatureSet, FeatureSetDefinition,
    FeatureSetQuery, FeatureStoreError, FederatedId, ParserStamp, Result,
};

pub use tessera_catalog::{Catalog, CatalogError, CatalogHooks, CatalogRow, RemovedEntry};

pub use tessera_fdb::{FeatureDatabase, SqliteChildStoreFactory};

pub use tessera_store::{
    AddOutcome, FederatedFeatureStore, IngestCurrency, SourceCurrency, StoreListener, StoreOptions,
};

#[cfg(feature = "test-support")]
pub use tessera_core::test_support;
