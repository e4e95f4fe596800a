//! Core domain types and contracts for the Tessera feature store.
//!
//! Responsibilities:
//! - Value types for features, feature sets and query predicates.
//! - The federated identifier codec ([`FederatedId`]).
//! - Contracts for collaborators: fingerprint currencies, content producers
//!   and child store engines.
//! - The error taxonomy shared by every store ([`FeatureStoreError`]).
//!
//! Boundaries: this crate performs no I/O of its own; persistence lives in
//! `tessera-catalog`, `tessera-fdb` and `tessera-store`.

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod content;
mod currency;
mod error;
mod feature;
mod glob;
mod id;
mod query;
mod store;

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-support")))]
pub mod test_support;

pub use content::{
    ContentFeature, ContentFeatureSet, ContentParser, ContentParsers, ContentSource, ParserStamp,
};
pub use currency::{Currency, CurrencyRegistry};
pub use error::{FeatureStoreError, Result};
pub use feature::{
    Attributes, Feature, FeatureDefinition, FeatureSet, FeatureSetDefinition, FeatureSetUpdate,
    FeatureUpdate, resolution_ranges_overlap,
};
pub use glob::{WILDCARD, matches_any, wildcard_matches};
pub use id::{FederatedId, FederatedIdError, LOW_BITS_MASK};
pub use query::{FeatureQuery, FeatureSetQuery, paged_count};
pub use store::{ChildStore, ChildStoreFactory, FeatureCursor, FeatureDataStore};
