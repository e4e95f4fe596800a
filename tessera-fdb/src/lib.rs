//! `SQLite` feature databases used as federated child stores.
//!
//! A [`FeatureDatabase`] stores feature sets and their features in a single
//! file. Geometries are encoded with `bincode` next to their bounding box so
//! spatial filters run in SQL; attributes are stored as JSON text.
//! [`SqliteChildStoreFactory`] creates and opens these files on behalf of the
//! federated store.

#![forbid(unsafe_code)]

mod codec;
mod database;
mod error;
mod factory;
mod filter;
mod schema;

pub use database::FeatureDatabase;
pub use error::FeatureDatabaseError;
pub use factory::SqliteChildStoreFactory;
pub use schema::FDB_SCHEMA_VERSION;
