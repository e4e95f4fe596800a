//! Versioned, currency-checked catalog of entries derived from source files.
//!
//! A [`Catalog`] owns one `SQLite` database holding a `catalog` table keyed by
//! a synthetic id. Each row records the source path, a finalisation flag and
//! the fingerprint produced by a [`tessera_core::Currency`]. Validation
//! sweeps ask each row's currency whether the source is still current and
//! delete rows that are not.
//!
//! Specialised catalogs keep extra tables consistent by implementing
//! [`CatalogHooks`]. The schema version stored in `user_version` combines
//! [`CATALOG_SCHEMA_VERSION`] with the hooks' own version; any mismatch
//! drops and rebuilds every table.

#![forbid(unsafe_code)]

mod engine;
mod error;
mod hooks;
mod schema;

pub use engine::{Catalog, CatalogRow, RawQuery};
pub use error::CatalogError;
pub use hooks::{CatalogHooks, NoHooks, RemovedEntry};
pub use schema::{
    CATALOG_SCHEMA_VERSION, SOFT_DELETE_VERSION, database_version, run_migration_step,
};
