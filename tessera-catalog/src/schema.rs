//! Generic catalog tables and the version stamp kept in `user_version`.

use rusqlite::Connection;

use crate::CatalogError;

/// Version of the generic catalog tables.
pub const CATALOG_SCHEMA_VERSION: i32 = 2;

/// Version written by [`crate::Catalog::delete_all`]; never matches a real
/// schema, so the next open rebuilds every table.
pub const SOFT_DELETE_VERSION: i32 = 0x7FFF_FFFF;

/// Combine the generic catalog version with a specialised schema version.
#[must_use]
pub const fn database_version(schema_version: i32) -> i32 {
    CATALOG_SCHEMA_VERSION | (schema_version << 16)
}

/// Execute one DDL statement, tagging failures with `step`.
pub fn run_migration_step(
    connection: &Connection,
    step: &'static str,
    sql: &str,
) -> Result<(), CatalogError> {
    connection
        .execute_batch(sql)
        .map_err(|source| CatalogError::Migration { step, source })
}

pub(crate) fn stored_version(connection: &Connection) -> Result<i32, CatalogError> {
    connection
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|source| CatalogError::Migration {
            step: "read user_version",
            source,
        })
}

pub(crate) fn write_version(connection: &Connection, version: i32) -> Result<(), CatalogError> {
    connection
        .pragma_update(None, "user_version", version)
        .map_err(|source| CatalogError::Migration {
            step: "write user_version",
            source,
        })
}

pub(crate) fn drop_tables(connection: &Connection) -> Result<(), CatalogError> {
    run_migration_step(connection, "drop catalog", "DROP TABLE IF EXISTS catalog")?;
    run_migration_step(
        connection,
        "drop catalog_metadata",
        "DROP TABLE IF EXISTS catalog_metadata",
    )
}

pub(crate) fn create_tables(connection: &Connection) -> Result<(), CatalogError> {
    run_migration_step(
        connection,
        "create catalog",
        "CREATE TABLE catalog (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT UNIQUE NOT NULL,
            sync INTEGER NOT NULL DEFAULT 0,
            appversion INTEGER NOT NULL DEFAULT 0,
            appdata BLOB,
            appname TEXT NOT NULL
        )",
    )?;
    run_migration_step(
        connection,
        "create catalog_metadata",
        "CREATE TABLE catalog_metadata (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT
        )",
    )
}
