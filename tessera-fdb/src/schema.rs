//! Tables of a feature database.

use camino::Utf8Path;
use rusqlite::Connection;

use crate::FeatureDatabaseError;

/// Schema version stored in `user_version`.
pub const FDB_SCHEMA_VERSION: i32 = 1;

const SCHEMA: &str = "
    CREATE TABLE featuresets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT COLLATE NOCASE NOT NULL,
        provider TEXT NOT NULL,
        type TEXT NOT NULL,
        visible INTEGER NOT NULL DEFAULT 1,
        min_resolution REAL NOT NULL DEFAULT 0,
        max_resolution REAL NOT NULL DEFAULT 0,
        version INTEGER NOT NULL DEFAULT 1,
        read_only INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE features (
        fid INTEGER PRIMARY KEY AUTOINCREMENT,
        fsid INTEGER NOT NULL REFERENCES featuresets(id),
        name TEXT COLLATE NOCASE NOT NULL,
        geometry BLOB NOT NULL,
        min_x REAL,
        min_y REAL,
        max_x REAL,
        max_y REAL,
        attributes TEXT NOT NULL,
        style TEXT,
        visible INTEGER NOT NULL DEFAULT 1,
        version INTEGER NOT NULL DEFAULT 1
    );
    CREATE INDEX features_fsid ON features(fsid, fid);
";

pub(crate) fn initialise(connection: &Connection) -> Result<(), FeatureDatabaseError> {
    connection.execute_batch(SCHEMA)?;
    connection.pragma_update(None, "user_version", FDB_SCHEMA_VERSION)?;
    Ok(())
}

pub(crate) fn check_version(
    connection: &Connection,
    path: &Utf8Path,
) -> Result<(), FeatureDatabaseError> {
    let found: i32 = connection.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if found == FDB_SCHEMA_VERSION {
        Ok(())
    } else {
        Err(FeatureDatabaseError::SchemaVersion {
            path: path.to_path_buf(),
            found,
            expected: FDB_SCHEMA_VERSION,
        })
    }
}
