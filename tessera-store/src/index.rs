//! Routing tables kept alongside the catalog.
//!
//! [`RouteIndex`] is the catalog's hook implementation. It owns two tables
//! in the catalog database (`featuresets`, one row per federated feature
//! set, and `catalog_ex`, one row per catalogued source) plus the in-memory
//! route entries and the set of paths with an ingestion in flight. Catalog
//! deletions cascade through [`CatalogHooks::on_entry_removed`] into both.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use rusqlite::{Connection, OptionalExtension, params};
use tessera_catalog::{CatalogError, CatalogHooks, CatalogRow, RemovedEntry, run_migration_step};
use tessera_core::{FeatureStoreError, FederatedId, Result};

use crate::RouteEntry;

/// Schema version folded into the catalog's stored version.
pub const ROUTE_INDEX_SCHEMA_VERSION: i32 = 8;

const SUBSCHEMA_KEY: &str = "subschema_version";
const SUBSCHEMA_VERSION: &str = "1";

const CREATE_FEATURESETS: &str = "CREATE TABLE IF NOT EXISTS featuresets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT COLLATE NOCASE,
    file_id INTEGER,
    fdb_path TEXT,
    provider TEXT,
    type TEXT,
    fdb_type TEXT
)";

const CREATE_CATALOG_EX: &str = "CREATE TABLE IF NOT EXISTS catalog_ex (
    file_id INTEGER PRIMARY KEY AUTOINCREMENT,
    provider TEXT,
    type TEXT,
    fdb_type TEXT,
    modified INTEGER
)";

/// Catalog `sync` value of an entry whose ingestion completed.
const FINALIZED: i64 = 1;

/// Catalog `sync` value of an entry being ingested or awaiting cleanup.
const NOT_FINALIZED: i64 = 0;

/// A routing row as persisted in `featuresets`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRoute {
    /// Federated feature set id.
    pub fsid: i64,
    /// Feature set name.
    pub name: String,
    /// Child store file hosting the set.
    pub child_path: Utf8PathBuf,
    /// Producer name.
    pub provider: String,
    /// Content type.
    pub feature_type: String,
    /// Owning catalog entry.
    pub catalog_id: i64,
}

/// Provider and type recorded for a catalogued source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    /// Catalog entry id.
    pub catalog_id: i64,
    /// Producer name.
    pub provider: String,
    /// Content type.
    pub feature_type: String,
}

/// Catalog hooks and in-memory routing state of a federated store.
#[derive(Debug)]
pub struct RouteIndex {
    child_directory: Utf8PathBuf,
    routes: BTreeMap<i64, RouteEntry>,
    pending: BTreeSet<Utf8PathBuf>,
}

fn sql(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> FeatureStoreError {
    move |source| FeatureStoreError::database(operation, source)
}

fn hook_sql(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> CatalogError {
    move |source| CatalogError::Query { operation, source }
}

impl RouteIndex {
    /// Hooks for a store keeping child stores under `child_directory`.
    #[must_use]
    pub fn new(child_directory: impl Into<Utf8PathBuf>) -> Self {
        Self {
            child_directory: child_directory.into(),
            routes: BTreeMap::new(),
            pending: BTreeSet::new(),
        }
    }

    /// Directory holding child store files.
    #[must_use]
    pub fn child_directory(&self) -> &Utf8Path {
        &self.child_directory
    }

    /// Route entry for `fsid`.
    #[must_use]
    pub fn route(&self, fsid: i64) -> Option<&RouteEntry> {
        self.routes.get(&fsid)
    }

    /// Mutable route entry for `fsid`.
    pub fn route_mut(&mut self, fsid: i64) -> Option<&mut RouteEntry> {
        self.routes.get_mut(&fsid)
    }

    /// Every route entry, ordered by feature set id.
    pub fn routes(&self) -> impl Iterator<Item = &RouteEntry> {
        self.routes.values()
    }

    /// Number of routed feature sets.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Register `entry`, replacing any route with the same id.
    pub fn insert_route(&mut self, entry: RouteEntry) {
        if let Some(previous) = self.routes.insert(entry.fsid, entry) {
            self.release(&previous);
        }
    }

    /// Drop the route for `fsid`.
    ///
    /// The child store is marked for deletion when no other route refers to
    /// it; the file goes once the last transient reference is released.
    pub fn remove_route(&mut self, fsid: i64) -> Option<RouteEntry> {
        let removed = self.routes.remove(&fsid)?;
        self.release(&removed);
        Some(removed)
    }

    fn release(&self, removed: &RouteEntry) {
        let still_used = self
            .routes
            .values()
            .any(|entry| Arc::ptr_eq(&entry.database, &removed.database));
        if !still_used {
            debug!("child store {} no longer routed", removed.database.path());
            removed.database.mark_for_delete();
        }
    }

    /// Drop every route without deleting any child store.
    pub fn clear_routes(&mut self) {
        self.routes.clear();
    }

    /// Whether an ingestion of `path` is in flight.
    #[must_use]
    pub fn is_pending(&self, path: &Utf8Path) -> bool {
        self.pending.contains(path)
    }

    /// Record an in-flight ingestion. Returns `false` if one was already
    /// recorded.
    pub fn mark_pending(&mut self, path: &Utf8Path) -> bool {
        self.pending.insert(path.to_path_buf())
    }

    /// Forget an in-flight ingestion.
    pub fn clear_pending(&mut self, path: &Utf8Path) -> bool {
        self.pending.remove(path)
    }

    /// Forget every in-flight ingestion, returning their paths.
    pub fn take_pending(&mut self) -> BTreeSet<Utf8PathBuf> {
        std::mem::take(&mut self.pending)
    }

    /// Reserve a feature set id for a child store file.
    ///
    /// The row has no catalog id until the ingestion commits.
    ///
    /// # Errors
    /// Fails when the insert fails or the allocated id does not fit the
    /// federated id encoding.
    pub fn reserve_feature_set(
        connection: &Connection,
        name: &str,
        child_path: &Utf8Path,
        provider: &str,
        feature_type: &str,
    ) -> Result<i64> {
        connection
            .execute(
                "INSERT INTO featuresets (name, fdb_path, provider, type, fdb_type)
                 VALUES (?1, ?2, ?3, ?4, NULL)",
                params![name, child_path.as_str(), provider, feature_type],
            )
            .map_err(sql("reserve feature set"))?;
        let fsid = connection.last_insert_rowid();
        if let Err(err) = FederatedId::encode(fsid, 0) {
            Self::delete_feature_set_rows(connection, &[fsid])?;
            return Err(FeatureStoreError::invalid_argument(err.to_string()));
        }
        Ok(fsid)
    }

    /// Reserve a routing row under an existing feature set id.
    ///
    /// # Errors
    /// Fails when the id is already in use.
    pub fn reserve_feature_set_with_id(
        connection: &Connection,
        fsid: i64,
        name: &str,
        child_path: &Utf8Path,
        provider: &str,
        feature_type: &str,
    ) -> Result<()> {
        connection
            .execute(
                "INSERT INTO featuresets (id, name, fdb_path, provider, type, fdb_type)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
                params![fsid, name, child_path.as_str(), provider, feature_type],
            )
            .map_err(sql("reserve feature set id"))?;
        Ok(())
    }

    /// Attach a routing row to its catalog entry.
    ///
    /// # Errors
    /// Propagates database failures.
    pub fn set_feature_set_catalog_id(
        connection: &Connection,
        fsid: i64,
        catalog_id: i64,
    ) -> Result<()> {
        connection
            .execute(
                "UPDATE featuresets SET file_id = ?1 WHERE id = ?2",
                [catalog_id, fsid],
            )
            .map_err(sql("assign feature set to catalog entry"))?;
        Ok(())
    }

    /// Rename a routing row.
    ///
    /// # Errors
    /// Propagates database failures.
    pub fn rename_feature_set(connection: &Connection, fsid: i64, name: &str) -> Result<()> {
        connection
            .execute(
                "UPDATE featuresets SET name = ?1 WHERE id = ?2",
                params![name, fsid],
            )
            .map_err(sql("rename feature set"))?;
        Ok(())
    }

    /// Delete routing rows.
    ///
    /// # Errors
    /// Propagates database failures.
    pub fn delete_feature_set_rows(connection: &Connection, fsids: &[i64]) -> Result<()> {
        for fsid in fsids {
            connection
                .execute("DELETE FROM featuresets WHERE id = ?1", [fsid])
                .map_err(sql("delete feature set row"))?;
        }
        Ok(())
    }

    /// Delete reservations left behind by an interrupted ingestion.
    ///
    /// Returns the child store files the deleted rows pointed at that no
    /// remaining row refers to.
    ///
    /// # Errors
    /// Propagates database failures.
    pub fn discard_unassigned(connection: &Connection) -> Result<Vec<Utf8PathBuf>> {
        let mut statement = connection
            .prepare("SELECT DISTINCT fdb_path FROM featuresets WHERE file_id IS NULL")
            .map_err(sql("prepare unassigned feature sets"))?;
        let reserved = statement
            .query_map([], |row| row.get::<_, Option<String>>(0))
            .map_err(sql("select unassigned feature sets"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(sql("read unassigned feature sets"))?;
        let discarded = connection
            .execute("DELETE FROM featuresets WHERE file_id IS NULL", [])
            .map_err(sql("discard unassigned feature sets"))?;
        if discarded > 0 {
            debug!("discarded {discarded} unassigned feature sets");
        }

        let mut orphaned = Vec::new();
        for path in reserved.into_iter().flatten() {
            let still_routed: bool = connection
                .query_row(
                    "SELECT EXISTS (SELECT 1 FROM featuresets WHERE fdb_path = ?1)",
                    [path.as_str()],
                    |row| row.get(0),
                )
                .map_err(sql("look up child store references"))?;
            if !still_routed {
                orphaned.push(Utf8PathBuf::from(path));
            }
        }
        Ok(orphaned)
    }

    /// Mark a catalog entry as not finalised.
    ///
    /// # Errors
    /// Propagates database failures.
    pub fn invalidate_entry(connection: &Connection, catalog_id: i64) -> Result<()> {
        Self::set_sync(connection, catalog_id, NOT_FINALIZED)
    }

    /// Mark a catalog entry as finalised.
    ///
    /// # Errors
    /// Propagates database failures.
    pub fn finalize_entry(connection: &Connection, catalog_id: i64) -> Result<()> {
        Self::set_sync(connection, catalog_id, FINALIZED)
    }

    fn set_sync(connection: &Connection, catalog_id: i64, sync: i64) -> Result<()> {
        connection
            .execute("UPDATE catalog SET sync = ?1 WHERE id = ?2", [sync, catalog_id])
            .map_err(sql("update catalog sync flag"))?;
        Ok(())
    }

    /// Record the provider and type of a newly catalogued source.
    ///
    /// # Errors
    /// Propagates database failures.
    pub fn insert_source(
        connection: &Connection,
        catalog_id: i64,
        provider: &str,
        feature_type: &str,
    ) -> Result<()> {
        connection
            .execute(
                "INSERT OR REPLACE INTO catalog_ex (file_id, provider, type, fdb_type, modified)
                 VALUES (?1, ?2, ?3, NULL, 0)",
                params![catalog_id, provider, feature_type],
            )
            .map_err(sql("record source"))?;
        Ok(())
    }

    /// Provider and type recorded for the source catalogued at `path`.
    ///
    /// # Errors
    /// Propagates database failures.
    pub fn source_for_path(connection: &Connection, path: &Utf8Path) -> Result<Option<SourceRecord>> {
        connection
            .query_row(
                "SELECT catalog_ex.file_id, catalog_ex.provider, catalog_ex.type
                 FROM catalog_ex JOIN catalog ON catalog.id = catalog_ex.file_id
                 WHERE catalog.path = ?1",
                [path.as_str()],
                |row| {
                    Ok(SourceRecord {
                        catalog_id: row.get(0)?,
                        provider: row.get(1)?,
                        feature_type: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(sql("look up source"))
    }

    /// Flag the source owning `fsid` as locally modified.
    ///
    /// # Errors
    /// Propagates database failures.
    pub fn mark_file_dirty(connection: &Connection, fsid: i64) -> Result<()> {
        connection
            .execute(
                "UPDATE catalog_ex SET modified = 1
                 WHERE file_id IN (SELECT file_id FROM featuresets WHERE id = ?1 LIMIT 1)",
                [fsid],
            )
            .map_err(sql("mark source modified"))?;
        Ok(())
    }

    /// Clear the modified flag of a source.
    ///
    /// # Errors
    /// Propagates database failures.
    pub fn clear_modified(connection: &Connection, catalog_id: i64) -> Result<()> {
        connection
            .execute(
                "UPDATE catalog_ex SET modified = 0 WHERE file_id = ?1",
                [catalog_id],
            )
            .map_err(sql("clear source modified flag"))?;
        Ok(())
    }

    /// Whether the source catalogued at `path` was modified locally.
    ///
    /// # Errors
    /// Propagates database failures.
    pub fn is_modified(connection: &Connection, path: &Utf8Path) -> Result<bool> {
        connection
            .query_row(
                "SELECT 1 FROM catalog_ex JOIN catalog ON catalog.id = catalog_ex.file_id
                 WHERE catalog.path = ?1 AND catalog_ex.modified != 0 LIMIT 1",
                [path.as_str()],
                |_| Ok(()),
            )
            .optional()
            .map(|found| found.is_some())
            .map_err(sql("check source modified flag"))
    }

    /// Catalogued paths, optionally only those modified locally.
    ///
    /// # Errors
    /// Propagates database failures.
    pub fn source_paths(connection: &Connection, modified_only: bool) -> Result<Vec<Utf8PathBuf>> {
        let statement_sql = if modified_only {
            "SELECT catalog.path FROM catalog JOIN catalog_ex ON catalog.id = catalog_ex.file_id
             WHERE catalog_ex.modified != 0 ORDER BY catalog.id"
        } else {
            "SELECT path FROM catalog ORDER BY id"
        };
        let mut statement = connection
            .prepare(statement_sql)
            .map_err(sql("prepare source paths"))?;
        let paths = statement
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(sql("select source paths"))?
            .map(|path| path.map(Utf8PathBuf::from))
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(sql("read source paths"))?;
        Ok(paths)
    }

    /// Every child store file a routing row refers to.
    ///
    /// # Errors
    /// Propagates database failures.
    pub fn child_paths(connection: &Connection) -> Result<BTreeSet<Utf8PathBuf>> {
        let mut statement = connection
            .prepare("SELECT DISTINCT fdb_path FROM featuresets WHERE fdb_path IS NOT NULL")
            .map_err(sql("prepare child store paths"))?;
        let paths = statement
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(sql("select child store paths"))?
            .map(|path| path.map(Utf8PathBuf::from))
            .collect::<rusqlite::Result<BTreeSet<_>>>()
            .map_err(sql("read child store paths"))?;
        Ok(paths)
    }

    /// Catalogued path owning `fsid`.
    ///
    /// # Errors
    /// Propagates database failures.
    pub fn file_for_feature_set(connection: &Connection, fsid: i64) -> Result<Option<Utf8PathBuf>> {
        connection
            .query_row(
                "SELECT path FROM catalog
                 WHERE id IN (SELECT file_id FROM featuresets WHERE id = ?1)",
                [fsid],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map(|path| path.map(Utf8PathBuf::from))
            .map_err(sql("look up feature set source"))
    }

    /// Feature set ids produced from the source catalogued at `path`.
    ///
    /// # Errors
    /// Propagates database failures.
    pub fn feature_set_ids_for_path(connection: &Connection, path: &Utf8Path) -> Result<Vec<i64>> {
        let mut statement = connection
            .prepare(
                "SELECT featuresets.id FROM featuresets
                 JOIN catalog ON catalog.id = featuresets.file_id
                 WHERE catalog.path = ?1 ORDER BY featuresets.id",
            )
            .map_err(sql("prepare source feature sets"))?;
        let ids = statement
            .query_map([path.as_str()], |row| row.get(0))
            .map_err(sql("select source feature sets"))?
            .collect::<rusqlite::Result<Vec<i64>>>()
            .map_err(sql("read source feature sets"))?;
        Ok(ids)
    }

    /// `(fsid, name)` of every routing row of a catalog entry.
    ///
    /// # Errors
    /// Propagates database failures.
    pub fn feature_sets_for_entry(
        connection: &Connection,
        catalog_id: i64,
    ) -> Result<Vec<(i64, String)>> {
        let mut statement = connection
            .prepare("SELECT id, name FROM featuresets WHERE file_id = ?1 ORDER BY id")
            .map_err(sql("prepare entry feature sets"))?;
        let rows = statement
            .query_map([catalog_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(sql("select entry feature sets"))?
            .collect::<rusqlite::Result<Vec<(i64, String)>>>()
            .map_err(sql("read entry feature sets"))?;
        Ok(rows)
    }

    /// Every committed routing row.
    ///
    /// # Errors
    /// Propagates database failures.
    pub fn persisted_routes(connection: &Connection) -> Result<Vec<PersistedRoute>> {
        let mut statement = connection
            .prepare(
                "SELECT id, name, fdb_path, provider, type, file_id FROM featuresets
                 WHERE file_id IS NOT NULL ORDER BY id",
            )
            .map_err(sql("prepare persisted routes"))?;
        let routes = statement
            .query_map([], |row| {
                let child_path: String = row.get(2)?;
                Ok(PersistedRoute {
                    fsid: row.get(0)?,
                    name: row.get(1)?,
                    child_path: Utf8PathBuf::from(child_path),
                    provider: row.get(3)?,
                    feature_type: row.get(4)?,
                    catalog_id: row.get(5)?,
                })
            })
            .map_err(sql("select persisted routes"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(sql("read persisted routes"))?;
        Ok(routes)
    }

    fn remove_entry_routes(
        &mut self,
        connection: &Connection,
        catalog_id: i64,
    ) -> Result<(), CatalogError> {
        let persisted = {
            let mut statement = connection
                .prepare("SELECT id, fdb_path FROM featuresets WHERE file_id = ?1")
                .map_err(hook_sql("prepare entry routes"))?;
            statement
                .query_map([catalog_id], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(hook_sql("select entry routes"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(hook_sql("read entry routes"))?
        };

        for (fsid, child_path) in persisted {
            if self.remove_route(fsid).is_some() {
                continue;
            }
            let routed = self
                .routes
                .values()
                .any(|entry| entry.database.path() == child_path.as_str());
            if routed {
                continue;
            }
            if let Err(err) = tessera_fs::remove_file_if_exists(Utf8Path::new(&child_path)) {
                warn!("failed to remove unrouted child store {child_path}: {err}");
            }
        }

        // Routes whose rows an update already replaced.
        let detached: Vec<i64> = self
            .routes
            .values()
            .filter(|entry| entry.catalog_id == catalog_id)
            .map(|entry| entry.fsid)
            .collect();
        for fsid in detached {
            self.remove_route(fsid);
        }

        delete_entry_rows(connection, catalog_id)?;
        debug!("removed routes of catalog entry {catalog_id}");
        Ok(())
    }

    fn sweep_orphans(&mut self, connection: &Connection) -> Result<(), CatalogError> {
        let orphans = {
            let mut statement = connection
                .prepare(
                    "SELECT DISTINCT featuresets.file_id FROM featuresets
                     LEFT JOIN catalog ON featuresets.file_id = catalog.id
                     WHERE catalog.id IS NULL AND featuresets.file_id IS NOT NULL",
                )
                .map_err(hook_sql("prepare orphan sweep"))?;
            statement
                .query_map([], |row| row.get::<_, i64>(0))
                .map_err(hook_sql("select orphaned routes"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(hook_sql("read orphaned routes"))?
        };
        for catalog_id in orphans {
            self.remove_entry_routes(connection, catalog_id)?;
        }
        connection
            .execute(
                "DELETE FROM catalog_ex WHERE file_id NOT IN (SELECT id FROM catalog)",
                [],
            )
            .map_err(hook_sql("delete orphaned source records"))?;
        Ok(())
    }
}

fn delete_entry_rows(connection: &Connection, catalog_id: i64) -> Result<(), CatalogError> {
    connection
        .execute("DELETE FROM featuresets WHERE file_id = ?1", [catalog_id])
        .map_err(hook_sql("delete entry routes"))?;
    connection
        .execute("DELETE FROM catalog_ex WHERE file_id = ?1", [catalog_id])
        .map_err(hook_sql("delete entry source record"))?;
    Ok(())
}

impl CatalogHooks for RouteIndex {
    fn schema_version(&self) -> i32 {
        ROUTE_INDEX_SCHEMA_VERSION
    }

    fn build_schema(&mut self, connection: &Connection) -> Result<(), CatalogError> {
        run_migration_step(connection, "create featuresets", CREATE_FEATURESETS)?;
        run_migration_step(connection, "create catalog_ex", CREATE_CATALOG_EX)?;
        connection
            .execute(
                "INSERT OR REPLACE INTO catalog_metadata (key, value) VALUES (?1, ?2)",
                [SUBSCHEMA_KEY, SUBSCHEMA_VERSION],
            )
            .map_err(|source| CatalogError::Migration {
                step: "record route index subschema",
                source,
            })?;
        Ok(())
    }

    fn drop_schema(&mut self, connection: &Connection) -> Result<(), CatalogError> {
        run_migration_step(connection, "drop featuresets", "DROP TABLE IF EXISTS featuresets")?;
        run_migration_step(connection, "drop catalog_ex", "DROP TABLE IF EXISTS catalog_ex")?;
        self.routes.clear();
        if let Err(err) = tessera_fs::remove_dir_all_if_exists(&self.child_directory) {
            warn!(
                "failed to clear child store directory {}: {err}",
                self.child_directory
            );
        }
        Ok(())
    }

    fn upgrade_schema(&mut self, connection: &Connection) -> Result<(), CatalogError> {
        let recorded: Option<String> = connection
            .query_row(
                "SELECT value FROM catalog_metadata WHERE key = ?1",
                [SUBSCHEMA_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(|source| CatalogError::Migration {
                step: "read route index subschema",
                source,
            })?;
        if recorded.is_some() {
            return Ok(());
        }
        run_migration_step(connection, "create catalog_ex", CREATE_CATALOG_EX)?;
        run_migration_step(
            connection,
            "backfill catalog_ex",
            "INSERT OR IGNORE INTO catalog_ex (file_id, provider, type, fdb_type, modified)
             SELECT DISTINCT file_id, provider, type, fdb_type, 0 FROM featuresets
             WHERE file_id IS NOT NULL",
        )?;
        connection
            .execute(
                "INSERT INTO catalog_metadata (key, value) VALUES (?1, ?2)",
                [SUBSCHEMA_KEY, SUBSCHEMA_VERSION],
            )
            .map_err(|source| CatalogError::Migration {
                step: "record route index subschema",
                source,
            })?;
        Ok(())
    }

    fn is_row_usable(&self, row: &CatalogRow) -> bool {
        row.sync != NOT_FINALIZED || self.pending.contains(&row.path)
    }

    fn on_entry_removed(
        &mut self,
        connection: &Connection,
        removed: RemovedEntry,
        automated: bool,
    ) -> Result<(), CatalogError> {
        match removed {
            RemovedEntry::Entry(catalog_id) => {
                if automated {
                    debug!("catalog dropped stale entry {catalog_id}");
                }
                self.remove_entry_routes(connection, catalog_id)
            }
            RemovedEntry::Released(catalog_id) => delete_entry_rows(connection, catalog_id),
            RemovedEntry::Orphans => self.sweep_orphans(connection),
        }
    }

    fn on_validated(&mut self, connection: &Connection) -> Result<(), CatalogError> {
        self.sweep_orphans(connection)
    }
}
