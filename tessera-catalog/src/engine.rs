//! The catalog engine: a `SQLite` table of entries derived from source
//! files, each stamped by the [`Currency`] that can later re-validate it.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tessera_core::{Currency, CurrencyRegistry};

use crate::hooks::{CatalogHooks, NoHooks, RemovedEntry};
use crate::schema::{
    SOFT_DELETE_VERSION, create_tables, database_version, drop_tables, stored_version,
    write_version,
};
use crate::CatalogError;

const SELECT_ROWS: &str = "SELECT id, path, sync, appversion, appdata, appname FROM catalog";

/// One persisted catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    /// Synthetic primary key.
    pub id: i64,
    /// Source path the entry was derived from.
    pub path: Utf8PathBuf,
    /// Finalisation flag. Its meaning is owned by the hooks in use.
    pub sync: i64,
    /// Name of the currency that fingerprinted the entry.
    pub app_name: String,
    /// Currency version recorded with the fingerprint.
    pub app_version: i32,
    /// Opaque fingerprint.
    pub app_data: Vec<u8>,
}

impl CatalogRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let path: String = row.get(1)?;
        let app_data: Option<Vec<u8>> = row.get(4)?;
        Ok(Self {
            id: row.get(0)?,
            path: Utf8PathBuf::from(path),
            sync: row.get(2)?,
            app_version: row.get(3)?,
            app_data: app_data.unwrap_or_default(),
            app_name: row.get(5)?,
        })
    }
}

/// Generic `SELECT` assembled from parts.
///
/// Table and column names are checked to be plain identifiers. The
/// selection, grouping and ordering clauses are passed through verbatim, so
/// callers couple themselves to the current table layout; prefer the typed
/// accessors on [`Catalog`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawQuery {
    table: String,
    columns: Vec<String>,
    selection: Option<String>,
    args: Vec<Value>,
    group_by: Option<String>,
    having: Option<String>,
    order_by: Option<String>,
    limit: Option<u32>,
}

impl RawQuery {
    /// Select every column of `table`.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Restrict the selected columns.
    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// `WHERE` clause with positional arguments.
    #[must_use]
    pub fn selection(mut self, clause: impl Into<String>, args: Vec<Value>) -> Self {
        self.selection = Some(clause.into());
        self.args = args;
        self
    }

    /// `GROUP BY` clause.
    #[must_use]
    pub fn group_by(mut self, clause: impl Into<String>) -> Self {
        self.group_by = Some(clause.into());
        self
    }

    /// `HAVING` clause.
    #[must_use]
    pub fn having(mut self, clause: impl Into<String>) -> Self {
        self.having = Some(clause.into());
        self
    }

    /// `ORDER BY` clause.
    #[must_use]
    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by = Some(clause.into());
        self
    }

    /// `LIMIT` clause.
    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    fn to_sql(&self) -> Result<String, CatalogError> {
        check_identifier(&self.table)?;
        let columns = if self.columns.is_empty() {
            String::from("*")
        } else {
            for column in &self.columns {
                check_identifier(column)?;
            }
            self.columns.join(", ")
        };
        let mut sql = format!("SELECT {columns} FROM {}", self.table);
        let clauses = [
            (" WHERE ", self.selection.as_deref()),
            (" GROUP BY ", self.group_by.as_deref()),
            (" HAVING ", self.having.as_deref()),
            (" ORDER BY ", self.order_by.as_deref()),
        ];
        for (keyword, clause) in clauses {
            if let Some(text) = clause {
                sql.push_str(keyword);
                sql.push_str(text);
            }
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        Ok(sql)
    }
}

fn check_identifier(identifier: &str) -> Result<(), CatalogError> {
    let mut chars = identifier.chars();
    let valid = chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CatalogError::InvalidIdentifier {
            identifier: identifier.to_owned(),
        })
    }
}

/// Which rows a validation sweep visits.
#[derive(Debug, Clone, Copy)]
enum Scope<'a> {
    All,
    App(&'a str),
    Path(&'a Utf8Path),
}

/// A versioned catalog of entries derived from source files.
///
/// The database is rebuilt whenever its stored version differs from
/// [`database_version`] of the hooks' schema version. `H` keeps derived
/// tables consistent with catalog mutations.
pub struct Catalog<H = NoHooks> {
    connection: Connection,
    path: Utf8PathBuf,
    hooks: H,
    currencies: Arc<CurrencyRegistry>,
}

impl<H> std::fmt::Debug for Catalog<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl<H: CatalogHooks> Catalog<H> {
    /// Open or create the catalog database at `path`.
    ///
    /// # Errors
    /// Returns [`CatalogError::OpenDatabase`] when the file cannot be opened
    /// and [`CatalogError::Migration`] when the schema cannot be rebuilt.
    pub fn open(
        path: &Utf8Path,
        mut hooks: H,
        currencies: Arc<CurrencyRegistry>,
    ) -> Result<Self, CatalogError> {
        let mut connection =
            Connection::open(path).map_err(|source| CatalogError::OpenDatabase {
                path: path.to_path_buf(),
                source,
            })?;

        let expected = database_version(hooks.schema_version());
        let stored = stored_version(&connection)?;
        if hooks.check_version(stored, expected) {
            hooks.upgrade_schema(&connection)?;
        } else {
            if stored != 0 {
                info!("rebuilding catalog {path}: stored version {stored:#x}, expected {expected:#x}");
            }
            let transaction =
                connection
                    .transaction()
                    .map_err(|source| CatalogError::Migration {
                        step: "begin rebuild transaction",
                        source,
                    })?;
            hooks.drop_schema(&transaction)?;
            drop_tables(&transaction)?;
            create_tables(&transaction)?;
            hooks.build_schema(&transaction)?;
            write_version(&transaction, expected)?;
            transaction
                .commit()
                .map_err(|source| CatalogError::Migration {
                    step: "commit rebuild transaction",
                    source,
                })?;
        }

        Ok(Self {
            connection,
            path: path.to_path_buf(),
            hooks,
            currencies,
        })
    }

    /// Location of the backing database.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Registry consulted by validation sweeps.
    pub fn currencies(&self) -> &Arc<CurrencyRegistry> {
        &self.currencies
    }

    /// Borrow the hooks.
    pub const fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Mutably borrow the hooks.
    pub const fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    /// Borrow the connection.
    pub const fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Borrow the connection and the hooks at once.
    pub const fn parts_mut(&mut self) -> (&Connection, &mut H) {
        (&self.connection, &mut self.hooks)
    }

    /// Run `operation` inside a transaction that commits when it returns
    /// `Ok` and rolls back otherwise.
    ///
    /// # Errors
    /// Propagates the error returned by `operation` or by the transaction.
    pub fn with_transaction<T, E>(
        &mut self,
        operation: impl FnOnce(&Connection, &mut H) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<CatalogError>,
    {
        let transaction = self
            .connection
            .transaction()
            .map_err(CatalogError::query("begin transaction"))?;
        let value = operation(&transaction, &mut self.hooks)?;
        transaction
            .commit()
            .map_err(CatalogError::query("commit transaction"))?;
        Ok(value)
    }

    /// Insert a not-yet-finalised entry for `derived_from` and return its id.
    ///
    /// # Errors
    /// Fails when the currency cannot fingerprint the path, when the path is
    /// already catalogued, or when a hook fails.
    pub fn add_entry(
        &mut self,
        derived_from: &Utf8Path,
        currency: &dyn Currency,
    ) -> Result<i64, CatalogError> {
        let fingerprint = fingerprint(derived_from, currency)?;
        self.with_transaction(|connection, hooks| {
            connection
                .execute(
                    "INSERT INTO catalog (path, sync, appname, appversion, appdata)
                     VALUES (?1, 0, ?2, ?3, ?4)",
                    params![
                        derived_from.as_str(),
                        currency.name(),
                        currency.app_version(),
                        fingerprint
                    ],
                )
                .map_err(CatalogError::query("insert catalog entry"))?;
            let id = connection.last_insert_rowid();
            hooks.on_entry_added(connection, id)?;
            debug!("catalogued {derived_from} as entry {id}");
            Ok(id)
        })
    }

    /// Re-fingerprint entry `id`, point it at `derived_from` and clear its
    /// finalisation flag.
    ///
    /// # Errors
    /// Returns [`CatalogError::MissingEntry`] when no entry has that id.
    pub fn update_entry(
        &mut self,
        id: i64,
        derived_from: &Utf8Path,
        currency: &dyn Currency,
    ) -> Result<(), CatalogError> {
        let fingerprint = fingerprint(derived_from, currency)?;
        let updated = self
            .connection
            .execute(
                "UPDATE catalog SET path = ?1, sync = 0, appname = ?2, appversion = ?3, appdata = ?4
                 WHERE id = ?5",
                params![
                    derived_from.as_str(),
                    currency.name(),
                    currency.app_version(),
                    fingerprint,
                    id
                ],
            )
            .map_err(CatalogError::query("update catalog entry"))?;
        if updated == 0 {
            return Err(CatalogError::MissingEntry {
                path: derived_from.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Validate every entry, deleting those their currency rejects.
    ///
    /// Returns the ids of the deleted entries.
    ///
    /// # Errors
    /// Fails when the catalog cannot be read or a deletion or hook fails.
    /// A currency error on one row is logged and that row is kept.
    pub fn validate_catalog(&mut self) -> Result<Vec<i64>, CatalogError> {
        self.validate(Scope::All)
    }

    /// Validate the entries produced by currency `app_name`.
    ///
    /// # Errors
    /// As for [`Catalog::validate_catalog`].
    pub fn validate_catalog_for_app(&mut self, app_name: &str) -> Result<Vec<i64>, CatalogError> {
        self.validate(Scope::App(app_name))
    }

    /// Validate the entry for `path`, if any.
    ///
    /// # Errors
    /// As for [`Catalog::validate_catalog`].
    pub fn validate_catalog_for_path(
        &mut self,
        path: &Utf8Path,
    ) -> Result<Vec<i64>, CatalogError> {
        self.validate(Scope::Path(path))
    }

    fn validate(&mut self, scope: Scope<'_>) -> Result<Vec<i64>, CatalogError> {
        let currencies = Arc::clone(&self.currencies);
        self.with_transaction(|connection, hooks| {
            let rows = select_rows(connection, scope)?;
            let mut removed = Vec::new();
            for row in rows {
                if row_is_valid(&*hooks, &currencies, &row) {
                    continue;
                }
                connection
                    .execute("DELETE FROM catalog WHERE id = ?1", [row.id])
                    .map_err(CatalogError::query("delete invalid catalog entry"))?;
                hooks.on_entry_removed(connection, RemovedEntry::Entry(row.id), true)?;
                debug!("removed stale catalog entry {} for {}", row.id, row.path);
                removed.push(row.id);
            }
            hooks.on_validated(connection)?;
            Ok(removed)
        })
    }

    /// Mark the entry for `path` as independently confirmed current.
    ///
    /// Returns whether an entry was updated.
    ///
    /// # Errors
    /// Fails when the update or the hook fails.
    pub fn mark_entry_valid(&mut self, path: &Utf8Path) -> Result<bool, CatalogError> {
        let updated = self
            .connection
            .execute(
                "UPDATE catalog SET sync = 0 WHERE path = ?1",
                [path.as_str()],
            )
            .map_err(CatalogError::query("mark catalog entry valid"))?;
        self.hooks.on_entry_marked_valid(&self.connection, None)?;
        Ok(updated > 0)
    }

    /// Delete the entry for `path`.
    ///
    /// # Errors
    /// Returns [`CatalogError::MissingEntry`] when `path` is not catalogued.
    pub fn delete_path(&mut self, path: &Utf8Path) -> Result<i64, CatalogError> {
        self.delete_path_as(path, RemovedEntry::Entry)
    }

    /// Delete the entry for `path` on behalf of a caller that already
    /// dropped every in-memory structure derived from it. Hooks receive
    /// [`RemovedEntry::Released`].
    ///
    /// # Errors
    /// Returns [`CatalogError::MissingEntry`] when `path` is not catalogued.
    pub fn delete_released(&mut self, path: &Utf8Path) -> Result<i64, CatalogError> {
        self.delete_path_as(path, RemovedEntry::Released)
    }

    fn delete_path_as(
        &mut self,
        path: &Utf8Path,
        notification: fn(i64) -> RemovedEntry,
    ) -> Result<i64, CatalogError> {
        let id = self
            .entry_id(path)?
            .ok_or_else(|| CatalogError::MissingEntry {
                path: path.to_path_buf(),
            })?;
        self.with_transaction(|connection, hooks| {
            connection
                .execute("DELETE FROM catalog WHERE id = ?1", [id])
                .map_err(CatalogError::query("delete catalog entry"))?;
            hooks.on_entry_removed(connection, notification(id), false)?;
            Ok(id)
        })
    }

    /// Delete every entry produced by currency `app_name`.
    ///
    /// Returns the number of deleted entries.
    ///
    /// # Errors
    /// Fails when the deletion or the orphan hook fails.
    pub fn delete_for_app(&mut self, app_name: &str) -> Result<usize, CatalogError> {
        self.with_transaction(|connection, hooks| {
            let deleted = connection
                .execute("DELETE FROM catalog WHERE appname = ?1", [app_name])
                .map_err(CatalogError::query("delete catalog entries for app"))?;
            if deleted > 0 {
                hooks.on_entry_removed(connection, RemovedEntry::Orphans, true)?;
            }
            Ok(deleted)
        })
    }

    /// Invalidate the stored schema version so the next open rebuilds the
    /// catalog. Rows stay in place until then.
    ///
    /// # Errors
    /// Fails when the version cannot be written.
    pub fn delete_all(&mut self) -> Result<(), CatalogError> {
        write_version(&self.connection, SOFT_DELETE_VERSION)
    }

    /// Run a generic `SELECT` and return every row as dynamic values.
    ///
    /// # Errors
    /// Returns [`CatalogError::InvalidIdentifier`] for a malformed table or
    /// column name, and [`CatalogError::Query`] when the statement fails.
    pub fn query(&self, query: &RawQuery) -> Result<Vec<Vec<Value>>, CatalogError> {
        let sql = query.to_sql()?;
        let mut statement = self
            .connection
            .prepare(&sql)
            .map_err(CatalogError::query("prepare raw catalog query"))?;
        let width = statement.column_count();
        let rows = statement
            .query_map(rusqlite::params_from_iter(query.args.iter()), |row| {
                (0..width)
                    .map(|index| row.get::<_, Value>(index))
                    .collect::<rusqlite::Result<Vec<Value>>>()
            })
            .map_err(CatalogError::query("run raw catalog query"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(CatalogError::query("read raw catalog rows"))
    }

    /// Whether `path` is catalogued.
    ///
    /// # Errors
    /// Fails when the lookup query fails.
    pub fn contains(&self, path: &Utf8Path) -> Result<bool, CatalogError> {
        self.entry_id(path).map(|id| id.is_some())
    }

    /// Id of the entry for `path`.
    ///
    /// # Errors
    /// Fails when the lookup query fails.
    pub fn entry_id(&self, path: &Utf8Path) -> Result<Option<i64>, CatalogError> {
        self.connection
            .query_row(
                "SELECT id FROM catalog WHERE path = ?1",
                [path.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(CatalogError::query("look up catalog entry id"))
    }

    /// Full entry for `path`.
    ///
    /// # Errors
    /// Fails when the lookup query fails.
    pub fn entry(&self, path: &Utf8Path) -> Result<Option<CatalogRow>, CatalogError> {
        Ok(select_rows(&self.connection, Scope::Path(path))?
            .into_iter()
            .next())
    }

    /// Every entry, ordered by id.
    ///
    /// # Errors
    /// Fails when the catalog cannot be read.
    pub fn rows(&self) -> Result<Vec<CatalogRow>, CatalogError> {
        select_rows(&self.connection, Scope::All)
    }

    /// Every catalogued path, ordered by id.
    ///
    /// # Errors
    /// Fails when the catalog cannot be read.
    pub fn paths(&self) -> Result<Vec<Utf8PathBuf>, CatalogError> {
        Ok(self.rows()?.into_iter().map(|row| row.path).collect())
    }
}

fn fingerprint(path: &Utf8Path, currency: &dyn Currency) -> Result<Vec<u8>, CatalogError> {
    currency
        .fingerprint(path)
        .map_err(|source| CatalogError::Currency {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
}

fn select_rows(connection: &Connection, scope: Scope<'_>) -> Result<Vec<CatalogRow>, CatalogError> {
    let (sql, arg) = match scope {
        Scope::All => (format!("{SELECT_ROWS} ORDER BY id"), None),
        Scope::App(name) => (format!("{SELECT_ROWS} WHERE appname = ?1 ORDER BY id"), Some(name)),
        Scope::Path(path) => (
            format!("{SELECT_ROWS} WHERE path = ?1 ORDER BY id"),
            Some(path.as_str()),
        ),
    };
    let mut statement = connection
        .prepare(&sql)
        .map_err(CatalogError::query("prepare catalog rows"))?;
    let rows = match arg {
        Some(value) => statement.query_map([value], CatalogRow::from_row),
        None => statement.query_map([], CatalogRow::from_row),
    }
    .map_err(CatalogError::query("select catalog rows"))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(CatalogError::query("read catalog rows"))
}

fn row_is_valid<H: CatalogHooks>(hooks: &H, currencies: &CurrencyRegistry, row: &CatalogRow) -> bool {
    if !hooks.is_row_usable(row) {
        return false;
    }
    let Some(currency) = currencies.lookup(&row.app_name) else {
        warn!(
            "no currency named {:?} is registered; keeping catalog entry for {}",
            row.app_name, row.path
        );
        return true;
    };
    match currency.is_valid(&row.path, row.app_version, &row.app_data) {
        Ok(valid) => valid,
        Err(err) => {
            warn!("failed to validate catalog entry for {}: {err}", row.path);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;
    use tessera_core::test_support::AlwaysStaleCurrency;

    #[derive(Debug)]
    struct FixedCurrency;

    impl Currency for FixedCurrency {
        fn name(&self) -> &str {
            "fixed"
        }

        fn app_version(&self) -> i32 {
            3
        }

        fn fingerprint(&self, path: &Utf8Path) -> tessera_core::Result<Vec<u8>> {
            Ok(path.as_str().as_bytes().to_vec())
        }

        fn is_valid(
            &self,
            path: &Utf8Path,
            version: i32,
            fingerprint: &[u8],
        ) -> tessera_core::Result<bool> {
            Ok(version == 3 && fingerprint == path.as_str().as_bytes())
        }
    }

    #[derive(Debug, Default)]
    struct RecordingHooks {
        added: Vec<i64>,
        removed: Vec<(RemovedEntry, bool)>,
        validated: usize,
    }

    impl CatalogHooks for RecordingHooks {
        fn schema_version(&self) -> i32 {
            5
        }

        fn on_entry_added(&mut self, _: &Connection, id: i64) -> Result<(), CatalogError> {
            self.added.push(id);
            Ok(())
        }

        fn on_entry_removed(
            &mut self,
            _: &Connection,
            removed: RemovedEntry,
            automated: bool,
        ) -> Result<(), CatalogError> {
            self.removed.push((removed, automated));
            Ok(())
        }

        fn on_validated(&mut self, _: &Connection) -> Result<(), CatalogError> {
            self.validated += 1;
            Ok(())
        }
    }

    #[fixture]
    fn temp_dir() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("create temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        (dir, root)
    }

    fn open_recording(path: &Utf8Path, registry: Arc<CurrencyRegistry>) -> Catalog<RecordingHooks> {
        Catalog::open(path, RecordingHooks::default(), registry).expect("open catalog")
    }

    #[rstest]
    fn add_entry_records_fingerprint_and_fires_hook(temp_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = temp_dir;
        let mut catalog = open_recording(&root.join("catalog.sqlite"), Arc::default());
        let source = root.join("a.json");
        let id = catalog.add_entry(&source, &FixedCurrency).expect("add entry");

        let row = catalog.entry(&source).expect("lookup").expect("present");
        assert_eq!(row.id, id);
        assert_eq!(row.sync, 0);
        assert_eq!(row.app_name, "fixed");
        assert_eq!(row.app_version, 3);
        assert_eq!(row.app_data, source.as_str().as_bytes());
        assert_eq!(catalog.hooks().added, vec![id]);
    }

    #[rstest]
    fn duplicate_paths_are_rejected(temp_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = temp_dir;
        let mut catalog = open_recording(&root.join("catalog.sqlite"), Arc::default());
        let source = root.join("a.json");
        catalog.add_entry(&source, &FixedCurrency).expect("first add");
        let err = catalog
            .add_entry(&source, &FixedCurrency)
            .expect_err("second add should fail");
        assert!(matches!(err, CatalogError::Query { .. }));
    }

    #[rstest]
    fn unregistered_currency_keeps_entries(temp_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = temp_dir;
        let mut catalog = open_recording(&root.join("catalog.sqlite"), Arc::default());
        let source = root.join("a.json");
        catalog.add_entry(&source, &FixedCurrency).expect("add entry");
        let removed = catalog.validate_catalog().expect("validate");
        assert!(removed.is_empty());
        assert!(catalog.contains(&source).expect("contains"));
        assert_eq!(catalog.hooks().validated, 1);
    }

    #[rstest]
    fn stale_entries_are_removed_with_automated_hook(temp_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = temp_dir;
        let registry = Arc::new(CurrencyRegistry::new());
        registry.register(Arc::new(AlwaysStaleCurrency::named("fixed")));
        let mut catalog = open_recording(&root.join("catalog.sqlite"), Arc::clone(&registry));
        let source = root.join("a.json");
        let id = catalog.add_entry(&source, &FixedCurrency).expect("add entry");

        let removed = catalog.validate_catalog_for_app("fixed").expect("validate");
        assert_eq!(removed, vec![id]);
        assert!(!catalog.contains(&source).expect("contains"));
        assert_eq!(
            catalog.hooks().removed,
            vec![(RemovedEntry::Entry(id), true)]
        );
    }

    #[rstest]
    fn path_scoped_validation_only_visits_that_path(temp_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = temp_dir;
        let registry = Arc::new(CurrencyRegistry::new());
        registry.register(Arc::new(AlwaysStaleCurrency::named("fixed")));
        let mut catalog = open_recording(&root.join("catalog.sqlite"), registry);
        let first = root.join("a.json");
        let second = root.join("b.json");
        catalog.add_entry(&first, &FixedCurrency).expect("add first");
        catalog.add_entry(&second, &FixedCurrency).expect("add second");

        catalog.validate_catalog_for_path(&first).expect("validate");
        assert!(!catalog.contains(&first).expect("contains first"));
        assert!(catalog.contains(&second).expect("contains second"));
    }

    #[rstest]
    fn delete_path_reports_missing_entries(temp_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = temp_dir;
        let mut catalog = open_recording(&root.join("catalog.sqlite"), Arc::default());
        let err = catalog
            .delete_path(&root.join("missing.json"))
            .expect_err("missing path should fail");
        assert!(matches!(err, CatalogError::MissingEntry { .. }));

        let source = root.join("a.json");
        let id = catalog.add_entry(&source, &FixedCurrency).expect("add entry");
        assert_eq!(catalog.delete_path(&source).expect("delete"), id);
        assert_eq!(
            catalog.hooks().removed,
            vec![(RemovedEntry::Entry(id), false)]
        );
    }

    #[rstest]
    fn released_deletions_carry_their_own_notification(temp_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = temp_dir;
        let mut catalog = open_recording(&root.join("catalog.sqlite"), Arc::default());
        let source = root.join("a.json");
        let id = catalog.add_entry(&source, &FixedCurrency).expect("add entry");
        assert_eq!(catalog.delete_released(&source).expect("delete"), id);
        assert!(!catalog.contains(&source).expect("contains"));
        assert_eq!(
            catalog.hooks().removed,
            vec![(RemovedEntry::Released(id), false)]
        );
        assert!(matches!(
            catalog.delete_released(&source),
            Err(CatalogError::MissingEntry { .. })
        ));
    }

    #[rstest]
    fn delete_for_app_sweeps_orphans_once(temp_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = temp_dir;
        let mut catalog = open_recording(&root.join("catalog.sqlite"), Arc::default());
        catalog
            .add_entry(&root.join("a.json"), &FixedCurrency)
            .expect("add first");
        catalog
            .add_entry(&root.join("b.json"), &FixedCurrency)
            .expect("add second");
        assert_eq!(catalog.delete_for_app("other").expect("delete none"), 0);
        assert_eq!(catalog.delete_for_app("fixed").expect("delete"), 2);
        assert_eq!(
            catalog.hooks().removed,
            vec![(RemovedEntry::Orphans, true)]
        );
    }

    #[rstest]
    fn update_entry_clears_sync_and_moves_path(temp_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = temp_dir;
        let mut catalog = open_recording(&root.join("catalog.sqlite"), Arc::default());
        let source = root.join("a.json");
        let id = catalog.add_entry(&source, &FixedCurrency).expect("add entry");
        catalog
            .connection()
            .execute("UPDATE catalog SET sync = 1", [])
            .expect("finalise");

        let moved = root.join("b.json");
        catalog
            .update_entry(id, &moved, &FixedCurrency)
            .expect("update entry");
        let row = catalog.entry(&moved).expect("lookup").expect("present");
        assert_eq!(row.sync, 0);
        assert!(!catalog.contains(&source).expect("contains old path"));
        assert!(matches!(
            catalog.update_entry(id + 1, &moved, &FixedCurrency),
            Err(CatalogError::MissingEntry { .. })
        ));
    }

    #[rstest]
    fn delete_all_forces_rebuild_on_reopen(temp_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = temp_dir;
        let db = root.join("catalog.sqlite");
        let source = root.join("a.json");
        {
            let mut catalog = open_recording(&db, Arc::default());
            catalog.add_entry(&source, &FixedCurrency).expect("add entry");
            catalog.delete_all().expect("delete all");
            assert!(catalog.contains(&source).expect("rows survive until reopen"));
        }
        let catalog = open_recording(&db, Arc::default());
        assert!(!catalog.contains(&source).expect("contains after rebuild"));
    }

    #[rstest]
    fn reopening_with_same_version_keeps_rows(temp_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = temp_dir;
        let db = root.join("catalog.sqlite");
        let source = root.join("a.json");
        open_recording(&db, Arc::default())
            .add_entry(&source, &FixedCurrency)
            .expect("add entry");
        let catalog = open_recording(&db, Arc::default());
        assert!(catalog.contains(&source).expect("contains"));

        let plain: Catalog = Catalog::open(&db, NoHooks, Arc::default()).expect("open plain");
        assert!(!plain.contains(&source).expect("plain catalog rebuilt"));
    }

    #[rstest]
    fn raw_query_checks_identifiers(temp_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = temp_dir;
        let mut catalog = open_recording(&root.join("catalog.sqlite"), Arc::default());
        let source = root.join("a.json");
        catalog.add_entry(&source, &FixedCurrency).expect("add entry");

        let rows = catalog
            .query(
                &RawQuery::table("catalog")
                    .columns(["path", "appversion"])
                    .selection("appname = ?1", vec![Value::Text(String::from("fixed"))])
                    .order_by("id")
                    .limit(10),
            )
            .expect("raw query");
        assert_eq!(
            rows,
            vec![vec![
                Value::Text(source.to_string()),
                Value::Integer(3)
            ]]
        );

        let err = catalog
            .query(&RawQuery::table("catalog; DROP TABLE catalog"))
            .expect_err("identifier should be rejected");
        assert!(matches!(err, CatalogError::InvalidIdentifier { .. }));
    }
}
