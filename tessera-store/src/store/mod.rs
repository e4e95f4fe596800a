//! The federated feature store facade.
//!
//! [`FederatedFeatureStore`] owns a store directory holding the route index
//! (`index.sqlite` by default) and the child store files it routes to. One
//! mutex guards the catalog together with the in-memory route entries and
//! the pending set; child store I/O for ingestion happens outside it.

mod data_store;
mod ingest;
mod query;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use tessera_catalog::{Catalog, CatalogError};
use tessera_core::{
    ChildStoreFactory, ContentParsers, CurrencyRegistry, FeatureStoreError, Result,
};
use tessera_fdb::SqliteChildStoreFactory;
use tessera_fs::PathKind;

use crate::listener::Listeners;
use crate::{
    PersistedRoute, RouteEntry, RouteIndex, SharedDatabase, SourceCurrency, StoreListener,
    StoreOptions,
};

pub use ingest::AddOutcome;

/// Lock-guarded state shared with ingestion guards.
///
/// `catalog` is `None` once the store was closed.
pub(crate) struct StoreState {
    pub(crate) catalog: Mutex<Option<Catalog<RouteIndex>>>,
    pub(crate) pending_changed: Condvar,
}

/// File name suffix of child store files.
const CHILD_FILE_SUFFIX: &str = ".sqlite";

pub(crate) const fn closed() -> FeatureStoreError {
    FeatureStoreError::illegal_state("store is closed")
}

/// Feature store federating many child stores behind one id space.
///
/// Each ingested source file becomes a catalog entry owning one or more
/// feature sets. Every feature set lives in a child store file and is
/// addressed by a feature set id unique across the store; feature ids pack
/// that id with the child store's local feature id (see
/// [`tessera_core::FederatedId`]).
///
/// The store is `Send + Sync`: callers may invoke any operation from any
/// thread.
pub struct FederatedFeatureStore {
    directory: Utf8PathBuf,
    child_directory: Utf8PathBuf,
    state: StoreState,
    closed: AtomicBool,
    parsers: Arc<ContentParsers>,
    currencies: Arc<CurrencyRegistry>,
    factory: Arc<dyn ChildStoreFactory>,
    options: StoreOptions,
    listeners: Listeners,
}

impl fmt::Debug for FederatedFeatureStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederatedFeatureStore")
            .field("directory", &self.directory)
            .field("closed", &self.is_closed())
            .field("listeners", &self.listeners.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl FederatedFeatureStore {
    /// Open or create a store in `directory` backed by `SQLite` child stores.
    ///
    /// # Errors
    /// See [`FederatedFeatureStore::open_with_factory`].
    pub fn open(
        directory: &Utf8Path,
        parsers: Arc<ContentParsers>,
        options: StoreOptions,
    ) -> Result<Self> {
        Self::open_with_factory(
            directory,
            parsers,
            options,
            Arc::new(SqliteChildStoreFactory),
        )
    }

    /// Open or create a store in `directory`, creating and opening child
    /// stores through `factory`.
    ///
    /// Route entries persisted by an earlier session are loaded back into
    /// memory. Entries whose child file is missing or no longer holds their
    /// feature set are dropped and their catalog entry is invalidated, so the
    /// next [`FederatedFeatureStore::refresh`] removes the source.
    ///
    /// # Errors
    /// Returns [`FeatureStoreError::InvalidArgument`] when `directory` is a
    /// non-empty regular file, [`FeatureStoreError::Io`] when the directory
    /// layout cannot be created, and database errors from the route index.
    pub fn open_with_factory(
        directory: &Utf8Path,
        parsers: Arc<ContentParsers>,
        options: StoreOptions,
        factory: Arc<dyn ChildStoreFactory>,
    ) -> Result<Self> {
        prepare_directory(directory)?;

        let currencies = Arc::new(CurrencyRegistry::new());
        currencies.register(Arc::new(SourceCurrency::new(Arc::clone(&parsers))));

        let child_directory = directory.join(&options.child_directory);
        let mut catalog = Catalog::open(
            &directory.join(&options.index_file_name),
            RouteIndex::new(child_directory.clone()),
            Arc::clone(&currencies),
        )?;
        tessera_fs::ensure_dir(&child_directory)
            .map_err(|source| FeatureStoreError::io(child_directory.as_path(), source))?;

        for orphaned in RouteIndex::discard_unassigned(catalog.connection())? {
            warn!("removing child store {orphaned} left over from an interrupted ingestion");
            remove_child_file(&orphaned);
        }
        sweep_unreferenced_children(&catalog, &child_directory)?;
        replay_routes(&mut catalog, factory.as_ref())?;
        debug!(
            "opened feature store {directory} with {} routes",
            catalog.hooks().route_count()
        );

        Ok(Self {
            directory: directory.to_path_buf(),
            child_directory,
            state: StoreState {
                catalog: Mutex::new(Some(catalog)),
                pending_changed: Condvar::new(),
            },
            closed: AtomicBool::new(false),
            parsers,
            currencies,
            factory,
            options,
            listeners: Listeners::default(),
        })
    }

    /// Store directory.
    #[must_use]
    pub fn directory(&self) -> &Utf8Path {
        &self.directory
    }

    /// Options the store was opened with.
    #[must_use]
    pub const fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Parsers consulted by ingestion.
    #[must_use]
    pub const fn parsers(&self) -> &Arc<ContentParsers> {
        &self.parsers
    }

    /// Currencies consulted by [`FederatedFeatureStore::refresh`].
    ///
    /// The store registers a [`SourceCurrency`] when it opens; registering
    /// another currency under the same name replaces it.
    #[must_use]
    pub const fn currencies(&self) -> &Arc<CurrencyRegistry> {
        &self.currencies
    }

    /// Whether [`FederatedFeatureStore::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Subscribe to content-changed notifications.
    pub fn add_listener(&self, listener: Arc<dyn StoreListener>) {
        self.listeners.add(listener);
    }

    /// Unsubscribe `listener`. Returns whether it was subscribed.
    pub fn remove_listener(&self, listener: &Arc<dyn StoreListener>) -> bool {
        self.listeners.remove(listener)
    }

    /// Close the store.
    ///
    /// Route entries and their child store handles are released; child
    /// files stay on disk. Ingestions still running are rolled back: their
    /// catalog entries and reservations are deleted here, and each aborts at
    /// its next closed-store check, removing the child files it created.
    /// Every later call fails.
    ///
    /// # Errors
    /// Returns [`FeatureStoreError::IllegalState`] when the store was
    /// already closed.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(FeatureStoreError::illegal_state("store is already closed"));
        }
        let catalog = self.state.catalog.lock().take();
        if let Some(mut catalog) = catalog {
            abandon_pending(&mut catalog);
            catalog.hooks_mut().clear_routes();
        }
        self.state.pending_changed.notify_all();
        debug!("closed feature store {}", self.directory);
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(closed())
        } else {
            Ok(())
        }
    }

    /// Run `operation` on the catalog under the store lock.
    fn with_catalog<T>(
        &self,
        operation: impl FnOnce(&mut Catalog<RouteIndex>) -> Result<T>,
    ) -> Result<T> {
        let mut slot = self.state.catalog.lock();
        let catalog = slot.as_mut().ok_or_else(closed)?;
        operation(catalog)
    }

    fn find_route(&self, fsid: i64) -> Result<Option<RouteEntry>> {
        self.with_catalog(|catalog| Ok(catalog.hooks().route(fsid).cloned()))
    }

    fn route(&self, fsid: i64) -> Result<RouteEntry> {
        self.find_route(fsid)?.ok_or_else(|| {
            FeatureStoreError::invalid_argument(format!("unknown feature set {fsid}"))
        })
    }

    fn mark_dirty(&self, fsid: i64) -> Result<()> {
        self.with_catalog(|catalog| RouteIndex::mark_file_dirty(catalog.connection(), fsid))
    }

    /// Reserve a fresh, empty child store file named after `source`.
    fn allocate_child_file(&self, source: &Utf8Path) -> Result<Utf8PathBuf> {
        let stem = source.file_stem().unwrap_or("source");
        let path = tessera_fs::create_unique_file(&self.child_directory, stem, CHILD_FILE_SUFFIX)
            .map_err(|err| FeatureStoreError::io(self.child_directory.as_path(), err))?;
        debug!("allocated child store {path}");
        Ok(path)
    }

    fn notify(&self) {
        self.listeners.notify(self);
    }
}

fn prepare_directory(directory: &Utf8Path) -> Result<()> {
    let io = |source: std::io::Error| FeatureStoreError::io(directory, source);
    match tessera_fs::path_kind(directory).map_err(io)? {
        PathKind::File { len: 0 } => {
            tessera_fs::remove_file_if_exists(directory).map_err(io)?;
        }
        PathKind::File { .. } => {
            return Err(FeatureStoreError::invalid_argument(format!(
                "{directory} is a file, not a store directory"
            )));
        }
        PathKind::Directory | PathKind::Missing => {}
    }
    tessera_fs::ensure_dir(directory).map_err(io)
}

/// Roll back the ingestions in flight when the store closes.
fn abandon_pending(catalog: &mut Catalog<RouteIndex>) {
    for path in catalog.hooks_mut().take_pending() {
        warn!("abandoning in-flight ingestion of {path}");
        match catalog.delete_path(&path) {
            Ok(_) | Err(CatalogError::MissingEntry { .. }) => {}
            Err(err) => warn!("failed to delete catalog entry for {path}: {err}"),
        }
    }
    // The ingesting threads remove their own child files.
    if let Err(err) = RouteIndex::discard_unassigned(catalog.connection()) {
        warn!("failed to discard in-flight feature set reservations: {err}");
    }
}

/// Remove child store files no routing row refers to.
///
/// An update replaces its routing rows before its new child files are
/// committed, so a session ending in between leaves the old files behind.
fn sweep_unreferenced_children(
    catalog: &Catalog<RouteIndex>,
    child_directory: &Utf8Path,
) -> Result<()> {
    let referenced: BTreeSet<String> = RouteIndex::child_paths(catalog.connection())?
        .iter()
        .filter_map(|path| path.file_name().map(str::to_owned))
        .collect();
    let files = tessera_fs::files_with_suffix(child_directory, CHILD_FILE_SUFFIX)
        .map_err(|source| FeatureStoreError::io(child_directory, source))?;
    for file in files {
        if file.file_name().is_some_and(|name| referenced.contains(name)) {
            continue;
        }
        warn!("removing unreferenced child store {file}");
        remove_child_file(&file);
    }
    Ok(())
}

fn remove_child_file(path: &Utf8Path) {
    if let Err(err) = tessera_fs::remove_file_if_exists(path) {
        warn!("failed to remove child store {path}: {err}");
    }
}

/// Load the persisted routes, sharing one handle per child store file.
fn replay_routes(catalog: &mut Catalog<RouteIndex>, factory: &dyn ChildStoreFactory) -> Result<()> {
    let (connection, index) = catalog.parts_mut();
    let mut opened: HashMap<Utf8PathBuf, Arc<SharedDatabase>> = HashMap::new();
    let mut lost: BTreeSet<i64> = BTreeSet::new();
    for persisted in RouteIndex::persisted_routes(connection)? {
        match load_route(&persisted, factory, &mut opened) {
            Ok(entry) => index.insert_route(entry),
            Err(err) => {
                warn!(
                    "dropping feature set {} ({}) routed to {}: {err}",
                    persisted.fsid, persisted.name, persisted.child_path
                );
                lost.insert(persisted.catalog_id);
            }
        }
    }
    for catalog_id in lost {
        RouteIndex::invalidate_entry(connection, catalog_id)?;
    }
    Ok(())
}

fn load_route(
    persisted: &PersistedRoute,
    factory: &dyn ChildStoreFactory,
    opened: &mut HashMap<Utf8PathBuf, Arc<SharedDatabase>>,
) -> Result<RouteEntry> {
    let database = open_shared(&persisted.child_path, factory, opened)?;
    let feature_set = database
        .store()
        .feature_set(persisted.fsid)?
        .ok_or_else(|| {
            FeatureStoreError::invalid_argument(format!(
                "feature set {} is missing from its child store",
                persisted.fsid
            ))
        })?;
    Ok(RouteEntry {
        fsid: persisted.fsid,
        name: persisted.name.clone(),
        provider: persisted.provider.clone(),
        feature_type: persisted.feature_type.clone(),
        min_resolution: feature_set.min_resolution,
        max_resolution: feature_set.max_resolution,
        version: feature_set.version,
        catalog_id: persisted.catalog_id,
        database,
    })
}

fn open_shared(
    path: &Utf8Path,
    factory: &dyn ChildStoreFactory,
    opened: &mut HashMap<Utf8PathBuf, Arc<SharedDatabase>>,
) -> Result<Arc<SharedDatabase>> {
    if let Some(database) = opened.get(path) {
        return Ok(Arc::clone(database));
    }
    let exists =
        tessera_fs::file_is_file(path).map_err(|source| FeatureStoreError::io(path, source))?;
    if !exists {
        return Err(FeatureStoreError::invalid_argument(format!(
            "child store {path} is missing"
        )));
    }
    let database = Arc::new(SharedDatabase::new(path, factory.open(path)?));
    opened.insert(path.to_path_buf(), Arc::clone(&database));
    Ok(database)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::sync::Barrier;
    use tempfile::TempDir;
    use tessera_core::test_support::{VecContentParser, VecFeatureSet};
    use tessera_core::{ContentParser, FeatureDataStore, FeatureQuery, FeatureSetQuery};

    struct Harness {
        _dir: TempDir,
        root: Utf8PathBuf,
        parsers: Arc<ContentParsers>,
    }

    impl Harness {
        fn store_dir(&self) -> Utf8PathBuf {
            self.root.join("store")
        }

        fn source(&self, name: &str) -> Utf8PathBuf {
            let path = self.root.join(name);
            std::fs::write(&path, name).expect("write source");
            path
        }

        fn open(&self) -> FederatedFeatureStore {
            FederatedFeatureStore::open(
                &self.store_dir(),
                Arc::clone(&self.parsers),
                StoreOptions::default(),
            )
            .expect("open store")
        }

        fn child_files(&self) -> Vec<Utf8PathBuf> {
            tessera_fs::files_with_suffix(&self.store_dir().join("fdbs"), CHILD_FILE_SUFFIX)
                .expect("list child stores")
        }
    }

    fn harness_with(parser: VecContentParser) -> Harness {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
        let parsers = Arc::new(ContentParsers::with_parsers([
            Arc::new(parser) as Arc<dyn ContentParser>
        ]));
        Harness {
            _dir: dir,
            root,
            parsers,
        }
    }

    #[fixture]
    fn harness() -> Harness {
        harness_with(
            VecContentParser::new("roads", "roads.src")
                .with_feature_set(VecFeatureSet::points("roads", 4))
                .with_feature_set(VecFeatureSet::points("junctions", 2)),
        )
    }

    #[rstest]
    fn a_non_empty_file_is_not_a_store(harness: Harness) {
        std::fs::write(harness.store_dir(), "occupied").expect("write file");
        let err = FederatedFeatureStore::open(
            &harness.store_dir(),
            Arc::clone(&harness.parsers),
            StoreOptions::default(),
        )
        .expect_err("file rejected");
        assert!(matches!(err, FeatureStoreError::InvalidArgument { .. }));
    }

    #[rstest]
    fn an_empty_file_is_replaced_by_the_store(harness: Harness) {
        std::fs::write(harness.store_dir(), "").expect("write file");
        let store = harness.open();
        assert!(store.directory().join("index.sqlite").is_file());
        assert!(store.directory().join("fdbs").is_dir());
    }

    #[rstest]
    fn routes_survive_a_reopen(harness: Harness) {
        let source = harness.source("roads.src");
        let store = harness.open();
        store.add(&source, None).expect("add");
        let before = store
            .query_feature_sets(&FeatureSetQuery::default().sorted_by_name())
            .expect("sets");
        store.close().expect("close");

        let reopened = harness.open();
        let after = reopened
            .query_feature_sets(&FeatureSetQuery::default().sorted_by_name())
            .expect("sets");
        assert_eq!(before, after);
        assert_eq!(
            reopened
                .query_features_count(&FeatureQuery::default())
                .expect("count"),
            6
        );
    }

    #[rstest]
    fn a_lost_child_file_invalidates_its_source(harness: Harness) {
        let source = harness.source("roads.src");
        let store = harness.open();
        store.add(&source, None).expect("add");
        let fsid = store
            .query_feature_sets(&FeatureSetQuery::default())
            .expect("sets")
            .first()
            .map(|set| set.id)
            .expect("one set");
        let child = store.route(fsid).expect("route").database.path().to_path_buf();
        store.close().expect("close");
        std::fs::remove_file(&child).expect("remove child");

        let reopened = harness.open();
        assert_eq!(
            reopened
                .query_feature_sets_count(&FeatureSetQuery::default())
                .expect("count"),
            0
        );
        assert!(reopened.contains(&source).expect("contains"));
        reopened.refresh().expect("refresh");
        assert!(!reopened.contains(&source).expect("contains"));
    }

    #[rstest]
    fn a_closed_store_rejects_every_call(harness: Harness) {
        let source = harness.source("roads.src");
        let store = harness.open();
        store.close().expect("first close");
        assert!(matches!(
            store.close(),
            Err(FeatureStoreError::IllegalState { .. })
        ));
        assert!(matches!(
            store.add(&source, None),
            Err(FeatureStoreError::IllegalState { .. })
        ));
        assert!(matches!(
            store.query_features(&FeatureQuery::default()),
            Err(FeatureStoreError::IllegalState { .. })
        ));
        assert!(matches!(
            store.contains(&source),
            Err(FeatureStoreError::IllegalState { .. })
        ));
    }

    #[rstest]
    fn closing_mid_copy_rolls_the_ingestion_back() {
        let pause = Arc::new(Barrier::new(2));
        let harness = harness_with(
            VecContentParser::new("roads", "roads.src")
                .with_feature_set(VecFeatureSet::points("roads", 6))
                .pausing_after(3, Arc::clone(&pause)),
        );
        let source = harness.source("roads.src");
        let store = harness.open();

        std::thread::scope(|scope| {
            let ingestion = scope.spawn(|| store.add(&source, None));
            pause.wait();
            assert_eq!(harness.child_files().len(), 1);
            store.close().expect("close");
            pause.wait();
            let outcome = ingestion.join().expect("ingestion thread");
            assert!(matches!(outcome, Err(FeatureStoreError::IllegalState { .. })));
        });

        assert!(harness.child_files().is_empty());
        let reopened = harness.open();
        assert!(!reopened.contains(&source).expect("contains"));
        assert!(reopened.query_files(false).expect("files").is_empty());
        assert_eq!(
            reopened
                .query_feature_sets_count(&FeatureSetQuery::default())
                .expect("count"),
            0
        );
    }

    #[rstest]
    fn refresh_drops_sources_changed_on_disk(harness: Harness) {
        let source = harness.source("roads.src");
        let store = harness.open();
        store.add(&source, None).expect("add");
        assert_eq!(store.refresh().expect("refresh unchanged"), 0);
        assert!(store.contains(&source).expect("contains"));

        std::fs::write(&source, "roads.src with more bytes").expect("rewrite source");
        assert_eq!(store.refresh().expect("refresh changed"), 1);
        assert!(!store.contains(&source).expect("contains"));
        assert_eq!(
            store
                .query_features_count(&FeatureQuery::default())
                .expect("count"),
            0
        );
        assert!(harness.child_files().is_empty());

        assert_eq!(store.add(&source, None).expect("re-add"), AddOutcome::Ingested);
        assert_eq!(
            store
                .query_features_count(&FeatureQuery::default())
                .expect("count"),
            6
        );
    }

    #[rstest]
    fn open_removes_child_files_nothing_routes_to(harness: Harness) {
        let source = harness.source("roads.src");
        let store = harness.open();
        store.add(&source, None).expect("add");
        let routed = harness.child_files();
        store.close().expect("close");

        let fdbs = harness.store_dir().join("fdbs");
        let stray = fdbs.join("roads-stray.sqlite");
        std::fs::write(&stray, "").expect("write stray child");
        let reserved = fdbs.join("roads-reserved.sqlite");
        std::fs::write(&reserved, "").expect("write reserved child");
        {
            let catalog = Catalog::open(
                &harness.store_dir().join("index.sqlite"),
                RouteIndex::new(fdbs),
                Arc::new(CurrencyRegistry::new()),
            )
            .expect("open index");
            RouteIndex::reserve_feature_set(
                catalog.connection(),
                "lost",
                &reserved,
                "roads",
                "vec",
            )
            .expect("reserve");
        }

        let reopened = harness.open();
        assert_eq!(harness.child_files(), routed);
        assert_eq!(
            reopened
                .query_features_count(&FeatureQuery::default())
                .expect("count"),
            6
        );
    }
}
