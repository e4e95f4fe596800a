#![expect(
    clippy::expect_used,
    reason = "behaviour tests use expect for readable failures"
)]

//! Behavioural coverage for ingestion, refresh and federated queries.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;
use tessera_core::test_support::{AlwaysStaleCurrency, VecContentParser, VecFeatureSet};
use tessera_core::{
    ContentParser, ContentParsers, FeatureCursor, FeatureDataStore, FeatureQuery, FeatureSet,
    FeatureSetQuery,
};
use tessera_store::{
    AddOutcome, CURRENCY_NAME, FederatedFeatureStore, StoreListener, StoreOptions,
};

/// Listener counting notifications.
#[derive(Default)]
struct CountingListener {
    calls: AtomicUsize,
}

impl StoreListener for CountingListener {
    fn content_changed(&self, _store: &FederatedFeatureStore) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scenario state.
struct StoreWorld {
    _dir: TempDir,
    root: Utf8PathBuf,
    city: Arc<VecContentParser>,
    slow: Arc<VecContentParser>,
    parsers: Arc<ContentParsers>,
    store: RefCell<Option<FederatedFeatureStore>>,
    next_sets: RefCell<Vec<VecFeatureSet>>,
    known: RefCell<BTreeMap<String, FeatureSet>>,
    cursor: RefCell<Option<FeatureCursor>>,
    outcomes: RefCell<Vec<AddOutcome>>,
    listener: RefCell<Option<Arc<CountingListener>>>,
}

impl StoreWorld {
    fn source(&self) -> Utf8PathBuf {
        self.root.join("city.src")
    }

    fn slow_source(&self) -> Utf8PathBuf {
        self.root.join("slow.src")
    }

    fn child_files(&self) -> usize {
        let directory = self.root.join("store").join("fdbs");
        std::fs::read_dir(&directory)
            .expect("list child stores")
            .filter_map(std::result::Result::ok)
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .is_some_and(|extension| extension == "sqlite")
            })
            .count()
    }

    fn open(&self, options: StoreOptions) {
        let store = FederatedFeatureStore::open(
            &self.root.join("store"),
            Arc::clone(&self.parsers),
            options,
        )
        .expect("open store");
        self.store.replace(Some(store));
    }

    fn with_store<T>(&self, f: impl FnOnce(&FederatedFeatureStore) -> T) -> T {
        let slot = self.store.borrow();
        let store = slot.as_ref().expect("store should be open");
        f(store)
    }

    fn feature_sets(&self) -> Vec<FeatureSet> {
        self.with_store(|store| {
            store
                .query_feature_sets(&FeatureSetQuery::default())
                .expect("query feature sets")
        })
    }

    fn stage_next_sets(&self) {
        let staged = self.next_sets.take();
        self.city.replace_feature_sets(staged);
    }
}

#[fixture]
fn world() -> StoreWorld {
    let dir = TempDir::new().expect("create temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
    for name in ["city.src", "slow.src"] {
        std::fs::write(root.join(name), name).expect("write source");
    }
    let city = Arc::new(VecContentParser::new("city", "city.src"));
    let slow = Arc::new(
        VecContentParser::new("slow", "slow.src")
            .with_feature_set(VecFeatureSet::points("tracks", 2))
            .with_delay(Duration::from_millis(25)),
    );
    let parsers = Arc::new(ContentParsers::with_parsers([
        Arc::clone(&city) as Arc<dyn ContentParser>,
        Arc::clone(&slow) as Arc<dyn ContentParser>,
    ]));
    StoreWorld {
        _dir: dir,
        root,
        city,
        slow,
        parsers,
        store: RefCell::new(None),
        next_sets: RefCell::new(Vec::new()),
        known: RefCell::new(BTreeMap::new()),
        cursor: RefCell::new(None),
        outcomes: RefCell::new(Vec::new()),
        listener: RefCell::new(None),
    }
}

#[given("an empty store")]
fn empty_store(world: &StoreWorld) {
    world.open(StoreOptions::default());
}

#[given("a store splitting child files after {limit:usize} feature sets")]
fn splitting_store(world: &StoreWorld, limit: usize) {
    world.open(StoreOptions::default().with_feature_set_limit(limit));
}

#[given("a counting listener")]
fn counting_listener(world: &StoreWorld) {
    let listener = Arc::new(CountingListener::default());
    world.with_store(|store| store.add_listener(Arc::clone(&listener) as Arc<dyn StoreListener>));
    world.listener.replace(Some(listener));
}

#[given("the source yields {name:word} with {count:u32} features")]
fn source_yields(world: &StoreWorld, name: String, count: u32) {
    world
        .next_sets
        .borrow_mut()
        .push(VecFeatureSet::points(name.trim_matches('"'), count));
}

#[when("the source yields {name:word} with {count:u32} features")]
fn source_now_yields(world: &StoreWorld, name: String, count: u32) {
    source_yields(world, name, count);
}

#[given("a broken source yielding {name:word} with {count:u32} features failing after {after:usize}")]
fn broken_source(world: &StoreWorld, name: String, count: u32, after: usize) {
    world
        .next_sets
        .borrow_mut()
        .push(VecFeatureSet::points(name.trim_matches('"'), count).failing_after(after));
}

#[when("the source is added")]
fn add_source(world: &StoreWorld) {
    world.stage_next_sets();
    let outcome = world.with_store(|store| store.add(&world.source(), None).expect("add source"));
    assert_eq!(outcome, AddOutcome::Ingested);
    let known = world
        .feature_sets()
        .into_iter()
        .map(|set| (set.name.clone(), set))
        .collect();
    world.known.replace(known);
}

#[when("ingesting the source fails")]
fn add_source_fails(world: &StoreWorld) {
    world.stage_next_sets();
    world.with_store(|store| {
        store
            .add(&world.source(), None)
            .expect_err("ingestion should fail");
    });
}

#[when("the source is updated")]
fn update_source(world: &StoreWorld) {
    world.stage_next_sets();
    world.with_store(|store| store.update(&world.source()).expect("update source"));
}

#[when("the source is removed")]
fn remove_source(world: &StoreWorld) {
    world.with_store(|store| store.remove(&world.source()).expect("remove source"));
}

#[when("every catalogued source is reported stale")]
fn sources_stale(world: &StoreWorld) {
    world.with_store(|store| {
        store
            .currencies()
            .register(Arc::new(AlwaysStaleCurrency::named(CURRENCY_NAME)));
    });
}

#[when("the store is refreshed")]
fn refresh(world: &StoreWorld) {
    let removed = world.with_store(|store| store.refresh().expect("refresh"));
    assert_eq!(removed, 1);
}

#[when("the feature set {name:word} is deleted")]
fn delete_set(world: &StoreWorld, name: String) {
    let name = name.trim_matches('"').to_owned();
    let fsid = world
        .feature_sets()
        .into_iter()
        .find(|set| set.name == name)
        .map(|set| set.id)
        .expect("feature set should exist");
    world.with_store(|store| store.delete_feature_set(fsid).expect("delete feature set"));
}

#[when("{callers:usize} callers add the slow source at once")]
fn concurrent_adds(world: &StoreWorld, callers: usize) {
    let source = world.slow_source();
    let outcomes = world.with_store(|store| {
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..callers)
                .map(|_| scope.spawn(|| store.add(&source, None)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .expect("caller thread")
                        .expect("concurrent add")
                })
                .collect::<Vec<_>>()
        })
    });
    world.outcomes.replace(outcomes);
}

#[when("a feature cursor is opened")]
fn open_cursor(world: &StoreWorld) {
    let cursor = world.with_store(|store| {
        store
            .query_features(&FeatureQuery::default())
            .expect("query features")
    });
    world.cursor.replace(Some(cursor));
}

#[when("the cursor is dropped")]
fn drop_cursor(world: &StoreWorld) {
    let cursor = world.cursor.take().expect("a cursor should be open");
    drop(cursor);
}

#[then("the store holds {count:usize} feature sets")]
fn feature_set_count(world: &StoreWorld, count: usize) {
    let stored = world.with_store(|store| {
        store
            .query_feature_sets_count(&FeatureSetQuery::default())
            .expect("count feature sets")
    });
    assert_eq!(stored, count);
}

#[then("the store holds {count:usize} features")]
fn feature_count(world: &StoreWorld, count: usize) {
    let stored = world.with_store(|store| {
        store
            .query_features_count(&FeatureQuery::default())
            .expect("count features")
    });
    assert_eq!(stored, count);
}

#[then("the feature set {name:word} keeps its id with a newer version")]
fn set_kept(world: &StoreWorld, name: String) {
    let name = name.trim_matches('"').to_owned();
    let before = world
        .known
        .borrow()
        .get(&name)
        .cloned()
        .expect("feature set known before the update");
    let after = world
        .feature_sets()
        .into_iter()
        .find(|set| set.name == name)
        .expect("feature set still present");
    assert_eq!(after.id, before.id);
    assert!(
        after.version > before.version,
        "version {} should exceed {}",
        after.version,
        before.version
    );
}

#[then("the feature set {name:word} is gone")]
fn set_gone(world: &StoreWorld, name: String) {
    let name = name.trim_matches('"').to_owned();
    let fsid = world
        .known
        .borrow()
        .get(&name)
        .map(|set| set.id)
        .expect("feature set known before the update");
    let found = world.with_store(|store| store.feature_set(fsid).expect("look up feature set"));
    assert!(found.is_none(), "{name} should have been retired");
}

#[then("the source is no longer catalogued")]
fn source_absent(world: &StoreWorld) {
    let present = world.with_store(|store| store.contains(&world.source()).expect("contains"));
    assert!(!present, "the source should not be catalogued");
}

#[then("the slow source was parsed once")]
fn parsed_once(world: &StoreWorld) {
    assert_eq!(world.slow.parse_count(), 1);
}

#[then("exactly one caller ingested the slow source")]
fn one_ingested(world: &StoreWorld) {
    let outcomes = world.outcomes.borrow();
    let ingested = outcomes
        .iter()
        .filter(|outcome| **outcome == AddOutcome::Ingested)
        .count();
    assert_eq!(ingested, 1);
    assert!(
        outcomes
            .iter()
            .all(|outcome| matches!(outcome, AddOutcome::Ingested | AddOutcome::AlreadyPresent))
    );
}

#[then("{count:usize} child store files remain")]
fn child_files_remain(world: &StoreWorld, count: usize) {
    assert_eq!(world.child_files(), count);
}

#[then("features paged with limit {limit:usize} and offset {offset:usize} match the unpaged slice")]
fn paging_matches(world: &StoreWorld, limit: usize, offset: usize) {
    let (unpaged, paged, counted) = world.with_store(|store| {
        let unpaged: Vec<i64> = store
            .query_features(&FeatureQuery::default())
            .expect("unpaged query")
            .map(|feature| feature.id)
            .collect();
        let query = FeatureQuery::default().paged(limit, offset);
        let paged: Vec<i64> = store
            .query_features(&query)
            .expect("paged query")
            .map(|feature| feature.id)
            .collect();
        let counted = store.query_features_count(&query).expect("paged count");
        (unpaged, paged, counted)
    });
    let expected: Vec<i64> = unpaged.into_iter().skip(offset).take(limit).collect();
    assert_eq!(paged, expected);
    assert_eq!(counted, expected.len());
}

#[then("the listener was notified {count:usize} times")]
fn listener_notified(world: &StoreWorld, count: usize) {
    let listener = world.listener.borrow();
    let listener = listener.as_ref().expect("a listener should be registered");
    assert_eq!(listener.calls.load(Ordering::SeqCst), count);
}

#[scenario(path = "tests/features/federated_store.feature", index = 0)]
fn ingest_and_query(world: StoreWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/federated_store.feature", index = 1)]
fn update_keeps_identity(world: StoreWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/federated_store.feature", index = 2)]
fn refresh_sweeps_stale_sources(world: StoreWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/federated_store.feature", index = 3)]
fn concurrent_adds_parse_once(world: StoreWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/federated_store.feature", index = 4)]
fn paging_across_child_stores(world: StoreWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/federated_store.feature", index = 5)]
fn cursors_keep_child_stores_alive(world: StoreWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/federated_store.feature", index = 6)]
fn failed_ingestion_rolls_back(world: StoreWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/federated_store.feature", index = 7)]
fn listeners_are_notified(world: StoreWorld) {
    let _ = world;
}
