//! [`FeatureDataStore`] over the federated id space.

use std::collections::{BTreeMap, BTreeSet};

use tessera_core::{
    Feature, FeatureCursor, FeatureDataStore, FeatureDefinition, FeatureQuery, FeatureSet,
    FeatureSetDefinition, FeatureSetQuery, FeatureSetUpdate, FeatureStoreError, FeatureUpdate,
    FederatedId, Result, paged_count,
};

use super::FederatedFeatureStore;
use super::query::page;
use crate::{RouteEntry, RouteIndex};

impl FederatedFeatureStore {
    /// Route and local id of feature `fid`, checking the child store files
    /// the feature under the set its id names.
    fn owned_feature(&self, fid: i64) -> Result<(RouteEntry, i64)> {
        let id = FederatedId::from_raw(fid);
        let route = self.route(id.feature_set_id())?;
        let owner = route
            .database
            .store()
            .feature(id.local_id())?
            .map(|feature| feature.feature_set_id);
        if owner != Some(route.fsid) {
            return Err(FeatureStoreError::invalid_argument(format!(
                "unknown feature {fid}"
            )));
        }
        Ok((route, id.local_id()))
    }
}

fn federated_id(fsid: i64, local_id: i64) -> Result<i64> {
    FederatedId::encode(fsid, local_id)
        .map(FederatedId::raw)
        .map_err(|source| FeatureStoreError::Encoding {
            what: "federated feature id",
            source: Box::new(source),
        })
}

impl FeatureDataStore for FederatedFeatureStore {
    fn query_features(&self, query: &FeatureQuery) -> Result<FeatureCursor> {
        let plan = self.plan(query)?;
        Self::run_plan(plan, query)
    }

    fn query_features_count(&self, query: &FeatureQuery) -> Result<usize> {
        self.federated_count(query)
    }

    fn query_feature_sets(&self, query: &FeatureSetQuery) -> Result<Vec<FeatureSet>> {
        let routes = self.matching_routes(query)?;
        Ok(page(routes, query.limit, query.offset)
            .iter()
            .map(RouteEntry::feature_set)
            .collect())
    }

    fn query_feature_sets_count(&self, query: &FeatureSetQuery) -> Result<usize> {
        let total = self.matching_routes(query)?.len();
        Ok(paged_count(total, query.limit, query.offset))
    }

    fn feature(&self, fid: i64) -> Result<Option<Feature>> {
        let id = FederatedId::from_raw(fid);
        let Some(route) = self.find_route(id.feature_set_id())? else {
            return Ok(None);
        };
        let found = route.database.store().feature(id.local_id())?;
        Ok(found
            .filter(|feature| feature.feature_set_id == route.fsid)
            .map(|feature| Feature { id: fid, ..feature }))
    }

    fn feature_set(&self, fsid: i64) -> Result<Option<FeatureSet>> {
        Ok(self.find_route(fsid)?.map(|route| route.feature_set()))
    }

    fn insert_feature_set(&self, _definition: &FeatureSetDefinition) -> Result<FeatureSet> {
        Err(FeatureStoreError::Unsupported {
            operation: "inserting a feature set without a source file",
        })
    }

    fn update_feature_set(&self, fsid: i64, update: &FeatureSetUpdate) -> Result<()> {
        let route = self.route(fsid)?;
        route.database.store().update_feature_set(fsid, update)?;
        let stored_version = route
            .database
            .store()
            .feature_set(fsid)?
            .map(|set| set.version);
        self.with_catalog(|catalog| {
            if let Some(name) = &update.name {
                RouteIndex::rename_feature_set(catalog.connection(), fsid, name)?;
            }
            RouteIndex::mark_file_dirty(catalog.connection(), fsid)?;
            if let Some(entry) = catalog.hooks_mut().route_mut(fsid) {
                if let Some(name) = &update.name {
                    entry.name.clone_from(name);
                }
                if let Some((min_resolution, max_resolution)) = update.resolution {
                    entry.min_resolution = min_resolution;
                    entry.max_resolution = max_resolution;
                }
                entry.version = stored_version.unwrap_or_else(|| entry.version.saturating_add(1));
            }
            Ok(())
        })?;
        self.notify();
        Ok(())
    }

    fn delete_feature_set(&self, fsid: i64) -> Result<()> {
        let route = self.route(fsid)?;
        route.database.store().delete_feature_set(fsid)?;
        self.with_catalog(|catalog| {
            RouteIndex::mark_file_dirty(catalog.connection(), fsid)?;
            catalog.hooks_mut().remove_route(fsid);
            RouteIndex::delete_feature_set_rows(catalog.connection(), &[fsid])
        })?;
        drop(route);
        self.notify();
        Ok(())
    }

    fn insert_feature(
        &self,
        fsid: i64,
        definition: &FeatureDefinition,
        visible: bool,
    ) -> Result<Feature> {
        let route = self.route(fsid)?;
        let inserted = route
            .database
            .store()
            .insert_feature(fsid, definition, visible)?;
        let feature = Feature {
            id: federated_id(fsid, inserted.id)?,
            ..inserted
        };
        self.mark_dirty(fsid)?;
        self.notify();
        Ok(feature)
    }

    fn update_feature(&self, fid: i64, update: &FeatureUpdate) -> Result<()> {
        let (route, local_id) = self.owned_feature(fid)?;
        route.database.store().update_feature(local_id, update)?;
        self.mark_dirty(route.fsid)?;
        self.notify();
        Ok(())
    }

    fn delete_feature(&self, fid: i64) -> Result<()> {
        let (route, local_id) = self.owned_feature(fid)?;
        route.database.store().delete_feature(local_id)?;
        self.mark_dirty(route.fsid)?;
        self.notify();
        Ok(())
    }

    fn is_feature_visible(&self, fid: i64) -> Result<bool> {
        let (route, local_id) = self.owned_feature(fid)?;
        route.database.store().is_feature_visible(local_id)
    }

    fn set_feature_visible(&self, fid: i64, visible: bool) -> Result<()> {
        let (route, local_id) = self.owned_feature(fid)?;
        route.database.store().set_feature_visible(local_id, visible)?;
        self.notify();
        Ok(())
    }

    fn set_features_visible(&self, query: &FeatureQuery, visible: bool) -> Result<()> {
        let plan = self.plan(query)?;
        if plan.merged_paging || plan.needs_exact_ids() {
            // Only the merged cursor knows which features the query selects.
            let mut selected: BTreeMap<i64, BTreeSet<i64>> = BTreeMap::new();
            for feature in Self::run_plan(plan, query)? {
                let (fsid, local_id) = FederatedId::from_raw(feature.id).decode();
                selected.entry(fsid).or_default().insert(local_id);
            }
            for (fsid, local_ids) in selected {
                let Some(route) = self.find_route(fsid)? else {
                    continue;
                };
                let scoped = FeatureQuery {
                    feature_set_ids: BTreeSet::from([fsid]),
                    feature_ids: local_ids,
                    ..FeatureQuery::default()
                };
                route.database.store().set_features_visible(&scoped, visible)?;
            }
        } else {
            for store in &plan.stores {
                store.database.store().set_features_visible(&store.query, visible)?;
            }
        }
        self.notify();
        Ok(())
    }

    fn is_feature_set_visible(&self, fsid: i64) -> Result<bool> {
        self.route(fsid)?.database.store().is_feature_set_visible(fsid)
    }

    fn set_feature_set_visible(&self, fsid: i64, visible: bool) -> Result<()> {
        self.route(fsid)?
            .database
            .store()
            .set_feature_set_visible(fsid, visible)?;
        self.notify();
        Ok(())
    }

    fn set_feature_sets_visible(&self, query: &FeatureSetQuery, visible: bool) -> Result<()> {
        let routes = self.matching_routes(query)?;
        for route in page(routes, query.limit, query.offset) {
            route
                .database
                .store()
                .set_feature_set_visible(route.fsid, visible)?;
        }
        self.notify();
        Ok(())
    }

    fn is_feature_set_read_only(&self, fsid: i64) -> Result<bool> {
        self.route(fsid)?.database.store().is_feature_set_read_only(fsid)
    }

    fn set_feature_set_read_only(&self, fsid: i64, read_only: bool) -> Result<()> {
        self.route(fsid)?
            .database
            .store()
            .set_feature_set_read_only(fsid, read_only)?;
        self.notify();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use camino::Utf8PathBuf;
    use geo::{Geometry, Point};
    use rstest::{fixture, rstest};
    use tempfile::TempDir;
    use tessera_core::test_support::{VecContentParser, VecFeatureSet};
    use tessera_core::{ContentParser, ContentParsers};

    use crate::StoreOptions;

    struct Loaded {
        _dir: TempDir,
        source: Utf8PathBuf,
        store: FederatedFeatureStore,
    }

    impl Loaded {
        fn set_id(&self, name: &str) -> i64 {
            self.store
                .query_feature_sets(&FeatureSetQuery::default().with_name(name))
                .expect("sets")
                .first()
                .map(|set| set.id)
                .expect("named set")
        }

        fn first_feature(&self, fsid: i64) -> Feature {
            self.store
                .query_features(&FeatureQuery::default().with_feature_set_id(fsid))
                .expect("features")
                .next()
                .expect("a feature")
        }
    }

    #[fixture]
    fn loaded() -> Loaded {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
        let source = root.join("city.src");
        std::fs::write(&source, "city").expect("write source");
        let parser = VecContentParser::new("city", "city.src")
            .with_feature_set(VecFeatureSet::points("roads", 3))
            .with_feature_set(VecFeatureSet::points("parks", 2).hidden());
        let parsers = Arc::new(ContentParsers::with_parsers([
            Arc::new(parser) as Arc<dyn ContentParser>
        ]));
        let store =
            FederatedFeatureStore::open(&root.join("store"), parsers, StoreOptions::default())
                .expect("open store");
        store.add(&source, None).expect("add");
        Loaded {
            _dir: dir,
            source,
            store,
        }
    }

    #[rstest]
    fn feature_ids_carry_their_feature_set(loaded: Loaded) {
        let roads = loaded.set_id("roads");
        let feature = loaded.first_feature(roads);
        assert_eq!(FederatedId::from_raw(feature.id).feature_set_id(), roads);
        assert_eq!(loaded.store.feature(feature.id).expect("lookup"), Some(feature));
    }

    #[rstest]
    fn a_foreign_feature_id_is_rejected(loaded: Loaded) {
        let roads = loaded.set_id("roads");
        let parks = loaded.set_id("parks");
        let feature = loaded.first_feature(roads);
        let local = FederatedId::from_raw(feature.id).local_id();
        let forged = FederatedId::encode(parks, local).expect("encode").raw();
        assert_eq!(loaded.store.feature(forged).expect("lookup"), None);
        assert!(matches!(
            loaded.store.delete_feature(forged),
            Err(FeatureStoreError::InvalidArgument { .. })
        ));
    }

    #[rstest]
    fn feature_edits_mark_the_source_modified(loaded: Loaded) {
        assert!(!loaded.store.is_modified(&loaded.source).expect("modified"));
        let roads = loaded.set_id("roads");
        let inserted = loaded
            .store
            .insert_feature(
                roads,
                &FeatureDefinition::new("extra", Geometry::Point(Point::new(9.0, 9.0))),
                true,
            )
            .expect("insert");
        assert_eq!(FederatedId::from_raw(inserted.id).feature_set_id(), roads);
        assert!(loaded.store.is_modified(&loaded.source).expect("modified"));
        assert_eq!(
            loaded.store.query_files(true).expect("files"),
            vec![loaded.source.clone()]
        );
    }

    #[rstest]
    fn renaming_bumps_the_route_version(loaded: Loaded) {
        let roads = loaded.set_id("roads");
        let before = loaded.store.feature_set(roads).expect("set").expect("present");
        loaded
            .store
            .update_feature_set(
                roads,
                &FeatureSetUpdate {
                    name: Some(String::from("streets")),
                    resolution: None,
                },
            )
            .expect("rename");
        let after = loaded.store.feature_set(roads).expect("set").expect("present");
        assert_eq!(after.name, "streets");
        assert!(after.version > before.version);
        assert_eq!(loaded.set_id("streets"), roads);
    }

    #[rstest]
    fn hidden_sets_drop_out_of_visible_queries(loaded: Loaded) {
        let visible = FeatureSetQuery::default().visible_only();
        assert_eq!(loaded.store.query_feature_sets_count(&visible).expect("count"), 1);
        loaded
            .store
            .set_feature_sets_visible(&FeatureSetQuery::default(), true)
            .expect("show all");
        assert_eq!(loaded.store.query_feature_sets_count(&visible).expect("count"), 2);
    }

    #[rstest]
    fn feature_sets_sort_by_name_then_id(loaded: Loaded) {
        let names: Vec<String> = loaded
            .store
            .query_feature_sets(&FeatureSetQuery::default().sorted_by_name())
            .expect("sets")
            .into_iter()
            .map(|set| set.name)
            .collect();
        assert_eq!(names, vec![String::from("parks"), String::from("roads")]);
    }

    #[rstest]
    fn read_only_sets_reject_feature_edits(loaded: Loaded) {
        let roads = loaded.set_id("roads");
        let feature = loaded.first_feature(roads);
        loaded
            .store
            .set_feature_set_read_only(roads, true)
            .expect("lock");
        assert!(loaded.store.is_feature_set_read_only(roads).expect("flag"));
        assert!(matches!(
            loaded.store.delete_feature(feature.id),
            Err(FeatureStoreError::IllegalState { .. })
        ));
    }

    #[rstest]
    fn direct_feature_set_insertion_is_unsupported(loaded: Loaded) {
        let definition = FeatureSetDefinition::new("loose", "city", "vec");
        assert!(matches!(
            loaded.store.insert_feature_set(&definition),
            Err(FeatureStoreError::Unsupported { .. })
        ));
    }

    #[rstest]
    fn sets_created_for_a_file_share_its_child_store(loaded: Loaded) {
        let created = loaded
            .store
            .insert_feature_set_for_file(&loaded.source, "trails", 0.0, 0.0)
            .expect("insert set");
        assert_eq!(created.version, 0);
        assert_eq!(loaded.store.get_file(created.id).expect("file"), loaded.source);
        let roads = loaded.set_id("roads");
        let shared = loaded.store.route(roads).expect("route").database;
        let joined = loaded.store.route(created.id).expect("route").database;
        assert!(Arc::ptr_eq(&shared, &joined));
        assert!(loaded.store.is_modified(&loaded.source).expect("modified"));
    }
}
