//! Per-source lookups, feature set creation and the federated query
//! plumbing shared by the [`tessera_core::FeatureDataStore`] impl.

use std::collections::BTreeSet;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use log::warn;
use tessera_catalog::Catalog;
use tessera_core::{
    FeatureCursor, FeatureDataStore, FeatureQuery, FeatureSet, FeatureSetDefinition,
    FeatureSetQuery, FeatureStoreError, Result, paged_count,
};

use super::{FederatedFeatureStore, closed};
use crate::cursor::{FederatedCursor, merge};
use crate::plan::{FeaturePlan, StorePlan, plan_features};
use crate::{RouteEntry, RouteIndex, SharedDatabase, SourceRecord, catalog_path};

impl FederatedFeatureStore {
    /// Whether `path` is catalogued.
    ///
    /// # Errors
    /// Fails when the store is closed or the route index cannot be read.
    pub fn contains(&self, path: &Utf8Path) -> Result<bool> {
        let source = catalog_path(path);
        self.with_catalog(|catalog| catalog.contains(&source).map_err(FeatureStoreError::from))
    }

    /// Whether any feature set of `path` was modified since it was last
    /// ingested.
    ///
    /// # Errors
    /// Fails when the store is closed or the route index cannot be read.
    pub fn is_modified(&self, path: &Utf8Path) -> Result<bool> {
        let source = catalog_path(path);
        self.with_catalog(|catalog| RouteIndex::is_modified(catalog.connection(), &source))
    }

    /// Catalogued source paths, optionally only the modified ones.
    ///
    /// # Errors
    /// Fails when the store is closed or the route index cannot be read.
    pub fn query_files(&self, modified_only: bool) -> Result<Vec<Utf8PathBuf>> {
        self.with_catalog(|catalog| RouteIndex::source_paths(catalog.connection(), modified_only))
    }

    /// Source path that produced feature set `fsid`.
    ///
    /// # Errors
    /// Returns [`FeatureStoreError::InvalidArgument`] for an unknown id.
    pub fn get_file(&self, fsid: i64) -> Result<Utf8PathBuf> {
        self.with_catalog(|catalog| RouteIndex::file_for_feature_set(catalog.connection(), fsid))?
            .ok_or_else(|| FeatureStoreError::invalid_argument(format!("unknown feature set {fsid}")))
    }

    /// Re-ingest the source that produced feature set `fsid`.
    ///
    /// # Errors
    /// As for [`FederatedFeatureStore::get_file`] and
    /// [`FederatedFeatureStore::update`].
    pub fn update_feature_set_source(&self, fsid: i64) -> Result<()> {
        let path = self.get_file(fsid)?;
        self.update(&path)
    }

    /// Features of `path` matching `query`.
    ///
    /// # Errors
    /// Fails when the store is closed or a child store query fails.
    pub fn query_features_for_file(
        &self,
        path: &Utf8Path,
        query: &FeatureQuery,
    ) -> Result<FeatureCursor> {
        let Some(fsids) = self.scope_to_file(path, &query.feature_set_ids)? else {
            return Ok(Box::new(std::iter::empty()));
        };
        self.query_features(&FeatureQuery {
            feature_set_ids: fsids,
            ..query.clone()
        })
    }

    /// Feature sets of `path` matching `query`.
    ///
    /// # Errors
    /// Fails when the store is closed or a child store query fails.
    pub fn query_feature_sets_for_file(
        &self,
        path: &Utf8Path,
        query: &FeatureSetQuery,
    ) -> Result<Vec<FeatureSet>> {
        let Some(ids) = self.scope_to_file(path, &query.ids)? else {
            return Ok(Vec::new());
        };
        self.query_feature_sets(&FeatureSetQuery {
            ids,
            ..query.clone()
        })
    }

    /// Create an empty, visible feature set owned by the catalogued `path`.
    ///
    /// The set joins a child store of the same source that still has room,
    /// or a new one. It starts at version 0 and marks the source modified.
    ///
    /// # Errors
    /// Returns [`FeatureStoreError::InvalidArgument`] when `path` is not
    /// catalogued. A failed child insertion reverts the routing row.
    pub fn insert_feature_set_for_file(
        &self,
        path: &Utf8Path,
        name: &str,
        min_resolution: f64,
        max_resolution: f64,
    ) -> Result<FeatureSet> {
        let source = catalog_path(path);
        let mut slot = self.state.catalog.lock();
        let catalog = slot.as_mut().ok_or_else(closed)?;
        let record = RouteIndex::source_for_path(catalog.connection(), &source)?
            .ok_or_else(|| FeatureStoreError::invalid_argument(format!("{source} is not catalogued")))?;

        let reusable = catalog
            .hooks()
            .routes()
            .filter(|route| route.catalog_id == record.catalog_id)
            .map(|route| Arc::clone(&route.database))
            .find(|database| self.has_room(database));
        let (database, fresh) = match reusable {
            Some(database) => (database, false),
            None => (self.create_shared(&source)?, true),
        };

        let inserted = insert_routed_set(
            catalog,
            &record,
            &database,
            name,
            (min_resolution, max_resolution),
        );
        if inserted.is_err() && fresh {
            database.mark_for_delete();
        }
        let feature_set = inserted?;
        drop(slot);
        self.notify();
        Ok(feature_set)
    }

    fn has_room(&self, database: &SharedDatabase) -> bool {
        database
            .store()
            .feature_set_count()
            .is_ok_and(|count| !self.options.at_limit(count))
    }

    fn create_shared(&self, source: &Utf8Path) -> Result<Arc<SharedDatabase>> {
        let path = self.allocate_child_file(source)?;
        match self.factory.create(&path) {
            Ok(store) => Ok(Arc::new(SharedDatabase::new(path, store))),
            Err(err) => {
                if let Err(cleanup) = tessera_fs::remove_file_if_exists(&path) {
                    warn!("failed to remove unused child store {path}: {cleanup}");
                }
                Err(err)
            }
        }
    }

    /// Feature set ids of `path` within `requested`, or `None` when nothing
    /// of the source can match.
    fn scope_to_file(
        &self,
        path: &Utf8Path,
        requested: &BTreeSet<i64>,
    ) -> Result<Option<BTreeSet<i64>>> {
        let source = catalog_path(path);
        let owned: BTreeSet<i64> = self
            .with_catalog(|catalog| {
                RouteIndex::feature_set_ids_for_path(catalog.connection(), &source)
            })?
            .into_iter()
            .filter(|fsid| requested.is_empty() || requested.contains(fsid))
            .collect();
        Ok((!owned.is_empty()).then_some(owned))
    }

    pub(super) fn plan(&self, query: &FeatureQuery) -> Result<FeaturePlan> {
        self.with_catalog(|catalog| Ok(plan_features(catalog.hooks().routes(), query)))
    }

    /// Run a planned query, presenting the per-store results as one
    /// cursor ordered by federated id.
    pub(super) fn run_plan(plan: FeaturePlan, query: &FeatureQuery) -> Result<FeatureCursor> {
        let paging = plan.merged_paging.then_some((query.limit, query.offset));
        let parts = plan
            .stores
            .into_iter()
            .map(open_part)
            .collect::<Result<Vec<_>>>()?;
        Ok(merge(parts, paging))
    }

    pub(super) fn federated_count(&self, query: &FeatureQuery) -> Result<usize> {
        let plan = self.plan(query)?;
        if plan.needs_exact_ids() {
            return Ok(Self::run_plan(plan, query)?.count());
        }
        let mut total = 0_usize;
        for store in &plan.stores {
            let unpaged = FeatureQuery {
                limit: 0,
                offset: 0,
                ..store.query.clone()
            };
            total = total.saturating_add(store.database.store().query_features_count(&unpaged)?);
        }
        Ok(paged_count(total, query.limit, query.offset))
    }

    /// Routes matching `query` in result order, before paging.
    pub(super) fn matching_routes(&self, query: &FeatureSetQuery) -> Result<Vec<RouteEntry>> {
        let candidates: Vec<RouteEntry> = self.with_catalog(|catalog| {
            Ok(catalog
                .hooks()
                .routes()
                .filter(|route| route.matches_feature_sets(query))
                .cloned()
                .collect())
        })?;
        let mut routes = if query.visible_only {
            let mut visible = Vec::with_capacity(candidates.len());
            for route in candidates {
                if route.database.store().is_feature_set_visible(route.fsid)? {
                    visible.push(route);
                }
            }
            visible
        } else {
            candidates
        };
        if query.sort_by_name {
            routes.sort_by_cached_key(|route| (route.name.to_lowercase(), route.fsid));
        }
        Ok(routes)
    }
}

fn insert_routed_set(
    catalog: &mut Catalog<RouteIndex>,
    record: &SourceRecord,
    database: &Arc<SharedDatabase>,
    name: &str,
    (min_resolution, max_resolution): (f64, f64),
) -> Result<FeatureSet> {
    let fsid = RouteIndex::reserve_feature_set(
        catalog.connection(),
        name,
        database.path(),
        &record.provider,
        &record.feature_type,
    )?;
    let definition = FeatureSetDefinition {
        name: name.to_owned(),
        provider: record.provider.clone(),
        feature_type: record.feature_type.clone(),
        min_resolution,
        max_resolution,
        visible: true,
    };
    if let Err(err) = database.store().insert_feature_set_with_id(fsid, &definition, 0) {
        if let Err(cleanup) = RouteIndex::delete_feature_set_rows(catalog.connection(), &[fsid])
        {
            warn!("failed to revert feature set {fsid}: {cleanup}");
        }
        return Err(err);
    }
    RouteIndex::set_feature_set_catalog_id(catalog.connection(), fsid, record.catalog_id)?;
    let entry = RouteEntry {
        fsid,
        name: definition.name,
        provider: definition.provider,
        feature_type: definition.feature_type,
        min_resolution,
        max_resolution,
        version: 0,
        catalog_id: record.catalog_id,
        database: Arc::clone(database),
    };
    let feature_set = entry.feature_set();
    catalog.hooks_mut().insert_route(entry);
    RouteIndex::mark_file_dirty(catalog.connection(), fsid)?;
    Ok(feature_set)
}

fn open_part(store: StorePlan) -> Result<FederatedCursor> {
    let inner = store.database.store().query_features(&store.query)?;
    Ok(FederatedCursor::new(inner, store.exact_ids, store.database))
}

/// Apply a query's offset and limit to already ordered results.
pub(super) fn page<T>(items: Vec<T>, limit: usize, offset: usize) -> Vec<T> {
    let take = if limit == 0 { usize::MAX } else { limit };
    items.into_iter().skip(offset).take(take).collect()
}
