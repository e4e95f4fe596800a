//! Source ingestion: add, update, remove and the validation sweep.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use tessera_core::{
    ChildStore, ContentFeatureSet, ContentSource, FeatureSetDefinition, FeatureStoreError, Result,
};

use super::{FederatedFeatureStore, closed};
use crate::guard::{Admission, IngestionGuard, Purpose};
use crate::{IngestCurrency, RouteEntry, RouteIndex, SharedDatabase, catalog_path};

/// Result of [`FederatedFeatureStore::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// This call parsed and catalogued the source.
    Ingested,
    /// The source was already catalogued, possibly by a concurrent call.
    AlreadyPresent,
}

/// Feature set ids and prior versions keyed by name, reused by an update.
type Replacements = BTreeMap<String, (i64, i64)>;

/// A child store file written by one ingestion.
struct ChildBuild {
    path: Utf8PathBuf,
    store: Box<dyn ChildStore>,
    feature_sets: Vec<BuiltSet>,
}

struct BuiltSet {
    fsid: i64,
    name: String,
    provider: String,
    feature_type: String,
    min_resolution: f64,
    max_resolution: f64,
    version: i64,
}

impl FederatedFeatureStore {
    /// Parse `path` and catalog every non-empty feature set it yields.
    ///
    /// `hint` names the parser to use; without it the first parser that
    /// accepts the path wins. Paths inside a `.zip` archive are catalogued
    /// under the archive path.
    ///
    /// Concurrent calls for the same path ingest it once: the others wait
    /// and report [`AddOutcome::AlreadyPresent`].
    ///
    /// # Errors
    /// Returns [`FeatureStoreError::InvalidArgument`] when no parser accepts
    /// the path, [`FeatureStoreError::IllegalState`] when the store is closed
    /// or a concurrent ingestion of the path failed, and any producer or
    /// storage failure. Nothing of a failed ingestion is left behind.
    pub fn add(&self, path: &Utf8Path, hint: Option<&str>) -> Result<AddOutcome> {
        self.ensure_open()?;
        let source = catalog_path(path);
        let mut guard = match IngestionGuard::admit(&self.state, &source, Purpose::Add)? {
            Admission::Admitted(guard) => guard,
            Admission::Completed { present: true } => return Ok(AddOutcome::AlreadyPresent),
            Admission::Completed { present: false } => {
                return Err(FeatureStoreError::illegal_state(
                    "concurrent ingestion of the source failed",
                ));
            }
        };

        debug!("ingesting {path}");
        let mut content = self.parsers.parse(path, hint)?;
        let currency = IngestCurrency::new(content.parsers());
        {
            let mut slot = self.state.catalog.lock();
            let catalog = slot.as_mut().ok_or_else(closed)?;
            let catalog_id = catalog.add_entry(&source, &currency)?;
            guard.set_catalog_id(catalog_id);
            RouteIndex::insert_source(
                catalog.connection(),
                catalog_id,
                content.provider(),
                content.content_type(),
            )?;
        }

        let builds = self.build_children(&mut guard, content.as_mut(), &mut Replacements::new())?;
        self.commit(&mut guard, builds, &[])?;
        drop(guard);
        self.notify();
        Ok(AddOutcome::Ingested)
    }

    /// Re-ingest a catalogued source.
    ///
    /// Feature sets whose name reappears keep their id; their version moves
    /// past every version recorded for the set. Feature sets that no longer
    /// appear are removed once the update commits.
    ///
    /// # Errors
    /// Returns [`FeatureStoreError::InvalidArgument`] when the path is not
    /// catalogued. A failed update removes the source from the store.
    pub fn update(&self, path: &Utf8Path) -> Result<()> {
        self.ensure_open()?;
        let source = catalog_path(path);
        let mut guard = match IngestionGuard::admit(&self.state, &source, Purpose::Update)? {
            Admission::Admitted(guard) => guard,
            Admission::Completed { present: true } => return Ok(()),
            Admission::Completed { present: false } => {
                return Err(FeatureStoreError::invalid_argument(format!(
                    "{source} is not catalogued"
                )));
            }
        };

        debug!("updating {path}");
        let mut content = self.parsers.parse(path, None)?;
        let currency = IngestCurrency::new(content.parsers());
        let (mut replacements, stale) = {
            let mut slot = self.state.catalog.lock();
            let catalog = slot.as_mut().ok_or_else(closed)?;
            let catalog_id = catalog.entry_id(&source)?.ok_or_else(|| {
                FeatureStoreError::invalid_argument(format!("{source} is not catalogued"))
            })?;
            guard.set_catalog_id(catalog_id);
            catalog.update_entry(catalog_id, &source, &currency)?;
            RouteIndex::insert_source(
                catalog.connection(),
                catalog_id,
                content.provider(),
                content.content_type(),
            )?;

            let mut replacements = Replacements::new();
            let mut stale = Vec::new();
            for (fsid, name) in RouteIndex::feature_sets_for_entry(catalog.connection(), catalog_id)? {
                let prior = match catalog.hooks().route(fsid) {
                    Some(route) => route
                        .version
                        .max(route.database.store().max_feature_version(fsid)?),
                    None => 0,
                };
                replacements.entry(name).or_insert((fsid, prior));
                stale.push(fsid);
            }
            RouteIndex::delete_feature_set_rows(catalog.connection(), &stale)?;
            (replacements, stale)
        };

        let builds = self.build_children(&mut guard, content.as_mut(), &mut replacements)?;
        let rebuilt: BTreeSet<i64> = builds
            .iter()
            .flat_map(|build| build.feature_sets.iter().map(|set| set.fsid))
            .collect();
        let retired: Vec<i64> = stale
            .into_iter()
            .filter(|fsid| !rebuilt.contains(fsid))
            .collect();
        self.commit(&mut guard, builds, &retired)?;
        drop(guard);
        self.notify();
        Ok(())
    }

    /// Remove a catalogued source with all of its feature sets.
    ///
    /// Child store files go once no route and no reader refers to them.
    ///
    /// # Errors
    /// Returns [`FeatureStoreError::InvalidArgument`] when the path is not
    /// catalogued.
    pub fn remove(&self, path: &Utf8Path) -> Result<()> {
        let source = catalog_path(path);
        let catalog_id = self.with_catalog(|catalog| {
            catalog
                .delete_path(&source)
                .map_err(FeatureStoreError::from)
        })?;
        debug!("removed {source} (entry {catalog_id})");
        self.notify();
        Ok(())
    }

    /// Validate every catalogued source, removing those no longer current.
    ///
    /// Returns the number of removed sources.
    ///
    /// # Errors
    /// Fails when the route index cannot be read or updated.
    pub fn refresh(&self) -> Result<usize> {
        let removed = self.with_catalog(|catalog| {
            catalog
                .validate_catalog()
                .map_err(FeatureStoreError::from)
        })?;
        if !removed.is_empty() {
            debug!("refresh removed {} stale sources", removed.len());
        }
        self.notify();
        Ok(removed.len())
    }

    /// Write every feature set of `content` into new child store files,
    /// starting a new file whenever the current one reaches the limit.
    ///
    /// Each file is filled inside one bulk insertion; a failure leaves the
    /// file without any of the features written since it was started.
    fn build_children(
        &self,
        guard: &mut IngestionGuard<'_>,
        content: &mut dyn ContentSource,
        replacements: &mut Replacements,
    ) -> Result<Vec<ChildBuild>> {
        let mut builds = Vec::new();
        let mut header = content.next_feature_set()?;
        while header.is_some() {
            let mut build = self.start_child(guard)?;
            while let Some(current) = header.take() {
                if self.options.at_limit(build.feature_sets.len()) {
                    header = Some(current);
                    break;
                }
                self.write_feature_set(guard, &mut build, content, current, replacements)?;
                header = content.next_feature_set()?;
            }
            build.store.commit_bulk()?;
            finish_child(build, &mut builds);
        }
        Ok(builds)
    }

    fn start_child(&self, guard: &mut IngestionGuard<'_>) -> Result<ChildBuild> {
        let path = self.allocate_child_file(guard.path())?;
        guard.track_child_file(path.clone());
        let store = self.factory.create(&path)?;
        store.begin_bulk()?;
        Ok(ChildBuild {
            path,
            store,
            feature_sets: Vec::new(),
        })
    }

    fn write_feature_set(
        &self,
        guard: &mut IngestionGuard<'_>,
        build: &mut ChildBuild,
        content: &mut dyn ContentSource,
        header: ContentFeatureSet,
        replacements: &mut Replacements,
    ) -> Result<()> {
        let definition = FeatureSetDefinition {
            name: header.name,
            provider: content.provider().to_owned(),
            feature_type: content.content_type().to_owned(),
            min_resolution: header.min_resolution,
            max_resolution: header.max_resolution,
            visible: header.visible,
        };
        let (fsid, version) = self.reserve(guard, &build.path, &definition, replacements)?;
        build
            .store
            .insert_feature_set_with_id(fsid, &definition, version)?;

        if self.copy_features(build.store.as_ref(), fsid, content)? == 0 {
            debug!("dropping empty feature set {} of {}", definition.name, guard.path());
            build.store.delete_feature_set(fsid)?;
            self.with_catalog(|catalog| {
                RouteIndex::delete_feature_set_rows(catalog.connection(), &[fsid])
            })?;
            return Ok(());
        }
        build.feature_sets.push(BuiltSet {
            fsid,
            name: definition.name,
            provider: definition.provider,
            feature_type: definition.feature_type,
            min_resolution: definition.min_resolution,
            max_resolution: definition.max_resolution,
            version,
        });
        Ok(())
    }

    /// Allocate the routing row for a new feature set, reusing the id of a
    /// same-named set being replaced.
    fn reserve(
        &self,
        guard: &mut IngestionGuard<'_>,
        child_path: &Utf8Path,
        definition: &FeatureSetDefinition,
        replacements: &mut Replacements,
    ) -> Result<(i64, i64)> {
        let replaced = replacements.remove(&definition.name);
        let reserved = self.with_catalog(|catalog| {
            let connection = catalog.connection();
            if let Some((fsid, prior)) = replaced {
                RouteIndex::reserve_feature_set_with_id(
                    connection,
                    fsid,
                    &definition.name,
                    child_path,
                    &definition.provider,
                    &definition.feature_type,
                )?;
                return Ok((fsid, prior.saturating_add(1)));
            }
            let fsid = RouteIndex::reserve_feature_set(
                connection,
                &definition.name,
                child_path,
                &definition.provider,
                &definition.feature_type,
            )?;
            Ok((fsid, 1))
        })?;
        guard.track_reserved(reserved.0);
        Ok(reserved)
    }

    /// Copy the current set's features, returning how many were written.
    fn copy_features(
        &self,
        store: &dyn ChildStore,
        fsid: i64,
        content: &mut dyn ContentSource,
    ) -> Result<usize> {
        let interval = self.options.close_check_interval;
        let mut written = 0_usize;
        let mut until_check = interval;
        while let Some(feature) = content.next_feature()? {
            store.insert_feature(fsid, &feature.definition, feature.visible)?;
            written = written.saturating_add(1);
            until_check = until_check.saturating_sub(1);
            if interval > 0 && until_check == 0 {
                self.ensure_open()?;
                until_check = interval;
            }
        }
        self.ensure_open()?;
        Ok(written)
    }

    /// Register the built routes and finalise the catalog entry.
    fn commit(
        &self,
        guard: &mut IngestionGuard<'_>,
        builds: Vec<ChildBuild>,
        retired: &[i64],
    ) -> Result<()> {
        let mut slot = self.state.catalog.lock();
        let catalog = slot.as_mut().ok_or_else(closed)?;
        let catalog_id = guard.ensure_catalogued(catalog)?;
        guard.mark_routed();
        let (connection, index) = catalog.parts_mut();
        let mut registered = 0_usize;
        for build in builds {
            let database = Arc::new(SharedDatabase::new(build.path, build.store));
            for set in build.feature_sets {
                RouteIndex::set_feature_set_catalog_id(connection, set.fsid, catalog_id)?;
                index.insert_route(RouteEntry {
                    fsid: set.fsid,
                    name: set.name,
                    provider: set.provider,
                    feature_type: set.feature_type,
                    min_resolution: set.min_resolution,
                    max_resolution: set.max_resolution,
                    version: set.version,
                    catalog_id,
                    database: Arc::clone(&database),
                });
                registered = registered.saturating_add(1);
            }
        }
        for fsid in retired {
            index.remove_route(*fsid);
        }
        guard.commit(catalog)?;
        debug!(
            "committed {} as entry {catalog_id} with {registered} feature sets",
            guard.path()
        );
        Ok(())
    }
}

fn finish_child(build: ChildBuild, builds: &mut Vec<ChildBuild>) {
    if !build.feature_sets.is_empty() {
        builds.push(build);
        return;
    }
    build.store.close();
    if let Err(err) = tessera_fs::remove_file_if_exists(&build.path) {
        warn!("failed to remove empty child store {}: {err}", build.path);
    }
}
