//! Single-flight ingestion gate with commit/rollback.

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use tessera_catalog::{Catalog, CatalogError};
use tessera_core::{FeatureStoreError, Result};

use crate::RouteIndex;
use crate::store::{StoreState, closed};

/// Why a caller wants to ingest a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Purpose {
    Add,
    Update,
}

/// Outcome of asking to ingest a path.
pub(crate) enum Admission<'a> {
    /// The caller owns the ingestion.
    Admitted(IngestionGuard<'a>),
    /// Nothing to do: another caller finished first, or `add` found the
    /// path already catalogued.
    Completed {
        /// Whether the path is catalogued now.
        present: bool,
    },
}

/// Claim on one source path while it is being ingested.
///
/// The path sits in the route index's pending set for the guard's lifetime.
/// Dropping a guard that was never committed deletes the catalog entry (and
/// through it every route of the entry), the routing rows it reserved and
/// the child store files it created. Either way the path leaves the pending
/// set and blocked callers are woken.
pub struct IngestionGuard<'a> {
    state: &'a StoreState,
    path: Utf8PathBuf,
    purpose: Purpose,
    catalog_id: Option<i64>,
    reserved: Vec<i64>,
    child_files: Vec<Utf8PathBuf>,
    routed: bool,
    committed: bool,
}

impl std::fmt::Debug for IngestionGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionGuard")
            .field("path", &self.path)
            .field("catalog_id", &self.catalog_id)
            .field("committed", &self.committed)
            .finish_non_exhaustive()
    }
}

impl<'a> IngestionGuard<'a> {
    /// Claim `path`, or wait for the ingestion already claiming it.
    pub(crate) fn admit(
        state: &'a StoreState,
        path: &Utf8Path,
        purpose: Purpose,
    ) -> Result<Admission<'a>> {
        let mut slot = state.catalog.lock();
        let catalog = slot.as_mut().ok_or_else(closed)?;
        if !catalog.hooks().is_pending(path) {
            let present = catalog.contains(path)?;
            match (purpose, present) {
                (Purpose::Add, true) => return Ok(Admission::Completed { present }),
                (Purpose::Update, false) => {
                    return Err(FeatureStoreError::invalid_argument(format!(
                        "{path} is not catalogued"
                    )));
                }
                _ => {}
            }
            catalog.hooks_mut().mark_pending(path);
            return Ok(Admission::Admitted(Self {
                state,
                path: path.to_path_buf(),
                purpose,
                catalog_id: None,
                reserved: Vec::new(),
                child_files: Vec::new(),
                routed: false,
                committed: false,
            }));
        }

        debug!("waiting for the in-flight ingestion of {path}");
        while slot
            .as_ref()
            .is_some_and(|catalog| catalog.hooks().is_pending(path))
        {
            state.pending_changed.wait(&mut slot);
        }
        let catalog = slot.as_ref().ok_or_else(closed)?;
        Ok(Admission::Completed {
            present: catalog.contains(path)?,
        })
    }

    /// Catalogued path being ingested.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Catalog entry created or updated by this ingestion.
    #[must_use]
    pub const fn catalog_id(&self) -> Option<i64> {
        self.catalog_id
    }

    pub(crate) const fn set_catalog_id(&mut self, catalog_id: i64) {
        self.catalog_id = Some(catalog_id);
    }

    pub(crate) fn track_reserved(&mut self, fsid: i64) {
        self.reserved.push(fsid);
    }

    pub(crate) fn track_child_file(&mut self, path: Utf8PathBuf) {
        self.child_files.push(path);
    }

    /// Record that routes of this ingestion entered the route index.
    pub(crate) const fn mark_routed(&mut self) {
        self.routed = true;
    }

    /// Fail unless the catalog entry still belongs to this ingestion.
    pub(crate) fn ensure_catalogued(&self, catalog: &Catalog<RouteIndex>) -> Result<i64> {
        let catalog_id = self
            .catalog_id
            .ok_or_else(|| FeatureStoreError::illegal_state("ingestion has no catalog entry"))?;
        if catalog.entry_id(&self.path)? == Some(catalog_id) {
            Ok(catalog_id)
        } else {
            Err(FeatureStoreError::illegal_state(
                "source was removed during ingestion",
            ))
        }
    }

    /// Finalise the catalog entry. Called under the store lock after every
    /// new route was registered.
    ///
    /// The path leaves the pending set here, under the same lock, so a
    /// concurrent close never rolls back a committed ingestion.
    pub(crate) fn commit(&mut self, catalog: &mut Catalog<RouteIndex>) -> Result<()> {
        let catalog_id = self.ensure_catalogued(catalog)?;
        RouteIndex::finalize_entry(catalog.connection(), catalog_id)?;
        if self.purpose == Purpose::Update {
            RouteIndex::clear_modified(catalog.connection(), catalog_id)?;
        }
        catalog.hooks_mut().clear_pending(&self.path);
        self.committed = true;
        Ok(())
    }

    fn roll_back(&self, catalog: &mut Catalog<RouteIndex>) {
        warn!("rolling back ingestion of {}", self.path);
        if self.catalog_id.is_some() {
            let deleted = if self.purpose == Purpose::Add && !self.routed {
                catalog.delete_released(&self.path)
            } else {
                catalog.delete_path(&self.path)
            };
            match deleted {
                Ok(_) | Err(CatalogError::MissingEntry { .. }) => {}
                Err(err) => warn!("failed to delete catalog entry for {}: {err}", self.path),
            }
        }
        if let Err(err) = RouteIndex::delete_feature_set_rows(catalog.connection(), &self.reserved)
        {
            warn!("failed to release feature sets reserved for {}: {err}", self.path);
        }
    }

    fn remove_child_files(&self) {
        for file in &self.child_files {
            if let Err(err) = tessera_fs::remove_file_if_exists(file) {
                warn!("failed to remove partial child store {file}: {err}");
            }
        }
    }
}

impl Drop for IngestionGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.state.catalog.lock();
        if let Some(catalog) = slot.as_mut() {
            if !self.committed {
                self.roll_back(catalog);
            }
            catalog.hooks_mut().clear_pending(&self.path);
        }
        drop(slot);
        if !self.committed {
            self.remove_child_files();
        }
        self.state.pending_changed.notify_all();
    }
}
