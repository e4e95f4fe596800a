//! Extension points for catalogs that keep derived tables alongside entries.

use rusqlite::Connection;

use crate::{CatalogError, CatalogRow};

/// Which catalog entries a removal notification refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovedEntry {
    /// The entry with this id was deleted.
    Entry(i64),
    /// The entry with this id was deleted by a caller that had already
    /// released any in-memory state derived from it. Only persisted derived
    /// rows are left to remove.
    Released(i64),
    /// Entries were deleted in bulk; sweep any derived rows whose entry no
    /// longer exists.
    Orphans,
}

/// Callbacks a specialised catalog uses to keep its own tables consistent.
///
/// Every callback runs on the catalog's connection (inside the caller's
/// transaction where one is open). Default implementations do nothing, so
/// a plain catalog is `Catalog<NoHooks>`.
pub trait CatalogHooks {
    /// Bits folded into the stored database version above the generic
    /// catalog version (`catalog | (schema_version << 16)`).
    fn schema_version(&self) -> i32 {
        0
    }

    /// Decide whether an existing database can be used as is.
    fn check_version(&self, stored: i32, expected: i32) -> bool {
        stored == expected
    }

    /// Create the specialised tables after the generic ones were rebuilt.
    fn build_schema(&mut self, connection: &Connection) -> Result<(), CatalogError> {
        let _ = connection;
        Ok(())
    }

    /// Drop the specialised tables before a rebuild.
    fn drop_schema(&mut self, connection: &Connection) -> Result<(), CatalogError> {
        let _ = connection;
        Ok(())
    }

    /// Apply in-place migrations when the stored version was accepted.
    fn upgrade_schema(&mut self, connection: &Connection) -> Result<(), CatalogError> {
        let _ = connection;
        Ok(())
    }

    /// Whether a row may be handed to its currency for validation. Rows
    /// rejected here are removed by the validation sweep.
    fn is_row_usable(&self, row: &CatalogRow) -> bool {
        let _ = row;
        true
    }

    /// Called after a new entry was inserted.
    fn on_entry_added(&mut self, connection: &Connection, id: i64) -> Result<(), CatalogError> {
        let _ = (connection, id);
        Ok(())
    }

    /// Called after entries were marked valid. `None` means "not one
    /// specific entry".
    fn on_entry_marked_valid(
        &mut self,
        connection: &Connection,
        id: Option<i64>,
    ) -> Result<(), CatalogError> {
        let _ = (connection, id);
        Ok(())
    }

    /// Called after entries were deleted. `automated` is set when the
    /// catalog itself decided to delete them.
    fn on_entry_removed(
        &mut self,
        connection: &Connection,
        removed: RemovedEntry,
        automated: bool,
    ) -> Result<(), CatalogError> {
        let _ = (connection, removed, automated);
        Ok(())
    }

    /// Called at the end of every validation sweep, before it commits.
    fn on_validated(&mut self, connection: &Connection) -> Result<(), CatalogError> {
        let _ = connection;
        Ok(())
    }
}

/// Hooks for a catalog without derived tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl CatalogHooks for NoHooks {}
