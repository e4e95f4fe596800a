//! Reference-counted child store handles.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use tessera_core::ChildStore;

/// One open child store file shared by every route entry it hosts.
///
/// Handles are held in an `Arc`. Once [`SharedDatabase::mark_for_delete`]
/// has been called, dropping the last reference closes the store and removes
/// its file; readers holding a transient clone keep the file alive until
/// they finish.
pub struct SharedDatabase {
    path: Utf8PathBuf,
    store: Box<dyn ChildStore>,
    delete_on_drop: AtomicBool,
}

impl fmt::Debug for SharedDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedDatabase")
            .field("path", &self.path)
            .field("delete_on_drop", &self.is_marked_for_delete())
            .finish_non_exhaustive()
    }
}

impl SharedDatabase {
    /// Wrap an open child store located at `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>, store: Box<dyn ChildStore>) -> Self {
        Self {
            path: path.into(),
            store,
            delete_on_drop: AtomicBool::new(false),
        }
    }

    /// Location of the child store file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// The wrapped store.
    #[must_use]
    pub fn store(&self) -> &dyn ChildStore {
        self.store.as_ref()
    }

    /// Remove the backing file once the last reference is dropped.
    pub fn mark_for_delete(&self) {
        self.delete_on_drop.store(true, Ordering::Release);
    }

    /// Whether the backing file will be removed on drop.
    #[must_use]
    pub fn is_marked_for_delete(&self) -> bool {
        self.delete_on_drop.load(Ordering::Acquire)
    }
}

impl Drop for SharedDatabase {
    fn drop(&mut self) {
        self.store.close();
        if !self.is_marked_for_delete() {
            return;
        }
        match tessera_fs::remove_file_if_exists(&self.path) {
            Ok(_) => debug!("removed child store {}", self.path),
            Err(err) => warn!("failed to remove child store {}: {err}", self.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rstest::{fixture, rstest};
    use tempfile::TempDir;
    use tessera_core::ChildStoreFactory;
    use tessera_fdb::SqliteChildStoreFactory;

    #[fixture]
    fn child() -> (TempDir, Utf8PathBuf, SharedDatabase) {
        let dir = TempDir::new().expect("create temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 path");
        let path = root.join("child.sqlite");
        let store = SqliteChildStoreFactory
            .create(&path)
            .expect("create child store");
        (dir, path.clone(), SharedDatabase::new(path, store))
    }

    #[rstest]
    fn unmarked_handle_keeps_its_file(child: (TempDir, Utf8PathBuf, SharedDatabase)) {
        let (_guard, path, shared) = child;
        drop(shared);
        assert!(path.exists());
    }

    #[rstest]
    fn marked_file_outlives_every_reference(child: (TempDir, Utf8PathBuf, SharedDatabase)) {
        let (_guard, path, shared) = child;
        let owner = Arc::new(shared);
        let reader = Arc::clone(&owner);
        owner.mark_for_delete();
        drop(owner);
        assert!(path.exists(), "a live reader keeps the file");
        drop(reader);
        assert!(!path.exists());
    }
}
