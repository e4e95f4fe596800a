//! Content-changed notifications.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::FederatedFeatureStore;

/// Observer notified after the store's content changed.
///
/// Notifications are dispatched after the store released its internal lock,
/// so listeners may query the store they are handed.
pub trait StoreListener: Send + Sync {
    /// Called once per completed mutation.
    fn content_changed(&self, store: &FederatedFeatureStore);
}

#[derive(Default)]
pub(crate) struct Listeners {
    entries: RwLock<Vec<Arc<dyn StoreListener>>>,
}

impl Listeners {
    pub(crate) fn add(&self, listener: Arc<dyn StoreListener>) {
        self.entries.write().push(listener);
    }

    pub(crate) fn remove(&self, listener: &Arc<dyn StoreListener>) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|existing| !Arc::ptr_eq(existing, listener));
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub(crate) fn notify(&self, store: &FederatedFeatureStore) {
        let snapshot: Vec<Arc<dyn StoreListener>> = self.entries.read().clone();
        for listener in snapshot {
            listener.content_changed(store);
        }
    }
}
