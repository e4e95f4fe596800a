//! Fingerprint contracts used to decide whether catalogued content is current.
//!
//! A [`Currency`] computes an opaque fingerprint when content is catalogued
//! and later judges whether the recorded fingerprint still describes the
//! source on disk. The [`CurrencyRegistry`] maps currency names to
//! instances; it is owned by whichever store creates it and injected into
//! the catalog rather than looked up globally.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use camino::Utf8Path;
use parking_lot::Mutex;

use crate::Result;

/// Fingerprint generator and validator for one kind of catalogued content.
pub trait Currency: Send + Sync {
    /// Registry key recorded alongside each catalog entry.
    fn name(&self) -> &str;

    /// Version of the fingerprint format and of the content it describes.
    fn app_version(&self) -> i32;

    /// Compute the fingerprint for `path`.
    fn fingerprint(&self, path: &Utf8Path) -> Result<Vec<u8>>;

    /// Decide whether a recorded fingerprint still describes `path`.
    ///
    /// Implementations return `Ok(false)` rather than an error when the
    /// recorded version differs from [`Currency::app_version`], when the path
    /// no longer exists, or when any component of the fingerprint disagrees
    /// with a freshly computed one.
    fn is_valid(&self, path: &Utf8Path, version: i32, fingerprint: &[u8]) -> Result<bool>;
}

/// Lock-guarded mapping from currency name to instance.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use camino::Utf8Path;
/// use tessera_core::{Currency, CurrencyRegistry, Result};
///
/// struct Always;
///
/// impl Currency for Always {
///     fn name(&self) -> &str { "always" }
///     fn app_version(&self) -> i32 { 1 }
///     fn fingerprint(&self, _: &Utf8Path) -> Result<Vec<u8>> { Ok(Vec::new()) }
///     fn is_valid(&self, _: &Utf8Path, _: i32, _: &[u8]) -> Result<bool> { Ok(true) }
/// }
///
/// let registry = CurrencyRegistry::new();
/// registry.register(Arc::new(Always));
/// assert!(registry.lookup("always").is_some());
/// assert!(registry.lookup("missing").is_none());
/// ```
#[derive(Default)]
pub struct CurrencyRegistry {
    currencies: Mutex<HashMap<String, Arc<dyn Currency>>>,
}

impl fmt::Debug for CurrencyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.currencies.lock().keys().cloned().collect();
        names.sort_unstable();
        f.debug_struct("CurrencyRegistry")
            .field("currencies", &names)
            .finish()
    }
}

impl CurrencyRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `currency` under its name, replacing any previous instance.
    pub fn register(&self, currency: Arc<dyn Currency>) {
        let name = currency.name().to_owned();
        if self.currencies.lock().insert(name.clone(), currency).is_some() {
            log::debug!("replaced currency {name}");
        }
    }

    /// Remove the currency registered under `name`, returning it if present.
    pub fn deregister(&self, name: &str) -> Option<Arc<dyn Currency>> {
        self.currencies.lock().remove(name)
    }

    /// Look up the currency registered under `name`.
    ///
    /// An unknown name is not an error: callers treat entries without a
    /// registered currency as valid.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Currency>> {
        self.currencies.lock().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::AlwaysStaleCurrency;
    use rstest::rstest;

    #[rstest]
    fn register_replaces_by_name() {
        let registry = CurrencyRegistry::new();
        registry.register(Arc::new(AlwaysStaleCurrency::named("stale")));
        registry.register(Arc::new(AlwaysStaleCurrency::named("stale")));
        assert!(registry.lookup("stale").is_some());
        assert!(registry.deregister("stale").is_some());
        assert!(registry.lookup("stale").is_none());
        assert!(registry.deregister("stale").is_none());
    }
}
