//! Tunables for a [`crate::FederatedFeatureStore`].

/// Default number of feature sets hosted by one child store file.
pub const DEFAULT_FEATURE_SET_LIMIT: usize = 250;

/// Default number of features written between closed-store checks.
pub const DEFAULT_CLOSE_CHECK_INTERVAL: usize = 250;

/// Settings applied when a store directory is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Feature sets per child store file before ingestion starts a new one.
    /// Zero disables splitting.
    pub feature_set_limit: usize,
    /// Features written between checks for a concurrent `close`.
    pub close_check_interval: usize,
    /// File name of the route index inside the store directory.
    pub index_file_name: String,
    /// Directory holding child store files, relative to the store directory.
    pub child_directory: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            feature_set_limit: DEFAULT_FEATURE_SET_LIMIT,
            close_check_interval: DEFAULT_CLOSE_CHECK_INTERVAL,
            index_file_name: String::from("index.sqlite"),
            child_directory: String::from("fdbs"),
        }
    }
}

impl StoreOptions {
    /// Override the per-file feature set limit.
    #[must_use]
    pub const fn with_feature_set_limit(mut self, limit: usize) -> Self {
        self.feature_set_limit = limit;
        self
    }

    /// Override the closed-store check interval.
    #[must_use]
    pub const fn with_close_check_interval(mut self, interval: usize) -> Self {
        self.close_check_interval = interval;
        self
    }

    pub(crate) const fn at_limit(&self, feature_sets: usize) -> bool {
        self.feature_set_limit > 0 && feature_sets >= self.feature_set_limit
    }
}
