//! Store contracts.
//!
//! [`FeatureDataStore`] is the read/write surface consumers program against.
//! [`ChildStore`] extends it with the hooks the federated store needs from
//! each physical database it routes to, and [`ChildStoreFactory`] creates
//! and opens those databases.

use camino::Utf8Path;

use crate::{
    Feature, FeatureDefinition, FeatureQuery, FeatureSet, FeatureSetDefinition, FeatureSetQuery,
    FeatureSetUpdate, FeatureUpdate, Result,
};

/// Iterator over query results.
pub type FeatureCursor = Box<dyn Iterator<Item = Feature> + Send>;

/// Read/write access to features grouped into feature sets.
///
/// Identifiers are those of the implementing store: local ids for a single
/// database, federated ids for the federated store.
pub trait FeatureDataStore: Send + Sync {
    /// Return the features matching `query`, ordered by feature set then id.
    fn query_features(&self, query: &FeatureQuery) -> Result<FeatureCursor>;

    /// Count the features matching `query`, honouring its limit and offset.
    fn query_features_count(&self, query: &FeatureQuery) -> Result<usize>;

    /// Return the feature sets matching `query`.
    fn query_feature_sets(&self, query: &FeatureSetQuery) -> Result<Vec<FeatureSet>>;

    /// Count the feature sets matching `query`, honouring its limit and offset.
    fn query_feature_sets_count(&self, query: &FeatureSetQuery) -> Result<usize>;

    /// Fetch one feature.
    fn feature(&self, fid: i64) -> Result<Option<Feature>>;

    /// Fetch one feature set.
    fn feature_set(&self, fsid: i64) -> Result<Option<FeatureSet>>;

    /// Create a feature set with a store-assigned id.
    fn insert_feature_set(&self, definition: &FeatureSetDefinition) -> Result<FeatureSet>;

    /// Rename a feature set or change its resolution range.
    fn update_feature_set(&self, fsid: i64, update: &FeatureSetUpdate) -> Result<()>;

    /// Delete a feature set and its features.
    fn delete_feature_set(&self, fsid: i64) -> Result<()>;

    /// Add a feature to a feature set.
    fn insert_feature(
        &self,
        fsid: i64,
        definition: &FeatureDefinition,
        visible: bool,
    ) -> Result<Feature>;

    /// Modify a feature.
    fn update_feature(&self, fid: i64, update: &FeatureUpdate) -> Result<()>;

    /// Delete a feature.
    fn delete_feature(&self, fid: i64) -> Result<()>;

    /// Whether a feature is visible.
    fn is_feature_visible(&self, fid: i64) -> Result<bool>;

    /// Toggle visibility for one feature.
    fn set_feature_visible(&self, fid: i64, visible: bool) -> Result<()>;

    /// Toggle visibility for every feature matching `query`.
    fn set_features_visible(&self, query: &FeatureQuery, visible: bool) -> Result<()>;

    /// Whether a feature set is visible.
    fn is_feature_set_visible(&self, fsid: i64) -> Result<bool>;

    /// Toggle visibility for one feature set.
    fn set_feature_set_visible(&self, fsid: i64, visible: bool) -> Result<()>;

    /// Toggle visibility for every feature set matching `query`.
    fn set_feature_sets_visible(&self, query: &FeatureSetQuery, visible: bool) -> Result<()>;

    /// Whether features in a feature set may be modified.
    fn is_feature_set_read_only(&self, fsid: i64) -> Result<bool>;

    /// Lock or unlock a feature set against feature modification.
    fn set_feature_set_read_only(&self, fsid: i64, read_only: bool) -> Result<()>;
}

/// A physical database hosting one or more federated feature sets.
pub trait ChildStore: FeatureDataStore {
    /// Create a feature set under a caller-chosen id and initial version.
    fn insert_feature_set_with_id(
        &self,
        fsid: i64,
        definition: &FeatureSetDefinition,
        version: i64,
    ) -> Result<()>;

    /// Highest feature version recorded for `fsid`, or zero.
    fn max_feature_version(&self, fsid: i64) -> Result<i64>;

    /// Number of feature sets hosted by this database.
    fn feature_set_count(&self) -> Result<usize>;

    /// Start grouping writes into one transaction until
    /// [`ChildStore::commit_bulk`]. Writes still pending when the store is
    /// closed are discarded.
    fn begin_bulk(&self) -> Result<()>;

    /// Commit the writes made since [`ChildStore::begin_bulk`].
    fn commit_bulk(&self) -> Result<()>;

    /// Release the underlying connection. Later calls fail with
    /// [`crate::FeatureStoreError::IllegalState`].
    fn close(&self);
}

/// Creates and opens child stores.
pub trait ChildStoreFactory: Send + Sync {
    /// Create an empty child store at `path`, replacing any existing file.
    fn create(&self, path: &Utf8Path) -> Result<Box<dyn ChildStore>>;

    /// Open an existing child store.
    fn open(&self, path: &Utf8Path) -> Result<Box<dyn ChildStore>>;
}
