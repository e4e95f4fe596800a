//! In-memory routing records.

use std::sync::Arc;

use tessera_core::{
    FeatureQuery, FeatureSet, FeatureSetQuery, FederatedId, matches_any,
    resolution_ranges_overlap,
};

use crate::SharedDatabase;

/// Routing record for one federated feature set.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    /// Federated feature set id; also the id inside the child store.
    pub fsid: i64,
    /// Display name.
    pub name: String,
    /// Producer name.
    pub provider: String,
    /// Content type.
    pub feature_type: String,
    /// Coarsest display resolution; `0` is unbounded.
    pub min_resolution: f64,
    /// Finest display resolution; `0` is unbounded.
    pub max_resolution: f64,
    /// Version reported for the feature set.
    pub version: i64,
    /// Catalog entry of the source that produced the set.
    pub catalog_id: i64,
    /// Child store hosting the features.
    pub database: Arc<SharedDatabase>,
}

impl RouteEntry {
    /// The feature set as seen by callers of the federated store.
    #[must_use]
    pub fn feature_set(&self) -> FeatureSet {
        FeatureSet {
            id: self.fsid,
            name: self.name.clone(),
            provider: self.provider.clone(),
            feature_type: self.feature_type.clone(),
            min_resolution: self.min_resolution,
            max_resolution: self.max_resolution,
            version: self.version,
        }
    }

    /// Whether any feature of this set can satisfy `query`.
    ///
    /// Feature ids constrain the set through their high bits. Visibility and
    /// feature names are left to the child store.
    #[must_use]
    pub fn may_match_features(&self, query: &FeatureQuery) -> bool {
        if !self.matches_labels(&query.providers, &query.types, &query.feature_set_names) {
            return false;
        }
        if !query.feature_set_ids.is_empty() && !query.feature_set_ids.contains(&self.fsid) {
            return false;
        }
        if !query.feature_ids.is_empty()
            && !query
                .feature_ids
                .iter()
                .any(|fid| FederatedId::from_raw(*fid).feature_set_id() == self.fsid)
        {
            return false;
        }
        resolution_ranges_overlap(
            (self.min_resolution, self.max_resolution),
            (query.min_resolution, query.max_resolution),
        )
    }

    /// Whether this set satisfies `query`, ignoring visibility.
    #[must_use]
    pub fn matches_feature_sets(&self, query: &FeatureSetQuery) -> bool {
        self.matches_labels(&query.providers, &query.types, &query.names)
            && (query.ids.is_empty() || query.ids.contains(&self.fsid))
    }

    fn matches_labels(&self, providers: &[String], types: &[String], names: &[String]) -> bool {
        (providers.is_empty() || matches_any(providers, &self.provider))
            && (types.is_empty() || matches_any(types, &self.feature_type))
            && (names.is_empty() || matches_any(names, &self.name))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rstest::rstest;
    use tessera_fdb::FeatureDatabase;

    pub(crate) fn route(fsid: i64, name: &str, provider: &str) -> RouteEntry {
        let database = FeatureDatabase::open_in_memory().expect("in-memory database");
        RouteEntry {
            fsid,
            name: name.to_owned(),
            provider: provider.to_owned(),
            feature_type: String::from("vec"),
            min_resolution: 0.0,
            max_resolution: 0.0,
            version: 1,
            catalog_id: 1,
            database: Arc::new(SharedDatabase::new(":memory:", Box::new(database))),
        }
    }

    #[rstest]
    #[case(FeatureQuery::default(), true)]
    #[case(FeatureQuery::default().with_feature_set_name("ROAD%"), true)]
    #[case(FeatureQuery::default().with_feature_set_name("rivers"), false)]
    #[case(FeatureQuery::default().with_provider("osm"), true)]
    #[case(FeatureQuery::default().with_type("kml"), false)]
    #[case(FeatureQuery::default().with_feature_set_id(8), false)]
    #[case(FeatureQuery::default().with_feature_id((7 << 32) | 3), true)]
    #[case(FeatureQuery::default().with_feature_id((8 << 32) | 3), false)]
    fn feature_predicates_prune_routes(#[case] query: FeatureQuery, #[case] expected: bool) {
        assert_eq!(route(7, "roads", "osm").may_match_features(&query), expected);
    }

    #[rstest]
    fn resolution_bounds_prune_routes() {
        let mut entry = route(7, "roads", "osm");
        entry.min_resolution = 100.0;
        let mut query = FeatureQuery::default();
        query.max_resolution = Some(500.0);
        assert!(!entry.may_match_features(&query));
        query.max_resolution = Some(50.0);
        assert!(entry.may_match_features(&query));
    }

    #[rstest]
    #[case(FeatureSetQuery::default().with_name("roads"), true)]
    #[case(FeatureSetQuery::default().with_id(7).with_provider("o%"), true)]
    #[case(FeatureSetQuery::default().with_id(9), false)]
    fn feature_set_predicates(#[case] query: FeatureSetQuery, #[case] expected: bool) {
        assert_eq!(route(7, "roads", "osm").matches_feature_sets(&query), expected);
    }
}
