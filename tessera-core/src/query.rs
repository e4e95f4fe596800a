//! Query predicates for features and feature sets.
//!
//! Empty collections mean "no constraint". Name, provider and type filters
//! are `%` wildcard patterns (see [`crate::wildcard_matches`]). A `limit` of
//! zero means unlimited.

use std::collections::BTreeSet;

use geo::Rect;

/// Predicate over features.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureQuery {
    /// Provider patterns of the owning feature set.
    pub providers: Vec<String>,
    /// Type patterns of the owning feature set.
    pub types: Vec<String>,
    /// Name patterns of the owning feature set.
    pub feature_set_names: Vec<String>,
    /// Owning feature set ids.
    pub feature_set_ids: BTreeSet<i64>,
    /// Feature ids.
    pub feature_ids: BTreeSet<i64>,
    /// Feature name patterns.
    pub feature_names: Vec<String>,
    /// Only return features whose own and owning set's visibility is on.
    pub visible_only: bool,
    /// Coarsest resolution the caller displays at.
    pub min_resolution: Option<f64>,
    /// Finest resolution the caller displays at.
    pub max_resolution: Option<f64>,
    /// Only return features whose bounds intersect this rectangle.
    pub spatial_filter: Option<Rect<f64>>,
    /// Maximum number of results; zero is unlimited.
    pub limit: usize,
    /// Number of leading results to skip.
    pub offset: usize,
}

impl FeatureQuery {
    /// Constrain to feature sets with the given name pattern.
    #[must_use]
    pub fn with_feature_set_name(mut self, pattern: impl Into<String>) -> Self {
        self.feature_set_names.push(pattern.into());
        self
    }

    /// Constrain to a feature set id.
    #[must_use]
    pub fn with_feature_set_id(mut self, fsid: i64) -> Self {
        self.feature_set_ids.insert(fsid);
        self
    }

    /// Constrain to a feature id.
    #[must_use]
    pub fn with_feature_id(mut self, fid: i64) -> Self {
        self.feature_ids.insert(fid);
        self
    }

    /// Constrain to a provider pattern.
    #[must_use]
    pub fn with_provider(mut self, pattern: impl Into<String>) -> Self {
        self.providers.push(pattern.into());
        self
    }

    /// Constrain to a type pattern.
    #[must_use]
    pub fn with_type(mut self, pattern: impl Into<String>) -> Self {
        self.types.push(pattern.into());
        self
    }

    /// Constrain to a feature name pattern.
    #[must_use]
    pub fn with_feature_name(mut self, pattern: impl Into<String>) -> Self {
        self.feature_names.push(pattern.into());
        self
    }

    /// Only return visible features.
    #[must_use]
    pub const fn visible_only(mut self) -> Self {
        self.visible_only = true;
        self
    }

    /// Restrict to features intersecting `bounds`.
    #[must_use]
    pub const fn within(mut self, bounds: Rect<f64>) -> Self {
        self.spatial_filter = Some(bounds);
        self
    }

    /// Apply pagination.
    #[must_use]
    pub const fn paged(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// Whether pagination was requested.
    #[must_use]
    pub const fn is_paged(&self) -> bool {
        self.limit != 0 || self.offset != 0
    }
}

/// Predicate over feature sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSetQuery {
    /// Provider patterns.
    pub providers: Vec<String>,
    /// Type patterns.
    pub types: Vec<String>,
    /// Name patterns.
    pub names: Vec<String>,
    /// Feature set ids.
    pub ids: BTreeSet<i64>,
    /// Only return visible feature sets.
    pub visible_only: bool,
    /// Order by case-insensitive name, ties broken by id. Results are
    /// otherwise ordered by id.
    pub sort_by_name: bool,
    /// Maximum number of results; zero is unlimited.
    pub limit: usize,
    /// Number of leading results to skip.
    pub offset: usize,
}

impl FeatureSetQuery {
    /// Constrain to a name pattern.
    #[must_use]
    pub fn with_name(mut self, pattern: impl Into<String>) -> Self {
        self.names.push(pattern.into());
        self
    }

    /// Constrain to a feature set id.
    #[must_use]
    pub fn with_id(mut self, fsid: i64) -> Self {
        self.ids.insert(fsid);
        self
    }

    /// Constrain to a provider pattern.
    #[must_use]
    pub fn with_provider(mut self, pattern: impl Into<String>) -> Self {
        self.providers.push(pattern.into());
        self
    }

    /// Constrain to a type pattern.
    #[must_use]
    pub fn with_type(mut self, pattern: impl Into<String>) -> Self {
        self.types.push(pattern.into());
        self
    }

    /// Only return visible feature sets.
    #[must_use]
    pub const fn visible_only(mut self) -> Self {
        self.visible_only = true;
        self
    }

    /// Order results by name.
    #[must_use]
    pub const fn sorted_by_name(mut self) -> Self {
        self.sort_by_name = true;
        self
    }

    /// Apply pagination.
    #[must_use]
    pub const fn paged(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

/// Apply `offset` then `limit` (zero is unlimited) to an item count.
#[must_use]
pub fn paged_count(total: usize, limit: usize, offset: usize) -> usize {
    let remaining = total.saturating_sub(offset);
    if limit == 0 {
        remaining
    } else {
        remaining.min(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(10, 0, 0, 10)]
    #[case(10, 5, 0, 5)]
    #[case(10, 5, 7, 3)]
    #[case(10, 0, 12, 0)]
    fn paged_counts(
        #[case] total: usize,
        #[case] limit: usize,
        #[case] offset: usize,
        #[case] expected: usize,
    ) {
        assert_eq!(paged_count(total, limit, offset), expected);
    }

    #[rstest]
    fn builders_accumulate_constraints() {
        let query = FeatureQuery::default()
            .with_feature_set_name("roads")
            .with_feature_id(9)
            .paged(5, 2);
        assert_eq!(query.feature_set_names, vec![String::from("roads")]);
        assert!(query.feature_ids.contains(&9));
        assert!(query.is_paged());
        assert!(!FeatureQuery::default().is_paged());
    }
}
