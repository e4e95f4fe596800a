//! Feature and feature set value types.

use std::collections::BTreeMap;

use geo::{BoundingRect, Geometry, Rect};

/// Free-form key/value attributes attached to a feature.
pub type Attributes = BTreeMap<String, String>;

/// Everything needed to create a feature, before any store assigns it an id.
///
/// # Examples
///
/// ```
/// use geo::{Geometry, Point};
/// use tessera_core::FeatureDefinition;
///
/// let definition = FeatureDefinition::new("bus stop", Geometry::Point(Point::new(1.0, 2.0)))
///     .with_attribute("operator", "metro");
/// assert_eq!(definition.attributes.get("operator").map(String::as_str), Some("metro"));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureDefinition {
    /// Display name.
    pub name: String,
    /// Geometry in WGS84 (`x = longitude`, `y = latitude`).
    pub geometry: Geometry<f64>,
    /// Attribute payload.
    pub attributes: Attributes,
    /// Optional style string, opaque to the stores.
    pub style: Option<String>,
}

impl FeatureDefinition {
    /// Create a definition with no attributes and no style.
    pub fn new(name: impl Into<String>, geometry: Geometry<f64>) -> Self {
        Self {
            name: name.into(),
            geometry,
            attributes: Attributes::new(),
            style: None,
        }
    }

    /// Attach an attribute, replacing any previous value for `key`.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attach a style string.
    #[must_use]
    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    /// Axis-aligned bounds of the geometry, if it has any extent.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }
}

/// A persisted feature as returned by a store query.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Feature {
    /// Identifier within the store that returned it.
    pub id: i64,
    /// Owning feature set.
    pub feature_set_id: i64,
    /// Display name.
    pub name: String,
    /// Geometry in WGS84.
    pub geometry: Geometry<f64>,
    /// Attribute payload.
    pub attributes: Attributes,
    /// Optional style string.
    pub style: Option<String>,
    /// Monotonic version, bumped on every mutation.
    pub version: i64,
}

/// Creation parameters for a feature set.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureSetDefinition {
    /// Display name.
    pub name: String,
    /// Name of the producer that created the content.
    pub provider: String,
    /// Content type, e.g. `kml` or `shp`.
    pub feature_type: String,
    /// Coarsest resolution (metres per pixel) at which the set displays; `0` is unbounded.
    pub min_resolution: f64,
    /// Finest resolution (metres per pixel) at which the set displays; `0` is unbounded.
    pub max_resolution: f64,
    /// Initial visibility.
    pub visible: bool,
}

impl FeatureSetDefinition {
    /// Create a visible definition with unbounded resolution.
    pub fn new(
        name: impl Into<String>,
        provider: impl Into<String>,
        feature_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            feature_type: feature_type.into(),
            min_resolution: 0.0,
            max_resolution: 0.0,
            visible: true,
        }
    }
}

/// A feature set as returned by a store query.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureSet {
    /// Identifier within the store that returned it.
    pub id: i64,
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
    /// Monotonic version, bumped on every mutation.
    pub version: i64,
}

/// Partial update applied to a feature set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSetUpdate {
    /// Replacement name.
    pub name: Option<String>,
    /// Replacement `(min_resolution, max_resolution)` pair.
    pub resolution: Option<(f64, f64)>,
}

impl FeatureSetUpdate {
    /// Whether the update changes anything.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.resolution.is_none()
    }
}

/// Partial update applied to a feature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureUpdate {
    /// Replacement name.
    pub name: Option<String>,
    /// Replacement geometry.
    pub geometry: Option<Geometry<f64>>,
    /// Replacement attribute payload.
    pub attributes: Option<Attributes>,
    /// Replacement style.
    pub style: Option<String>,
}

impl FeatureUpdate {
    /// Whether the update changes anything.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.geometry.is_none()
            && self.attributes.is_none()
            && self.style.is_none()
    }
}

/// Return whether two resolution ranges can display at a common resolution.
///
/// Ranges are `[max_resolution, min_resolution]` in metres per pixel, where a
/// bound of `0` (or any non-positive value) is unbounded on that side.
#[must_use]
pub fn resolution_ranges_overlap(set: (f64, f64), query: (Option<f64>, Option<f64>)) -> bool {
    let (set_min, set_max) = set;
    let (query_min, query_max) = query;
    // The query's finest resolution must not be coarser than the set's coarsest.
    let coarse_ok = match (query_max, set_min > 0.0) {
        (Some(finest), true) => finest <= set_min,
        _ => true,
    };
    // The query's coarsest resolution must not be finer than the set's finest.
    let fine_ok = match (query_min, set_max > 0.0) {
        (Some(coarsest), true) => coarsest >= set_max,
        _ => true,
    };
    coarse_ok && fine_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Point};
    use rstest::rstest;

    #[rstest]
    fn definition_bounds_cover_geometry() {
        let line = LineString::from(vec![(0.0, 0.0), (2.0, 1.0)]);
        let definition = FeatureDefinition::new("path", Geometry::LineString(line));
        let bounds = definition.bounds().expect("line has bounds");
        assert_eq!(bounds.min().x, 0.0);
        assert_eq!(bounds.max().y, 1.0);
    }

    #[rstest]
    fn point_definition_has_degenerate_bounds() {
        let definition = FeatureDefinition::new("stop", Geometry::Point(Point::new(3.0, 4.0)));
        let bounds = definition.bounds().expect("point has bounds");
        assert_eq!(bounds.min(), bounds.max());
    }

    #[rstest]
    #[case((0.0, 0.0), (Some(10.0), Some(1.0)), true)]
    #[case((100.0, 10.0), (Some(50.0), Some(20.0)), true)]
    #[case((100.0, 10.0), (Some(5.0), Some(1.0)), false)]
    #[case((100.0, 10.0), (Some(500.0), Some(200.0)), false)]
    #[case((100.0, 10.0), (None, None), true)]
    fn resolution_overlap_cases(
        #[case] set: (f64, f64),
        #[case] query: (Option<f64>, Option<f64>),
        #[case] expected: bool,
    ) {
        assert_eq!(resolution_ranges_overlap(set, query), expected);
    }

    #[rstest]
    fn empty_updates_report_empty() {
        assert!(FeatureSetUpdate::default().is_empty());
        assert!(FeatureUpdate::default().is_empty());
        let update = FeatureSetUpdate {
            name: Some(String::from("renamed")),
            ..FeatureSetUpdate::default()
        };
        assert!(!update.is_empty());
    }
}
