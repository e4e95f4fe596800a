//! Row encodings: geometry as `bincode`, attributes as JSON text.

use geo::{BoundingRect, Geometry};
use rusqlite::Row;
use tessera_core::{Attributes, Feature, FeatureSet};

use crate::FeatureDatabaseError;

/// Columns read by [`feature_from_row`], prefixed with the `features` alias.
pub(crate) const FEATURE_COLUMNS: &str =
    "f.fid, f.fsid, f.name, f.geometry, f.attributes, f.style, f.version";

/// Columns read by [`feature_set_from_row`].
pub(crate) const FEATURE_SET_COLUMNS: &str =
    "id, name, provider, type, min_resolution, max_resolution, version";

/// Encoded geometry with its bounding box columns.
pub(crate) struct EncodedGeometry {
    pub(crate) blob: Vec<u8>,
    pub(crate) min_x: Option<f64>,
    pub(crate) min_y: Option<f64>,
    pub(crate) max_x: Option<f64>,
    pub(crate) max_y: Option<f64>,
}

pub(crate) fn encode_geometry(
    geometry: &Geometry<f64>,
) -> Result<EncodedGeometry, FeatureDatabaseError> {
    let blob = bincode::serialize(geometry)
        .map_err(|source| FeatureDatabaseError::EncodeGeometry { source })?;
    let bounds = geometry.bounding_rect();
    Ok(EncodedGeometry {
        blob,
        min_x: bounds.map(|rect| rect.min().x),
        min_y: bounds.map(|rect| rect.min().y),
        max_x: bounds.map(|rect| rect.max().x),
        max_y: bounds.map(|rect| rect.max().y),
    })
}

pub(crate) fn encode_attributes(attributes: &Attributes) -> Result<String, FeatureDatabaseError> {
    serde_json::to_string(attributes)
        .map_err(|source| FeatureDatabaseError::Attributes { fid: None, source })
}

pub(crate) fn feature_from_row(row: &Row<'_>) -> Result<Feature, FeatureDatabaseError> {
    let id: i64 = row.get(0)?;
    let blob: Vec<u8> = row.get(3)?;
    let attributes_json: String = row.get(4)?;
    let geometry = bincode::deserialize(&blob)
        .map_err(|source| FeatureDatabaseError::DecodeGeometry { fid: id, source })?;
    let attributes = serde_json::from_str(&attributes_json).map_err(|source| {
        FeatureDatabaseError::Attributes {
            fid: Some(id),
            source,
        }
    })?;
    Ok(Feature {
        id,
        feature_set_id: row.get(1)?,
        name: row.get(2)?,
        geometry,
        attributes,
        style: row.get(5)?,
        version: row.get(6)?,
    })
}

pub(crate) fn feature_set_from_row(row: &Row<'_>) -> rusqlite::Result<FeatureSet> {
    Ok(FeatureSet {
        id: row.get(0)?,
        name: row.get(1)?,
        provider: row.get(2)?,
        feature_type: row.get(3)?,
        min_resolution: row.get(4)?,
        max_resolution: row.get(5)?,
        version: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Point};
    use rstest::rstest;

    #[rstest]
    fn line_geometry_records_bounds() {
        let line = Geometry::LineString(LineString::from(vec![(1.0, 2.0), (3.0, -1.0)]));
        let encoded = encode_geometry(&line).expect("encode");
        assert_eq!(encoded.min_x, Some(1.0));
        assert_eq!(encoded.min_y, Some(-1.0));
        assert_eq!(encoded.max_x, Some(3.0));
        assert_eq!(encoded.max_y, Some(2.0));
        let decoded: Geometry<f64> = bincode::deserialize(&encoded.blob).expect("decode");
        assert_eq!(decoded, line);
    }

    #[rstest]
    fn point_geometry_has_degenerate_bounds() {
        let encoded = encode_geometry(&Geometry::Point(Point::new(4.0, 5.0))).expect("encode");
        assert_eq!(encoded.min_x, encoded.max_x);
        assert_eq!(encoded.min_y, Some(5.0));
    }
}
