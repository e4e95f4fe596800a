//! JSON content parser used by the `tessera` binary.
//!
//! A source document lists feature sets and their features, with geometry
//! in GeoJSON's `type`/`coordinates` shape:
//!
//! ```json
//! {
//!   "provider": "survey",
//!   "type": "json",
//!   "feature_sets": [
//!     {
//!       "name": "stops",
//!       "features": [
//!         {
//!           "name": "market square",
//!           "geometry": {"type": "Point", "coordinates": [-0.12, 51.5]},
//!           "attributes": {"operator": "metro", "platforms": 2}
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Non-string attribute values are stored as their JSON text.

use std::collections::BTreeMap;
use std::io::BufReader;

use camino::Utf8Path;
use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tessera_core::{
    Attributes, ContentFeature, ContentFeatureSet, ContentParser, ContentSource,
    FeatureDefinition, FeatureStoreError, ParserStamp, Result,
};

/// Registry name of [`JsonContentParser`], also accepted as a parse hint.
pub const JSON_PARSER_NAME: &str = "json";

/// Version recorded in fingerprints of JSON sources.
pub const JSON_PARSE_VERSION: i16 = 1;

const JSON_EXTENSION: &str = "json";

/// Parser for `.json` source documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonContentParser;

impl ContentParser for JsonContentParser {
    fn name(&self) -> &str {
        JSON_PARSER_NAME
    }

    fn parse_version(&self) -> i16 {
        JSON_PARSE_VERSION
    }

    fn parse(&self, path: &Utf8Path) -> Result<Option<Box<dyn ContentSource>>> {
        let accepted = path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case(JSON_EXTENSION));
        if !accepted {
            return Ok(None);
        }
        let document = read_document(path)?;
        debug!(
            "parsed {} feature sets from {path}",
            document.feature_sets.len()
        );
        Ok(Some(Box::new(JsonContentSource::new(document))))
    }
}

fn read_document(path: &Utf8Path) -> Result<SourceDocument> {
    let file = tessera_fs::open_utf8_file(path).map_err(|source| FeatureStoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|err| FeatureStoreError::Content {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct SourceDocument {
    #[serde(default)]
    provider: Option<String>,
    #[serde(default, rename = "type")]
    content_type: Option<String>,
    #[serde(default)]
    feature_sets: Vec<FeatureSetDocument>,
}

#[derive(Debug, Deserialize)]
struct FeatureSetDocument {
    name: String,
    #[serde(default = "visible_by_default")]
    visible: bool,
    #[serde(default)]
    min_resolution: f64,
    #[serde(default)]
    max_resolution: f64,
    #[serde(default)]
    features: Vec<FeatureDocument>,
}

#[derive(Debug, Deserialize)]
struct FeatureDocument {
    name: String,
    geometry: GeometryDocument,
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
    #[serde(default)]
    style: Option<String>,
    #[serde(default = "visible_by_default")]
    visible: bool,
}

const fn visible_by_default() -> bool {
    true
}

impl FeatureDocument {
    fn into_content(self) -> ContentFeature {
        let attributes: Attributes = self
            .attributes
            .into_iter()
            .map(|(key, value)| (key, attribute_text(value)))
            .collect();
        ContentFeature {
            definition: FeatureDefinition {
                name: self.name,
                geometry: self.geometry.into(),
                attributes,
                style: self.style,
            },
            visible: self.visible,
        }
    }
}

fn attribute_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

/// `[x, y]` pair, longitude first.
pub type Position = [f64; 2];

/// GeoJSON-shaped geometry accepted in sources and printed by `features`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum GeometryDocument {
    /// A single position.
    Point(Position),
    /// An open or closed path.
    LineString(Vec<Position>),
    /// Exterior ring followed by any holes.
    Polygon(Vec<Vec<Position>>),
    /// Unconnected positions.
    MultiPoint(Vec<Position>),
    /// Several paths.
    MultiLineString(Vec<Vec<Position>>),
    /// Several polygons.
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl GeometryDocument {
    /// Describe `geometry`, or `None` for geometry collections, which have
    /// no `coordinates` form.
    #[must_use]
    pub fn from_geometry(geometry: &Geometry<f64>) -> Option<Self> {
        let document = match geometry {
            Geometry::Point(point) => Self::Point(position(point.0)),
            Geometry::Line(line) => Self::LineString(vec![position(line.start), position(line.end)]),
            Geometry::LineString(line) => Self::LineString(positions(line)),
            Geometry::Polygon(polygon) => Self::Polygon(rings(polygon)),
            Geometry::MultiPoint(points) => {
                Self::MultiPoint(points.iter().map(|point| position(point.0)).collect())
            }
            Geometry::MultiLineString(lines) => {
                Self::MultiLineString(lines.iter().map(positions).collect())
            }
            Geometry::MultiPolygon(polygons) => {
                Self::MultiPolygon(polygons.iter().map(rings).collect())
            }
            Geometry::Rect(rect) => Self::Polygon(rings(&rect.to_polygon())),
            Geometry::Triangle(triangle) => Self::Polygon(rings(&triangle.to_polygon())),
            Geometry::GeometryCollection(_) => return None,
        };
        Some(document)
    }
}

impl From<GeometryDocument> for Geometry<f64> {
    fn from(document: GeometryDocument) -> Self {
        match document {
            GeometryDocument::Point(at) => Self::Point(Point(coord(at))),
            GeometryDocument::LineString(path) => Self::LineString(line_string(path)),
            GeometryDocument::Polygon(path) => Self::Polygon(polygon(path)),
            GeometryDocument::MultiPoint(path) => Self::MultiPoint(MultiPoint(
                path.into_iter().map(|at| Point(coord(at))).collect(),
            )),
            GeometryDocument::MultiLineString(paths) => Self::MultiLineString(MultiLineString(
                paths.into_iter().map(line_string).collect(),
            )),
            GeometryDocument::MultiPolygon(shapes) => {
                Self::MultiPolygon(MultiPolygon(shapes.into_iter().map(polygon).collect()))
            }
        }
    }
}

const fn coord([x, y]: Position) -> Coord<f64> {
    Coord { x, y }
}

const fn position(at: Coord<f64>) -> Position {
    [at.x, at.y]
}

fn line_string(path: Vec<Position>) -> LineString<f64> {
    LineString(path.into_iter().map(coord).collect())
}

fn polygon(path: Vec<Vec<Position>>) -> Polygon<f64> {
    let mut lines = path.into_iter().map(line_string);
    let exterior = lines.next().unwrap_or_else(|| LineString(Vec::new()));
    Polygon::new(exterior, lines.collect())
}

fn positions(line: &LineString<f64>) -> Vec<Position> {
    line.coords().copied().map(position).collect()
}

fn rings(shape: &Polygon<f64>) -> Vec<Vec<Position>> {
    std::iter::once(shape.exterior())
        .chain(shape.interiors())
        .map(positions)
        .collect()
}

struct JsonContentSource {
    provider: String,
    content_type: String,
    feature_sets: std::vec::IntoIter<FeatureSetDocument>,
    features: std::vec::IntoIter<FeatureDocument>,
}

impl JsonContentSource {
    fn new(document: SourceDocument) -> Self {
        Self {
            provider: document
                .provider
                .unwrap_or_else(|| JSON_PARSER_NAME.to_owned()),
            content_type: document
                .content_type
                .unwrap_or_else(|| JSON_EXTENSION.to_owned()),
            feature_sets: document.feature_sets.into_iter(),
            features: Vec::new().into_iter(),
        }
    }
}

impl ContentSource for JsonContentSource {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn parse_version(&self) -> i16 {
        JSON_PARSE_VERSION
    }

    fn parsers(&self) -> Vec<ParserStamp> {
        vec![ParserStamp {
            name: JSON_PARSER_NAME.to_owned(),
            parse_version: JSON_PARSE_VERSION,
        }]
    }

    fn next_feature_set(&mut self) -> Result<Option<ContentFeatureSet>> {
        let Some(next) = self.feature_sets.next() else {
            self.features = Vec::new().into_iter();
            return Ok(None);
        };
        let FeatureSetDocument {
            name,
            visible,
            min_resolution,
            max_resolution,
            features,
        } = next;
        self.features = features.into_iter();
        Ok(Some(ContentFeatureSet {
            name,
            visible,
            min_resolution,
            max_resolution,
        }))
    }

    fn next_feature(&mut self) -> Result<Option<ContentFeature>> {
        Ok(self.features.next().map(FeatureDocument::into_content))
    }
}
