//! Content producer contracts.
//!
//! Format-specific parsers live outside the store. They hand the store a
//! [`ContentSource`] cursor over feature sets and their features; the store
//! never inspects source bytes itself.

use std::fmt;
use std::sync::Arc;

use camino::Utf8Path;
use parking_lot::RwLock;

use crate::{FeatureDefinition, FeatureStoreError, Result};

/// Name and version of a parser that contributed to some content.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParserStamp {
    /// Registered parser name.
    pub name: String,
    /// Parser version at the time the content was produced.
    pub parse_version: i16,
}

/// Header of the next feature set yielded by a [`ContentSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct ContentFeatureSet {
    /// Feature set name; identity across updates is keyed on it.
    pub name: String,
    /// Initial visibility.
    pub visible: bool,
    /// Coarsest display resolution; `0` is unbounded.
    pub min_resolution: f64,
    /// Finest display resolution; `0` is unbounded.
    pub max_resolution: f64,
}

impl ContentFeatureSet {
    /// Visible header with unbounded resolution.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            min_resolution: 0.0,
            max_resolution: 0.0,
        }
    }
}

/// A feature yielded by a [`ContentSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct ContentFeature {
    /// Feature contents.
    pub definition: FeatureDefinition,
    /// Initial visibility.
    pub visible: bool,
}

/// Cursor over the feature sets and features parsed from one source.
pub trait ContentSource: Send {
    /// Producer name recorded on every feature set.
    fn provider(&self) -> &str;

    /// Content type recorded on every feature set.
    fn content_type(&self) -> &str;

    /// Version of the parser that produced this content.
    fn parse_version(&self) -> i16;

    /// Parsers whose versions the content depends on.
    ///
    /// Defaults to the producing parser alone.
    fn parsers(&self) -> Vec<ParserStamp> {
        vec![ParserStamp {
            name: self.provider().to_owned(),
            parse_version: self.parse_version(),
        }]
    }

    /// Advance to the next feature set, or `None` when exhausted.
    fn next_feature_set(&mut self) -> Result<Option<ContentFeatureSet>>;

    /// Advance to the next feature of the current set, or `None` when the
    /// set is exhausted.
    fn next_feature(&mut self) -> Result<Option<ContentFeature>>;
}

/// Format-specific parser that turns a source path into a [`ContentSource`].
pub trait ContentParser: Send + Sync {
    /// Registry name; also used as the parse hint.
    fn name(&self) -> &str;

    /// Current parser version.
    fn parse_version(&self) -> i16;

    /// Parse `path`, returning `Ok(None)` when the format is not recognised.
    fn parse(&self, path: &Utf8Path) -> Result<Option<Box<dyn ContentSource>>>;
}

/// Ordered registry of content parsers.
#[derive(Default)]
pub struct ContentParsers {
    parsers: RwLock<Vec<Arc<dyn ContentParser>>>,
}

impl fmt::Debug for ContentParsers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .parsers
            .read()
            .iter()
            .map(|parser| parser.name().to_owned())
            .collect();
        f.debug_struct("ContentParsers")
            .field("parsers", &names)
            .finish()
    }
}

impl ContentParsers {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding `parsers` in priority order.
    pub fn with_parsers<I>(parsers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn ContentParser>>,
    {
        Self {
            parsers: RwLock::new(parsers.into_iter().collect()),
        }
    }

    /// Append a parser, replacing any parser with the same name.
    pub fn register(&self, parser: Arc<dyn ContentParser>) {
        let mut parsers = self.parsers.write();
        parsers.retain(|existing| existing.name() != parser.name());
        parsers.push(parser);
    }

    /// Remove the parser registered under `name`.
    pub fn deregister(&self, name: &str) -> Option<Arc<dyn ContentParser>> {
        let mut parsers = self.parsers.write();
        let position = parsers.iter().position(|parser| parser.name() == name)?;
        Some(parsers.remove(position))
    }

    /// Look up a parser by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn ContentParser>> {
        self.parsers
            .read()
            .iter()
            .find(|parser| parser.name() == name)
            .cloned()
    }

    /// Parse `path` with the first parser that accepts it.
    ///
    /// When `hint` is set only the parser with that name (ignoring case) is
    /// consulted.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureStoreError::InvalidArgument`] when no parser accepts
    /// the path, and propagates parser failures unchanged.
    pub fn parse(&self, path: &Utf8Path, hint: Option<&str>) -> Result<Box<dyn ContentSource>> {
        let candidates: Vec<Arc<dyn ContentParser>> = self
            .parsers
            .read()
            .iter()
            .filter(|parser| hint.is_none_or(|name| parser.name().eq_ignore_ascii_case(name)))
            .cloned()
            .collect();

        for parser in candidates {
            if let Some(content) = parser.parse(path)? {
                return Ok(content);
            }
        }
        Err(FeatureStoreError::invalid_argument(format!(
            "no content parser accepts {path}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{VecContentParser, VecFeatureSet};
    use rstest::{fixture, rstest};

    #[fixture]
    fn parsers() -> ContentParsers {
        let roads = VecContentParser::new("roads-parser", "roads.src")
            .with_feature_set(VecFeatureSet::points("roads", 2));
        let rivers = VecContentParser::new("rivers-parser", "rivers.src")
            .with_feature_set(VecFeatureSet::points("rivers", 1));
        ContentParsers::with_parsers([
            Arc::new(roads) as Arc<dyn ContentParser>,
            Arc::new(rivers) as Arc<dyn ContentParser>,
        ])
    }

    #[rstest]
    fn parse_picks_first_accepting_parser(parsers: ContentParsers) {
        let content = parsers
            .parse(Utf8Path::new("/data/rivers.src"), None)
            .expect("rivers parser accepts");
        assert_eq!(content.provider(), "rivers-parser");
    }

    #[rstest]
    fn hint_restricts_candidates(parsers: ContentParsers) {
        let err = parsers
            .parse(Utf8Path::new("/data/rivers.src"), Some("ROADS-PARSER"))
            .err()
            .expect("hinted parser rejects path");
        assert!(matches!(err, FeatureStoreError::InvalidArgument { .. }));
    }

    #[rstest]
    fn register_replaces_and_deregister_removes(parsers: ContentParsers) {
        parsers.register(Arc::new(VecContentParser::new("roads-parser", "other.src")));
        assert!(parsers.lookup("roads-parser").is_some());
        assert!(parsers.deregister("roads-parser").is_some());
        assert!(parsers.lookup("roads-parser").is_none());
    }

    #[rstest]
    fn default_parser_stamp_uses_provider(parsers: ContentParsers) {
        let content = parsers
            .parse(Utf8Path::new("roads.src"), None)
            .expect("roads parser accepts");
        assert_eq!(
            content.parsers(),
            vec![ParserStamp {
                name: String::from("roads-parser"),
                parse_version: 1,
            }]
        );
    }
}
