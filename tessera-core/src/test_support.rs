//! Test-only content producers and currencies used by unit and behaviour
//! tests across the workspace.

use std::sync::{Arc, Barrier};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use camino::Utf8Path;
use geo::{Geometry, Point};
use parking_lot::Mutex;

use crate::{
    ContentFeature, ContentFeatureSet, ContentParser, ContentSource, Currency, FeatureDefinition,
    FeatureStoreError, Result,
};

/// Feature set fixture yielded by [`VecContentParser`].
#[derive(Debug, Clone, PartialEq)]
pub struct VecFeatureSet {
    /// Header returned by `next_feature_set`.
    pub header: ContentFeatureSet,
    /// Features returned by `next_feature`.
    pub features: Vec<ContentFeature>,
    /// Fail with a content error once this many features were yielded.
    pub fail_after: Option<usize>,
}

impl VecFeatureSet {
    /// Feature set of `count` visible points named `<name>-<n>` laid out
    /// along the x axis.
    #[must_use]
    pub fn points(name: &str, count: u32) -> Self {
        let features = (0..count)
            .map(|index| ContentFeature {
                definition: FeatureDefinition::new(
                    format!("{name}-{index}"),
                    Geometry::Point(Point::new(f64::from(index), 0.0)),
                )
                .with_attribute("index", index.to_string()),
                visible: true,
            })
            .collect();
        Self {
            header: ContentFeatureSet::named(name),
            features,
            fail_after: None,
        }
    }

    /// Make the producer fail after `count` features of this set.
    #[must_use]
    pub const fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Mark the whole set hidden.
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.header.visible = false;
        self
    }

    /// Override the resolution range.
    #[must_use]
    pub const fn with_resolution(mut self, min_resolution: f64, max_resolution: f64) -> Self {
        self.header.min_resolution = min_resolution;
        self.header.max_resolution = max_resolution;
        self
    }
}

/// In-memory [`ContentParser`] accepting paths with a given file name.
#[derive(Debug)]
pub struct VecContentParser {
    name: String,
    file_name: String,
    content_type: String,
    parse_version: i16,
    feature_sets: Mutex<Vec<VecFeatureSet>>,
    parse_count: Arc<AtomicUsize>,
    delay: Option<Duration>,
    pause: Option<(usize, Arc<Barrier>)>,
}

impl VecContentParser {
    /// Parser named `name` accepting files called `file_name`.
    pub fn new(name: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_name: file_name.into(),
            content_type: String::from("vec"),
            parse_version: 1,
            feature_sets: Mutex::new(Vec::new()),
            parse_count: Arc::new(AtomicUsize::new(0)),
            delay: None,
            pause: None,
        }
    }

    /// Append a feature set to the produced content.
    #[must_use]
    pub fn with_feature_set(self, feature_set: VecFeatureSet) -> Self {
        self.feature_sets.lock().push(feature_set);
        self
    }

    /// Override the reported parse version.
    #[must_use]
    pub const fn with_parse_version(mut self, version: i16) -> Self {
        self.parse_version = version;
        self
    }

    /// Sleep for `delay` before yielding each feature set.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Once `count` features were yielded by a parse, wait on `barrier`
    /// twice: first to tell the test the copy is under way, then until the
    /// test lets it continue.
    #[must_use]
    pub fn pausing_after(mut self, count: usize, barrier: Arc<Barrier>) -> Self {
        self.pause = Some((count, barrier));
        self
    }

    /// Replace the feature sets produced by later parses.
    pub fn replace_feature_sets(&self, feature_sets: Vec<VecFeatureSet>) {
        *self.feature_sets.lock() = feature_sets;
    }

    /// Number of successful parses so far.
    #[must_use]
    pub fn parse_count(&self) -> usize {
        self.parse_count.load(Ordering::SeqCst)
    }
}

impl ContentParser for VecContentParser {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse_version(&self) -> i16 {
        self.parse_version
    }

    fn parse(&self, path: &Utf8Path) -> Result<Option<Box<dyn ContentSource>>> {
        if path.file_name() != Some(self.file_name.as_str()) {
            return Ok(None);
        }
        self.parse_count.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Box::new(VecContentSource {
            provider: self.name.clone(),
            content_type: self.content_type.clone(),
            parse_version: self.parse_version,
            path: path.to_string(),
            feature_sets: self.feature_sets.lock().clone().into_iter(),
            current: None,
            delay: self.delay,
            pause: self.pause.clone(),
            yielded_total: 0,
        })))
    }
}

#[derive(Debug)]
struct VecContentSource {
    provider: String,
    content_type: String,
    parse_version: i16,
    path: String,
    feature_sets: std::vec::IntoIter<VecFeatureSet>,
    current: Option<(std::vec::IntoIter<ContentFeature>, usize, Option<usize>)>,
    delay: Option<Duration>,
    pause: Option<(usize, Arc<Barrier>)>,
    yielded_total: usize,
}

impl ContentSource for VecContentSource {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn parse_version(&self) -> i16 {
        self.parse_version
    }

    fn next_feature_set(&mut self) -> Result<Option<ContentFeatureSet>> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let Some(next) = self.feature_sets.next() else {
            self.current = None;
            return Ok(None);
        };
        self.current = Some((next.features.into_iter(), 0, next.fail_after));
        Ok(Some(next.header))
    }

    fn next_feature(&mut self) -> Result<Option<ContentFeature>> {
        let Some((features, yielded, fail_after)) = self.current.as_mut() else {
            return Ok(None);
        };
        if fail_after.is_some_and(|limit| *yielded >= limit) {
            return Err(FeatureStoreError::Content {
                path: self.path.clone().into(),
                message: String::from("simulated producer failure"),
            });
        }
        *yielded += 1;
        let next = features.next();
        self.yielded_total += 1;
        if let Some((_, barrier)) = self
            .pause
            .take_if(|(count, _)| *count == self.yielded_total)
        {
            barrier.wait();
            barrier.wait();
        }
        Ok(next)
    }
}

/// Currency whose validation always reports stale content.
#[derive(Debug, Clone)]
pub struct AlwaysStaleCurrency {
    name: String,
}

impl AlwaysStaleCurrency {
    /// Currency registered under `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Currency for AlwaysStaleCurrency {
    fn name(&self) -> &str {
        &self.name
    }

    fn app_version(&self) -> i32 {
        1
    }

    fn fingerprint(&self, _path: &Utf8Path) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn is_valid(&self, _path: &Utf8Path, _version: i32, _fingerprint: &[u8]) -> Result<bool> {
        Ok(false)
    }
}
