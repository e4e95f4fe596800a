//! Cursors presenting child store results as one federated result set.

use std::collections::BTreeSet;
use std::iter::Peekable;
use std::sync::Arc;

use log::warn;
use tessera_core::{Feature, FeatureCursor, FederatedId};

use crate::SharedDatabase;

/// Re-encodes one child store's local feature ids as federated ids.
///
/// Holds a reference to the child store so a concurrent removal cannot
/// delete its file mid-iteration.
pub(crate) struct FederatedCursor {
    inner: FeatureCursor,
    exact_ids: Option<BTreeSet<i64>>,
    _database: Arc<SharedDatabase>,
}

impl FederatedCursor {
    pub(crate) fn new(
        inner: FeatureCursor,
        exact_ids: Option<BTreeSet<i64>>,
        database: Arc<SharedDatabase>,
    ) -> Self {
        Self {
            inner,
            exact_ids,
            _database: database,
        }
    }
}

impl Iterator for FederatedCursor {
    type Item = Feature;

    fn next(&mut self) -> Option<Feature> {
        loop {
            let mut feature = self.inner.next()?;
            let id = match FederatedId::encode(feature.feature_set_id, feature.id) {
                Ok(id) => id.raw(),
                Err(err) => {
                    warn!("skipping unroutable feature {}: {err}", feature.id);
                    continue;
                }
            };
            if self.exact_ids.as_ref().is_some_and(|ids| !ids.contains(&id)) {
                continue;
            }
            feature.id = id;
            return Some(feature);
        }
    }
}

/// Merges per-store cursors, each ordered by federated id, into one ordered
/// stream.
pub(crate) struct MergedCursor {
    heads: Vec<Peekable<FederatedCursor>>,
}

impl MergedCursor {
    pub(crate) fn new(parts: Vec<FederatedCursor>) -> Self {
        Self {
            heads: parts.into_iter().map(Iterator::peekable).collect(),
        }
    }
}

impl Iterator for MergedCursor {
    type Item = Feature;

    fn next(&mut self) -> Option<Feature> {
        let mut lowest: Option<(usize, i64)> = None;
        for (index, head) in self.heads.iter_mut().enumerate() {
            if let Some(feature) = head.peek() {
                if lowest.is_none_or(|(_, id)| feature.id < id) {
                    lowest = Some((index, feature.id));
                }
            }
        }
        let (index, _) = lowest?;
        self.heads.get_mut(index)?.next()
    }
}

/// Merge `parts`, applying `paging` (limit, offset) to the merged stream.
pub(crate) fn merge(parts: Vec<FederatedCursor>, paging: Option<(usize, usize)>) -> FeatureCursor {
    let merged = MergedCursor::new(parts);
    match paging {
        None => Box::new(merged),
        Some((0, offset)) => Box::new(merged.skip(offset)),
        Some((limit, offset)) => Box::new(merged.skip(offset).take(limit)),
    }
}
