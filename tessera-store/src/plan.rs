//! Narrowing of federated feature queries into per-store queries.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use camino::Utf8PathBuf;
use tessera_core::{FeatureQuery, FederatedId};

use crate::{RouteEntry, SharedDatabase};

/// One child store and the query it must answer.
#[derive(Debug)]
pub(crate) struct StorePlan {
    pub(crate) database: Arc<SharedDatabase>,
    /// Query in the store's local id space.
    pub(crate) query: FeatureQuery,
    /// Federated ids to keep when local ids are ambiguous within the store.
    pub(crate) exact_ids: Option<BTreeSet<i64>>,
}

/// Per-store dispatch of one federated query.
#[derive(Debug)]
pub(crate) struct FeaturePlan {
    pub(crate) stores: Vec<StorePlan>,
    /// Limit and offset apply to the merged results instead of each store.
    pub(crate) merged_paging: bool,
}

impl FeaturePlan {
    pub(crate) fn needs_exact_ids(&self) -> bool {
        self.stores.iter().any(|store| store.exact_ids.is_some())
    }
}

/// Group the routes that may satisfy `query` by child store.
pub(crate) fn plan_features<'a, I>(routes: I, query: &FeatureQuery) -> FeaturePlan
where
    I: IntoIterator<Item = &'a RouteEntry>,
{
    let mut grouped: BTreeMap<Utf8PathBuf, (Arc<SharedDatabase>, BTreeSet<i64>)> = BTreeMap::new();
    for route in routes {
        if !route.may_match_features(query) {
            continue;
        }
        grouped
            .entry(route.database.path().to_path_buf())
            .or_insert_with(|| (Arc::clone(&route.database), BTreeSet::new()))
            .1
            .insert(route.fsid);
    }

    let mut stores: Vec<StorePlan> = grouped
        .into_values()
        .map(|(database, fsids)| narrow(database, fsids, query))
        .collect();
    let merged_paging =
        query.is_paged() && (stores.len() > 1 || stores.iter().any(|store| store.exact_ids.is_some()));
    if merged_paging {
        for store in &mut stores {
            store.query.limit = 0;
            store.query.offset = 0;
        }
    }
    FeaturePlan {
        stores,
        merged_paging,
    }
}

fn narrow(database: Arc<SharedDatabase>, fsids: BTreeSet<i64>, query: &FeatureQuery) -> StorePlan {
    let owned: BTreeSet<i64> = query
        .feature_ids
        .iter()
        .copied()
        .filter(|fid| fsids.contains(&FederatedId::from_raw(*fid).feature_set_id()))
        .collect();
    let local_ids = owned
        .iter()
        .map(|fid| FederatedId::from_raw(*fid).local_id())
        .collect();
    let exact_ids = (!owned.is_empty() && fsids.len() > 1).then_some(owned);
    StorePlan {
        database,
        query: FeatureQuery {
            providers: Vec::new(),
            types: Vec::new(),
            feature_set_names: Vec::new(),
            feature_set_ids: fsids,
            feature_ids: local_ids,
            ..query.clone()
        },
        exact_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::tests::route;
    use rstest::rstest;

    fn shared_pair() -> Vec<RouteEntry> {
        let roads = route(1, "roads", "osm");
        let mut rivers = route(2, "rivers", "osm");
        rivers.database = Arc::new(SharedDatabase::new(
            "rivers.sqlite",
            Box::new(tessera_fdb::FeatureDatabase::open_in_memory().expect("database")),
        ));
        let mut lakes = route(3, "lakes", "osm");
        lakes.database = Arc::clone(&rivers.database);
        vec![roads, rivers, lakes]
    }

    #[rstest]
    fn routes_sharing_a_store_are_queried_once() {
        let routes = shared_pair();
        let plan = plan_features(&routes, &FeatureQuery::default());
        assert_eq!(plan.stores.len(), 2);
        let fsids: Vec<Vec<i64>> = plan
            .stores
            .iter()
            .map(|store| store.query.feature_set_ids.iter().copied().collect())
            .collect();
        assert!(fsids.contains(&vec![1]));
        assert!(fsids.contains(&vec![2, 3]));
        assert!(!plan.merged_paging);
    }

    #[rstest]
    fn paging_across_stores_moves_to_the_merge() {
        let routes = shared_pair();
        let plan = plan_features(&routes, &FeatureQuery::default().paged(5, 2));
        assert!(plan.merged_paging);
        assert!(plan
            .stores
            .iter()
            .all(|store| store.query.limit == 0 && store.query.offset == 0));
    }

    #[rstest]
    fn paging_within_one_store_stays_with_the_store() {
        let routes = shared_pair();
        let query = FeatureQuery::default().with_feature_set_name("roads").paged(5, 2);
        let plan = plan_features(&routes, &query);
        assert_eq!(plan.stores.len(), 1);
        assert!(!plan.merged_paging);
        assert_eq!(plan.stores.first().map(|store| store.query.limit), Some(5));
        assert!(plan
            .stores
            .first()
            .is_some_and(|store| store.query.feature_set_names.is_empty()));
    }

    #[rstest]
    fn feature_ids_are_projected_to_local_ids() {
        let routes = shared_pair();
        let query = FeatureQuery::default()
            .with_feature_id((1 << 32) | 4)
            .with_feature_id((2 << 32) | 9);
        let plan = plan_features(&routes, &query);
        assert_eq!(plan.stores.len(), 2);
        let roads = plan
            .stores
            .iter()
            .find(|store| store.query.feature_set_ids.contains(&1))
            .expect("roads store");
        assert_eq!(roads.query.feature_ids, BTreeSet::from([4]));
        assert!(roads.exact_ids.is_none());
        let shared = plan
            .stores
            .iter()
            .find(|store| store.query.feature_set_ids.contains(&2))
            .expect("shared store");
        assert_eq!(shared.query.feature_ids, BTreeSet::from([9]));
        assert!(shared.exact_ids.is_none());
        assert!(!plan.needs_exact_ids());
    }

    #[rstest]
    fn ids_spanning_sets_of_one_store_keep_federated_ids() {
        let routes = shared_pair();
        let query = FeatureQuery::default()
            .with_feature_id((2 << 32) | 9)
            .with_feature_id((3 << 32) | 4);
        let plan = plan_features(&routes, &query);
        assert_eq!(plan.stores.len(), 1);
        let shared = plan.stores.first().expect("shared store");
        assert_eq!(shared.query.feature_set_ids, BTreeSet::from([2, 3]));
        assert_eq!(shared.query.feature_ids, BTreeSet::from([4, 9]));
        assert_eq!(
            shared.exact_ids,
            Some(BTreeSet::from([(2 << 32) | 9, (3 << 32) | 4]))
        );
        assert!(plan.needs_exact_ids());
    }
}
