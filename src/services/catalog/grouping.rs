use std::collections::BTreeMap;

use crate::entities::product_variant;

/// ProductVariant records keyed by the Variant they belong to
pub type VariantGroups = BTreeMap<i32, Vec<product_variant::Model>>;

/// Stable-sorts `items` by `key` and splits them into contiguous runs.
///
/// Items sharing a key keep their input order inside the run.
pub fn group_by_key<T, K, F>(mut items: Vec<T>, key: F) -> BTreeMap<K, Vec<T>>
where
    K: Ord + Copy,
    F: Fn(&T) -> K,
{
    items.sort_by_key(&key);

    let mut groups: BTreeMap<K, Vec<T>> = BTreeMap::new();
    let mut current: Option<(K, Vec<T>)> = None;

    for item in items {
        let k = key(&item);
        if let Some((run_key, run)) = current.as_mut() {
            if *run_key == k {
                run.push(item);
                continue;
            }
        }
        if let Some((run_key, run)) = current.replace((k, vec![item])) {
            groups.insert(run_key, run);
        }
    }
    if let Some((run_key, run)) = current {
        groups.insert(run_key, run);
    }

    groups
}

/// Groups every ProductVariant by its `variant_id`.
pub fn group_by_variant(records: Vec<product_variant::Model>) -> VariantGroups {
    group_by_key(records, |record| record.variant_id)
}
