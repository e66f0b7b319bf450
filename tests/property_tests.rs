//! Property-based tests for catalog paging, grouping and form parsing.
//!
//! These tests use proptest to verify invariants across a wide range of inputs,
//! helping to catch edge cases that unit tests might miss.

use std::collections::BTreeSet;

use catalog_api::services::catalog::{
    grouping::{group_by_key, group_by_variant},
    PageInfo, PageResolution, VariantSelection,
};
use catalog_api::entities::product_variant;
use chrono::Utc;
use proptest::prelude::*;

// Strategies for generating test data
fn raw_page_strategy() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        (0u64..50).prop_map(|n| Some(n.to_string())),
        "[a-z0-9.\\- ]{0,6}".prop_map(Some),
        Just(Some("99999999999999999999999999".to_string())),
    ]
}

fn product_variant_strategy() -> impl Strategy<Value = Vec<product_variant::Model>> {
    prop::collection::vec(1i32..6, 0..40).prop_map(|variant_ids| {
        let now = Utc::now();
        variant_ids
            .into_iter()
            .enumerate()
            .map(|(i, variant_id)| product_variant::Model {
                id: i as i32 + 1,
                title: format!("value-{i}"),
                description: None,
                active: true,
                variant_id,
                product_id: 1,
                created_at: now,
                updated_at: now,
            })
            .collect()
    })
}

// Property: every resolved page is a valid position in the result set
proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn resolved_page_is_always_in_range(
        raw in raw_page_strategy(),
        total in 0u64..200,
        per_page in 1u64..20,
    ) {
        let info = PageInfo::resolve(raw.as_deref(), total, per_page);

        prop_assert!(info.page >= 1);
        prop_assert!(info.page <= info.num_pages.max(1));
        prop_assert_eq!(info.num_pages, total.div_ceil(per_page));
        prop_assert_eq!(info.has_next, info.page < info.num_pages);
        prop_assert_eq!(info.has_previous, info.page > 1);

        if total == 0 {
            prop_assert_eq!((info.start_index, info.end_index), (0, 0));
        } else {
            prop_assert!(info.start_index <= info.end_index);
            prop_assert!(info.end_index <= total);
            prop_assert!(info.end_index - info.start_index < per_page);
            prop_assert_eq!(info.offset() + 1, info.start_index);
        }
    }

    #[test]
    fn in_range_pages_are_served_unchanged(total in 1u64..200, per_page in 1u64..20, pick in any::<prop::sample::Index>()) {
        let num_pages = total.div_ceil(per_page);
        let page = pick.index(num_pages as usize) as u64 + 1;

        let info = PageInfo::resolve(Some(&page.to_string()), total, per_page);
        prop_assert_eq!(info.page, page);
        prop_assert_eq!(info.resolution, PageResolution::ValidPage);
    }

    #[test]
    fn pages_cover_every_item_exactly_once(total in 0u64..120, per_page in 1u64..15) {
        let num_pages = total.div_ceil(per_page);
        let mut covered = 0;
        for page in 1..=num_pages {
            let info = PageInfo::resolve(Some(&page.to_string()), total, per_page);
            covered += info.end_index - info.start_index + 1;
        }
        prop_assert_eq!(covered, total);
    }
}

// Property: grouping is a stable partition of its input
proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn grouping_partitions_records_by_variant(records in product_variant_strategy()) {
        let input_len = records.len();
        let expected_keys: BTreeSet<i32> = records.iter().map(|r| r.variant_id).collect();

        let groups = group_by_variant(records);

        prop_assert_eq!(groups.keys().copied().collect::<BTreeSet<_>>(), expected_keys);
        prop_assert_eq!(groups.values().map(Vec::len).sum::<usize>(), input_len);

        for (variant_id, members) in &groups {
            prop_assert!(!members.is_empty());
            prop_assert!(members.iter().all(|m| m.variant_id == *variant_id));
            // Input order survives inside each group
            prop_assert!(members.windows(2).all(|w| w[0].id < w[1].id));
        }
    }

    #[test]
    fn grouping_by_key_matches_a_naive_bucketing(values in prop::collection::vec(0u8..8, 0..60)) {
        let indexed: Vec<(usize, u8)> = values.iter().copied().enumerate().collect();
        let groups = group_by_key(indexed.clone(), |(_, v)| *v);

        for (key, members) in groups {
            let naive: Vec<(usize, u8)> = indexed.iter().copied().filter(|(_, v)| *v == key).collect();
            prop_assert_eq!(members, naive);
        }
    }
}

// Property: form parsing only ever selects integer variant_group_* values
proptest! {
    #[test]
    fn selection_ignores_foreign_and_non_numeric_fields(
        fields in prop::collection::vec(
            (prop_oneof!["variant_group_[0-9]", "[a-z_]{1,8}"], "[0-9a-z ]{0,4}"),
            0..12,
        )
    ) {
        let pairs: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let selection = VariantSelection::from_form(pairs.iter().copied());

        let expected: BTreeSet<i32> = pairs
            .iter()
            .filter(|(k, _)| k.starts_with("variant_group_"))
            .filter_map(|(_, v)| v.trim().parse::<i32>().ok())
            .collect();
        prop_assert_eq!(&selection.variant_ids, &expected);
        prop_assert_eq!(selection.is_empty(), expected.is_empty());
    }
}
