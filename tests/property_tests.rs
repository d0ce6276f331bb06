//! Property-Based Tests for phasebook
//!
//! Uses proptest for the invariants of list splitting, option merging and
//! placeholder resolution.

use std::collections::{BTreeSet, HashMap};

use phasebook::options::{OptionGroup, OptionTable};
use phasebook::validate::is_admissible;
use phasebook::{Placeholders, ValidationPolicy, split_list};
use proptest::prelude::*;

// =============================================================================
// Comma-separated lists
// =============================================================================

proptest! {
    /// No element keeps surrounding whitespace
    #[test]
    fn split_list_elements_are_trimmed(s in "[a-z ,\t]{0,40}") {
        for item in split_list(&s) {
            prop_assert_eq!(item.trim(), item.as_str());
        }
    }

    /// Joining names with padded commas and splitting gives the names back
    #[test]
    fn split_list_recovers_names(names in prop::collection::vec("[a-z][a-z0-9_]{0,8}", 1..6)) {
        let declared = names.join(" ,  ");
        prop_assert_eq!(split_list(&declared), names);
    }
}

// =============================================================================
// Validation
// =============================================================================

proptest! {
    /// Strict validation ignores declaration order
    #[test]
    fn strict_is_order_insensitive(names in prop::collection::btree_set("[a-z]{1,6}", 0..6)) {
        let discovered: BTreeSet<String> = names.clone();
        let mut declared: Vec<String> = names.into_iter().collect();
        declared.reverse();
        prop_assert!(is_admissible(&declared, &discovered, ValidationPolicy::Strict));
    }

    /// Anything strict accepts, subset accepts too
    #[test]
    fn strict_implies_subset(
        declared in prop::collection::vec("[a-c]", 0..5),
        discovered in prop::collection::btree_set("[a-c]", 0..4),
    ) {
        if is_admissible(&declared, &discovered, ValidationPolicy::Strict) {
            prop_assert!(is_admissible(&declared, &discovered, ValidationPolicy::Subset));
        }
    }
}

// =============================================================================
// Option merging
// =============================================================================

fn single(options: Vec<String>) -> OptionTable {
    let mut table = OptionTable::new();
    table.insert(OptionGroup::Phase("g".into()), options);
    table
}

proptest! {
    /// Merging a shared group keeps first occurrences, in order, without duplicates
    #[test]
    fn merge_dedups_keeping_first_occurrence(
        inline in prop::collection::vec("[a-d]", 0..6),
        file in prop::collection::vec("[a-d]", 0..6),
    ) {
        let merged = OptionTable::merge(single(inline.clone()), single(file.clone()));
        let mut expected: Vec<String> = Vec::new();
        for option in inline.iter().chain(file.iter()) {
            if !expected.contains(option) {
                expected.push(option.clone());
            }
        }
        prop_assert_eq!(merged.phase_options("g"), expected.as_slice());
    }
}

// =============================================================================
// Placeholders
// =============================================================================

proptest! {
    /// Strings without the placeholder opener are returned unchanged
    #[test]
    fn resolve_is_identity_without_placeholders(s in "[^%]{0,60}") {
        let placeholders = Placeholders::new(
            HashMap::from([("HOME".to_string(), "/root".to_string())]),
            HashMap::new(),
        );
        prop_assert_eq!(placeholders.resolve(&s), s);
    }

    /// Unknown secrets are left verbatim wherever they appear
    #[test]
    fn unknown_secret_left_verbatim(prefix in "[a-z =-]{0,10}", key in "[A-Z_]{1,10}") {
        let input = format!("{}%[[ secrets.{} ]]", prefix, key);
        prop_assert_eq!(Placeholders::default().resolve(&input), input);
    }
}
