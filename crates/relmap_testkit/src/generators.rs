//! Property-based test generators using proptest.
//!
//! Provides strategies for generating entity batches with the key
//! properties reconciliation tests rely on.

use crate::fixtures::{Person, Sample};
use proptest::prelude::*;
use relmap_core::{DatabaseAction, QueryRule, Value};

/// Strategy for generating short lowercase names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,6}").expect("Invalid regex")
}

/// Strategy for generating a sample with a key drawn from a small space,
/// so that batches collide often.
pub fn sample_strategy() -> impl Strategy<Value = Sample> {
    (
        prop::sample::select(vec!["A", "B", "C"]),
        prop::sample::select(vec!["x", "y", "z", "w"]),
        prop::option::of(0i64..100),
    )
        .prop_map(|(investigation, name, extra)| Sample {
            extra,
            ..Sample::new(investigation, name)
        })
}

/// Strategy for generating samples with pairwise distinct
/// `(investigation, name)` keys.
pub fn distinct_samples_strategy(
    min: usize,
    max: usize,
) -> impl Strategy<Value = Vec<Sample>> {
    prop::collection::btree_map((name_strategy(), name_strategy()), 0i64..1000, min..max)
        .prop_map(|entries| {
            entries
                .into_iter()
                .map(|((investigation, name), extra)| {
                    Sample::new(&investigation, &name).with_extra(extra)
                })
                .collect()
        })
}

/// Strategy for generating people with distinct names.
pub fn distinct_people_strategy(min: usize, max: usize) -> impl Strategy<Value = Vec<Person>> {
    prop::collection::btree_map(name_strategy(), 0i64..120, min..max).prop_map(|entries| {
        entries
            .into_iter()
            .map(|(name, age)| Person::new(&name, age))
            .collect()
    })
}

/// Strategy for generating any database action.
pub fn action_strategy() -> impl Strategy<Value = DatabaseAction> {
    prop::sample::select(DatabaseAction::ALL.to_vec())
}

/// Strategy for generating simple comparison rules over `Person` fields.
pub fn person_rule_strategy() -> impl Strategy<Value = QueryRule> {
    prop_oneof![
        name_strategy().prop_map(|n| QueryRule::equals("name", n)),
        name_strategy().prop_map(|n| QueryRule::not_equals("name", n)),
        (0i64..120).prop_map(|a| QueryRule::less("age", a)),
        (0i64..120).prop_map(|a| QueryRule::greater_equal("age", a)),
        Just(QueryRule::equals("age", Value::Null)),
    ]
}

/// Case and shrink limits for the property tests of this workspace.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl PropTestConfig {
    /// Few cases, for suites that drive a whole database per case.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn distinct_samples_have_distinct_keys(samples in distinct_samples_strategy(1, 20)) {
            let keys: BTreeSet<_> = samples
                .iter()
                .map(|s| (s.investigation.clone(), s.name.clone()))
                .collect();
            prop_assert_eq!(keys.len(), samples.len());
        }

        #[test]
        fn generated_samples_are_unsaved(sample in sample_strategy()) {
            prop_assert!(sample.id.is_none());
            prop_assert!(sample.name.is_some());
        }
    }
}
