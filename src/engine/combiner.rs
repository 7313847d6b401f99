//! First-match-wins union of priority-ordered partial mappings.

use std::collections::BTreeMap;

use crate::models::mapping::LineageMapping;

/// For every key, keep the value from the earliest partial map that has it.
pub fn first_match_union<K, V, I>(partials: I) -> BTreeMap<K, V>
where
    K: Ord,
    I: IntoIterator<Item = BTreeMap<K, V>>,
{
    let mut merged = BTreeMap::new();
    for partial in partials {
        for (key, value) in partial {
            merged.entry(key).or_insert(value);
        }
    }
    merged
}

/// Merge lineage mappings given highest priority first.
pub fn combine(partials: impl IntoIterator<Item = LineageMapping>) -> LineageMapping {
    first_match_union(partials.into_iter().map(LineageMapping::into_inner)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::mapping::{MappingType, MethodMapping};
    use crate::models::method::MethodIdentity;

    fn id(s: &str) -> MethodIdentity {
        MethodIdentity::from_signature(s)
    }

    fn partial(entries: &[(&str, &str, MappingType)]) -> LineageMapping {
        entries
            .iter()
            .map(|(s, d, t)| MethodMapping::new(id(s), id(d), *t))
            .collect()
    }

    #[test]
    fn earliest_partial_wins() {
        let merged = combine([
            partial(&[("A.f()", "A.f()", MappingType::Identical)]),
            partial(&[
                ("A.f()", "A.g()", MappingType::Refactored),
                ("A.h()", "A.h2()", MappingType::Refactored),
            ]),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.type_of(&id("A.f()")), MappingType::Identical);
        assert_eq!(merged.get(&id("A.f()")).unwrap().destination, id("A.f()"));
        assert_eq!(merged.type_of(&id("A.h()")), MappingType::Refactored);
    }

    #[test]
    fn absent_keys_stay_absent() {
        let merged = combine([LineageMapping::new(), LineageMapping::new()]);
        assert!(merged.is_empty());
    }

    #[test]
    fn generic_over_key_and_value() {
        let a: BTreeMap<u32, &str> = [(1, "a1"), (2, "a2")].into_iter().collect();
        let b: BTreeMap<u32, &str> = [(2, "b2"), (3, "b3")].into_iter().collect();
        let merged = first_match_union([a, b]);
        assert_eq!(merged.values().copied().collect::<Vec<_>>(), vec!["a1", "a2", "b3"]);
    }
}
