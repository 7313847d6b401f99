use std::collections::BTreeSet;

use anyhow::Result;

use super::{Candidate, DetectionContext, Detector, DetectorOutput, assign_greedy};
use crate::engine::tokens;
use crate::models::mapping::{LineageMapping, MappingType};

/// Same class and name, different parameter list. Among overloads the most
/// similar body wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArgumentsChangeDetector;

impl Detector for ArgumentsChangeDetector {
    fn name(&self) -> &'static str {
        "arguments-change"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<DetectorOutput> {
        let appeared: Vec<_> = ctx.appeared_destinations().collect();
        let mut candidates = Vec::new();
        for old in ctx.vanished_sources() {
            let class = ctx.relocated(&old.signature.declaring_type);
            for new in &appeared {
                if new.signature.declaring_type != *class
                    || new.signature.name != old.signature.name
                    || new.signature.parameters == old.signature.parameters
                {
                    continue;
                }
                candidates.push(Candidate {
                    score: tokens::similarity(&old.body_tokens, &new.body_tokens),
                    source: &old.identity,
                    destination: &new.identity,
                });
            }
        }

        let mut mappings = LineageMapping::new();
        let mut used = BTreeSet::new();
        assign_greedy(candidates, MappingType::ArgumentsChange, &mut mappings, &mut used);
        Ok(mappings.into())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{id, run, snapshot};
    use super::*;

    #[test]
    fn maps_changed_parameter_list() {
        let old = snapshot(&[("p.A", "load", &["String"], "{ read(path); }")]);
        let new = snapshot(&[("p.A", "load", &["String", "int"], "{ read(path, n); }")]);
        let out = run(&ArgumentsChangeDetector, &old, &new, &[], &[], &[]);
        let m = out.mappings.get(&id("p.A.load(String)")).unwrap();
        assert_eq!(m.destination, id("p.A.load(String,int)"));
        assert_eq!(m.kind, MappingType::ArgumentsChange);
    }

    #[test]
    fn picks_most_similar_overload() {
        let old = snapshot(&[("A", "f", &["int"], "{ alpha(); beta(); gamma(); }")]);
        let new = snapshot(&[
            ("A", "f", &["long"], "{ other(); }"),
            ("A", "f", &["int", "int"], "{ alpha(); beta(); gamma(); }"),
        ]);
        let out = run(&ArgumentsChangeDetector, &old, &new, &[], &[], &[]);
        assert_eq!(
            out.mappings.get(&id("A.f(int)")).unwrap().destination,
            id("A.f(int,int)")
        );
    }

    #[test]
    fn ignores_methods_that_still_exist() {
        let old = snapshot(&[("A", "f", &["int"], "{}")]);
        let new = snapshot(&[("A", "f", &["int"], "{}"), ("A", "f", &["long"], "{}")]);
        let out = run(&ArgumentsChangeDetector, &old, &new, &[], &[], &[]);
        assert!(out.mappings.is_empty());
    }

    #[test]
    fn follows_class_moves() {
        let old = snapshot(&[("a.Old", "f", &["int"], "{ x(); }")]);
        let new = snapshot(&[("b.New", "f", &["long"], "{ x(); }")]);
        let out = run(
            &ArgumentsChangeDetector,
            &old,
            &new,
            &[],
            &[],
            &[("a.Old", "b.New")],
        );
        assert_eq!(
            out.mappings.get(&id("a.Old.f(int)")).unwrap().destination,
            id("b.New.f(long)")
        );
    }
}
