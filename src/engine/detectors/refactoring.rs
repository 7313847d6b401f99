//! Refactorings that keep a method's body recognisable: class moves and
//! renames, method renames, and methods moved to another class.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use tracing::debug;

use super::{Candidate, DetectionContext, Detector, DetectorOutput, assign_greedy, relocate};
use crate::engine::tokens;
use crate::models::mapping::{LineageMapping, MappingType, MethodMapping};
use crate::models::method::{MethodIdentity, Snapshot};

/// Share of method names two classes must have in common to be taken as
/// the same class under a new name.
const MIN_CLASS_OVERLAP: f64 = 0.5;

#[derive(Debug, Default, Clone, Copy)]
pub struct RefactoringDetector;

impl Detector for RefactoringDetector {
    fn name(&self) -> &'static str {
        "refactoring"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<DetectorOutput> {
        let found = detect_class_moves(ctx);
        let mut moves = ctx.class_moves.clone();
        for (from, to) in &found {
            moves.entry(from.clone()).or_insert_with(|| to.clone());
        }

        let mut mappings = LineageMapping::new();
        let mut used = BTreeSet::new();

        // Methods carried along with their class.
        for old in ctx.vanished_sources() {
            let class = relocate(&old.signature.declaring_type, &moves);
            if *class == old.signature.declaring_type {
                continue;
            }
            let target = MethodIdentity::from(&old.signature.in_type(&class));
            if ctx.is_open_destination(&target)
                && !ctx.old.contains(&target)
                && !used.contains(&target)
            {
                used.insert(target.clone());
                mappings.insert(MethodMapping::new(
                    old.identity.clone(),
                    target,
                    MappingType::Refactored,
                ));
            }
        }

        let appeared: Vec<_> = ctx
            .appeared_destinations()
            .filter(|m| !used.contains(&m.identity))
            .collect();
        let mut candidates = Vec::new();
        for old in ctx.vanished_sources() {
            if mappings.contains(&old.identity) {
                continue;
            }
            let class = relocate(&old.signature.declaring_type, &moves);
            for new in &appeared {
                let sig = &new.signature;
                let same_class = sig.declaring_type == *class;
                let same_name = sig.name == old.signature.name;
                if sig.parameters != old.signature.parameters || same_class == same_name {
                    // rename: same class, new name; move: other class, same name
                    continue;
                }
                // Abstract and interface methods carry no body to compare.
                if old.body_tokens.is_empty() || new.body_tokens.is_empty() {
                    continue;
                }
                let score = tokens::similarity(&old.body_tokens, &new.body_tokens);
                if score >= ctx.similarity_threshold {
                    candidates.push(Candidate {
                        score,
                        source: &old.identity,
                        destination: &new.identity,
                    });
                }
            }
        }
        assign_greedy(candidates, MappingType::Refactored, &mut mappings, &mut used);

        debug!(
            class_moves = found.len(),
            mappings = mappings.len(),
            "refactoring detector completed"
        );
        Ok(DetectorOutput {
            mappings,
            class_moves: found,
        })
    }
}

fn simple_name(class: &str) -> &str {
    class.rsplit('.').next().unwrap_or(class)
}

fn method_names(snapshot: &Snapshot) -> BTreeMap<&str, BTreeSet<&str>> {
    let mut names: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for m in snapshot.methods.values() {
        names
            .entry(m.signature.declaring_type.as_str())
            .or_default()
            .insert(m.signature.name.as_str());
    }
    names
}

fn overlap(a: Option<&BTreeSet<&str>>, b: Option<&BTreeSet<&str>>) -> f64 {
    let (Some(a), Some(b)) = (a, b) else {
        return 0.0;
    };
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Pair classes that vanished from the old snapshot with classes that
/// appeared in the new one: a unique class with the same simple name, or
/// else the class sharing the most method names.
fn detect_class_moves(ctx: &DetectionContext<'_>) -> BTreeMap<String, String> {
    let known_targets: BTreeSet<&String> = ctx.class_moves.values().collect();
    let fresh: Vec<&String> = ctx
        .new
        .classes
        .keys()
        .filter(|c| !ctx.old.has_class(c) && !known_targets.contains(c))
        .collect();
    if fresh.is_empty() {
        return BTreeMap::new();
    }

    let old_names = method_names(ctx.old);
    let new_names = method_names(ctx.new);
    let mut found: BTreeMap<String, String> = BTreeMap::new();
    let mut taken: BTreeSet<&str> = BTreeSet::new();

    for class in ctx.old.classes.keys() {
        if ctx.new.has_class(class) || ctx.class_moves.contains_key(class) {
            continue;
        }
        // Nested in a class that already moved.
        if *relocate(class, &found) != **class {
            continue;
        }
        let open: Vec<&String> = fresh
            .iter()
            .copied()
            .filter(|f| !taken.contains(f.as_str()))
            .collect();
        let same_simple: Vec<&String> = open
            .iter()
            .copied()
            .filter(|f| simple_name(f) == simple_name(class))
            .collect();

        let target = if same_simple.len() == 1 {
            Some(same_simple[0])
        } else {
            let pool = if same_simple.is_empty() { &open } else { &same_simple };
            let mut best: Option<(f64, &String)> = None;
            for candidate in pool {
                let score = overlap(
                    old_names.get(class.as_str()),
                    new_names.get(candidate.as_str()),
                );
                if score >= MIN_CLASS_OVERLAP && best.is_none_or(|(s, _)| score > s) {
                    best = Some((score, *candidate));
                }
            }
            best.map(|(_, c)| c)
        };

        if let Some(target) = target {
            taken.insert(target.as_str());
            found.insert(class.clone(), target.clone());
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::super::testing::{id, run, snapshot};
    use super::*;
    use crate::models::method::{MethodModel, MethodSignature};
    use camino::Utf8PathBuf;

    /// Snapshot of bodiless (abstract or interface) methods.
    fn abstract_methods(methods: &[(&str, &str, &[&str])]) -> Snapshot {
        let mut snap = Snapshot::new("/mem");
        for (class, name, params) in methods {
            let decl = vec![name.to_string()];
            snap.insert(MethodModel::new(
                MethodSignature::new(*class, *name, params),
                Utf8PathBuf::from("Api.java"),
                0..0,
                &decl,
                Vec::new(),
            ));
        }
        snap
    }

    #[test]
    fn class_move_carries_methods() {
        let old = snapshot(&[
            ("a.Store", "put", &["int"], "{ x(); }"),
            ("a.Store", "get", &[], "{ y(); }"),
        ]);
        let new = snapshot(&[
            ("b.Store", "put", &["int"], "{ x(); }"),
            ("b.Store", "get", &[], "{ completely(); different(); }"),
        ]);
        let out = run(&RefactoringDetector, &old, &new, &[], &[], &[]);
        assert_eq!(out.class_moves.get("a.Store").map(String::as_str), Some("b.Store"));
        assert_eq!(
            out.mappings.get(&id("a.Store.put(int)")).unwrap().destination,
            id("b.Store.put(int)")
        );
        assert_eq!(
            out.mappings.get(&id("a.Store.get()")).unwrap().kind,
            MappingType::Refactored
        );
    }

    #[test]
    fn renamed_class_found_by_method_overlap() {
        let old = snapshot(&[
            ("p.Cache", "put", &[], "{}"),
            ("p.Cache", "get", &[], "{}"),
            ("p.Cache", "evict", &[], "{}"),
        ]);
        let new = snapshot(&[
            ("p.LruCache", "put", &[], "{}"),
            ("p.LruCache", "get", &[], "{}"),
            ("p.LruCache", "evict", &[], "{}"),
            ("p.Unrelated", "run", &[], "{}"),
        ]);
        let out = run(&RefactoringDetector, &old, &new, &[], &[], &[]);
        assert_eq!(
            out.class_moves.get("p.Cache").map(String::as_str),
            Some("p.LruCache")
        );
        assert_eq!(out.mappings.len(), 3);
    }

    #[test]
    fn method_rename_needs_similar_body() {
        let old = snapshot(&[
            ("A", "compute", &["int"], "{ int a = x * 2; return a + offset(x); }"),
            ("A", "drop", &[], "{ cleanup(); }"),
        ]);
        let new = snapshot(&[
            ("A", "calculate", &["int"], "{ int a = x * 2; return a + offset(x); }"),
            ("A", "purge", &[], "{ totally(); unrelated(); code(); here(); }"),
        ]);
        let out = run(&RefactoringDetector, &old, &new, &[], &[], &[]);
        assert_eq!(
            out.mappings.get(&id("A.compute(int)")).unwrap().destination,
            id("A.calculate(int)")
        );
        assert!(!out.mappings.contains(&id("A.drop()")));
    }

    #[test]
    fn method_moved_to_other_class() {
        let old = snapshot(&[
            ("A", "helper", &["String"], "{ return s.trim().toLowerCase(); }"),
            ("B", "keep", &[], "{}"),
        ]);
        let new = snapshot(&[
            ("B", "helper", &["String"], "{ return s.trim().toLowerCase(); }"),
            ("B", "keep", &[], "{}"),
        ]);
        let out = run(&RefactoringDetector, &old, &new, &[], &[], &[]);
        assert_eq!(
            out.mappings.get(&id("A.helper(String)")).unwrap().destination,
            id("B.helper(String)")
        );
    }

    #[test]
    fn claimed_destination_is_not_reused() {
        let old = snapshot(&[("a.X", "f", &[], "{ q(); }")]);
        let new = snapshot(&[("b.X", "f", &[], "{ q(); }")]);
        let out = run(&RefactoringDetector, &old, &new, &[], &["b.X.f()"], &[]);
        assert!(out.mappings.is_empty());
    }

    #[test]
    fn bodiless_methods_are_not_renames() {
        let old = abstract_methods(&[("Api", "open", &["int"]), ("Api", "close", &[])]);
        let new = abstract_methods(&[("Api", "connect", &["int"]), ("Api", "close", &[])]);
        let out = run(&RefactoringDetector, &old, &new, &[], &[], &[]);
        assert!(!out.mappings.contains(&id("Api.open(int)")));
        assert!(out.mappings.is_empty());
    }
}
