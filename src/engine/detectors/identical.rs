use anyhow::Result;

use super::{DetectionContext, Detector, DetectorOutput};
use crate::models::mapping::{LineageMapping, MappingType, MethodMapping};

/// Same identity on both sides with an equal token fingerprint.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdenticalDetector;

impl Detector for IdenticalDetector {
    fn name(&self) -> &'static str {
        "identical"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<DetectorOutput> {
        let mut mappings = LineageMapping::new();
        for old in ctx.open_sources() {
            if !ctx.is_open_destination(&old.identity) {
                continue;
            }
            if let Some(new) = ctx.new.get(&old.identity)
                && new.fingerprint == old.fingerprint
            {
                mappings.insert(MethodMapping::new(
                    old.identity.clone(),
                    new.identity.clone(),
                    MappingType::Identical,
                ));
            }
        }
        Ok(mappings.into())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{id, run, snapshot};
    use super::*;

    #[test]
    fn maps_unchanged_methods_only() {
        let old = snapshot(&[
            ("A", "f", &[], "{ return 1; }"),
            ("A", "g", &[], "{ return 2; }"),
            ("A", "h", &[], "{ }"),
        ]);
        let new = snapshot(&[
            ("A", "f", &[], "{ return 1; }"),
            ("A", "g", &[], "{ return 3; }"),
        ]);
        let out = run(&IdenticalDetector, &old, &new, &[], &[], &[]);
        assert_eq!(out.mappings.len(), 1);
        assert_eq!(out.mappings.type_of(&id("A.f()")), MappingType::Identical);
    }

    #[test]
    fn respects_mapped_and_claimed_sets() {
        let old = snapshot(&[("A", "f", &[], "{}"), ("A", "g", &[], "{}")]);
        let new = snapshot(&[("A", "f", &[], "{}"), ("A", "g", &[], "{}")]);
        let out = run(&IdenticalDetector, &old, &new, &["A.f()"], &["A.g()"], &[]);
        assert!(out.mappings.is_empty());
    }
}
