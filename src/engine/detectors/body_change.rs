use anyhow::Result;

use super::{DetectionContext, Detector, DetectorOutput};
use crate::models::mapping::{LineageMapping, MappingType, MethodMapping};

/// Signature kept, body edited. Runs last, so anything with a surviving
/// identity that nothing else explained lands here.
#[derive(Debug, Default, Clone, Copy)]
pub struct BodyChangeDetector;

impl Detector for BodyChangeDetector {
    fn name(&self) -> &'static str {
        "body-change"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<DetectorOutput> {
        let mappings: LineageMapping = ctx
            .open_sources()
            .filter(|old| ctx.is_open_destination(&old.identity))
            .map(|old| {
                MethodMapping::new(
                    old.identity.clone(),
                    old.identity.clone(),
                    MappingType::BodyChangeOnly,
                )
            })
            .collect();
        Ok(mappings.into())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{id, run, snapshot};
    use super::*;

    #[test]
    fn maps_surviving_signatures() {
        let old = snapshot(&[("A", "f", &["int"], "{ a(); }"), ("A", "gone", &[], "{}")]);
        let new = snapshot(&[("A", "f", &["int"], "{ b(); }")]);
        let out = run(&BodyChangeDetector, &old, &new, &[], &[], &[]);
        assert_eq!(out.mappings.len(), 1);
        assert_eq!(
            out.mappings.type_of(&id("A.f(int)")),
            MappingType::BodyChangeOnly
        );
    }

    #[test]
    fn skips_claimed_destination() {
        let old = snapshot(&[("A", "f", &[], "{ a(); }")]);
        let new = snapshot(&[("A", "f", &[], "{ b(); }")]);
        let out = run(&BodyChangeDetector, &old, &new, &[], &["A.f()"], &[]);
        assert!(out.mappings.is_empty());
    }
}
