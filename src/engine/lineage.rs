//! One lineage: old snapshot -> new snapshot, through every detector.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use tracing::debug;

use crate::config::Config;
use crate::engine::combiner;
use crate::engine::detectors::{self, DetectionContext, Detector, DetectorOutput};
use crate::error::ForkError;
use crate::models::mapping::LineageMapping;
use crate::models::method::{MethodIdentity, Snapshot};

#[derive(Debug, Default)]
pub struct LineageResult {
    pub mapping: LineageMapping,
    /// Old methods no detector explained (deleted)
    pub unmatched_sources: BTreeSet<MethodIdentity>,
    /// New methods no mapping points at (added)
    pub unmatched_destinations: BTreeSet<MethodIdentity>,
    pub class_moves: BTreeMap<String, String>,
}

pub struct LineageMapper {
    detectors: Vec<Box<dyn Detector>>,
    similarity_threshold: f64,
}

impl LineageMapper {
    pub fn new(detectors: Vec<Box<dyn Detector>>, similarity_threshold: f64) -> Self {
        Self {
            detectors,
            similarity_threshold,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            detectors::default_detectors(config),
            config.similarity_threshold,
        )
    }

    pub fn map(&self, old: &Snapshot, new: &Snapshot) -> Result<LineageResult> {
        let mut mapped = BTreeSet::new();
        let mut claimed = BTreeSet::new();
        let mut class_moves = BTreeMap::new();
        let mut partials = Vec::with_capacity(self.detectors.len());

        for detector in &self.detectors {
            let ctx = DetectionContext {
                old,
                new,
                mapped_sources: &mapped,
                claimed_destinations: &claimed,
                class_moves: &class_moves,
                similarity_threshold: self.similarity_threshold,
            };
            let output = detector.detect(&ctx).map_err(|e| {
                if e.downcast_ref::<ForkError>().is_some() {
                    e
                } else {
                    ForkError::detector_failed(detector.name(), e).into()
                }
            })?;
            check_contract(detector.name(), &output, old, new, &mapped, &claimed)?;

            debug!(
                detector = detector.name(),
                mappings = output.mappings.len(),
                "detector completed"
            );
            let DetectorOutput {
                mappings,
                class_moves: moves,
            } = output;
            for m in mappings.mappings() {
                mapped.insert(m.source.clone());
                claimed.insert(m.destination.clone());
            }
            for (from, to) in moves {
                class_moves.entry(from).or_insert(to);
            }
            partials.push(mappings);
        }

        let mapping = combiner::combine(partials);
        let unmatched_sources = old
            .methods
            .keys()
            .filter(|id| !mapping.contains(id))
            .cloned()
            .collect();
        let unmatched_destinations = new
            .methods
            .keys()
            .filter(|id| !claimed.contains(*id))
            .cloned()
            .collect();

        Ok(LineageResult {
            mapping,
            unmatched_sources,
            unmatched_destinations,
            class_moves,
        })
    }
}

fn check_contract(
    detector: &str,
    output: &DetectorOutput,
    old: &Snapshot,
    new: &Snapshot,
    mapped: &BTreeSet<MethodIdentity>,
    claimed: &BTreeSet<MethodIdentity>,
) -> Result<(), ForkError> {
    output.mappings.validate()?;
    let mut seen = BTreeSet::new();
    for m in output.mappings.mappings() {
        let problem = if mapped.contains(&m.source) {
            "remapped source"
        } else if claimed.contains(&m.destination) {
            "reclaimed destination"
        } else if !seen.insert(&m.destination) {
            "destination emitted twice"
        } else if !old.contains(&m.source) {
            "unknown source"
        } else if !new.contains(&m.destination) {
            "unknown destination"
        } else {
            continue;
        };
        return Err(ForkError::inconsistent_mapping(format!(
            "{detector}: {problem} ({} -> {})",
            m.source, m.destination
        )));
    }
    Ok(())
}
