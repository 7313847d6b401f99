//! Method-matching signals for one lineage.
//!
//! Every detector sees the same two snapshots plus what earlier detectors
//! already decided, and proposes mappings only for what is still open.

pub mod arguments;
pub mod body_change;
pub mod external;
pub mod identical;
pub mod refactoring;

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;

use crate::config::Config;
use crate::models::mapping::{LineageMapping, MappingType, MethodMapping};
use crate::models::method::{MethodIdentity, MethodModel, Snapshot};

pub use arguments::ArgumentsChangeDetector;
pub use body_change::BodyChangeDetector;
pub use external::ExternalCloneDetector;
pub use identical::IdenticalDetector;
pub use refactoring::RefactoringDetector;

/// Read-only view handed to a detector.
pub struct DetectionContext<'a> {
    pub old: &'a Snapshot,
    pub new: &'a Snapshot,
    pub mapped_sources: &'a BTreeSet<MethodIdentity>,
    pub claimed_destinations: &'a BTreeSet<MethodIdentity>,
    /// Old qualified class -> new qualified class
    pub class_moves: &'a BTreeMap<String, String>,
    pub similarity_threshold: f64,
}

impl DetectionContext<'_> {
    /// Old methods no earlier detector mapped.
    pub fn open_sources(&self) -> impl Iterator<Item = &MethodModel> {
        self.old
            .methods
            .values()
            .filter(|m| !self.mapped_sources.contains(&m.identity))
    }

    pub fn is_open_destination(&self, id: &MethodIdentity) -> bool {
        self.new.contains(id) && !self.claimed_destinations.contains(id)
    }

    /// Old methods whose identity no longer exists in the new snapshot.
    pub fn vanished_sources(&self) -> impl Iterator<Item = &MethodModel> {
        self.open_sources()
            .filter(|m| !self.new.contains(&m.identity))
    }

    /// New methods whose identity did not exist in the old snapshot.
    pub fn appeared_destinations(&self) -> impl Iterator<Item = &MethodModel> {
        self.new.methods.values().filter(|m| {
            !self.old.contains(&m.identity) && !self.claimed_destinations.contains(&m.identity)
        })
    }

    /// Where `class` lives in the new snapshot, following known moves.
    pub fn relocated<'c>(&self, class: &'c str) -> Cow<'c, str> {
        relocate(class, self.class_moves)
    }
}

#[derive(Debug, Default)]
pub struct DetectorOutput {
    pub mappings: LineageMapping,
    /// Class relocations discovered by this detector
    pub class_moves: BTreeMap<String, String>,
}

impl From<LineageMapping> for DetectorOutput {
    fn from(mappings: LineageMapping) -> Self {
        Self {
            mappings,
            class_moves: BTreeMap::new(),
        }
    }
}

pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<DetectorOutput>;
}

/// Built-in detectors in priority order. A configured external clone
/// detector runs right after the identical detector.
pub fn default_detectors(config: &Config) -> Vec<Box<dyn Detector>> {
    let mut detectors: Vec<Box<dyn Detector>> = vec![Box::new(IdenticalDetector)];
    if let Some(tool) = &config.clone_detector {
        detectors.push(Box::new(ExternalCloneDetector::new(tool.clone())));
    }
    detectors.push(Box::new(RefactoringDetector));
    detectors.push(Box::new(ArgumentsChangeDetector));
    detectors.push(Box::new(BodyChangeDetector));
    detectors
}

/// Map `class` (or an enclosing class) through `moves`.
pub fn relocate<'c>(class: &'c str, moves: &BTreeMap<String, String>) -> Cow<'c, str> {
    if let Some(to) = moves.get(class) {
        return Cow::Owned(to.clone());
    }
    // Nested types follow their outer class.
    let mut end = class.len();
    while let Some(dot) = class[..end].rfind('.') {
        if let Some(to) = moves.get(&class[..dot]) {
            return Cow::Owned(format!("{to}{}", &class[dot..]));
        }
        end = dot;
    }
    Cow::Borrowed(class)
}

/// A scored source/destination pairing.
#[derive(Debug, Clone)]
pub(crate) struct Candidate<'a> {
    pub score: f64,
    pub source: &'a MethodIdentity,
    pub destination: &'a MethodIdentity,
}

/// Assign candidates best score first; each side is used at most once.
/// Ties break on identities so runs are reproducible.
pub(crate) fn assign_greedy(
    mut candidates: Vec<Candidate<'_>>,
    kind: MappingType,
    out: &mut LineageMapping,
    used_destinations: &mut BTreeSet<MethodIdentity>,
) {
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.source.cmp(b.source))
            .then_with(|| a.destination.cmp(b.destination))
    });
    for c in candidates {
        if out.contains(c.source) || used_destinations.contains(c.destination) {
            continue;
        }
        used_destinations.insert(c.destination.clone());
        out.insert(MethodMapping::new(
            c.source.clone(),
            c.destination.clone(),
            kind,
        ));
    }
}
