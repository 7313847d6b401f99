use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::method::MethodIdentity;
use crate::error::ForkError;

/// How a lineage changed one ancestor method.
///
/// Declaration order is detector priority: an earlier variant is the more
/// specific explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingType {
    Identical,
    Refactored,
    ArgumentsChange,
    BodyChangeOnly,
    /// No detector found a destination: deleted
    NotFound,
    /// Destination without a source
    Added,
    /// Bookkeeping column of the added-method row only
    Other,
}

impl MappingType {
    /// Rows and columns of the report, in order.
    pub const REPORTED: [MappingType; 5] = [
        MappingType::Identical,
        MappingType::Refactored,
        MappingType::ArgumentsChange,
        MappingType::BodyChangeOnly,
        MappingType::NotFound,
    ];
}

impl fmt::Display for MappingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Identical => "IDENTICAL",
            Self::Refactored => "REFACTORED",
            Self::ArgumentsChange => "ARGUMENTS_CHANGE",
            Self::BodyChangeOnly => "BODY_CHANGE_ONLY",
            Self::NotFound => "NOT_FOUND",
            Self::Added => "ADDED",
            Self::Other => "OTHER",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodMapping {
    pub source: MethodIdentity,
    pub destination: MethodIdentity,
    #[serde(rename = "type")]
    pub kind: MappingType,
}

impl MethodMapping {
    pub fn new(source: MethodIdentity, destination: MethodIdentity, kind: MappingType) -> Self {
        Self {
            source,
            destination,
            kind,
        }
    }
}

/// Per-lineage result: at most one mapping per ancestor method, keyed by source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LineageMapping(BTreeMap<MethodIdentity, MethodMapping>);

impl LineageMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping under its own source. An existing entry is kept.
    pub fn insert(&mut self, mapping: MethodMapping) -> bool {
        if self.0.contains_key(&mapping.source) {
            return false;
        }
        self.0.insert(mapping.source.clone(), mapping);
        true
    }

    pub fn get(&self, source: &MethodIdentity) -> Option<&MethodMapping> {
        self.0.get(source)
    }

    pub fn contains(&self, source: &MethodIdentity) -> bool {
        self.0.contains_key(source)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MethodIdentity, &MethodMapping)> {
        self.0.iter()
    }

    pub fn mappings(&self) -> impl Iterator<Item = &MethodMapping> {
        self.0.values()
    }

    pub fn sources(&self) -> BTreeSet<MethodIdentity> {
        self.0.keys().cloned().collect()
    }

    pub fn destinations(&self) -> BTreeSet<MethodIdentity> {
        self.0.values().map(|m| m.destination.clone()).collect()
    }

    pub fn into_inner(self) -> BTreeMap<MethodIdentity, MethodMapping> {
        self.0
    }

    /// Check that every key equals its mapping's source.
    pub fn validate(&self) -> Result<(), ForkError> {
        for (key, mapping) in &self.0 {
            if *key != mapping.source {
                return Err(ForkError::inconsistent_mapping(format!(
                    "mapping keyed by {key} has source {}",
                    mapping.source
                )));
            }
        }
        Ok(())
    }

    /// Ancestor methods grouped by the type this lineage gave them.
    pub fn partition_by_type(&self) -> BTreeMap<MappingType, BTreeSet<&MethodIdentity>> {
        let mut buckets: BTreeMap<MappingType, BTreeSet<&MethodIdentity>> = BTreeMap::new();
        for (source, mapping) in &self.0 {
            buckets.entry(mapping.kind).or_default().insert(source);
        }
        buckets
    }

    /// Type of `source` in this lineage; `NotFound` when unmapped.
    pub fn type_of(&self, source: &MethodIdentity) -> MappingType {
        self.0
            .get(source)
            .map(|m| m.kind)
            .unwrap_or(MappingType::NotFound)
    }
}

impl From<BTreeMap<MethodIdentity, MethodMapping>> for LineageMapping {
    fn from(map: BTreeMap<MethodIdentity, MethodMapping>) -> Self {
        Self(map)
    }
}

impl FromIterator<MethodMapping> for LineageMapping {
    fn from_iter<I: IntoIterator<Item = MethodMapping>>(iter: I) -> Self {
        let mut mapping = Self::new();
        for m in iter {
            mapping.insert(m);
        }
        mapping
    }
}
