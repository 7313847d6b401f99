use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::mapping::MappingType;

/// One contingency cell: methods left after purging, and methods purged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub count: usize,
    pub purged: usize,
}

impl Cell {
    pub fn raw(count: usize) -> Self {
        Self { count, purged: 0 }
    }

    /// Split `total` into `(total - purged, purged)`.
    pub fn with_purged(total: usize, purged: usize) -> Self {
        debug_assert!(purged <= total);
        Self {
            count: total - purged,
            purged,
        }
    }

    pub fn total(&self) -> usize {
        self.count + self.purged
    }
}

/// Renders `raw` or `raw(purged)`.
impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.purged == 0 {
            write!(f, "{}", self.count)
        } else {
            write!(f, "{}({})", self.count, self.purged)
        }
    }
}

/// Upstream type -> fork type -> cell.
///
/// The `NotFound` row holds deleted-upstream methods; the `Added` row holds
/// the added-method breakdown (`Added` = mutual, `NotFound` = upstream only,
/// `Other` = fork only).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ContingencyTable {
    rows: BTreeMap<MappingType, BTreeMap<MappingType, Cell>>,
}

impl ContingencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a row, replacing any previous one for `upstream`.
    pub fn set_row(&mut self, upstream: MappingType, row: BTreeMap<MappingType, Cell>) {
        self.rows.insert(upstream, row);
    }

    pub fn row(&self, upstream: MappingType) -> Option<&BTreeMap<MappingType, Cell>> {
        self.rows.get(&upstream)
    }

    /// Missing cells read as zero.
    pub fn cell(&self, upstream: MappingType, fork: MappingType) -> Cell {
        self.rows
            .get(&upstream)
            .and_then(|row| row.get(&fork))
            .copied()
            .unwrap_or_default()
    }

    /// Sum of raw counts across a row, as the report prints it.
    pub fn row_total(&self, upstream: MappingType) -> usize {
        self.rows
            .get(&upstream)
            .map(|row| row.values().map(|c| c.count).sum())
            .unwrap_or(0)
    }

    pub fn added(&self) -> AddedStats {
        let mutual = self.cell(MappingType::Added, MappingType::Added);
        AddedStats {
            upstream_only: self.cell(MappingType::Added, MappingType::NotFound).count,
            fork_only: self.cell(MappingType::Added, MappingType::Other).count,
            mutual: mutual.total(),
            identical_mutual: mutual.purged,
        }
    }
}

/// Typed view of the added-method row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AddedStats {
    /// New in upstream, counted whether or not the fork also has it
    pub upstream_only: usize,
    /// New in the fork, counted whether or not upstream also has it
    pub fork_only: usize,
    /// New in both lineages under the same identity
    pub mutual: usize,
    /// Mutual and textually identical
    pub identical_mutual: usize,
}

/// Terminal artifact of one analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub name: String,
    pub ancestor_methods: usize,
    pub upstream_methods: usize,
    pub fork_methods: usize,
    pub table: ContingencyTable,
}

impl AnalysisReport {
    pub fn added(&self) -> AddedStats {
        self.table.added()
    }
}
