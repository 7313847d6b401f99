//! Cross-lineage aggregation: two lineage mappings over one ancestor become
//! a contingency table of upstream type x fork type.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use tracing::debug;

use crate::error::ForkError;
use crate::models::mapping::{LineageMapping, MappingType};
use crate::models::method::{MethodIdentity, Snapshot};
use crate::models::table::{AnalysisReport, Cell, ContingencyTable};

/// The three method universes of one analysis.
#[derive(Clone, Copy)]
pub struct Universes<'a> {
    pub ancestor: &'a Snapshot,
    pub upstream: &'a Snapshot,
    pub fork: &'a Snapshot,
}

pub fn aggregate(
    name: &str,
    universes: Universes<'_>,
    upstream: &LineageMapping,
    fork: &LineageMapping,
) -> Result<AnalysisReport> {
    validate(universes.ancestor, upstream, "upstream")?;
    validate(universes.ancestor, fork, "fork")?;

    let mut table = ContingencyTable::new();

    for (up_type, sources) in upstream.partition_by_type() {
        let mut raw: BTreeMap<MappingType, usize> = BTreeMap::new();
        let mut purged = 0usize;
        for source in sources {
            let fork_type = fork.type_of(source);
            *raw.entry(fork_type).or_default() += 1;
            // A change both lineages made the same way is one change, not two.
            if fork_type == up_type
                && up_type != MappingType::Identical
                && upstream.get(source) == fork.get(source)
            {
                purged += 1;
            }
        }
        let row = raw
            .into_iter()
            .map(|(fork_type, count)| {
                let cell = if fork_type == up_type {
                    Cell::with_purged(count, purged)
                } else {
                    Cell::raw(count)
                };
                (fork_type, cell)
            })
            .collect();
        table.set_row(up_type, row);
    }

    // Deleted upstream: replaces any NOT_FOUND row built above.
    let mut deleted: BTreeMap<MappingType, Cell> = BTreeMap::new();
    for id in universes.ancestor.methods.keys() {
        if !upstream.contains(id) {
            deleted.entry(fork.type_of(id)).or_default().count += 1;
        }
    }
    table.set_row(MappingType::NotFound, deleted);

    let upstream_new = new_methods(universes.upstream, upstream);
    let fork_new = new_methods(universes.fork, fork);
    let mut mutual = 0usize;
    let mut identical_mutual = 0usize;
    for id in upstream_new.intersection(&fork_new) {
        mutual += 1;
        if let (Some(u), Some(f)) = (universes.upstream.get(id), universes.fork.get(id))
            && u.source_text()? == f.source_text()?
        {
            identical_mutual += 1;
        }
    }
    let added_row = BTreeMap::from([
        (
            MappingType::Added,
            Cell::with_purged(mutual, identical_mutual),
        ),
        (MappingType::NotFound, Cell::raw(upstream_new.len())),
        (MappingType::Other, Cell::raw(fork_new.len())),
    ]);
    table.set_row(MappingType::Added, added_row);

    debug!(
        name,
        ancestor = universes.ancestor.len(),
        upstream = universes.upstream.len(),
        fork = universes.fork.len(),
        mutual,
        identical_mutual,
        "aggregate completed"
    );

    Ok(AnalysisReport {
        name: name.to_string(),
        ancestor_methods: universes.ancestor.len(),
        upstream_methods: universes.upstream.len(),
        fork_methods: universes.fork.len(),
        table,
    })
}

/// Methods of `target` that no mapping of the lineage points at.
fn new_methods<'a>(target: &'a Snapshot, mapping: &LineageMapping) -> BTreeSet<&'a MethodIdentity> {
    let destinations = mapping.destinations();
    target
        .methods
        .keys()
        .filter(|id| !destinations.contains(*id))
        .collect()
}

fn validate(ancestor: &Snapshot, mapping: &LineageMapping, lineage: &str) -> Result<(), ForkError> {
    mapping.validate()?;
    if let Some(stray) = mapping.sources().into_iter().find(|s| !ancestor.contains(s)) {
        return Err(ForkError::inconsistent_mapping(format!(
            "{lineage} mapping has source {stray} outside the ancestor"
        )));
    }
    Ok(())
}
