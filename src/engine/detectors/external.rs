use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Command;

use anyhow::{Result, bail};
use tracing::{debug, warn};

use super::{DetectionContext, Detector, DetectorOutput};
use crate::error::ForkError;
use crate::models::mapping::{LineageMapping, MappingType, MethodMapping};
use crate::models::method::MethodIdentity;

/// Clone pairs reported by an external tool.
///
/// The tool is run as `<tool> <oldRoot> <newRoot>` and prints one
/// `oldSignature<TAB>newSignature` pair per line. Blank lines and `#`
/// comments are ignored.
#[derive(Debug, Clone)]
pub struct ExternalCloneDetector {
    tool: PathBuf,
}

impl ExternalCloneDetector {
    pub fn new(tool: PathBuf) -> Self {
        Self { tool }
    }
}

impl Detector for ExternalCloneDetector {
    fn name(&self) -> &'static str {
        "external-clone"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<DetectorOutput> {
        debug!(tool = %self.tool.display(), "running external clone detector");
        let output = Command::new(&self.tool)
            .arg(ctx.old.root.as_str())
            .arg(ctx.new.root.as_str())
            .output()
            .map_err(|e| ForkError::detector_failed(self.name(), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(ForkError::detector_failed(
                self.name(),
                format!("{} exited with {}: {}", self.tool.display(), output.status, stderr.trim()),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut mappings = LineageMapping::new();
        let mut used = BTreeSet::new();
        for (source, destination) in parse_pairs(&stdout) {
            let usable = ctx.old.contains(&source)
                && !ctx.mapped_sources.contains(&source)
                && !mappings.contains(&source)
                && ctx.is_open_destination(&destination)
                && !used.contains(&destination);
            if !usable {
                warn!(%source, %destination, "ignoring clone pair outside the open methods");
                continue;
            }
            used.insert(destination.clone());
            mappings.insert(MethodMapping::new(source, destination, MappingType::Identical));
        }
        Ok(mappings.into())
    }
}

/// Parse `old<TAB>new` lines.
pub fn parse_pairs(stdout: &str) -> Vec<(MethodIdentity, MethodIdentity)> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|line| {
            let (old, new) = line.split_once('\t')?;
            let (old, new) = (old.trim(), new.trim());
            if old.is_empty() || new.is_empty() {
                warn!(line, "malformed clone pair");
                return None;
            }
            Some((
                MethodIdentity::from_signature(old),
                MethodIdentity::from_signature(new),
            ))
        })
        .collect()
}
