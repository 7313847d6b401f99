use anyhow::{Result, bail};
use camino::Utf8PathBuf;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::aggregate::{self, Universes};
use crate::engine::lineage::LineageMapper;
use crate::engine::mining::{self, AnalysisJob, Miner, MiningSummary, RepoEntry, UnitOutcome};
use crate::engine::{extractor, report};
use crate::error::{ErrorCode, ForkError};
use crate::models::method::{MethodModel, Snapshot};
use crate::models::table::{AddedStats, AnalysisReport};

// ---------------------------------------------------------------------------
// AppService: core logic shared by every CLI command
// ---------------------------------------------------------------------------

pub struct AppService {
    config: Config,
}

/// Parameters for one analysis run.
pub struct AnalyzeParams<'a> {
    pub name: &'a str,
    pub ancestor: &'a str,
    pub upstream: &'a str,
    pub fork: &'a str,
    /// Defaults to the configured mining output directory
    pub output_dir: Option<&'a str>,
}

/// What `analyze` prints.
#[derive(Debug, Serialize)]
pub struct AnalyzeOutput {
    pub report: AnalysisReport,
    pub added: AddedStats,
    pub upstream_mapped: usize,
    pub fork_mapped: usize,
    pub output: Utf8PathBuf,
}

/// What `methods` prints.
#[derive(Debug, Serialize)]
pub struct MethodListing {
    pub root: Utf8PathBuf,
    pub count: usize,
    pub methods: Vec<MethodModel>,
}

/// Parameters for `mine`. A repository URL selects a targeted run.
#[derive(Default)]
pub struct MineParams<'a> {
    pub input: Option<&'a str>,
    pub repo: Option<&'a str>,
    pub name: Option<&'a str>,
    pub commit: Option<&'a str>,
    pub subsystem: Option<&'a str>,
    pub force: bool,
}

impl AppService {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Validation helpers
    // -----------------------------------------------------------------------

    /// Validate and canonicalize a directory path. Returns the canonical path.
    fn validate_dir(&self, dir: &str) -> Result<PathBuf> {
        let canonical = std::fs::canonicalize(dir).map_err(|_| {
            warn!(dir = dir, "validate_dir: directory not found");
            ForkError::new(
                ErrorCode::FileNotFound,
                format!("Directory not found: {dir}"),
            )
        })?;
        if !canonical.is_dir() {
            bail!(ForkError::new(
                ErrorCode::InvalidRequest,
                format!("Not a directory: {dir}"),
            ));
        }
        Ok(canonical)
    }

    /// Analysis names become file names.
    fn validate_name(&self, name: &str) -> Result<()> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            bail!(ForkError::new(
                ErrorCode::InvalidRequest,
                format!("Invalid analysis name: {name:?}"),
            ));
        }
        Ok(())
    }

    fn utf8(path: &Path) -> Result<Utf8PathBuf> {
        Utf8PathBuf::from_path_buf(path.to_path_buf()).map_err(|p| {
            ForkError::new(
                ErrorCode::InvalidRequest,
                format!("Non UTF-8 path: {}", p.display()),
            )
            .into()
        })
    }

    // -----------------------------------------------------------------------
    // Core operations
    // -----------------------------------------------------------------------

    /// Map both lineages, aggregate and write `<output_dir>/<name>.csv`.
    pub fn analyze(&self, p: &AnalyzeParams<'_>) -> Result<AnalyzeOutput> {
        debug!(
            name = p.name,
            ancestor = p.ancestor,
            upstream = p.upstream,
            fork = p.fork,
            output_dir = ?p.output_dir,
            "analyze called"
        );
        self.validate_name(p.name)?;
        let ancestor = self.validate_dir(p.ancestor)?;
        let upstream = self.validate_dir(p.upstream)?;
        let fork = self.validate_dir(p.fork)?;
        let output_dir = match p.output_dir {
            Some(d) => PathBuf::from(d),
            None => self.config.mining.output_dir.clone(),
        };

        let output = self.run_analysis(p.name, &ancestor, &upstream, &fork, &output_dir)?;
        debug!(
            name = p.name,
            upstream_mapped = output.upstream_mapped,
            fork_mapped = output.fork_mapped,
            output = %output.output,
            "analyze completed"
        );
        Ok(output)
    }

    fn run_analysis(
        &self,
        name: &str,
        ancestor: &Path,
        upstream: &Path,
        fork: &Path,
        output_dir: &Path,
    ) -> Result<AnalyzeOutput> {
        let ancestor = extractor::extract_snapshot(ancestor)?;
        let upstream = extractor::extract_snapshot(upstream)?;
        let fork = extractor::extract_snapshot(fork)?;

        let mapper = LineageMapper::from_config(&self.config);
        let up = mapper.map(&ancestor, &upstream)?;
        let fk = mapper.map(&ancestor, &fork)?;

        let universes = Universes {
            ancestor: &ancestor,
            upstream: &upstream,
            fork: &fork,
        };
        let report = aggregate::aggregate(name, universes, &up.mapping, &fk.mapping)?;
        let output = report::write_report(&report, &Self::utf8(output_dir)?)?;

        Ok(AnalyzeOutput {
            added: report.added(),
            report,
            upstream_mapped: up.mapping.len(),
            fork_mapped: fk.mapping.len(),
            output,
        })
    }

    /// List the methods extracted from a source tree.
    pub fn extract_methods(&self, dir: &str) -> Result<MethodListing> {
        debug!(dir = dir, "extract_methods called");
        let canonical = self.validate_dir(dir)?;
        let snapshot: Snapshot = extractor::extract_snapshot(&canonical)?;
        let listing = MethodListing {
            root: snapshot.root.clone(),
            count: snapshot.len(),
            methods: snapshot.methods.into_values().collect(),
        };
        debug!(dir = dir, methods = listing.count, "extract_methods completed");
        Ok(listing)
    }

    /// Mine repositories, reporting each unit to `sink` as it finishes.
    pub fn mine(
        &self,
        p: &MineParams<'_>,
        sink: &mut dyn FnMut(&UnitOutcome),
    ) -> Result<MiningSummary> {
        debug!(
            input = ?p.input,
            repo = ?p.repo,
            commit = ?p.commit,
            subsystem = ?p.subsystem,
            force = p.force,
            "mine called"
        );
        let runner = |job: &AnalysisJob| -> Result<Utf8PathBuf> {
            info!(analysis = %job.name, "running analysis");
            self.run_analysis(
                &job.name,
                &job.ancestor,
                &job.upstream,
                &job.fork,
                &job.output_dir,
            )
            .map(|o| o.output)
        };
        let mut miner = Miner::new(&self.config.mining, p.force, runner);

        let summary = match (p.repo, p.input) {
            (Some(url), _) => {
                let (Some(name), Some(commit)) = (p.name, p.commit) else {
                    bail!(ForkError::new(
                        ErrorCode::InvalidRequest,
                        "A targeted run needs --repo, --name and --commit",
                    ));
                };
                self.validate_name(name)?;
                let repo = RepoEntry {
                    name: name.to_string(),
                    url: url.to_string(),
                };
                miner.mine_targeted(&repo, commit, p.subsystem.unwrap_or("src"), sink)?
            }
            (None, Some(input)) => {
                let projects = mining::load_projects(Path::new(input))?;
                miner.mine_projects(&projects, sink)?
            }
            (None, None) => bail!(ForkError::new(
                ErrorCode::InvalidRequest,
                "Either an input list or --repo is required",
            )),
        };

        debug!(
            ok = summary.ok,
            skipped = summary.skipped,
            failed = summary.failed,
            "mine completed"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::mapping::MappingType;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn service() -> AppService {
        AppService::new(Config::default())
    }

    #[test]
    fn analyze_end_to_end() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path();
        let ancestor = "package p;\nclass A {\n  int f() { return 1; }\n  int g(int x) { return x * 2 + 1; }\n  void gone() { cleanup(); }\n}\n";
        let upstream = "package p;\nclass A {\n  int f() { return 1; }\n  int g(int x, int y) { return x * 2 + y; }\n  void added() { System.out.println(\"hi\"); }\n}\n";
        let fork = "package p;\nclass A {\n  int f() { return 2; }\n  int g(int x, int y) { return x * 2 + y; }\n  void gone() { cleanup(); }\n  void added() { System.out.println(\"hi\"); }\n}\n";
        write(root, "ao/p/A.java", ancestor);
        write(root, "an/p/A.java", upstream);
        write(root, "cm/p/A.java", fork);
        let out_dir = root.join("out");

        let svc = service();
        let output = svc
            .analyze(&AnalyzeParams {
                name: "demo",
                ancestor: root.join("ao").to_str().unwrap(),
                upstream: root.join("an").to_str().unwrap(),
                fork: root.join("cm").to_str().unwrap(),
                output_dir: Some(out_dir.to_str().unwrap()),
            })
            .unwrap();

        let t = &output.report.table;
        assert_eq!(output.report.ancestor_methods, 3);
        assert_eq!(t.cell(MappingType::Identical, MappingType::BodyChangeOnly).count, 1);
        // Same new signature on both sides: purged.
        assert_eq!(
            t.cell(MappingType::ArgumentsChange, MappingType::ArgumentsChange).purged,
            1
        );
        assert_eq!(t.cell(MappingType::NotFound, MappingType::Identical).count, 1);
        assert_eq!(output.added.mutual, 1);
        assert_eq!(output.added.identical_mutual, 1);

        let text = std::fs::read_to_string(out_dir.join("demo.csv")).unwrap();
        assert!(text.starts_with("3,3,4\n"));
        assert!(text.ends_with("1,1,0(1)\n"));
    }

    #[test]
    fn analyze_rejects_missing_dir_and_bad_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let existing = dir.path().to_str().unwrap();
        let svc = service();

        let err = svc
            .analyze(&AnalyzeParams {
                name: "x",
                ancestor: "/nonexistent/fork-sight/ao",
                upstream: existing,
                fork: existing,
                output_dir: None,
            })
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ForkError>().unwrap().code,
            ErrorCode::FileNotFound
        );

        let err = svc
            .analyze(&AnalyzeParams {
                name: "../escape",
                ancestor: existing,
                upstream: existing,
                fork: existing,
                output_dir: None,
            })
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ForkError>().unwrap().code,
            ErrorCode::InvalidRequest
        );
    }

    #[test]
    fn methods_listing() {
        let dir = tempfile::TempDir::new().unwrap();
        write(dir.path(), "p/A.java", "package p; class A { void f(java.util.List<String> l) {} }");
        let listing = service()
            .extract_methods(dir.path().to_str().unwrap())
            .unwrap();
        assert_eq!(listing.count, 1);
        assert_eq!(listing.methods[0].identity.as_str(), "p.A.f(java.util.List)");
    }

    #[test]
    fn mine_requires_input_or_repo() {
        let err = service()
            .mine(&MineParams::default(), &mut |_: &UnitOutcome| {})
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ForkError>().unwrap().code,
            ErrorCode::InvalidRequest
        );

        let err = service()
            .mine(
                &MineParams {
                    repo: Some("https://example.org/repo.git"),
                    ..MineParams::default()
                },
                &mut |_: &UnitOutcome| {},
            )
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ForkError>().unwrap().code,
            ErrorCode::InvalidRequest
        );
    }
}
