//! Repository mining: find upstream merges in fork branches and analyze
//! every subsystem they touch.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::MiningConfig;
use crate::engine::git::Git;
use crate::error::{ErrorCode, ForkError};

static UPSTREAM_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"android-\d+\S*?_r\d+").unwrap());

const VERSION_LINE_PREFIX: &str = "versions:";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RepoEntry {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub repositories: Vec<RepoEntry>,
}

/// Parse one repository list. Returns the offending line when the file
/// does not look like a repository list at all.
pub fn parse_repo_list(text: &str) -> Result<Vec<RepoEntry>, String> {
    let mut repos = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with(['!', '#', '/']) {
            continue;
        }
        if line.to_lowercase().starts_with(VERSION_LINE_PREFIX) {
            continue;
        }
        let cells: Vec<&str> = line.split(',').collect();
        if cells.len() < 3 {
            return Err(line.to_string());
        }
        repos.push(RepoEntry {
            name: cells[0].trim().to_string(),
            url: cells[2].trim().to_string(),
        });
    }
    Ok(repos)
}

/// Projects from a `.csv` file, a directory of them, or a directory of
/// project directories.
pub fn load_projects(input: &Path) -> Result<Vec<Project>> {
    if !input.exists() {
        bail!(ForkError::file_not_found(&input.display().to_string()));
    }
    if input.is_file() {
        let name = stem(input);
        return Ok(vec![Project {
            repositories: read_lists(&[input.to_path_buf()]),
            name,
        }]);
    }

    let mut projects = Vec::new();
    let mut csvs = Vec::new();
    let mut subdirs = Vec::new();
    for entry in fs::read_dir(input)? {
        let path = entry?.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if is_csv(&path) {
            csvs.push(path);
        }
    }
    csvs.sort();
    subdirs.sort();

    if !csvs.is_empty() {
        projects.push(Project {
            name: stem(input),
            repositories: read_lists(&csvs),
        });
    }
    for dir in subdirs {
        let mut files: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| is_csv(p))
            .collect();
        if files.is_empty() {
            continue;
        }
        files.sort();
        projects.push(Project {
            name: stem(&dir),
            repositories: read_lists(&files),
        });
    }
    Ok(projects)
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Read and merge lists, deduplicated by repository name.
fn read_lists(files: &[PathBuf]) -> Vec<RepoEntry> {
    let mut seen = BTreeSet::new();
    let mut repos = Vec::new();
    for file in files {
        let text = match fs::read_to_string(file) {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %file.display(), error = %e, "unreadable repository list");
                continue;
            }
        };
        match parse_repo_list(&text) {
            Ok(entries) => {
                for repo in entries {
                    if seen.insert(repo.name.clone()) {
                        repos.push(repo);
                    }
                }
            }
            Err(line) => {
                warn!(path = %file.display(), line = %line, "not a repository list; skipped");
            }
        }
    }
    repos
}

/// A merge of upstream into a fork branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeCommit {
    pub hash: String,
    pub fork_parent: String,
    pub upstream_parent: String,
    pub common_ancestor: String,
    pub upstream_tag: Option<String>,
}

pub fn upstream_tag(message: &str) -> Option<String> {
    UPSTREAM_TAG.find(message).map(|m| m.as_str().to_string())
}

/// `None` unless `hash` has at least two parents.
pub fn describe_merge(git: &Git, hash: &str) -> Result<Option<MergeCommit>> {
    let parents = git.parents(hash)?;
    let [fork_parent, upstream_parent, ..] = parents.as_slice() else {
        return Ok(None);
    };
    let common_ancestor = git.merge_base(fork_parent, upstream_parent)?;
    let message = git.message(hash)?;
    Ok(Some(MergeCommit {
        hash: hash.to_string(),
        fork_parent: fork_parent.clone(),
        upstream_parent: upstream_parent.clone(),
        common_ancestor,
        upstream_tag: upstream_tag(&message),
    }))
}

/// Merge commits on the first-parent chain of HEAD, oldest first.
pub fn find_merge_commits(git: &Git, max_commits: usize) -> Result<Vec<MergeCommit>> {
    let mut merges = Vec::new();
    for hash in git.first_parent_chain(max_commits)? {
        if let Some(merge) = describe_merge(git, &hash)? {
            merges.push(merge);
        }
    }
    merges.reverse();
    Ok(merges)
}

/// A directory analyzed as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subsystem {
    pub name: String,
    /// Source directory, relative to the repository root
    pub source_path: String,
}

/// Test and sample code is not analyzed.
pub fn is_excluded(relative: &str) -> bool {
    let path = format!("/{relative}");
    path.contains("/test") || path.contains("Test") || path.to_lowercase().contains("example")
}

fn join_rel(dir: &str, child: &str) -> String {
    if dir.is_empty() {
        child.to_string()
    } else {
        format!("{dir}/{child}")
    }
}

struct Listing {
    markers: BTreeSet<String>,
    dirs: BTreeSet<String>,
}

fn listing(files: &[String], marker: &str) -> Listing {
    let mut markers = BTreeSet::new();
    let mut dirs = BTreeSet::new();
    for file in files {
        let (dir, name) = file.rsplit_once('/').unwrap_or(("", file.as_str()));
        if name == marker {
            markers.insert(dir.to_string());
        }
        let mut end = 0;
        while let Some(pos) = file[end..].find('/') {
            end += pos;
            dirs.insert(file[..end].to_string());
            end += 1;
        }
    }
    Listing { markers, dirs }
}

/// Subsystems present at the ancestor and at both merge parents.
pub fn find_subsystems(
    git: &Git,
    merge: &MergeCommit,
    marker: &str,
    source_dir: &str,
) -> Result<Vec<Subsystem>> {
    let listings = [
        &merge.common_ancestor,
        &merge.upstream_parent,
        &merge.fork_parent,
    ]
    .into_iter()
    .map(|commit| Ok(listing(&git.tracked_files(commit)?, marker)))
    .collect::<Result<Vec<_>>>()?;

    let mut found = Vec::new();
    for dir in &listings[0].markers {
        if !listings[1..].iter().all(|l| l.markers.contains(dir)) || is_excluded(dir) {
            continue;
        }
        let source_path = join_rel(dir, source_dir);
        if !listings.iter().all(|l| l.dirs.contains(&source_path)) {
            continue;
        }
        let name = match dir.rsplit('/').next() {
            Some(last) if !last.is_empty() => last.to_string(),
            _ => "src".to_string(),
        };
        found.push(Subsystem { name, source_path });
    }
    Ok(found)
}

pub fn analysis_name(repo: &str, subsystem: &str, hash: &str, merges_cleanly: bool) -> String {
    let status = if merges_cleanly { "nc" } else { "c" };
    format!("{repo}-{subsystem}-{hash}-{status}")
}

/// Copy a directory tree, `.git` excluded.
pub fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    use ignore::WalkBuilder;

    if !from.is_dir() {
        bail!(ForkError::file_not_found(&from.display().to_string()));
    }
    fs::create_dir_all(to)?;
    let walker = WalkBuilder::new(from)
        .standard_filters(false)
        .filter_entry(|e| e.file_name() != ".git")
        .build();
    for entry in walker {
        let entry = entry?;
        let rel = entry.path().strip_prefix(from)?;
        let target = to.join(rel);
        match entry.file_type() {
            Some(ft) if ft.is_dir() => fs::create_dir_all(&target)?,
            Some(ft) if ft.is_file() => {
                fs::copy(entry.path(), &target).with_context(|| {
                    format!("Failed to copy {}", entry.path().display())
                })?;
            }
            _ => {}
        }
    }
    Ok(())
}

/// One analysis to run over copied snapshots.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub name: String,
    pub ancestor: PathBuf,
    pub upstream: PathBuf,
    pub fork: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Ok,
    Skipped,
    Failed,
}

/// Result of one mining unit, printed as one NDJSON line.
#[derive(Debug, Clone, Serialize)]
pub struct UnitOutcome {
    pub analysis: String,
    pub status: UnitStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Utf8PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UnitOutcome {
    fn failed(analysis: impl Into<String>, e: &anyhow::Error) -> Self {
        Self {
            analysis: analysis.into(),
            status: UnitStatus::Failed,
            report: None,
            error: Some(e.to_string()),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MiningSummary {
    pub ok: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl MiningSummary {
    fn record(&mut self, status: UnitStatus) {
        match status {
            UnitStatus::Ok => self.ok += 1,
            UnitStatus::Skipped => self.skipped += 1,
            UnitStatus::Failed => self.failed += 1,
        }
    }
}

/// Drives mining. `runner` performs one analysis and returns the report path.
pub struct Miner<'a, R> {
    config: &'a MiningConfig,
    force: bool,
    runner: R,
    summary: MiningSummary,
}

impl<'a, R> Miner<'a, R>
where
    R: FnMut(&AnalysisJob) -> Result<Utf8PathBuf>,
{
    pub fn new(config: &'a MiningConfig, force: bool, runner: R) -> Self {
        Self {
            config,
            force,
            runner,
            summary: MiningSummary::default(),
        }
    }

    pub fn summary(&self) -> MiningSummary {
        self.summary
    }

    fn emit(&mut self, outcome: UnitOutcome, sink: &mut dyn FnMut(&UnitOutcome)) {
        self.summary.record(outcome.status);
        sink(&outcome);
    }

    pub fn mine_projects(
        &mut self,
        projects: &[Project],
        sink: &mut dyn FnMut(&UnitOutcome),
    ) -> Result<MiningSummary> {
        for project in projects {
            let output_dir = self.config.output_dir.join(&project.name);
            fs::create_dir_all(&output_dir)?;
            fs::write(
                self.config.output_dir.join(format!("repos_{}.txt", project.name)),
                project.repositories.len().to_string(),
            )?;
            info!(
                project = %project.name,
                repositories = project.repositories.len(),
                "mining project"
            );

            for (index, repo) in project.repositories.iter().enumerate() {
                info!(
                    repo = %repo.name,
                    index = index + 1,
                    total = project.repositories.len(),
                    "mining repository"
                );
                if let Err(e) = self.mine_repository(&project.name, repo, &output_dir, sink) {
                    error!(repo = %repo.name, error = %e, "repository failed");
                    self.emit(UnitOutcome::failed(&repo.name, &e), sink);
                }
            }
        }
        Ok(self.summary)
    }

    pub fn mine_repository(
        &mut self,
        project: &str,
        repo: &RepoEntry,
        output_dir: &Path,
        sink: &mut dyn FnMut(&UnitOutcome),
    ) -> Result<()> {
        let checkout = self.config.workdir.join(&repo.name).join(project);
        let git = Git::clone_into(&repo.url, &checkout)?;

        for branch in &self.config.branches {
            if !git.switch_branch(branch)? {
                debug!(repo = %repo.name, branch = %branch, "branch not found");
                continue;
            }
            let merges = find_merge_commits(&git, self.config.max_merge_commits)?;
            info!(repo = %repo.name, branch = %branch, merges = merges.len(), "merge commits found");

            for merge in &merges {
                if let Err(e) = self.mine_commit(&git, &repo.name, merge, output_dir, sink) {
                    error!(repo = %repo.name, commit = %merge.hash, error = %e, "merge commit failed");
                    let unit = format!("{}-{}", repo.name, merge.hash);
                    self.emit(UnitOutcome::failed(unit, &e), sink);
                }
            }
        }
        Ok(())
    }

    pub fn mine_commit(
        &mut self,
        git: &Git,
        repo: &str,
        merge: &MergeCommit,
        output_dir: &Path,
        sink: &mut dyn FnMut(&UnitOutcome),
    ) -> Result<()> {
        let clean = git.merges_cleanly(&merge.fork_parent, &merge.upstream_parent)?;
        let subsystems = find_subsystems(
            git,
            merge,
            &self.config.subsystem_marker,
            &self.config.source_dir,
        )?;
        debug!(commit = %merge.hash, clean, subsystems = subsystems.len(), "merge replayed");

        for subsystem in &subsystems {
            let outcome = self.mine_unit(git, repo, subsystem, merge, clean, output_dir);
            self.emit(outcome, sink);
        }
        Ok(())
    }

    /// Analyze one subsystem at one merge. Never fails: errors become a
    /// `failed` outcome and the copied snapshots are removed.
    pub fn mine_unit(
        &mut self,
        git: &Git,
        repo: &str,
        subsystem: &Subsystem,
        merge: &MergeCommit,
        clean: bool,
        output_dir: &Path,
    ) -> UnitOutcome {
        let name = analysis_name(repo, &subsystem.name, &merge.hash, clean);
        if !self.force && output_dir.join(format!("{name}.csv")).exists() {
            info!(analysis = %name, "analysis already performed; skipping");
            return UnitOutcome {
                analysis: name,
                status: UnitStatus::Skipped,
                report: None,
                error: None,
            };
        }

        let compare_root = self.config.workdir.join(repo).join(&name);
        let result = self.prepare_and_run(git, &name, subsystem, merge, &compare_root, output_dir);
        if !self.config.keep_workdirs
            && compare_root.exists()
            && let Err(e) = fs::remove_dir_all(&compare_root)
        {
            warn!(path = %compare_root.display(), error = %e, "failed to remove snapshots");
        }

        match result {
            Ok(report) => UnitOutcome {
                analysis: name,
                status: UnitStatus::Ok,
                report: Some(report),
                error: None,
            },
            Err(e) => {
                error!(analysis = %name, error = %e, "analysis failed");
                UnitOutcome::failed(name, &e)
            }
        }
    }

    fn prepare_and_run(
        &mut self,
        git: &Git,
        name: &str,
        subsystem: &Subsystem,
        merge: &MergeCommit,
        compare_root: &Path,
        output_dir: &Path,
    ) -> Result<Utf8PathBuf> {
        let source = git.path().join(&subsystem.source_path);
        let ao_an = compare_root.join("AO-AN");
        let ao_cm = compare_root.join("AO-CM");

        git.reset_to(&merge.common_ancestor)?;
        copy_tree(&source, &ao_an.join("old"))?;
        copy_tree(&source, &ao_cm.join("old"))?;
        git.reset_to(&merge.upstream_parent)?;
        copy_tree(&source, &ao_an.join("new"))?;
        git.reset_to(&merge.fork_parent)?;
        copy_tree(&source, &ao_cm.join("new"))?;

        (self.runner)(&AnalysisJob {
            name: name.to_string(),
            ancestor: ao_an.join("old"),
            upstream: ao_an.join("new"),
            fork: ao_cm.join("new"),
            output_dir: output_dir.to_path_buf(),
        })
    }

    /// Analyze one known merge commit of one subsystem.
    pub fn mine_targeted(
        &mut self,
        repo: &RepoEntry,
        commit: &str,
        subsystem_path: &str,
        sink: &mut dyn FnMut(&UnitOutcome),
    ) -> Result<MiningSummary> {
        let checkout = self.config.workdir.join(&repo.name).join("CM");
        let git = Git::clone_into(&repo.url, &checkout)?;
        let merge = describe_merge(&git, commit)?.ok_or_else(|| {
            ForkError::new(
                ErrorCode::InvalidRequest,
                format!("{commit} is not a merge commit"),
            )
        })?;
        let clean = git.merges_cleanly(&merge.fork_parent, &merge.upstream_parent)?;

        let trimmed = subsystem_path.trim_matches('/');
        let subsystem = Subsystem {
            name: if trimmed.is_empty() {
                "src".to_string()
            } else {
                trimmed.replace('/', "_")
            },
            source_path: trimmed.to_string(),
        };
        let output_dir = self.config.output_dir.clone();
        fs::create_dir_all(&output_dir)?;
        let outcome = self.mine_unit(&git, &repo.name, &subsystem, &merge, clean, &output_dir);
        self.emit(outcome, sink);
        Ok(self.summary)
    }
}
