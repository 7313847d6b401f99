//! Thin wrapper over the `git` command line.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Result, bail};
use tracing::debug;

use crate::error::ForkError;

/// Whether a `git` executable is on `PATH`.
pub fn available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

#[derive(Debug, Clone)]
pub struct Git {
    repo: PathBuf,
}

impl Git {
    pub fn open(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    pub fn path(&self) -> &Path {
        &self.repo
    }

    /// Clone `url` into `dest` unless a checkout is already there.
    pub fn clone_into(url: &str, dest: &Path) -> Result<Self> {
        if dest.join(".git").exists() {
            debug!(dest = %dest.display(), "repository already cloned");
            return Ok(Self::open(dest));
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let output = Command::new("git")
            .arg("clone")
            .arg("--quiet")
            .arg(url)
            .arg(dest)
            .output()
            .map_err(|e| ForkError::git(format!("failed to run git: {e}")))?;
        check("clone", &output)?;
        Ok(Self::open(dest))
    }

    fn command(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(args)
            .output()
            .map_err(|e| ForkError::git(format!("failed to run git: {e}")).into())
    }

    /// Run and return trimmed stdout; a non-zero exit is a `GIT_ERROR`.
    fn run(&self, args: &[&str]) -> Result<String> {
        let output = self.command(args)?;
        check(args.first().copied().unwrap_or("git"), &output)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Switch to a local branch, creating it from `origin` when needed.
    /// Returns `false` when no such branch exists.
    pub fn switch_branch(&self, branch: &str) -> Result<bool> {
        self.run(&["reset", "--quiet", "--hard"])?;
        let local = format!("refs/heads/{branch}");
        let remote = format!("refs/remotes/origin/{branch}");
        if self.command(&["rev-parse", "--verify", "--quiet", &local])?.status.success() {
            self.run(&["checkout", "--quiet", "--force", branch])?;
            return Ok(true);
        }
        if self.command(&["rev-parse", "--verify", "--quiet", &remote])?.status.success() {
            let upstream = format!("origin/{branch}");
            self.run(&["checkout", "--quiet", "--force", "-b", branch, &upstream])?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Up to `max` commits along the first-parent chain from HEAD, newest first.
    pub fn first_parent_chain(&self, max: usize) -> Result<Vec<String>> {
        let count = format!("--max-count={max}");
        let out = self.run(&["rev-list", "--first-parent", &count, "HEAD"])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    pub fn parents(&self, commit: &str) -> Result<Vec<String>> {
        let out = self.run(&["log", "-1", "--format=%P", commit])?;
        Ok(out.split_whitespace().map(str::to_string).collect())
    }

    pub fn message(&self, commit: &str) -> Result<String> {
        self.run(&["log", "-1", "--format=%B", commit])
    }

    pub fn merge_base(&self, a: &str, b: &str) -> Result<String> {
        self.run(&["merge-base", a, b])
    }

    /// Reset the work tree to `commit` (detached).
    pub fn reset_to(&self, commit: &str) -> Result<()> {
        self.run(&["checkout", "--quiet", "--force", "--detach", commit])?;
        self.run(&["clean", "-fdq"])?;
        Ok(())
    }

    /// Replay merging `theirs` into `ours`. Returns `true` when git merges
    /// without conflicts and `false` when it stops on conflicted paths.
    /// Any other merge failure is a `GIT_ERROR`. The tree is left at `ours`.
    pub fn merges_cleanly(&self, ours: &str, theirs: &str) -> Result<bool> {
        self.reset_to(ours)?;
        let output = self.command(&[
            "-c",
            "user.name=fork-sight",
            "-c",
            "user.email=fork-sight@localhost",
            "merge",
            "--no-commit",
            "--no-ff",
            theirs,
        ])?;
        let outcome = if output.status.success() {
            Ok(true)
        } else {
            match self.run(&["diff", "--name-only", "--diff-filter=U"]) {
                Ok(unmerged) if !unmerged.is_empty() => {
                    debug!(ours, theirs, paths = unmerged.lines().count(), "merge conflicts");
                    Ok(false)
                }
                Ok(_) => Err(ForkError::git(format!(
                    "git merge failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ))
                .into()),
                Err(e) => Err(e),
            }
        };
        // Nothing to abort when the merge was a no-op.
        let _ = self.command(&["merge", "--abort"]);
        self.reset_to(ours)?;
        outcome
    }

    /// Every path tracked at `commit`, relative to the repository root.
    pub fn tracked_files(&self, commit: &str) -> Result<Vec<String>> {
        let out = self.run(&["ls-tree", "-r", "--name-only", commit])?;
        Ok(out.lines().map(str::to_string).collect())
    }
}

fn check(what: &str, output: &Output) -> Result<()> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(ForkError::git(format!("git {what} failed: {}", stderr.trim())));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;
    use std::process::Command;

    /// Run git in `dir` with a fixed identity, panicking on failure.
    pub fn git(dir: &Path, args: &[&str]) -> String {
        let output = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(["-c", "user.name=test", "-c", "user.email=test@example.com"])
            .args(["-c", "commit.gpgsign=false", "-c", "init.defaultBranch=main"])
            .args(args)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    pub fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn commit_all(dir: &Path, message: &str) -> String {
        git(dir, &["add", "-A"]);
        git(dir, &["commit", "-q", "-m", message]);
        git(dir, &["rev-parse", "HEAD"])
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{commit_all, git, write};
    use super::*;

    #[test]
    fn merge_replay_and_history() {
        if !available() {
            return;
        }
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path();
        git(root, &["init", "-q"]);
        write(root, "a.txt", "base\n");
        let base = commit_all(root, "base");

        git(root, &["checkout", "-q", "-b", "upstream"]);
        write(root, "a.txt", "upstream\n");
        let upstream = commit_all(root, "upstream change");

        git(root, &["checkout", "-q", "main"]);
        write(root, "a.txt", "fork\n");
        let fork = commit_all(root, "fork change");
        write(root, "b.txt", "other\n");
        let fork_other = commit_all(root, "fork unrelated");

        let repo = Git::open(root);
        assert_eq!(repo.merge_base(&fork, &upstream).unwrap(), base);
        assert_eq!(repo.parents(&fork).unwrap(), vec![base.clone()]);
        assert_eq!(repo.first_parent_chain(2).unwrap(), vec![fork_other.clone(), fork.clone()]);
        assert_eq!(repo.message(&fork).unwrap(), "fork change");

        assert!(!repo.merges_cleanly(&fork, &upstream).unwrap());
        assert_eq!(git(root, &["rev-parse", "HEAD"]), fork);
        assert!(repo.merges_cleanly(&base, &fork_other).unwrap());

        let files = repo.tracked_files(&fork_other).unwrap();
        assert_eq!(files, vec!["a.txt", "b.txt"]);
        assert!(repo.switch_branch("upstream").unwrap());
        assert!(!repo.switch_branch("cm-11.0").unwrap());
    }

    #[test]
    fn failing_command_is_git_error() {
        if !available() {
            return;
        }
        let dir = tempfile::TempDir::new().unwrap();
        let err = Git::open(dir.path()).parents("HEAD").unwrap_err();
        let fe = err.downcast_ref::<ForkError>().unwrap();
        assert_eq!(fe.code, crate::error::ErrorCode::GitError);
    }

    #[test]
    fn merge_of_unknown_revision_is_git_error_not_conflict() {
        if !available() {
            return;
        }
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path();
        git(root, &["init", "-q"]);
        write(root, "a.txt", "base\n");
        let base = commit_all(root, "base");

        let repo = Git::open(root);
        let err = repo.merges_cleanly(&base, "no-such-revision").unwrap_err();
        let fe = err.downcast_ref::<ForkError>().unwrap();
        assert_eq!(fe.code, crate::error::ErrorCode::GitError);
        assert!(fe.message.contains("merge"));
        assert_eq!(git(root, &["rev-parse", "HEAD"]), base);
    }
}
