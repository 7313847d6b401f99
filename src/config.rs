//! Configuration loading and generation.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Enable debug logging to file
    pub debug: bool,

    /// Path to log directory
    pub log_path: PathBuf,

    /// External clone detector executable (built-in token matcher when unset)
    pub clone_detector: Option<PathBuf>,

    /// Minimum body similarity for refactoring and argument-change matches
    pub similarity_threshold: f64,

    /// Repository mining settings
    pub mining: MiningConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            log_path: default_log_path(),
            clone_detector: None,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            mining: MiningConfig::default(),
        }
    }
}

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.75;

/// Settings for `mine`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    /// Where repositories are cloned and snapshots are copied
    pub workdir: PathBuf,

    /// Where reports are written
    pub output_dir: PathBuf,

    /// Fork branches to scan for upstream merges, in order
    pub branches: Vec<String>,

    /// How many first-parent commits to walk per branch
    pub max_merge_commits: usize,

    /// File whose directory marks a subsystem
    pub subsystem_marker: String,

    /// Source directory below each subsystem
    pub source_dir: String,

    /// Keep copied snapshots after each analysis
    pub keep_workdirs: bool,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("input").join("repos"),
            output_dir: PathBuf::from("output"),
            branches: [
                "lineage-15.1",
                "lineage-15.0",
                "cm-14.1",
                "cm-14.0",
                "cm-13.0",
                "cm-12.1",
                "cm-12.0",
                "cm-11.0",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_merge_commits: 200,
            subsystem_marker: "AndroidManifest.xml".to_string(),
            source_dir: "src".to_string(),
            keep_workdirs: false,
        }
    }
}

/// Default log path: ~/.config/fork-sight/logs
fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("fork-sight")
        .join("logs")
}

/// Configuration service.
pub struct ConfigService;

impl ConfigService {
    /// Get the default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("fork-sight")
            .join("config.toml")
    }

    /// Load configuration from file.
    ///
    /// If `path` is `None`, uses the default path.
    /// If the file doesn't exist, returns default configuration.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = path.map(PathBuf::from).unwrap_or_else(Self::default_path);
        let config_dir = path.parent();

        if !path.exists() {
            let mut config = Config::default();
            if let Some(dir) = config_dir {
                config.log_path = dir.join("logs");
            }
            return Ok(config);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        // If log_path was not explicitly set, use config file's directory/logs
        if config.log_path == default_log_path()
            && let Some(dir) = config_dir
        {
            config.log_path = dir.join("logs");
        }

        if !(0.0..=1.0).contains(&config.similarity_threshold) {
            anyhow::bail!(
                "similarity_threshold must be in [0.0, 1.0], got {} ({})",
                config.similarity_threshold,
                path.display()
            );
        }

        Ok(config)
    }

    /// Generate default configuration file at the default path.
    pub fn generate_default() -> Result<()> {
        Self::generate_at(&Self::default_path())
    }

    /// Generate default configuration file at the specified path.
    pub fn generate_at(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = Self::default_config_content();
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Generate default configuration content with comments.
    fn default_config_content() -> String {
        r#"# fork-sight configuration file
# https://github.com/owayo/fork-sight

# Enable debug logging to file (default: false)
debug = false

# Path to log directory (default: ~/.config/fork-sight/logs)
# log_path = "~/.config/fork-sight/logs"

# External clone detector, invoked as `<tool> <old_root> <new_root>` and expected
# to print `old_signature<TAB>new_signature` lines (default: built-in matcher)
# clone_detector = "/opt/clone-detector/bin/pairs"

# Minimum body similarity for refactoring / argument-change matches (default: 0.75)
similarity_threshold = 0.75

[mining]
# workdir = "input/repos"
# output_dir = "output"
# branches = ["lineage-15.1", "lineage-15.0", "cm-14.1", "cm-14.0", "cm-13.0", "cm-12.1", "cm-12.0", "cm-11.0"]
max_merge_commits = 200
subsystem_marker = "AndroidManifest.xml"
source_dir = "src"
keep_workdirs = false
"#
        .to_string()
    }
}
