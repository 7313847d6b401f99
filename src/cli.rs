use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "fork-sight",
    version,
    about = "Compare how a fork and its upstream evolved the same Java methods"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Pretty-print JSON output (default: compact)
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Path to configuration file
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify ancestor->upstream and ancestor->fork changes and write a report
    Analyze {
        /// Analysis name; the report is written to <output-dir>/<name>.csv
        #[arg(short, long)]
        name: String,

        /// Common ancestor source tree
        #[arg(long)]
        ancestor: String,

        /// Upstream source tree
        #[arg(long)]
        upstream: String,

        /// Fork source tree
        #[arg(long)]
        fork: String,

        /// Report directory (default: mining.output_dir from config)
        #[arg(short, long)]
        output_dir: Option<String>,

        /// External clone detector executable (overrides config)
        #[arg(long)]
        clone_detector: Option<std::path::PathBuf>,

        /// Minimum body similarity for refactoring matches (0.0 to 1.0)
        #[arg(long)]
        similarity: Option<f64>,
    },

    /// List the methods extracted from a source tree
    Methods {
        /// Source tree (single mode)
        #[arg(short, long)]
        dir: Option<String>,

        /// Comma-separated source trees (batch mode, NDJSON output)
        #[arg(long, conflicts_with = "dir")]
        dirs: Option<String>,

        /// File containing source trees, one per line (batch mode)
        #[arg(long, conflicts_with_all = ["dir", "dirs"])]
        dirs_file: Option<String>,
    },

    /// Mine fork repositories for upstream merges (NDJSON output)
    Mine {
        /// Repository list: a .csv file or a directory of them
        #[arg(short, long, conflicts_with = "repo")]
        input: Option<String>,

        /// Repository URL for a targeted run
        #[arg(long, requires_all = ["name", "commit"])]
        repo: Option<String>,

        /// Repository name for a targeted run
        #[arg(long)]
        name: Option<String>,

        /// Merge commit for a targeted run
        #[arg(long)]
        commit: Option<String>,

        /// Subsystem source directory for a targeted run (default: src)
        #[arg(long)]
        subsystem: Option<String>,

        /// Re-run analyses whose report already exists
        #[arg(long)]
        force: bool,

        /// Working directory for clones and snapshots (overrides config)
        #[arg(long)]
        workdir: Option<std::path::PathBuf>,

        /// Report directory (overrides config)
        #[arg(short, long)]
        output_dir: Option<std::path::PathBuf>,

        /// Keep copied snapshots after each analysis
        #[arg(long)]
        keep_workdirs: bool,
    },

    /// Check grammar, git and clone detector availability
    Doctor,

    /// Generate default configuration file
    Init {
        /// Path to write the configuration file (default: ~/.config/fork-sight/config.toml)
        #[arg(short, long)]
        path: Option<std::path::PathBuf>,
    },
}
