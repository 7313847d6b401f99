use anyhow::Result;
use clap::Parser;
use rayon::prelude::*;

use fork_sight::cli::{Cli, Commands};
use fork_sight::config::{Config, ConfigService};
use fork_sight::doctor;
use fork_sight::engine::mining::UnitOutcome;
use fork_sight::error::{ErrorCode, ForkError};
use fork_sight::service::{AnalyzeParams, AppService, MineParams};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        println!("{}", make_error_line(&e));
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn classify_error(e: &anyhow::Error) -> (String, String) {
    if let Some(fe) = e.downcast_ref::<ForkError>() {
        (fe.code.to_string(), fe.message.clone())
    } else {
        ("IO_ERROR".to_string(), format!("{e:#}"))
    }
}

fn serialize_output(value: &impl serde::Serialize, pretty: bool) -> Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(value)?)
    } else {
        Ok(serde_json::to_string(value)?)
    }
}

fn make_error_line(e: &anyhow::Error) -> String {
    let (code, message) = classify_error(e);
    let obj = serde_json::json!({ "error": { "code": code, "message": message } });
    obj.to_string()
}

enum DirInput {
    Single(String),
    Batch(Vec<String>),
}

fn resolve_dirs(
    dir: Option<&str>,
    dirs: Option<&str>,
    dirs_file: Option<&str>,
) -> Result<DirInput> {
    if let Some(d) = dir {
        Ok(DirInput::Single(d.to_string()))
    } else if let Some(ds) = dirs {
        let list: Vec<String> = ds
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(DirInput::Batch(list))
    } else if let Some(df) = dirs_file {
        let content = std::fs::read_to_string(df)?;
        let list: Vec<String> = content
            .lines()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(DirInput::Batch(list))
    } else {
        Err(ForkError::new(
            ErrorCode::InvalidRequest,
            "One of --dir, --dirs, or --dirs-file is required",
        )
        .into())
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

fn run(cli: Cli) -> Result<()> {
    let pretty = cli.pretty;

    // Load configuration
    let mut config = ConfigService::load(cli.config.as_deref())?;

    // Initialize logging if debug mode (CLI flag or config)
    if cli.debug || config.debug {
        fork_sight::logger::init(&config)?;
    }

    // Handle early-exit commands before creating AppService
    match &cli.command {
        Commands::Init { path } => {
            let config_path = if let Some(p) = path {
                ConfigService::generate_at(p)?;
                p.clone()
            } else {
                ConfigService::generate_default()?;
                ConfigService::default_path()
            };
            eprintln!("Configuration file created at: {}", config_path.display());
            return Ok(());
        }
        Commands::Doctor => return cmd_doctor(&config, pretty),
        _ => {}
    }

    match cli.command {
        Commands::Analyze {
            name,
            ancestor,
            upstream,
            fork,
            output_dir,
            clone_detector,
            similarity,
        } => {
            if let Some(path) = clone_detector {
                config.clone_detector = Some(path);
            }
            if let Some(threshold) = similarity {
                config.similarity_threshold = checked_threshold(threshold)?;
            }
            let service = AppService::new(config);
            let params = AnalyzeParams {
                name: &name,
                ancestor: &ancestor,
                upstream: &upstream,
                fork: &fork,
                output_dir: output_dir.as_deref(),
            };
            cmd_analyze(&service, &params, pretty)
        }
        Commands::Methods {
            dir,
            dirs,
            dirs_file,
        } => {
            let service = AppService::new(config);
            let input = resolve_dirs(dir.as_deref(), dirs.as_deref(), dirs_file.as_deref())?;
            match input {
                DirInput::Single(d) => cmd_methods(&service, &d, pretty),
                DirInput::Batch(ds) => batch_methods(&service, &ds),
            }
        }
        Commands::Mine {
            input,
            repo,
            name,
            commit,
            subsystem,
            force,
            workdir,
            output_dir,
            keep_workdirs,
        } => {
            if let Some(dir) = workdir {
                config.mining.workdir = dir;
            }
            if let Some(dir) = output_dir {
                config.mining.output_dir = dir;
            }
            config.mining.keep_workdirs |= keep_workdirs;
            let service = AppService::new(config);
            let params = MineParams {
                input: input.as_deref(),
                repo: repo.as_deref(),
                name: name.as_deref(),
                commit: commit.as_deref(),
                subsystem: subsystem.as_deref(),
                force,
            };
            cmd_mine(&service, &params)
        }
        Commands::Init { .. } | Commands::Doctor => unreachable!("handled above"),
    }
}

fn checked_threshold(threshold: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ForkError::new(
            ErrorCode::InvalidRequest,
            format!("--similarity must be in [0.0, 1.0], got {threshold}"),
        )
        .into());
    }
    Ok(threshold)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_analyze(service: &AppService, params: &AnalyzeParams<'_>, pretty: bool) -> Result<()> {
    let result = service.analyze(params)?;
    let output = serialize_output(&result, pretty)?;
    println!("{output}");
    Ok(())
}

fn cmd_methods(service: &AppService, dir: &str, pretty: bool) -> Result<()> {
    let listing = service.extract_methods(dir)?;
    let output = serialize_output(&listing, pretty)?;
    println!("{output}");
    Ok(())
}

/// One NDJSON line per analysis unit as it finishes, then the totals.
fn cmd_mine(service: &AppService, params: &MineParams<'_>) -> Result<()> {
    let mut emit = |outcome: &UnitOutcome| {
        let line = serde_json::to_string(outcome).unwrap_or_else(|e| make_error_line(&e.into()));
        println!("{line}");
    };
    let summary = service.mine(params, &mut emit)?;
    println!("{}", serde_json::json!({ "summary": summary }));
    Ok(())
}

fn cmd_doctor(config: &Config, pretty: bool) -> Result<()> {
    let report = doctor::run_doctor(config);
    let output = serialize_output(&report, pretty)?;
    println!("{output}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Batch processing (NDJSON output, rayon parallel)
// ---------------------------------------------------------------------------

fn batch_methods(service: &AppService, dirs: &[String]) -> Result<()> {
    let results: Vec<String> = dirs
        .par_iter()
        .map(|d| match service.extract_methods(d) {
            Ok(listing) => {
                serde_json::to_string(&listing).unwrap_or_else(|e| make_error_line(&e.into()))
            }
            Err(e) => make_error_line(&e),
        })
        .collect();

    for line in &results {
        println!("{line}");
    }
    Ok(())
}
