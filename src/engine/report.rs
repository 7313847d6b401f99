//! Delimited text report.
//!
//! ```text
//! ancestor,upstream,fork
//! <cell>,<cell>,<cell>,<cell>,<cell>,<rowTotal>     x5, one per upstream type
//! upstreamOnlyAdded,forkOnlyAdded,distinctMutual(identicalMutual)
//! ```

use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::error::{ErrorCode, ForkError};
use crate::models::mapping::MappingType;
use crate::models::table::AnalysisReport;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn render_report(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{},{},{}",
        report.ancestor_methods, report.upstream_methods, report.fork_methods
    );

    for upstream in MappingType::REPORTED {
        let cells: Vec<String> = MappingType::REPORTED
            .iter()
            .map(|fork| report.table.cell(upstream, *fork).to_string())
            .collect();
        let _ = writeln!(out, "{},{}", cells.join(","), report.table.row_total(upstream));
    }

    let added = report.table.row(MappingType::Added);
    let cell = |t: MappingType| {
        added
            .and_then(|row| row.get(&t))
            .copied()
            .unwrap_or_default()
    };
    // Always `x(y)`, even when nothing is identical.
    let mutual = cell(MappingType::Added);
    let _ = writeln!(
        out,
        "{},{},{}({})",
        cell(MappingType::NotFound).count,
        cell(MappingType::Other).count,
        mutual.count,
        mutual.purged
    );
    out
}

pub fn report_path(output_dir: &Utf8Path, name: &str) -> Utf8PathBuf {
    output_dir.join(format!("{name}.csv"))
}

/// Write `<output_dir>/<name>.csv`. The file appears complete or not at all.
pub fn write_report(report: &AnalysisReport, output_dir: &Utf8Path) -> Result<Utf8PathBuf> {
    let path = report_path(output_dir, &report.name);
    atomic_write(path.as_std_path(), render_report(report).as_bytes()).map_err(|e| {
        ForkError::new(
            ErrorCode::IoError,
            format!("Failed to write report {path}: {e}"),
        )
    })?;
    debug!(path = %path, "report written");
    Ok(path)
}

fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = parent.join(format!(
        ".{file_name}.tmp.{}.{}",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let result = (|| -> std::io::Result<()> {
        let mut file: File = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
