//! Logging system with daily rotation using local timezone.

use anyhow::Result;
use logroller::{LogRollerBuilder, Rotation, RotationAge, TimeZone};
use std::fs;
use std::path::Path;
use time::macros::format_description;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::prelude::*;

use crate::config::Config;

const LOG_PREFIX: &str = "fork-sight";

/// Days of logs kept on disk, by rotation and by [`cleanup_old_logs`].
const KEEP_DAYS: u64 = 3;

/// Filter used when `RUST_LOG` is unset: everything from this crate.
const DEFAULT_FILTER: &str = "fork_sight=debug";

/// Install the file logger. Mining runs are long, so the whole session
/// goes to one daily file under `config.log_path`.
pub fn init(config: &Config) -> Result<()> {
    fs::create_dir_all(&config.log_path)?;
    let removed = cleanup_old_logs(&config.log_path)?;

    // File naming: fork-sight.YYYY-MM-DD
    let appender = LogRollerBuilder::new(config.log_path.as_path(), Path::new(LOG_PREFIX))
        .rotation(Rotation::AgeBased(RotationAge::Daily))
        .time_zone(TimeZone::Local)
        .max_keep_files(KEEP_DAYS as _)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create log roller: {}", e))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let time_format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let local_offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = OffsetTime::new(local_offset, time_format);

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_timer(timer),
        );

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set global subscriber: {}", e))?;

    // Flushes on drop; the process owns it until exit.
    std::mem::forget(guard);

    tracing::debug!(
        log_path = %config.log_path.display(),
        removed_logs = removed,
        "logging initialized"
    );
    Ok(())
}

/// Remove this tool's log files older than [`KEEP_DAYS`]. Returns how many
/// were removed.
pub fn cleanup_old_logs(log_path: &Path) -> Result<usize> {
    use std::time::{Duration, SystemTime};

    let cutoff = SystemTime::now() - Duration::from_secs(KEEP_DAYS * 24 * 60 * 60);
    let mut removed = 0;

    if !log_path.exists() {
        return Ok(removed);
    }

    for entry in fs::read_dir(log_path)? {
        let entry = entry?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if !filename.starts_with(LOG_PREFIX) {
            continue;
        }

        if let Ok(metadata) = entry.metadata()
            && let Ok(modified) = metadata.modified()
            && modified < cutoff
            && fs::remove_file(&path).is_ok()
        {
            removed += 1;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn set_file_modified_time(path: &Path, time: SystemTime) -> std::io::Result<()> {
        let since_epoch = time.duration_since(SystemTime::UNIX_EPOCH).unwrap();
        let secs = since_epoch.as_secs();
        let stamp = libc::timespec {
            tv_sec: secs as libc::time_t,
            tv_nsec: 0,
        };
        let times = [stamp, stamp];
        let c_path = std::ffi::CString::new(path.to_str().unwrap()).unwrap();
        let ret = unsafe { libc::utimensat(libc::AT_FDCWD, c_path.as_ptr(), times.as_ptr(), 0) };
        if ret == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    #[test]
    fn test_cleanup_removes_old_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let log_path = dir.path();

        let old_file = log_path.join("fork-sight.2020-01-01");
        fs::write(&old_file, "old log").unwrap();
        let four_days_ago = SystemTime::now() - Duration::from_secs(4 * 24 * 60 * 60);
        set_file_modified_time(&old_file, four_days_ago).unwrap();

        let recent_file = log_path.join("fork-sight.2026-10-16");
        fs::write(&recent_file, "recent log").unwrap();

        assert_eq!(cleanup_old_logs(log_path).unwrap(), 1);

        assert!(!old_file.exists(), "Old log file should be deleted");
        assert!(recent_file.exists(), "Recent log file should be kept");
    }

    #[test]
    fn test_cleanup_ignores_foreign_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let log_path = dir.path();

        let other_file = log_path.join("other-app.log");
        fs::write(&other_file, "other log").unwrap();
        let four_days_ago = SystemTime::now() - Duration::from_secs(4 * 24 * 60 * 60);
        set_file_modified_time(&other_file, four_days_ago).unwrap();

        cleanup_old_logs(log_path).unwrap();

        assert!(other_file.exists());
    }

    #[test]
    fn test_cleanup_nonexistent_dir() {
        let result = cleanup_old_logs(Path::new("/tmp/nonexistent_fork_sight_log_dir"));
        assert_eq!(result.unwrap(), 0);
    }

    #[test]
    fn test_cleanup_ignores_subdirectories() {
        let dir = tempfile::TempDir::new().unwrap();
        let subdir = dir.path().join("fork-sight.subdir");
        fs::create_dir(&subdir).unwrap();

        cleanup_old_logs(dir.path()).unwrap();

        assert!(subdir.exists());
    }
}
