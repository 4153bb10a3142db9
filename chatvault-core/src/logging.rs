//! Logging infrastructure for chatvault
//!
//! Stdout belongs to command output and views, so diagnostics go to a
//! daily-rotated file under the XDG state directory
//! (`~/.local/state/chatvault/chatvault.log.YYYY-MM-DD`). Cache runs are
//! often driven by cron, which would otherwise accumulate one file per day
//! indefinitely; `LoggingConfig::max_files` bounds how many rotated files
//! survive an init.

use crate::config::{Config, LoggingConfig};
use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Rotated files are `<prefix>.<date>`; the date suffix makes name order
/// equal age order.
const LOG_FILE_PREFIX: &str = "chatvault.log";

/// Initialize the logging system
///
/// Prunes rotated log files down to `config.max_files`, then installs a
/// daily-rotating file subscriber. The level comes from `RUST_LOG` when
/// set, else from `config.level`.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_dir = Config::state_dir();

    std::fs::create_dir_all(&log_dir)?;

    // Prune before the appender opens today's file, so today never counts
    // against the budget
    let pruned = prune_rotated_logs(&log_dir, config.max_files)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);

    // Non-blocking writer so the ingest hot path never waits on the log file
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        max_files = config.max_files,
        pruned,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Delete the oldest rotated log files, keeping at most `max_files`.
///
/// `max_files == 0` disables pruning. Returns how many files were removed;
/// a file that cannot be deleted is skipped, not fatal.
fn prune_rotated_logs(log_dir: &Path, max_files: usize) -> Result<usize> {
    if max_files == 0 {
        return Ok(0);
    }

    let mut rotated: Vec<PathBuf> = std::fs::read_dir(log_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(LOG_FILE_PREFIX))
                    .unwrap_or(false)
        })
        .collect();

    if rotated.len() <= max_files {
        return Ok(0);
    }

    // Date-suffixed names sort oldest-first
    rotated.sort();
    let excess = rotated.len() - max_files;
    let mut removed = 0;
    for path in rotated.into_iter().take(excess) {
        if std::fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }

    Ok(removed)
}

/// Initialize logging for tests (logs to the test writer)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Guard that keeps the logging system alive
///
/// When dropped, flushes any pending log writes.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Returns the log file path
pub fn log_file_path() -> PathBuf {
    Config::log_path()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch_rotated(dir: &Path, date: &str) -> PathBuf {
        let path = dir.join(format!("{LOG_FILE_PREFIX}.{date}"));
        std::fs::write(&path, "log line\n").unwrap();
        path
    }

    #[test]
    fn test_prune_removes_oldest_beyond_budget() {
        let dir = TempDir::new().unwrap();
        for date in [
            "2025-10-01",
            "2025-10-02",
            "2025-10-03",
            "2025-10-04",
            "2025-10-05",
        ] {
            touch_rotated(dir.path(), date);
        }

        let removed = prune_rotated_logs(dir.path(), 2).unwrap();
        assert_eq!(removed, 3);

        let mut remaining: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok().and_then(|e| e.file_name().into_string().ok()))
            .collect();
        remaining.sort();
        assert_eq!(
            remaining,
            vec!["chatvault.log.2025-10-04", "chatvault.log.2025-10-05"]
        );
    }

    #[test]
    fn test_prune_under_budget_is_a_noop() {
        let dir = TempDir::new().unwrap();
        touch_rotated(dir.path(), "2025-10-01");
        touch_rotated(dir.path(), "2025-10-02");

        let removed = prune_rotated_logs(dir.path(), 5).unwrap();
        assert_eq!(removed, 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_prune_zero_budget_keeps_everything() {
        let dir = TempDir::new().unwrap();
        touch_rotated(dir.path(), "2025-10-01");
        touch_rotated(dir.path(), "2025-10-02");

        let removed = prune_rotated_logs(dir.path(), 0).unwrap();
        assert_eq!(removed, 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_prune_ignores_unrelated_files() {
        let dir = TempDir::new().unwrap();
        touch_rotated(dir.path(), "2025-10-01");
        touch_rotated(dir.path(), "2025-10-02");
        touch_rotated(dir.path(), "2025-10-03");
        std::fs::write(dir.path().join("users.parquet"), "not a log").unwrap();

        let removed = prune_rotated_logs(dir.path(), 1).unwrap();
        assert_eq!(removed, 2);
        assert!(dir.path().join("users.parquet").exists());
        assert!(dir.path().join("chatvault.log.2025-10-03").exists());
    }

    #[test]
    fn test_log_file_path() {
        let path = log_file_path();
        assert!(path.ends_with("chatvault.log"));
    }
}
