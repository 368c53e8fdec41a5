//! Capture log artifact.
//!
//! One file per session run under the log directory. The first line is
//! reserved for the JSON stats snapshot written at stop; every following
//! line is a human-readable event record, appended as events happen.

use super::stats::CaptureStats;
use chrono::{DateTime, Local};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// `capture-log 2024-05-01 13-45-10.txt`
pub fn log_file_name(at: &DateTime<Local>) -> String {
    format!("capture-log {}.txt", at.format("%Y-%m-%d %H-%M-%S"))
}

#[derive(Debug)]
pub struct CaptureLog {
    path: PathBuf,
    file_name: String,
    // Serializes appends against the stats rewrite.
    lock: Mutex<()>,
}

impl CaptureLog {
    /// Creates a new log in `dir` named after the current local time.
    pub fn create(dir: &Path) -> io::Result<Self> {
        Self::create_named(dir, log_file_name(&Local::now()))
    }

    pub fn create_named(dir: &Path, file_name: String) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(&file_name);
        fs::write(&path, "\n")?;
        Ok(CaptureLog {
            path,
            file_name,
            lock: Mutex::new(()),
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one event record. Failures are logged, never returned: the
    /// artifact is best effort and must not disturb capture.
    pub fn append(&self, record: &str) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = self.append_locked(record) {
            tracing::warn!("capture log append failed ({}): {}", self.path.display(), e);
        }
    }

    fn append_locked(&self, record: &str) -> io::Result<()> {
        if !self.path.exists() {
            // Removed underneath us; start over with a fresh reserved line.
            if let Some(dir) = self.path.parent() {
                fs::create_dir_all(dir)?;
            }
            fs::write(&self.path, "\n")?;
        }
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(record.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// Replaces the reserved first line with `stats` as JSON.
    pub fn write_stats(&self, stats: &CaptureStats) -> io::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::from("\n"),
            Err(e) => return Err(e),
        };
        let records = content.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
        let json = serde_json::to_string(stats).map_err(io::Error::other)?;
        fs::write(&self.path, format!("{json}\n{records}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_name_uses_local_timestamp() {
        let at = Local.with_ymd_and_hms(2024, 5, 1, 13, 45, 10).unwrap();
        assert_eq!(log_file_name(&at), "capture-log 2024-05-01 13-45-10.txt");
    }

    #[test]
    fn stats_replace_reserved_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let log = CaptureLog::create_named(dir.path(), "capture-log test.txt".to_string()).unwrap();
        log.append("Ignored (not in whitelist): https://ads.example.com/a");
        log.append("Saved (new file): https://example.com/ [1.00 KB]");

        let stats = CaptureStats {
            total: 2,
            saved: 1,
            ignored_not_in_whitelist: 1,
            ..CaptureStats::default()
        };
        log.write_stats(&stats).unwrap();
        log.write_stats(&stats).unwrap();

        let text = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        let parsed: CaptureStats = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed, stats);
        assert_eq!(lines[1], "Ignored (not in whitelist): https://ads.example.com/a");
        assert_eq!(lines[2], "Saved (new file): https://example.com/ [1.00 KB]");
    }

    #[test]
    fn append_recreates_deleted_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = CaptureLog::create(&dir.path().join("logs")).unwrap();
        assert!(log.file_name().starts_with("capture-log "));
        fs::remove_file(log.path()).unwrap();

        log.append("Ignored (already in disk): https://example.com/a.js");
        let text = fs::read_to_string(log.path()).unwrap();
        assert_eq!(text, "\nIgnored (already in disk): https://example.com/a.js\n");
    }

    #[test]
    fn append_recreates_deleted_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let log = CaptureLog::create(&logs).unwrap();
        fs::remove_dir_all(&logs).unwrap();

        log.append("Saved (new file): https://example.com/a.js [0.01 KB]");
        log.append("Ignored (already in disk): https://example.com/a.js");
        let text = fs::read_to_string(log.path()).unwrap();
        assert_eq!(
            text,
            "\nSaved (new file): https://example.com/a.js [0.01 KB]\nIgnored (already in disk): https://example.com/a.js\n"
        );
    }
}
