//! Per-session capture counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of the counters, serialized as the first line of the capture log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStats {
    /// GET completions that entered the pipeline.
    pub total: u64,
    pub saved: u64,
    pub ignored_already_in_disk: u64,
    pub ignored_not_in_whitelist: u64,
    pub error: u64,
}

/// Live counters shared by the handler and in-flight saves of one session run.
#[derive(Debug, Default)]
pub struct StatsCounters {
    total: AtomicU64,
    saved: AtomicU64,
    ignored_already_in_disk: AtomicU64,
    ignored_not_in_whitelist: AtomicU64,
    error: AtomicU64,
}

impl StatsCounters {
    pub fn record_total(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_saved(&self) {
        self.saved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_already_in_disk(&self) {
        self.ignored_already_in_disk.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_in_whitelist(&self) {
        self.ignored_not_in_whitelist.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CaptureStats {
        CaptureStats {
            total: self.total.load(Ordering::Relaxed),
            saved: self.saved.load(Ordering::Relaxed),
            ignored_already_in_disk: self.ignored_already_in_disk.load(Ordering::Relaxed),
            ignored_not_in_whitelist: self.ignored_not_in_whitelist.load(Ordering::Relaxed),
            error: self.error.load(Ordering::Relaxed),
        }
    }
}

/// Human-readable size: kilobytes below 100 KB, megabytes above (decimal units).
pub fn format_size(bytes: u64) -> String {
    let kb = bytes as f64 / 1000.0;
    if kb >= 100.0 {
        format!("{:.2} MB", kb / 1000.0)
    } else {
        format!("{:.2} KB", kb)
    }
}
