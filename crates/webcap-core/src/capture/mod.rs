//! Capture session: turns observed browsing traffic into an on-disk mirror.
//!
//! While RUNNING, every completed GET reported by the network layer goes
//! through the pipeline in [`handler`]: whitelist check, mirror path
//! derivation, overwrite policy, then a self-issued follow-up fetch streamed
//! to disk. Outcomes are counted in [`CaptureStats`] and recorded in the
//! capture log artifact ([`CaptureLog`]).

mod error;
mod handler;
mod inflight;
mod log;
mod markers;
mod session;
mod stats;


pub use error::CaptureError;
pub use self::log::{log_file_name, CaptureLog};
pub use markers::{is_self_issued, SelfIssuedMarkers, MARKER_CAP, MARKER_HEADER, MARKER_TTL};
pub use session::{CaptureSession, CaptureSessionBuilder};
pub use stats::{format_size, CaptureStats, StatsCounters};

use crate::overwrite::OverwriteMode;
use std::fmt;

/// Capture state as shown by the UI shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    On,
    Off,
}

impl CaptureStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CaptureStatus::On => "ON",
            CaptureStatus::Off => "OFF",
        }
    }
}

impl fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// UI-shell side of the engine: status display and transient notifications.
pub trait ShellNotifier: Send + Sync {
    /// Called on every start, stop and overwrite-mode change.
    fn status_changed(&self, _status: CaptureStatus, _mode: OverwriteMode) {}

    fn toast(&self, _message: &str) {}
}

/// Shell that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopShell;

impl ShellNotifier for NoopShell {}
