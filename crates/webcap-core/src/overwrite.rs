//! Overwrite policy: whether an already-mirrored resource is fetched again.
//!
//! Freshness is purely local: the recorded modification time of the mirrored
//! file is compared with the clock. No HTTP validators are involved.

use crate::clock::Clock;
use crate::mirror_index::DownloadedIndex;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Age after which WEEKLY refreshes a resource.
pub const WEEKLY_THRESHOLD: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Age after which MONTHLY refreshes a resource.
pub const MONTHLY_THRESHOLD: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// How already-mirrored resources are treated. Discriminants match the
/// `overwriteMode` values of the capture settings file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum OverwriteMode {
    Never = 1,
    #[default]
    Weekly = 2,
    Monthly = 3,
    Always = 4,
}

impl OverwriteMode {
    /// Parses an `overwriteMode` value; anything unrecognized is WEEKLY.
    pub fn from_config_value(value: &str) -> Self {
        match value.trim() {
            "1" => OverwriteMode::Never,
            "2" => OverwriteMode::Weekly,
            "3" => OverwriteMode::Monthly,
            "4" => OverwriteMode::Always,
            _ => OverwriteMode::Weekly,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => OverwriteMode::Never,
            3 => OverwriteMode::Monthly,
            4 => OverwriteMode::Always,
            _ => OverwriteMode::Weekly,
        }
    }

    /// Label written to the capture log when the mode changes.
    pub fn label(self) -> &'static str {
        match self {
            OverwriteMode::Never => "NEVER_OVERWRITE",
            OverwriteMode::Weekly => "ALWAYS_OVERWRITE_EVERY_1_WEEK",
            OverwriteMode::Monthly => "ALWAYS_OVERWRITE_EVERY_1_MONTH",
            OverwriteMode::Always => "ALWAYS_OVERWRITE",
        }
    }

    /// Minimum age before an existing copy is replaced (`None` = never, zero = always).
    pub fn threshold(self) -> Option<Duration> {
        match self {
            OverwriteMode::Never => None,
            OverwriteMode::Weekly => Some(WEEKLY_THRESHOLD),
            OverwriteMode::Monthly => Some(MONTHLY_THRESHOLD),
            OverwriteMode::Always => Some(Duration::ZERO),
        }
    }
}

impl fmt::Display for OverwriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Process-wide overwrite mode, changeable at runtime from the UI shell.
/// Only decisions taken after a change observe it.
#[derive(Debug)]
pub struct ModeCell(AtomicU8);

impl ModeCell {
    pub fn new(mode: OverwriteMode) -> Self {
        ModeCell(AtomicU8::new(mode as u8))
    }

    pub fn get(&self) -> OverwriteMode {
        OverwriteMode::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Stores `mode` and returns the previous one.
    pub fn set(&self, mode: OverwriteMode) -> OverwriteMode {
        OverwriteMode::from_u8(self.0.swap(mode as u8, Ordering::AcqRel))
    }
}

/// Pure decision: should a resource last written at `recorded` be saved now?
///
/// No record always saves. A record in the future (clock skew) counts as fresh.
pub fn should_save(mode: OverwriteMode, recorded: Option<SystemTime>, now: SystemTime) -> bool {
    let Some(recorded) = recorded else {
        return true;
    };
    match mode.threshold() {
        None => false,
        Some(threshold) if threshold.is_zero() => true,
        Some(threshold) => now
            .duration_since(recorded)
            .map(|age| age >= threshold)
            .unwrap_or(false),
    }
}

/// Staleness policy bound to a clock, consulted against the downloaded index.
#[derive(Clone)]
pub struct OverwritePolicy {
    clock: Arc<dyn Clock>,
}

impl OverwritePolicy {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        OverwritePolicy { clock }
    }

    pub fn should_save(&self, index: &DownloadedIndex, url_key: &str, mode: OverwriteMode) -> bool {
        let recorded = index.get(url_key).map(|entry| entry.modified);
        should_save(mode, recorded, self.clock.now())
    }
}

/// Whole days in `age`, for log messages.
pub(crate) fn age_in_days(age: Duration) -> u64 {
    age.as_secs() / DAY.as_secs()
}
