//! Capture settings: the `key=value` file read once at startup.
//!
//! ```text
//! captureOnStart=1
//! overwriteMode=2
//! disableLogs=0
//! ```
//!
//! Malformed lines and unknown keys are skipped with a warning; nothing in
//! this file is ever fatal.

use crate::overwrite::OverwriteMode;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Start capturing as soon as the engine is up.
    pub capture_on_start: bool,
    pub overwrite_mode: OverwriteMode,
    /// Do not write capture log artifacts.
    pub disable_logs: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            capture_on_start: false,
            overwrite_mode: OverwriteMode::Weekly,
            disable_logs: true,
        }
    }
}

impl CaptureSettings {
    pub fn parse(text: &str) -> Self {
        let mut settings = CaptureSettings::default();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                tracing::warn!("capture settings line {}: expected key=value", lineno + 1);
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "captureOnStart" => match parse_flag(value) {
                    Some(v) => settings.capture_on_start = v,
                    None => tracing::warn!("captureOnStart: invalid value {:?}", value),
                },
                "overwriteMode" => settings.overwrite_mode = OverwriteMode::from_config_value(value),
                "disableLogs" => match parse_flag(value) {
                    Some(v) => settings.disable_logs = v,
                    None => tracing::warn!("disableLogs: invalid value {:?}", value),
                },
                other => tracing::warn!("capture settings: unknown key {:?}", other),
            }
        }
        settings
    }

    /// Reads the settings file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("no capture settings at {}; using defaults", path.display());
            return Ok(CaptureSettings::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read capture settings {}", path.display()))?;
        Ok(Self::parse(&text))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}
