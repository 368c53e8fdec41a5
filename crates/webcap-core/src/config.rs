use crate::network::CurlOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory name used under every XDG base directory.
pub const APP_DIR: &str = "webcap";

/// Engine configuration loaded from `~/.config/webcap/config.toml`.
///
/// Every path is optional; unset paths fall back to XDG locations (see
/// [`EnginePaths::xdg_defaults`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root of the on-disk mirror.
    #[serde(default)]
    pub mirror_dir: Option<PathBuf>,
    /// Whitelist rule file.
    #[serde(default)]
    pub whitelist_file: Option<PathBuf>,
    /// `key=value` capture settings file (`captureOnStart`, `overwriteMode`, `disableLogs`).
    #[serde(default)]
    pub capture_cfg: Option<PathBuf>,
    /// Directory for capture log artifacts.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// libcurl tunables for the built-in network layer.
    #[serde(default)]
    pub network: CurlOptions,
}

/// Fully resolved file locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePaths {
    pub mirror_dir: PathBuf,
    pub whitelist_file: PathBuf,
    pub capture_cfg: PathBuf,
    pub log_dir: PathBuf,
}

impl EnginePaths {
    /// `$XDG_DATA_HOME/webcap/mirror`, `$XDG_CONFIG_HOME/webcap/{whitelist.txt,capture.cfg}`
    /// and `$XDG_STATE_HOME/webcap/capture-logs`.
    pub fn xdg_defaults() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_DIR)?;
        let config_home = xdg_dirs.get_config_home().join(APP_DIR);
        Ok(EnginePaths {
            mirror_dir: xdg_dirs.get_data_home().join(APP_DIR).join("mirror"),
            whitelist_file: config_home.join("whitelist.txt"),
            capture_cfg: config_home.join("capture.cfg"),
            log_dir: xdg_dirs.get_state_home().join(APP_DIR).join("capture-logs"),
        })
    }
}

impl EngineConfig {
    /// Resolves configured paths, falling back to XDG defaults.
    pub fn resolve_paths(&self) -> Result<EnginePaths> {
        Ok(self.resolve_against(EnginePaths::xdg_defaults()?))
    }

    pub fn resolve_against(&self, defaults: EnginePaths) -> EnginePaths {
        EnginePaths {
            mirror_dir: self.mirror_dir.clone().unwrap_or(defaults.mirror_dir),
            whitelist_file: self
                .whitelist_file
                .clone()
                .unwrap_or(defaults.whitelist_file),
            capture_cfg: self.capture_cfg.clone().unwrap_or(defaults.capture_cfg),
            log_dir: self.log_dir.clone().unwrap_or(defaults.log_dir),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let cfg: EngineConfig = toml::from_str(&data)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(cfg)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_DIR)?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<EngineConfig> {
    load_or_init_at(&config_path()?)
}

pub fn load_or_init_at(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let default_cfg = EngineConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    EngineConfig::load_from(path)
}
