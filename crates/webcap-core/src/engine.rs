//! Startup assembly: config -> whitelist -> index -> settings -> session.

use crate::capture::{format_size, CaptureSession, ShellNotifier};
use crate::config::{EngineConfig, EnginePaths};
use crate::mirror_index::DownloadedIndex;
use crate::network::{CurlNetwork, NetworkLayer};
use crate::settings::CaptureSettings;
use crate::url_model::PathMapper;
use crate::whitelist::Whitelist;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::runtime::Handle;

/// A ready-to-use capture engine for one hosting process.
pub struct CaptureEngine {
    session: CaptureSession,
    settings: CaptureSettings,
    paths: EnginePaths,
}

impl CaptureEngine {
    /// Loads everything the engine needs, in order, and auto-starts capture
    /// when `captureOnStart=1`.
    ///
    /// The mirror index is fully built before the session exists, so no
    /// capture decision ever sees a partial index.
    pub fn bootstrap(
        config: &EngineConfig,
        network: Arc<dyn NetworkLayer>,
        runtime: Handle,
    ) -> Result<Self> {
        let paths = config.resolve_paths()?;
        Self::bootstrap_with_paths(paths, network, runtime, None)
    }

    /// Bootstraps on the built-in libcurl network layer, configured from the
    /// `[network]` table. The host drives browsing through the returned network.
    pub fn bootstrap_with_curl(
        config: &EngineConfig,
        runtime: Handle,
    ) -> Result<(Self, Arc<CurlNetwork>)> {
        let network = Arc::new(CurlNetwork::new(config.network));
        let engine = Self::bootstrap(config, network.clone(), runtime)?;
        Ok((engine, network))
    }

    /// Like [`CaptureEngine::bootstrap`] with explicit paths and an optional UI shell.
    pub fn bootstrap_with_paths(
        paths: EnginePaths,
        network: Arc<dyn NetworkLayer>,
        runtime: Handle,
        notifier: Option<Arc<dyn ShellNotifier>>,
    ) -> Result<Self> {
        let whitelist = Whitelist::load(&paths.whitelist_file)?;

        let mapper = PathMapper::new(&paths.mirror_dir);
        let (index, summary) = DownloadedIndex::bootstrap(&mapper)
            .with_context(|| format!("failed to index mirror {}", paths.mirror_dir.display()))?;
        tracing::info!(
            "loaded downloaded entries: {} [{}]",
            summary.entries,
            format_size(summary.total_bytes)
        );
        if summary.skipped > 0 {
            tracing::debug!(skipped = summary.skipped, "files not indexed");
        }

        let settings = CaptureSettings::load(&paths.capture_cfg)?;

        let mut builder = CaptureSession::builder(network, &paths.mirror_dir)
            .with_whitelist(whitelist)
            .with_index(Arc::new(index))
            .with_overwrite_mode(settings.overwrite_mode);
        if !settings.disable_logs {
            builder = builder.with_log_dir(&paths.log_dir);
        }
        if let Some(notifier) = notifier {
            builder = builder.with_notifier(notifier);
        }
        let session = builder.build(runtime)?;

        if settings.capture_on_start {
            session.start()?;
        }

        Ok(CaptureEngine {
            session,
            settings,
            paths,
        })
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn paths(&self) -> &EnginePaths {
        &self.paths
    }

    /// Stops capture if running. Saves already in flight are left to finish.
    pub fn shutdown(&self) {
        if self.session.is_running() {
            self.session.stop();
        }
    }
}
