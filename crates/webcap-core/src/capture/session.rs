//! Capture session lifecycle: STOPPED <-> RUNNING.

use super::handler::SessionObserver;
use super::inflight::{ActiveKeys, InFlight};
use super::log::CaptureLog;
use super::markers::SelfIssuedMarkers;
use super::stats::{CaptureStats, StatsCounters};
use super::{CaptureStatus, NoopShell, ShellNotifier};
use crate::clock::{Clock, SystemClock};
use crate::mirror_index::DownloadedIndex;
use crate::network::{CompletionFilter, NetworkLayer, PreSendHook, SubscriptionId};
use crate::overwrite::{ModeCell, OverwriteMode, OverwritePolicy};
use crate::url_model::PathMapper;
use crate::whitelist::Whitelist;
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;

/// State of one RUNNING period. Saves spawned during the run keep it alive
/// after `stop()`, but nothing reads it once it has been taken.
pub(crate) struct CaptureRun {
    pub(crate) stats: StatsCounters,
    pub(crate) log: Option<CaptureLog>,
}

impl CaptureRun {
    /// Appends one record to the capture log, if the log is enabled.
    pub(crate) fn record(&self, line: &str) {
        if let Some(log) = &self.log {
            log.append(line);
        }
    }
}

pub(crate) struct SessionInner {
    pub(crate) network: Arc<dyn NetworkLayer>,
    pub(crate) whitelist: Whitelist,
    pub(crate) mapper: PathMapper,
    pub(crate) index: Arc<DownloadedIndex>,
    pub(crate) policy: OverwritePolicy,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) mode: ModeCell,
    pub(crate) log_dir: Option<PathBuf>,
    pub(crate) notifier: Arc<dyn ShellNotifier>,
    pub(crate) runtime: Handle,
    pub(crate) markers: Arc<SelfIssuedMarkers>,
    pub(crate) active_keys: Arc<ActiveKeys>,
    pub(crate) in_flight: Arc<InFlight>,
    run: Mutex<Option<Arc<CaptureRun>>>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl SessionInner {
    fn lock_run(&self) -> MutexGuard<'_, Option<Arc<CaptureRun>>> {
        self.run.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn current_run(&self) -> Option<Arc<CaptureRun>> {
        self.lock_run().clone()
    }
}

/// Builder for [`CaptureSession`].
///
/// ```no_run
/// # use std::sync::Arc;
/// # use webcap_core::capture::CaptureSession;
/// # use webcap_core::network::CurlNetwork;
/// # use webcap_core::whitelist::Whitelist;
/// # fn demo(handle: tokio::runtime::Handle) -> anyhow::Result<()> {
/// let session = CaptureSession::builder(Arc::new(CurlNetwork::default()), "/srv/mirror")
///     .with_whitelist(Whitelist::from_lines(["*"]))
///     .with_log_dir("/var/log/webcap")
///     .build(handle)?;
/// session.start()?;
/// # Ok(())
/// # }
/// ```
pub struct CaptureSessionBuilder {
    network: Arc<dyn NetworkLayer>,
    mirror_root: PathBuf,
    whitelist: Whitelist,
    index: Option<Arc<DownloadedIndex>>,
    mode: OverwriteMode,
    log_dir: Option<PathBuf>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn ShellNotifier>,
}

impl CaptureSessionBuilder {
    pub fn with_whitelist(mut self, whitelist: Whitelist) -> Self {
        self.whitelist = whitelist;
        self
    }

    /// Uses an already bootstrapped index instead of walking the mirror in `build`.
    pub fn with_index(mut self, index: Arc<DownloadedIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_overwrite_mode(mut self, mode: OverwriteMode) -> Self {
        self.mode = mode;
        self
    }

    /// Directory for capture log artifacts. Without one, logs are disabled.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ShellNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Builds the session in STOPPED state. Follow-up saves run as blocking
    /// tasks on `runtime`.
    pub fn build(self, runtime: Handle) -> Result<CaptureSession> {
        let mapper = PathMapper::new(self.mirror_root);
        let index = match self.index {
            Some(index) => index,
            None => {
                let (index, summary) = DownloadedIndex::bootstrap(&mapper).with_context(|| {
                    format!("failed to index mirror {}", mapper.root().display())
                })?;
                tracing::debug!(entries = summary.entries, "mirror indexed");
                Arc::new(index)
            }
        };

        Ok(CaptureSession {
            inner: Arc::new(SessionInner {
                network: self.network,
                whitelist: self.whitelist,
                mapper,
                index,
                policy: OverwritePolicy::new(Arc::clone(&self.clock)),
                clock: self.clock,
                mode: ModeCell::new(self.mode),
                log_dir: self.log_dir,
                notifier: self.notifier,
                runtime,
                markers: Arc::new(SelfIssuedMarkers::default()),
                active_keys: Arc::new(ActiveKeys::default()),
                in_flight: Arc::new(InFlight::default()),
                run: Mutex::new(None),
                subscription: Mutex::new(None),
            }),
        })
    }
}

/// Orchestrates capture: subscribes to GET completions, filters them through
/// the whitelist and overwrite policy, and mirrors what passes to disk.
///
/// Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct CaptureSession {
    pub(crate) inner: Arc<SessionInner>,
}

impl CaptureSession {
    pub fn builder(
        network: Arc<dyn NetworkLayer>,
        mirror_root: impl Into<PathBuf>,
    ) -> CaptureSessionBuilder {
        CaptureSessionBuilder {
            network,
            mirror_root: mirror_root.into(),
            whitelist: Whitelist::default(),
            index: None,
            mode: OverwriteMode::default(),
            log_dir: None,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(NoopShell),
        }
    }

    /// STOPPED -> RUNNING. Returns `Ok(false)` when already running.
    ///
    /// Fails (and stays STOPPED) only if the mirror root cannot be created. A
    /// log artifact that cannot be opened disables logging for this run.
    pub fn start(&self) -> Result<bool> {
        let inner = &self.inner;
        let mut run = inner.lock_run();
        if run.is_some() {
            tracing::warn!("Already capturing.");
            return Ok(false);
        }

        fs::create_dir_all(inner.mapper.root()).with_context(|| {
            format!(
                "failed to create mirror root {}",
                inner.mapper.root().display()
            )
        })?;

        let log = match &inner.log_dir {
            None => None,
            Some(dir) => match CaptureLog::create(dir) {
                Ok(log) => Some(log),
                Err(e) => {
                    tracing::warn!(
                        "cannot open capture log in {}: {}; logging disabled",
                        dir.display(),
                        e
                    );
                    None
                }
            },
        };
        let toast = match &log {
            Some(log) => format!("Capture started at {}", log.file_name()),
            None => "Capture started (log disabled)".to_string(),
        };

        *run = Some(Arc::new(CaptureRun {
            stats: StatsCounters::default(),
            log,
        }));

        let hook: Arc<dyn PreSendHook> = inner.markers.clone();
        inner.network.set_pre_send_hook(Some(hook));
        let observer = Arc::new(SessionObserver::new(&self.inner));
        let subscription = inner
            .network
            .subscribe(CompletionFilter::get_only(), observer);
        *inner.subscription.lock().unwrap_or_else(|e| e.into_inner()) = Some(subscription);
        drop(run);

        let mode = inner.mode.get();
        tracing::info!(%mode, root = %inner.mapper.root().display(), "capture started");
        inner.notifier.toast(&toast);
        inner.notifier.status_changed(CaptureStatus::On, mode);
        Ok(true)
    }

    /// RUNNING -> STOPPED. Returns the final stats, or `None` if not running.
    ///
    /// Saves already in flight keep running; see [`CaptureSession::drain`].
    pub fn stop(&self) -> Option<CaptureStats> {
        let inner = &self.inner;
        let mut run = inner.lock_run();
        let Some(finished) = run.take() else {
            tracing::warn!("Capture already disabled.");
            return None;
        };
        let subscription = inner
            .subscription
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(id) = subscription {
            inner.network.unsubscribe(id);
        }
        drop(run);

        let stats = finished.stats.snapshot();
        let toast = match &finished.log {
            Some(log) => {
                if let Err(e) = log.write_stats(&stats) {
                    tracing::warn!("failed to write stats to {}: {}", log.path().display(), e);
                }
                format!("Capture stopped at {}", log.file_name())
            }
            None => "Capture stopped (log disabled)".to_string(),
        };

        tracing::info!(
            total = stats.total,
            saved = stats.saved,
            already_in_disk = stats.ignored_already_in_disk,
            not_in_whitelist = stats.ignored_not_in_whitelist,
            errors = stats.error,
            "capture stopped"
        );
        inner.notifier.toast(&toast);
        inner
            .notifier
            .status_changed(CaptureStatus::Off, inner.mode.get());
        Some(stats)
    }

    pub fn status(&self) -> CaptureStatus {
        if self.inner.lock_run().is_some() {
            CaptureStatus::On
        } else {
            CaptureStatus::Off
        }
    }

    pub fn is_running(&self) -> bool {
        self.status() == CaptureStatus::On
    }

    /// Live counters of the current run (`None` when stopped).
    pub fn stats(&self) -> Option<CaptureStats> {
        self.inner.current_run().map(|run| run.stats.snapshot())
    }

    pub fn overwrite_mode(&self) -> OverwriteMode {
        self.inner.mode.get()
    }

    /// Changes the mode for decisions taken from now on.
    pub fn set_overwrite_mode(&self, mode: OverwriteMode) {
        let previous = self.inner.mode.set(mode);
        if previous == mode {
            return;
        }
        tracing::info!(from = %previous, to = %mode, "overwrite mode changed");
        if let Some(run) = self.inner.current_run() {
            run.record(&format!("Overwrite changed to: {}", mode.label()));
        }
        self.inner.notifier.status_changed(self.status(), mode);
    }

    pub fn index(&self) -> &Arc<DownloadedIndex> {
        &self.inner.index
    }

    pub fn mapper(&self) -> &PathMapper {
        &self.inner.mapper
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.inner.whitelist
    }

    /// Path of the current run's capture log, if any.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.inner
            .current_run()
            .and_then(|run| run.log.as_ref().map(|log| log.path().to_path_buf()))
    }

    /// Number of follow-up saves still running.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.count()
    }

    /// Waits until every follow-up save issued so far has finished.
    pub async fn drain(&self) {
        self.inner.in_flight.wait_idle().await;
    }
}
