//! Per-event pipeline: whitelist -> path -> policy -> fetch -> disk -> index -> log.

use super::error::CaptureError;
use super::markers::{is_self_issued, MARKER_HEADER, MARKER_VALUE};
use super::session::{CaptureRun, SessionInner};
use super::stats::format_size;
use crate::network::{CompletedRequest, OutboundRequest, RequestObserver};
use crate::overwrite::age_in_days;
use crate::storage::MirrorFileWriter;
use crate::url_model::MirrorTarget;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

/// Subscription target registered with the network layer while RUNNING.
///
/// Holds the session weakly so a network layer that outlives the session
/// does not keep it alive.
pub(crate) struct SessionObserver {
    session: Weak<SessionInner>,
}

impl SessionObserver {
    pub(crate) fn new(session: &Arc<SessionInner>) -> Self {
        SessionObserver {
            session: Arc::downgrade(session),
        }
    }
}

impl RequestObserver for SessionObserver {
    fn on_completed(&self, request: &CompletedRequest) {
        if let Some(session) = self.session.upgrade() {
            session.handle_completed(request);
        }
    }
}

impl SessionInner {
    /// Never panics and never returns an error to the caller.
    pub(crate) fn handle_completed(self: &Arc<Self>, request: &CompletedRequest) {
        if self.markers.take(request.id) || is_self_issued(&request.request_headers) {
            tracing::trace!(id = request.id, "ignoring self-issued request {}", request.url);
            return;
        }
        let Some(run) = self.current_run() else {
            return;
        };
        if !request.method.eq_ignore_ascii_case("GET") {
            return;
        }
        run.stats.record_total();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.process(&run, request)));
        let error = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(payload) => CaptureError::Unexpected(panic_message(&*payload)),
        };
        record_failure(&run, &request.url, &error);
    }

    fn process(
        self: &Arc<Self>,
        run: &Arc<CaptureRun>,
        request: &CompletedRequest,
    ) -> Result<(), CaptureError> {
        let url = request.url.as_str();
        if !self.whitelist.is_allowed(url) {
            run.stats.record_not_in_whitelist();
            run.record(&format!("Ignored (not in whitelist): {}", url));
            tracing::debug!("not in whitelist: {}", url);
            return Ok(());
        }

        let target = self
            .mapper
            .target_for(url)
            .map_err(|e| CaptureError::Unexpected(e.to_string()))?;

        let Some(claim) = self.active_keys.claim(&target.url_key) else {
            run.stats.record_already_in_disk();
            run.record(&format!("Ignored (already in disk): {}", url));
            tracing::debug!("capture already in flight: {}", url);
            return Ok(());
        };

        let mode = self.mode.get();
        if !self.policy.should_save(&self.index, &target.url_key, mode) {
            run.stats.record_already_in_disk();
            run.record(&format!("Ignored (already in disk): {}", url));
            let age = self
                .index
                .get(&target.url_key)
                .and_then(|entry| self.clock.now().duration_since(entry.modified).ok())
                .map(age_in_days)
                .unwrap_or(0);
            tracing::debug!(%mode, age_days = age, "already in disk: {}", url);
            return Ok(());
        }

        let mut headers = request.request_headers.clone();
        headers.retain(|name, _| !name.eq_ignore_ascii_case(MARKER_HEADER));
        headers.insert(MARKER_HEADER.to_string(), MARKER_VALUE.to_string());
        let outbound = OutboundRequest::get(url).with_headers(headers);

        let guard = self.in_flight.enter();
        let session = Arc::clone(self);
        let run = Arc::clone(run);
        self.runtime.spawn_blocking(move || {
            let _guard = guard;
            let _claim = claim;
            let saved = panic::catch_unwind(AssertUnwindSafe(|| {
                session.save(&run, &outbound, &target)
            }));
            let error = match saved {
                Ok(Ok(())) => return,
                Ok(Err(e)) => e,
                Err(payload) => CaptureError::Unexpected(panic_message(&*payload)),
            };
            record_failure(&run, &outbound.url, &error);
        });
        Ok(())
    }

    /// Follow-up fetch streamed into the mirror file, then index update.
    fn save(
        &self,
        run: &CaptureRun,
        outbound: &OutboundRequest,
        target: &MirrorTarget,
    ) -> Result<(), CaptureError> {
        let mut writer = MirrorFileWriter::new(&target.path);
        let bytes = self.network.fetch(outbound, &mut writer)?;
        self.index
            .record_saved(&target.url_key, &target.path)
            .map_err(CaptureError::Write)?;

        run.stats.record_saved();
        let size = format_size(bytes);
        run.record(&format!("Saved (new file): {} [{}]", outbound.url, size));
        tracing::info!("saved {} [{}] -> {}", outbound.url, size, target.path.display());
        Ok(())
    }
}

fn record_failure(run: &CaptureRun, url: &str, error: &CaptureError) {
    run.stats.record_error();
    run.record(&format!("Error ({}): {} [{}]", error.kind(), url, error));
    tracing::warn!("{} for {}: {}", error.kind(), url, error);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic in capture handler".to_string()
    }
}
