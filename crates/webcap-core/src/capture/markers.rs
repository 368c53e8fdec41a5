//! Self-issued request markers.
//!
//! Follow-up fetches carry [`MARKER_HEADER`]. The pre-send hook records their
//! request ids; when the matching completion comes back the id is removed and
//! the event ignored, so a capture never captures itself (which ALWAYS mode
//! would otherwise turn into an endless loop).
//!
//! A follow-up that fails before completing never reports back, so markers
//! expire after [`MARKER_TTL`] and the set never holds more than [`MARKER_CAP`].

use crate::network::{Headers, PreSendHook, RequestId};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Header attached to every follow-up fetch issued by the capture engine.
pub const MARKER_HEADER: &str = "x-custom-save";
pub const MARKER_VALUE: &str = "1";

pub const MARKER_TTL: Duration = Duration::from_secs(10 * 60);
pub const MARKER_CAP: usize = 4096;

#[derive(Debug, Default)]
struct MarkerSet {
    by_id: HashMap<RequestId, Instant>,
    // Insertion order; may hold ids already taken. Never longer than the cap.
    order: VecDeque<(RequestId, Instant)>,
}

impl MarkerSet {
    /// Pops the oldest order entry, dropping its marker if still pending.
    fn pop_oldest(&mut self) {
        if let Some((id, at)) = self.order.pop_front() {
            if self.by_id.get(&id) == Some(&at) {
                self.by_id.remove(&id);
                tracing::debug!(id, "self-issued marker evicted");
            }
        }
    }
}

/// Concurrency-safe set of pending self-issued request ids.
#[derive(Debug)]
pub struct SelfIssuedMarkers {
    set: Mutex<MarkerSet>,
    ttl: Duration,
    cap: usize,
}

impl Default for SelfIssuedMarkers {
    fn default() -> Self {
        Self::with_limits(MARKER_TTL, MARKER_CAP)
    }
}

impl SelfIssuedMarkers {
    pub fn with_limits(ttl: Duration, cap: usize) -> Self {
        SelfIssuedMarkers {
            set: Mutex::new(MarkerSet::default()),
            ttl,
            cap: cap.max(1),
        }
    }

    pub fn insert(&self, id: RequestId) {
        self.insert_at(id, Instant::now());
    }

    pub(crate) fn insert_at(&self, id: RequestId, at: Instant) {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());

        while let Some(&(oldest, inserted)) = set.order.front() {
            if at.saturating_duration_since(inserted) < self.ttl {
                break;
            }
            set.order.pop_front();
            if set.by_id.get(&oldest) == Some(&inserted) {
                set.by_id.remove(&oldest);
                tracing::debug!(id = oldest, "self-issued marker expired");
            }
        }

        set.by_id.insert(id, at);
        set.order.push_back((id, at));
        // Pending markers are a subset of `order`.
        while set.order.len() > self.cap {
            set.pop_oldest();
        }
    }

    /// Removes `id` if it is a pending marker; true means "ignore this event".
    pub fn take(&self, id: RequestId) -> bool {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .by_id
            .remove(&id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.set.lock().unwrap_or_else(|e| e.into_inner()).by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn order_len(&self) -> usize {
        self.set.lock().unwrap_or_else(|e| e.into_inner()).order.len()
    }
}

/// True when `headers` carry the self-issued marker (name compared case-insensitively).
pub fn is_self_issued(headers: &Headers) -> bool {
    headers
        .keys()
        .any(|name| name.eq_ignore_ascii_case(MARKER_HEADER))
}

impl PreSendHook for SelfIssuedMarkers {
    fn before_send(&self, id: RequestId, headers: &Headers) {
        if is_self_issued(headers) {
            self.insert(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_removes_once() {
        let markers = SelfIssuedMarkers::default();
        markers.insert(7);
        assert!(markers.take(7));
        assert!(!markers.take(7));
        assert!(!markers.take(8));
    }

    #[test]
    fn hook_records_only_marked_requests() {
        let markers = SelfIssuedMarkers::default();
        let mut headers = Headers::new();
        headers.insert("User-Agent".to_string(), "Browser/1.0".to_string());
        markers.before_send(1, &headers);
        headers.insert("X-Custom-Save".to_string(), MARKER_VALUE.to_string());
        markers.before_send(2, &headers);
        assert_eq!(markers.len(), 1);
        assert!(markers.take(2));
    }

    #[test]
    fn expired_markers_are_pruned_on_insert() {
        let markers = SelfIssuedMarkers::with_limits(Duration::from_secs(60), 100);
        let start = Instant::now();
        markers.insert_at(1, start);
        markers.insert_at(2, start + Duration::from_secs(30));
        markers.insert_at(3, start + Duration::from_secs(61));
        assert_eq!(markers.len(), 2);
        assert!(!markers.take(1));
        assert!(markers.take(2));
        assert!(markers.take(3));
    }

    #[test]
    fn taken_markers_do_not_grow_order_past_cap() {
        let markers = SelfIssuedMarkers::with_limits(Duration::from_secs(600), 8);
        let start = Instant::now();
        for id in 0..1000 {
            markers.insert_at(id, start);
            assert!(markers.take(id));
        }
        assert!(markers.order_len() <= 8);
        assert!(markers.is_empty());

        markers.insert_at(5000, start);
        assert!(markers.take(5000));
    }

    #[test]
    fn cap_drops_oldest_live_marker() {
        let markers = SelfIssuedMarkers::with_limits(Duration::from_secs(600), 3);
        let start = Instant::now();
        for id in 1..=3 {
            markers.insert_at(id, start);
        }
        assert!(markers.take(1));
        markers.insert_at(4, start);
        markers.insert_at(5, start);
        assert_eq!(markers.len(), 3);
        assert!(!markers.take(2));
        assert!(markers.take(3));
        assert!(markers.take(4));
        assert!(markers.take(5));
    }
}
