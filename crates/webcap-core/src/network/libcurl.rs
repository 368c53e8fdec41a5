//! libcurl-backed network layer.
//!
//! Performs requests with the `curl` crate, streaming the body through a
//! [`ResponseSink`], and reports each finished request to subscribers. Hosts
//! that observe traffic elsewhere feed those completions in through
//! [`CurlNetwork::emit_completed`].

use super::{
    CompletedRequest, CompletionFilter, Headers, NetworkError, NetworkLayer, OutboundRequest,
    PreSendHook, RequestId, RequestObserver, ResponseSink, SubscriptionId,
};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::io;
use std::str;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Request headers that are never forwarded: they would make the copy
/// partial, encoded, or conditional, or they belong to the transport.
const SKIPPED_HEADERS: [&str; 15] = [
    "host",
    "accept-encoding",
    "content-length",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "upgrade",
    "range",
    "if-range",
    "if-match",
    "if-none-match",
    "if-modified-since",
    "if-unmodified-since",
];

/// Tunables for libcurl transfers (the `[network]` table of the engine config).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurlOptions {
    /// Seconds allowed for the TCP/TLS connect phase.
    pub connect_timeout_secs: u64,
    /// Maximum redirects followed per request.
    pub max_redirections: u32,
    /// Abort when the transfer stays below this many bytes/sec ...
    pub low_speed_limit_bytes: u32,
    /// ... for this many seconds.
    pub low_speed_time_secs: u64,
}

impl Default for CurlOptions {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            max_redirections: 10,
            low_speed_limit_bytes: 1024,
            low_speed_time_secs: 60,
        }
    }
}

struct Subscriber {
    id: SubscriptionId,
    filter: CompletionFilter,
    observer: Arc<dyn RequestObserver>,
}

/// Network layer built on libcurl easy handles, one per request, on the calling thread.
pub struct CurlNetwork {
    options: CurlOptions,
    next_request_id: AtomicU64,
    next_subscription_id: AtomicU64,
    subscribers: RwLock<Vec<Subscriber>>,
    hook: RwLock<Option<Arc<dyn PreSendHook>>>,
}

impl CurlNetwork {
    pub fn new(options: CurlOptions) -> Self {
        CurlNetwork {
            options,
            next_request_id: AtomicU64::new(1),
            next_subscription_id: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
            hook: RwLock::new(None),
        }
    }

    /// Allocates a fresh request id (also used for externally observed requests).
    pub fn next_request_id(&self) -> RequestId {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Delivers a completion to every matching subscriber.
    ///
    /// Observers run on the calling thread, outside any internal lock.
    pub fn emit_completed(&self, request: &CompletedRequest) {
        let observers: Vec<Arc<dyn RequestObserver>> = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| s.filter.accepts(request))
            .map(|s| Arc::clone(&s.observer))
            .collect();
        for observer in observers {
            observer.on_completed(request);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    fn current_hook(&self) -> Option<Arc<dyn PreSendHook>> {
        self.hook.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn perform(
        &self,
        request: &OutboundRequest,
        headers: &Headers,
        sink: &mut dyn ResponseSink,
    ) -> Result<u64, NetworkError> {
        let mut easy = curl::easy::Easy::new();
        easy.url(&request.url).map_err(transport)?;
        if !request.method.eq_ignore_ascii_case("GET") {
            easy.custom_request(&request.method).map_err(transport)?;
        }
        easy.follow_location(true).map_err(transport)?;
        easy.max_redirections(self.options.max_redirections)
            .map_err(transport)?;
        // Let curl negotiate and decode content encodings so the mirror holds plain bodies.
        easy.accept_encoding("").map_err(transport)?;
        easy.connect_timeout(Duration::from_secs(self.options.connect_timeout_secs))
            .map_err(transport)?;
        easy.low_speed_limit(self.options.low_speed_limit_bytes)
            .map_err(transport)?;
        easy.low_speed_time(Duration::from_secs(self.options.low_speed_time_secs))
            .map_err(transport)?;

        let mut list = curl::easy::List::new();
        for (k, v) in headers {
            list.append(&format!("{}: {}", k.trim(), v.trim()))
                .map_err(transport)?;
        }
        if !headers.is_empty() {
            easy.http_headers(list).map_err(transport)?;
        }

        let status = Cell::new(0u32);
        let mut started = false;
        let mut rejected = false;
        let mut bytes = 0u64;
        let mut sink_error: Option<io::Error> = None;

        let performed = {
            let mut transfer = easy.transfer();
            // Redirects produce several status lines; the last one is the final response.
            transfer
                .header_function(|line| {
                    if let Some(code) = parse_status_line(line) {
                        status.set(code);
                    }
                    true
                })
                .map_err(transport)?;
            transfer
                .write_function(|data| {
                    if !started {
                        let code = status.get();
                        if !is_success(code) {
                            rejected = true;
                            return Ok(0);
                        }
                        if let Err(e) = sink.on_response(code) {
                            sink_error = Some(e);
                            return Ok(0);
                        }
                        started = true;
                    }
                    match sink.on_data(data) {
                        Ok(()) => {
                            bytes += data.len() as u64;
                            Ok(data.len())
                        }
                        Err(e) => {
                            sink_error = Some(e);
                            Ok(0) // abort transfer
                        }
                    }
                })
                .map_err(transport)?;
            transfer.perform()
        };

        if let Some(e) = sink_error {
            return Err(NetworkError::Sink(e));
        }
        if rejected {
            return Err(NetworkError::Status(status.get()));
        }
        performed.map_err(transport)?;

        let code = easy.response_code().map_err(transport)?;
        if !is_success(code) {
            return Err(NetworkError::Status(code));
        }
        if !started {
            sink.on_response(code).map_err(NetworkError::Sink)?;
        }
        sink.on_end().map_err(NetworkError::Sink)?;
        Ok(bytes)
    }
}

impl Default for CurlNetwork {
    fn default() -> Self {
        Self::new(CurlOptions::default())
    }
}

impl NetworkLayer for CurlNetwork {
    fn subscribe(
        &self,
        filter: CompletionFilter,
        observer: Arc<dyn RequestObserver>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Subscriber {
                id,
                filter,
                observer,
            });
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|s| s.id != id);
    }

    fn set_pre_send_hook(&self, hook: Option<Arc<dyn PreSendHook>>) {
        *self.hook.write().unwrap_or_else(|e| e.into_inner()) = hook;
    }

    fn fetch(
        &self,
        request: &OutboundRequest,
        sink: &mut dyn ResponseSink,
    ) -> Result<u64, NetworkError> {
        let id = self.next_request_id();
        let headers = outgoing_headers(&request.headers);
        if let Some(hook) = self.current_hook() {
            hook.before_send(id, &headers);
        }

        let bytes = self.perform(request, &headers, sink)?;
        tracing::trace!(id, bytes, "{} {} completed", request.method, request.url);

        self.emit_completed(&CompletedRequest {
            id,
            method: request.method.clone(),
            url: request.url.clone(),
            request_headers: headers,
        });
        Ok(bytes)
    }
}

/// Headers that will actually be sent for a forwarded request.
pub(crate) fn outgoing_headers(headers: &Headers) -> Headers {
    headers
        .iter()
        .filter(|(name, _)| {
            let name = name.trim();
            !name.is_empty()
                && !name.starts_with(':')
                && !SKIPPED_HEADERS
                    .iter()
                    .any(|skip| name.eq_ignore_ascii_case(skip))
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Parses `HTTP/1.1 200 OK` / `HTTP/2 404` header lines into the status code.
fn parse_status_line(line: &[u8]) -> Option<u32> {
    let line = str::from_utf8(line).ok()?;
    if !line.starts_with("HTTP/") {
        return None;
    }
    line.split_whitespace().nth(1)?.parse().ok()
}

fn is_success(code: u32) -> bool {
    (200..300).contains(&code)
}

fn transport(e: curl::Error) -> NetworkError {
    NetworkError::Transport(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn status_line_parsing() {
        assert_eq!(parse_status_line(b"HTTP/1.1 200 OK\r\n"), Some(200));
        assert_eq!(parse_status_line(b"HTTP/2 404\r\n"), Some(404));
        assert_eq!(parse_status_line(b"Content-Type: text/html\r\n"), None);
        assert_eq!(parse_status_line(b"\r\n"), None);
    }

    #[test]
    fn outgoing_headers_drop_transport_and_partial_headers() {
        let mut headers = Headers::new();
        headers.insert("Range".to_string(), "bytes=0-99".to_string());
        headers.insert("Accept-Encoding".to_string(), "gzip, br".to_string());
        headers.insert("Host".to_string(), "example.com".to_string());
        headers.insert("If-None-Match".to_string(), "\"abc\"".to_string());
        headers.insert(":authority".to_string(), "example.com".to_string());
        headers.insert("Cookie".to_string(), "session=1".to_string());
        headers.insert("User-Agent".to_string(), "Browser/1.0".to_string());
        headers.insert("x-custom-save".to_string(), "1".to_string());

        let out = outgoing_headers(&headers);
        let mut names: Vec<_> = out.keys().map(String::as_str).collect();
        names.sort();
        assert_eq!(names, vec!["Cookie", "User-Agent", "x-custom-save"]);
    }

    struct Recorder(Mutex<Vec<RequestId>>);

    impl RequestObserver for Recorder {
        fn on_completed(&self, request: &CompletedRequest) {
            self.0.lock().unwrap().push(request.id);
        }
    }

    #[test]
    fn emit_respects_filters_and_unsubscribe() {
        let net = CurlNetwork::default();
        let all = Arc::new(Recorder(Mutex::new(Vec::new())));
        let gets = Arc::new(Recorder(Mutex::new(Vec::new())));
        let all_id = net.subscribe(CompletionFilter::All, all.clone());
        net.subscribe(CompletionFilter::get_only(), gets.clone());

        let mut req = CompletedRequest {
            id: net.next_request_id(),
            method: "POST".to_string(),
            url: "https://example.com/api".to_string(),
            request_headers: Headers::new(),
        };
        net.emit_completed(&req);
        req.id = net.next_request_id();
        req.method = "GET".to_string();
        net.emit_completed(&req);

        assert_eq!(all.0.lock().unwrap().len(), 2);
        assert_eq!(*gets.0.lock().unwrap(), vec![req.id]);

        net.unsubscribe(all_id);
        assert_eq!(net.subscriber_count(), 1);
        net.emit_completed(&req);
        assert_eq!(all.0.lock().unwrap().len(), 2);
        assert_eq!(gets.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn connection_refused_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let net = CurlNetwork::default();
        let mut body = Vec::new();
        let err = net
            .fetch(
                &OutboundRequest::get(format!("http://127.0.0.1:{port}/a.bin")),
                &mut body,
            )
            .unwrap_err();
        assert!(matches!(err, NetworkError::Transport(_)), "{err:?}");
    }
}
