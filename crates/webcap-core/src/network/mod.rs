//! Network-layer collaborator.
//!
//! The capture engine does not own sockets. A hosting network layer reports
//! every completed request to subscribed observers, lets one pre-send hook see
//! outgoing requests (so self-issued ones can be recognized), and performs new
//! outbound requests with a streamed response body. [`CurlNetwork`] is a
//! libcurl-backed implementation for hosts that have no network layer of their own.

mod libcurl;

pub use libcurl::{CurlNetwork, CurlOptions};

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

/// Identifier the network layer assigns to each request.
pub type RequestId = u64;

/// Header name/value pairs as observed or to be sent.
pub type Headers = HashMap<String, String>;

/// One completed HTTP request as observed from the network layer.
#[derive(Debug, Clone)]
pub struct CompletedRequest {
    pub id: RequestId,
    pub method: String,
    pub url: String,
    pub request_headers: Headers,
}

/// A request the engine asks the network layer to perform.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: String,
    pub url: String,
    pub headers: Headers,
}

impl OutboundRequest {
    pub fn get(url: impl Into<String>) -> Self {
        OutboundRequest {
            method: "GET".to_string(),
            url: url.into(),
            headers: Headers::new(),
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }
}

/// Which completions an observer wants to see.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CompletionFilter {
    #[default]
    All,
    /// Only completions whose method matches (ASCII case-insensitive).
    Method(String),
}

impl CompletionFilter {
    pub fn get_only() -> Self {
        CompletionFilter::Method("GET".to_string())
    }

    pub fn accepts(&self, request: &CompletedRequest) -> bool {
        match self {
            CompletionFilter::All => true,
            CompletionFilter::Method(m) => request.method.eq_ignore_ascii_case(m),
        }
    }
}

/// Handle returned by [`NetworkLayer::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Receives completed-request events. May be invoked concurrently from many threads.
pub trait RequestObserver: Send + Sync {
    fn on_completed(&self, request: &CompletedRequest);
}

/// Sees every outgoing request, with its assigned id, before it leaves the process.
pub trait PreSendHook: Send + Sync {
    fn before_send(&self, id: RequestId, headers: &Headers);
}

/// Streamed response body consumer.
///
/// `on_response` is called once with the final status before any data, then
/// `on_data` per chunk, then `on_end`. An `Err` from any of them aborts the
/// transfer and is reported as [`NetworkError::Sink`].
pub trait ResponseSink {
    fn on_response(&mut self, status: u32) -> io::Result<()>;
    fn on_data(&mut self, chunk: &[u8]) -> io::Result<()>;
    fn on_end(&mut self) -> io::Result<()>;
}

/// Collects the body in memory. For small bodies and tests.
impl ResponseSink for Vec<u8> {
    fn on_response(&mut self, _status: u32) -> io::Result<()> {
        self.clear();
        Ok(())
    }

    fn on_data(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.extend_from_slice(chunk);
        Ok(())
    }

    fn on_end(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Discards the body (a browsing request whose content nobody here needs).
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardBody;

impl ResponseSink for DiscardBody {
    fn on_response(&mut self, _status: u32) -> io::Result<()> {
        Ok(())
    }

    fn on_data(&mut self, _chunk: &[u8]) -> io::Result<()> {
        Ok(())
    }

    fn on_end(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Failure of an outbound request.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Connection, TLS, timeout or protocol failure.
    #[error("{0}")]
    Transport(String),
    /// Final response status was not 2xx.
    #[error("HTTP {0}")]
    Status(u32),
    /// The response sink failed (e.g. disk write).
    #[error("{0}")]
    Sink(#[source] io::Error),
}

/// The hosting network layer, as consumed by the capture session.
pub trait NetworkLayer: Send + Sync {
    /// Registers `observer` for completions matching `filter`.
    fn subscribe(&self, filter: CompletionFilter, observer: Arc<dyn RequestObserver>)
        -> SubscriptionId;

    /// Removes a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Installs (or, with `None`, removes) the pre-send hook.
    fn set_pre_send_hook(&self, hook: Option<Arc<dyn PreSendHook>>);

    /// Performs `request`, streaming the body into `sink`. Blocks until the
    /// transfer ends. Returns the number of body bytes delivered.
    fn fetch(&self, request: &OutboundRequest, sink: &mut dyn ResponseSink)
        -> Result<u64, NetworkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(method: &str) -> CompletedRequest {
        CompletedRequest {
            id: 1,
            method: method.to_string(),
            url: "https://example.com/".to_string(),
            request_headers: Headers::new(),
        }
    }

    #[test]
    fn get_filter_is_case_insensitive() {
        let filter = CompletionFilter::get_only();
        assert!(filter.accepts(&completed("GET")));
        assert!(filter.accepts(&completed("get")));
        assert!(!filter.accepts(&completed("POST")));
        assert!(CompletionFilter::All.accepts(&completed("POST")));
    }

    #[test]
    fn vec_sink_collects_body() {
        let mut body = Vec::new();
        body.on_response(200).unwrap();
        body.on_data(b"hello ").unwrap();
        body.on_data(b"world").unwrap();
        body.on_end().unwrap();
        assert_eq!(body, b"hello world");
    }
}
