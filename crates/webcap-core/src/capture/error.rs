//! Per-resource capture failures. None of them is fatal to the session.

use crate::network::NetworkError;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The follow-up fetch failed (transport or non-2xx status).
    #[error("{0}")]
    Request(#[source] NetworkError),
    /// Writing the mirror file failed.
    #[error("{0}")]
    Write(#[source] io::Error),
    /// Anything else raised while handling an event.
    #[error("{0}")]
    Unexpected(String),
}

impl CaptureError {
    /// Kind label used in capture log records (`Error (<kind>): ...`).
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureError::Request(_) => "request error",
            CaptureError::Write(_) => "write error",
            CaptureError::Unexpected(_) => "capture error",
        }
    }
}

impl From<NetworkError> for CaptureError {
    fn from(e: NetworkError) -> Self {
        match e {
            NetworkError::Sink(io) => CaptureError::Write(io),
            other => CaptureError::Request(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_failures_are_write_errors() {
        let e: CaptureError =
            NetworkError::Sink(io::Error::new(io::ErrorKind::Other, "disk full")).into();
        assert_eq!(e.kind(), "write error");
        assert_eq!(e.to_string(), "disk full");

        let e: CaptureError = NetworkError::Status(404).into();
        assert_eq!(e.kind(), "request error");
        assert_eq!(e.to_string(), "HTTP 404");
    }

    #[test]
    fn request_errors_expose_their_cause() {
        use std::error::Error;

        let e: CaptureError = NetworkError::Status(503).into();
        let cause = e.source().expect("request error has a source");
        assert_eq!(cause.to_string(), "HTTP 503");
    }
}
