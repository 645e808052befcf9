//! HTTP transport abstraction for testability.
//!
//! The engine only ever needs two things from the network: the whole body of
//! a (small) index document, and a streaming reader over a (large) resource
//! file. Both go through [`Transport`] so tests can substitute an in-memory
//! implementation.

use std::io::Read;
use std::time::Duration;

use thiserror::Error;

/// Default timeout for HTTP requests in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Errors raised by a [`Transport`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The HTTP client could not be constructed.
    #[error("failed to create HTTP client: {0}")]
    Client(String),

    /// The request could not be sent or the body could not be read.
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// The request timed out.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },
}

impl TransportError {
    /// The URL the failing request was made against, if known.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Client(_) => None,
            Self::Request { url, .. } | Self::Status { url, .. } | Self::Timeout { url, .. } => {
                Some(url)
            }
        }
    }
}

/// Streaming response body.
pub type BodyReader = Box<dyn Read + Send>;

/// Trait for network operations used by the engine.
pub trait Transport {
    /// Performs a GET request and returns the full response body.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError>;

    /// Performs a GET request and returns a reader over the response body.
    fn open(&self, url: &str) -> Result<BodyReader, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        (**self).fetch(url)
    }

    fn open(&self, url: &str) -> Result<BodyReader, TransportError> {
        (**self).open(url)
    }
}

/// Real transport implementation using blocking reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Creates a transport with the default timeout.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a transport with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    fn send(&self, url: &str) -> Result<reqwest::blocking::Response, TransportError> {
        let response = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    url: url.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                TransportError::Request {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(response)
    }
}

impl Transport for ReqwestTransport {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        self.send(url)?
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| TransportError::Request {
                url: url.to_string(),
                reason: format!("failed to read response: {}", e),
            })
    }

    fn open(&self, url: &str) -> Result<BodyReader, TransportError> {
        Ok(Box::new(self.send(url)?))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::io::{self, Cursor};

    /// In-memory transport serving canned bodies by URL.
    #[derive(Default)]
    pub struct MockTransport {
        bodies: HashMap<String, Vec<u8>>,
        /// URLs whose body fails after the given number of bytes.
        truncated: HashMap<String, usize>,
        requests: RefCell<Vec<String>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn serve(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
            self.bodies.insert(url.to_string(), body.into());
            self
        }

        pub fn fail_after(mut self, url: &str, bytes: usize) -> Self {
            self.truncated.insert(url.to_string(), bytes);
            self
        }

        pub fn requests(&self) -> Vec<String> {
            self.requests.borrow().clone()
        }

        pub fn request_count(&self, url: &str) -> usize {
            self.requests.borrow().iter().filter(|u| *u == url).count()
        }
    }

    /// Reader that yields some bytes and then an I/O error.
    struct BrokenReader {
        inner: Cursor<Vec<u8>>,
    }

    impl Read for BrokenReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.inner.read(buf)? {
                0 => Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )),
                n => Ok(n),
            }
        }
    }

    impl Transport for MockTransport {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
            self.requests.borrow_mut().push(url.to_string());
            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| TransportError::Status {
                    url: url.to_string(),
                    status: 404,
                })
        }

        fn open(&self, url: &str) -> Result<BodyReader, TransportError> {
            let body = self.fetch(url)?;
            match self.truncated.get(url) {
                Some(&n) => Ok(Box::new(BrokenReader {
                    inner: Cursor::new(body[..n.min(body.len())].to_vec()),
                })),
                None => Ok(Box::new(Cursor::new(body))),
            }
        }
    }

    #[test]
    fn test_mock_transport_serves_body() {
        let mock = MockTransport::new().serve("http://example.com/a", b"abc".to_vec());

        assert_eq!(mock.fetch("http://example.com/a").unwrap(), b"abc");
        assert_eq!(mock.request_count("http://example.com/a"), 1);
    }

    #[test]
    fn test_mock_transport_missing_is_404() {
        let mock = MockTransport::new();
        let err = mock.fetch("http://example.com/missing").unwrap_err();
        assert_eq!(
            err,
            TransportError::Status {
                url: "http://example.com/missing".to_string(),
                status: 404
            }
        );
    }

    #[test]
    fn test_mock_transport_truncated_stream_errors() {
        let mock = MockTransport::new()
            .serve("http://example.com/big", vec![7u8; 100])
            .fail_after("http://example.com/big", 10);

        let mut reader = mock.open("http://example.com/big").unwrap();
        let mut buf = Vec::new();
        let err = reader.read_to_end(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn test_transport_error_url() {
        let err = TransportError::Timeout {
            url: "http://x".to_string(),
            timeout_secs: 5,
        };
        assert_eq!(err.url(), Some("http://x"));
        assert_eq!(TransportError::Client("boom".into()).url(), None);
    }

    #[test]
    fn test_reqwest_transport_builds() {
        let transport = ReqwestTransport::with_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(transport.timeout, Duration::from_secs(5));
    }
}
