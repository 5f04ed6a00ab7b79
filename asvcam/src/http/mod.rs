//! HTTP client abstraction for testability.
//!
//! Every device interaction (capture, listing, fetch, delete, status) goes
//! through [`HttpClient`], so tests can substitute a scripted client and the
//! production build uses [`ReqwestClient`].

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

/// Default timeout applied when a caller does not pass its own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors from a single HTTP round trip.
///
/// All variants are transient from the caller's point of view: they are
/// absorbed at the component boundary and turned into an absent result.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HttpError {
    /// The request did not complete within its timeout.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// The connection could not be established.
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// The request failed for another reason (body read, protocol error).
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// The client itself could not be built.
    #[error("failed to create HTTP client: {0}")]
    Client(String),
}

impl HttpError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, HttpError::Timeout { .. })
    }
}

/// Trait for HTTP client operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock HTTP clients in tests.
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to request
    /// * `timeout` - Bound on the whole round trip, body included
    ///
    /// # Returns
    ///
    /// The response body as bytes, or an error for transport failures and
    /// non-2xx statuses.
    fn get<'a>(
        &'a self,
        url: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Vec<u8>, HttpError>>;

    /// Performs an HTTP POST with a text body and extra headers.
    fn post<'a>(
        &'a self,
        url: &'a str,
        headers: &'a [(&'a str, String)],
        body: String,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Vec<u8>, HttpError>>;
}

/// Real HTTP client implementation using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a new ReqwestClient with default configuration.
    pub fn new() -> Result<Self, HttpError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Creates a new ReqwestClient whose connect phase is bounded by `timeout`.
    ///
    /// Per-request timeouts are still applied by each call.
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| HttpError::Client(e.to_string()))?;

        Ok(Self { client })
    }

    async fn finish(url: &str, request: reqwest::RequestBuilder) -> Result<Vec<u8>, HttpError> {
        let response = request.send().await.map_err(|e| classify(url, e))?;

        // Check HTTP status
        if !response.status().is_success() {
            return Err(HttpError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        // Read response body
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| classify(url, e))
    }
}

impl HttpClient for ReqwestClient {
    fn get<'a>(
        &'a self,
        url: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Vec<u8>, HttpError>> {
        Box::pin(async move { Self::finish(url, self.client.get(url).timeout(timeout)).await })
    }

    fn post<'a>(
        &'a self,
        url: &'a str,
        headers: &'a [(&'a str, String)],
        body: String,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Vec<u8>, HttpError>> {
        Box::pin(async move {
            let mut request = self.client.post(url).timeout(timeout).body(body);
            for (name, value) in headers {
                request = request.header(*name, value.as_str());
            }
            Self::finish(url, request).await
        })
    }
}

fn classify(url: &str, e: reqwest::Error) -> HttpError {
    if e.is_timeout() {
        HttpError::Timeout {
            url: url.to_string(),
        }
    } else if e.is_connect() {
        HttpError::Connect {
            url: url.to_string(),
            reason: e.to_string(),
        }
    } else {
        HttpError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Scripted reply for one URL.
    #[derive(Clone, Debug)]
    pub struct MockReply {
        pub delay: Duration,
        pub result: Result<Vec<u8>, HttpError>,
    }

    impl MockReply {
        pub fn ok(body: impl Into<Vec<u8>>) -> Self {
            Self {
                delay: Duration::ZERO,
                result: Ok(body.into()),
            }
        }

        pub fn json(value: serde_json::Value) -> Self {
            Self::ok(value.to_string())
        }

        pub fn status(url: &str, status: u16) -> Self {
            Self {
                delay: Duration::ZERO,
                result: Err(HttpError::Status {
                    url: url.to_string(),
                    status,
                }),
            }
        }

        pub fn after(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    /// Mock HTTP client for testing.
    ///
    /// Replies are keyed by exact URL; unknown URLs fail to connect. Delays
    /// longer than the request timeout surface as [`HttpError::Timeout`],
    /// so tests running on a paused clock see real timeout behavior.
    #[derive(Default)]
    pub struct MockHttpClient {
        replies: Mutex<HashMap<String, MockReply>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockHttpClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn route(self, url: impl Into<String>, reply: MockReply) -> Self {
            self.replies.lock().insert(url.into(), reply);
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        pub fn call_count(&self, url: &str) -> usize {
            self.calls.lock().iter().filter(|c| c.as_str() == url).count()
        }

        fn reply_for(&self, url: &str) -> Option<MockReply> {
            self.calls.lock().push(url.to_string());
            self.replies.lock().get(url).cloned()
        }

        async fn respond(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, HttpError> {
            let Some(reply) = self.reply_for(url) else {
                return Err(HttpError::Connect {
                    url: url.to_string(),
                    reason: "no route".to_string(),
                });
            };
            if reply.delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(HttpError::Timeout {
                    url: url.to_string(),
                });
            }
            tokio::time::sleep(reply.delay).await;
            reply.result
        }
    }

    impl HttpClient for MockHttpClient {
        fn get<'a>(
            &'a self,
            url: &'a str,
            timeout: Duration,
        ) -> BoxFuture<'a, Result<Vec<u8>, HttpError>> {
            Box::pin(self.respond(url, timeout))
        }

        fn post<'a>(
            &'a self,
            url: &'a str,
            _headers: &'a [(&'a str, String)],
            _body: String,
            timeout: Duration,
        ) -> BoxFuture<'a, Result<Vec<u8>, HttpError>> {
            Box::pin(self.respond(url, timeout))
        }
    }

    #[tokio::test]
    async fn test_mock_client_success() {
        let mock =
            MockHttpClient::new().route("http://example.com", MockReply::ok(vec![1, 2, 3, 4]));

        let result = mock.get("http://example.com", DEFAULT_TIMEOUT).await;
        assert_eq!(result.unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(mock.call_count("http://example.com"), 1);
    }

    #[tokio::test]
    async fn test_mock_client_unknown_route_is_connect_error() {
        let mock = MockHttpClient::new();
        let result = mock.get("http://example.com", DEFAULT_TIMEOUT).await;
        assert!(matches!(result, Err(HttpError::Connect { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_client_times_out() {
        let mock = MockHttpClient::new().route(
            "http://slow",
            MockReply::ok("late").after(Duration::from_secs(30)),
        );
        let result = mock.get("http://slow", Duration::from_secs(1)).await;
        assert!(result.unwrap_err().is_timeout());
    }

    #[test]
    fn test_reqwest_client_builds() {
        assert!(ReqwestClient::with_timeout(Duration::from_secs(2)).is_ok());
    }

    #[test]
    fn test_http_error_display_includes_url() {
        let err = HttpError::Status {
            url: "http://cam/files".to_string(),
            status: 404,
        };
        assert_eq!(err.to_string(), "HTTP 404 from http://cam/files");
    }
}
