//! HTTP plumbing: a reusable retrying fetch and the agent transport seam.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use futures::StreamExt as _;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{FetchError, SlidesError};

/// Response body as a stream of byte chunks.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, FetchError>> + Send + 'static>>;

/// Linear retry policy: the wait before attempt `n` is `backoff_step * (n - 1)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_step_ms")]
    pub backoff_step_ms: u64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_backoff_step_ms() -> u64 {
    1_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::linear(default_max_attempts(), default_backoff_step_ms())
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff_step_ms: default_backoff_step_ms(),
        }
    }

    pub fn linear(max_attempts: u32, backoff_step_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_step_ms,
        }
    }

    pub fn can_retry(&self, attempts_done: u32) -> bool {
        attempts_done < self.max_attempts
    }

    /// Delay before the 1-based `attempt`.
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        let steps = u64::from(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_step_ms.saturating_mul(steps))
    }
}

/// Anything that carries an HTTP status code.
pub trait ResponseStatus {
    fn status(&self) -> u16;
}

/// Streaming HTTP response.
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: ByteStream,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drains the body into a string, replacing invalid UTF-8.
    pub async fn into_text(mut self) -> String {
        let mut bytes = Vec::new();
        while let Some(Ok(chunk)) = self.body.next().await {
            bytes.extend_from_slice(&chunk);
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl ResponseStatus for HttpResponse {
    fn status(&self) -> u16 {
        self.status
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Runs `send` until it yields a non-5xx response, a non-retryable error, or
/// the policy runs out of attempts.
///
/// A 5xx response on the final attempt is returned as-is so the caller can
/// read its body.
pub async fn fetch_with_retry<T, F, Fut>(policy: &RetryPolicy, mut send: F) -> Result<T, FetchError>
where
    T: ResponseStatus,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 1;
    loop {
        let started = Instant::now();
        match send(attempt).await {
            Ok(response) => {
                let status = response.status();
                let elapsed_ms = started.elapsed().as_millis() as u64;
                debug!(attempt, status, elapsed_ms, "http response");
                if status < 500 || !policy.can_retry(attempt) {
                    return Ok(response);
                }
                warn!(attempt, status, "server error, retrying");
            }
            Err(err) if err.is_retryable() && policy.can_retry(attempt) => {
                warn!(attempt, error = %err, "request failed, retrying");
            }
            Err(err) => return Err(err),
        }
        attempt += 1;
        tokio::time::sleep(policy.backoff_before(attempt)).await;
    }
}

/// Transport used to reach the agent endpoint.
#[async_trait::async_trait]
pub trait AgentHttp: Send + Sync {
    /// POSTs `body` as JSON with bearer auth and returns the streaming response.
    async fn post_stream(
        &self,
        url: &str,
        bearer: &str,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, FetchError>;
}

/// reqwest-backed [`AgentHttp`].
pub struct ReqwestAgentHttp {
    client: reqwest::Client,
}

impl ReqwestAgentHttp {
    /// The client has a connect timeout only; streamed bodies may take minutes.
    pub fn new(connect_timeout: Duration) -> Result<Self, SlidesError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| SlidesError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl AgentHttp for ReqwestAgentHttp {
    async fn post_stream(
        &self,
        url: &str,
        bearer: &str,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, FetchError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(bearer)
            .header(ACCEPT, "text/event-stream")
            .json(body)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned);
        debug!(url, status, content_type = ?content_type, "agent response headers");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(FetchError::from_reqwest));
        Ok(HttpResponse {
            status,
            content_type,
            body: Box::pin(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Status(u16);

    impl ResponseStatus for Status {
        fn status(&self) -> u16 {
            self.0
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::linear(max_attempts, 1)
    }

    async fn run_scripted(
        policy: RetryPolicy,
        script: Vec<Result<u16, FetchError>>,
    ) -> (Result<u16, FetchError>, u32) {
        let calls = Arc::new(AtomicU32::new(0));
        let script = Arc::new(script);
        let result = fetch_with_retry(&policy, |attempt| {
            let calls = calls.clone();
            let script = script.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                script[(attempt - 1) as usize].clone().map(Status)
            }
        })
        .await;
        (result.map(|s| s.0), calls.load(Ordering::SeqCst))
    }

    #[test]
    fn backoff_grows_linearly_from_zero() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_before(1), Duration::ZERO);
        assert_eq!(policy.backoff_before(2).as_millis(), 1_000);
        assert_eq!(policy.backoff_before(3).as_millis(), 2_000);
    }

    #[test]
    fn linear_policy_always_allows_one_attempt() {
        let policy = RetryPolicy::linear(0, 10);
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.can_retry(1));
        assert!(!RetryPolicy::none().can_retry(1));
    }

    #[tokio::test]
    async fn server_errors_are_retried_until_success() {
        let (result, calls) = run_scripted(fast_policy(3), vec![Ok(503), Ok(500), Ok(200)]).await;
        assert_eq!(result, Ok(200));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn client_errors_return_immediately() {
        let (result, calls) = run_scripted(fast_policy(3), vec![Ok(401), Ok(200)]).await;
        assert_eq!(result, Ok(401));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn network_errors_are_retried_and_last_error_returned() {
        let (result, calls) = run_scripted(
            fast_policy(2),
            vec![
                Err(FetchError::Network("first".into())),
                Err(FetchError::Timeout("second".into())),
            ],
        )
        .await;
        assert_eq!(result, Err(FetchError::Timeout("second".into())));
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn request_errors_are_not_retried() {
        let (result, calls) =
            run_scripted(fast_policy(3), vec![Err(FetchError::Request("bad".into()))]).await;
        assert!(matches!(result, Err(FetchError::Request(_))));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn final_server_error_is_returned_as_response() {
        let (result, calls) = run_scripted(fast_policy(2), vec![Ok(502), Ok(504)]).await;
        assert_eq!(result, Ok(504));
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn into_text_collects_the_body() {
        let chunks: Vec<Result<bytes::Bytes, FetchError>> = vec![
            Ok(bytes::Bytes::from_static(b"quota ")),
            Ok(bytes::Bytes::from_static(b"exceeded")),
        ];
        let response = HttpResponse {
            status: 429,
            content_type: None,
            body: Box::pin(futures::stream::iter(chunks)),
        };
        assert!(!response.is_success());
        assert_eq!(response.into_text().await, "quota exceeded");
    }
}
