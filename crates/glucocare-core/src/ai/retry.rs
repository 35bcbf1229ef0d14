use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use super::gemini::{GenerateRequest, HttpReply, Transport};
use crate::error::{Error, Result};
use crate::rate_limiter::RateLimiter;

/// Base delays; attempt `n` (zero-based) waits `(n + 1) * base`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub rate_limited_backoff: Duration,
    pub transport_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limited_backoff: Duration::from_millis(4000),
            transport_backoff: Duration::from_millis(3000),
        }
    }
}

/// One outbound call with rate limiting and bounded retry.
#[derive(Clone)]
pub struct RetryingCaller {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl RetryingCaller {
    pub fn new(transport: Arc<dyn Transport>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            transport,
            limiter,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Perform the exchange, making at most `max_retries` attempts.
    ///
    /// 429 and transport failures are retried while attempts remain. Any other
    /// status is returned as-is, and so is a 429 on the last attempt. A
    /// transport failure on the last attempt is `Error::RetriesExhausted`.
    pub async fn call(
        &self,
        model: &str,
        request: &GenerateRequest,
        max_retries: u32,
    ) -> Result<HttpReply> {
        let attempts = max_retries.max(1);
        let mut attempt: u32 = 0;

        loop {
            self.limiter.await_turn().await;
            let has_more = attempt + 1 < attempts;

            match self.transport.generate(model, request).await {
                Ok(reply) if reply.is_rate_limited() && has_more => {
                    let delay = self.policy.rate_limited_backoff * (attempt + 1);
                    warn!(
                        model,
                        attempt = attempt + 1,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        "provider rate limited request, backing off"
                    );
                    sleep(delay).await;
                }
                Ok(reply) => {
                    debug!(model, status = reply.status, attempt = attempt + 1, "provider replied");
                    return Ok(reply);
                }
                Err(err) if has_more => {
                    let delay = self.policy.transport_backoff * (attempt + 1);
                    warn!(
                        model,
                        attempt = attempt + 1,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transport failure, retrying"
                    );
                    sleep(delay).await;
                }
                Err(err) => {
                    warn!(model, attempts, error = %err, "transport failure, giving up");
                    return Err(Error::RetriesExhausted {
                        attempts,
                        last_error: err.to_string(),
                    });
                }
            }

            attempt += 1;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ai::gemini::{GenerationConfig, Part, TransportError};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays scripted replies and records when each attempt was dispatched.
    pub(crate) struct ScriptedTransport {
        replies: Mutex<VecDeque<std::result::Result<HttpReply, TransportError>>>,
        calls: Mutex<Vec<(String, Instant, GenerateRequest)>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(
            replies: Vec<std::result::Result<HttpReply, TransportError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub(crate) fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().iter().map(|(_, t, _)| *t).collect()
        }

        pub(crate) fn models(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(m, _, _)| m.clone()).collect()
        }

        pub(crate) fn requests(&self) -> Vec<GenerateRequest> {
            self.calls.lock().unwrap().iter().map(|(_, _, r)| r.clone()).collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn generate(
            &self,
            model: &str,
            request: &GenerateRequest,
        ) -> std::result::Result<HttpReply, TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), Instant::now(), request.clone()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError("script exhausted".to_string())))
        }
    }

    fn request() -> GenerateRequest {
        GenerateRequest::new(
            vec![Part::Text { text: "prompt".to_string() }],
            GenerationConfig::default(),
        )
    }

    fn caller(transport: Arc<ScriptedTransport>) -> RetryingCaller {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(6000)));
        RetryingCaller::new(transport, limiter)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let transport = ScriptedTransport::new(vec![Ok(HttpReply::new(200, "{}"))]);
        let reply = caller(transport.clone()).call("m", &request(), 3).await.unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_then_success_backs_off() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpReply::new(429, "")),
            Ok(HttpReply::new(200, "{}")),
        ]);
        let reply = caller(transport.clone()).call("m", &request(), 3).await.unwrap();
        assert_eq!(reply.status, 200);

        let times = transport.call_times();
        assert_eq!(times.len(), 2);
        // Backoff of 4s is shorter than the 6s limiter interval, so the
        // limiter governs the spacing.
        assert_eq!(times[1] - times[0], Duration::from_millis(6000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_with_attempt_index() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpReply::new(429, "")),
            Ok(HttpReply::new(429, "")),
            Ok(HttpReply::new(429, "")),
            Ok(HttpReply::new(200, "{}")),
        ]);
        let limiter = Arc::new(RateLimiter::new(Duration::ZERO));
        let caller = RetryingCaller::new(transport.clone(), limiter);
        caller.call("m", &request(), 4).await.unwrap();

        let times = transport.call_times();
        assert_eq!(times[1] - times[0], Duration::from_millis(4000));
        assert_eq!(times[2] - times[1], Duration::from_millis(8000));
        assert_eq!(times[3] - times[2], Duration::from_millis(12000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_rate_limit_returns_last_reply() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpReply::new(429, "a")),
            Ok(HttpReply::new(429, "b")),
            Ok(HttpReply::new(429, "c")),
        ]);
        let reply = caller(transport.clone()).call("m", &request(), 3).await.unwrap();
        assert_eq!(reply, HttpReply::new(429, "c"));
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpReply::new(404, "{}")),
            Ok(HttpReply::new(200, "{}")),
        ]);
        let reply = caller(transport.clone()).call("m", &request(), 3).await.unwrap();
        assert_eq!(reply.status, 404);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_retry_then_raise() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError("connection reset".to_string())),
            Err(TransportError("connection reset".to_string())),
        ]);
        let limiter = Arc::new(RateLimiter::new(Duration::ZERO));
        let caller = RetryingCaller::new(transport.clone(), limiter);
        let err = caller.call("m", &request(), 2).await.unwrap_err();

        match err {
            Error::RetriesExhausted { attempts, last_error } => {
                assert_eq!(attempts, 2);
                assert_eq!(last_error, "connection reset");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let times = transport.call_times();
        assert_eq!(times[1] - times[0], Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_stamps_the_limiter() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError("timeout".to_string())),
            Ok(HttpReply::new(500, "")),
        ]);
        let caller = caller(transport.clone());
        caller.call("m", &request(), 3).await.unwrap();

        let last = caller.limiter().last_request().await.unwrap();
        assert_eq!(last, transport.call_times()[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_still_attempts_once() {
        let transport = ScriptedTransport::new(vec![Ok(HttpReply::new(200, "{}"))]);
        caller(transport.clone()).call("m", &request(), 0).await.unwrap();
        assert_eq!(transport.call_count(), 1);
    }
}
