//! Resilient model invocation: classified retry on the primary client,
//! single-shot failover to a fallback client.
//!
//! Only errors carrying a retryable service code
//! spend the retry budget; every other primary failure (fallback-coded,
//! unclassified, network, parse) goes straight to the fallback. The
//! fallback is tried exactly once and is constructed lazily on first need.

use crate::classify;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tenax_core::error::ProviderError;
use tenax_core::provider::{Provider, ProviderRequest, ProviderResponse};
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

/// Bounds for the primary-client retry loop.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total primary attempts per call, including the first (always ≥ 1).
    pub max_attempts: u32,

    /// Wait before the first retry.
    pub min_wait: Duration,

    /// Cap on the exponentially growing wait.
    pub max_wait: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, min_wait: Duration, max_wait: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_wait,
            max_wait,
        }
    }

    /// The wait before retry number `retry_index` (0-based):
    /// `min(max_wait, min_wait * 2^retry_index)`.
    pub fn backoff_delay(&self, retry_index: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry_index);
        self.min_wait.saturating_mul(factor).min(self.max_wait)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(10))
    }
}

/// The outcome of one resilient invocation.
///
/// `used_fallback` is call-scoped, so concurrent callers sharing one
/// invoker each see the truth about their own call.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub response: ProviderResponse,
    pub used_fallback: bool,
}

type FallbackFactory = Box<dyn Fn() -> Arc<dyn Provider> + Send + Sync>;

/// Wraps a primary and a fallback model client with retry and failover.
///
/// The fallback client is built by the supplied factory the first time a
/// primary failure actually reaches the fallback tier; while the primary
/// keeps succeeding the factory is never called.
pub struct ResilientProvider {
    primary: Arc<dyn Provider>,
    make_fallback: FallbackFactory,
    fallback: OnceCell<Arc<dyn Provider>>,
    policy: RetryPolicy,
    /// Whether the most recent call dispatched the fallback client.
    used_fallback: AtomicBool,
}

impl ResilientProvider {
    /// Create a new resilient invoker with a lazy fallback factory.
    pub fn new<F>(primary: Arc<dyn Provider>, make_fallback: F, policy: RetryPolicy) -> Self
    where
        F: Fn() -> Arc<dyn Provider> + Send + Sync + 'static,
    {
        Self {
            primary,
            make_fallback: Box::new(make_fallback),
            fallback: OnceCell::new(),
            policy,
            used_fallback: AtomicBool::new(false),
        }
    }

    /// Create with an already-constructed fallback client.
    pub fn with_fallback(
        primary: Arc<dyn Provider>,
        fallback: Arc<dyn Provider>,
        policy: RetryPolicy,
    ) -> Self {
        Self::new(primary, move || fallback.clone(), policy)
    }

    /// Whether the last completed call used the fallback client.
    pub fn using_fallback(&self) -> bool {
        self.used_fallback.load(Ordering::Relaxed)
    }

    /// Invoke the primary client with retry and backoff, failing over to
    /// the fallback client on exhaustion or on any non-retryable error.
    pub async fn invoke(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<Invocation, ProviderError> {
        self.used_fallback.store(false, Ordering::Relaxed);

        let mut attempt: u32 = 0;
        let primary_error = loop {
            match self.primary.complete(request.clone()).await {
                Ok(response) => {
                    return Ok(Invocation {
                        response,
                        used_fallback: false,
                    });
                }
                Err(err) => {
                    attempt += 1;
                    if classify::is_retryable(&err) && attempt < self.policy.max_attempts {
                        // retry_index starts at 0 for the first retry
                        let wait = self.policy.backoff_delay(attempt - 1);
                        warn!(
                            code = err.code().unwrap_or("unknown"),
                            attempt,
                            max_attempts = self.policy.max_attempts,
                            wait_ms = wait.as_millis() as u64,
                            "Primary model returned a retryable error, backing off"
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    break err;
                }
            }
        };

        // Catch-all failover: any primary failure, retryable-exhausted or
        // not, gets exactly one fallback attempt.
        warn!(
            error = %primary_error,
            attempts = attempt,
            "Primary model failed, falling back to secondary model"
        );
        self.used_fallback.store(true, Ordering::Relaxed);

        let fallback = self
            .fallback
            .get_or_init(|| async { (self.make_fallback)() })
            .await;

        match fallback.complete(request).await {
            Ok(response) => {
                info!(
                    model = %response.model,
                    "Fallback model invocation successful"
                );
                Ok(Invocation {
                    response,
                    used_fallback: true,
                })
            }
            Err(fallback_error) => {
                error!(
                    fallback_error = %fallback_error,
                    primary_error = %primary_error,
                    "Fallback model also failed"
                );
                Err(ProviderError::AllModelsFailed {
                    primary: Box::new(primary_error),
                    fallback: Box::new(fallback_error),
                })
            }
        }
    }
}

#[async_trait::async_trait]
impl Provider for ResilientProvider {
    fn name(&self) -> &str {
        "resilient"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        self.invoke(request).await.map(|inv| inv.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tenax_core::message::Message;

    /// A mock provider that fails a fixed number of times, then succeeds.
    struct FlakyProvider {
        error: ProviderError,
        failures: Mutex<usize>,
        calls: Mutex<usize>,
    }

    impl FlakyProvider {
        fn new(error: ProviderError, failures: usize) -> Self {
            Self {
                error,
                failures: Mutex::new(failures),
                calls: Mutex::new(0),
            }
        }

        /// Always fails.
        fn failing(error: ProviderError) -> Self {
            Self::new(error, usize::MAX)
        }

        /// Never fails.
        fn succeeding() -> Self {
            Self::new(ProviderError::Network("unused".into()), 0)
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl Provider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            *self.calls.lock().unwrap() += 1;
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures = failures.saturating_sub(1);
                return Err(self.error.clone());
            }
            Ok(ProviderResponse {
                message: Message::assistant("ok"),
                usage: None,
                model: "test-model".into(),
            })
        }
    }

    fn throttling() -> ProviderError {
        ProviderError::Service {
            code: "ThrottlingException".into(),
            message: "Rate exceeded".into(),
        }
    }

    fn test_request() -> ProviderRequest {
        ProviderRequest {
            model: "test".into(),
            messages: vec![Message::user("hello")],
            temperature: 0.7,
            max_tokens: None,
            tools: vec![],
            stop: vec![],
        }
    }

    fn invoker(
        primary: Arc<FlakyProvider>,
        fallback: Arc<FlakyProvider>,
    ) -> (ResilientProvider, Arc<AtomicUsize>) {
        let factory_calls = Arc::new(AtomicUsize::new(0));
        let counter = factory_calls.clone();
        let invoker = ResilientProvider::new(
            primary,
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                fallback.clone() as Arc<dyn Provider>
            },
            RetryPolicy::default(),
        );
        (invoker, factory_calls)
    }

    #[tokio::test]
    async fn primary_success_no_fallback() {
        let primary = Arc::new(FlakyProvider::succeeding());
        let fallback = Arc::new(FlakyProvider::succeeding());
        let (invoker, factory_calls) = invoker(primary.clone(), fallback.clone());

        let result = invoker.invoke(test_request()).await.unwrap();
        assert!(!result.used_fallback);
        assert!(!invoker.using_fallback());
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 0);
        assert_eq!(factory_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_then_succeed() {
        let primary = Arc::new(FlakyProvider::new(throttling(), 1));
        let fallback = Arc::new(FlakyProvider::succeeding());
        let (invoker, _) = invoker(primary.clone(), fallback.clone());

        let result = invoker.invoke(test_request()).await.unwrap();
        assert!(!result.used_fallback);
        assert_eq!(primary.calls(), 2);
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_exhaustion_triggers_fallback() {
        let primary = Arc::new(FlakyProvider::failing(throttling()));
        let fallback = Arc::new(FlakyProvider::succeeding());
        let (invoker, factory_calls) = invoker(primary.clone(), fallback.clone());

        let result = invoker.invoke(test_request()).await.unwrap();
        assert!(result.used_fallback);
        assert!(invoker.using_fallback());
        assert_eq!(primary.calls(), 3);
        assert_eq!(fallback.calls(), 1);
        assert_eq!(factory_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_retryable_error_skips_straight_to_fallback() {
        let primary = Arc::new(FlakyProvider::failing(ProviderError::Network(
            "conn refused".into(),
        )));
        let fallback = Arc::new(FlakyProvider::succeeding());
        let (invoker, _) = invoker(primary.clone(), fallback.clone());

        let result = invoker.invoke(test_request()).await.unwrap();
        assert!(result.used_fallback);
        assert_eq!(primary.calls(), 1, "no retries for non-retryable errors");
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn fallback_coded_error_skips_retry() {
        let primary = Arc::new(FlakyProvider::failing(ProviderError::Service {
            code: "ModelNotReadyException".into(),
            message: "warming up".into(),
        }));
        let fallback = Arc::new(FlakyProvider::succeeding());
        let (invoker, _) = invoker(primary.clone(), fallback.clone());

        let result = invoker.invoke(test_request()).await.unwrap();
        assert!(result.used_fallback);
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn both_fail_reports_both_causes() {
        let primary = Arc::new(FlakyProvider::failing(ProviderError::Service {
            code: "ModelErrorException".into(),
            message: "model exploded".into(),
        }));
        let fallback = Arc::new(FlakyProvider::failing(ProviderError::Network(
            "conn reset".into(),
        )));
        let (invoker, _) = invoker(primary.clone(), fallback.clone());

        let err = invoker.invoke(test_request()).await.unwrap_err();
        assert!(invoker.using_fallback());
        match &err {
            ProviderError::AllModelsFailed { primary, fallback } => {
                assert!(primary.to_string().contains("model exploded"));
                assert!(fallback.to_string().contains("conn reset"));
            }
            other => panic!("Expected AllModelsFailed, got: {other:?}"),
        }
        let text = err.to_string();
        assert!(text.contains("model exploded"));
        assert!(text.contains("conn reset"));
    }

    #[tokio::test]
    async fn fallback_factory_never_invoked_across_repeated_successes() {
        let primary = Arc::new(FlakyProvider::succeeding());
        let fallback = Arc::new(FlakyProvider::succeeding());
        let (invoker, factory_calls) = invoker(primary.clone(), fallback.clone());

        for _ in 0..5 {
            let result = invoker.invoke(test_request()).await.unwrap();
            assert!(!result.used_fallback);
        }
        assert_eq!(factory_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn flag_resets_on_next_call() {
        // Fails once (non-retryable), then succeeds.
        let primary = Arc::new(FlakyProvider::new(
            ProviderError::Network("blip".into()),
            1,
        ));
        let fallback = Arc::new(FlakyProvider::succeeding());
        let (invoker, _) = invoker(primary.clone(), fallback.clone());

        let first = invoker.invoke(test_request()).await.unwrap();
        assert!(first.used_fallback);
        assert!(invoker.using_fallback());

        let second = invoker.invoke(test_request()).await.unwrap();
        assert!(!second.used_fallback);
        assert!(!invoker.using_fallback());
    }

    #[test]
    fn backoff_growth_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(8));
        assert_eq!(policy.backoff_delay(4), Duration::from_secs(10));
        assert_eq!(policy.backoff_delay(30), Duration::from_secs(10));
    }

    #[test]
    fn retry_policy_requires_at_least_one_attempt() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(policy.max_attempts, 1);
    }

    #[tokio::test]
    async fn provider_trait_delegates_to_invoke() {
        let primary = Arc::new(FlakyProvider::succeeding());
        let fallback = Arc::new(FlakyProvider::succeeding());
        let (invoker, _) = invoker(primary.clone(), fallback.clone());

        let response = invoker.complete(test_request()).await.unwrap();
        assert_eq!(response.message.content, "ok");
        assert_eq!(invoker.name(), "resilient");
    }
}
