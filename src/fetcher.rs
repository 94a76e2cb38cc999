use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::{FetchResult, Identifier};
use crate::limiter::RateGate;
use crate::retry::{RetryError, RetryPolicy, TransportError};

/// One attempt at retrieving the raw content for an identifier.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_once(&self, identifier: &Identifier) -> Result<Vec<u8>, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn fetch_once(&self, identifier: &Identifier) -> Result<Vec<u8>, TransportError> {
        (**self).fetch_once(identifier).await
    }
}

/// Transport-agnostic retrieval with bounded retry. Exhaustion is reported
/// through `FetchResult`, never raised.
pub struct Fetcher<T: Transport> {
    transport: T,
    policy: RetryPolicy,
    rate_gate: Option<Arc<RateGate>>,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            rate_gate: None,
        }
    }

    pub fn with_rate_gate(mut self, gate: Arc<RateGate>) -> Self {
        self.rate_gate = Some(gate);
        self
    }

    pub async fn fetch(&self, identifier: &Identifier) -> FetchResult {
        info!(
            identifier = %identifier,
            transport = self.transport.name(),
            "fetching"
        );
        let transport = &self.transport;
        let gate = self.rate_gate.as_deref();
        let result = self
            .policy
            .run(identifier.as_str(), |_| async move {
                if let Some(gate) = gate {
                    gate.wait().await;
                }
                transport.fetch_once(identifier).await
            })
            .await;

        match result {
            Ok((content, attempts)) => {
                info!(identifier = %identifier, attempts, bytes = content.len(), "fetched");
                FetchResult::success(identifier.clone(), content, attempts)
            }
            Err(err) => {
                let attempts = err.attempts();
                let reason = match &err {
                    RetryError::Exhausted { last, .. } => {
                        format!("retries exhausted after {attempts} attempt(s): {last}")
                    }
                    RetryError::NonRetryable { error, .. } => format!("non-retryable: {error}"),
                };
                warn!(identifier = %identifier, attempts, reason = %reason, "fetch failed");
                FetchResult::failure(identifier.clone(), reason, attempts)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::retry::ClientErrorPolicy;

    struct FlakyTransport {
        failures_before_success: usize,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn fetch_once(&self, identifier: &Identifier) -> Result<Vec<u8>, TransportError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls <= self.failures_before_success {
                return Err(TransportError::Status {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            Ok(identifier.as_str().as_bytes().to_vec())
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff_cap: Duration::from_secs(4),
            client_errors: ClientErrorPolicy::Retry,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_within_attempt_budget() {
        let transport = FlakyTransport {
            failures_before_success: 2,
            calls: Mutex::new(0),
        };
        let fetcher = Fetcher::new(transport, policy(3));
        let id: Identifier = "TP53".parse().unwrap();
        let result = fetcher.fetch(&id).await;
        assert!(result.succeeded);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.raw_content.as_deref(), Some(b"TP53".as_slice()));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_yields_failed_result() {
        let transport = FlakyTransport {
            failures_before_success: usize::MAX,
            calls: Mutex::new(0),
        };
        let fetcher = Fetcher::new(transport, policy(2));
        let id: Identifier = "FAKEGENE".parse().unwrap();
        let result = fetcher.fetch(&id).await;
        assert!(!result.succeeded);
        assert!(result.raw_content.is_none());
        assert_eq!(result.attempts, 2);
        assert!(result.failure_reason.unwrap().contains("503"));
        assert_eq!(*fetcher.transport.calls.lock().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_gate_guards_every_attempt() {
        let transport = FlakyTransport {
            failures_before_success: 0,
            calls: Mutex::new(0),
        };
        let gate = Arc::new(RateGate::new(Duration::from_secs(1)));
        let fetcher = Fetcher::new(transport, policy(1)).with_rate_gate(gate);
        let start = tokio::time::Instant::now();
        for name in ["A1", "B2", "C3"] {
            let id: Identifier = name.parse().unwrap();
            assert!(fetcher.fetch(&id).await.succeeded);
        }
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
