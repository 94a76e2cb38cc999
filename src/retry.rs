use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Failure of a single transport attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("rendering session failed: {0}")]
    Session(String),

    #[error("response could not be decoded: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_throttled(&self) -> bool {
        self.status() == Some(429)
    }

    /// The request URL is stripped first: query strings may carry access keys.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let err = err.without_url();
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// What to do with 4xx responses other than 429.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientErrorPolicy {
    #[default]
    Retry,
    FailFast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    pub backoff_cap: Duration,
    pub client_errors: ClientErrorPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_cap: Duration::from_secs(10),
            client_errors: ClientErrorPolicy::Retry,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RetryError {
    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: TransportError },

    #[error("non-retryable failure on attempt {attempts}: {error}")]
    NonRetryable {
        attempts: u32,
        error: TransportError,
    },
}

impl RetryError {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::NonRetryable { attempts, .. } => {
                *attempts
            }
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable(&self, error: &TransportError) -> bool {
        match error.status() {
            Some(429) => true,
            Some(status) if (400..500).contains(&status) => {
                self.client_errors == ClientErrorPolicy::Retry
            }
            _ => true,
        }
    }

    /// Delay inserted after failed attempt `attempt` (zero-based):
    /// `min(2^attempt, cap)` seconds, no jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let secs = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_secs(secs).min(self.backoff_cap)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` attempts were made. `op` receives the zero-based attempt.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<(T, u32), RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            debug!(operation = label, attempt = attempt + 1, max_attempts, "fetch attempt");
            match op(attempt).await {
                Ok(value) => return Ok((value, attempt + 1)),
                Err(error) => {
                    let attempts = attempt + 1;
                    if !self.is_retryable(&error) {
                        warn!(operation = label, attempts, %error, "non-retryable fetch failure");
                        return Err(RetryError::NonRetryable { attempts, error });
                    }
                    if attempts >= max_attempts {
                        warn!(operation = label, attempts, %error, "retries exhausted");
                        return Err(RetryError::Exhausted {
                            attempts,
                            last: error,
                        });
                    }
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        operation = label,
                        attempt = attempts,
                        delay_secs = delay.as_secs(),
                        %error,
                        "fetch attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
