// ─── HTTP ───
// Shared client construction plus the generic retry driver used by every
// network call in the launcher (OAuth stages, manifest fetch, downloads).

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use tracing::warn;

use crate::core::error::{LauncherError, LauncherResult};

const APP_USER_AGENT: &str = "CraftLauncher/3.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub fn build_http_client() -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .timeout(REQUEST_TIMEOUT)
        .build()
}

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base × (attempt + 1)`: 1x, 2x, 3x, ...
    Linear,
    /// `base × 2^attempt`: 1x, 2x, 4x, ...
    Exponential,
}

/// Retry behavior for one class of requests. Callers pick the attempt count,
/// base delay and growth curve; the OAuth chain additionally opts into
/// retrying connection-level failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
    pub retry_connection_errors: bool,
}

impl RetryPolicy {
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff: Backoff::Exponential,
            retry_connection_errors: false,
        }
    }

    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff: Backoff::Linear,
            retry_connection_errors: false,
        }
    }

    pub fn with_connection_retries(mut self) -> Self {
        self.retry_connection_errors = true;
        self
    }

    /// Delay to sleep after a failed attempt (0-based index).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Linear => self.base_delay * (attempt + 1),
            Backoff::Exponential => self.base_delay * 2u32.saturating_pow(attempt),
        }
    }

    fn should_retry(&self, error: &LauncherError) -> bool {
        error.is_transient() || (self.retry_connection_errors && error.is_connection())
    }
}

/// Run `operation` up to `policy.max_attempts` times, sleeping between
/// attempts per the policy. Non-retryable errors abort immediately; when all
/// attempts are exhausted the last error is returned.
pub async fn with_retry<T, F, Fut>(
    label: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> LauncherResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LauncherResult<T>>,
{
    let mut last_error = None;

    for attempt in 0..policy.max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let retryable = policy.should_retry(&error);
                warn!(
                    "{}: attempt {}/{} failed: {}",
                    label,
                    attempt + 1,
                    policy.max_attempts,
                    error
                );

                if !retryable {
                    return Err(error);
                }
                last_error = Some(error);

                if attempt + 1 < policy.max_attempts {
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| LauncherError::Other(format!("{label}: no attempts made"))))
}

/// Map a non-success response to `HttpStatus`, passing successes through.
pub fn check_status(response: reqwest::Response) -> LauncherResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(LauncherError::HttpStatus {
            url: response.url().to_string(),
            status: status.as_u16(),
        })
    }
}
