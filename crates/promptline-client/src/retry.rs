use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use promptline_core::RetryConfig;
use tokio::time::sleep;
use tracing::{info, warn};

/// Source of the random backoff factor.
pub trait Jitter: Send + Sync + fmt::Debug {
    /// A uniform sample in `[0, upper)`.
    fn sample(&self, upper: f64) -> f64;
}

/// Process-seeded jitter backed by `fastrand`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn sample(&self, upper: f64) -> f64 {
        fastrand::f64() * upper
    }
}

/// Anything carrying an HTTP status the retry loop can inspect.
pub trait HttpStatus {
    fn status_code(&self) -> u16;
}

impl HttpStatus for reqwest::Response {
    fn status_code(&self) -> u16 {
        self.status().as_u16()
    }
}

/// Bookkeeping for one `run` call.
#[derive(Debug, Default)]
struct RetryState {
    attempts: u32,
    last_delay: Duration,
}

/// Jittered exponential backoff around a single request/response exchange.
///
/// Attempt `i` (0-based) that fails is followed by a sleep of
/// `min_delay * U[0, 2^i)`, capped at `max_delay`. A transport error or a
/// 5xx status is retried; anything below 500 is returned as-is, so 4xx
/// responses are final.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    max_retries: u32,
    min_delay: Duration,
    max_delay: Duration,
    jitter: Arc<dyn Jitter>,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for ExponentialBackoff {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, config.min_delay(), config.max_delay())
    }
}

impl ExponentialBackoff {
    /// `max_retries` is the total attempt budget and is clamped to at least 1.
    pub fn new(max_retries: u32, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            min_delay,
            max_delay,
            jitter: Arc::new(RandomJitter),
        }
    }

    pub fn with_jitter(mut self, jitter: impl Jitter + 'static) -> Self {
        self.jitter = Arc::new(jitter);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay to wait after the failed attempt with 0-based index `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ceiling = 2f64.powi(attempt.min(1023) as i32);
        let factor = self.jitter.sample(ceiling);
        let secs = self.min_delay.as_secs_f64() * factor;

        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }

    /// Run `attempt` until it succeeds or the budget is spent.
    ///
    /// The last outcome is returned unchanged, so after exhaustion the caller
    /// may get `Ok` with a 5xx response and must inspect the status.
    pub async fn run<R, E, F, Fut>(&self, mut attempt: F) -> Result<R, E>
    where
        R: HttpStatus,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let mut state = RetryState::default();

        loop {
            let outcome = attempt().await;
            state.attempts += 1;

            let retryable = match &outcome {
                Ok(resp) => resp.status_code() >= 500,
                Err(_) => true,
            };

            if !retryable {
                if state.attempts > 1 {
                    info!(attempts = state.attempts, "request succeeded after retry");
                }
                return outcome;
            }

            if state.attempts >= self.max_retries {
                warn!(attempts = state.attempts, "retries exhausted");
                return outcome;
            }

            state.last_delay = self.delay_for(state.attempts - 1);
            let delay_ms = state.last_delay.as_millis() as u64;
            match &outcome {
                Ok(resp) => warn!(
                    status = resp.status_code(),
                    attempt = state.attempts,
                    delay_ms,
                    "server error, retrying"
                ),
                Err(e) => warn!(
                    err = %e,
                    attempt = state.attempts,
                    delay_ms,
                    "request failed, retrying"
                ),
            }

            // release the failed response before sleeping
            drop(outcome);
            sleep(state.last_delay).await;
        }
    }
}

/// How the client re-issues failed non-streaming requests.
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    /// Exactly one attempt.
    None,
    Exponential(ExponentialBackoff),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Exponential(ExponentialBackoff::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy::Exponential(ExponentialBackoff::from(config))
    }
}

impl RetryPolicy {
    pub async fn run<R, E, F, Fut>(&self, mut attempt: F) -> Result<R, E>
    where
        R: HttpStatus,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        match self {
            RetryPolicy::None => attempt().await,
            RetryPolicy::Exponential(backoff) => backoff.run(attempt).await,
        }
    }
}
