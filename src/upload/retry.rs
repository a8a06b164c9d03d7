/// Bounded exponential backoff with jitter
use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::RetryConfig;

/// Something that can wait. Production code sleeps on the tokio timer; tests
/// record the requested delays instead.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// A [`Sleeper`] that returns immediately and remembers what it was asked for.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(delay);
    }
}

/// Implemented by failures that know whether another attempt may help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fractional spread applied to each delay
    pub jitter: f64,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every allowed attempt failed with a retryable error; holds the last one.
    Exhausted { retries: u32, last: E },
    /// A non-retryable error ended the loop early.
    Fatal(E),
    /// Cancellation fired while waiting between attempts.
    Cancelled,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), before jitter.
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    /// Delay before retry number `retry` (1-based), with jitter applied.
    pub fn delay(&self, retry: u32) -> Duration {
        let nominal = self.nominal_delay(retry);
        if self.jitter <= 0.0 {
            return nominal;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..self.jitter);
        Duration::from_millis((nominal.as_millis() as f64 * factor) as u64)
    }

    /// Start a fresh retry budget for one operation.
    pub fn backoff(&self) -> Backoff<'_> {
        Backoff {
            policy: self,
            retries: 0,
        }
    }

    /// Run `op` until it succeeds, fails fatally, the budget runs out or
    /// `cancel` fires. `op` receives the 0-based attempt number.
    pub async fn run<F, Fut, T, E>(
        &self,
        sleeper: &dyn Sleeper,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let mut backoff = self.backoff();
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(RetryError::Fatal(e)),
                Err(e) => {
                    let Some(delay) = backoff.next_delay() else {
                        warn!("Max retries ({}) reached: {}", self.max_attempts, e);
                        return Err(RetryError::Exhausted {
                            retries: backoff.retries(),
                            last: e,
                        });
                    };
                    warn!(
                        "Retry attempt {}/{} after {}, waiting {:?}",
                        backoff.retries(),
                        self.max_attempts,
                        e,
                        delay
                    );
                    if !wait(sleeper, cancel, delay).await {
                        return Err(RetryError::Cancelled);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Retry budget of a single operation.
#[derive(Debug)]
pub struct Backoff<'a> {
    policy: &'a RetryPolicy,
    retries: u32,
}

impl Backoff<'_> {
    /// Consume one retry and return how long to wait, or `None` once the
    /// budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.retries >= self.policy.max_attempts {
            return None;
        }
        self.retries += 1;
        Some(self.policy.delay(self.retries))
    }

    /// Forget earlier failures after the operation made progress.
    pub fn reset(&mut self) {
        self.retries = 0;
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }
}

/// Sleep unless cancelled first. Returns `false` on cancellation.
pub async fn wait(sleeper: &dyn Sleeper, cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = sleeper.sleep(delay) => true,
    }
}
