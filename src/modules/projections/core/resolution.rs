use crate::modules::projections::core::errors::ProjectionError;
use crate::shared::infrastructure::cancellation::CancellationToken;
use async_trait::async_trait;
use std::time::Duration;

/// What the projector does with a failed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionResolution {
    /// Treat the batch as handled and move on.
    Ignore,
    /// Stop and surface the error.
    Abort,
    /// Run the whole batch again.
    Retry,
    /// Run every transaction of the batch as its own batch.
    RetryIndividual,
}

/// Decides how to continue after a batch failed. `attempts` counts the
/// attempts made so far for the current unit of work, starting at 1.
#[async_trait]
pub trait ExceptionPolicy: Send + Sync {
    async fn resolve(
        &self,
        error: &ProjectionError,
        attempts: u32,
        cancellation: &CancellationToken,
    ) -> ExceptionResolution;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAbort;

#[async_trait]
impl ExceptionPolicy for AlwaysAbort {
    async fn resolve(
        &self,
        _error: &ProjectionError,
        _attempts: u32,
        _cancellation: &CancellationToken,
    ) -> ExceptionResolution {
        ExceptionResolution::Abort
    }
}

#[async_trait]
impl<F> ExceptionPolicy for F
where
    F: Fn(&ProjectionError, u32) -> ExceptionResolution + Send + Sync,
{
    async fn resolve(
        &self,
        error: &ProjectionError,
        attempts: u32,
        _cancellation: &CancellationToken,
    ) -> ExceptionResolution {
        self(error, attempts)
    }
}

/// Retries the batch after an exponentially growing, capped delay and falls
/// back to `then` once `max_retries` retries have been spent.
#[derive(Debug, Clone)]
pub struct RetryWithBackoff {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
    pub then: ExceptionResolution,
}

impl Default for RetryWithBackoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            max_retries: 5,
            then: ExceptionResolution::Abort,
        }
    }
}

impl RetryWithBackoff {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn then(mut self, resolution: ExceptionResolution) -> Self {
        self.then = resolution;
        self
    }

    /// Delay before retry number `retry` (0-indexed): base * 2^retry, capped.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exponential_ms = base_ms.saturating_mul(1u64 << retry.min(20));
        Duration::from_millis(exponential_ms.min(self.max_delay.as_millis() as u64))
    }

    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts <= self.max_retries
    }
}

#[async_trait]
impl ExceptionPolicy for RetryWithBackoff {
    async fn resolve(
        &self,
        _error: &ProjectionError,
        attempts: u32,
        cancellation: &CancellationToken,
    ) -> ExceptionResolution {
        if !self.should_retry(attempts) {
            return self.then;
        }
        tokio::select! {
            _ = tokio::time::sleep(self.delay_for_retry(attempts.saturating_sub(1))) => ExceptionResolution::Retry,
            _ = cancellation.cancelled() => ExceptionResolution::Abort,
        }
    }
}
