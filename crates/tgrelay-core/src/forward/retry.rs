use std::time::Duration;

/// Bounded exponential backoff for transient fetch failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt. Zero aborts on the first error.
    pub max_retries: usize,
    pub initial_backoff: Duration,
    pub multiplier: u32,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            multiplier: 2,
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Abort the run on the first platform error.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: usize) -> Duration {
        let factor = self
            .multiplier
            .checked_pow(attempt.min(u32::MAX as usize) as u32)
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}
