//! Bounded exponential backoff for connection attempts.

use fedlink_core::FederateError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::io;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry budget and backoff schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    #[serde(with = "crate::config::duration")]
    pub initial_backoff: Duration,
    #[serde(with = "crate::config::duration")]
    pub max_backoff: Duration,
    /// Up to this fraction of each backoff is added at random.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(16));
        let base = self
            .initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff);
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }
        let extra = rand::thread_rng().gen_range(0.0..=self.jitter.min(1.0));
        base + base.mul_f64(extra)
    }

    /// Run `op` until it succeeds or the budget is spent.
    ///
    /// `what` names the target in logs and in the resulting
    /// [`FederateError::Unreachable`].
    pub fn run<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> io::Result<T>,
    ) -> Result<T, FederateError> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(source) if attempt >= attempts => {
                    warn!(peer = what, attempts, error = %source, "Giving up");
                    return Err(FederateError::Unreachable {
                        what: what.to_string(),
                        attempts,
                        source,
                    });
                }
                Err(e) => {
                    let delay = self.backoff(attempt - 1);
                    debug!(
                        peer = what,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Attempt failed, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}
