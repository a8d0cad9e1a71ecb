//! Exponential backoff for remote mailbox calls

use log::warn;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::deadline::Deadline;
use super::source::SourceError;

/// How often and how patiently to retry a remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled after every failure
    pub base_delay_ms: u64,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
        }
    }

    /// Policy for listing calls (search, profile, history): 3 attempts from 1s
    pub const fn listing() -> Self {
        Self::new(3, 1000)
    }

    /// Policy for per-message fetches: 2 attempts from 500ms
    pub const fn fetch() -> Self {
        Self::new(2, 500)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Run `op` under this policy, sleeping on the current thread between attempts
    pub fn run<T, F>(&self, deadline: &Deadline, op: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Result<T, SourceError>,
    {
        self.run_with_sleep(deadline, std::thread::sleep, op)
    }

    /// Run `op` under this policy with an injectable sleep
    ///
    /// `NotFound` and `Timeout` return immediately. A backoff sleep that
    /// would run past the deadline is not taken; the call fails with
    /// `Timeout` instead. No sleep follows the final attempt.
    pub fn run_with_sleep<T, F, S>(
        &self,
        deadline: &Deadline,
        mut sleep: S,
        mut op: F,
    ) -> Result<T, SourceError>
    where
        F: FnMut() -> Result<T, SourceError>,
        S: FnMut(Duration),
    {
        let attempts = self.max_attempts.max(1);
        let mut delay = self.base_delay();
        let mut attempt = 1;

        loop {
            deadline.check()?;

            let err = match op() {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !err.is_retryable() {
                return Err(err);
            }

            if attempt >= attempts {
                return Err(SourceError::Exhausted {
                    attempts,
                    last: Box::new(err),
                });
            }

            if !deadline.remaining().is_some_and(|left| left > delay) {
                return Err(SourceError::Timeout);
            }

            warn!("Mailbox API error: {}. Retrying in {:?}...", err, delay);
            sleep(delay);
            delay *= 2;
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::listing()
    }
}
