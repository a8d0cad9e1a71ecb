//! Wall-clock budget shared by every remote call in a sync cycle

use std::time::{Duration, Instant};

use super::source::SourceError;

/// Hard deadline for one sync cycle
///
/// Remote calls take `remaining()` as their timeout, backoff sleeps never
/// cross it, and the engine checks it between messages and before writing
/// the cursor.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Budgets are capped here so `Instant` arithmetic cannot overflow
    const MAX_BUDGET: Duration = Duration::from_secs(365 * 24 * 60 * 60);

    /// A deadline `budget` from now
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget.min(Self::MAX_BUDGET),
        }
    }

    /// Time left before the deadline, or `None` once it has passed
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .checked_duration_since(Instant::now())
            .filter(|d| !d.is_zero())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_none()
    }

    /// Fail with [`SourceError::Timeout`] once the deadline has passed
    pub fn check(&self) -> Result<(), SourceError> {
        if self.is_expired() {
            Err(SourceError::Timeout)
        } else {
            Ok(())
        }
    }
}
