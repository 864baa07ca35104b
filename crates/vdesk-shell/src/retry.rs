//! Bounded exponential backoff for reconnecting to the shell.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff schedule used while re-acquiring shell interfaces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the second attempt, in milliseconds.
    pub initial_ms: u64,
    /// Multiplier applied after each failed attempt.
    pub factor: u32,
    /// Upper bound on any single delay, in milliseconds.
    pub max_ms: u64,
    /// Total connection attempts, including the first.
    pub attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_ms: 50,
            factor: 2,
            max_ms: 800,
            attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after failed attempt number `attempt` (0-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.factor.max(1));
        let mut ms = self.initial_ms;
        for _ in 0..attempt {
            ms = ms.saturating_mul(factor);
            if ms >= self.max_ms {
                break;
            }
        }
        Duration::from_millis(ms.min(self.max_ms))
    }

    /// Delays between consecutive attempts; one fewer than [`Self::attempts`].
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.attempts.saturating_sub(1)).map(|i| self.delay(i))
    }

    /// Number of attempts, never less than one.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn default_schedule() {
        let p = RetryPolicy::default();
        let ms: Vec<u128> = p.delays().map(|d| d.as_millis()).collect();
        assert_eq!(ms, vec![50, 100, 200, 400]);
        assert_eq!(p.delay(10), Duration::from_millis(800));
    }

    #[test]
    fn zero_factor_does_not_shrink() {
        let p = RetryPolicy {
            factor: 0,
            ..RetryPolicy::default()
        };
        assert!(p.delays().all(|d| d == Duration::from_millis(50)));
    }

    proptest! {
        #[test]
        fn delays_never_decrease_and_respect_cap(
            initial in 0u64..5_000,
            factor in 0u32..10,
            max in 0u64..10_000,
            attempts in 0u32..40,
        ) {
            let p = RetryPolicy { initial_ms: initial, factor, max_ms: max, attempts };
            let delays: Vec<Duration> = p.delays().collect();
            prop_assert_eq!(delays.len() as u32, attempts.saturating_sub(1));
            for pair in delays.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }
            for d in &delays {
                prop_assert!(*d <= Duration::from_millis(max));
            }
        }
    }
}
