use std::time::Duration;

use rand::Rng;

/// Exponential reconnect backoff with a cap and "equal jitter".
///
/// The policy is stateless; callers own the attempt counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RetryPolicy {
    /// Build a policy; a zero base becomes 1 ms and the cap never sits below the base.
    pub const fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        let base_delay_ms = if base_delay_ms == 0 { 1 } else { base_delay_ms };
        let max_delay_ms = if max_delay_ms < base_delay_ms {
            base_delay_ms
        } else {
            max_delay_ms
        };
        Self {
            base_delay_ms,
            max_delay_ms,
        }
    }

    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    /// Non-jittered delay for `attempt`, floored by a server hint and capped.
    pub fn delay_for_attempt(&self, attempt: u32, retry_after_hint: Option<Duration>) -> Duration {
        Duration::from_millis(self.bounded_ms(attempt, retry_after_hint))
    }

    /// Delay drawn uniformly from `[d/2, d]` where `d` is the non-jittered delay.
    ///
    /// Below the cap, `d` doubles per attempt, so consecutive jittered delays
    /// never decrease. A server hint is still honoured as a floor.
    pub fn jittered_delay_for_attempt<R: Rng>(
        &self,
        attempt: u32,
        retry_after_hint: Option<Duration>,
        rng: &mut R,
    ) -> Duration {
        let upper = self.bounded_ms(attempt, retry_after_hint);
        let hint_floor = hint_ms(retry_after_hint).min(self.max_delay_ms);
        let lower = (upper / 2).max(hint_floor).min(upper);
        Duration::from_millis(rng.gen_range(lower..=upper))
    }

    fn bounded_ms(&self, attempt: u32, retry_after_hint: Option<Duration>) -> u64 {
        let shift = attempt.min(20);
        let multiplier = 1_u64 << shift;
        let calculated = self.base_delay_ms.saturating_mul(multiplier);
        calculated
            .max(hint_ms(retry_after_hint))
            .min(self.max_delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(500, 30_000)
    }
}

fn hint_ms(hint: Option<Duration>) -> u64 {
    hint.map(|hint| u64::try_from(hint.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
