use std::time::Duration;

use rand::Rng;
use tracing::debug;

pub(crate) const RATE_LIMIT_BASE_DELAY: Duration = Duration::from_secs(1);
pub(crate) const RATE_LIMIT_MAX_DELAY: Duration = Duration::from_secs(300);
pub(crate) const DEFAULT_JITTER: Duration = Duration::from_secs(1);

/// Consecutive rate-limit hits for one wrapped call.
///
/// A tracker belongs to exactly one [`super::RetryController`] invocation
/// and is never shared, so it needs no synchronisation.
#[derive(Debug, Clone)]
pub struct RateLimitTracker {
    consecutive_hits: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: Duration,
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new(RATE_LIMIT_BASE_DELAY, RATE_LIMIT_MAX_DELAY)
    }
}

impl RateLimitTracker {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            consecutive_hits: 0,
            base_delay,
            max_delay,
            jitter: DEFAULT_JITTER,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn consecutive_hits(&self) -> u32 {
        self.consecutive_hits
    }

    /// Records one more rate-limit hit and returns how long to wait.
    ///
    /// The first hit already waits `base_delay`; the exponent is the
    /// post-increment count minus one.
    pub fn delay_for_rate_limit(&mut self) -> Duration {
        self.consecutive_hits = self.consecutive_hits.saturating_add(1);
        rate_limit_backoff(self.base_delay, self.max_delay, self.consecutive_hits)
            + random_jitter(self.jitter)
    }

    /// Clears the hit counter. Returns whether anything was reset.
    pub fn on_success(&mut self) -> bool {
        if self.consecutive_hits == 0 {
            return false;
        }
        debug!(
            hits = self.consecutive_hits,
            "rate limit tracker reset after successful call"
        );
        self.consecutive_hits = 0;
        true
    }
}

/// `min(base * 2^(hits-1), max)` without jitter.
pub fn rate_limit_backoff(base: Duration, max: Duration, hits: u32) -> Duration {
    let exponent = hits.saturating_sub(1);
    2u32.checked_pow(exponent)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(max, |delay| delay.min(max))
}

pub(crate) fn random_jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let secs = rand::thread_rng().gen_range(0.0..=max.as_secs_f64());
    Duration::from_secs_f64(secs)
}
