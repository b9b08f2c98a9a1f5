use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::TranslateError;

mod rate_limit;

pub use rate_limit::{RateLimitTracker, rate_limit_backoff};
use rate_limit::{DEFAULT_JITTER, RATE_LIMIT_BASE_DELAY, RATE_LIMIT_MAX_DELAY, random_jitter};

const RATE_LIMIT_PHRASES: [&str; 4] = ["rate limit", "too many requests", "429", "quota exceeded"];
const MAX_BACKOFF_EXPONENT: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    RateLimit,
    TransientFormat,
    TransientOther,
    Permanent,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::RateLimit => "rate_limit",
            ErrorClass::TransientFormat => "transient_format",
            ErrorClass::TransientOther => "transient_other",
            ErrorClass::Permanent => "permanent",
        }
    }
}

/// Decides how a failed translate attempt is retried.
///
/// `Cancelled` and `Fatal` are never retried. Otherwise the
/// `RateLimited` variant, then a rate-limit phrase anywhere in the message,
/// wins over the format check.
pub fn classify(error: &TranslateError) -> ErrorClass {
    match error {
        TranslateError::Cancelled | TranslateError::Fatal(_) => return ErrorClass::Permanent,
        TranslateError::RateLimited { .. } => return ErrorClass::RateLimit,
        _ => {}
    }
    if is_rate_limit_message(&error.to_string()) {
        return ErrorClass::RateLimit;
    }
    match error {
        TranslateError::InvalidResponse(_) => ErrorClass::TransientFormat,
        _ => ErrorClass::TransientOther,
    }
}

fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RATE_LIMIT_PHRASES
        .iter()
        .any(|phrase| lower.contains(phrase))
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub rate_limit_base: Duration,
    pub rate_limit_max: Duration,
    pub initial_delay: Duration,
    pub format_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_base: RATE_LIMIT_BASE_DELAY,
            rate_limit_max: RATE_LIMIT_MAX_DELAY,
            initial_delay: Duration::from_secs(1),
            format_delay: Duration::from_millis(100),
            jitter: DEFAULT_JITTER,
        }
    }
}

impl RetryPolicy {
    /// `initial_delay * 2^min(attempt, 8)` without jitter.
    pub fn transient_backoff(&self, attempt: u64) -> Duration {
        let exponent = attempt.min(u64::from(MAX_BACKOFF_EXPONENT)) as u32;
        self.initial_delay.saturating_mul(1u32 << exponent)
    }

    fn tracker(&self) -> RateLimitTracker {
        RateLimitTracker::new(self.rate_limit_base, self.rate_limit_max).with_jitter(self.jitter)
    }
}

/// Supervises one logical translate call.
///
/// Attempts are unbounded. The loop ends on success, on a permanent
/// error, or when the escalation callback returns `false`. Create one
/// controller per call; its rate-limit state is not meant to outlive it.
#[derive(Debug)]
pub struct RetryController {
    policy: RetryPolicy,
    tracker: RateLimitTracker,
    label: String,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        let tracker = policy.tracker();
        Self {
            policy,
            tracker,
            label: "translate".to_string(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn tracker(&self) -> &RateLimitTracker {
        &self.tracker
    }

    pub async fn execute<T, F, Fut>(&mut self, operation: F) -> Result<T, TranslateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TranslateError>>,
    {
        self.run(operation, None).await
    }

    /// Like [`Self::execute`], but asks `on_failure` after every retryable
    /// failure whether to keep going. `Ok(false)` ends the loop with the
    /// error that triggered it; an `Err` from the callback is logged and
    /// ignored.
    pub async fn execute_with_escalation<T, F, Fut, C>(
        &mut self,
        operation: F,
        mut on_failure: C,
    ) -> Result<T, TranslateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TranslateError>>,
        C: FnMut() -> Result<bool>,
    {
        let on_failure: &mut dyn FnMut() -> Result<bool> = &mut on_failure;
        self.run(operation, Some(on_failure)).await
    }

    async fn run<T, F, Fut>(
        &mut self,
        mut operation: F,
        mut on_failure: Option<&mut dyn FnMut() -> Result<bool>>,
    ) -> Result<T, TranslateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TranslateError>>,
    {
        let mut attempt: u64 = 1;
        loop {
            let err = match operation().await {
                Ok(value) => {
                    self.tracker.on_success();
                    return Ok(value);
                }
                Err(err) => err,
            };

            let class = classify(&err);
            warn!(
                label = %self.label,
                attempt,
                kind = class.as_str(),
                error = %err,
                "translate attempt failed"
            );
            if class == ErrorClass::Permanent {
                return Err(err);
            }

            if let Some(callback) = on_failure.as_deref_mut() {
                match callback() {
                    Ok(false) => {
                        warn!(
                            label = %self.label,
                            attempt,
                            "no fallback resources left; giving up"
                        );
                        return Err(err);
                    }
                    Ok(true) => {}
                    Err(callback_err) => {
                        warn!(
                            label = %self.label,
                            error = %callback_err,
                            "failure callback raised; continuing"
                        );
                    }
                }
            }

            let delay = self.delay_for(class, attempt, &err);
            debug!(
                label = %self.label,
                attempt,
                kind = class.as_str(),
                delay_ms = delay.as_millis() as u64,
                "retrying after backoff"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }

    fn delay_for(&mut self, class: ErrorClass, attempt: u64, err: &TranslateError) -> Duration {
        match class {
            ErrorClass::RateLimit => {
                let delay = self.tracker.delay_for_rate_limit();
                match err.retry_after() {
                    Some(retry_after) if retry_after > delay => retry_after,
                    _ => delay,
                }
            }
            ErrorClass::TransientFormat => self.policy.format_delay,
            ErrorClass::TransientOther | ErrorClass::Permanent => {
                self.policy.transient_backoff(attempt) + random_jitter(self.policy.jitter)
            }
        }
    }
}
