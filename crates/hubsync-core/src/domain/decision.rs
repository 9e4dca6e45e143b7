//! Decision model: what to do after a step attempt failed.
//!
//! The Decider is a pure function of the step's log entry (how many times it
//! already failed) and the failure observation. The orchestrator executes the
//! decision; the decider never touches storage.

use std::time::Duration;

use super::errors::{ErrorKind, FailureObservation};
use super::retry::RetryPolicy;
use super::workflow::StepLogEntry;

/// Fallback wait when a rate-limit error carries no usable hint.
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_millis(60_000);

/// The next action for a failed step.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Re-run the same step after `delay`.
    Retry { delay: Duration, reason: String },

    /// Give up; the workflow fails with the observation's message.
    MarkFailed { reason: String },
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Retry { .. } => "schedule_retry",
            Decision::MarkFailed { .. } => "mark_failed",
        }
    }
}

/// Trait for deciding the next action after a failed attempt.
///
/// `entry` already counts the attempt being decided on.
pub trait Decider: Send + Sync {
    fn decide(&self, entry: &StepLogEntry, failure: &FailureObservation) -> Decision;
}

/// Default decider.
///
/// - `Auth` / `Permanent`: fail immediately
/// - `Transient` / `Malformed`: exponential backoff until `max_attempts`
/// - `RateLimited`: wait exactly what the server asked for; these waits have
///   their own, much larger cap and do not eat into `max_attempts`
#[derive(Debug, Clone)]
pub struct DefaultDecider {
    retry_policy: RetryPolicy,
    max_attempts: u32,
    max_rate_limit_waits: u32,
}

impl DefaultDecider {
    pub fn new(retry_policy: RetryPolicy, max_attempts: u32, max_rate_limit_waits: u32) -> Self {
        Self {
            retry_policy,
            max_attempts,
            max_rate_limit_waits,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for DefaultDecider {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), 5, 50)
    }
}

impl Decider for DefaultDecider {
    fn decide(&self, entry: &StepLogEntry, failure: &FailureObservation) -> Decision {
        match failure.kind {
            ErrorKind::Auth | ErrorKind::Permanent => Decision::MarkFailed {
                reason: format!("{:?} error is not retryable", failure.kind),
            },
            ErrorKind::RateLimited => {
                if entry.rate_limit_waits > self.max_rate_limit_waits {
                    return Decision::MarkFailed {
                        reason: format!(
                            "Rate limit waits exhausted: {}/{}",
                            entry.rate_limit_waits, self.max_rate_limit_waits
                        ),
                    };
                }
                let delay = failure.retry_after.unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
                Decision::Retry {
                    delay,
                    reason: format!("Rate limited, waiting {:?} as instructed", delay),
                }
            }
            ErrorKind::Transient | ErrorKind::Malformed => {
                if entry.attempts >= self.max_attempts {
                    Decision::MarkFailed {
                        reason: format!(
                            "Max attempts reached: {}/{}",
                            entry.attempts, self.max_attempts
                        ),
                    }
                } else {
                    let delay = self.retry_policy.next_delay(entry.attempts);
                    Decision::Retry {
                        delay,
                        reason: format!(
                            "Retry attempt {}/{} after {:?}",
                            entry.attempts + 1,
                            self.max_attempts,
                            delay
                        ),
                    }
                }
            }
        }
    }
}
