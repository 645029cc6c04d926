//! Page-level retry policy and the explicit fetch state machine.
//!
//! Retrying is modeled as data, not control flow: a page moves through
//! `Fetching → Retrying(attempt) → … → Failed`, with the attempt count and
//! next delay as explicit fields. The whole machine is testable without a
//! network.

use std::time::Duration;

use civhub_common::Config;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Fraction of the backoff added/subtracted as random jitter (0.0-1.0).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            ..Self::default()
        }
    }

    /// Exponential backoff for the given attempt (1-based), capped and
    /// jittered.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.initial_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32 - 1);
        let capped = exp.min(self.max_backoff.as_secs_f64());

        let jitter_range = capped * self.jitter_factor;
        let jittered = if jitter_range > 0.0 {
            capped + rand::random_range(-jitter_range..jitter_range)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered.max(0.0))
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// State of one page fetch within a sync run.
#[derive(Debug, Clone, PartialEq)]
pub enum PageFetch {
    Fetching { attempt: u32 },
    Retrying { attempt: u32, delay: Duration },
    Failed { attempts: u32 },
}

impl PageFetch {
    pub fn start() -> Self {
        PageFetch::Fetching { attempt: 1 }
    }

    /// Advance after a failed attempt. A non-transient error or an exhausted
    /// retry budget is terminal; otherwise the machine waits out the backoff
    /// and fetches again.
    pub fn after_failure(self, policy: &RetryPolicy, transient: bool) -> Self {
        let attempt = match self {
            PageFetch::Fetching { attempt } | PageFetch::Retrying { attempt, .. } => attempt,
            PageFetch::Failed { .. } => return self,
        };

        if transient && policy.should_retry(attempt) {
            PageFetch::Retrying {
                attempt: attempt + 1,
                delay: policy.backoff(attempt),
            }
        } else {
            PageFetch::Failed { attempts: attempt }
        }
    }

    /// The delay to sleep before the next attempt, if any.
    pub fn delay(&self) -> Option<Duration> {
        match self {
            PageFetch::Retrying { delay, .. } => Some(*delay),
            _ => None,
        }
    }
}
