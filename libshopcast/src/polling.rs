//! Bounded poll-until-ready loop
//!
//! Used by the Instagram adapter to wait on media containers. The check runs
//! first and the loop sleeps only between checks, so `max_attempts` is the
//! number of checks performed.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

/// How often and how long to poll
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    /// Multiplier applied to the interval after each pending check
    pub backoff: f64,
    pub max_interval: Duration,
}

impl PollPolicy {
    /// Same delay between every check
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            interval,
            backoff: 1.0,
            max_interval: interval,
        }
    }

    pub fn with_backoff(mut self, backoff: f64, max_interval: Duration) -> Self {
        self.backoff = backoff;
        self.max_interval = max_interval;
        self
    }

    fn next_interval(&self, current: Duration) -> Duration {
        if self.backoff <= 1.0 {
            return current;
        }
        current.mul_f64(self.backoff).min(self.max_interval)
    }
}

impl Default for PollPolicy {
    /// One check per second, thirty checks
    fn default() -> Self {
        Self::fixed(Duration::from_secs(1), 30)
    }
}

/// What one check observed
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus<T> {
    Ready(T),
    Pending,
    /// Terminal failure reported by the polled resource
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollError<E> {
    TimedOut { attempts: u32 },
    Failed(String),
    /// The check itself errored (e.g. the request failed)
    Check(E),
}

/// Run `check` until it reports ready, fails, or the attempts run out
///
/// `check` receives the 1-based attempt number.
pub async fn poll_until<T, E, F, Fut>(policy: &PollPolicy, mut check: F) -> Result<T, PollError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PollStatus<T>, E>>,
{
    let mut interval = policy.interval;

    for attempt in 1..=policy.max_attempts {
        match check(attempt).await.map_err(PollError::Check)? {
            PollStatus::Ready(value) => return Ok(value),
            PollStatus::Failed(reason) => return Err(PollError::Failed(reason)),
            PollStatus::Pending => {
                debug!(attempt, max_attempts = policy.max_attempts, "Still pending");
                if attempt < policy.max_attempts {
                    sleep(interval).await;
                    interval = policy.next_interval(interval);
                }
            }
        }
    }

    Err(PollError::TimedOut {
        attempts: policy.max_attempts,
    })
}
