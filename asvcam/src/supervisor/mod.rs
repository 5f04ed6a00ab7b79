//! In-process restart supervision with quadratic backoff.
//!
//! A session (typically a whole capture run) is retried after failure until
//! it succeeds, the operator stops it, or the attempt budget runs out. The
//! delay before restart `n` is `base_delay · n²`:
//!
//! ```text
//! attempt:  1    2    3    4     5    ...  25
//! delay:    1s   4s   9s   16s   25s  ...  625s   (base_delay = 1s)
//! ```
//!
//! With the defaults the budget spans roughly an hour and a half, which is
//! enough to ride out slow boot of the cameras or late-mounted storage.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Default maximum number of failed sessions before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 25;

/// Default base delay of the quadratic backoff.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// How failed sessions are restarted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Failures tolerated before the supervisor gives up.
    pub max_attempts: u32,
    /// Multiplied by the square of the attempt number.
    pub base_delay: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RestartPolicy {
    /// Creates a restart policy.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Failures tolerated before giving up (0 means a single try)
    /// * `base_delay` - Delay unit of the quadratic backoff
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before restarting after failure number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = attempt.saturating_mul(attempt);
        self.base_delay.saturating_mul(factor)
    }

    /// Sum of every backoff delay the policy can impose.
    pub fn total_budget(&self) -> Duration {
        (1..self.max_attempts.max(1)).fold(Duration::ZERO, |acc, n| {
            acc.saturating_add(self.delay_for_attempt(n))
        })
    }
}

/// How supervision ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorOutcome<T> {
    /// A session returned `Ok`.
    Completed { value: T, failures: u32 },
    /// Cancellation was requested before a session could complete.
    Cancelled { failures: u32 },
    /// Every attempt failed.
    Exhausted { failures: u32, last_error: String },
}

impl<T> SupervisorOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, SupervisorOutcome::Completed { .. })
    }
}

/// Run `session` until it succeeds, `cancel` fires, or the policy is exhausted.
///
/// The session receives the zero-based attempt number. It is expected to
/// observe `cancel` itself and return once it fires; the supervisor only
/// checks the token between attempts and while backing off.
pub async fn supervise<T, E, F, Fut>(
    policy: &RestartPolicy,
    cancel: &CancellationToken,
    mut session: F,
) -> SupervisorOutcome<T>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut failures = 0u32;

    loop {
        if cancel.is_cancelled() {
            return SupervisorOutcome::Cancelled { failures };
        }

        let error = match session(failures).await {
            Ok(value) => {
                if failures > 0 {
                    info!(failures, "Session completed after restarts");
                }
                return SupervisorOutcome::Completed { value, failures };
            }
            Err(e) => e.to_string(),
        };

        failures += 1;
        if failures >= policy.max_attempts.max(1) {
            error!(failures, error = %error, "Session failed, restart budget exhausted");
            return SupervisorOutcome::Exhausted {
                failures,
                last_error: error,
            };
        }

        let delay = policy.delay_for_attempt(failures);
        warn!(
            attempt = failures,
            delay_secs = delay.as_secs_f64(),
            error = %error,
            "Session failed, restarting"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return SupervisorOutcome::Cancelled { failures },
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
