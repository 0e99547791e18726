//! Poll-until-ready combinator.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::trace;

use crate::error::PollTimeout;

/// Failure of a single probe attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ProbeFailure(pub String);

impl ProbeFailure {
    /// Creates a probe failure from anything printable.
    pub fn new(reason: impl fmt::Display) -> Self {
        Self(reason.to_string())
    }
}

/// Timing of a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOptions {
    /// Give up once this much time has passed without becoming ready.
    pub timeout: Duration,

    /// Pause between attempts.
    pub interval: Duration,

    /// Consecutive successful attempts needed.
    pub required_successes: u32,
}

impl PollOptions {
    /// Creates options requiring a single success.
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            required_successes: 1,
        }
    }

    /// Sets the number of consecutive successes required.
    pub fn required_successes(mut self, count: u32) -> Self {
        self.required_successes = count.max(1);
        self
    }
}

/// Repeatedly runs `attempt` until it succeeds `required_successes` times in
/// a row.
///
/// A failed attempt resets the streak. Attempts are separated by one
/// `interval`. Once `timeout` has elapsed without reaching the streak, the
/// wait fails; with instantaneous attempts that happens between `timeout`
/// and `timeout + interval`. Returns the number of attempts made.
pub async fn poll_until<F, Fut>(options: PollOptions, mut attempt: F) -> Result<u32, PollTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), ProbeFailure>>,
{
    let started = Instant::now();
    let required = options.required_successes.max(1);
    let mut streak = 0u32;
    let mut attempts = 0u32;
    let mut last_error = None;

    loop {
        attempts += 1;
        match attempt().await {
            Ok(()) => {
                streak += 1;
                trace!(attempts, streak, required, "Probe succeeded");
                if streak >= required {
                    return Ok(attempts);
                }
            }
            Err(e) => {
                trace!(attempts, error = %e, "Probe failed");
                streak = 0;
                last_error = Some(e.0);
            }
        }

        let elapsed = started.elapsed();
        if elapsed >= options.timeout {
            return Err(PollTimeout {
                elapsed,
                attempts,
                last_error,
            });
        }

        tokio::time::sleep(options.interval).await;
    }
}
