//! Retry-until-ready driver shared by every polling loop.
//!
//! A [`Probe`] is asked once per interval whether its result is available.
//! It may answer `Ready`, `NotReady`, or `Backoff(new_interval)` when the
//! counterparty asked us to slow down. Errors from the probe end the loop
//! at once. Elapsed time accumulates across interval changes and the loop
//! fails with `Timeout` once it reaches the deadline.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::{format_elapsed, Clock};
use crate::error::{PairError, PairResult};

/// Smallest wait between attempts, so a zero interval cannot spin.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Deadline for anything that waits on the operator.
pub const OPERATOR_DEADLINE: Duration = Duration::from_secs(15 * 60);

/// What one probe attempt found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    Ready(T),
    NotReady,
    /// Not ready, and wait this long from now on.
    Backoff(Duration),
}

/// Interval between attempts and total time allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub deadline: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }
}

/// Passed to each attempt for logging.
#[derive(Debug, Clone, Copy)]
pub struct PollTick {
    pub attempt: u32,
    pub elapsed: Duration,
}

impl PollTick {
    pub fn stamp(&self) -> String {
        format_elapsed(self.elapsed)
    }
}

#[async_trait]
pub trait Probe: Send {
    type Output: Send;

    async fn probe(&mut self, tick: PollTick) -> PairResult<Attempt<Self::Output>>;
}

pub struct BoundedPoller<'a> {
    clock: &'a dyn Clock,
    policy: PollPolicy,
    waiting_for: String,
}

impl<'a> BoundedPoller<'a> {
    pub fn new(clock: &'a dyn Clock, policy: PollPolicy, waiting_for: impl Into<String>) -> Self {
        Self {
            clock,
            policy,
            waiting_for: waiting_for.into(),
        }
    }

    pub async fn run<P: Probe>(&self, probe: &mut P) -> PairResult<P::Output> {
        let start = self.clock.elapsed();
        let mut interval = self.policy.interval.max(MIN_INTERVAL);
        let mut attempt = 0u32;

        info!(
            waiting_for = %self.waiting_for,
            interval_ms = interval.as_millis() as u64,
            "Polling interval {:.1}+ s",
            interval.as_secs_f64()
        );

        loop {
            self.clock.sleep(interval).await;
            attempt += 1;

            let tick = PollTick {
                attempt,
                elapsed: self.clock.elapsed().saturating_sub(start),
            };
            debug!(waiting_for = %self.waiting_for, attempt, at = %tick.stamp(), "Polling");

            match probe.probe(tick).await? {
                Attempt::Ready(output) => {
                    debug!(waiting_for = %self.waiting_for, attempt, "Poll succeeded");
                    return Ok(output);
                }
                Attempt::NotReady => {}
                Attempt::Backoff(next) => {
                    let next = next.max(MIN_INTERVAL);
                    if next != interval {
                        info!(
                            waiting_for = %self.waiting_for,
                            "Polling interval now {:.1}+ s",
                            next.as_secs_f64()
                        );
                    }
                    interval = next;
                }
            }

            let elapsed = self.clock.elapsed().saturating_sub(start);
            if elapsed >= self.policy.deadline {
                warn!(waiting_for = %self.waiting_for, attempts = attempt, "Polling deadline reached");
                return Err(PairError::Timeout {
                    waiting_for: self.waiting_for.clone(),
                    elapsed,
                });
            }
        }
    }
}
