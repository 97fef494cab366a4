//! Step-driven polling.
//!
//! Protocol components implement [`Poller`] as a single status probe; [`drive`]
//! owns the clock. It applies a [`PollSchedule`], sleeps between probes and
//! stops early when the cancellation token fires.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use easyacme_common::{EasyAcmeError, EasyAcmeResult};

/// Outcome of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll<T> {
    Ready(T),
    /// Not terminal yet; `status` is the last remote status observed
    Pending { status: String },
}

/// One step of a remote state machine.
///
/// Terminal failures are returned as errors and end the loop.
#[async_trait]
pub trait Poller: Send {
    type Output: Send;

    /// Name used in timeout and cancellation errors
    fn operation(&self) -> &str;

    async fn poll(&mut self) -> EasyAcmeResult<Poll<Self::Output>>;
}

/// Interval and budget applied between probes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollSchedule {
    /// Doubling interval capped at `max_interval`, total time capped at `max_elapsed`
    Exponential {
        initial: Duration,
        max_interval: Duration,
        max_elapsed: Duration,
    },
    /// Constant interval within a window
    Fixed { interval: Duration, window: Duration },
}

impl PollSchedule {
    /// Challenge policy: start at the CA's Retry-After (or `default`), cap
    /// the interval at 10x and the elapsed time at 100x that start.
    pub fn challenge(retry_after: Option<Duration>, default: Duration) -> Self {
        let initial = retry_after
            .filter(|d| !d.is_zero())
            .unwrap_or(default)
            .max(Duration::from_millis(1));
        PollSchedule::Exponential {
            initial,
            max_interval: initial * 10,
            max_elapsed: initial * 100,
        }
    }

    /// Finalize policy: `attempts` evenly spaced probes within `window`
    pub fn finalize(window: Duration, attempts: u32) -> Self {
        let interval = (window / attempts.max(1)).max(Duration::from_millis(1));
        PollSchedule::Fixed { interval, window }
    }

    fn first_interval(&self) -> Duration {
        match self {
            PollSchedule::Exponential { initial, .. } => *initial,
            PollSchedule::Fixed { interval, .. } => *interval,
        }
    }

    fn next_interval(&self, current: Duration) -> Duration {
        match self {
            PollSchedule::Exponential { max_interval, .. } => (current * 2).min(*max_interval),
            PollSchedule::Fixed { interval, .. } => *interval,
        }
    }

    fn budget(&self) -> Duration {
        match self {
            PollSchedule::Exponential { max_elapsed, .. } => *max_elapsed,
            PollSchedule::Fixed { window, .. } => *window,
        }
    }
}

/// Run `poller` until it is ready, fails, runs out of budget or is cancelled.
///
/// The first probe happens immediately. Sleeps never overshoot the budget.
pub async fn drive<P: Poller>(
    poller: &mut P,
    schedule: PollSchedule,
    cancel: Option<&CancellationToken>,
) -> EasyAcmeResult<P::Output> {
    let start = Instant::now();
    let deadline = start + schedule.budget();
    let mut interval = schedule.first_interval();
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(EasyAcmeError::cancelled(poller.operation()));
        }

        attempt += 1;
        let status = match poller.poll().await? {
            Poll::Ready(output) => {
                debug!(
                    operation = poller.operation(),
                    attempt,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Poll reached terminal state"
                );
                return Ok(output);
            }
            Poll::Pending { status } => status,
        };
        trace!(operation = poller.operation(), attempt, status = %status, "Still pending");

        let now = Instant::now();
        if now >= deadline {
            return Err(EasyAcmeError::timeout(
                poller.operation(),
                (now - start).as_millis() as u64,
                status,
            ));
        }

        let sleep = interval.min(deadline - now);
        match cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => {
                        return Err(EasyAcmeError::cancelled(poller.operation()));
                    }
                    _ = tokio::time::sleep(sleep) => {}
                }
            }
            None => tokio::time::sleep(sleep).await,
        }
        interval = schedule.next_interval(interval);
    }
}
