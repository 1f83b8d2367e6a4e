//! Token-bucket rate limiting for source adapters
//!
//! One limiter exists per configured source and is shared by every
//! worker fetching through that source in a run. Acquisition suspends
//! cooperatively until a token is available, bounded by a deadline.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use thiserror::Error;

/// Errors constructing a limiter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LimiterError {
    #[error("invalid quota: {calls} calls per {window:?} leaves no replenish interval")]
    InvalidQuota { calls: u32, window: Duration },
}

/// Errors acquiring a token
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquireError {
    #[error("deadline exceeded waiting for a rate-limit token")]
    DeadlineExceeded,
}

/// Shared token-bucket limiter for one source.
///
/// Configured as `calls` per `window` with full burst: the bucket starts
/// full and replenishes one token every `window / calls`. Generic over
/// the governor clock so tests can drive a fake clock instead of
/// sleeping through real windows.
pub struct SourceLimiter<C: Clock = DefaultClock> {
    limiter: RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<C::Instant>>,
    clock: C,
}

impl SourceLimiter<DefaultClock> {
    /// Create a limiter allowing `calls` per `window` against real time.
    pub fn new(calls: NonZeroU32, window: Duration) -> Result<Self, LimiterError> {
        let quota = Self::quota(calls, window)?;
        Ok(Self {
            limiter: RateLimiter::direct(quota),
            clock: DefaultClock::default(),
        })
    }
}

impl<C: Clock> SourceLimiter<C> {
    /// Create a limiter against a caller-supplied clock (tests).
    pub fn with_clock(calls: NonZeroU32, window: Duration, clock: C) -> Result<Self, LimiterError>
    where
        C: Clone,
    {
        let quota = Self::quota(calls, window)?;
        Ok(Self {
            limiter: RateLimiter::direct_with_clock(quota, &clock),
            clock,
        })
    }

    fn quota(calls: NonZeroU32, window: Duration) -> Result<Quota, LimiterError> {
        let replenish = window / calls.get();
        Quota::with_period(replenish)
            .map(|q| q.allow_burst(calls))
            .ok_or(LimiterError::InvalidQuota {
                calls: calls.get(),
                window,
            })
    }

    /// Take a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Suspend until a token is available, or fail once waiting would
    /// cross the deadline. `None` waits indefinitely.
    ///
    /// The token taken by the successful final `check` is consumed; the
    /// probing `check` calls that failed consumed nothing.
    pub async fn acquire(
        &self,
        deadline: Option<tokio::time::Instant>,
    ) -> Result<(), AcquireError> {
        loop {
            match self.limiter.check() {
                Ok(()) => return Ok(()),
                Err(not_until) => {
                    let wait = not_until
                        .wait_time_from(self.clock.now())
                        .max(Duration::from_millis(1));

                    if let Some(deadline) = deadline {
                        if tokio::time::Instant::now() + wait > deadline {
                            return Err(AcquireError::DeadlineExceeded);
                        }
                    }

                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}
