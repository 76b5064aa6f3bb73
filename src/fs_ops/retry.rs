//! Per-transfer retry state machine.
//!
//! ```text
//! Attempting(1) --fail--> Waiting{next: 2, delay} --elapsed--> Attempting(2) ...
//!      |                                                            |
//!      +--ok--> Succeeded{attempts}          fail at MAX_ATTEMPTS --+--> Exhausted{attempts}
//! ```
//!
//! The machine only decides; sleeping and doing I/O is the caller's job, which
//! keeps the attempt count and the delay schedule testable without a clock.

use std::time::Duration;

use crate::config::Backoff;

/// Attempts per dispatch of a file. Fixed, not configurable.
pub const MAX_ATTEMPTS: u32 = 5;

/// Exponential backoff: `base * 2^(n-1)` after the n-th failed attempt, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self { base_delay, max_delay }
    }

    /// Delay to wait after attempt `failed_attempt` (1-based) failed.
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exp = failed_attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn start(&self) -> RetryState {
        RetryState::Attempting(1)
    }
}

impl From<&Backoff> for RetryPolicy {
    fn from(b: &Backoff) -> Self {
        Self::new(b.base_delay, b.max_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Running attempt number n (1-based).
    Attempting(u32),
    /// Backing off before attempt `next`.
    Waiting { next: u32, delay: Duration },
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryEvent {
    AttemptSucceeded,
    AttemptFailed { retryable: bool },
    DelayElapsed,
}

impl RetryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RetryState::Succeeded { .. } | RetryState::Exhausted { .. })
    }

    /// Apply `event`. Events that make no sense for the current state leave it unchanged.
    pub fn advance(self, event: RetryEvent, policy: &RetryPolicy) -> RetryState {
        match (self, event) {
            (RetryState::Attempting(n), RetryEvent::AttemptSucceeded) => RetryState::Succeeded { attempts: n },
            (RetryState::Attempting(n), RetryEvent::AttemptFailed { retryable }) => {
                if retryable && n < MAX_ATTEMPTS {
                    RetryState::Waiting {
                        next: n + 1,
                        delay: policy.delay_after(n),
                    }
                } else {
                    RetryState::Exhausted { attempts: n }
                }
            }
            (RetryState::Waiting { next, .. }, RetryEvent::DelayElapsed) => RetryState::Attempting(next),
            (state, _) => state,
        }
    }
}
