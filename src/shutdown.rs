//! Cooperative shutdown coordination.
//! A cloneable handle set by the ctrlc handler (SIGINT/SIGTERM) and polled by the
//! scan loop, the stability probe and the retry backoff.
//!
//! Notes:
//! - `request()` is idempotent and safe to call from the signal-handler thread.
//! - `wait_timeout()` is the only way long-running code sleeps, so every
//!   suspension point wakes as soon as a stop is requested.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct State {
    requested: Mutex<bool>,
    cvar: Condvar,
}

/// Shared stop flag with an interruptible sleep.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    state: Arc<State>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a cooperative shutdown (idempotent).
    pub fn request(&self) {
        let mut flag = self
            .state
            .requested
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *flag = true;
        self.state.cvar.notify_all();
    }

    /// Check whether a shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        *self
            .state
            .requested
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sleep for up to `dur`. Returns true if a shutdown was requested
    /// before or during the wait.
    pub fn wait_timeout(&self, dur: Duration) -> bool {
        let deadline = Instant::now() + dur;
        let mut flag = self
            .state
            .requested
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while !*flag {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            flag = match self.state.cvar.wait_timeout(flag, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }
}
