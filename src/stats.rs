//! Run statistics and inactivity tracking.
//!
//! One [`ActivityTracker`] is shared by reference between the scan loop and
//! every worker; outcomes are folded in under a single mutex.

use chrono::{DateTime, Local};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::fs_ops::TransferOutcome;

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStatistics {
    pub moved: u64,
    pub failed: u64,
    pub skipped: u64,
    pub bytes_moved: u64,
    pub transfer_time: Duration,
    pub last_move: Option<DateTime<Local>>,
}

impl RunStatistics {
    /// Average bytes per second over completed transfers.
    pub fn throughput(&self) -> Option<f64> {
        let secs = self.transfer_time.as_secs_f64();
        (self.moved > 0 && secs > 0.0).then(|| self.bytes_moved as f64 / secs)
    }
}

#[derive(Debug)]
struct Inner {
    stats: RunStatistics,
    last_move_at: Instant,
    inactivity_notified: bool,
}

#[derive(Debug)]
pub struct ActivityTracker {
    inner: Mutex<Inner>,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker {
    /// The idle clock starts now.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self {
            inner: Mutex::new(Inner {
                stats: RunStatistics::default(),
                last_move_at: start,
                inactivity_notified: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, outcome: &TransferOutcome) {
        self.record_at(outcome, Instant::now());
    }

    pub fn record_at(&self, outcome: &TransferOutcome, now: Instant) {
        let mut inner = self.lock();
        match outcome {
            TransferOutcome::Moved { bytes, duration, .. } => {
                inner.stats.moved += 1;
                inner.stats.bytes_moved += bytes;
                inner.stats.transfer_time += *duration;
                inner.stats.last_move = Some(Local::now());
                inner.last_move_at = now;
                inner.inactivity_notified = false;
            }
            TransferOutcome::Failed { .. } => inner.stats.failed += 1,
            TransferOutcome::Skipped { .. } => inner.stats.skipped += 1,
        }
    }

    pub fn snapshot(&self) -> RunStatistics {
        self.lock().stats.clone()
    }

    pub fn since_last_move(&self) -> Duration {
        self.lock().last_move_at.elapsed()
    }

    /// Idle time if it just crossed `threshold`. Fires once per idle window;
    /// the next successful move re-arms it.
    pub fn poll_inactivity(&self, threshold: Duration) -> Option<Duration> {
        self.poll_inactivity_at(Instant::now(), threshold)
    }

    pub fn poll_inactivity_at(&self, now: Instant, threshold: Duration) -> Option<Duration> {
        let mut inner = self.lock();
        let idle = now.saturating_duration_since(inner.last_move_at);
        if idle >= threshold && !inner.inactivity_notified {
            inner.inactivity_notified = true;
            Some(idle)
        } else {
            None
        }
    }
}
