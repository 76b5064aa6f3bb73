//! Bounded transfer pool.
//!
//! A dedicated rayon pool with exactly `max_workers` threads: jobs beyond that
//! queue inside rayon until a thread frees up, so the concurrency cap is a
//! property of the pool rather than a counter someone has to respect.
//! `wait_idle()` blocks until every submitted job has finished (graceful drain).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use tracing::{error, trace};

use crate::errors::MoverError;

#[derive(Debug, Default)]
struct Counters {
    pending: Mutex<usize>,
    idle: Condvar,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Counters {
    fn lock_pending(&self) -> std::sync::MutexGuard<'_, usize> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Decrements the counters when a job ends, including by panic.
struct JobGuard(Arc<Counters>);

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
        let mut pending = self.0.lock_pending();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.0.idle.notify_all();
        }
    }
}

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    max_workers: usize,
    counters: Arc<Counters>,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Result<Self, MoverError> {
        if max_workers == 0 {
            return Err(MoverError::config("max_workers must be at least 1"));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .thread_name(|i| format!("mover-worker-{i}"))
            .panic_handler(|_| error!("transfer worker panicked"))
            .build()
            .map_err(|e| MoverError::config(format!("cannot start worker pool: {e}")))?;
        Ok(Self {
            pool,
            max_workers,
            counters: Arc::new(Counters::default()),
        })
    }

    /// Queue `job`. Returns immediately; the job runs when a slot is free.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.counters.lock_pending() += 1;
        let counters = Arc::clone(&self.counters);
        self.pool.spawn(move || {
            let now = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
            counters.peak.fetch_max(now, Ordering::SeqCst);
            let _guard = JobGuard(counters);
            trace!(active = now, "worker slot taken");
            job();
        });
    }

    /// Block until every submitted job has completed.
    pub fn wait_idle(&self) {
        let mut pending = self.counters.lock_pending();
        while *pending > 0 {
            pending = self
                .counters
                .idle
                .wait(pending)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Jobs queued or running.
    pub fn pending(&self) -> usize {
        *self.counters.lock_pending()
    }

    pub fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Highest number of jobs observed running at once.
    pub fn peak_active(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn zero_workers_rejected() {
        assert!(WorkerPool::new(0).is_err());
    }

    #[test]
    fn burst_never_exceeds_cap() {
        let pool = WorkerPool::new(3).unwrap();
        assert_eq!(pool.max_workers(), 3);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..12 {
            let done = done.clone();
            pool.submit(move || {
                thread::sleep(Duration::from_millis(20));
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.wait_idle();
        assert_eq!(done.load(Ordering::SeqCst), 12);
        assert!(pool.peak_active() <= 3);
        assert_eq!(pool.pending(), 0);
        assert_eq!(pool.active(), 0);
    }

    #[test]
    fn panicking_job_still_drains() {
        let pool = WorkerPool::new(1).unwrap();
        pool.submit(|| panic!("boom"));
        pool.submit(|| {});
        pool.wait_idle();
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn wait_idle_on_empty_pool_returns() {
        WorkerPool::new(2).unwrap().wait_idle();
    }
}
