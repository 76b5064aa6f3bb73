//! Write-completion detection.
//!
//! A file is Stable once its size has been observed unchanged at every sample
//! over the whole `wait` window. Sampling at a short interval (rather than a
//! before/after pair) rejects producers that write in bursts.

use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::shutdown::Shutdown;

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    Stable,
    /// Size changed during the window, or the probe was interrupted by shutdown.
    Growing,
    /// The file disappeared during the check. Skip it this cycle.
    Vanished,
}

#[derive(Debug, Clone, Copy)]
pub struct StabilityDetector {
    wait: Duration,
    sample_interval: Duration,
}

impl StabilityDetector {
    pub fn new(wait: Duration) -> Self {
        Self {
            wait,
            sample_interval: DEFAULT_SAMPLE_INTERVAL.min(wait),
        }
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Observe `path` for the configured window. Read-only.
    pub fn check(&self, path: &Path, shutdown: &Shutdown) -> Stability {
        self.check_all(&[path], shutdown)[0]
    }

    /// Observe every path over one shared window, sampling all of them at each
    /// tick. A cycle costs one `wait` no matter how many candidates it has.
    /// Results are in input order.
    pub fn check_all<P: AsRef<Path>>(&self, paths: &[P], shutdown: &Shutdown) -> Vec<Stability> {
        let mut verdicts: Vec<Option<Stability>> = vec![None; paths.len()];
        let mut baseline: Vec<u64> = vec![0; paths.len()];
        for (i, path) in paths.iter().enumerate() {
            match current_size(path.as_ref()) {
                Ok(size) => baseline[i] = size,
                Err(e) => verdicts[i] = Some(vanished(path.as_ref(), &e)),
            }
        }

        let deadline = Instant::now() + self.wait;
        let step = self.sample_interval.max(Duration::from_millis(1));

        while verdicts.iter().any(Option::is_none) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if shutdown.wait_timeout(step.min(deadline - now)) {
                for v in verdicts.iter_mut().filter(|v| v.is_none()) {
                    *v = Some(Stability::Growing);
                }
                break;
            }
            for (i, path) in paths.iter().enumerate() {
                if verdicts[i].is_some() {
                    continue;
                }
                let path = path.as_ref();
                match current_size(path) {
                    Ok(size) if size == baseline[i] => {}
                    Ok(size) => {
                        debug!(file = %path.display(), from = baseline[i], to = size, "still growing");
                        verdicts[i] = Some(Stability::Growing);
                    }
                    Err(e) => verdicts[i] = Some(vanished(path, &e)),
                }
            }
        }

        paths
            .iter()
            .zip(verdicts)
            .map(|(path, v)| {
                v.unwrap_or_else(|| {
                    trace!(file = %path.as_ref().display(), "stable");
                    Stability::Stable
                })
            })
            .collect()
    }
}

fn current_size(path: &Path) -> io::Result<u64> {
    fs::metadata(path).map(|m| m.len())
}

fn vanished(path: &Path, e: &io::Error) -> Stability {
    debug!(file = %path.display(), error = %e, "vanished during stability check");
    Stability::Vanished
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn detector(wait_ms: u64) -> StabilityDetector {
        StabilityDetector::new(Duration::from_millis(wait_ms)).with_sample_interval(Duration::from_millis(20))
    }

    #[test]
    fn unchanged_file_is_stable() {
        let td = tempfile::tempdir().unwrap();
        let p = td.path().join("a.rhd");
        fs::write(&p, b"done").unwrap();
        assert_eq!(detector(150).check(&p, &Shutdown::new()), Stability::Stable);
    }

    #[test]
    fn empty_file_is_stable() {
        let td = tempfile::tempdir().unwrap();
        let p = td.path().join("empty.rhd");
        fs::File::create(&p).unwrap();
        assert_eq!(detector(100).check(&p, &Shutdown::new()), Stability::Stable);
    }

    #[test]
    fn growing_file_is_rejected() {
        let td = tempfile::tempdir().unwrap();
        let p = td.path().join("live.rhd");
        fs::write(&p, b"").unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let writer = {
            let (p, stop) = (p.clone(), stop.clone());
            thread::spawn(move || {
                let mut f = OpenOptions::new().append(true).open(&p).unwrap();
                while !stop.load(Ordering::SeqCst) {
                    f.write_all(b"0123456789").unwrap();
                    f.flush().unwrap();
                    thread::sleep(Duration::from_millis(5));
                }
            })
        };

        let result = detector(500).check(&p, &Shutdown::new());
        stop.store(true, Ordering::SeqCst);
        writer.join().unwrap();
        assert_eq!(result, Stability::Growing);
    }

    #[test]
    fn missing_file_is_vanished() {
        let td = tempfile::tempdir().unwrap();
        assert_eq!(
            detector(50).check(&td.path().join("nope"), &Shutdown::new()),
            Stability::Vanished
        );
    }

    #[test]
    fn deleted_mid_check_is_vanished() {
        let td = tempfile::tempdir().unwrap();
        let p = td.path().join("a.rhd");
        fs::write(&p, b"x").unwrap();
        let remover = {
            let p = p.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(40));
                fs::remove_file(p).unwrap();
            })
        };
        let result = detector(400).check(&p, &Shutdown::new());
        remover.join().unwrap();
        assert_eq!(result, Stability::Vanished);
    }

    #[test]
    fn shutdown_interrupts_probe() {
        let td = tempfile::tempdir().unwrap();
        let p = td.path().join("a.rhd");
        fs::write(&p, b"x").unwrap();
        let shutdown = Shutdown::new();
        shutdown.request();
        let started = Instant::now();
        assert_eq!(detector(5_000).check(&p, &shutdown), Stability::Growing);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn zero_wait_is_immediately_stable() {
        let td = tempfile::tempdir().unwrap();
        let p = td.path().join("a.rhd");
        fs::write(&p, b"x").unwrap();
        assert_eq!(
            StabilityDetector::new(Duration::ZERO).check(&p, &Shutdown::new()),
            Stability::Stable
        );
    }

    #[test]
    fn batch_shares_one_window() {
        let td = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for i in 0..16 {
            let p = td.path().join(format!("f{i}.rhd"));
            fs::write(&p, b"x").unwrap();
            paths.push(p);
        }
        paths.push(td.path().join("missing.rhd"));

        let det = detector(200);
        assert_eq!(det.wait(), Duration::from_millis(200));
        let started = Instant::now();
        let results = det.check_all(&paths[..], &Shutdown::new());
        let elapsed = started.elapsed();

        assert_eq!(results.len(), 17);
        assert!(results[..16].iter().all(|s| *s == Stability::Stable));
        assert_eq!(results[16], Stability::Vanished);
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(1500), "took {elapsed:?}");
    }

    #[test]
    fn batch_flags_only_the_growing_file() {
        let td = tempfile::tempdir().unwrap();
        let quiet = td.path().join("quiet.rhd");
        let live = td.path().join("live.rhd");
        fs::write(&quiet, b"done").unwrap();
        fs::write(&live, b"").unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let writer = {
            let (p, stop) = (live.clone(), stop.clone());
            thread::spawn(move || {
                let mut f = OpenOptions::new().append(true).open(&p).unwrap();
                while !stop.load(Ordering::SeqCst) {
                    f.write_all(b"0123456789").unwrap();
                    f.flush().unwrap();
                    thread::sleep(Duration::from_millis(5));
                }
            })
        };

        let results = detector(300).check_all(&[&quiet, &live], &Shutdown::new());
        stop.store(true, Ordering::SeqCst);
        writer.join().unwrap();
        assert_eq!(results, vec![Stability::Stable, Stability::Growing]);
    }
}
