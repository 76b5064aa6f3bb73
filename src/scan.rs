//! Polling cycle: list, filter, probe, dispatch, sleep.
//!
//! ```text
//! Idle -> Scanning -> Dispatching -> Sleeping -> Scanning -> ... -> Stopped
//! ```
//!
//! The loop thread owns all cycle state. Workers only touch the shared
//! in-flight set, the [`ActivityTracker`] and the [`EventSink`].

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, trace, warn};

use crate::config::{Config, FileFilter};
use crate::errors::MoverError;
use crate::events::{Event, EventSink};
use crate::fs_ops::{TransferExecutor, TransferOutcome, TransferSettings, is_lock_marker};
use crate::fs_ops::lock::LOCK_SUFFIX;
use crate::pool::WorkerPool;
use crate::shutdown::Shutdown;
use crate::stability::{Stability, StabilityDetector};
use crate::stats::{ActivityTracker, RunStatistics};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Scanning,
    Dispatching,
    Sleeping,
    Stopped,
}

/// A file seen in this cycle's listing. Rebuilt every cycle.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub filename: OsString,
    pub size: u64,
    pub modified: SystemTime,
    /// When `size` was read.
    pub observed_at: Instant,
    pub matched_filter: bool,
}

/// What one Scanning/Dispatching pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub listed: usize,
    pub ignored: usize,
    pub locked: usize,
    pub in_flight: usize,
    pub probed: usize,
    pub growing: usize,
    pub vanished: usize,
    pub dispatched: usize,
}

type InFlight = Arc<Mutex<HashSet<OsString>>>;

/// Removes the name from the in-flight set when the worker finishes.
struct InFlightGuard {
    set: InFlight,
    name: OsString,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&self.name);
    }
}

pub struct ScanLoop {
    local_dir: PathBuf,
    remote_dir: PathBuf,
    filter: FileFilter,
    scan_interval: Duration,
    inactivity_threshold: Duration,
    health_interval: Duration,
    dry_run: bool,
    detector: StabilityDetector,
    executor: Arc<TransferExecutor>,
    pool: WorkerPool,
    tracker: Arc<ActivityTracker>,
    sink: Arc<dyn EventSink>,
    shutdown: Shutdown,
    in_flight: InFlight,
    simulated: HashSet<OsString>,
    unavailable: HashSet<PathBuf>,
    phase: Phase,
    last_health: Instant,
}

impl ScanLoop {
    pub fn new(cfg: &Config, sink: Arc<dyn EventSink>, shutdown: Shutdown) -> Result<Self, MoverError> {
        let executor = TransferExecutor::new(TransferSettings::from_config(cfg), shutdown.clone());
        Self::with_executor(cfg, executor, sink, shutdown)
    }

    /// Build around a prepared executor (e.g. one with a custom filesystem backend).
    pub fn with_executor(
        cfg: &Config,
        executor: TransferExecutor,
        sink: Arc<dyn EventSink>,
        shutdown: Shutdown,
    ) -> Result<Self, MoverError> {
        Ok(Self {
            local_dir: cfg.local_dir.clone(),
            remote_dir: cfg.remote_dir.clone(),
            filter: cfg.file_filter.clone(),
            scan_interval: cfg.scan_interval,
            inactivity_threshold: cfg.inactivity_threshold,
            health_interval: cfg.health_interval,
            dry_run: cfg.dry_run,
            detector: StabilityDetector::new(cfg.stability_wait),
            executor: Arc::new(executor),
            pool: WorkerPool::new(cfg.max_workers)?,
            tracker: Arc::new(ActivityTracker::new()),
            sink,
            shutdown,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            simulated: HashSet::new(),
            unavailable: HashSet::new(),
            phase: Phase::Idle,
            last_health: Instant::now(),
        })
    }

    pub fn with_detector(mut self, detector: StabilityDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn tracker(&self) -> Arc<ActivityTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    fn set_phase(&mut self, next: Phase) {
        if self.phase != next {
            trace!(from = ?self.phase, to = ?next, "scan phase");
            self.phase = next;
        }
    }

    /// Run until shutdown is requested, then drain and report.
    pub fn run(&mut self) -> RunStatistics {
        self.start();
        while !self.shutdown.is_requested() {
            self.scan_once();
            self.check_activity();
            self.set_phase(Phase::Sleeping);
            if self.shutdown.wait_timeout(self.scan_interval) {
                break;
            }
        }
        self.stop()
    }

    /// A single cycle followed by a full drain.
    pub fn run_once(&mut self) -> RunStatistics {
        self.start();
        self.scan_once();
        self.pool.wait_idle();
        self.check_activity();
        self.stop()
    }

    fn start(&mut self) {
        self.sink.emit(Event::Started {
            local_dir: self.local_dir.clone(),
            remote_dir: self.remote_dir.clone(),
        });
        for lock in self.stale_locks() {
            warn!(
                lock = %lock.display(),
                "lock marker present at startup; its file will not be moved until the marker is removed"
            );
        }
    }

    fn stop(&mut self) -> RunStatistics {
        info!(pending = self.pool.pending(), "stopping; waiting for in-flight transfers");
        self.pool.wait_idle();
        self.set_phase(Phase::Stopped);
        let stats = self.tracker.snapshot();
        self.sink.emit(Event::Stopped {
            total_moved: stats.moved,
            total_failed: stats.failed,
        });
        stats
    }

    /// Lock markers currently in the local directory.
    pub fn stale_locks(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.local_dir) else {
            return Vec::new();
        };
        let mut locks: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|e| is_lock_marker(&e.file_name().to_string_lossy()))
            .map(|e| e.path())
            .collect();
        locks.sort();
        locks
    }

    /// Scanning + Dispatching. Never blocks on transfers.
    pub fn scan_once(&mut self) -> ScanReport {
        self.set_phase(Phase::Scanning);
        let mut report = ScanReport::default();

        let remote_state = match fs::metadata(&self.remote_dir) {
            Ok(m) if m.is_dir() => Ok(()),
            Ok(_) => Err("not a directory".to_string()),
            Err(e) => Err(e.to_string()),
        };
        if !self.note_availability(self.remote_dir.clone(), remote_state) {
            return report;
        }

        let listing = self.list_candidates(&mut report);
        let candidates = match listing {
            Ok(c) => {
                self.note_availability(self.local_dir.clone(), Ok(()));
                c
            }
            Err(e) => {
                self.note_availability(self.local_dir.clone(), Err(e.to_string()));
                return report;
            }
        };
        if candidates.is_empty() {
            return report;
        }

        report.probed = candidates.len();
        let paths: Vec<&Path> = candidates.iter().map(|c| c.path.as_path()).collect();
        let verdicts = self.detector.check_all(&paths[..], &self.shutdown);
        let probed: Vec<(CandidateFile, Stability)> = candidates.into_iter().zip(verdicts).collect();

        if self.shutdown.is_requested() {
            return report;
        }

        self.set_phase(Phase::Dispatching);
        for (candidate, stability) in probed {
            match stability {
                Stability::Stable => {
                    self.dispatch(candidate);
                    report.dispatched += 1;
                }
                Stability::Growing => report.growing += 1,
                Stability::Vanished => report.vanished += 1,
            }
        }
        debug!(?report, "scan cycle");
        report
    }

    /// Filter the listing down to files worth probing, oldest first.
    fn list_candidates(&self, report: &mut ScanReport) -> io::Result<Vec<CandidateFile>> {
        let mut files = Vec::new();
        let mut locked: HashSet<OsString> = HashSet::new();
        for entry in fs::read_dir(&self.local_dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            let name = entry.file_name();
            if is_lock_marker(&name.to_string_lossy()) {
                if let Some(target) = lock_path_target(&entry.path()) {
                    locked.insert(target);
                }
                continue;
            }
            files.push(entry);
        }

        let in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner()).clone();
        let mut candidates = Vec::new();
        for entry in files {
            report.listed += 1;
            let name = entry.file_name();
            let lossy = name.to_string_lossy();
            let meta = match entry.metadata() {
                Ok(m) if m.is_file() => m,
                Ok(_) => {
                    trace!(file = %lossy, "not a regular file; ignored");
                    report.ignored += 1;
                    continue;
                }
                Err(e) => {
                    trace!(file = %lossy, error = %e, "cannot stat; ignored");
                    report.ignored += 1;
                    continue;
                }
            };
            if !self.filter.matches(&lossy) {
                trace!(file = %lossy, filter = %self.filter, "does not match filter");
                report.ignored += 1;
                continue;
            }
            if locked.contains(&name) {
                trace!(file = %lossy, "locked");
                report.locked += 1;
                continue;
            }
            if in_flight.contains(&name) || self.simulated.contains(&name) {
                trace!(file = %lossy, "already dispatched");
                report.in_flight += 1;
                continue;
            }
            candidates.push(CandidateFile {
                path: entry.path(),
                filename: name,
                size: meta.len(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                observed_at: Instant::now(),
                matched_filter: true,
            });
        }
        candidates.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.filename.cmp(&b.filename)));
        Ok(candidates)
    }

    fn dispatch(&mut self, candidate: CandidateFile) {
        let name = candidate.filename.clone();
        if self.dry_run {
            self.simulated.insert(name.clone());
        }
        self.in_flight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(name.clone());
        debug!(file = %candidate.path.display(), size = candidate.size, "dispatching");

        let executor = Arc::clone(&self.executor);
        let tracker = Arc::clone(&self.tracker);
        let sink = Arc::clone(&self.sink);
        let shutdown = self.shutdown.clone();
        let guard = InFlightGuard {
            set: Arc::clone(&self.in_flight),
            name,
        };
        self.pool.submit(move || {
            let _guard = guard;
            // Queued but not started when the stop arrived: leave it for the next run.
            if shutdown.is_requested() {
                debug!(file = %candidate.path.display(), "stop requested; not starting queued transfer");
                return;
            }
            let outcome = executor.execute(&candidate.path);
            tracker.record(&outcome);
            match outcome {
                TransferOutcome::Moved { filename, bytes, .. } => sink.emit(Event::FileMoved { filename, bytes }),
                TransferOutcome::Failed {
                    filename,
                    reason,
                    attempts,
                } => sink.emit(Event::FileFailed {
                    filename,
                    reason,
                    attempts,
                }),
                TransferOutcome::Skipped { filename, reason } => {
                    debug!(file = %filename, ?reason, "transfer skipped")
                }
            }
        });
    }

    /// Track outages so each one is reported once and its end is reported too.
    /// Returns whether `path` is usable.
    fn note_availability(&mut self, path: PathBuf, state: Result<(), String>) -> bool {
        match state {
            Ok(()) => {
                if self.unavailable.remove(&path) {
                    self.sink.emit(Event::DirectoryRestored { path });
                }
                true
            }
            Err(reason) => {
                if !self.unavailable.contains(&path) {
                    self.unavailable.insert(path.clone());
                    self.sink.emit(Event::DirectoryUnavailable { path, reason });
                }
                false
            }
        }
    }

    /// Inactivity warning and periodic health summary.
    pub fn check_activity(&mut self) {
        if let Some(idle) = self.tracker.poll_inactivity(self.inactivity_threshold) {
            self.sink.emit(Event::InactivityWarning {
                minutes_since_last_move: idle.as_secs_f64() / 60.0,
            });
        }
        if self.last_health.elapsed() >= self.health_interval {
            self.last_health = Instant::now();
            let stats = self.tracker.snapshot();
            info!(
                moved = stats.moved,
                failed = stats.failed,
                bytes = stats.bytes_moved,
                mib_per_sec = stats.throughput().map(|b| b / (1024.0 * 1024.0)).unwrap_or(0.0),
                "health"
            );
            self.sink.emit(Event::HealthSummary {
                moved_count: stats.moved,
                failed_count: stats.failed,
            });
        }
    }
}

/// `a.rhd.lock` -> `a.rhd`.
fn lock_path_target(lock: &Path) -> Option<OsString> {
    let name = lock.file_name()?.to_string_lossy().into_owned();
    name.strip_suffix(LOCK_SUFFIX).map(OsString::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;

    fn setup() -> (tempfile::TempDir, Config) {
        let td = tempfile::tempdir().unwrap();
        let local = td.path().join("local");
        let remote = td.path().join("remote");
        fs::create_dir_all(&local).unwrap();
        fs::create_dir_all(&remote).unwrap();
        let mut cfg = Config::new(&local, &remote);
        cfg.stability_wait = Duration::from_millis(50);
        cfg.scan_interval = Duration::from_millis(20);
        (td, cfg)
    }

    #[test]
    fn empty_directory_is_a_noop_cycle() {
        let (_td, cfg) = setup();
        let sink = Arc::new(MemorySink::new());
        let mut scan = ScanLoop::new(&cfg, sink.clone(), Shutdown::new()).unwrap();
        let report = scan.scan_once();
        assert_eq!(report, ScanReport::default());
        assert!(sink.events().is_empty());
    }

    #[test]
    fn filter_locks_and_dirs_are_excluded() {
        let (_td, mut cfg) = setup();
        cfg.file_filter = FileFilter::parse(".rhd").unwrap();
        fs::write(cfg.local_dir.join("notes.txt"), b"x").unwrap();
        fs::write(cfg.local_dir.join("held.rhd"), b"x").unwrap();
        fs::write(cfg.local_dir.join("held.rhd.lock"), b"").unwrap();
        fs::create_dir(cfg.local_dir.join("sub.rhd")).unwrap();

        let sink = Arc::new(MemorySink::new());
        let mut scan = ScanLoop::new(&cfg, sink, Shutdown::new()).unwrap();
        let report = scan.scan_once();
        assert_eq!(report.listed, 3);
        assert_eq!(report.ignored, 2);
        assert_eq!(report.locked, 1);
        assert_eq!(report.dispatched, 0);
        assert_eq!(scan.stale_locks(), vec![cfg.local_dir.join("held.rhd.lock")]);
    }

    #[test]
    fn candidates_are_oldest_first() {
        let (_td, cfg) = setup();
        for (name, secs) in [("c.rhd", 300), ("a.rhd", 100), ("b.rhd", 100)] {
            let p = cfg.local_dir.join(name);
            fs::write(&p, b"x").unwrap();
            filetime::set_file_mtime(&p, filetime::FileTime::from_unix_time(1_600_000_000 + secs, 0)).unwrap();
        }
        let scan = ScanLoop::new(&cfg, Arc::new(MemorySink::new()), Shutdown::new()).unwrap();
        let mut report = ScanReport::default();
        let names: Vec<OsString> = scan
            .list_candidates(&mut report)
            .unwrap()
            .into_iter()
            .map(|c| c.filename)
            .collect();
        assert_eq!(names, vec!["a.rhd", "b.rhd", "c.rhd"]);
    }

    #[test]
    fn missing_local_dir_reports_once_then_restores() {
        let (_td, cfg) = setup();
        let sink = Arc::new(MemorySink::new());
        let mut scan = ScanLoop::new(&cfg, sink.clone(), Shutdown::new()).unwrap();

        fs::remove_dir(&cfg.local_dir).unwrap();
        scan.scan_once();
        scan.scan_once();
        assert_eq!(sink.count("directory_unavailable"), 1);

        fs::create_dir(&cfg.local_dir).unwrap();
        scan.scan_once();
        assert_eq!(sink.count("directory_restored"), 1);
    }

    #[test]
    fn run_once_moves_and_reports() {
        let (_td, cfg) = setup();
        fs::write(cfg.local_dir.join("a.rhd"), b"payload").unwrap();
        let sink = Arc::new(MemorySink::new());
        let mut scan = ScanLoop::new(&cfg, sink.clone(), Shutdown::new()).unwrap();

        let stats = scan.run_once();
        assert_eq!(stats.moved, 1);
        assert_eq!(scan.phase(), Phase::Stopped);
        assert!(cfg.remote_dir.join("a.rhd").exists());
        assert!(!cfg.local_dir.join("a.rhd").exists());
        assert_eq!(sink.count("started"), 1);
        assert_eq!(sink.count("file_moved"), 1);
        assert_eq!(
            sink.events().last(),
            Some(&Event::Stopped {
                total_moved: 1,
                total_failed: 0
            })
        );
    }

    #[test]
    fn dry_run_reports_each_file_once() {
        let (_td, mut cfg) = setup();
        cfg.dry_run = true;
        fs::write(cfg.local_dir.join("a.rhd"), b"payload").unwrap();
        let sink = Arc::new(MemorySink::new());
        let mut scan = ScanLoop::new(&cfg, sink.clone(), Shutdown::new()).unwrap();

        scan.scan_once();
        scan.pool().wait_idle();
        let second = scan.scan_once();
        scan.pool().wait_idle();

        assert_eq!(second.in_flight, 1);
        assert_eq!(sink.count("file_moved"), 1);
        assert!(cfg.local_dir.join("a.rhd").exists());
        assert_eq!(fs::read_dir(&cfg.remote_dir).unwrap().count(), 0);
    }

    #[test]
    fn run_stops_on_shutdown() {
        let (_td, cfg) = setup();
        let shutdown = Shutdown::new();
        let sink = Arc::new(MemorySink::new());
        let mut scan = ScanLoop::new(&cfg, sink.clone(), shutdown.clone()).unwrap();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            shutdown.request();
        });
        scan.run();
        stopper.join().unwrap();
        assert_eq!(scan.phase(), Phase::Stopped);
        assert_eq!(sink.count("stopped"), 1);
    }

    #[test]
    fn stale_locks_lists_markers_only() {
        let (_td, cfg) = setup();
        fs::write(cfg.local_dir.join("b.rhd.lock"), b"").unwrap();
        fs::write(cfg.local_dir.join("a.rhd.lock"), b"").unwrap();
        fs::write(cfg.local_dir.join("a.rhd"), b"x").unwrap();
        let scan = ScanLoop::new(&cfg, Arc::new(MemorySink::new()), Shutdown::new()).unwrap();
        assert_eq!(
            scan.stale_locks(),
            vec![cfg.local_dir.join("a.rhd.lock"), cfg.local_dir.join("b.rhd.lock")]
        );
    }
}
