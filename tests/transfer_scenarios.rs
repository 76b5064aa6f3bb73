//! End-to-end transfer scenarios through the scan loop: a clean verified move,
//! and a copy step that keeps failing until the retry budget is spent.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tempfile::tempdir;

use file_mover::config::Backoff;
use file_mover::{
    Config, Event, Filesystem, LocalFs, MAX_ATTEMPTS, MemorySink, ScanLoop, Shutdown, TransferExecutor,
    TransferSettings,
};

fn setup(base: &Path) -> Config {
    let local = base.join("local");
    let remote = base.join("remote");
    fs::create_dir_all(&local).unwrap();
    fs::create_dir_all(&remote).unwrap();
    let mut cfg = Config::new(&local, &remote);
    cfg.stability_wait = Duration::from_millis(100);
    cfg.verify_checksum = true;
    cfg.backoff = Backoff {
        base_delay: Duration::from_millis(2),
        max_delay: Duration::from_millis(10),
    };
    cfg
}

/// Real filesystem, except `copy` fails the first `failures` times.
struct FlakyCopy {
    failures: AtomicU32,
    calls: AtomicU32,
}

impl FlakyCopy {
    fn failing(n: u32) -> Self {
        Self {
            failures: AtomicU32::new(n),
            calls: AtomicU32::new(0),
        }
    }
}

impl Filesystem for FlakyCopy {
    fn copy(&self, src: &Path, tmp: &Path) -> io::Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            // Leave a partial temp behind like a dropped share would.
            fs::write(tmp, b"partial")?;
            return Err(io::Error::new(io::ErrorKind::TimedOut, "network share unreachable"));
        }
        LocalFs.copy(src, tmp)
    }
    fn digest(&self, path: &Path) -> io::Result<String> {
        LocalFs.digest(path)
    }
    fn rename(&self, tmp: &Path, dest: &Path) -> io::Result<()> {
        LocalFs.rename(tmp, dest)
    }
    fn remove_file(&self, path: &Path) -> io::Result<()> {
        LocalFs.remove_file(path)
    }
    fn free_space(&self, dir: &Path) -> io::Result<u64> {
        LocalFs.free_space(dir)
    }
}

fn sha256(path: &Path) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(fs::read(path).unwrap()))
}

fn scan_with(cfg: &Config, fs_backend: Arc<dyn Filesystem>, sink: Arc<MemorySink>) -> ScanLoop {
    let shutdown = Shutdown::new();
    let executor = TransferExecutor::new(TransferSettings::from_config(cfg), shutdown.clone()).with_filesystem(fs_backend);
    ScanLoop::with_executor(cfg, executor, sink, shutdown).unwrap()
}

#[test]
fn stable_file_is_moved_with_matching_digest() {
    let td = tempdir().unwrap();
    let cfg = setup(td.path());
    let src = cfg.local_dir.join("a.rhd");
    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 253) as u8).collect();
    fs::write(&src, &payload).unwrap();
    let digest_before = sha256(&src);

    let sink = Arc::new(MemorySink::new());
    let stats = scan_with(&cfg, Arc::new(LocalFs), sink.clone()).run_once();

    assert_eq!(stats.moved, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(sink.count("file_moved"), 1);
    assert!(sink.events().contains(&Event::FileMoved {
        filename: "a.rhd".into(),
        bytes: payload.len() as u64,
    }));

    let dest = cfg.remote_dir.join("a.rhd");
    assert!(!src.exists(), "source must be gone");
    assert_eq!(sha256(&dest), digest_before);
    assert!(!cfg.remote_dir.join("a.rhd.tmp").exists());
    assert!(!cfg.local_dir.join("a.rhd.lock").exists());
}

#[test]
fn five_copy_failures_report_one_failure_and_keep_source() {
    let td = tempdir().unwrap();
    let cfg = setup(td.path());
    let src = cfg.local_dir.join("a.rhd");
    fs::write(&src, b"acquisition data").unwrap();

    let flaky = Arc::new(FlakyCopy::failing(MAX_ATTEMPTS));
    let sink = Arc::new(MemorySink::new());
    let stats = scan_with(&cfg, flaky.clone(), sink.clone()).run_once();

    assert_eq!(flaky.calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.moved, 0);

    let failures: Vec<Event> = sink
        .events()
        .into_iter()
        .filter(|e| e.name() == "file_failed")
        .collect();
    assert_eq!(failures.len(), 1);
    match &failures[0] {
        Event::FileFailed {
            filename,
            attempts,
            reason,
        } => {
            assert_eq!(filename, "a.rhd");
            assert_eq!(*attempts, 5);
            assert!(reason.contains("network share unreachable"), "{reason}");
        }
        other => panic!("unexpected event {other:?}"),
    }

    assert_eq!(fs::read(&src).unwrap(), b"acquisition data");
    assert!(!cfg.local_dir.join("a.rhd.lock").exists());
    assert!(!cfg.remote_dir.join("a.rhd").exists());
    assert!(!cfg.remote_dir.join("a.rhd.tmp").exists(), "partial temp must be discarded");
}

#[test]
fn transient_failures_below_budget_still_move() {
    let td = tempdir().unwrap();
    let cfg = setup(td.path());
    let src = cfg.local_dir.join("b.rhd");
    fs::write(&src, b"eventually").unwrap();

    let flaky = Arc::new(FlakyCopy::failing(MAX_ATTEMPTS - 1));
    let sink = Arc::new(MemorySink::new());
    let stats = scan_with(&cfg, flaky.clone(), sink.clone()).run_once();

    assert_eq!(stats.moved, 1);
    assert_eq!(sink.count("file_failed"), 0);
    assert_eq!(fs::read(cfg.remote_dir.join("b.rhd")).unwrap(), b"eventually");
    assert!(!src.exists());
}

#[test]
fn growing_file_is_not_dispatched() {
    let td = tempdir().unwrap();
    let mut cfg = setup(td.path());
    cfg.stability_wait = Duration::from_millis(400);
    let src: PathBuf = cfg.local_dir.join("live.rhd");
    fs::write(&src, b"").unwrap();

    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let writer = {
        let (src, stop) = (src.clone(), stop.clone());
        std::thread::spawn(move || {
            use std::io::Write;
            let mut f = fs::OpenOptions::new().append(true).open(&src).unwrap();
            while !stop.load(Ordering::SeqCst) {
                f.write_all(b"sample").unwrap();
                std::thread::sleep(Duration::from_millis(10));
            }
        })
    };

    let sink = Arc::new(MemorySink::new());
    let mut scan = scan_with(&cfg, Arc::new(LocalFs), sink.clone());
    let report = scan.scan_once();
    scan.pool().wait_idle();
    stop.store(true, Ordering::SeqCst);
    writer.join().unwrap();

    assert_eq!(report.growing, 1);
    assert_eq!(report.dispatched, 0);
    assert!(src.exists());
    assert!(!cfg.remote_dir.join("live.rhd").exists());
}
