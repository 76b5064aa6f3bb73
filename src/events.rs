//! Lifecycle and per-file events.
//!
//! The core only produces [`Event`] values; where they go (log records, a
//! notification service, a test buffer) is the [`EventSink`]'s business.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Started {
        local_dir: PathBuf,
        remote_dir: PathBuf,
    },
    FileMoved {
        filename: String,
        bytes: u64,
    },
    FileFailed {
        filename: String,
        reason: String,
        attempts: u32,
    },
    InactivityWarning {
        minutes_since_last_move: f64,
    },
    HealthSummary {
        moved_count: u64,
        failed_count: u64,
    },
    Stopped {
        total_moved: u64,
        total_failed: u64,
    },
    DirectoryUnavailable {
        path: PathBuf,
        reason: String,
    },
    DirectoryRestored {
        path: PathBuf,
    },
}

impl Event {
    /// The snake_case tag used on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Started { .. } => "started",
            Event::FileMoved { .. } => "file_moved",
            Event::FileFailed { .. } => "file_failed",
            Event::InactivityWarning { .. } => "inactivity_warning",
            Event::HealthSummary { .. } => "health_summary",
            Event::Stopped { .. } => "stopped",
            Event::DirectoryUnavailable { .. } => "directory_unavailable",
            Event::DirectoryRestored { .. } => "directory_restored",
        }
    }
}

/// Receives events from the scan loop and from worker threads.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Writes each event as a structured log record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: Event) {
        let name = event.name();
        match &event {
            Event::Started { local_dir, remote_dir } => info!(
                event = name,
                local_dir = %local_dir.display(),
                remote_dir = %remote_dir.display(),
                "file mover started"
            ),
            Event::FileMoved { filename, bytes } => info!(event = name, file = %filename, bytes, "file moved"),
            Event::FileFailed {
                filename,
                reason,
                attempts,
            } => error!(event = name, file = %filename, attempts, reason = %reason, "file transfer failed"),
            Event::InactivityWarning { minutes_since_last_move } => warn!(
                event = name,
                minutes = *minutes_since_last_move,
                "no file moved recently"
            ),
            Event::HealthSummary {
                moved_count,
                failed_count,
            } => info!(event = name, moved = moved_count, failed = failed_count, "health summary"),
            Event::Stopped {
                total_moved,
                total_failed,
            } => info!(event = name, moved = total_moved, failed = total_failed, "file mover stopped"),
            Event::DirectoryUnavailable { path, reason } => {
                error!(event = name, path = %path.display(), reason = %reason, "directory unavailable")
            }
            Event::DirectoryRestored { path } => info!(event = name, path = %path.display(), "directory restored"),
        }
    }
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Number of events with the given wire name.
    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|e| e.name() == name)
            .count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: Event) {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_counts_by_name() {
        let sink = MemorySink::new();
        sink.emit(Event::FileMoved {
            filename: "a.rhd".into(),
            bytes: 1,
        });
        sink.emit(Event::HealthSummary {
            moved_count: 1,
            failed_count: 0,
        });
        assert_eq!(sink.count("file_moved"), 1);
        assert_eq!(sink.count("stopped"), 0);
        assert_eq!(sink.events().len(), 2);
    }

    #[test]
    fn tracing_sink_accepts_every_variant() {
        let sink = TracingSink;
        sink.emit(Event::InactivityWarning {
            minutes_since_last_move: 12.5,
        });
        sink.emit(Event::DirectoryRestored { path: "/r".into() });
    }
}
