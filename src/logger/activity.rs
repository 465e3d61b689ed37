//! Activity logger thread.
//!
//! A dedicated thread owns the [`JsonlWriter`]. Every other thread sends
//! [`ActivityEvent`]s over a bounded crossbeam channel with `try_send`, so
//! the control loop is never blocked by logging back-pressure.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{OvlError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

const CHANNEL_CAPACITY: usize = 512;

// ──────────────────── public event type ────────────────────

#[derive(Debug, Clone)]
pub enum ActivityEvent {
    SessionStarted {
        version: String,
        profile: String,
        config_hash: String,
    },
    SessionStopped {
        reason: String,
        uptime_secs: u64,
    },
    SnapshotApplied {
        generation: u64,
        items: usize,
        duration_ms: u64,
    },
    FetchFailed {
        generation: u64,
        code: String,
        message: String,
    },
    Reconciled {
        marker: Option<String>,
        index: Option<usize>,
        matched: bool,
    },
    VisibilityChanged {
        visible: bool,
    },
    ActionStarted {
        class: String,
        run_id: u64,
        pid: u32,
        swept: usize,
    },
    /// Output tail of a completion-tracked action, one entry per line.
    ActionOutput {
        class: String,
        run_id: u64,
        lines: Vec<String>,
    },
    ActionFinished {
        class: String,
        run_id: u64,
        command: String,
        ok: bool,
        disposition: String,
        duration_ms: u64,
    },
    ActionFailed {
        class: String,
        run_id: Option<u64>,
        code: String,
        message: String,
    },
    ActionTerminated {
        class: String,
        run_id: u64,
        pid: Option<u32>,
    },
    SettingPersisted {
        path: String,
        value: i64,
    },
    MarkerPersisted {
        path: String,
        value: String,
    },
    PersistFailed {
        code: String,
        message: String,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel asking the logger thread to flush and exit.
    Shutdown,
}

// ──────────────────── public handle ────────────────────

/// Cheaply-cloneable sending side of the activity log.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Non-blocking. A full channel drops the event and bumps the counter.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit. Join its handle to wait.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }

    /// Handle whose events go nowhere (`ovl fetch`, tests).
    #[must_use]
    pub fn disabled() -> Self {
        let (tx, _rx) = bounded(1);
        Self {
            tx,
            dropped_events: Arc::new(AtomicU64::new(0)),
        }
    }
}

// ──────────────────── spawn ────────────────────

/// Spawn the logger thread. It runs until `shutdown()` or until every
/// handle is dropped.
pub fn spawn_logger(
    config: JsonlConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    spawn_logger_with_capacity(config, CHANNEL_CAPACITY)
}

pub fn spawn_logger_with_capacity(
    config: JsonlConfig,
    capacity: usize,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: Arc::clone(&dropped),
    };

    let join = thread::Builder::new()
        .name("ovl-logger".to_string())
        .spawn(move || logger_thread_main(&rx, config, &dropped))
        .map_err(|e| OvlError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

fn logger_thread_main(rx: &Receiver<ActivityEvent>, config: JsonlConfig, dropped: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(config);

    while let Ok(event) = rx.recv() {
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{d} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }
        jsonl.write_entry(&event_to_log_entry(&event));
        // Volume is low and lines should be visible to `tail -f` promptly.
        jsonl.flush();
    }

    jsonl.flush();
    jsonl.fsync();
}

// ──────────────────── event conversion ────────────────────

#[allow(clippy::too_many_lines)]
fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::SessionStarted {
            version,
            profile,
            config_hash,
        } => {
            let mut e = LogEntry::new(EventType::SessionStart, Severity::Info);
            e.details = Some(format!(
                "version={version} profile={profile} config_hash={config_hash}"
            ));
            e.ok = Some(true);
            e
        }
        ActivityEvent::SessionStopped {
            reason,
            uptime_secs,
        } => {
            let mut e = LogEntry::new(EventType::SessionStop, Severity::Info);
            e.details = Some(format!("reason={reason} uptime={uptime_secs}s"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::SnapshotApplied {
            generation,
            items,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::SnapshotApplied, Severity::Info);
            e.generation = Some(*generation);
            e.items = Some(*items);
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(true);
            e
        }
        ActivityEvent::FetchFailed {
            generation,
            code,
            message,
        } => {
            let mut e = LogEntry::new(EventType::FetchFailed, Severity::Warning);
            e.generation = Some(*generation);
            e.ok = Some(false);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e
        }
        ActivityEvent::Reconciled {
            marker,
            index,
            matched,
        } => {
            let mut e = LogEntry::new(EventType::Reconciled, Severity::Info);
            e.value = marker.clone();
            e.details = index.map(|i| format!("index={i}"));
            e.ok = Some(*matched);
            e
        }
        ActivityEvent::VisibilityChanged { visible } => {
            let mut e = LogEntry::new(EventType::VisibilityChanged, Severity::Info);
            e.value = Some(if *visible { "visible" } else { "hidden" }.to_string());
            e
        }
        ActivityEvent::ActionStarted {
            class,
            run_id,
            pid,
            swept,
        } => {
            let mut e = LogEntry::new(EventType::ActionStarted, Severity::Info);
            e.class = Some(class.clone());
            e.run_id = Some(*run_id);
            e.pid = Some(*pid);
            if *swept > 0 {
                e.details = Some(format!("swept={swept}"));
            }
            e
        }
        ActivityEvent::ActionOutput {
            class,
            run_id,
            lines,
        } => {
            let mut e = LogEntry::new(EventType::ActionOutput, Severity::Info);
            e.class = Some(class.clone());
            e.run_id = Some(*run_id);
            e.details = Some(lines.join("\n"));
            e
        }
        ActivityEvent::ActionFinished {
            class,
            run_id,
            command,
            ok,
            disposition,
            duration_ms,
        } => {
            let severity = if *ok { Severity::Info } else { Severity::Warning };
            let mut e = LogEntry::new(EventType::ActionFinished, severity);
            e.class = Some(class.clone());
            e.run_id = Some(*run_id);
            e.command = Some(command.clone());
            e.ok = Some(*ok);
            e.details = Some(disposition.clone());
            e.duration_ms = Some(*duration_ms);
            e
        }
        ActivityEvent::ActionFailed {
            class,
            run_id,
            code,
            message,
        } => {
            let mut e = LogEntry::new(EventType::ActionFailed, Severity::Error);
            e.class = Some(class.clone());
            e.run_id = *run_id;
            e.ok = Some(false);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e
        }
        ActivityEvent::ActionTerminated { class, run_id, pid } => {
            let mut e = LogEntry::new(EventType::ActionTerminated, Severity::Info);
            e.class = Some(class.clone());
            e.run_id = Some(*run_id);
            e.pid = *pid;
            e
        }
        ActivityEvent::SettingPersisted { path, value } => {
            let mut e = LogEntry::new(EventType::SettingPersisted, Severity::Info);
            e.path = Some(path.clone());
            e.value = Some(value.to_string());
            e.ok = Some(true);
            e
        }
        ActivityEvent::MarkerPersisted { path, value } => {
            let mut e = LogEntry::new(EventType::MarkerPersisted, Severity::Info);
            e.path = Some(path.clone());
            e.value = Some(value.clone());
            e.ok = Some(true);
            e
        }
        ActivityEvent::PersistFailed { code, message } => {
            let mut e = LogEntry::new(EventType::PersistFailed, Severity::Warning);
            e.ok = Some(false);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Error);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::SessionStop, Severity::Info),
    }
}
