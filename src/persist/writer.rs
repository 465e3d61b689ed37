//! Persistence writer thread.
//!
//! The control thread hands level values and marker tokens to
//! [`PersistWriter`] and returns at once; a dedicated thread owns the
//! stores and performs the atomic writes. Jobs that queue up while a write
//! is in flight are coalesced: only the newest level and the newest marker
//! reach disk.

#![allow(missing_docs)]

use std::thread;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::core::errors::{OvlError, Result};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::persist::store::{MarkerFile, SettingStore};

enum Job {
    Level(i64),
    Marker(String),
    Shutdown,
}

/// Sending side of the writer thread.
pub struct PersistWriter {
    tx: Sender<Job>,
    join: Option<thread::JoinHandle<()>>,
}

impl PersistWriter {
    /// Spawn the `ovl-persist` thread owning `setting` and `marker`.
    pub fn spawn(
        setting: Option<Box<dyn SettingStore>>,
        marker: Option<MarkerFile>,
        logger: ActivityLoggerHandle,
    ) -> Result<Self> {
        let (tx, rx) = unbounded();
        let join = thread::Builder::new()
            .name("ovl-persist".to_string())
            .spawn(move || writer_main(&rx, setting, marker.as_ref(), &logger))
            .map_err(|e| OvlError::Runtime {
                details: format!("failed to spawn persist thread: {e}"),
            })?;
        Ok(Self {
            tx,
            join: Some(join),
        })
    }

    /// Queue a level write. Never blocks.
    pub fn write_level(&self, value: i64) {
        let _ = self.tx.send(Job::Level(value));
    }

    /// Queue a marker write. Never blocks.
    pub fn write_marker(&self, token: impl Into<String>) {
        let _ = self.tx.send(Job::Marker(token.into()));
    }

    /// Write whatever is queued, then stop the thread and wait for it.
    pub fn finish(&mut self) {
        let _ = self.tx.send(Job::Shutdown);
        if let Some(join) = self.join.take()
            && join.join().is_err()
        {
            eprintln!("[OVL-PERSIST] writer thread panicked");
        }
    }
}

impl Drop for PersistWriter {
    fn drop(&mut self) {
        // Not joined here: a stuck store must not hang the caller.
        let _ = self.tx.send(Job::Shutdown);
    }
}

#[derive(Default)]
struct Batch {
    level: Option<i64>,
    marker: Option<String>,
    stop: bool,
}

impl Batch {
    fn absorb(&mut self, job: Job) {
        match job {
            Job::Level(value) => self.level = Some(value),
            Job::Marker(token) => self.marker = Some(token),
            Job::Shutdown => self.stop = true,
        }
    }
}

fn writer_main(
    rx: &Receiver<Job>,
    mut setting: Option<Box<dyn SettingStore>>,
    marker: Option<&MarkerFile>,
    logger: &ActivityLoggerHandle,
) {
    while let Ok(job) = rx.recv() {
        let mut batch = Batch::default();
        batch.absorb(job);
        while !batch.stop {
            let Ok(job) = rx.try_recv() else {
                break;
            };
            batch.absorb(job);
        }

        if let (Some(value), Some(store)) = (batch.level, setting.as_mut()) {
            match store.write(value) {
                Ok(()) => logger.send(ActivityEvent::SettingPersisted {
                    path: store.describe(),
                    value,
                }),
                Err(e) => {
                    eprintln!("\r\n[OVL-PERSIST] {e}");
                    logger.send(ActivityEvent::PersistFailed {
                        code: e.code().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
        if let (Some(token), Some(marker)) = (batch.marker, marker) {
            match marker.write(&token) {
                Ok(()) => logger.send(ActivityEvent::MarkerPersisted {
                    path: marker.path().display().to_string(),
                    value: token,
                }),
                Err(e) => {
                    eprintln!("\r\n[OVL-PERSIST] {e}");
                    logger.send(ActivityEvent::PersistFailed {
                        code: e.code().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if batch.stop {
            break;
        }
    }
}
