//! Action dispatcher: at most one live run per action class.
//!
//! `run()` is called from the control thread and returns immediately. The
//! previous run of the same class is cancelled and its process group is
//! signalled before the new worker thread starts. The worker then sweeps
//! signature-matching stragglers, waits out the settle delay, spawns the
//! child, reaps it, and reports back through [`ActionEvent`]s.
//!
//! Cancellation and spawning share a small per-run slot lock, so a cancel
//! either prevents the spawn or sees the pid and terminates it. The pid is
//! cleared under the same lock once the child is reaped.
//!
//! Classes that track completion capture the child's output tail and report
//! it as [`ActionEvent::Output`] ahead of `Finished`.

#![allow(missing_docs)]

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::core::config::ActionClassConfig;
use crate::core::errors::ActionError;
use crate::dispatch::process::{ChildOutput, ProcessControl, ProcessExit};

/// Monotonic identifier of one dispatched action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// Final outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunDisposition {
    Success,
    Failure { status: String },
    /// Superseded by a newer run of the same class.
    Cancelled,
}

impl fmt::Display for RunDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failure { status } => write!(f, "failure ({status})"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Messages from the dispatcher and its workers to the control thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionEvent {
    /// A live run was superseded; `pid` is set when a signal was sent.
    Terminated {
        class: String,
        run_id: RunId,
        pid: Option<u32>,
    },
    Started {
        class: String,
        run_id: RunId,
        pid: u32,
        /// Processes signalled by the signature sweep before the spawn.
        swept: usize,
    },
    /// Last lines the child wrote, for the activity log.
    Output {
        class: String,
        run_id: RunId,
        lines: Vec<String>,
    },
    Finished {
        class: String,
        run_id: RunId,
        command: String,
        disposition: RunDisposition,
        elapsed: Duration,
    },
    Failed {
        run_id: RunId,
        error: ActionError,
    },
}

impl ActionEvent {
    #[must_use]
    pub fn run_id(&self) -> RunId {
        match self {
            Self::Terminated { run_id, .. }
            | Self::Started { run_id, .. }
            | Self::Output { run_id, .. }
            | Self::Finished { run_id, .. }
            | Self::Failed { run_id, .. } => *run_id,
        }
    }
}

#[derive(Debug, Default)]
struct RunSlot {
    pid: Option<u32>,
    cancelled: bool,
}

#[derive(Debug)]
struct LiveRun {
    run_id: RunId,
    slot: Arc<Mutex<RunSlot>>,
}

pub struct ActionDispatcher {
    control: Arc<dyn ProcessControl>,
    policies: BTreeMap<String, ActionClassConfig>,
    live: HashMap<String, LiveRun>,
    next_run: u64,
    tx: Sender<ActionEvent>,
}

impl ActionDispatcher {
    pub fn new(
        control: Arc<dyn ProcessControl>,
        policies: BTreeMap<String, ActionClassConfig>,
        tx: Sender<ActionEvent>,
    ) -> Self {
        Self {
            control,
            policies,
            live: HashMap::new(),
            next_run: 1,
            tx,
        }
    }

    /// Policy for `class`; unknown classes run with defaults.
    #[must_use]
    pub fn policy(&self, class: &str) -> ActionClassConfig {
        self.policies.get(class).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn live_run(&self, class: &str) -> Option<RunId> {
        self.live.get(class).map(|run| run.run_id)
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Dispatch `command` under `class`, superseding any live run of it.
    pub fn run(&mut self, class: &str, command: &str) -> Result<RunId, ActionError> {
        if command.trim().is_empty() {
            return Err(ActionError::SpawnFailed {
                class: class.to_string(),
                command: command.to_string(),
                details: "empty command".to_string(),
            });
        }

        let run_id = RunId(self.next_run);
        self.next_run += 1;

        let prior_terminated = self.cancel_live(class);
        let policy = self.policy(class);
        let slot = Arc::new(Mutex::new(RunSlot::default()));

        let job = Job {
            class: class.to_string(),
            run_id,
            command: command.to_string(),
            cwd: policy.working_dir.clone(),
            output: if policy.track_completion {
                ChildOutput::Capture
            } else {
                ChildOutput::Discard
            },
            settle: Duration::from_millis(policy.settle_ms),
            signature: policy.signature.clone(),
            prior_terminated,
            slot: Arc::clone(&slot),
            control: Arc::clone(&self.control),
            tx: self.tx.clone(),
        };

        thread::Builder::new()
            .name(format!("ovl-action-{class}"))
            .spawn(move || job.execute())
            .map_err(|e| ActionError::SpawnFailed {
                class: class.to_string(),
                command: command.to_string(),
                details: format!("failed to spawn worker thread: {e}"),
            })?;

        self.live
            .insert(class.to_string(), LiveRun { run_id, slot });
        Ok(run_id)
    }

    /// Drop the live entry once its run has reported a terminal event.
    pub fn complete(&mut self, event: &ActionEvent) {
        let (class, run_id) = match event {
            ActionEvent::Finished { class, run_id, .. } => (class.as_str(), *run_id),
            ActionEvent::Failed { run_id, error } => (error.class(), *run_id),
            ActionEvent::Started { .. }
            | ActionEvent::Output { .. }
            | ActionEvent::Terminated { .. } => return,
        };
        if self.live_run(class) == Some(run_id) {
            self.live.remove(class);
        }
    }

    /// Cancel the live run of `class`, signalling its group if it has one.
    /// Returns whether anything was live.
    fn cancel_live(&mut self, class: &str) -> bool {
        let Some(prior) = self.live.remove(class) else {
            return false;
        };
        let pid = {
            let mut slot = prior.slot.lock();
            slot.cancelled = true;
            slot.pid
        };
        let signalled = pid.filter(|pid| self.control.terminate_group(*pid));
        let _ = self.tx.send(ActionEvent::Terminated {
            class: class.to_string(),
            run_id: prior.run_id,
            pid: signalled,
        });
        true
    }
}

/// Everything a worker thread needs for one run.
struct Job {
    class: String,
    run_id: RunId,
    command: String,
    cwd: Option<PathBuf>,
    output: ChildOutput,
    settle: Duration,
    signature: Option<String>,
    prior_terminated: bool,
    slot: Arc<Mutex<RunSlot>>,
    control: Arc<dyn ProcessControl>,
    tx: Sender<ActionEvent>,
}

impl Job {
    fn execute(self) {
        let started = Instant::now();

        let swept = self
            .signature
            .as_deref()
            .map_or(0, |sig| self.control.terminate_matching(sig));
        if self.prior_terminated || self.signature.is_some() {
            thread::sleep(self.settle);
        }

        let spawned = {
            let mut slot = self.slot.lock();
            if slot.cancelled {
                None
            } else {
                let result = self
                    .control
                    .spawn_detached(&self.command, self.cwd.as_deref(), self.output);
                if let Ok(process) = &result {
                    slot.pid = Some(process.pid());
                }
                Some(result)
            }
        };

        let mut process = match spawned {
            None => {
                self.finish(RunDisposition::Cancelled, started);
                return;
            }
            Some(Err(e)) => {
                let _ = self.tx.send(ActionEvent::Failed {
                    run_id: self.run_id,
                    error: ActionError::SpawnFailed {
                        class: self.class.clone(),
                        command: self.command.clone(),
                        details: e.to_string(),
                    },
                });
                return;
            }
            Some(Ok(process)) => process,
        };

        let _ = self.tx.send(ActionEvent::Started {
            class: self.class.clone(),
            run_id: self.run_id,
            pid: process.pid(),
            swept,
        });

        let exit = process.wait();
        let cancelled = {
            let mut slot = self.slot.lock();
            // Reaped: the pid may be reused from here on.
            slot.pid = None;
            slot.cancelled
        };

        let lines = process.output();
        if !lines.is_empty() {
            let _ = self.tx.send(ActionEvent::Output {
                class: self.class.clone(),
                run_id: self.run_id,
                lines,
            });
        }

        let disposition = if cancelled {
            RunDisposition::Cancelled
        } else {
            match exit {
                Ok(exit) => exit.into(),
                Err(e) => RunDisposition::Failure {
                    status: format!("wait failed: {e}"),
                },
            }
        };
        self.finish(disposition, started);
    }

    fn finish(&self, disposition: RunDisposition, started: Instant) {
        let _ = self.tx.send(ActionEvent::Finished {
            class: self.class.clone(),
            run_id: self.run_id,
            command: self.command.clone(),
            disposition,
            elapsed: started.elapsed(),
        });
    }
}

/// Map a failed disposition to the error reported to the user.
#[must_use]
pub fn failure_error(class: &str, command: &str, disposition: &RunDisposition) -> Option<ActionError> {
    match disposition {
        RunDisposition::Failure { status } => Some(ActionError::NonZeroExit {
            class: class.to_string(),
            command: command.to_string(),
            status: status.clone(),
        }),
        RunDisposition::Success | RunDisposition::Cancelled => None,
    }
}

impl From<ProcessExit> for RunDisposition {
    fn from(exit: ProcessExit) -> Self {
        if exit.success() {
            Self::Success
        } else {
            Self::Failure {
                status: exit.to_string(),
            }
        }
    }
}
