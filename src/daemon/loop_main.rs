//! Session loop: the control thread that owns the [`SessionModel`].
//!
//! Architecture: one control thread plus short-lived workers, all talking
//! over crossbeam channels:
//! - **Control thread** (this loop): applies messages through `update()` and
//!   executes the resulting commands.
//! - **Fetch workers**: one per snapshot request, tagged with a generation.
//! - **Action workers**: one per dispatched run (see `dispatch`).
//! - **Host thread**: key reader or toolkit bridge feeding [`HostEvent`]s.
//! - **Persist thread**: level and marker writes (see `persist::writer`).
//! - **Logger thread**: writes JSONL (see `logger::activity`).
//!
//! The loop sleeps until the next message, the debounce deadline, or the
//! idle poll interval used to observe signal flags.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, never, select, unbounded};

use crate::core::config::Config;
use crate::core::errors::{OvlError, Result};
use crate::daemon::signals::SignalHandler;
use crate::daemon::sink::{SessionView, VisibilitySink};
use crate::dispatch::{ActionDispatcher, ActionEvent, ProcessControl};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::persist::{MarkerFile, PersistWriter, SettingStore};
use crate::session::model::{SessionCmd, SessionInput, SessionModel, SessionMsg, SessionSettings};
use crate::session::update::{init, update};
use crate::snapshot::{FetchCompleted, SnapshotFetcher, SnapshotSource};

/// Longest sleep between signal-flag polls.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Events from whatever hosts the overlay (terminal, toolkit, IPC).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    Input(SessionInput),
    Toggle,
    Show,
    Hide,
    Refresh,
    Quit,
}

/// External collaborators of the session loop.
pub struct SessionDeps {
    pub source: Arc<dyn SnapshotSource>,
    pub control: Arc<dyn ProcessControl>,
    pub setting: Option<Box<dyn SettingStore>>,
    pub marker: Option<MarkerFile>,
    pub logger: ActivityLoggerHandle,
    pub signals: SignalHandler,
}

pub struct SessionLoop<S: VisibilitySink> {
    model: SessionModel,
    fetcher: SnapshotFetcher,
    dispatcher: ActionDispatcher,
    fetch_rx: Receiver<FetchCompleted>,
    action_rx: Receiver<ActionEvent>,
    host_rx: Receiver<HostEvent>,
    persist: Option<PersistWriter>,
    marker: Option<MarkerFile>,
    logger: ActivityLoggerHandle,
    signals: SignalHandler,
    sink: S,
    profile: String,
    config_hash: String,
    started: Instant,
}

impl<S: VisibilitySink> SessionLoop<S> {
    pub fn new(config: &Config, deps: SessionDeps, sink: S, host_rx: Receiver<HostEvent>) -> Self {
        let (fetch_tx, fetch_rx) = unbounded();
        let (action_tx, action_rx) = unbounded();

        let settings = SessionSettings::from_config(config);
        let persisted = deps
            .setting
            .as_ref()
            .filter(|_| settings.level_enabled)
            .and_then(|store| store.read());

        let persist = if deps.setting.is_some() || deps.marker.is_some() {
            match PersistWriter::spawn(deps.setting, deps.marker.clone(), deps.logger.clone()) {
                Ok(writer) => Some(writer),
                Err(e) => {
                    // Session still runs; values just stay in memory.
                    eprintln!("[OVL-PERSIST] {e}");
                    None
                }
            }
        } else {
            None
        };

        Self {
            model: SessionModel::new(settings, persisted),
            fetcher: SnapshotFetcher::new(deps.source, fetch_tx),
            dispatcher: ActionDispatcher::new(deps.control, config.actions.clone(), action_tx),
            fetch_rx,
            action_rx,
            host_rx,
            persist,
            marker: deps.marker,
            logger: deps.logger,
            signals: deps.signals,
            sink,
            profile: config.launcher.profile.name().to_string(),
            config_hash: config.stable_hash().unwrap_or_default(),
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn model(&self) -> &SessionModel {
        &self.model
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[must_use]
    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    /// Run until quit is requested by the host, a signal, or the model.
    pub fn run(&mut self) -> Result<()> {
        self.start();
        while self.pump(IDLE_POLL) {}
        self.stop("quit requested");
        Ok(())
    }

    /// Log the session start and issue the initial fetch.
    pub fn start(&mut self) {
        self.started = Instant::now();
        self.logger.send(ActivityEvent::SessionStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            profile: self.profile.clone(),
            config_hash: self.config_hash.clone(),
        });
        eprintln!(
            "[OVL-SESSION] started profile={} source={}",
            self.profile,
            self.fetcher.describe()
        );
        let cmd = init(&self.model);
        self.execute(cmd);
    }

    /// Wait for queued writes, then log the stop.
    pub fn stop(&mut self, reason: &str) {
        if let Some(persist) = self.persist.as_mut() {
            persist.finish();
        }
        let uptime_secs = self.started.elapsed().as_secs();
        self.logger.send(ActivityEvent::SessionStopped {
            reason: reason.to_string(),
            uptime_secs,
        });
        eprintln!("\r\n[OVL-SESSION] shutdown complete (uptime={uptime_secs}s)");
    }

    /// One loop iteration: wait up to `max_wait` for a message, then tick.
    /// Returns `false` once the session has quit.
    pub fn pump(&mut self, max_wait: Duration) -> bool {
        if self.signals.should_shutdown() {
            eprintln!("\r\n[OVL-SESSION] shutdown requested");
            self.apply(SessionMsg::Quit);
            return false;
        }
        if self.signals.should_toggle() {
            self.apply(SessionMsg::ToggleVisibility);
        }
        if self.signals.should_refresh() {
            self.apply(SessionMsg::Refresh);
        }
        if self.model.quit {
            return false;
        }

        let now = Instant::now();
        let wait = self
            .model
            .next_deadline()
            .map_or(max_wait, |deadline| {
                deadline.saturating_duration_since(now).min(max_wait)
            });

        // Local handles so the arms can borrow `self` mutably.
        let fetch_rx = self.fetch_rx.clone();
        let action_rx = self.action_rx.clone();
        let host_rx = self.host_rx.clone();
        let mut host_closed = false;

        select! {
            recv(fetch_rx) -> msg => {
                if let Ok(done) = msg {
                    self.apply(SessionMsg::FetchCompleted(done));
                }
            }
            recv(action_rx) -> msg => {
                if let Ok(event) = msg {
                    self.on_action_event(event);
                }
            }
            recv(host_rx) -> msg => match msg {
                Ok(event) => self.on_host_event(event),
                Err(_) => host_closed = true,
            },
            default(wait) => {}
        }

        if host_closed {
            // Host gone (e.g. stdin closed); keep serving signals.
            self.host_rx = never();
        }

        self.apply(SessionMsg::Tick(Instant::now()));
        !self.model.quit
    }

    fn on_host_event(&mut self, event: HostEvent) {
        let msg = match event {
            HostEvent::Input(input) => SessionMsg::Input(input, Instant::now()),
            HostEvent::Toggle => SessionMsg::ToggleVisibility,
            HostEvent::Show => SessionMsg::Show,
            HostEvent::Hide => SessionMsg::Hide,
            HostEvent::Refresh => SessionMsg::Refresh,
            HostEvent::Quit => SessionMsg::Quit,
        };
        self.apply(msg);
    }

    fn on_action_event(&mut self, event: ActionEvent) {
        self.dispatcher.complete(&event);
        self.log_action(&event);
        self.apply(SessionMsg::Action(event));
    }

    fn apply(&mut self, msg: SessionMsg) {
        let cmd = update(&mut self.model, msg);
        self.execute(cmd);
    }

    // ──────────────────── command execution ────────────────────

    fn execute(&mut self, cmd: SessionCmd) {
        for cmd in cmd.flatten() {
            match cmd {
                SessionCmd::None | SessionCmd::Quit | SessionCmd::Batch(_) => {}
                SessionCmd::Fetch => self.request_fetch(),
                SessionCmd::ReadMarker => self.read_marker(),
                SessionCmd::Dispatch { class, command } => self.dispatch(&class, &command),
                SessionCmd::PersistLevel(value) => {
                    if let Some(persist) = &self.persist {
                        persist.write_level(value);
                    }
                }
                SessionCmd::WriteMarker(token) => {
                    if let Some(persist) = &self.persist {
                        persist.write_marker(token);
                    }
                }
                SessionCmd::SetVisible(visible) => {
                    self.logger.send(ActivityEvent::VisibilityChanged { visible });
                    let view = SessionView::of(&self.model);
                    self.sink.set_visible(visible, &view);
                }
                SessionCmd::SelectionChanged => {
                    let view = SessionView::of(&self.model);
                    self.sink.selection_changed(&view);
                }
                SessionCmd::LevelChanged(level) => {
                    let view = SessionView::of(&self.model);
                    self.sink.level_changed(level, &view);
                }
                SessionCmd::Notify(notification) => self.sink.notify(&notification),
                SessionCmd::Log(log) => self.logger.send(log.into()),
            }
        }
    }

    fn request_fetch(&mut self) {
        if let Err(e) = self.fetcher.request() {
            eprintln!("\r\n[OVL-FETCH] {e}");
            self.logger.send(ActivityEvent::Error {
                code: e.code().to_string(),
                message: e.to_string(),
            });
        }
    }

    fn read_marker(&mut self) {
        let marker = self.marker.as_ref().and_then(|file| match file.read() {
            Ok(marker) => marker,
            Err(e) => {
                // Unreadable marker is treated like a missing one.
                let err = OvlError::io(file.path(), e);
                eprintln!("\r\n[OVL-PERSIST] marker unreadable: {err}");
                self.logger.send(ActivityEvent::Error {
                    code: err.code().to_string(),
                    message: format!("marker unreadable: {err}"),
                });
                None
            }
        });
        self.apply(SessionMsg::MarkerLoaded(marker));
    }

    fn dispatch(&mut self, class: &str, command: &str) {
        match self.dispatcher.run(class, command) {
            Ok(_) => {}
            Err(error) => {
                eprintln!("\r\n[OVL-DISPATCH] {error}");
                self.logger.send(ActivityEvent::ActionFailed {
                    class: class.to_string(),
                    run_id: None,
                    code: error.code().to_string(),
                    message: error.to_string(),
                });
                self.apply(SessionMsg::DispatchRejected(error));
            }
        }
    }

    fn log_action(&self, event: &ActionEvent) {
        let entry = match event {
            ActionEvent::Terminated { class, run_id, pid } => ActivityEvent::ActionTerminated {
                class: class.clone(),
                run_id: run_id.0,
                pid: *pid,
            },
            ActionEvent::Started {
                class,
                run_id,
                pid,
                swept,
            } => ActivityEvent::ActionStarted {
                class: class.clone(),
                run_id: run_id.0,
                pid: *pid,
                swept: *swept,
            },
            ActionEvent::Finished {
                class,
                run_id,
                command,
                disposition,
                elapsed,
            } => ActivityEvent::ActionFinished {
                class: class.clone(),
                run_id: run_id.0,
                command: command.clone(),
                ok: *disposition == crate::dispatch::RunDisposition::Success,
                disposition: disposition.to_string(),
                duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            },
            ActionEvent::Output {
                class,
                run_id,
                lines,
            } => ActivityEvent::ActionOutput {
                class: class.clone(),
                run_id: run_id.0,
                lines: lines.clone(),
            },
            ActionEvent::Failed { run_id, error } => {
                eprintln!("\r\n[OVL-DISPATCH] {error}");
                ActivityEvent::ActionFailed {
                    class: error.class().to_string(),
                    run_id: Some(run_id.0),
                    code: error.code().to_string(),
                    message: error.to_string(),
                }
            }
        };
        self.logger.send(entry);
    }
}
