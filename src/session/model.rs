//! Session state: everything the control thread owns.
//!
//! The model is mutated only by [`super::update::update`]. Side effects are
//! described as [`SessionCmd`] values and executed by the runtime.

#![allow(missing_docs)]

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use crate::core::config::{ActionClassConfig, Config, MarkerMatch, Orientation};
use crate::core::errors::ActionError;
use crate::dispatch::ActionEvent;
use crate::logger::activity::ActivityEvent;
use crate::persist::Debouncer;
use crate::selection::SelectionModel;
use crate::snapshot::{FetchCompleted, GenerationGate, Item};

/// Maximum number of notifications kept; oldest are dropped first.
pub const MAX_NOTIFICATIONS: usize = 3;

// ──────────────────── state ────────────────────

/// Lifecycle of the overlay. `Loading` lasts until the first fetch completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Loading,
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: u64,
    pub level: NotificationLevel,
    pub message: String,
}

/// Range and step of the continuous level control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelBounds {
    pub min: i64,
    pub max: i64,
    pub step: i64,
}

impl LevelBounds {
    #[must_use]
    pub fn clamp(&self, value: i64) -> i64 {
        value.clamp(self.min, self.max)
    }
}

/// Immutable per-session settings extracted from [`Config`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub orientation: Orientation,
    pub columns: usize,
    pub commit_class: String,
    pub policies: BTreeMap<String, ActionClassConfig>,
    pub start_hidden: bool,
    pub marker_match: MarkerMatch,
    pub has_marker: bool,
    pub write_marker_on_success: bool,
    /// Level control is active only when a setting target exists.
    pub level_enabled: bool,
    pub level_bounds: LevelBounds,
    pub level_default: i64,
    pub debounce: Duration,
}

impl SessionSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let p = &config.persistence;
        Self {
            orientation: config.launcher.orientation,
            columns: config.launcher.columns,
            commit_class: config.commit_class().to_string(),
            policies: config.actions.clone(),
            start_hidden: config.launcher.start_hidden,
            marker_match: p.marker_match,
            has_marker: p.marker_file.is_some(),
            write_marker_on_success: p.write_marker_on_success,
            level_enabled: p.setting_file.is_some(),
            level_bounds: LevelBounds {
                min: p.level_min,
                max: p.level_max,
                step: p.level_step,
            },
            level_default: p.level_default,
            debounce: Duration::from_millis(p.debounce_ms),
        }
    }

    #[must_use]
    pub fn policy(&self, class: &str) -> ActionClassConfig {
        self.policies.get(class).cloned().unwrap_or_default()
    }
}

pub struct SessionModel {
    pub settings: SessionSettings,
    pub state: SessionState,
    /// Hide requested while loading; applied when the session becomes ready.
    pub hide_on_ready: bool,
    pub selection: SelectionModel,
    pub colors: BTreeMap<String, String>,
    pub gate: GenerationGate,
    /// Set once the first successful snapshot triggered reconciliation.
    pub reconciled: bool,
    pub level: i64,
    pub level_debounce: Debouncer<i64>,
    pub dragging: bool,
    pub notifications: VecDeque<Notification>,
    pub next_notification_id: u64,
    pub quit: bool,
}

impl SessionModel {
    /// `persisted_level` is the value read from the setting store at startup.
    #[must_use]
    pub fn new(settings: SessionSettings, persisted_level: Option<i64>) -> Self {
        let level = settings
            .level_bounds
            .clamp(persisted_level.unwrap_or(settings.level_default));
        Self {
            selection: SelectionModel::new(settings.orientation, settings.columns),
            hide_on_ready: settings.start_hidden,
            level_debounce: Debouncer::new(settings.debounce),
            settings,
            state: SessionState::Loading,
            colors: BTreeMap::new(),
            gate: GenerationGate::default(),
            reconciled: false,
            level,
            dragging: false,
            notifications: VecDeque::new(),
            next_notification_id: 1,
            quit: false,
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<&Item> {
        self.selection.current()
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.state == SessionState::Visible
    }

    /// Earliest instant the runtime must wake up for.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.level_debounce.next_deadline()
    }

    /// Push a notification, evicting the oldest past the cap.
    pub fn push_notification(&mut self, level: NotificationLevel, message: String) -> Notification {
        let notification = Notification {
            id: self.next_notification_id,
            level,
            message,
        };
        self.next_notification_id += 1;
        self.notifications.push_back(notification.clone());
        while self.notifications.len() > MAX_NOTIFICATIONS {
            self.notifications.pop_front();
        }
        notification
    }
}

// ──────────────────── messages ────────────────────

/// User intents, already decoupled from any input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInput {
    Up,
    Down,
    Left,
    Right,
    /// Wheel notches; positive moves forward.
    Wheel(isize),
    /// Pointer hit on an item index.
    Point(usize),
    Commit,
    LevelUp,
    LevelDown,
    /// Pointer drag on the level control.
    LevelDrag(i64),
    LevelRelease,
    /// Close the overlay (Escape).
    Close,
}

#[derive(Debug, Clone)]
pub enum SessionMsg {
    Input(SessionInput, Instant),
    ToggleVisibility,
    Show,
    Hide,
    Refresh,
    FetchCompleted(FetchCompleted),
    /// Result of the one-time marker read.
    MarkerLoaded(Option<String>),
    Action(ActionEvent),
    /// The dispatcher refused the request synchronously.
    DispatchRejected(ActionError),
    Tick(Instant),
    Quit,
}

// ──────────────────── commands ────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCmd {
    None,
    Fetch,
    ReadMarker,
    Dispatch { class: String, command: String },
    PersistLevel(i64),
    WriteMarker(String),
    SetVisible(bool),
    SelectionChanged,
    LevelChanged(i64),
    Notify(Notification),
    Log(LogCmd),
    Quit,
    Batch(Vec<Self>),
}

/// Log records the reducer knows enough to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogCmd {
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
}

impl From<LogCmd> for ActivityEvent {
    fn from(cmd: LogCmd) -> Self {
        match cmd {
            LogCmd::SnapshotApplied {
                generation,
                items,
                duration_ms,
            } => Self::SnapshotApplied {
                generation,
                items,
                duration_ms,
            },
            LogCmd::FetchFailed {
                generation,
                code,
                message,
            } => Self::FetchFailed {
                generation,
                code,
                message,
            },
            LogCmd::Reconciled {
                marker,
                index,
                matched,
            } => Self::Reconciled {
                marker,
                index,
                matched,
            },
        }
    }
}

impl SessionCmd {
    /// Collapse a list of commands, dropping `None`s.
    #[must_use]
    pub fn batch(cmds: Vec<Self>) -> Self {
        let mut cmds: Vec<Self> = cmds.into_iter().filter(|c| *c != Self::None).collect();
        match cmds.len() {
            0 => Self::None,
            1 => cmds.remove(0),
            _ => Self::Batch(cmds),
        }
    }

    /// Flatten nested batches into execution order.
    #[must_use]
    pub fn flatten(self) -> Vec<Self> {
        match self {
            Self::None => Vec::new(),
            Self::Batch(cmds) => cmds.into_iter().flat_map(Self::flatten).collect(),
            other => vec![other],
        }
    }
}
