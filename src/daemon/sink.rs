//! Visibility sink: the capability the session runtime drives to present
//! state. A host toolkit implements it; the CLI uses [`TerminalSink`].

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::io::{self, Write};

use crate::session::model::{Notification, NotificationLevel, SessionModel, SessionState};
use crate::snapshot::Item;

/// Read-only projection of the session handed to sinks.
#[derive(Debug, Clone, Copy)]
pub struct SessionView<'a> {
    pub state: SessionState,
    pub index: Option<usize>,
    pub total: usize,
    pub current: Option<&'a Item>,
    pub level: Option<i64>,
    /// Palette from the latest snapshot (`color1`, `primary`, ...).
    pub colors: &'a BTreeMap<String, String>,
}

impl<'a> SessionView<'a> {
    #[must_use]
    pub fn of(model: &'a SessionModel) -> Self {
        Self {
            state: model.state,
            index: model.selection.index(),
            total: model.selection.len(),
            current: model.current(),
            level: model.settings.level_enabled.then_some(model.level),
            colors: &model.colors,
        }
    }
}

pub trait VisibilitySink: Send {
    fn set_visible(&mut self, visible: bool, view: &SessionView<'_>);
    fn selection_changed(&mut self, view: &SessionView<'_>);
    fn level_changed(&mut self, level: i64, view: &SessionView<'_>);
    fn notify(&mut self, notification: &Notification);
}

// ──────────────────── terminal sink ────────────────────

/// Redraws one status line in place; notifications get their own line.
pub struct TerminalSink<W: Write + Send> {
    out: W,
}

impl TerminalSink<io::Stderr> {
    #[must_use]
    pub fn stderr() -> Self {
        Self { out: io::stderr() }
    }
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn redraw(&mut self, view: &SessionView<'_>) {
        let line = status_line(view);
        // Write errors on a status line are not actionable.
        let _ = write!(self.out, "\r\x1b[2K{line}");
        let _ = self.out.flush();
    }
}

impl<W: Write + Send> VisibilitySink for TerminalSink<W> {
    fn set_visible(&mut self, _visible: bool, view: &SessionView<'_>) {
        self.redraw(view);
    }

    fn selection_changed(&mut self, view: &SessionView<'_>) {
        if view.state == SessionState::Visible {
            self.redraw(view);
        }
    }

    fn level_changed(&mut self, _level: i64, view: &SessionView<'_>) {
        if view.state == SessionState::Visible {
            self.redraw(view);
        }
    }

    fn notify(&mut self, notification: &Notification) {
        let tag = match notification.level {
            NotificationLevel::Warning => "warn",
            NotificationLevel::Error => "error",
        };
        let _ = write!(self.out, "\r\x1b[2K[{tag}] {}\r\n", notification.message);
        let _ = self.out.flush();
    }
}

/// Palette keys tried in order for the highlighted item name.
const ACCENT_KEYS: [&str; 3] = ["accent", "primary", "color1"];

/// First palette entry that parses as `#rrggbb`.
#[must_use]
pub fn accent(colors: &BTreeMap<String, String>) -> Option<(u8, u8, u8)> {
    ACCENT_KEYS
        .iter()
        .filter_map(|key| colors.get(*key))
        .find_map(|value| parse_hex_rgb(value))
}

fn parse_hex_rgb(value: &str) -> Option<(u8, u8, u8)> {
    let hex = value.trim().strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

/// One-line rendering of the session, e.g. `[2/5] Portal  level 80`. The
/// item name is drawn in the palette accent when the snapshot has one.
#[must_use]
pub fn status_line(view: &SessionView<'_>) -> String {
    match view.state {
        SessionState::Loading => "loading…".to_string(),
        SessionState::Hidden => "(hidden)".to_string(),
        SessionState::Visible => {
            let mut line = match (view.index, view.current) {
                (Some(i), Some(item)) => {
                    let name = match accent(view.colors) {
                        Some((r, g, b)) => format!("\x1b[38;2;{r};{g};{b}m{}\x1b[39m", item.name),
                        None => item.name.clone(),
                    };
                    format!("[{}/{}] {name}", i + 1, view.total)
                }
                _ => "[0/0] nothing to show".to_string(),
            };
            if let Some(level) = view.level {
                line.push_str(&format!("  level {level}"));
            }
            line
        }
    }
}
