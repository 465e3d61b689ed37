//! Pure update function for the session state machine.
//!
//! `update()` mutates the model and returns the effects the runtime should
//! perform. No I/O happens here; time arrives inside messages.

#![allow(missing_docs)]

use std::time::Instant;

use crate::core::config::Orientation;
use crate::dispatch::dispatcher::failure_error;
use crate::dispatch::{ActionEvent, RunDisposition};
use crate::session::model::{
    LogCmd, NotificationLevel, SessionCmd, SessionInput, SessionModel, SessionMsg, SessionState,
};
use crate::snapshot::FetchCompleted;

/// Commands to run when the session starts: the initial fetch.
#[must_use]
pub fn init(_model: &SessionModel) -> SessionCmd {
    SessionCmd::Fetch
}

pub fn update(model: &mut SessionModel, msg: SessionMsg) -> SessionCmd {
    match msg {
        SessionMsg::Input(input, now) => handle_input(model, input, now),
        SessionMsg::ToggleVisibility => match model.state {
            SessionState::Loading => {
                model.hide_on_ready = !model.hide_on_ready;
                SessionCmd::None
            }
            SessionState::Visible => hide(model),
            SessionState::Hidden => show(model),
        },
        SessionMsg::Show => match model.state {
            SessionState::Loading => {
                model.hide_on_ready = false;
                SessionCmd::None
            }
            _ => show(model),
        },
        SessionMsg::Hide => match model.state {
            SessionState::Loading => {
                model.hide_on_ready = true;
                SessionCmd::None
            }
            _ => hide(model),
        },
        SessionMsg::Refresh => SessionCmd::Fetch,
        SessionMsg::FetchCompleted(done) => apply_fetch(model, done),
        SessionMsg::MarkerLoaded(marker) => reconcile(model, marker),
        SessionMsg::Action(event) => apply_action_event(model, event),
        SessionMsg::DispatchRejected(error) => {
            let n = model.push_notification(NotificationLevel::Error, error.to_string());
            SessionCmd::Notify(n)
        }
        SessionMsg::Tick(now) => match model.level_debounce.due(now) {
            Some(value) => SessionCmd::PersistLevel(value),
            None => SessionCmd::None,
        },
        SessionMsg::Quit => {
            model.quit = true;
            let flush = flush_level(model);
            SessionCmd::batch(vec![flush, SessionCmd::Quit])
        }
    }
}

// ──────────────────── visibility ────────────────────

fn show(model: &mut SessionModel) -> SessionCmd {
    if model.state == SessionState::Visible {
        return SessionCmd::None;
    }
    model.state = SessionState::Visible;
    SessionCmd::SetVisible(true)
}

fn hide(model: &mut SessionModel) -> SessionCmd {
    if model.state == SessionState::Hidden {
        return SessionCmd::None;
    }
    model.state = SessionState::Hidden;
    model.dragging = false;
    // A pending level write is not worth losing to a hidden overlay.
    SessionCmd::batch(vec![SessionCmd::SetVisible(false), flush_level(model)])
}

/// Leave `Loading`, honoring a hide requested in the meantime.
fn become_ready(model: &mut SessionModel) -> SessionCmd {
    if model.state != SessionState::Loading {
        return SessionCmd::None;
    }
    if model.hide_on_ready {
        model.state = SessionState::Hidden;
        SessionCmd::SetVisible(false)
    } else {
        model.state = SessionState::Visible;
        SessionCmd::SetVisible(true)
    }
}

// ──────────────────── snapshot & reconciliation ────────────────────

fn apply_fetch(model: &mut SessionModel, done: FetchCompleted) -> SessionCmd {
    if !model.gate.accept(done.generation) {
        return SessionCmd::None;
    }
    let duration_ms = u64::try_from(done.elapsed.as_millis()).unwrap_or(u64::MAX);

    match done.result {
        Ok(snapshot) => {
            let items = snapshot.items.len();
            let mut cmds = vec![SessionCmd::Log(LogCmd::SnapshotApplied {
                generation: done.generation,
                items,
                duration_ms,
            })];

            model.selection.set_items(snapshot.items);
            model.colors = snapshot.colors;
            cmds.push(SessionCmd::SelectionChanged);

            if model.settings.level_enabled
                && let Some(reported) = snapshot.brightness
                && !model.level_debounce.is_pending()
                && !model.dragging
            {
                let seeded = model.settings.level_bounds.clamp(reported);
                if seeded != model.level {
                    model.level = seeded;
                    cmds.push(SessionCmd::LevelChanged(seeded));
                }
            }

            cmds.push(become_ready(model));

            if !model.reconciled {
                model.reconciled = true;
                if model.settings.has_marker {
                    cmds.push(SessionCmd::ReadMarker);
                } else {
                    cmds.push(reconcile(model, None));
                }
            }
            SessionCmd::batch(cmds)
        }
        Err(error) => {
            let log = SessionCmd::Log(LogCmd::FetchFailed {
                generation: done.generation,
                code: error.code().to_string(),
                message: error.to_string(),
            });
            let n = model.push_notification(NotificationLevel::Warning, error.to_string());
            SessionCmd::batch(vec![log, SessionCmd::Notify(n), become_ready(model)])
        }
    }
}

fn reconcile(model: &mut SessionModel, marker: Option<String>) -> SessionCmd {
    let rule = model.settings.marker_match;
    let matched = marker.as_deref().is_some_and(|m| {
        model
            .selection
            .items()
            .iter()
            .any(|item| item.matches_marker(m, rule))
    });
    let changed = match marker.as_deref() {
        Some(m) if matched => model.selection.select_where(|item| item.matches_marker(m, rule)),
        _ => false,
    };

    let log = SessionCmd::Log(LogCmd::Reconciled {
        marker,
        index: model.selection.index(),
        matched,
    });
    if changed {
        SessionCmd::batch(vec![log, SessionCmd::SelectionChanged])
    } else {
        log
    }
}

// ──────────────────── input ────────────────────

fn handle_input(model: &mut SessionModel, input: SessionInput, now: Instant) -> SessionCmd {
    match model.state {
        SessionState::Loading => {
            if input == SessionInput::Close {
                model.hide_on_ready = true;
            }
            return SessionCmd::None;
        }
        SessionState::Hidden => return SessionCmd::None,
        SessionState::Visible => {}
    }

    let grid = model.selection.orientation() == Orientation::Grid;
    let moved = match input {
        SessionInput::Up if grid => model.selection.move_grid(0, -1),
        SessionInput::Down if grid => model.selection.move_grid(0, 1),
        SessionInput::Left if grid => model.selection.move_grid(-1, 0),
        SessionInput::Right if grid => model.selection.move_grid(1, 0),
        SessionInput::Up | SessionInput::Left => model.selection.move_linear(-1),
        SessionInput::Down | SessionInput::Right => model.selection.move_linear(1),
        SessionInput::Wheel(steps) => model.selection.move_by_wheel(steps),
        SessionInput::Point(index) => model.selection.select_index_direct(index),
        SessionInput::Commit => return commit(model),
        SessionInput::Close => return hide(model),
        SessionInput::LevelUp => return step_level(model, 1, now),
        SessionInput::LevelDown => return step_level(model, -1, now),
        SessionInput::LevelDrag(value) => {
            if !model.settings.level_enabled {
                return SessionCmd::None;
            }
            model.dragging = true;
            return set_level(model, value, now);
        }
        SessionInput::LevelRelease => {
            model.dragging = false;
            return flush_level(model);
        }
    };

    if moved {
        SessionCmd::SelectionChanged
    } else {
        SessionCmd::None
    }
}

fn commit(model: &mut SessionModel) -> SessionCmd {
    let Some(item) = model.selection.current() else {
        return SessionCmd::None;
    };
    if !item.is_launchable() {
        return SessionCmd::None;
    }
    let class = model.settings.commit_class.clone();
    let dispatch = SessionCmd::Dispatch {
        class: class.clone(),
        command: item.command.clone(),
    };
    if model.settings.policy(&class).close_on_dispatch {
        SessionCmd::batch(vec![dispatch, hide(model)])
    } else {
        dispatch
    }
}

// ──────────────────── level control ────────────────────

/// Move the level by `direction` steps.
fn step_level(model: &mut SessionModel, direction: i64, now: Instant) -> SessionCmd {
    if !model.settings.level_enabled {
        return SessionCmd::None;
    }
    let delta = model.settings.level_bounds.step.saturating_mul(direction);
    let target = model.level.saturating_add(delta);
    set_level(model, target, now)
}

fn set_level(model: &mut SessionModel, value: i64, now: Instant) -> SessionCmd {
    let value = model.settings.level_bounds.clamp(value);
    if value == model.level {
        return SessionCmd::None;
    }
    model.level = value;
    model.level_debounce.submit(value, now);
    SessionCmd::LevelChanged(value)
}

fn flush_level(model: &mut SessionModel) -> SessionCmd {
    match model.level_debounce.flush() {
        Some(value) => SessionCmd::PersistLevel(value),
        None => SessionCmd::None,
    }
}

// ──────────────────── action completion ────────────────────

fn apply_action_event(model: &mut SessionModel, event: ActionEvent) -> SessionCmd {
    match event {
        ActionEvent::Terminated { .. }
        | ActionEvent::Started { .. }
        | ActionEvent::Output { .. } => SessionCmd::None,
        ActionEvent::Failed { error, .. } => {
            let n = model.push_notification(NotificationLevel::Error, error.to_string());
            SessionCmd::Notify(n)
        }
        ActionEvent::Finished {
            class,
            command,
            disposition,
            ..
        } => {
            let policy = model.settings.policy(&class);
            if !policy.track_completion {
                return SessionCmd::None;
            }
            match disposition {
                RunDisposition::Cancelled => SessionCmd::None,
                RunDisposition::Success => {
                    let mut cmds = Vec::new();
                    if model.settings.write_marker_on_success
                        && class == model.settings.commit_class
                        && let Some(token) = marker_token_for(model, &command)
                    {
                        cmds.push(SessionCmd::WriteMarker(token));
                    }
                    if policy.close_on_success && model.state == SessionState::Visible {
                        cmds.push(hide(model));
                    }
                    SessionCmd::batch(cmds)
                }
                RunDisposition::Failure { .. } => {
                    // The overlay stays open so the failure is visible.
                    let message = failure_error(&class, &command, &disposition)
                        .map_or_else(|| format!("{class} action failed"), |e| e.to_string());
                    let n = model.push_notification(NotificationLevel::Error, message);
                    SessionCmd::Notify(n)
                }
            }
        }
    }
}

/// Marker value identifying the item that ran `command`.
fn marker_token_for(model: &SessionModel, command: &str) -> Option<String> {
    let rule = model.settings.marker_match;
    model
        .selection
        .items()
        .iter()
        .find(|item| item.command == command)
        .map(|item| item.marker_token(rule).to_string())
        .filter(|token| !token.is_empty())
}
