//! Key, mouse and focus routing for the terminal host.
//!
//! The terminal window is the overlay: losing focus hides it and regaining
//! focus shows it again.

#![allow(missing_docs)]

use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEvent, MouseEventKind,
};

use crate::daemon::loop_main::HostEvent;
use crate::session::model::SessionInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelpBinding {
    pub keys: &'static str,
    pub description: &'static str,
}

const HELP: [HelpBinding; 10] = [
    HelpBinding { keys: "←↑↓→ / hjkl", description: "move selection" },
    HelpBinding { keys: "Enter / Space", description: "run selected item" },
    HelpBinding { keys: "1-9", description: "select item directly" },
    HelpBinding { keys: "+ / -", description: "adjust level" },
    HelpBinding { keys: "r / F5", description: "refresh snapshot" },
    HelpBinding { keys: "t", description: "toggle overlay" },
    HelpBinding { keys: "Esc", description: "close overlay" },
    HelpBinding { keys: "q / Ctrl-C", description: "quit" },
    HelpBinding { keys: "wheel", description: "scroll selection" },
    HelpBinding { keys: "focus in / out", description: "show / hide overlay" },
];

#[must_use]
pub const fn help_bindings() -> &'static [HelpBinding] {
    &HELP
}

/// Route any terminal event; resize and paste events are ignored.
#[must_use]
pub fn map_event(event: &Event) -> Option<HostEvent> {
    match event {
        Event::Key(key) => map_key_event(key),
        Event::Mouse(mouse) => map_mouse_event(mouse),
        Event::FocusGained => Some(HostEvent::Show),
        Event::FocusLost => Some(HostEvent::Hide),
        _ => None,
    }
}

#[must_use]
pub fn map_key_event(key: &KeyEvent) -> Option<HostEvent> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c' | 'd') => Some(HostEvent::Quit),
            _ => None,
        };
    }

    let input = match key.code {
        KeyCode::Up | KeyCode::Char('k') => SessionInput::Up,
        KeyCode::Down | KeyCode::Char('j') => SessionInput::Down,
        KeyCode::Left | KeyCode::Char('h') => SessionInput::Left,
        KeyCode::Right | KeyCode::Char('l') => SessionInput::Right,
        KeyCode::Enter | KeyCode::Char(' ') => SessionInput::Commit,
        KeyCode::Esc => SessionInput::Close,
        KeyCode::Char('+' | '=') => SessionInput::LevelUp,
        KeyCode::Char('-' | '_') => SessionInput::LevelDown,
        KeyCode::Char(c @ '1'..='9') => {
            let digit = c.to_digit(10).map_or(1, |d| d as usize);
            SessionInput::Point(digit - 1)
        }
        KeyCode::Char('r') | KeyCode::F(5) => return Some(HostEvent::Refresh),
        KeyCode::Char('t') => return Some(HostEvent::Toggle),
        KeyCode::Char('q') => return Some(HostEvent::Quit),
        _ => return None,
    };
    Some(HostEvent::Input(input))
}

#[must_use]
pub fn map_mouse_event(mouse: &MouseEvent) -> Option<HostEvent> {
    match mouse.kind {
        MouseEventKind::ScrollUp => Some(HostEvent::Input(SessionInput::Wheel(-1))),
        MouseEventKind::ScrollDown => Some(HostEvent::Input(SessionInput::Wheel(1))),
        _ => None,
    }
}
