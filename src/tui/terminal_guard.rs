//! RAII terminal lifecycle guard backed by crossterm.
//!
//! [`TerminalGuard`] enables raw mode (plus mouse capture and focus
//! reporting) on construction and
//! restores the terminal on [`Drop`], including during panics: a panic hook
//! restores the terminal before the panic message is printed.

use std::io::{self, Write};
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};

use crossterm::event::{
    DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture,
};
use crossterm::execute;
use crossterm::terminal;

/// Raw mode is active; checked by the panic hook.
static RAW_MODE_ACTIVE: AtomicBool = AtomicBool::new(false);

const CURSOR_SHOW: &[u8] = b"\x1b[?25h";

pub struct TerminalGuard {
    hook_installed: bool,
}

impl TerminalGuard {
    /// Enter raw mode with mouse capture and focus reporting, and install
    /// the restore hook.
    ///
    /// # Errors
    /// Returns I/O errors if the terminal cannot be put into raw mode.
    pub fn new() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        RAW_MODE_ACTIVE.store(true, Ordering::SeqCst);
        // Both are optional; wheel and focus events just won't arrive.
        let _ = execute!(io::stderr(), EnableMouseCapture, EnableFocusChange);

        let prev = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            restore_terminal_best_effort();
            prev(info);
        }));

        Ok(Self {
            hook_installed: true,
        })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if self.hook_installed {
            let _ = panic::take_hook();
        }
        restore_terminal_best_effort();
    }
}

/// Safe to call repeatedly; only the first call after entering raw mode acts.
fn restore_terminal_best_effort() {
    if RAW_MODE_ACTIVE.swap(false, Ordering::SeqCst) {
        let mut err = io::stderr();
        let _ = execute!(err, DisableMouseCapture, DisableFocusChange);
        let _ = terminal::disable_raw_mode();
        let _ = err.write_all(CURSOR_SHOW);
        let _ = err.flush();
    }
}
