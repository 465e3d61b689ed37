//! Terminal host for the session: key routing, raw-mode guard, and the
//! reader thread feeding host events into the session loop.

pub mod input;
pub mod terminal_guard;

use std::thread;

use crossbeam_channel::Sender;
use crossterm::event;

use crate::core::errors::{OvlError, Result};
use crate::daemon::loop_main::HostEvent;

/// Spawn the `ovl-keys` reader thread. It exits when the terminal stops
/// delivering events or the session loop has dropped its receiver; it is not
/// joined, since a blocking read cannot be interrupted.
pub fn spawn_key_reader(tx: Sender<HostEvent>) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("ovl-keys".to_string())
        .spawn(move || {
            while let Ok(ev) = event::read() {
                if let Some(host_event) = input::map_event(&ev)
                    && tx.send(host_event).is_err()
                {
                    return;
                }
            }
        })
        .map_err(|e| OvlError::Runtime {
            details: format!("failed to spawn key reader thread: {e}"),
        })
}
