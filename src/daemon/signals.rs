//! Signal handling: SIGTERM/SIGINT shutdown, SIGHUP snapshot refresh, and
//! SIGUSR1 visibility toggle.
//!
//! Uses the `signal-hook` crate for safe signal registration. The session loop
//! polls `SignalHandler` flags each iteration rather than blocking on signals.
//! Other `ovl` invocations reach a running instance through these signals.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// ──────────────────── signal handler ────────────────────

/// Thread-safe signal state shared between the signal handler and the loop.
///
/// All flags use `Ordering::Relaxed`; the loop polls them every iteration.
#[derive(Clone)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
    refresh_flag: Arc<AtomicBool>,
    toggle_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create a new handler and register OS signal hooks.
    ///
    /// Registration is best-effort; failures are reported on stderr but not fatal.
    #[must_use]
    pub fn new() -> Self {
        let handler = Self::unregistered();
        handler.register_signals();
        handler
    }

    /// Handler driven only by the `request_*` methods.
    #[must_use]
    pub fn unregistered() -> Self {
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            refresh_flag: Arc::new(AtomicBool::new(false)),
            toggle_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check whether a shutdown has been requested.
    pub fn should_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    /// Check (and clear) whether a snapshot refresh has been requested.
    pub fn should_refresh(&self) -> bool {
        self.refresh_flag.swap(false, Ordering::Relaxed)
    }

    /// Check (and clear) whether a visibility toggle has been requested.
    pub fn should_toggle(&self) -> bool {
        self.toggle_flag.swap(false, Ordering::Relaxed)
    }

    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }

    pub fn request_refresh(&self) {
        self.refresh_flag.store(true, Ordering::Relaxed);
    }

    pub fn request_toggle(&self) {
        self.toggle_flag.store(true, Ordering::Relaxed);
    }

    #[cfg(feature = "signals")]
    fn register_signals(&self) {
        use signal_hook::consts::{SIGINT, SIGTERM};

        // SIGTERM / SIGINT -> shutdown
        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[OVL-SIGNAL] failed to register SIGTERM: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[OVL-SIGNAL] failed to register SIGINT: {e}");
        }

        #[cfg(unix)]
        {
            use signal_hook::consts::{SIGHUP, SIGUSR1};
            if let Err(e) = signal_hook::flag::register(SIGHUP, Arc::clone(&self.refresh_flag)) {
                eprintln!("[OVL-SIGNAL] failed to register SIGHUP: {e}");
            }
            if let Err(e) = signal_hook::flag::register(SIGUSR1, Arc::clone(&self.toggle_flag)) {
                eprintln!("[OVL-SIGNAL] failed to register SIGUSR1: {e}");
            }
        }
    }

    #[cfg(not(feature = "signals"))]
    fn register_signals(&self) {}
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

// ──────────────────── tests ────────────────────
