//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use overlay_launcher::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, LauncherProfile, Orientation};
pub use crate::core::errors::{ActionError, FetchError, OvlError, PersistenceError, Result};

// Snapshot
pub use crate::snapshot::{CommandSource, Item, Snapshot, SnapshotFetcher, SnapshotSource};

// Selection
pub use crate::selection::SelectionModel;

// Dispatch
pub use crate::dispatch::{
    ActionDispatcher, ActionEvent, ChildOutput, ProcessControl, SystemProcessControl,
};

// Persistence
pub use crate::persist::{Debouncer, FileSettingStore, MarkerFile, PersistWriter, SettingStore};

// Session
pub use crate::daemon::loop_main::{HostEvent, SessionDeps, SessionLoop};
pub use crate::daemon::sink::{SessionView, TerminalSink, VisibilitySink};
pub use crate::session::{SessionCmd, SessionInput, SessionModel, SessionMsg, SessionState};
