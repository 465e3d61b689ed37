#![forbid(unsafe_code)]

//! Overlay launcher (`ovl`): the engine behind two desktop overlays, a game
//! library launcher and a hardware-control (RGB) mode switcher.
//!
//! Four cooperating parts:
//! 1. **Snapshot fetcher**: runs a source program, parses its JSON into items
//! 2. **Selection model**: linear or grid cursor over the items
//! 3. **Action dispatcher**: at most one live run per action class
//! 4. **Persistence**: debounced level writes and the active-selection marker
//!
//! The [`session`] reducer ties them together; [`daemon`] hosts it.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use overlay_launcher::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use overlay_launcher::core::config::Config;
//! use overlay_launcher::selection::SelectionModel;
//! ```

pub mod prelude;

pub mod core;
pub mod daemon;
pub mod dispatch;
pub mod logger;
pub mod persist;
pub mod selection;
pub mod session;
pub mod snapshot;
#[cfg(feature = "cli")]
pub mod tui;
