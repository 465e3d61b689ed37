//! Persistence: debounced level writes and the selection marker file.

pub mod debounce;
pub mod store;
pub mod writer;

pub use debounce::Debouncer;
pub use store::{FileSettingStore, MarkerFile, SettingStore, atomic_write};
pub use writer::PersistWriter;
