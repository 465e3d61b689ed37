//! Session controller: model, pure update function, and their properties.

pub mod model;
pub mod update;

#[cfg(test)]
mod test_properties;

pub use model::{
    LevelBounds, Notification, NotificationLevel, SessionCmd, SessionInput, SessionModel,
    SessionMsg, SessionSettings, SessionState,
};
pub use update::{init, update};
