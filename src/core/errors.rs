//! OVL-prefixed error types with structured error codes.
//!
//! Three domain categories ([`FetchError`], [`ActionError`],
//! [`PersistenceError`]) are always recovered locally by the session; the
//! top-level [`OvlError`] covers configuration, IO, and runtime plumbing.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, OvlError>;

/// Top-level error type for the overlay launcher.
#[derive(Debug, Error)]
pub enum OvlError {
    #[error("[OVL-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[OVL-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[OVL-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("[OVL-5001] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[OVL-5002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[OVL-5004] no running instance: {details}")]
    NoInstance { details: String },

    #[error("[OVL-5900] runtime failure: {details}")]
    Runtime { details: String },
}

/// Snapshot fetch failures. The caller keeps its last good snapshot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("[OVL-2001] malformed snapshot payload: {details}")]
    MalformedPayload { details: String },

    #[error("[OVL-2002] snapshot program failed ({status}): {details}")]
    ProcessFailed { status: String, details: String },
}

/// Action dispatch failures. Reported to listeners, never fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("[OVL-3001] failed to start {class} action `{command}`: {details}")]
    SpawnFailed {
        class: String,
        command: String,
        details: String,
    },

    #[error("[OVL-3002] {class} action `{command}` exited with {status}")]
    NonZeroExit {
        class: String,
        command: String,
        status: String,
    },
}

/// Durable write failures. Logged; the in-memory value stays authoritative.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("[OVL-4001] failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OvlError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "OVL-1001",
            Self::MissingConfig { .. } => "OVL-1002",
            Self::ConfigParse { .. } => "OVL-1003",
            Self::Fetch(err) => err.code(),
            Self::Action(err) => err.code(),
            Self::Persistence(err) => err.code(),
            Self::Serialization { .. } => "OVL-5001",
            Self::Io { .. } => "OVL-5002",
            Self::NoInstance { .. } => "OVL-5004",
            Self::Runtime { .. } => "OVL-5900",
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl FetchError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MalformedPayload { .. } => "OVL-2001",
            Self::ProcessFailed { .. } => "OVL-2002",
        }
    }

    /// Shorthand for a malformed payload with a formatted reason.
    #[must_use]
    pub fn malformed(details: impl Into<String>) -> Self {
        Self::MalformedPayload {
            details: details.into(),
        }
    }
}

impl ActionError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::SpawnFailed { .. } => "OVL-3001",
            Self::NonZeroExit { .. } => "OVL-3002",
        }
    }

    /// Action class the failure belongs to.
    #[must_use]
    pub fn class(&self) -> &str {
        match self {
            Self::SpawnFailed { class, .. } | Self::NonZeroExit { class, .. } => class,
        }
    }
}

impl PersistenceError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::WriteFailed { .. } => "OVL-4001",
        }
    }

    #[must_use]
    pub fn write_failed(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::WriteFailed {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for OvlError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for OvlError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
