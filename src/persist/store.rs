//! Durable storage for the level setting and the active-selection marker.
//!
//! Both files hold a single bare value so external scripts can read and
//! write them too. Writes go through [`atomic_write`]: temp file, fsync,
//! rename over the target. Readers never observe a partial value.

#![allow(missing_docs)]

use std::ffi::OsString;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use crate::core::errors::PersistenceError;

/// Atomic save: temp file in the same directory → fsync → rename.
///
/// Creates parent directories as needed.
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = tmp_path_for(path);
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(|| OsString::from("ovl"), ToOwned::to_owned);
    name.push(".tmp");
    path.with_file_name(name)
}

// ──────────────────── level setting ────────────────────

/// Where the debounced level value ends up.
pub trait SettingStore: Send {
    /// Value persisted by a previous session, if readable.
    fn read(&self) -> Option<i64>;

    fn write(&mut self, value: i64) -> Result<(), PersistenceError>;

    /// Short human label for logs.
    fn describe(&self) -> String;
}

/// Bare integer in a text file (e.g. `brightness.txt`).
#[derive(Debug, Clone)]
pub struct FileSettingStore {
    path: PathBuf,
}

impl FileSettingStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingStore for FileSettingStore {
    fn read(&self) -> Option<i64> {
        let raw = fs::read_to_string(&self.path).ok()?;
        raw.trim().parse().ok()
    }

    fn write(&mut self, value: i64) -> Result<(), PersistenceError> {
        atomic_write(&self.path, value.to_string().as_bytes())
            .map_err(|source| PersistenceError::write_failed(&self.path, source))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// ──────────────────── selection marker ────────────────────

/// First line of a text file naming the active item.
#[derive(Debug, Clone)]
pub struct MarkerFile {
    path: PathBuf,
}

impl MarkerFile {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Trimmed first line. A missing file or blank line is `Ok(None)`.
    pub fn read(&self) -> io::Result<Option<String>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let first_line = match memchr::memchr(b'\n', &raw) {
            Some(end) => &raw[..end],
            None => &raw[..],
        };
        let marker = String::from_utf8_lossy(first_line).trim().to_string();
        Ok(Some(marker).filter(|m| !m.is_empty()))
    }

    pub fn write(&self, marker: &str) -> Result<(), PersistenceError> {
        atomic_write(&self.path, format!("{marker}\n").as_bytes())
            .map_err(|source| PersistenceError::write_failed(&self.path, source))
    }
}
