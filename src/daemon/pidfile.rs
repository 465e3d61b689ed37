//! Instance pidfile: written by `ovl run`, read by `ovl toggle`/`ovl refresh`.

#![allow(missing_docs)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::errors::{OvlError, Result};
use crate::persist::atomic_write;

/// Owned pidfile; removed again on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Record the current process id at `path`, creating parent directories.
    ///
    /// A pidfile naming a live process is an error; a stale one is replaced.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Ok(pid) = read_pid(path)
            && pid != std::process::id()
            && process_alive(pid)
        {
            return Err(OvlError::Runtime {
                details: format!("another instance is running (pid {pid}, {})", path.display()),
            });
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| OvlError::io(parent, e))?;
        }
        atomic_write(path, format!("{}\n", std::process::id()).as_bytes())
            .map_err(|e| OvlError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        // Only remove the file if it still names us.
        if read_pid(&self.path).is_ok_and(|pid| pid == std::process::id()) {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Pid recorded at `path`.
pub fn read_pid(path: &Path) -> Result<u32> {
    let raw = fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => OvlError::NoInstance {
            details: format!("no pidfile at {}", path.display()),
        },
        _ => OvlError::io(path, e),
    })?;
    raw.trim().parse().map_err(|_| OvlError::NoInstance {
        details: format!("pidfile {} does not hold a pid", path.display()),
    })
}

/// Which request to deliver to a running instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceRequest {
    Toggle,
    Refresh,
    Quit,
}

/// Signal the instance named by the pidfile at `path`; returns its pid.
#[cfg(unix)]
pub fn signal_instance(path: &Path, request: InstanceRequest) -> Result<u32> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let pid = read_pid(path)?;
    let raw = i32::try_from(pid).map_err(|_| OvlError::NoInstance {
        details: format!("pid {pid} out of range"),
    })?;
    let signal = match request {
        InstanceRequest::Toggle => Signal::SIGUSR1,
        InstanceRequest::Refresh => Signal::SIGHUP,
        InstanceRequest::Quit => Signal::SIGTERM,
    };
    kill(Pid::from_raw(raw), signal).map_err(|errno| match errno {
        nix::errno::Errno::ESRCH => OvlError::NoInstance {
            details: format!("pid {pid} from {} is not running", path.display()),
        },
        other => OvlError::Runtime {
            details: format!("failed to signal pid {pid}: {other}"),
        },
    })?;
    Ok(pid)
}

#[cfg(not(unix))]
pub fn signal_instance(path: &Path, _request: InstanceRequest) -> Result<u32> {
    Err(OvlError::NoInstance {
        details: format!("signalling {} is unsupported on this platform", path.display()),
    })
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    i32::try_from(pid).is_ok_and(|raw| {
        !matches!(kill(Pid::from_raw(raw), None), Err(nix::errno::Errno::ESRCH))
    })
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_writes_and_drop_removes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/ovl.pid");
        {
            let pidfile = PidFile::acquire(&path).unwrap();
            assert_eq!(pidfile.path(), path);
            assert_eq!(read_pid(&path).unwrap(), std::process::id());
        }
        assert!(!path.exists());
    }

    #[test]
    fn stale_pidfile_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ovl.pid");
        // Pid max on Linux is below this, so nothing can be running there.
        fs::write(&path, "4194304999\n").unwrap();
        let _pidfile = PidFile::acquire(&path).unwrap();
        assert_eq!(read_pid(&path).unwrap(), std::process::id());
    }

    #[test]
    fn missing_pidfile_is_no_instance() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_pid(&dir.path().join("absent.pid")).unwrap_err();
        assert_eq!(err.code(), "OVL-5004");
    }

    #[test]
    fn garbage_pidfile_is_no_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ovl.pid");
        fs::write(&path, "not a pid").unwrap();
        assert!(matches!(read_pid(&path), Err(OvlError::NoInstance { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn signalling_a_dead_pid_reports_no_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ovl.pid");
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        fs::write(&path, format!("{pid}\n")).unwrap();
        let err = signal_instance(&path, InstanceRequest::Toggle).unwrap_err();
        assert!(matches!(err, OvlError::NoInstance { .. }), "{err}");
    }
}
