//! Process-control seam: detached spawning, group termination, and
//! command-line signature sweeps.
//!
//! [`SystemProcessControl`] talks to the OS (`sh -c`, `killpg`, `/proc`);
//! tests substitute an in-memory implementation.
//!
//! Output of a [`ChildOutput::Capture`] child is kept as a short tail that
//! the reaping worker collects after `wait`. Discarded children get
//! `/dev/null`, so one that outlives the launcher never writes into a
//! closed pipe.

#![allow(missing_docs)]

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::{Mutex, RwLock};
use regex::Regex;

/// Lines kept from a captured child.
const OUTPUT_TAIL_LINES: usize = 20;
/// Longer lines are cut to this many characters.
const OUTPUT_LINE_MAX: usize = 512;
/// How long `output()` waits for the readers to hit EOF after the exit.
const OUTPUT_DRAIN: Duration = Duration::from_millis(200);

/// How a child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    Code(i32),
    Signaled(i32),
}

impl ProcessExit {
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Code(0))
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit code {code}"),
            Self::Signaled(sig) => write!(f, "signal {sig}"),
        }
    }
}

/// What happens to a child's stdout and stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildOutput {
    Discard,
    /// Keep the last lines of both streams for the activity log.
    Capture,
}

/// A spawned child, owned only by the worker thread that reaps it.
pub trait RunningProcess: Send {
    fn pid(&self) -> u32;

    /// Block until the child exits.
    fn wait(&mut self) -> io::Result<ProcessExit>;

    /// Captured output tail, oldest line first. Empty unless spawned with
    /// [`ChildOutput::Capture`]; call after `wait`.
    fn output(&mut self) -> Vec<String> {
        Vec::new()
    }
}

/// OS operations the dispatcher needs.
pub trait ProcessControl: Send + Sync {
    /// Start `command` via the shell in its own process group, stdin closed.
    /// A `cwd` that is not an existing directory fails the spawn.
    fn spawn_detached(
        &self,
        command: &str,
        cwd: Option<&Path>,
        output: ChildOutput,
    ) -> io::Result<Box<dyn RunningProcess>>;

    /// SIGTERM the process group led by `pid`. Returns whether a signal was
    /// delivered; an already-gone group is not an error.
    fn terminate_group(&self, pid: u32) -> bool;

    /// SIGTERM every process whose command line matches `signature`.
    /// Returns how many were signalled.
    fn terminate_matching(&self, signature: &str) -> usize;
}

// ──────────────────── system implementation ────────────────────

/// Real process control for Unix hosts.
#[derive(Debug, Default)]
pub struct SystemProcessControl {
    signature_cache: RwLock<HashMap<String, Regex>>,
}

impl SystemProcessControl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn compiled(&self, signature: &str) -> Option<Regex> {
        if let Some(re) = self.signature_cache.read().get(signature) {
            return Some(re.clone());
        }
        match Regex::new(signature) {
            Ok(re) => {
                self.signature_cache
                    .write()
                    .insert(signature.to_string(), re.clone());
                Some(re)
            }
            Err(e) => {
                eprintln!("[OVL-DISPATCH] invalid signature {signature:?}: {e}");
                None
            }
        }
    }
}

struct ChildProcess {
    child: Child,
    tail: Option<OutputTail>,
}

impl RunningProcess for ChildProcess {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn wait(&mut self) -> io::Result<ProcessExit> {
        let status = self.child.wait()?;
        if let Some(code) = status.code() {
            return Ok(ProcessExit::Code(code));
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(sig) = status.signal() {
                return Ok(ProcessExit::Signaled(sig));
            }
        }
        Ok(ProcessExit::Code(-1))
    }

    fn output(&mut self) -> Vec<String> {
        self.tail.take().map(OutputTail::collect).unwrap_or_default()
    }
}

// ──────────────────── output capture ────────────────────

/// Bounded line tail filled by one reader thread per stream.
struct OutputTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    /// Disconnects once every reader has returned.
    done: Receiver<()>,
}

impl OutputTail {
    fn attach(child: &mut Child) -> Self {
        let lines = Arc::new(Mutex::new(VecDeque::with_capacity(OUTPUT_TAIL_LINES)));
        let (done_tx, done) = bounded(0);
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, "stdout", Arc::clone(&lines), done_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, "stderr", Arc::clone(&lines), done_tx);
        }
        Self { lines, done }
    }

    fn collect(self) -> Vec<String> {
        // A grandchild holding the pipe open only costs the drain timeout.
        let deadline = Instant::now() + OUTPUT_DRAIN;
        while self.done.recv_deadline(deadline).is_ok() {}
        self.lines.lock().drain(..).collect()
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    stream: R,
    label: &'static str,
    lines: Arc<Mutex<VecDeque<String>>>,
    done: Sender<()>,
) {
    let spawned = thread::Builder::new()
        .name(format!("ovl-action-{label}"))
        .spawn(move || {
            let _done = done;
            let mut reader = BufReader::new(stream);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => push_line(&lines, label, &buf),
                }
            }
        });
    if let Err(e) = spawned {
        eprintln!("[OVL-DISPATCH] output reader for {label} not started: {e}");
    }
}

fn push_line(lines: &Mutex<VecDeque<String>>, label: &str, raw: &[u8]) {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_end_matches(['\n', '\r']);
    if text.is_empty() {
        return;
    }
    let clipped: String = text.chars().take(OUTPUT_LINE_MAX).collect();
    let mut lines = lines.lock();
    if lines.len() == OUTPUT_TAIL_LINES {
        lines.pop_front();
    }
    lines.push_back(format!("{label}: {clipped}"));
}

impl ProcessControl for SystemProcessControl {
    fn spawn_detached(
        &self,
        command: &str,
        cwd: Option<&Path>,
        output: ChildOutput,
    ) -> io::Result<Box<dyn RunningProcess>> {
        if command.trim().is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command"));
        }

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).stdin(Stdio::null());
        match output {
            ChildOutput::Discard => cmd.stdout(Stdio::null()).stderr(Stdio::null()),
            ChildOutput::Capture => cmd.stdout(Stdio::piped()).stderr(Stdio::piped()),
        };
        if let Some(dir) = cwd {
            if !dir.is_dir() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("working directory {} is not a directory", dir.display()),
                ));
            }
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn()?;
        let tail = (output == ChildOutput::Capture).then(|| OutputTail::attach(&mut child));
        Ok(Box::new(ChildProcess { child, tail }))
    }

    #[cfg(unix)]
    fn terminate_group(&self, pid: u32) -> bool {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        match killpg(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) => true,
            Err(nix::errno::Errno::ESRCH) => false,
            Err(e) => {
                eprintln!("[OVL-DISPATCH] killpg({pid}) failed: {e}");
                false
            }
        }
    }

    #[cfg(not(unix))]
    fn terminate_group(&self, _pid: u32) -> bool {
        false
    }

    #[cfg(unix)]
    fn terminate_matching(&self, signature: &str) -> usize {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Some(re) = self.compiled(signature) else {
            return 0;
        };
        let own_pid = std::process::id();
        let mut signalled = 0;
        for (pid, cmdline) in scan_cmdlines(Path::new("/proc")) {
            if pid == own_pid || !re.is_match(&cmdline) {
                continue;
            }
            let Ok(raw) = i32::try_from(pid) else {
                continue;
            };
            if kill(Pid::from_raw(raw), Signal::SIGTERM).is_ok() {
                signalled += 1;
            }
        }
        signalled
    }

    #[cfg(not(unix))]
    fn terminate_matching(&self, _signature: &str) -> usize {
        0
    }
}

/// `(pid, command line)` for every readable process under `proc_root`.
///
/// Arguments are NUL-separated in `/proc/<pid>/cmdline`; they are joined
/// with spaces. Kernel threads (empty cmdline) are skipped.
pub(crate) fn scan_cmdlines(proc_root: &Path) -> Vec<(u32, String)> {
    let Ok(entries) = fs::read_dir(proc_root) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for entry in entries.flatten() {
        let Some(pid) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u32>().ok())
        else {
            continue;
        };
        let Ok(raw) = fs::read(entry.path().join("cmdline")) else {
            continue;
        };
        let cmdline = join_cmdline(&raw);
        if !cmdline.is_empty() {
            out.push((pid, cmdline));
        }
    }
    out
}

fn join_cmdline(raw: &[u8]) -> String {
    let mut parts = Vec::new();
    let mut start = 0;
    for end in memchr::memchr_iter(0, raw) {
        if end > start {
            parts.push(String::from_utf8_lossy(&raw[start..end]));
        }
        start = end + 1;
    }
    if start < raw.len() {
        parts.push(String::from_utf8_lossy(&raw[start..]));
    }
    parts.join(" ")
}
