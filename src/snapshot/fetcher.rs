//! Snapshot fetcher: runs the external data program off the control thread.
//!
//! Each request gets a generation number. Results come back over a channel
//! as [`FetchCompleted`]; the receiver uses a [`GenerationGate`] so a slow,
//! older fetch can never overwrite a newer snapshot.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::core::config::SnapshotConfig;
use crate::core::errors::{FetchError, OvlError, Result};
use crate::snapshot::model::{Snapshot, parse_payload};

/// Maximum stderr excerpt carried in a `ProcessFailed` error.
const STDERR_EXCERPT: usize = 512;

/// Anything that can produce one snapshot synchronously.
pub trait SnapshotSource: Send + Sync {
    fn fetch(&self) -> std::result::Result<Snapshot, FetchError>;

    /// Short human label for logs.
    fn describe(&self) -> String;
}

/// Snapshot source backed by an external program printing JSON on stdout.
#[derive(Debug, Clone)]
pub struct CommandSource {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandSource {
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>, working_dir: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir,
        }
    }

    #[must_use]
    pub fn from_config(config: &SnapshotConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            config.working_dir.clone(),
        )
    }
}

impl SnapshotSource for CommandSource {
    fn fetch(&self) -> std::result::Result<Snapshot, FetchError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = self.working_dir.as_ref().filter(|d| d.is_dir()) {
            cmd.current_dir(dir);
        }

        // Process exit is the completion signal; stdout is buffered in full.
        let output = cmd.output().map_err(|e| FetchError::ProcessFailed {
            status: "spawn".to_string(),
            details: format!("{}: {e}", self.program),
        })?;

        let stdout_empty = output.stdout.iter().all(u8::is_ascii_whitespace);
        if !output.status.success() && stdout_empty {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut details = stderr.trim().to_string();
            if details.len() > STDERR_EXCERPT {
                let mut cut = STDERR_EXCERPT;
                while !details.is_char_boundary(cut) {
                    cut -= 1;
                }
                details.truncate(cut);
            }
            return Err(FetchError::ProcessFailed {
                status: output.status.to_string(),
                details,
            });
        }

        parse_payload(&output.stdout)
    }

    fn describe(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Result of one fetch, delivered to the control thread.
#[derive(Debug, Clone)]
pub struct FetchCompleted {
    pub generation: u64,
    pub result: std::result::Result<Snapshot, FetchError>,
    pub elapsed: Duration,
}

/// Issues fetches on worker threads, tagging each with a generation.
pub struct SnapshotFetcher {
    source: Arc<dyn SnapshotSource>,
    tx: Sender<FetchCompleted>,
    next_generation: u64,
}

impl SnapshotFetcher {
    pub fn new(source: Arc<dyn SnapshotSource>, tx: Sender<FetchCompleted>) -> Self {
        Self {
            source,
            tx,
            next_generation: 1,
        }
    }

    /// Start a fetch in the background and return its generation.
    ///
    /// Safe to call while earlier fetches are still running; their results
    /// arrive with lower generations.
    pub fn request(&mut self) -> Result<u64> {
        let generation = self.next_generation;
        self.next_generation += 1;

        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        thread::Builder::new()
            .name(format!("ovl-fetch-{generation}"))
            .spawn(move || {
                let started = Instant::now();
                let result = source.fetch();
                // Receiver gone means the session is shutting down.
                let _ = tx.send(FetchCompleted {
                    generation,
                    result,
                    elapsed: started.elapsed(),
                });
            })
            .map_err(|e| OvlError::Runtime {
                details: format!("failed to spawn fetch thread: {e}"),
            })?;

        Ok(generation)
    }

    #[must_use]
    pub fn describe(&self) -> String {
        self.source.describe()
    }
}

/// Tracks the newest applied generation; older results are rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationGate {
    last_applied: Option<u64>,
}

impl GenerationGate {
    /// Returns `true` and records `generation` if it is newer than anything
    /// applied so far.
    pub fn accept(&mut self, generation: u64) -> bool {
        match self.last_applied {
            Some(last) if generation <= last => false,
            _ => {
                self.last_applied = Some(generation);
                true
            }
        }
    }

    #[must_use]
    pub const fn last_applied(&self) -> Option<u64> {
        self.last_applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn sh(script: &str) -> CommandSource {
        CommandSource::new("sh", vec!["-c".to_string(), script.to_string()], None)
    }

    #[test]
    fn command_source_parses_stdout() {
        let src = sh(r#"printf '{"items":[{"name":"a","command":"run a"}]}'"#);
        let snap = src.fetch().expect("fetch");
        assert_eq!(snap.items.len(), 1);
        assert_eq!(snap.items[0].command, "run a");
    }

    #[test]
    fn nonzero_exit_without_output_is_process_failed() {
        let err = sh("echo boom >&2; exit 3").fetch().expect_err("should fail");
        match err {
            FetchError::ProcessFailed { status, details } => {
                assert!(status.contains('3'), "{status}");
                assert_eq!(details, "boom");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn nonzero_exit_with_output_is_still_parsed() {
        let snap = sh(r#"printf '{"games":[]}'; exit 1"#)
            .fetch()
            .expect("output should be parsed");
        assert!(snap.is_empty());
    }

    #[test]
    fn clean_exit_with_empty_output_is_malformed() {
        let err = sh("true").fetch().expect_err("should fail");
        assert!(matches!(err, FetchError::MalformedPayload { .. }));
    }

    #[test]
    fn missing_program_is_process_failed() {
        let src = CommandSource::new("/nonexistent/ovl-snapshot-source", Vec::new(), None);
        let err = src.fetch().expect_err("should fail");
        assert!(matches!(err, FetchError::ProcessFailed { ref status, .. } if status == "spawn"));
    }

    #[test]
    fn working_dir_is_applied() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("payload.json"), r#"{"modes":[{"name":"x"}]}"#)
            .expect("write");
        let src = CommandSource::new(
            "cat",
            vec!["payload.json".to_string()],
            Some(dir.path().to_path_buf()),
        );
        assert_eq!(src.fetch().expect("fetch").items[0].name, "x");
    }

    struct FixedSource(std::result::Result<Snapshot, FetchError>);

    impl SnapshotSource for FixedSource {
        fn fetch(&self) -> std::result::Result<Snapshot, FetchError> {
            self.0.clone()
        }

        fn describe(&self) -> String {
            "fixed".to_string()
        }
    }

    #[test]
    fn fetcher_delivers_results_with_increasing_generations() {
        let (tx, rx) = unbounded();
        let mut fetcher = SnapshotFetcher::new(Arc::new(FixedSource(Ok(Snapshot::default()))), tx);
        let first = fetcher.request().expect("request");
        let second = fetcher.request().expect("request");
        assert!(second > first);

        let mut seen: Vec<u64> = (0..2)
            .map(|_| {
                rx.recv_timeout(Duration::from_secs(5))
                    .expect("completion")
                    .generation
            })
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![first, second]);
    }

    #[test]
    fn generation_gate_rejects_stale_results() {
        let mut gate = GenerationGate::default();
        assert!(gate.accept(2));
        assert!(!gate.accept(1));
        assert!(!gate.accept(2));
        assert!(gate.accept(5));
        assert_eq!(gate.last_applied(), Some(5));
    }
}
