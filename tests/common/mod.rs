#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_ovl") {
        return PathBuf::from(path);
    }

    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join("ovl"));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve ovl binary path for integration test"),
    }
}

/// A scratch directory holding a config file, a snapshot payload, and
/// every path the binary may write to.
pub struct Fixture {
    pub dir: tempfile::TempDir,
}

pub const ITEMS_JSON: &str = r##"{
  "modes": [
    {"name": "Rainbow", "command": "true rainbow"},
    {"name": "Static", "command": "true static"},
    {"name": "Off", "command": "true off"}
  ],
  "colors": {"color1": "#ff0000"},
  "brightness": 70
}"##;

impl Fixture {
    pub fn new(items_json: &str) -> Self {
        let dir = tempfile::tempdir().expect("create fixture dir");
        fs::write(dir.path().join("items.json"), items_json).expect("write items");
        let fixture = Self { dir };
        fixture.write_config("");
        fixture
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn config_path(&self) -> PathBuf {
        self.path("config.toml")
    }

    /// Base config for the modes profile plus `extra` TOML appended.
    pub fn write_config(&self, extra: &str) {
        let root = self.dir.path().display();
        let config = format!(
            r#"
[launcher]
profile = "modes"
orientation = "linear"

[snapshot]
program = "sh"
args = ["-c", "cat items.json"]
working_dir = "{root}"

[actions.mode-switch]
settle_ms = 0
signature = ""
working_dir = "{root}"

[persistence]
marker_file = "{root}/sequence.txt"
setting_file = "{root}/brightness.txt"
debounce_ms = 50

[paths]
pidfile = "{root}/ovl.pid"
jsonl_log = "{root}/activity.jsonl"
jsonl_fallback = "{root}/fallback.jsonl"
{extra}
"#
        );
        fs::write(self.config_path(), config).expect("write config");
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(resolve_bin_path());
        command
            .arg("--config")
            .arg(self.config_path())
            .args(args)
            .env("HOME", self.dir.path())
            .env("XDG_STATE_HOME", self.path("state"))
            .env("XDG_CONFIG_HOME", self.path("xdg"))
            .env("RUST_BACKTRACE", "1");
        for var in ["OVL_PROFILE", "OVL_JSONL_LOG", "OVL_OUTPUT_FORMAT"] {
            command.env_remove(var);
        }
        command
    }

    pub fn run(&self, case_name: &str, args: &[&str]) -> CmdResult {
        let output = self
            .command(args)
            .stdin(Stdio::null())
            .output()
            .expect("execute ovl command");
        record(case_name, args, output.status, &output.stdout, &output.stderr)
    }

    pub fn spawn(&self, args: &[&str]) -> Child {
        self.command(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn ovl")
    }

    /// Activity log lines whose `event` equals `event`.
    pub fn log_events(&self, event: &str) -> Vec<serde_json::Value> {
        let raw = fs::read_to_string(self.path("activity.jsonl")).unwrap_or_default();
        raw.lines()
            .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
            .filter(|v| v["event"] == event)
            .collect()
    }
}

fn record(
    case_name: &str,
    args: &[&str],
    status: ExitStatus,
    stdout: &[u8],
    stderr: &[u8],
) -> CmdResult {
    let root = std::env::temp_dir().join("ovl-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");
    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));

    let stdout = String::from_utf8_lossy(stdout).to_string();
    let stderr = String::from_utf8_lossy(stderr).to_string();
    let log_content = format!(
        "case={case_name}\nargs={args:?}\nstatus={status}\n----- stdout -----\n{stdout}\n----- stderr -----\n{stderr}\n"
    );
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status,
        stdout,
        stderr,
        log_path,
    }
}

/// Poll `cond` every 20 ms until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    cond()
}

pub fn wait_for_file(path: &Path, timeout: Duration) -> bool {
    wait_for(timeout, || path.exists())
}
