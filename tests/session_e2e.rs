//! Drives `SessionLoop` through the public library API with a real shell
//! snapshot source, real child processes, and files on disk.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, unbounded};

use parking_lot::Mutex;

use overlay_launcher::core::config::Config;
use overlay_launcher::core::errors::PersistenceError;
use overlay_launcher::daemon::loop_main::{HostEvent, SessionDeps, SessionLoop};
use overlay_launcher::daemon::signals::SignalHandler;
use overlay_launcher::daemon::sink::{SessionView, VisibilitySink};
use overlay_launcher::dispatch::SystemProcessControl;
use overlay_launcher::logger::activity::ActivityLoggerHandle;
use overlay_launcher::persist::{FileSettingStore, MarkerFile, SettingStore};
use overlay_launcher::session::{Notification, SessionInput, SessionState};
use overlay_launcher::snapshot::CommandSource;

#[derive(Default)]
struct Recorder {
    visible: Vec<bool>,
    notes: Vec<String>,
}

impl VisibilitySink for Recorder {
    fn set_visible(&mut self, visible: bool, _view: &SessionView<'_>) {
        self.visible.push(visible);
    }

    fn selection_changed(&mut self, _view: &SessionView<'_>) {}

    fn level_changed(&mut self, _level: i64, _view: &SessionView<'_>) {}

    fn notify(&mut self, notification: &Notification) {
        self.notes.push(notification.message.clone());
    }
}

/// File store that also counts its writes.
struct CountingStore {
    inner: FileSettingStore,
    writes: Arc<Mutex<Vec<i64>>>,
}

impl SettingStore for CountingStore {
    fn read(&self) -> Option<i64> {
        self.inner.read()
    }

    fn write(&mut self, value: i64) -> Result<(), PersistenceError> {
        self.writes.lock().push(value);
        self.inner.write(value)
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

/// Level and marker writes land from a background thread.
fn wait_for_contents(path: &Path, expected: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let found = fs::read_to_string(path).unwrap_or_default();
        if found.trim() == expected {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "{} holds {found:?}, expected {expected:?}",
            path.display()
        );
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn write_config(dir: &Path) -> Config {
    let root = dir.display();
    let path = dir.join("config.toml");
    fs::write(
        &path,
        format!(
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
debounce_ms = 40

[paths]
pidfile = "{root}/ovl.pid"
jsonl_log = "{root}/activity.jsonl"
"#
        ),
    )
    .unwrap();
    Config::load(Some(&path), None).unwrap()
}

struct Session {
    inner: SessionLoop<Recorder>,
    host: Sender<HostEvent>,
}

impl Session {
    fn start(config: &Config) -> Self {
        let setting = config
            .persistence
            .setting_file
            .clone()
            .map(|p| Box::new(FileSettingStore::new(p)) as Box<dyn SettingStore>);
        Self::start_with_store(config, setting)
    }

    fn start_with_store(config: &Config, setting: Option<Box<dyn SettingStore>>) -> Self {
        let (host, host_rx) = unbounded();
        let deps = SessionDeps {
            source: Arc::new(CommandSource::from_config(&config.snapshot)),
            control: Arc::new(SystemProcessControl::new()),
            setting,
            marker: config.persistence.marker_file.clone().map(MarkerFile::new),
            logger: ActivityLoggerHandle::disabled(),
            signals: SignalHandler::unregistered(),
        };
        let mut inner = SessionLoop::new(config, deps, Recorder::default(), host_rx);
        inner.start();
        Self { inner, host }
    }

    fn pump_until(&mut self, what: &str, done: impl Fn(&SessionLoop<Recorder>) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !done(&self.inner) {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            self.inner.pump(Duration::from_millis(20));
        }
    }

    fn input(&mut self, input: SessionInput) {
        self.host.send(HostEvent::Input(input)).unwrap();
        self.inner.pump(Duration::from_millis(50));
    }
}

#[test]
fn mode_switch_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("items.json"),
        r#"{"modes": [
            {"name": "Rainbow", "command": "echo rainbow > ran.txt; true rainbow"},
            {"name": "Static", "command": "echo static > ran.txt; true static"}
        ], "brightness": 55}"#,
    )
    .unwrap();
    fs::write(dir.path().join("sequence.txt"), "static\n").unwrap();
    let config = write_config(dir.path());

    let mut s = Session::start(&config);
    s.pump_until("reconciliation", |l| l.model().reconciled);
    assert_eq!(s.inner.model().selection.index(), Some(1));
    assert_eq!(s.inner.model().level, 55);

    s.input(SessionInput::Up);
    s.input(SessionInput::Commit);
    s.pump_until("mode switch to finish", |l| {
        l.model().state == SessionState::Hidden
    });
    assert_eq!(
        fs::read_to_string(dir.path().join("ran.txt")).unwrap().trim(),
        "rainbow"
    );
    assert_eq!(s.inner.sink().visible, vec![true, false]);
    assert!(s.inner.sink().notes.is_empty());
}

#[test]
fn failing_mode_switch_keeps_overlay_open() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("items.json"),
        r#"{"modes": [{"name": "Broken", "command": "exit 4"}]}"#,
    )
    .unwrap();
    let config = write_config(dir.path());

    let mut s = Session::start(&config);
    s.pump_until("ready", |l| l.model().is_visible());
    s.input(SessionInput::Commit);
    s.pump_until("failure notification", |l| !l.sink().notes.is_empty());
    assert!(s.inner.model().is_visible());
    assert!(s.inner.sink().notes[0].contains("OVL-3002"));
}

#[test]
fn level_changes_are_written_once_after_the_burst() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("items.json"),
        r#"{"modes": [{"name": "A", "command": "true a"}]}"#,
    )
    .unwrap();
    fs::write(dir.path().join("brightness.txt"), "80\n").unwrap();
    let mut config = write_config(dir.path());
    config.persistence.debounce_ms = 300;

    let mut s = Session::start(&config);
    s.pump_until("ready", |l| l.model().is_visible());
    assert_eq!(s.inner.model().level, 80);

    for _ in 0..4 {
        s.input(SessionInput::LevelDown);
    }
    assert_eq!(
        fs::read_to_string(dir.path().join("brightness.txt")).unwrap().trim(),
        "80"
    );
    s.pump_until("debounced write", |l| !l.model().level_debounce.is_pending());
    wait_for_contents(&dir.path().join("brightness.txt"), "60");
}

#[test]
fn closing_inside_the_window_writes_the_final_level_once() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("items.json"),
        r#"{"modes": [{"name": "A", "command": "true a"}]}"#,
    )
    .unwrap();
    fs::write(dir.path().join("brightness.txt"), "50\n").unwrap();
    let mut config = write_config(dir.path());
    config.persistence.debounce_ms = 5_000;
    let path = dir.path().join("brightness.txt");
    let writes = Arc::new(Mutex::new(Vec::new()));
    let store = CountingStore {
        inner: FileSettingStore::new(path.clone()),
        writes: Arc::clone(&writes),
    };

    let mut s = Session::start_with_store(&config, Some(Box::new(store)));
    s.pump_until("ready", |l| l.model().is_visible());
    s.input(SessionInput::LevelUp);
    s.input(SessionInput::LevelUp);
    assert!(s.inner.model().level_debounce.is_pending());

    s.input(SessionInput::Close);
    assert_eq!(s.inner.model().state, SessionState::Hidden);
    assert!(!s.inner.model().level_debounce.is_pending());
    wait_for_contents(&path, "60");

    // The flush cancelled the timer; no second write is pending.
    for _ in 0..5 {
        s.inner.pump(Duration::from_millis(20));
    }
    s.inner.stop("test");
    assert_eq!(*writes.lock(), vec![60]);
}

#[test]
fn marker_is_written_back_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("items.json"),
        r#"{"modes": [{"name": "Off", "command": "true sequence_off"}]}"#,
    )
    .unwrap();
    let mut config = write_config(dir.path());
    config.persistence.write_marker_on_success = true;

    let mut s = Session::start(&config);
    s.pump_until("ready", |l| l.model().is_visible());
    s.input(SessionInput::Commit);
    s.pump_until("hidden", |l| l.model().state == SessionState::Hidden);
    wait_for_contents(&dir.path().join("sequence.txt"), "sequence_off");
}
