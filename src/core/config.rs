//! Configuration system: TOML file + env var overrides + per-profile defaults.
//!
//! The effective [`Config`] is built once at startup and never mutated
//! afterwards; components receive the sub-section they need.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{OvlError, Result};
use crate::core::paths::{config_dir, expand_path, home_dir, state_dir};

/// Action class used to start games.
pub const CLASS_LAUNCH: &str = "launch";
/// Action class used to switch hardware-control modes.
pub const CLASS_MODE_SWITCH: &str = "mode-switch";

/// Full launcher configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub launcher: LauncherConfig,
    pub snapshot: SnapshotConfig,
    /// Built-in classes are patched field by field, not replaced.
    #[serde(deserialize_with = "deserialize_actions")]
    pub actions: BTreeMap<String, ActionClassConfig>,
    pub persistence: PersistenceConfig,
    pub paths: PathsConfig,
}

/// Which launcher instance this process is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LauncherProfile {
    /// Game library launcher.
    #[default]
    Games,
    /// Hardware-control (RGB) mode switcher.
    Modes,
}

impl LauncherProfile {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Games => "games",
            Self::Modes => "modes",
        }
    }

    /// Action class a commit dispatches to when none is configured.
    #[must_use]
    pub const fn default_commit_class(self) -> &'static str {
        match self {
            Self::Games => CLASS_LAUNCH,
            Self::Modes => CLASS_MODE_SWITCH,
        }
    }
}

impl std::str::FromStr for LauncherProfile {
    type Err = OvlError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "games" | "game" => Ok(Self::Games),
            "modes" | "mode" | "rgb" => Ok(Self::Modes),
            other => Err(OvlError::ConfigParse {
                context: "profile",
                details: format!("unknown launcher profile {other:?} (expected games|modes)"),
            }),
        }
    }
}

/// Layout of the selectable items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Single row or column; `move_linear` applies.
    Linear,
    /// Rows of `columns` items; `move_grid` applies.
    #[default]
    Grid,
}

/// Launcher behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LauncherConfig {
    pub profile: LauncherProfile,
    pub orientation: Orientation,
    pub columns: usize,
    /// Action class a commit dispatches to. Empty = profile default.
    pub commit_class: String,
    /// Start hidden and wait for a toggle.
    pub start_hidden: bool,
}

/// External snapshot source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Program to run. Empty = profile default backend.
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

/// Per-class single-flight policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ActionClassConfig {
    /// Delay between terminating the previous run and starting the next.
    pub settle_ms: u64,
    /// Regex matched against process command lines for best-effort
    /// termination of detached descendants.
    pub signature: Option<String>,
    /// Whether the exit code is reported back to the session.
    pub track_completion: bool,
    /// Hide the overlay as soon as the action is dispatched.
    pub close_on_dispatch: bool,
    /// Hide the overlay when a tracked run exits 0.
    pub close_on_success: bool,
    /// Working directory for the spawned command.
    pub working_dir: Option<PathBuf>,
}

/// Sparse `[actions.<class>]` table as written in the file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ActionClassPatch {
    settle_ms: Option<u64>,
    /// An empty string clears a built-in signature.
    signature: Option<String>,
    track_completion: Option<bool>,
    close_on_dispatch: Option<bool>,
    close_on_success: Option<bool>,
    working_dir: Option<PathBuf>,
}

impl ActionClassPatch {
    fn apply(self, base: &mut ActionClassConfig) {
        if let Some(v) = self.settle_ms {
            base.settle_ms = v;
        }
        if let Some(v) = self.signature {
            base.signature = (!v.is_empty()).then_some(v);
        }
        if let Some(v) = self.track_completion {
            base.track_completion = v;
        }
        if let Some(v) = self.close_on_dispatch {
            base.close_on_dispatch = v;
        }
        if let Some(v) = self.close_on_success {
            base.close_on_success = v;
        }
        if let Some(v) = self.working_dir {
            base.working_dir = Some(v);
        }
    }
}

fn deserialize_actions<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, ActionClassConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let patches = BTreeMap::<String, ActionClassPatch>::deserialize(deserializer)?;
    let mut actions = Config::default().actions;
    for (name, patch) in patches {
        patch.apply(actions.entry(name).or_default());
    }
    Ok(actions)
}

/// How the persisted marker is compared against items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerMatch {
    /// Last whitespace-separated token of the action command.
    #[default]
    TrailingToken,
    /// Whole action command.
    Exact,
    /// Display name.
    Name,
    /// Stable item identifier.
    Id,
}

/// Persisted marker and level setting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PersistenceConfig {
    pub marker_file: Option<PathBuf>,
    pub marker_match: MarkerMatch,
    pub write_marker_on_success: bool,
    pub setting_file: Option<PathBuf>,
    pub debounce_ms: u64,
    pub level_min: i64,
    pub level_max: i64,
    pub level_step: i64,
    pub level_default: i64,
}

/// Filesystem paths used by ovl.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    /// Pidfile used by `ovl toggle` / `ovl refresh`. Empty = per-profile default.
    pub pidfile: PathBuf,
    pub jsonl_log: PathBuf,
    pub jsonl_fallback: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let mut actions = BTreeMap::new();
        actions.insert(CLASS_LAUNCH.to_string(), ActionClassConfig::launch());
        actions.insert(
            CLASS_MODE_SWITCH.to_string(),
            ActionClassConfig::mode_switch(),
        );
        Self {
            launcher: LauncherConfig::default(),
            snapshot: SnapshotConfig::default(),
            actions,
            persistence: PersistenceConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            profile: LauncherProfile::default(),
            orientation: Orientation::default(),
            columns: 6,
            commit_class: String::new(),
            start_hidden: false,
        }
    }
}

impl Default for ActionClassConfig {
    fn default() -> Self {
        Self {
            settle_ms: 300,
            signature: None,
            track_completion: false,
            close_on_dispatch: false,
            close_on_success: false,
            working_dir: None,
        }
    }
}

impl ActionClassConfig {
    /// Game launches: fire and forget, overlay closes right away.
    #[must_use]
    pub fn launch() -> Self {
        Self {
            close_on_dispatch: true,
            ..Self::default()
        }
    }

    /// Mode switches: sweep stray controllers, close once the switch succeeds.
    #[must_use]
    pub fn mode_switch() -> Self {
        Self {
            signature: Some("OpenRGB_Controller".to_string()),
            track_completion: true,
            close_on_success: true,
            ..Self::default()
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            marker_file: None,
            marker_match: MarkerMatch::default(),
            write_marker_on_success: false,
            setting_file: None,
            debounce_ms: 300,
            level_min: 0,
            level_max: 100,
            level_step: 5,
            level_default: 100,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let state = state_dir();
        Self {
            config_file: config_dir().join("config.toml"),
            pidfile: PathBuf::new(),
            jsonl_log: state.join("activity.jsonl"),
            jsonl_fallback: Some(PathBuf::from("/dev/shm/ovl-activity.jsonl")),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, apply env overrides and an
    /// optional profile override, then fill profile defaults and validate.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>, profile: Option<LauncherProfile>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| OvlError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(OvlError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        if let Some(profile) = profile {
            cfg.launcher.profile = profile;
        }
        cfg.apply_profile_defaults();
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Action class a commit dispatches to.
    #[must_use]
    pub fn commit_class(&self) -> &str {
        if self.launcher.commit_class.is_empty() {
            self.launcher.profile.default_commit_class()
        } else {
            &self.launcher.commit_class
        }
    }

    /// Policy for an action class; unknown classes get the defaults.
    #[must_use]
    pub fn action_class(&self, class: &str) -> ActionClassConfig {
        self.actions.get(class).cloned().unwrap_or_default()
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("OVL_PROFILE") {
            self.launcher.profile = raw.parse()?;
        }
        if let Some(raw) = lookup("OVL_LAUNCHER_COLUMNS") {
            self.launcher.columns = parse_env("OVL_LAUNCHER_COLUMNS", &raw)?;
        }
        if let Some(raw) = lookup("OVL_LAUNCHER_START_HIDDEN") {
            self.launcher.start_hidden = parse_env("OVL_LAUNCHER_START_HIDDEN", &raw)?;
        }
        if let Some(raw) = lookup("OVL_SNAPSHOT_PROGRAM") {
            self.snapshot.program = raw;
        }
        if let Some(raw) = lookup("OVL_PERSISTENCE_DEBOUNCE_MS") {
            self.persistence.debounce_ms = parse_env("OVL_PERSISTENCE_DEBOUNCE_MS", &raw)?;
        }
        if let Some(raw) = lookup("OVL_PERSISTENCE_MARKER_FILE") {
            self.persistence.marker_file = Some(PathBuf::from(raw));
        }
        if let Some(raw) = lookup("OVL_PERSISTENCE_SETTING_FILE") {
            self.persistence.setting_file = Some(PathBuf::from(raw));
        }
        if let Some(raw) = lookup("OVL_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }
        Ok(())
    }

    /// Fill fields left empty with the profile's stock backend locations.
    fn apply_profile_defaults(&mut self) {
        let (backend_dir, program_args) = match self.launcher.profile {
            LauncherProfile::Games => ("~/.config/quickshell/game-launcher", "backend.py"),
            LauncherProfile::Modes => ("~/.config/quickshell/rgb-launcher", "backend.py"),
        };

        if self.snapshot.program.is_empty() {
            self.snapshot.program = "python3".to_string();
            if self.snapshot.args.is_empty() {
                self.snapshot.args = vec![format!("{backend_dir}/{program_args}")];
            }
        }
        if self.snapshot.working_dir.is_none() {
            self.snapshot.working_dir = Some(PathBuf::from(backend_dir));
        }

        if self.launcher.profile == LauncherProfile::Modes {
            if self.persistence.marker_file.is_none() {
                self.persistence.marker_file =
                    Some(PathBuf::from(format!("{backend_dir}/script/sequence.txt")));
            }
            if self.persistence.setting_file.is_none() {
                self.persistence.setting_file =
                    Some(PathBuf::from("~/.config/hypr/Openrgb/brightness.txt"));
            }
            let mode_switch = self
                .actions
                .entry(CLASS_MODE_SWITCH.to_string())
                .or_insert_with(ActionClassConfig::mode_switch);
            if mode_switch.working_dir.is_none() {
                mode_switch.working_dir = Some(PathBuf::from(format!("{backend_dir}/script")));
            }
        }

        if self.paths.pidfile.as_os_str().is_empty() {
            self.paths.pidfile =
                state_dir().join(format!("ovl-{}.pid", self.launcher.profile.name()));
        }
    }

    /// Expand `~` and `$VAR` in every configured path.
    fn normalize_paths(&mut self) {
        fn expand(path: &mut PathBuf) {
            *path = expand_path(&path.to_string_lossy());
        }

        if let Some(dir) = self.snapshot.working_dir.as_mut() {
            expand(dir);
        }
        // Script arguments are paths in practice; only `~/` prefixes are touched.
        for arg in &mut self.snapshot.args {
            if let Some(rest) = arg.strip_prefix("~/") {
                *arg = home_dir().join(rest).to_string_lossy().into_owned();
            }
        }
        for class in self.actions.values_mut() {
            if let Some(dir) = class.working_dir.as_mut() {
                expand(dir);
            }
        }
        if let Some(p) = self.persistence.marker_file.as_mut() {
            expand(p);
        }
        if let Some(p) = self.persistence.setting_file.as_mut() {
            expand(p);
        }
        expand(&mut self.paths.pidfile);
        expand(&mut self.paths.jsonl_log);
        if let Some(p) = self.paths.jsonl_fallback.as_mut() {
            expand(p);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.launcher.columns == 0 {
            return Err(OvlError::InvalidConfig {
                details: "launcher.columns must be >= 1".to_string(),
            });
        }

        if self.snapshot.program.trim().is_empty() {
            return Err(OvlError::InvalidConfig {
                details: "snapshot.program must not be empty".to_string(),
            });
        }

        if !self.actions.contains_key(self.commit_class()) {
            return Err(OvlError::InvalidConfig {
                details: format!(
                    "launcher.commit_class {:?} has no [actions.{}] section",
                    self.commit_class(),
                    self.commit_class()
                ),
            });
        }

        for (name, class) in &self.actions {
            if class.settle_ms > 5_000 {
                return Err(OvlError::InvalidConfig {
                    details: format!(
                        "actions.{name}.settle_ms must be <= 5000, got {}",
                        class.settle_ms
                    ),
                });
            }
            if let Some(signature) = &class.signature {
                if signature.trim().is_empty() {
                    return Err(OvlError::InvalidConfig {
                        details: format!("actions.{name}.signature must not be empty"),
                    });
                }
                Regex::new(signature).map_err(|e| OvlError::InvalidConfig {
                    details: format!("actions.{name}.signature is not a valid regex: {e}"),
                })?;
            }
            if class.close_on_success && !class.track_completion {
                return Err(OvlError::InvalidConfig {
                    details: format!(
                        "actions.{name}.close_on_success requires track_completion = true"
                    ),
                });
            }
        }

        let p = &self.persistence;
        if p.debounce_ms == 0 || p.debounce_ms > 10_000 {
            return Err(OvlError::InvalidConfig {
                details: format!(
                    "persistence.debounce_ms must be in [1, 10000], got {}",
                    p.debounce_ms
                ),
            });
        }
        if p.level_min >= p.level_max {
            return Err(OvlError::InvalidConfig {
                details: format!(
                    "persistence.level_min ({}) must be < level_max ({})",
                    p.level_min, p.level_max
                ),
            });
        }
        if p.level_step <= 0 {
            return Err(OvlError::InvalidConfig {
                details: "persistence.level_step must be >= 1".to_string(),
            });
        }
        if !(p.level_min..=p.level_max).contains(&p.level_default) {
            return Err(OvlError::InvalidConfig {
                details: format!(
                    "persistence.level_default ({}) must be within [{}, {}]",
                    p.level_default, p.level_min, p.level_max
                ),
            });
        }
        if p.write_marker_on_success && p.marker_file.is_none() {
            return Err(OvlError::InvalidConfig {
                details: "persistence.write_marker_on_success requires marker_file".to_string(),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| OvlError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
