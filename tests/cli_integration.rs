mod common;

use std::fs;
use std::time::Duration;

use common::{Fixture, ITEMS_JSON, wait_for, wait_for_file};

#[test]
fn fetch_json_reports_items_and_metadata() {
    let fx = Fixture::new(ITEMS_JSON);
    let result = fx.run("fetch_json", &["fetch", "--json"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());

    let payload: serde_json::Value = serde_json::from_str(result.stdout.trim()).unwrap();
    assert_eq!(payload["command"], "fetch");
    let items = payload["snapshot"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[1]["name"], "Static");
    assert_eq!(payload["snapshot"]["brightness"], 70);
    assert_eq!(payload["snapshot"]["colors"]["color1"], "#ff0000");
}

#[test]
fn fetch_garbage_is_a_runtime_failure() {
    let fx = Fixture::new("this is not json");
    let result = fx.run("fetch_garbage", &["fetch", "--json"]);
    assert_eq!(result.status.code(), Some(2));
    assert!(result.stderr.contains("OVL-2001"), "{}", result.stderr);
}

#[test]
fn config_prints_effective_values_and_hash() {
    let fx = Fixture::new(ITEMS_JSON);
    let result = fx.run("config_json", &["config", "--json"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());

    let payload: serde_json::Value = serde_json::from_str(result.stdout.trim()).unwrap();
    assert_eq!(payload["hash"].as_str().map(str::len), Some(16));
    assert_eq!(payload["config"]["launcher"]["profile"], "modes");
    assert_eq!(payload["config"]["actions"]["mode-switch"]["track_completion"], true);
    assert_eq!(payload["config"]["actions"]["mode-switch"]["settle_ms"], 0);
}

#[test]
fn invalid_config_exits_with_user_error() {
    let fx = Fixture::new(ITEMS_JSON);
    fx.write_config("");
    let bad = fs::read_to_string(fx.config_path())
        .unwrap()
        .replace("debounce_ms = 50", "debounce_ms = 0");
    fs::write(fx.config_path(), bad).unwrap();

    let result = fx.run("invalid_config", &["config"]);
    assert_eq!(result.status.code(), Some(1));
    assert!(result.stderr.contains("OVL-1001"), "{}", result.stderr);
}

#[test]
fn toggle_without_instance_reports_no_instance() {
    let fx = Fixture::new(ITEMS_JSON);
    let result = fx.run("toggle_none", &["toggle"]);
    assert_eq!(result.status.code(), Some(1));
    assert!(result.stderr.contains("OVL-5004"), "{}", result.stderr);
}

#[test]
fn completions_are_generated() {
    let fx = Fixture::new(ITEMS_JSON);
    let result = fx.run("completions", &["completions", "bash"]);
    assert!(result.status.success());
    assert!(result.stdout.contains("ovl"));
}

#[test]
fn session_runs_until_stopped_and_logs_activity() {
    let fx = Fixture::new(ITEMS_JSON);
    fs::write(fx.path("sequence.txt"), "static\n").unwrap();

    let mut child = fx.spawn(&["run", "--no-terminal"]);
    assert!(
        wait_for_file(&fx.path("ovl.pid"), Duration::from_secs(10)),
        "pidfile never appeared"
    );
    assert!(
        wait_for(Duration::from_secs(10), || !fx.log_events("reconciled").is_empty()),
        "session never reconciled"
    );

    let toggle = fx.run("toggle_live", &["toggle", "--json"]);
    assert!(toggle.status.success(), "log: {}", toggle.log_path.display());
    assert!(
        wait_for(Duration::from_secs(5), || {
            fx.log_events("visibility_changed")
                .iter()
                .any(|e| e["value"] == "hidden")
        }),
        "toggle was not applied"
    );

    let stop = fx.run("stop_live", &["stop"]);
    assert!(stop.status.success(), "log: {}", stop.log_path.display());
    assert!(
        wait_for(Duration::from_secs(10), || {
            child.try_wait().ok().flatten().is_some()
        }),
        "session did not exit"
    );
    let status = child.wait().unwrap();
    assert!(status.success());
    assert!(!fx.path("ovl.pid").exists(), "pidfile left behind");

    let reconciled = fx.log_events("reconciled");
    assert_eq!(reconciled[0]["value"], "static");
    assert_eq!(reconciled[0]["details"], "index=1");
    assert_eq!(reconciled[0]["ok"], true);
    assert_eq!(fx.log_events("snapshot_applied")[0]["items"], 3);
    assert_eq!(fx.log_events("session_start").len(), 1);
    assert_eq!(fx.log_events("session_stop").len(), 1);
}
