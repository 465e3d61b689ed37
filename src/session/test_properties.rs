//! Property-based tests for session reducer invariants.
//!
//! Arbitrary message sequences must keep the cursor in range, the level in
//! bounds, the notification list capped, and never return to `Loading`.

use std::time::{Duration, Instant};

use proptest::prelude::*;

use super::model::{
    MAX_NOTIFICATIONS, SessionCmd, SessionInput, SessionModel, SessionMsg, SessionSettings,
    SessionState,
};
use super::update::update;
use crate::core::config::{CLASS_MODE_SWITCH, Config, LauncherProfile, Orientation};
use crate::core::errors::FetchError;
use crate::dispatch::{ActionEvent, RunDisposition, RunId};
use crate::snapshot::{FetchCompleted, Item, Snapshot};

// ──────────────────── strategies ────────────────────

fn arb_input() -> impl Strategy<Value = SessionInput> {
    prop_oneof![
        Just(SessionInput::Up),
        Just(SessionInput::Down),
        Just(SessionInput::Left),
        Just(SessionInput::Right),
        (-5isize..5).prop_map(SessionInput::Wheel),
        (0usize..12).prop_map(SessionInput::Point),
        Just(SessionInput::Commit),
        Just(SessionInput::LevelUp),
        Just(SessionInput::LevelDown),
        (-50i64..200).prop_map(SessionInput::LevelDrag),
        Just(SessionInput::LevelRelease),
        Just(SessionInput::Close),
    ]
}

fn arb_items() -> impl Strategy<Value = Vec<Item>> {
    prop::collection::vec(("[a-z]{1,6}", prop::bool::ANY), 0..10).prop_map(|raw| {
        raw.into_iter()
            .map(|(token, launchable)| {
                let command = if launchable {
                    format!("run {token}")
                } else {
                    String::new()
                };
                Item::new(token, command)
            })
            .collect()
    })
}

fn arb_fetch() -> impl Strategy<Value = SessionMsg> {
    (
        1u64..20,
        prop::option::of(arb_items()),
        prop::option::of(-20i64..150),
    )
        .prop_map(|(generation, items, brightness)| {
            let result = match items {
                Some(items) => Ok(Snapshot {
                    items,
                    brightness,
                    ..Snapshot::default()
                }),
                None => Err(FetchError::malformed("garbage")),
            };
            SessionMsg::FetchCompleted(FetchCompleted {
                generation,
                result,
                elapsed: Duration::from_millis(1),
            })
        })
}

fn arb_disposition() -> impl Strategy<Value = RunDisposition> {
    prop_oneof![
        Just(RunDisposition::Success),
        Just(RunDisposition::Cancelled),
        Just(RunDisposition::Failure {
            status: "exit code 1".to_string()
        }),
    ]
}

fn arb_msg() -> impl Strategy<Value = SessionMsg> {
    prop_oneof![
        4 => (arb_input(), 0u64..2000).prop_map(|(input, ms)| {
            SessionMsg::Input(input, base() + Duration::from_millis(ms))
        }),
        2 => arb_fetch(),
        1 => Just(SessionMsg::ToggleVisibility),
        1 => Just(SessionMsg::Show),
        1 => Just(SessionMsg::Hide),
        1 => Just(SessionMsg::Refresh),
        1 => prop::option::of("[a-z]{1,6}").prop_map(SessionMsg::MarkerLoaded),
        1 => ("[a-z]{1,6}", arb_disposition()).prop_map(|(token, disposition)| {
            SessionMsg::Action(ActionEvent::Finished {
                class: CLASS_MODE_SWITCH.to_string(),
                run_id: RunId(1),
                command: format!("run {token}"),
                disposition,
                elapsed: Duration::from_millis(1),
            })
        }),
        1 => (0u64..3000).prop_map(|ms| SessionMsg::Tick(base() + Duration::from_millis(ms))),
    ]
}

fn base() -> Instant {
    use std::sync::OnceLock;
    static BASE: OnceLock<Instant> = OnceLock::new();
    *BASE.get_or_init(Instant::now)
}

fn fresh_model(orientation: Orientation) -> SessionModel {
    let mut config = Config::default();
    config.launcher.profile = LauncherProfile::Modes;
    config.launcher.orientation = orientation;
    config.launcher.columns = 3;
    config.persistence.marker_file = Some("/tmp/marker".into());
    config.persistence.setting_file = Some("/tmp/level".into());
    config.persistence.write_marker_on_success = true;
    SessionModel::new(SessionSettings::from_config(&config), None)
}

fn assert_model_invariants(model: &SessionModel) {
    match model.selection.index() {
        Some(i) => assert!(i < model.selection.len(), "index {i} out of range"),
        None => assert!(model.selection.is_empty(), "absent index with items"),
    }
    let bounds = model.settings.level_bounds;
    assert!(model.level >= bounds.min && model.level <= bounds.max);
    assert!(model.notifications.len() <= MAX_NOTIFICATIONS);
    if let Some(pending) = model.level_debounce.pending_value() {
        assert_eq!(*pending, model.level, "pending write must be the latest level");
    }
}

fn arb_orientation() -> impl Strategy<Value = Orientation> {
    prop_oneof![Just(Orientation::Linear), Just(Orientation::Grid)]
}

// ──────────────────── properties ────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Any sequence of 1-60 messages preserves all model invariants.
    #[test]
    fn reducer_preserves_invariants(
        orientation in arb_orientation(),
        msgs in prop::collection::vec(arb_msg(), 1..60),
    ) {
        let mut model = fresh_model(orientation);
        for msg in msgs {
            let _ = update(&mut model, msg);
            assert_model_invariants(&model);
        }
    }

    /// Once ready, the session never goes back to loading.
    #[test]
    fn loading_is_left_for_good(msgs in prop::collection::vec(arb_msg(), 1..60)) {
        let mut model = fresh_model(Orientation::Linear);
        let mut ready = false;
        for msg in msgs {
            let _ = update(&mut model, msg);
            if ready {
                prop_assert_ne!(model.state, SessionState::Loading);
            }
            ready |= model.state != SessionState::Loading;
        }
    }

    /// Dispatch is only ever requested for a launchable item while visible.
    #[test]
    fn dispatch_requires_visible_launchable_item(
        msgs in prop::collection::vec(arb_msg(), 1..60),
    ) {
        let mut model = fresh_model(Orientation::Grid);
        for msg in msgs {
            let was_visible = model.state == SessionState::Visible;
            let current = model.current().cloned();
            for cmd in update(&mut model, msg).flatten() {
                if let SessionCmd::Dispatch { command, .. } = cmd {
                    prop_assert!(was_visible);
                    let item = current.clone();
                    prop_assert!(item.is_some_and(|i| i.is_launchable() && i.command == command));
                }
            }
        }
    }

    /// Quit always flushes: no pending level survives it.
    #[test]
    fn quit_leaves_nothing_pending(msgs in prop::collection::vec(arb_msg(), 0..40)) {
        let mut model = fresh_model(Orientation::Linear);
        for msg in msgs {
            let _ = update(&mut model, msg);
        }
        let cmds = update(&mut model, SessionMsg::Quit).flatten();
        prop_assert!(model.quit);
        prop_assert!(!model.level_debounce.is_pending());
        prop_assert_eq!(cmds.last(), Some(&SessionCmd::Quit));
    }
}
