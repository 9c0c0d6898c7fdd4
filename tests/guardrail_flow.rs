//! End-to-end flows through the protocol dispatcher against a real store.

use serde_json::{json, Value};

use guardrail::controller::Controller;
use guardrail::policy::{Rules, TimestampMs};
use guardrail::protocol::{Daemon, Request};
use guardrail::rules::evaluate;
use guardrail::state::Config;
use guardrail::store::PolicyStore;

// 2023-11-14T22:13:20Z
const NOW: TimestampMs = 1_700_000_000_000;
const HOUR_MS: u64 = 3_600_000;
const DAY_MS: u64 = 86_400_000;

fn daemon() -> Daemon {
    let mut store = PolicyStore::open_in_memory().unwrap();
    store.init().unwrap();
    let mut daemon = Daemon::new(Controller::new(store, Config::default()));
    // Stamp today's reset date the way the binary does at startup, so the
    // opportunistic pre-status reset does not fire mid-scenario.
    let _ = daemon.dispatch(Request::GetStatus, NOW);
    daemon
}

fn daemon_with_rules(rules: Rules) -> Daemon {
    let mut daemon = daemon();
    daemon.controller_mut().store_mut().put_rules(&rules).unwrap();
    daemon
}

fn req(body: Value) -> Request {
    serde_json::from_value(body).unwrap()
}

fn dispatch(daemon: &mut Daemon, body: Value, now: TimestampMs) -> Value {
    let response = daemon.dispatch(req(body), now);
    serde_json::to_value(response).unwrap()
}

#[test]
fn two_losses_activate_cooldown() {
    let mut daemon = daemon_with_rules(Rules {
        escalation_guard_enabled: true,
        ..Default::default()
    });

    let first = dispatch(&mut daemon, json!({"type":"REGISTER_LOSS","amount":100.0,"currentStake":50.0}), NOW);
    assert_eq!(first, json!({"ok": true, "cooldownActivated": false}));

    let second = dispatch(&mut daemon, json!({"type":"REGISTER_LOSS","amount":100.0,"currentStake":50.0}), NOW + 1);
    assert_eq!(second, json!({"ok": true, "cooldownActivated": true}));

    let state = daemon.controller().store().state().unwrap();
    assert_eq!(state.loss_streak, 2);
    assert_eq!(state.cooldown_until, NOW + 1 + HOUR_MS);
}

#[test]
fn stop_loss_reached_reports_and_denies() {
    let rules = Rules {
        daily_stop_loss: 200.0,
        escalation_guard_enabled: false,
        ..Default::default()
    };
    let mut daemon = daemon_with_rules(rules.clone());

    dispatch(&mut daemon, json!({"type":"START_SESSION"}), NOW);
    dispatch(&mut daemon, json!({"type":"REGISTER_LOSS","amount":120.0,"currentStake":0.0}), NOW + 1);
    dispatch(&mut daemon, json!({"type":"REGISTER_LOSS","amount":80.0,"currentStake":0.0}), NOW + 2);

    let status = dispatch(&mut daemon, json!({"type":"GET_STATUS"}), NOW + 3);
    assert_eq!(status["dailyStopReached"], json!(true));
    // Reaching the stop ended the session.
    assert_eq!(status["state"]["session_active"], json!(false));

    // Any further stake is denied with daily_stop_loss, regardless of size.
    let state = daemon.controller().store().state().unwrap();
    let decision = evaluate(0.01, &rules, &state, NOW + 4);
    assert!(!decision.allowed());
    assert_eq!(
        decision.reason(),
        Some(guardrail::policy::BlockReason::DailyStopLoss)
    );
}

#[test]
fn stake_history_keeps_last_five() {
    let mut daemon = daemon();
    for stake in [10.0, 20.0, 30.0, 40.0, 50.0, 60.0] {
        let response = dispatch(&mut daemon, json!({"type":"UPDATE_LAST_STAKE","stake":stake}), NOW);
        assert_eq!(response, json!({"ok": true}));
    }

    let status = dispatch(&mut daemon, json!({"type":"GET_STATUS"}), NOW + 1);
    assert_eq!(status["state"]["recent_stakes"], json!([20.0, 30.0, 40.0, 50.0, 60.0]));
    assert_eq!(status["state"]["last_stake"], json!(60.0));
}

#[test]
fn rule_save_locks_for_a_day() {
    let mut daemon = daemon();
    let rules = json!({
        "stake_base": 10.0,
        "stake_max": 50.0,
        "daily_stop_loss": 200.0,
        "escalation_guard_enabled": true
    });

    let saved = dispatch(&mut daemon, json!({"type":"SAVE_RULES","rules":rules}), NOW);
    assert_eq!(saved["ok"], json!(true));
    assert_eq!(saved["lockedUntil"], json!(NOW + DAY_MS));

    // Any save inside the 24h window is rejected and changes nothing.
    let other = json!({
        "stake_base": 1.0,
        "stake_max": 2.0,
        "daily_stop_loss": 3.0
    });
    for offset in [1, DAY_MS / 2, DAY_MS - 1] {
        let rejected = dispatch(&mut daemon, json!({"type":"SAVE_RULES","rules":other}), NOW + offset);
        assert!(rejected["error"].is_string(), "expected rejection at +{offset}");
    }
    assert_eq!(daemon.controller().store().rules().unwrap().stake_max, 50.0);

    // At lock expiry the save goes through.
    let saved = dispatch(&mut daemon, json!({"type":"SAVE_RULES","rules":other}), NOW + DAY_MS);
    assert_eq!(saved["ok"], json!(true));
}

#[test]
fn rule_save_denied_during_session() {
    let mut daemon = daemon();
    dispatch(&mut daemon, json!({"type":"START_SESSION"}), NOW);

    let rules = json!({"stake_base": 10.0, "stake_max": 50.0, "daily_stop_loss": 200.0});
    let rejected = dispatch(&mut daemon, json!({"type":"SAVE_RULES","rules":rules}), NOW + 1);
    assert!(rejected["error"].is_string());
    assert!(!daemon.controller().store().state().unwrap().configured);
}

#[test]
fn unknown_message_is_an_error_payload() {
    let mut daemon = daemon();
    let response = daemon.handle_line(r#"{"type":"FORMAT_DISK"}"#);
    assert_eq!(
        serde_json::to_value(response).unwrap(),
        json!({"error": "unknown message type"})
    );

    let response = daemon.handle_line("not json at all");
    assert_eq!(
        serde_json::to_value(response).unwrap(),
        json!({"error": "unknown message type"})
    );
}

#[test]
fn status_read_applies_daily_rollover() {
    let mut daemon = daemon_with_rules(Rules {
        escalation_guard_enabled: true,
        ..Default::default()
    });

    dispatch(&mut daemon, json!({"type":"START_SESSION"}), NOW);
    dispatch(&mut daemon, json!({"type":"REGISTER_LOSS","amount":100.0,"currentStake":30.0}), NOW + 1);
    dispatch(&mut daemon, json!({"type":"REGISTER_LOSS","amount":100.0,"currentStake":30.0}), NOW + 2);
    dispatch(&mut daemon, json!({"type":"REGISTER_BLOCK"}), NOW + 3);

    // Next calendar day: the pre-status check resets the daily counters.
    let status = dispatch(&mut daemon, json!({"type":"GET_STATUS"}), NOW + DAY_MS);
    let state = &status["state"];
    assert_eq!(state["daily_loss"], json!(0.0));
    assert_eq!(state["loss_streak"], json!(0));
    assert_eq!(state["blocks_today"], json!(0));
    assert_eq!(state["cooldown_until"], json!(0));
    assert_eq!(state["last_stake"], json!(0.0));
    assert_eq!(state["session_active"], json!(false));
    assert_eq!(status["cooldownActive"], json!(false));
}

#[test]
fn status_read_times_out_idle_session() {
    let mut daemon = daemon();
    dispatch(&mut daemon, json!({"type":"START_SESSION"}), NOW);

    // 20 minutes on the dot: still active.
    let status = dispatch(&mut daemon, json!({"type":"GET_STATUS"}), NOW + 20 * 60 * 1000);
    assert_eq!(status["state"]["session_active"], json!(true));

    let status = dispatch(&mut daemon, json!({"type":"GET_STATUS"}), NOW + 20 * 60 * 1000 + 1);
    assert_eq!(status["state"]["session_active"], json!(false));
}

#[test]
fn cooldown_activation_reflects_in_status() {
    let mut daemon = daemon();
    let response = dispatch(&mut daemon, json!({"type":"ACTIVATE_COOLDOWN"}), NOW);
    assert_eq!(response, json!({"ok": true}));

    let status = dispatch(&mut daemon, json!({"type":"GET_STATUS"}), NOW + 1000);
    assert_eq!(status["cooldownActive"], json!(true));
    assert_eq!(status["cooldownRemaining"], json!(HOUR_MS - 1000));

    let status = dispatch(&mut daemon, json!({"type":"GET_STATUS"}), NOW + HOUR_MS);
    assert_eq!(status["cooldownActive"], json!(false));
    assert_eq!(status["cooldownRemaining"], json!(0));
}

#[test]
fn license_redemption_projects_fresh_status() {
    let mut daemon = daemon();
    let response = dispatch(&mut daemon, json!({"type":"REDEEM_LICENSE","code":" GR-XYZ "}), NOW);
    assert_eq!(response["ok"], json!(true));
    assert_eq!(response["status"], json!("paid"));

    let status = dispatch(&mut daemon, json!({"type":"GET_STATUS"}), NOW + 1);
    assert_eq!(status["state"]["license_status"], json!("paid"));

    // 31 days later the projection reports expired without any write.
    let status = dispatch(&mut daemon, json!({"type":"GET_STATUS"}), NOW + 31 * DAY_MS);
    assert_eq!(status["state"]["license_status"], json!("expired"));

    let rejected = dispatch(&mut daemon, json!({"type":"REDEEM_LICENSE","code":"  "}), NOW);
    assert!(rejected["error"].is_string());
}

#[test]
fn payment_code_is_served() {
    let mut daemon = daemon();
    let response = dispatch(&mut daemon, json!({"type":"GET_PAYMENT_CODE"}), NOW);
    assert_eq!(response["ok"], json!(true));
    let payload = response["payload"].as_str().unwrap();
    assert!(payload.starts_with("000201"));
    assert_eq!(payload, guardrail::license::payment_payload());
}

#[test]
fn state_survives_reopen_on_disk() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("guardrail.sqlite");
    let path = path.to_str().unwrap();

    {
        let mut store = PolicyStore::open(path).unwrap();
        store.init().unwrap();
        let mut daemon = Daemon::new(Controller::new(store, Config::default()));
        dispatch(&mut daemon, json!({"type":"GET_STATUS"}), NOW);
        dispatch(&mut daemon, json!({"type":"REGISTER_LOSS","amount":42.0,"currentStake":7.0}), NOW);
    }

    let mut store = PolicyStore::open(path).unwrap();
    store.init().unwrap();
    let mut daemon = Daemon::new(Controller::new(store, Config::default()));
    let status = dispatch(&mut daemon, json!({"type":"GET_STATUS"}), NOW + 1);
    assert_eq!(status["state"]["daily_loss"], json!(42.0));
    assert_eq!(status["state"]["last_stake"], json!(7.0));
}
