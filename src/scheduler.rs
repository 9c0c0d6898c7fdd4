//! Daily reset and session timeout.
//!
//! Both checks are idempotent and delay-tolerant: they compare wall-clock
//! thresholds, never tick counts, so it does not matter how late or how often
//! the periodic drivers (or the opportunistic pre-status calls) invoke them.

use anyhow::Result;

use crate::logging::{log, obj, v_str, v_u64, Domain, Level};
use crate::policy::TimestampMs;
use crate::state::Config;
use crate::store::PolicyStore;

/// Reset the daily counters once per calendar date. Returns whether a reset
/// was applied; re-invocation on the same date is a no-op.
pub fn check_daily_reset(store: &mut PolicyStore, today: &str) -> Result<bool> {
    let mut state = store.state()?;
    if state.last_reset_date == today {
        return Ok(false);
    }

    state.daily_loss = 0.0;
    state.loss_streak = 0;
    state.cooldown_until = 0;
    state.session_active = false;
    state.blocks_today = 0;
    state.last_stake = 0.0;
    state.last_reset_date = today.to_string();
    store.put_state(&state)?;

    log(Level::Info, Domain::Scheduler, "daily_reset", obj(&[("date", v_str(today))]));
    Ok(true)
}

/// Force-end a session that has seen no activity for the timeout window.
pub fn check_session_timeout(store: &mut PolicyStore, cfg: &Config, now: TimestampMs) -> Result<bool> {
    let mut state = store.state()?;
    if !state.session_active || state.last_activity_at == 0 {
        return Ok(false);
    }
    if now.saturating_sub(state.last_activity_at) <= cfg.session_timeout_ms() {
        return Ok(false);
    }

    state.session_active = false;
    store.put_state(&state)?;

    log(
        Level::Info,
        Domain::Scheduler,
        "session_timeout",
        obj(&[("idle_ms", v_u64(now.saturating_sub(state.last_activity_at)))]),
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RuleState;

    const NOW: TimestampMs = 1_700_000_000_000;

    fn store_with(state: RuleState) -> PolicyStore {
        let mut store = PolicyStore::open_in_memory().unwrap();
        store.init().unwrap();
        store.put_state(&state).unwrap();
        store
    }

    #[test]
    fn daily_reset_zeroes_counters_once_per_date() {
        let mut state = RuleState::default();
        state.daily_loss = 300.0;
        state.loss_streak = 4;
        state.cooldown_until = NOW + 1;
        state.session_active = true;
        state.blocks_today = 9;
        state.last_stake = 75.0;
        state.push_recent_stake(75.0);
        state.last_activity_at = NOW;
        let mut store = store_with(state);

        assert!(check_daily_reset(&mut store, "2024-06-01").unwrap());
        let state = store.state().unwrap();
        assert_eq!(state.daily_loss, 0.0);
        assert_eq!(state.loss_streak, 0);
        assert_eq!(state.cooldown_until, 0);
        assert!(!state.session_active);
        assert_eq!(state.blocks_today, 0);
        assert_eq!(state.last_stake, 0.0);
        assert_eq!(state.last_reset_date, "2024-06-01");
        // Stake history and the activity stamp survive the reset.
        assert_eq!(state.recent_stakes.len(), 1);
        assert_eq!(state.last_activity_at, NOW);

        // Same date again: no-op, nothing written.
        let generation = store.generation(crate::store::RecordKind::State);
        assert!(!check_daily_reset(&mut store, "2024-06-01").unwrap());
        assert_eq!(store.generation(crate::store::RecordKind::State), generation);

        // Next date: runs again.
        assert!(check_daily_reset(&mut store, "2024-06-02").unwrap());
    }

    #[test]
    fn timeout_ends_idle_session() {
        let cfg = Config::default();
        let mut state = RuleState::default();
        state.session_active = true;
        state.last_activity_at = NOW;
        let mut store = store_with(state);

        // Inside the window (boundary is inclusive-keep).
        let at_limit = NOW + cfg.session_timeout_ms();
        assert!(!check_session_timeout(&mut store, &cfg, at_limit).unwrap());
        assert!(store.state().unwrap().session_active);

        assert!(check_session_timeout(&mut store, &cfg, at_limit + 1).unwrap());
        assert!(!store.state().unwrap().session_active);
    }

    #[test]
    fn timeout_ignores_inactive_or_unstamped_sessions() {
        let cfg = Config::default();

        let mut store = store_with(RuleState::default());
        assert!(!check_session_timeout(&mut store, &cfg, NOW).unwrap());

        // Active but never stamped: left alone.
        let mut state = RuleState::default();
        state.session_active = true;
        let mut store = store_with(state);
        assert!(!check_session_timeout(&mut store, &cfg, NOW).unwrap());
        assert!(store.state().unwrap().session_active);
    }
}
