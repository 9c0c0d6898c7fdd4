//! State transition controller: the only writer of the `state` record.
//!
//! One operation per event type. Every operation reads the current record,
//! computes the update, and writes the whole record back (read-modify-write,
//! not a diff patch). Each write is transactional, so a failed write leaves
//! the prior record intact.

use anyhow::Result;

use crate::license::{redeem_code, LicenseError, LicenseGrant};
use crate::logging::{log, obj, v_bool, v_num, v_str, v_u64, Domain, Level};
use crate::policy::{Rules, TimestampMs};
use crate::rules::{can_modify_rules, validate_rules, SaveError};
use crate::state::Config;
use crate::store::PolicyStore;

pub struct Controller {
    store: PolicyStore,
    cfg: Config,
}

impl Controller {
    pub fn new(store: PolicyStore, cfg: Config) -> Self {
        Self { store, cfg }
    }

    pub fn store(&self) -> &PolicyStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut PolicyStore {
        &mut self.store
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn start_session(&mut self, now: TimestampMs) -> Result<()> {
        let mut state = self.store.state()?;
        state.session_active = true;
        state.last_activity_at = now;
        self.store.put_state(&state)?;
        log(Level::Info, Domain::Session, "session_start", obj(&[]));
        Ok(())
    }

    pub fn end_session(&mut self) -> Result<()> {
        let mut state = self.store.state()?;
        state.session_active = false;
        self.store.put_state(&state)?;
        log(Level::Info, Domain::Session, "session_end", obj(&[]));
        Ok(())
    }

    /// Record a lost bet. Returns whether a cooldown was activated.
    ///
    /// The loss-streak cooldown triggers on the post-increment streak; the
    /// stop-loss session end uses the post-add accumulated loss.
    pub fn register_loss(&mut self, amount: f64, current_stake: f64, now: TimestampMs) -> Result<bool> {
        let rules = self.store.rules()?;
        let mut state = self.store.state()?;

        state.loss_streak += 1;
        state.daily_loss += amount.abs();
        if current_stake > 0.0 {
            state.last_stake = current_stake;
        }

        let mut cooldown_activated = false;
        if rules.escalation_guard_enabled && state.loss_streak >= 2 {
            state.cooldown_until = now + self.cfg.cooldown_ms();
            cooldown_activated = true;
        }

        if rules.daily_stop_loss > 0.0 && state.daily_loss >= rules.daily_stop_loss {
            state.session_active = false;
        }

        state.last_activity_at = now;
        self.store.put_state(&state)?;

        log(
            Level::Info,
            Domain::Session,
            "loss",
            obj(&[
                ("amount", v_num(amount.abs())),
                ("loss_streak", v_u64(state.loss_streak as u64)),
                ("daily_loss", v_num(state.daily_loss)),
                ("cooldown_activated", v_bool(cooldown_activated)),
            ]),
        );
        Ok(cooldown_activated)
    }

    /// A win clears the loss streak and nothing else.
    pub fn register_win(&mut self) -> Result<()> {
        let mut state = self.store.state()?;
        state.loss_streak = 0;
        self.store.put_state(&state)?;
        log(Level::Info, Domain::Session, "win", obj(&[]));
        Ok(())
    }

    pub fn register_block(&mut self, now: TimestampMs) -> Result<()> {
        let mut state = self.store.state()?;
        state.blocks_today += 1;
        state.last_activity_at = now;
        self.store.put_state(&state)?;
        log(
            Level::Info,
            Domain::Policy,
            "block",
            obj(&[("blocks_today", v_u64(state.blocks_today as u64))]),
        );
        Ok(())
    }

    /// Start (or restart) the fixed-duration cooldown. Last activation wins:
    /// the new expiry is always `now + cooldown`, even when a longer cooldown
    /// was already running.
    pub fn activate_cooldown(&mut self, now: TimestampMs) -> Result<TimestampMs> {
        let mut state = self.store.state()?;
        state.cooldown_until = now + self.cfg.cooldown_ms();
        state.last_activity_at = now;
        self.store.put_state(&state)?;
        log(
            Level::Info,
            Domain::Policy,
            "cooldown",
            obj(&[("until", v_u64(state.cooldown_until))]),
        );
        Ok(state.cooldown_until)
    }

    pub fn update_last_stake(&mut self, stake: f64, now: TimestampMs) -> Result<()> {
        let mut state = self.store.state()?;
        state.last_stake = stake;
        state.push_recent_stake(stake);
        state.last_activity_at = now;
        self.store.put_state(&state)?;
        Ok(())
    }

    /// Persist a new rule record through the modification gate.
    ///
    /// Outer error = storage failure; inner error = gate or validation
    /// rejection with nothing written. On success the new rules and the
    /// 24h lock land in one transaction and the lock expiry is returned.
    pub fn save_rules(&mut self, rules: &Rules, now: TimestampMs) -> Result<Result<TimestampMs, SaveError>> {
        let mut state = self.store.state()?;

        if let Err(denied) = can_modify_rules(&state, now) {
            log(
                Level::Warn,
                Domain::Policy,
                "rules_rejected",
                obj(&[("reason", v_str(&denied.to_string()))]),
            );
            return Ok(Err(denied));
        }
        if let Err(invalid) = validate_rules(rules) {
            log(
                Level::Warn,
                Domain::Policy,
                "rules_rejected",
                obj(&[("reason", v_str(&invalid.to_string()))]),
            );
            return Ok(Err(invalid));
        }

        let locked_until = now + self.cfg.rule_lock_ms();
        state.rules_locked_until = locked_until;
        state.configured = true;
        self.store.put_rules_and_state(rules, &state)?;

        log(
            Level::Info,
            Domain::Policy,
            "rules_saved",
            obj(&[
                ("stake_max", v_num(rules.stake_max)),
                ("daily_stop_loss", v_num(rules.daily_stop_loss)),
                ("locked_until", v_u64(locked_until)),
            ]),
        );
        Ok(Ok(locked_until))
    }

    /// Redeem an access code into the stored license fields.
    pub fn redeem_license(&mut self, code: &str, now: TimestampMs) -> Result<Result<LicenseGrant, LicenseError>> {
        let grant = match redeem_code(code, now) {
            Ok(grant) => grant,
            Err(err) => return Ok(Err(err)),
        };

        let mut state = self.store.state()?;
        state.license_code = grant.code.clone();
        state.license_valid_until = grant.valid_until;
        state.license_status = grant.status;
        self.store.put_state(&state)?;

        log(
            Level::Info,
            Domain::License,
            "redeemed",
            obj(&[("valid_until", v_u64(grant.valid_until))]),
        );
        Ok(Ok(grant))
    }
}
