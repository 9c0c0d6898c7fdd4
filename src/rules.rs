//! Pure rule evaluation: (stake, Rules, RuleState, now) -> Decision.
//!
//! No side effects, no I/O. Checks run in fixed priority order and the first
//! match wins, so a single call never reports two reasons:
//!
//! 1. cooldown active      (session-ending, preempts everything)
//! 2. daily stop-loss      (session-ending)
//! 3. stake ceiling        (absolute per-bet limit)
//! 4. stake escalation     (heuristic over stake history, softest)

use chrono::Local;
use thiserror::Error;

use crate::policy::{BlockReason, Decision, Rules, RuleState, TimestampMs};

/// A stake is escalation when it exceeds the previous stake by this factor.
/// The boundary is inclusive-allow: exactly 1.5x passes.
pub const ESCALATION_FACTOR: f64 = 1.5;

/// Evaluate a single bet attempt against the configured limits.
pub fn evaluate(stake: f64, rules: &Rules, state: &RuleState, now: TimestampMs) -> Decision {
    if state.cooldown_until > now {
        return Decision::Deny {
            reason: BlockReason::CooldownActive,
            message: format!("Cooldown active until {}.", format_clock(state.cooldown_until)),
            activate_cooldown: false,
        };
    }

    if rules.daily_stop_loss > 0.0 && state.daily_loss >= rules.daily_stop_loss {
        return Decision::Deny {
            reason: BlockReason::DailyStopLoss,
            message: "Daily stop-loss reached. Session ended.".to_string(),
            activate_cooldown: false,
        };
    }

    if rules.stake_max > 0.0 && stake > rules.stake_max {
        return Decision::Deny {
            reason: BlockReason::StakeExceeded,
            message: format!("Stake above the configured limit (max: {:.2}).", rules.stake_max),
            activate_cooldown: false,
        };
    }

    if rules.escalation_guard_enabled
        && state.last_stake > 0.0
        && stake > state.last_stake * ESCALATION_FACTOR
    {
        return Decision::Deny {
            reason: BlockReason::StakeEscalation,
            message: "Stake escalation detected. Cooldown activated.".to_string(),
            activate_cooldown: true,
        };
    }

    Decision::Allow
}

/// Why a rule save was rejected. The whole update is rejected wholesale;
/// no partial field updates occur.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaveError {
    #[error("Rules cannot be changed during an active session.")]
    SessionActive,
    #[error("Rules are locked until {until}.")]
    Locked { until: String },
    #[error("{0}")]
    Invalid(String),
}

/// Gate guarding rule changes: denied during an active session, denied while
/// the 24h lock from the previous save still runs.
pub fn can_modify_rules(state: &RuleState, now: TimestampMs) -> Result<(), SaveError> {
    if state.session_active {
        return Err(SaveError::SessionActive);
    }
    if state.rules_locked_until > now {
        return Err(SaveError::Locked {
            until: format_instant(state.rules_locked_until),
        });
    }
    Ok(())
}

/// Validate a candidate rule record at the save boundary.
pub fn validate_rules(rules: &Rules) -> Result<(), SaveError> {
    if !(rules.stake_base > 0.0) {
        return Err(SaveError::Invalid("Base stake must be greater than zero.".to_string()));
    }
    if !(rules.stake_max > 0.0) {
        return Err(SaveError::Invalid("Maximum stake must be greater than zero.".to_string()));
    }
    if rules.stake_max < rules.stake_base {
        return Err(SaveError::Invalid(
            "Maximum stake cannot be smaller than the base stake.".to_string(),
        ));
    }
    if !(rules.daily_stop_loss > 0.0) {
        return Err(SaveError::Invalid("Daily stop-loss must be greater than zero.".to_string()));
    }
    Ok(())
}

/// Local wall-clock `HH:MM` of an instant, for user-facing messages.
fn format_clock(ts: TimestampMs) -> String {
    chrono::DateTime::from_timestamp_millis(ts as i64)
        .map(|dt| dt.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_default()
}

/// Local date and time of an instant, for the lock-expiry message.
fn format_instant(ts: TimestampMs) -> String {
    chrono::DateTime::from_timestamp_millis(ts as i64)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}
