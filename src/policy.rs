//! Policy data model: the two persisted records (`Rules`, `RuleState`) and
//! the evaluator's decision types.
//!
//! Every field carries a serde default so a record written by an older build
//! deserializes cleanly with missing fields at their defaults.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

/// Epoch milliseconds.
pub type TimestampMs = u64;

/// How many past stakes the escalation history keeps.
pub const RECENT_STAKES_CAP: usize = 5;

/// User-configured limits. Mutated only through the rule-modification gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rules {
    /// Reference stake size (0 = unset).
    pub stake_base: f64,
    /// Hard per-bet ceiling (0 = no ceiling enforced).
    pub stake_max: f64,
    /// Cumulative daily loss ceiling (0 = disabled).
    pub daily_stop_loss: f64,
    /// Enables loss-streak / escalation protections.
    pub escalation_guard_enabled: bool,
    /// Market restrictions, persisted and returned verbatim, never evaluated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_policy: Option<MarketPolicy>,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            stake_base: 0.0,
            stake_max: 0.0,
            daily_stop_loss: 0.0,
            escalation_guard_enabled: true,
            market_policy: None,
        }
    }
}

/// Pass-through market restrictions owned by the UI layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketPolicy {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier_restriction: Option<String>,
    pub blocked_sports: BTreeSet<String>,
    pub blocked_competitions: BTreeSet<String>,
}

/// Mutable runtime counters. Written only by the state controller and the
/// daily-reset / session-timeout scheduler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleState {
    pub loss_streak: u32,
    pub daily_loss: f64,
    /// Absolute instant after which cooldown blocking ceases (0 = inactive).
    pub cooldown_until: TimestampMs,
    pub session_active: bool,
    /// Rules may not change before this instant (0 = unlocked).
    pub rules_locked_until: TimestampMs,
    pub blocks_today: u32,
    /// UTC calendar date of the last daily reset, `%Y-%m-%d`. Empty = never.
    pub last_reset_date: String,
    pub configured: bool,
    pub last_stake: f64,
    /// Bounded FIFO of the most recent stakes, oldest first.
    pub recent_stakes: VecDeque<f64>,
    pub last_activity_at: TimestampMs,
    pub license_code: String,
    pub license_valid_until: TimestampMs,
    pub license_status: LicenseStatus,
}

impl RuleState {
    /// Append a stake to the history, evicting the oldest beyond the cap.
    pub fn push_recent_stake(&mut self, stake: f64) {
        self.recent_stakes.push_back(stake);
        while self.recent_stakes.len() > RECENT_STAKES_CAP {
            self.recent_stakes.pop_front();
        }
    }
}

/// Stored license tier. Display-only; never feeds back into evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    #[default]
    None,
    Trial,
    Paid,
    Expired,
}

/// Why a bet was denied. Wire names are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    CooldownActive,
    DailyStopLoss,
    StakeExceeded,
    StakeEscalation,
}

/// Outcome of evaluating a single bet attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allow,
    Deny {
        reason: BlockReason,
        /// User-facing text for the block-notification renderer.
        message: String,
        /// Escalation denials ask the caller to start a cooldown.
        activate_cooldown: bool,
    },
}

impl Decision {
    pub fn allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn reason(&self) -> Option<BlockReason> {
        match self {
            Decision::Allow => None,
            Decision::Deny { reason, .. } => Some(*reason),
        }
    }
}
