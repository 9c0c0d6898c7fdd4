//! Runtime configuration and wall-clock helpers.

use chrono::Utc;

use crate::policy::TimestampMs;

#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the sqlite policy store.
    pub db_path: String,
    /// Cooldown duration applied on activation.
    pub cooldown_secs: u64,
    /// Rule lock applied after a successful rule save.
    pub rule_lock_secs: u64,
    /// Inactivity window after which an active session is force-ended.
    pub session_timeout_secs: u64,
    /// Poll interval of the daily-reset check.
    pub daily_reset_poll_secs: u64,
    /// Poll interval of the session-timeout check.
    pub timeout_poll_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            db_path: std::env::var("GUARDRAIL_DB").unwrap_or_else(|_| "./guardrail.sqlite".to_string()),
            cooldown_secs: env_u64("COOLDOWN_SECS", 3600),
            rule_lock_secs: env_u64("RULE_LOCK_SECS", 86_400),
            session_timeout_secs: env_u64("SESSION_TIMEOUT_SECS", 1200),
            daily_reset_poll_secs: env_u64("DAILY_RESET_POLL_SECS", 60),
            timeout_poll_secs: env_u64("TIMEOUT_POLL_SECS", 300),
        }
    }

    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_secs * 1000
    }

    pub fn rule_lock_ms(&self) -> u64 {
        self.rule_lock_secs * 1000
    }

    pub fn session_timeout_ms(&self) -> u64 {
        self.session_timeout_secs * 1000
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "./guardrail.sqlite".to_string(),
            cooldown_secs: 3600,
            rule_lock_secs: 86_400,
            session_timeout_secs: 1200,
            daily_reset_poll_secs: 60,
            timeout_poll_secs: 300,
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> TimestampMs {
    Utc::now().timestamp_millis() as TimestampMs
}

/// Today's UTC calendar date, `%Y-%m-%d`.
pub fn today_utc() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Calendar date of an epoch-milliseconds instant, `%Y-%m-%d` (UTC).
pub fn date_of_ms(ts: TimestampMs) -> String {
    chrono::DateTime::from_timestamp_millis(ts as i64)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_of_ms_formats_utc_date() {
        // 2024-01-02T03:04:05Z
        assert_eq!(date_of_ms(1_704_164_645_000), "2024-01-02");
    }

    #[test]
    fn defaults_match_env_free_config() {
        let cfg = Config::default();
        assert_eq!(cfg.cooldown_ms(), 3_600_000);
        assert_eq!(cfg.rule_lock_ms(), 86_400_000);
        assert_eq!(cfg.session_timeout_ms(), 1_200_000);
    }
}
