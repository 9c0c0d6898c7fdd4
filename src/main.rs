//! Guardrail daemon: one dispatch loop, two periodic scheduler drivers.
//!
//! Requests arrive as newline-delimited JSON on stdin; each is answered with
//! one JSON line on stdout. Diagnostics go to stderr (see `logging`). All
//! mutations serialize through this single task, so concurrent collaborators
//! never interleave read-modify-write cycles.

use anyhow::Result;
use std::io::Write;
use tokio::io::AsyncBufReadExt;
use tokio::time::{interval, Duration, MissedTickBehavior};

use guardrail::controller::Controller;
use guardrail::logging::{log, obj, v_str, Domain, Level};
use guardrail::protocol::Daemon;
use guardrail::scheduler::{check_daily_reset, check_session_timeout};
use guardrail::state::{now_ms, today_utc, Config};
use guardrail::store::PolicyStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let mut store = PolicyStore::open(&cfg.db_path)?;
    store.init()?;

    // Catch up before serving: the process may have been down across a
    // day rollover or an idle session.
    check_daily_reset(&mut store, &today_utc())?;
    check_session_timeout(&mut store, &cfg, now_ms())?;

    let mut daemon = Daemon::new(Controller::new(store, cfg.clone()));
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[("db", v_str(&cfg.db_path))]),
    );

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut daily = interval(Duration::from_secs(cfg.daily_reset_poll_secs.max(1)));
    let mut timeout = interval(Duration::from_secs(cfg.timeout_poll_secs.max(1)));
    // Ticks may be delayed arbitrarily (system sleep, throttling); the checks
    // compare wall-clock thresholds, so skipping missed ticks is safe.
    daily.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timeout.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let response = daemon.handle_line(line);
                writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
                stdout.flush()?;
            }
            _ = daily.tick() => {
                if let Err(err) = check_daily_reset(daemon.controller_mut().store_mut(), &today_utc()) {
                    log(Level::Error, Domain::Scheduler, "daily_reset_failed",
                        obj(&[("error", v_str(&err.to_string()))]));
                }
            }
            _ = timeout.tick() => {
                if let Err(err) = check_session_timeout(daemon.controller_mut().store_mut(), &cfg, now_ms()) {
                    log(Level::Error, Domain::Scheduler, "session_timeout_failed",
                        obj(&[("error", v_str(&err.to_string()))]));
                }
            }
        }
    }

    log(Level::Info, Domain::System, "shutdown", obj(&[]));
    Ok(())
}
