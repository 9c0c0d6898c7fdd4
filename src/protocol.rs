//! Message protocol between the core and its UI/DOM collaborators.
//!
//! Requests are a closed tagged sum type, exhaustively matched, so adding a
//! message kind is a compile-time-checked change. Anything that does not
//! parse into it answers `{"error":"unknown message type"}` without mutating
//! anything.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::cache::PolicyCache;
use crate::controller::Controller;
use crate::license::derive_license_status;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::policy::{LicenseStatus, Rules, RuleState, TimestampMs};
use crate::scheduler::{check_daily_reset, check_session_timeout};
use crate::state::date_of_ms;

pub const UNKNOWN_MESSAGE: &str = "unknown message type";

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    #[serde(rename = "GET_STATUS")]
    GetStatus,
    #[serde(rename = "START_SESSION")]
    StartSession,
    #[serde(rename = "END_SESSION")]
    EndSession,
    #[serde(rename = "REGISTER_LOSS")]
    RegisterLoss {
        amount: f64,
        #[serde(rename = "currentStake", default)]
        current_stake: f64,
    },
    #[serde(rename = "REGISTER_WIN")]
    RegisterWin,
    #[serde(rename = "REGISTER_BLOCK")]
    RegisterBlock,
    #[serde(rename = "ACTIVATE_COOLDOWN")]
    ActivateCooldown,
    #[serde(rename = "UPDATE_LAST_STAKE")]
    UpdateLastStake { stake: f64 },
    #[serde(rename = "SAVE_RULES")]
    SaveRules { rules: Rules },
    #[serde(rename = "REDEEM_LICENSE")]
    RedeemLicense { code: String },
    #[serde(rename = "GET_PAYMENT_CODE")]
    GetPaymentCode,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Response {
    Status(Box<StatusResponse>),
    Loss {
        ok: bool,
        #[serde(rename = "cooldownActivated")]
        cooldown_activated: bool,
    },
    Saved {
        ok: bool,
        #[serde(rename = "lockedUntil")]
        locked_until: TimestampMs,
    },
    License {
        ok: bool,
        #[serde(rename = "validUntil")]
        valid_until: TimestampMs,
        status: LicenseStatus,
    },
    PaymentCode { ok: bool, payload: String },
    Ok { ok: bool },
    Error { error: String },
}

impl Response {
    fn ok() -> Self {
        Response::Ok { ok: true }
    }

    fn error(message: impl Into<String>) -> Self {
        Response::Error { error: message.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub rules: Rules,
    /// Stored state with the license status projected fresh.
    pub state: RuleState,
    pub cooldown_active: bool,
    pub cooldown_remaining: u64,
    pub daily_stop_reached: bool,
}

/// Single-actor front end: owns the controller and a read-through cache, and
/// serializes every mutation through its caller's one dispatch loop.
pub struct Daemon {
    ctrl: Controller,
    cache: PolicyCache,
}

impl Daemon {
    pub fn new(ctrl: Controller) -> Self {
        Self { ctrl, cache: PolicyCache::new() }
    }

    pub fn controller(&self) -> &Controller {
        &self.ctrl
    }

    pub fn controller_mut(&mut self) -> &mut Controller {
        &mut self.ctrl
    }

    /// Parse one request line and dispatch it at wall-clock time.
    pub fn handle_line(&mut self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.dispatch(request, crate::state::now_ms()),
            Err(_) => {
                log(
                    Level::Warn,
                    Domain::System,
                    "unknown_message",
                    obj(&[("line", v_str(line))]),
                );
                Response::error(UNKNOWN_MESSAGE)
            }
        }
    }

    /// Dispatch a request at an explicit instant. No request mutates state
    /// when its operation fails; storage failures surface as error payloads
    /// and the prior records stay intact.
    pub fn dispatch(&mut self, request: Request, now: TimestampMs) -> Response {
        let outcome = match request {
            Request::GetStatus => self.status(now).map(|s| Response::Status(Box::new(s))),
            Request::StartSession => self.ctrl.start_session(now).map(|()| Response::ok()),
            Request::EndSession => self.ctrl.end_session().map(|()| Response::ok()),
            Request::RegisterLoss { amount, current_stake } => self
                .ctrl
                .register_loss(amount, current_stake, now)
                .map(|cooldown_activated| Response::Loss { ok: true, cooldown_activated }),
            Request::RegisterWin => self.ctrl.register_win().map(|()| Response::ok()),
            Request::RegisterBlock => self.ctrl.register_block(now).map(|()| Response::ok()),
            Request::ActivateCooldown => self.ctrl.activate_cooldown(now).map(|_| Response::ok()),
            Request::UpdateLastStake { stake } => {
                self.ctrl.update_last_stake(stake, now).map(|()| Response::ok())
            }
            Request::SaveRules { rules } => self.ctrl.save_rules(&rules, now).map(|saved| match saved {
                Ok(locked_until) => Response::Saved { ok: true, locked_until },
                Err(denied) => Response::error(denied.to_string()),
            }),
            Request::RedeemLicense { code } => {
                self.ctrl.redeem_license(&code, now).map(|redeemed| match redeemed {
                    Ok(grant) => Response::License {
                        ok: true,
                        valid_until: grant.valid_until,
                        status: grant.status,
                    },
                    Err(invalid) => Response::error(invalid.to_string()),
                })
            }
            Request::GetPaymentCode => Ok(Response::PaymentCode {
                ok: true,
                payload: crate::license::payment_payload(),
            }),
        };

        outcome.unwrap_or_else(|err| {
            log(
                Level::Error,
                Domain::System,
                "dispatch_failed",
                obj(&[("error", v_str(&err.to_string()))]),
            );
            Response::error(err.to_string())
        })
    }

    /// Full status snapshot. Runs both scheduler checks first, so a status
    /// read after midnight or after a long idle stretch self-corrects before
    /// reporting.
    fn status(&mut self, now: TimestampMs) -> Result<StatusResponse> {
        let cfg = self.ctrl.config().clone();
        check_daily_reset(self.ctrl.store_mut(), &date_of_ms(now))?;
        check_session_timeout(self.ctrl.store_mut(), &cfg, now)?;

        let rules = self.cache.rules(self.ctrl.store())?;
        let mut state = self.cache.state(self.ctrl.store())?;
        state.license_status = derive_license_status(&state, now);

        let daily_stop_reached = rules.daily_stop_loss > 0.0 && state.daily_loss >= rules.daily_stop_loss;
        Ok(StatusResponse {
            cooldown_active: state.cooldown_until > now,
            cooldown_remaining: state.cooldown_until.saturating_sub(now),
            daily_stop_reached,
            rules,
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_tags_parse() {
        let req: Request = serde_json::from_str(r#"{"type":"GET_STATUS"}"#).unwrap();
        assert!(matches!(req, Request::GetStatus));

        let req: Request =
            serde_json::from_str(r#"{"type":"REGISTER_LOSS","amount":12.5,"currentStake":5.0}"#).unwrap();
        match req {
            Request::RegisterLoss { amount, current_stake } => {
                assert_eq!(amount, 12.5);
                assert_eq!(current_stake, 5.0);
            }
            other => panic!("unexpected request {:?}", other),
        }

        assert!(serde_json::from_str::<Request>(r#"{"type":"SELF_DESTRUCT"}"#).is_err());
    }

    #[test]
    fn responses_serialize_with_wire_names() {
        let body = serde_json::to_string(&Response::Loss { ok: true, cooldown_activated: true }).unwrap();
        assert_eq!(body, r#"{"ok":true,"cooldownActivated":true}"#);

        let body = serde_json::to_string(&Response::error(UNKNOWN_MESSAGE)).unwrap();
        assert_eq!(body, r#"{"error":"unknown message type"}"#);
    }
}
