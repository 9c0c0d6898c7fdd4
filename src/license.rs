//! License status projection and payment-code generation.
//!
//! The projection is a pure read-only function over `RuleState` + now,
//! recomputed on every status request so the displayed status never goes
//! stale. It never feeds back into bet evaluation.

use thiserror::Error;

use crate::policy::{LicenseStatus, RuleState, TimestampMs};

const THIRTY_DAYS_MS: u64 = 30 * 24 * 60 * 60 * 1000;

pub fn has_valid_license(state: &RuleState, now: TimestampMs) -> bool {
    if state.license_code.is_empty() {
        return false;
    }
    if state.license_status == LicenseStatus::Expired || state.license_valid_until == 0 {
        return false;
    }
    state.license_valid_until > now
}

/// Display status derived fresh from the stored license fields.
pub fn derive_license_status(state: &RuleState, now: TimestampMs) -> LicenseStatus {
    if state.license_code.is_empty() {
        return LicenseStatus::None;
    }
    if state.license_valid_until <= now {
        return LicenseStatus::Expired;
    }
    if state.license_status == LicenseStatus::Trial {
        LicenseStatus::Trial
    } else {
        LicenseStatus::Paid
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LicenseGrant {
    pub code: String,
    pub valid_until: TimestampMs,
    pub status: LicenseStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LicenseError {
    #[error("Access code cannot be empty.")]
    EmptyCode,
}

/// Accept an access code and grant 30 days of paid status. Any non-empty
/// trimmed code is accepted; cryptographic verification is out of scope.
pub fn redeem_code(code: &str, now: TimestampMs) -> Result<LicenseGrant, LicenseError> {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        return Err(LicenseError::EmptyCode);
    }
    Ok(LicenseGrant {
        code: trimmed.to_string(),
        valid_until: now + THIRTY_DAYS_MS,
        status: LicenseStatus::Paid,
    })
}

// ---------------------------------------------------------------------------
// Static PIX payment code (EMV merchant-presented payload)
// ---------------------------------------------------------------------------

const PIX_KEY: &str = "62776577000147";
const MERCHANT_NAME: &str = "GUARDRAIL";
const MERCHANT_CITY: &str = "SAO PAULO";
const AMOUNT: &str = "19.90";
const TXID: &str = "GRBETA";
const PIX_GUI: &str = "BR.GOV.BCB.PIX";

fn emv_field(id: &str, value: &str) -> String {
    format!("{id}{:02}{value}", value.len())
}

/// CRC-16/CCITT-FALSE over the payload bytes, upper-hex.
pub fn crc16(payload: &str) -> String {
    let mut crc: u16 = 0xffff;
    for byte in payload.bytes() {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    format!("{crc:04X}")
}

/// Static "copia e cola" payload shown next to the QR code.
pub fn payment_payload() -> String {
    let account_info = format!("{}{}", emv_field("00", PIX_GUI), emv_field("01", PIX_KEY));

    let mut payload = String::new();
    payload.push_str("000201"); // payload format indicator
    payload.push_str(&emv_field("26", &account_info));
    payload.push_str("52040000"); // merchant category code
    payload.push_str("5303986"); // currency BRL
    payload.push_str(&emv_field("54", AMOUNT));
    payload.push_str("5802BR");
    payload.push_str(&emv_field("59", MERCHANT_NAME));
    payload.push_str(&emv_field("60", MERCHANT_CITY));
    payload.push_str(&emv_field("62", &emv_field("05", TXID)));
    payload.push_str("6304"); // CRC field header, checksum covers it

    let crc = crc16(&payload);
    payload.push_str(&crc);
    payload
}
