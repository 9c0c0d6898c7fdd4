//! Guardrail: a self-imposed betting risk-control core.
//!
//! The crate holds the rule evaluation engine and the persisted state machine
//! governing session, cooldown, daily-loss, and rule-lock transitions. DOM
//! scraping, UI rendering, and the browser shell are external collaborators
//! that talk to this core over the `protocol` message types.
//!
//! Architecture:
//! ```text
//! bet attempt ──► rules::evaluate (pure) ──► Decision
//!                      ▲                        │ deny
//!                      │                        ▼
//!   store ◄── controller (only State writer) ◄── protocol::Daemon
//!     ▲                                             ▲
//!     └── scheduler (daily reset / session timeout) ┘
//! ```

pub mod cache;
pub mod controller;
pub mod license;
pub mod logging;
pub mod policy;
pub mod protocol;
pub mod rules;
pub mod scheduler;
pub mod state;
pub mod store;
