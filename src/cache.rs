//! Read-through cache over the policy store.
//!
//! Each execution context owns its own cache; the store stays authoritative
//! and all mutations go through the controller. Staleness is detected by
//! comparing the store's per-record generation counter against the one seen
//! at load time, so a write anywhere in the process invalidates the cached
//! copy on the next read.

use anyhow::Result;

use crate::policy::{Rules, RuleState};
use crate::store::{PolicyStore, RecordKind};

#[derive(Default)]
pub struct PolicyCache {
    rules: Option<(u64, Rules)>,
    state: Option<(u64, RuleState)>,
}

impl PolicyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules(&mut self, store: &PolicyStore) -> Result<Rules> {
        let current = store.generation(RecordKind::Rules);
        if let Some((seen, rules)) = &self.rules {
            if *seen == current {
                return Ok(rules.clone());
            }
        }
        let rules = store.rules()?;
        self.rules = Some((current, rules.clone()));
        Ok(rules)
    }

    pub fn state(&mut self, store: &PolicyStore) -> Result<RuleState> {
        let current = store.generation(RecordKind::State);
        if let Some((seen, state)) = &self.state {
            if *seen == current {
                return Ok(state.clone());
            }
        }
        let state = store.state()?;
        self.state = Some((current, state.clone()));
        Ok(state)
    }

    /// Drop both cached records unconditionally.
    pub fn invalidate(&mut self) {
        self.rules = None;
        self.state = None;
    }
}
