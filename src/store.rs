//! Durable policy store: two named JSON records (`rules`, `state`) in sqlite.
//!
//! Reads merge defaults, so a record written by an older build never surfaces
//! missing fields. Writes run inside a transaction; a failed write leaves the
//! prior record intact. Each successful write bumps an in-process generation
//! counter that read-through caches compare against (see `cache`).

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::policy::{Rules, RuleState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Rules,
    State,
}

impl RecordKind {
    fn name(self) -> &'static str {
        match self {
            RecordKind::Rules => "rules",
            RecordKind::State => "state",
        }
    }

    fn index(self) -> usize {
        match self {
            RecordKind::Rules => 0,
            RecordKind::State => 1,
        }
    }
}

pub struct PolicyStore {
    conn: Connection,
    generations: [u64; 2],
}

impl PolicyStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("open policy store {path}"))?;
        Ok(Self { conn, generations: [0; 2] })
    }

    /// Throwaway store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()?, generations: [0; 2] })
    }

    pub fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS records (
                name TEXT PRIMARY KEY,
                body TEXT NOT NULL
            );
            COMMIT;",
        )?;
        Ok(())
    }

    /// Monotonic per-record write counter. Starts at 0 per process; any
    /// successful write bumps it.
    pub fn generation(&self, kind: RecordKind) -> u64 {
        self.generations[kind.index()]
    }

    pub fn rules(&self) -> Result<Rules> {
        self.read(RecordKind::Rules)
    }

    pub fn state(&self) -> Result<RuleState> {
        self.read(RecordKind::State)
    }

    pub fn put_rules(&mut self, rules: &Rules) -> Result<()> {
        self.write(RecordKind::Rules, rules)?;
        self.bump(RecordKind::Rules);
        Ok(())
    }

    pub fn put_state(&mut self, state: &RuleState) -> Result<()> {
        self.write(RecordKind::State, state)?;
        self.bump(RecordKind::State);
        Ok(())
    }

    /// Write both records in one transaction. Used by the rule save so the
    /// new rules and the 24h lock land together or not at all.
    pub fn put_rules_and_state(&mut self, rules: &Rules, state: &RuleState) -> Result<()> {
        let tx = self.conn.transaction()?;
        let rules_body = serde_json::to_string(rules)?;
        let state_body = serde_json::to_string(state)?;
        tx.execute(
            "INSERT OR REPLACE INTO records (name, body) VALUES (?1, ?2)",
            params![RecordKind::Rules.name(), rules_body],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO records (name, body) VALUES (?1, ?2)",
            params![RecordKind::State.name(), state_body],
        )?;
        tx.commit()?;
        self.bump(RecordKind::Rules);
        self.bump(RecordKind::State);
        Ok(())
    }

    fn read<T>(&self, kind: RecordKind) -> Result<T>
    where
        T: Default + serde::de::DeserializeOwned,
    {
        let body: Option<String> = self
            .conn
            .query_row("SELECT body FROM records WHERE name = ?1", params![kind.name()], |row| {
                row.get(0)
            })
            .optional()?;
        match body {
            Some(body) => serde_json::from_str(&body)
                .with_context(|| format!("corrupt {} record", kind.name())),
            None => Ok(T::default()),
        }
    }

    fn write<T: serde::Serialize>(&mut self, kind: RecordKind, value: &T) -> Result<()> {
        let body = serde_json::to_string(value)?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO records (name, body) VALUES (?1, ?2)",
            params![kind.name(), body],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn bump(&mut self, kind: RecordKind) {
        self.generations[kind.index()] += 1;
    }
}
