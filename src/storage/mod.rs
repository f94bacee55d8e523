//! Storage layer for observation sessions.
//!
//! Sessions are written whole (header, counters and every decision record)
//! and read back field-for-field, so a persisted session can be measured
//! with the same aggregator as a live one.

mod sqlite;

pub use sqlite::SqliteStorage;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::observer::{DecisionRecord, Session};

/// Storage backend trait
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert or replace a session together with its decisions.
    async fn save_session(&self, session: &Session) -> StorageResult<()>;
    /// Get a session by ID, decisions included.
    async fn get_session(&self, id: &str) -> StorageResult<Option<Session>>;
    /// Get a session's decisions in recording order.
    async fn get_session_decisions(&self, session_id: &str) -> StorageResult<Vec<DecisionRecord>>;
    /// Stored session IDs, oldest first.
    async fn list_session_ids(&self) -> StorageResult<Vec<String>>;
    /// Fraction (0-1) of successful decisions per agent across all stored sessions.
    async fn agent_success_rates(&self, agent_id: Option<&str>)
        -> StorageResult<BTreeMap<String, f64>>;
}
