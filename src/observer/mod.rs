//! Session-scoped decision tracking.
//!
//! This module provides:
//! - [`Observer`]: the session store and decision tracker
//! - [`SessionGuard`]: scoped acquisition that always closes its session
//! - [`SessionMetrics`] and [`aggregate`]: per-session summary statistics
//! - [`DecisionAnalyzer`]: per-agent and per-pattern success breakdowns
//!
//! Data flows inward (adapter → tracker → store) and outward on query
//! (store → aggregator → caller). Nothing here calls back into agents.

mod analysis;
mod metrics;
mod scope;
mod store;

pub use analysis::*;
pub use metrics::*;
pub use scope::*;
pub use store::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::decision::Payload;

/// Metadata key holding the response time in seconds.
pub const RESPONSE_TIME_KEY: &str = "response_time";
/// Metadata key holding the token usage.
pub const TOKEN_USAGE_KEY: &str = "token_usage";
/// Metadata key holding the success flag.
pub const SUCCESS_KEY: &str = "success";

/// Typed reference to a session in an [`Observer`].
///
/// Handles are returned by [`Observer::open_session`] and passed to every
/// call that mutates a session, so concurrent flows never depend on a shared
/// "current session" pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(String);

impl SessionHandle {
    /// Wrap a known session identifier, e.g. one received over the wire.
    pub fn from_id(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The session identifier.
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionHandle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One observed unit of agent behaviour. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Agent that made the decision.
    pub agent_id: String,
    /// When the record was appended.
    pub timestamp: DateTime<Utc>,
    /// Opaque inputs.
    #[serde(default)]
    pub inputs: Payload,
    /// Opaque outputs.
    #[serde(default)]
    pub outputs: Payload,
    /// Metadata; `response_time`, `token_usage` and `success` are recognised.
    #[serde(default)]
    pub metadata: Payload,
}

impl DecisionRecord {
    /// Create a record timestamped now.
    pub fn new(
        agent_id: impl Into<String>,
        inputs: Payload,
        outputs: Payload,
        metadata: Payload,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            timestamp: Utc::now(),
            inputs,
            outputs,
            metadata,
        }
    }

    /// Response time in seconds; missing or non-numeric values read as 0.
    pub fn response_time(&self) -> f64 {
        numeric(self.metadata.get(RESPONSE_TIME_KEY))
    }

    /// Token usage; missing or non-numeric values read as 0.
    pub fn token_usage(&self) -> f64 {
        numeric(self.metadata.get(TOKEN_USAGE_KEY))
    }

    /// True only when `metadata.success` is the boolean `true`.
    pub fn succeeded(&self) -> bool {
        matches!(self.metadata.get(SUCCESS_KEY), Some(Value::Bool(true)))
    }

    /// True only when `metadata.success` is the boolean `false`.
    pub fn failed(&self) -> bool {
        matches!(self.metadata.get(SUCCESS_KEY), Some(Value::Bool(false)))
    }

    /// Flatten into a JSON mapping for external storage.
    pub fn to_payload(&self) -> serde_json::Result<Payload> {
        serde_json::to_value(self).and_then(serde_json::from_value)
    }

    /// Rebuild a record from [`DecisionRecord::to_payload`] output.
    pub fn from_payload(payload: Payload) -> serde_json::Result<Self> {
        serde_json::from_value(Value::Object(payload))
    }
}

fn numeric(value: Option<&Value>) -> f64 {
    value
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Running totals maintained as records are appended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionCounters {
    /// Sum of token usage.
    pub total_tokens: u64,
    /// Sum of response times in seconds.
    pub total_time: f64,
    /// Decisions whose `success` is `true`.
    pub success_count: u64,
    /// Decisions whose `success` is `false`.
    pub failure_count: u64,
}

impl SessionCounters {
    fn record(&mut self, decision: &DecisionRecord) {
        let tokens = decision.token_usage();
        if tokens > 0.0 {
            self.total_tokens = self.total_tokens.saturating_add(tokens.round() as u64);
        }
        self.total_time += decision.response_time().max(0.0);
        if decision.succeeded() {
            self.success_count += 1;
        } else if decision.failed() {
            self.failure_count += 1;
        }
    }
}

/// A bounded observation window and the decisions recorded in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Identifier, unique within the owning store.
    pub id: String,
    /// When the session was opened.
    pub started_at: DateTime<Utc>,
    /// Set exactly once, when the session closes.
    pub ended_at: Option<DateTime<Utc>>,
    /// Append-only while the session is open.
    pub decisions: Vec<DecisionRecord>,
    /// Running totals over `decisions`.
    pub counters: SessionCounters,
}

impl Session {
    pub(crate) fn open(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            started_at: Utc::now(),
            ended_at: None,
            decisions: Vec::new(),
            counters: SessionCounters::default(),
        }
    }

    /// True until the session is closed.
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    pub(crate) fn append(&mut self, decision: DecisionRecord) {
        self.counters.record(&decision);
        self.decisions.push(decision);
    }

    /// Set the end timestamp if unset; never earlier than the start.
    pub(crate) fn close(&mut self) -> bool {
        if self.ended_at.is_some() {
            return false;
        }
        self.ended_at = Some(Utc::now().max(self.started_at));
        true
    }

    /// Elapsed seconds, using `now` as the end of a still-open session.
    pub fn duration_secs(&self) -> f64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}
