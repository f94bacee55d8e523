use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{DecisionRecord, Session, SessionCounters};

/// Per-decision averages over a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Averages {
    /// Mean response time in seconds.
    pub avg_response_time: f64,
    /// Mean token usage.
    pub avg_token_usage: f64,
    /// Percentage (0-100) of decisions whose metadata reports `success: true`.
    pub success_rate: f64,
}

/// Summary statistics for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// Session identifier.
    pub session_id: String,
    /// Whether the session was still open when measured.
    pub open: bool,
    /// Seconds from start to end, or to now for an open session.
    pub duration: f64,
    /// Number of decisions recorded.
    pub decision_count: usize,
    /// Distinct agent ids.
    pub agents: BTreeSet<String>,
    /// Per-decision averages.
    pub averages: Averages,
    /// Running totals.
    pub counters: SessionCounters,
}

impl SessionMetrics {
    /// Measure a session; an open one is measured up to now.
    pub fn from_session(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            open: session.is_open(),
            duration: session.duration_secs(),
            decision_count: session.decisions.len(),
            agents: session
                .decisions
                .iter()
                .map(|d| d.agent_id.clone())
                .collect(),
            averages: aggregate(&session.decisions),
            counters: session.counters.clone(),
        }
    }
}

/// Compute averages over a decision sequence.
///
/// An empty sequence yields all-zero averages. Missing `response_time` and
/// `token_usage` values count as 0.
pub fn aggregate(decisions: &[DecisionRecord]) -> Averages {
    if decisions.is_empty() {
        return Averages::default();
    }

    let count = decisions.len() as f64;
    let (response_time, token_usage, successes) =
        decisions
            .iter()
            .fold((0.0, 0.0, 0usize), |(time, tokens, ok), d| {
                (
                    time + d.response_time(),
                    tokens + d.token_usage(),
                    ok + usize::from(d.succeeded()),
                )
            });

    Averages {
        avg_response_time: response_time / count,
        avg_token_usage: token_usage / count,
        success_rate: successes as f64 / count * 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Payload;
    use serde_json::json;

    fn record(agent: &str, metadata: serde_json::Value) -> DecisionRecord {
        DecisionRecord::new(
            agent,
            Payload::new(),
            Payload::new(),
            serde_json::from_value(metadata).unwrap(),
        )
    }

    #[test]
    fn test_aggregate_empty_is_zero() {
        assert_eq!(
            aggregate(&[]),
            Averages {
                avg_response_time: 0.0,
                avg_token_usage: 0.0,
                success_rate: 0.0,
            }
        );
    }

    #[test]
    fn test_aggregate_mixed_outcomes() {
        let decisions = vec![
            record("agentA", json!({"success": true, "response_time": 1.0})),
            record("agentA", json!({"success": false, "response_time": 3.0})),
        ];
        let averages = aggregate(&decisions);
        assert_eq!(averages.avg_response_time, 2.0);
        assert_eq!(averages.avg_token_usage, 0.0);
        assert_eq!(averages.success_rate, 50.0);
    }

    #[test]
    fn test_aggregate_missing_values_count_as_zero() {
        let decisions = vec![
            record("a", json!({"token_usage": 300, "response_time": 0.5})),
            record("b", json!({})),
            record("c", json!({"token_usage": 0})),
        ];
        let averages = aggregate(&decisions);
        assert_eq!(averages.avg_token_usage, 100.0);
        assert!((averages.avg_response_time - 0.5 / 3.0).abs() < 1e-12);
        assert_eq!(averages.success_rate, 0.0);
    }

    #[test]
    fn test_success_rate_bounds() {
        let all_ok: Vec<_> = (0..4)
            .map(|_| record("a", json!({"success": true})))
            .collect();
        assert_eq!(aggregate(&all_ok).success_rate, 100.0);

        let mut mixed = all_ok.clone();
        mixed.extend((0..4).map(|_| record("a", json!({"success": "yes"}))));
        let rate = aggregate(&mixed).success_rate;
        assert_eq!(rate, 50.0);
        assert!((0.0..=100.0).contains(&rate));
    }
}
