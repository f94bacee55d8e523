use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::DecisionRecord;

/// Outcome statistics for one recurring "task -> choice" pattern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternStats {
    /// Fraction (0-1) of uses that succeeded.
    pub success_rate: f64,
    /// Number of times the pattern occurred.
    pub total_uses: usize,
}

#[derive(Default)]
struct Tally {
    success: usize,
    total: usize,
}

impl Tally {
    fn add(&mut self, succeeded: bool) {
        self.total += 1;
        self.success += usize::from(succeeded);
    }

    fn rate(&self) -> f64 {
        self.success as f64 / self.total as f64
    }
}

/// Breakdowns over a set of decision records.
pub struct DecisionAnalyzer<'a> {
    decisions: &'a [DecisionRecord],
}

impl<'a> DecisionAnalyzer<'a> {
    /// Analyze `decisions`.
    pub fn new(decisions: &'a [DecisionRecord]) -> Self {
        Self { decisions }
    }

    /// Fraction (0-1) of successful decisions per agent, optionally for one agent only.
    pub fn success_rate_by_agent(&self, agent_id: Option<&str>) -> BTreeMap<String, f64> {
        let mut tallies: BTreeMap<String, Tally> = BTreeMap::new();
        for decision in self
            .decisions
            .iter()
            .filter(|d| agent_id.map_or(true, |id| d.agent_id == id))
        {
            tallies
                .entry(decision.agent_id.clone())
                .or_default()
                .add(decision.succeeded());
        }
        tallies
            .into_iter()
            .map(|(agent, tally)| (agent, tally.rate()))
            .collect()
    }

    /// Outcome statistics keyed by `"<task> -> <choice>"`.
    ///
    /// The task is read from `inputs.task`; the choice from
    /// `outputs.final_decision`, `outputs.decision` or `outputs.result`.
    /// Records missing either are skipped.
    pub fn common_patterns(&self) -> BTreeMap<String, PatternStats> {
        let mut tallies: BTreeMap<String, Tally> = BTreeMap::new();
        for decision in self.decisions {
            if let Some(pattern) = pattern_key(decision) {
                tallies.entry(pattern).or_default().add(decision.succeeded());
            }
        }
        tallies
            .into_iter()
            .map(|(pattern, tally)| {
                (
                    pattern,
                    PatternStats {
                        success_rate: tally.rate(),
                        total_uses: tally.total,
                    },
                )
            })
            .collect()
    }
}

fn pattern_key(decision: &DecisionRecord) -> Option<String> {
    let task = decision.inputs.get("task").and_then(display_value)?;
    let choice = ["final_decision", "decision", "result"]
        .iter()
        .find_map(|key| decision.outputs.get(*key).and_then(display_value))?;
    Some(format!("{} -> {}", task, choice))
}

fn display_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
