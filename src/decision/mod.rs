//! Canonical decision path model.
//!
//! A [`DecisionPath`] is the reasoning trace one agent produced for one task:
//! an ordered list of [`ThoughtStep`]s followed by an optional final decision.
//! Adapters build these from framework output and the tracker stores them as
//! a decision record's `outputs`, so every type here serializes to a plain
//! JSON mapping and back without loss.

mod confidence;


pub use confidence::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Open, insertion-ordered key/value payload used for inputs, outputs,
/// context, evidence and metadata.
pub type Payload = serde_json::Map<String, Value>;

/// Midpoint of the 1-10 feasibility scale, used when a score is missing or unparseable.
pub const DEFAULT_FEASIBILITY: u8 = 5;

/// One alternative approach weighed during a thought step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    /// Description of the approach.
    pub approach: String,
    /// Key advantages.
    #[serde(default)]
    pub advantages: Vec<String>,
    /// Potential disadvantages.
    #[serde(default)]
    pub disadvantages: Vec<String>,
    /// Feasibility on a 1-10 scale.
    #[serde(default = "default_feasibility")]
    pub feasibility: u8,
}

fn default_feasibility() -> u8 {
    DEFAULT_FEASIBILITY
}

impl Alternative {
    /// Create an alternative with default feasibility.
    pub fn new(approach: impl Into<String>) -> Self {
        Self {
            approach: approach.into(),
            advantages: Vec::new(),
            disadvantages: Vec::new(),
            feasibility: DEFAULT_FEASIBILITY,
        }
    }

    /// Add an advantage.
    pub fn with_advantage(mut self, advantage: impl Into<String>) -> Self {
        self.advantages.push(advantage.into());
        self
    }

    /// Add a disadvantage.
    pub fn with_disadvantage(mut self, disadvantage: impl Into<String>) -> Self {
        self.disadvantages.push(disadvantage.into());
        self
    }

    /// Set feasibility, clamped to the 1-10 scale.
    pub fn with_feasibility(mut self, feasibility: u8) -> Self {
        self.feasibility = feasibility.clamp(1, 10);
        self
    }
}

/// One stage of a decision path's reasoning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThoughtStep {
    /// Short label for the step (e.g. "Trade-off Analysis").
    pub thought: String,
    /// The reasoning text produced for this step.
    pub reasoning: String,
    /// Certainty attached to this step.
    pub confidence: ConfidenceLevel,
    /// Evidence the step relied on.
    #[serde(default)]
    pub supporting_evidence: Payload,
    /// Alternatives weighed in this step.
    #[serde(default)]
    pub alternatives_considered: Vec<Alternative>,
}

impl ThoughtStep {
    /// Create a step with no evidence or alternatives.
    pub fn new(
        thought: impl Into<String>,
        reasoning: impl Into<String>,
        confidence: ConfidenceLevel,
    ) -> Self {
        Self {
            thought: thought.into(),
            reasoning: reasoning.into(),
            confidence,
            supporting_evidence: Payload::new(),
            alternatives_considered: Vec::new(),
        }
    }

    /// Attach one piece of supporting evidence.
    pub fn with_evidence(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.supporting_evidence.insert(key.into(), value.into());
        self
    }

    /// Replace the alternatives considered.
    pub fn with_alternatives(mut self, alternatives: Vec<Alternative>) -> Self {
        self.alternatives_considered = alternatives;
        self
    }
}

/// A structured reasoning trace describing how an agent reached a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPath {
    /// The task being decided.
    pub task: String,
    /// Unique task identifier.
    pub task_id: String,
    /// When the path was created.
    pub timestamp: DateTime<Utc>,
    /// Caller-supplied context.
    #[serde(default)]
    pub context: Payload,
    /// Reasoning steps in the order they happened.
    #[serde(default)]
    pub steps: Vec<ThoughtStep>,
    /// Final decision, if one was reached.
    #[serde(default)]
    pub final_decision: Option<String>,
    /// Confidence in the final decision, always within `[0, 1]`.
    #[serde(default)]
    pub confidence_score: Option<f64>,
    /// Intermediate reasoning keyed by stage.
    #[serde(default)]
    pub reasoning_chain: Option<Payload>,
    /// Performance metrics attached by the producer.
    #[serde(default)]
    pub metrics: Option<Payload>,
}

impl DecisionPath {
    /// Create an empty path for a task with a fresh identifier.
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            task_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            context: Payload::new(),
            steps: Vec::new(),
            final_decision: None,
            confidence_score: None,
            reasoning_chain: None,
            metrics: None,
        }
    }

    /// Set the caller context.
    pub fn with_context(mut self, context: Payload) -> Self {
        self.context = context;
        self
    }

    /// Append a step; steps keep insertion order.
    pub fn add_step(&mut self, step: ThoughtStep) {
        self.steps.push(step);
    }

    /// Record the final outcome.
    pub fn set_outcome(
        &mut self,
        decision: impl Into<String>,
        confidence: Option<f64>,
        reasoning_chain: Option<Payload>,
    ) {
        self.final_decision = Some(decision.into());
        self.confidence_score = confidence.map(clamp_unit);
        self.reasoning_chain = reasoning_chain;
    }

    /// Set the confidence score, clamped to `[0, 1]`.
    pub fn set_confidence(&mut self, confidence: f64) {
        self.confidence_score = Some(clamp_unit(confidence));
    }

    /// Attach a named performance metric.
    pub fn add_metric(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.metrics
            .get_or_insert_with(Payload::new)
            .insert(name.into(), value.into());
    }

    /// Confidence level implied by the score, if one is set.
    pub fn confidence_level(&self) -> Option<ConfidenceLevel> {
        self.confidence_score.map(ConfidenceLevel::from_score)
    }

    /// Flatten into a JSON mapping suitable for a decision record's outputs.
    pub fn to_payload(&self) -> serde_json::Result<Payload> {
        serde_json::to_value(self).and_then(serde_json::from_value)
    }

    /// Rebuild a path from the mapping produced by [`DecisionPath::to_payload`].
    pub fn from_payload(payload: Payload) -> serde_json::Result<Self> {
        let mut path: DecisionPath = serde_json::from_value(Value::Object(payload))?;
        path.confidence_score = path.confidence_score.map(clamp_unit);
        Ok(path)
    }
}

/// Clamp to `[0, 1]`, mapping NaN to 0.
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
