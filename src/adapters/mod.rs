//! Conversion of agent-framework output into decision paths.
//!
//! Adapters are the boundary between external agent frameworks and the
//! observer. Each implements [`AgentAdapter`]; [`ObservedAdapter`] pairs one
//! with an [`Observer`] so every conversion, successful or not, lands in the
//! session as a decision record. Conversion failures become data: they are
//! recorded as failed decisions and never abort the session.

mod generic;
mod swarm;
mod workflow;

pub use generic::GenericAdapter;
pub use swarm::SwarmAdapter;
pub use workflow::{AgentFuture, WorkflowObserver, WorkflowRun};

use std::time::Instant;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::decision::{Alternative, DecisionPath, Payload, DEFAULT_FEASIBILITY};
use crate::error::{AdapterError, AdapterResult, ObserverResult};
use crate::observer::{Observer, SessionHandle, RESPONSE_TIME_KEY, SUCCESS_KEY, TOKEN_USAGE_KEY};
use crate::parsing::{parse_feasibility, split_list};

/// Converts one framework's raw output into a [`DecisionPath`].
pub trait AgentAdapter: Send + Sync {
    /// Short adapter name used in errors and logs.
    fn name(&self) -> &str;

    /// Build a decision path for `task` from `output`.
    fn convert(&self, task: &str, output: &Value, context: Payload) -> AdapterResult<DecisionPath>;
}

/// Result of an observed conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionOutcome {
    /// Conversion succeeded and was recorded as a successful decision.
    Converted(DecisionPath),
    /// Conversion failed; the failure was recorded as a failed decision.
    Failed(AdapterError),
}

impl ConversionOutcome {
    /// True when the output was converted.
    pub fn is_converted(&self) -> bool {
        matches!(self, ConversionOutcome::Converted(_))
    }

    /// The converted path, if any.
    pub fn decision_path(&self) -> Option<&DecisionPath> {
        match self {
            ConversionOutcome::Converted(path) => Some(path),
            ConversionOutcome::Failed(_) => None,
        }
    }

    /// Turn the outcome back into a plain result.
    pub fn into_result(self) -> AdapterResult<DecisionPath> {
        match self {
            ConversionOutcome::Converted(path) => Ok(path),
            ConversionOutcome::Failed(err) => Err(err),
        }
    }
}

/// An adapter whose conversions are tracked as decisions.
#[derive(Debug, Clone)]
pub struct ObservedAdapter<A> {
    adapter: A,
    observer: Observer,
    agent_id: String,
}

impl<A: AgentAdapter> ObservedAdapter<A> {
    /// Wrap `adapter`, recording its conversions under `agent_id`.
    pub fn new(adapter: A, observer: Observer, agent_id: impl Into<String>) -> Self {
        Self {
            adapter,
            observer,
            agent_id: agent_id.into(),
        }
    }

    /// The wrapped adapter.
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Agent id used for recorded decisions.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Convert `output` and record the result in `session`.
    ///
    /// On success the decision path's payload becomes the record's outputs.
    /// On failure the outputs carry `{"error": ..}` and `success` is false.
    /// Only tracking errors are returned as `Err`.
    pub fn record(
        &self,
        session: &SessionHandle,
        task: &str,
        output: &Value,
        context: Payload,
    ) -> ObserverResult<ConversionOutcome> {
        let mut inputs = Payload::new();
        inputs.insert("task".to_string(), json!(task));
        inputs.insert("context".to_string(), Value::Object(context.clone()));

        let started = Instant::now();
        let converted = self
            .adapter
            .convert(task, output, context)
            .and_then(|path| match path.to_payload() {
                Ok(payload) => Ok((path, payload)),
                Err(e) => Err(AdapterError::MalformedField {
                    field: "decision_path".to_string(),
                    message: e.to_string(),
                }),
            });
        let elapsed = started.elapsed().as_secs_f64();

        let mut metadata = Payload::new();
        metadata.insert(RESPONSE_TIME_KEY.to_string(), json!(elapsed));
        metadata.insert("adapter".to_string(), json!(self.adapter.name()));

        match converted {
            Ok((path, outputs)) => {
                metadata.insert(SUCCESS_KEY.to_string(), json!(true));
                if let Some(tokens) = path
                    .metrics
                    .as_ref()
                    .and_then(|m| m.get(TOKEN_USAGE_KEY))
                    .filter(|v| v.is_number())
                {
                    metadata.insert(TOKEN_USAGE_KEY.to_string(), tokens.clone());
                }
                self.observer.track_decision(
                    session,
                    self.agent_id.as_str(),
                    inputs,
                    outputs,
                    Some(metadata),
                )?;
                debug!(
                    adapter = self.adapter.name(),
                    agent_id = %self.agent_id,
                    steps = path.steps.len(),
                    "Output converted"
                );
                Ok(ConversionOutcome::Converted(path))
            }
            Err(err) => {
                warn!(
                    adapter = self.adapter.name(),
                    agent_id = %self.agent_id,
                    error = %err,
                    "Conversion failed, recording failed decision"
                );
                metadata.insert(SUCCESS_KEY.to_string(), json!(false));
                let mut outputs = Payload::new();
                outputs.insert("error".to_string(), json!(err.to_string()));
                self.observer.track_decision(
                    session,
                    self.agent_id.as_str(),
                    inputs,
                    outputs,
                    Some(metadata),
                )?;
                Ok(ConversionOutcome::Failed(err))
            }
        }
    }
}

/// JSON kind name used in [`AdapterError::UnsupportedOutput`].
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Render a scalar as text; strings are taken verbatim.
pub(crate) fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn string_field(object: &Payload, key: &str, default: &str) -> String {
    match object.get(key) {
        None | Some(Value::Null) => default.to_string(),
        Some(value) => text_of(value),
    }
}

pub(crate) fn object_field(object: &Payload, key: &str) -> Payload {
    match object.get(key) {
        Some(Value::Object(map)) => map.clone(),
        _ => Payload::new(),
    }
}

/// List of strings from an array, or from a `;`/`,` separated string.
pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().map(text_of).collect(),
        Some(Value::String(s)) => split_list(s),
        _ => Vec::new(),
    }
}

/// Feasibility from a number or a rating string such as `"8/10"`.
pub(crate) fn feasibility_of(value: Option<&Value>) -> u8 {
    match value {
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .map(|v| v.round().clamp(1.0, 10.0) as u8)
            .unwrap_or(DEFAULT_FEASIBILITY),
        Some(Value::String(s)) => parse_feasibility(s),
        _ => DEFAULT_FEASIBILITY,
    }
}

/// Build an alternative from an object using the given field names.
pub(crate) fn alternative_from(
    object: &Payload,
    approach: &str,
    advantages: &str,
    disadvantages: &str,
    feasibility: &str,
) -> Alternative {
    Alternative {
        approach: string_field(object, approach, "Unknown"),
        advantages: string_list(object.get(advantages)),
        disadvantages: string_list(object.get(disadvantages)),
        feasibility: feasibility_of(object.get(feasibility)),
    }
}

/// Elements of an optional array field; any other kind is malformed.
pub(crate) fn array_field<'a>(object: &'a Payload, key: &str) -> AdapterResult<&'a [Value]> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(AdapterError::MalformedField {
            field: key.to_string(),
            message: format!("expected array, found {}", value_kind(other)),
        }),
    }
}

/// Each element must be an object.
pub(crate) fn as_object<'a>(value: &'a Value, field: &str, index: usize) -> AdapterResult<&'a Payload> {
    value.as_object().ok_or_else(|| AdapterError::MalformedField {
        field: format!("{}[{}]", field, index),
        message: format!("expected object, found {}", value_kind(value)),
    })
}
