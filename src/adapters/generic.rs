use serde_json::{json, Value};

use super::{
    alternative_from, array_field, as_object, object_field, string_field, text_of, value_kind,
    AgentAdapter,
};
use crate::decision::{ConfidenceLevel, DecisionPath, Payload, ThoughtStep};
use crate::error::{AdapterError, AdapterResult};

/// Adapter for agents without a framework-specific output shape.
///
/// Accepts either a plain string (treated as a direct answer) or an object:
///
/// ```json
/// {
///   "steps": [{"thought": "..", "reasoning": "..", "confidence": "HIGH",
///              "evidence": {..}, "alternatives": [..]}],
///   "decision": "..", "confidence": 0.8, "reasoning": {..}
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericAdapter;

impl GenericAdapter {
    fn convert_step(value: &Value, index: usize) -> AdapterResult<ThoughtStep> {
        let step = as_object(value, "steps", index)?;
        let confidence = step
            .get("confidence")
            .and_then(Value::as_str)
            .map(ConfidenceLevel::from_label)
            .unwrap_or_default();

        let alternatives = array_field(step, "alternatives")?
            .iter()
            .enumerate()
            .map(|(i, alt)| {
                as_object(alt, "alternatives", i).map(|alt| {
                    alternative_from(alt, "approach", "advantages", "disadvantages", "feasibility")
                })
            })
            .collect::<AdapterResult<Vec<_>>>()?;

        let mut thought = ThoughtStep::new(
            string_field(step, "thought", "Unknown thought"),
            string_field(step, "reasoning", "No reasoning provided"),
            confidence,
        )
        .with_alternatives(alternatives);
        thought.supporting_evidence = object_field(step, "evidence");
        Ok(thought)
    }
}

impl AgentAdapter for GenericAdapter {
    fn name(&self) -> &str {
        "generic"
    }

    fn convert(&self, task: &str, output: &Value, context: Payload) -> AdapterResult<DecisionPath> {
        let mut path = DecisionPath::new(task).with_context(context);

        match output {
            Value::String(text) => {
                path.add_step(ThoughtStep::new(
                    "Direct Response",
                    text.as_str(),
                    ConfidenceLevel::Medium,
                ));
                path.set_outcome(text.as_str(), Some(0.5), None);
            }
            Value::Object(object) => {
                for (index, step) in array_field(object, "steps")?.iter().enumerate() {
                    path.add_step(Self::convert_step(step, index)?);
                }

                if let Some(decision) = object.get("decision").filter(|v| !v.is_null()) {
                    let confidence = object
                        .get("confidence")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0);
                    let reasoning = match object.get("reasoning") {
                        Some(Value::Object(chain)) => Some(chain.clone()),
                        Some(Value::String(text)) => {
                            let mut chain = Payload::new();
                            chain.insert("reasoning".to_string(), json!(text));
                            Some(chain)
                        }
                        _ => None,
                    };
                    path.set_outcome(text_of(decision), Some(confidence), reasoning);
                }
            }
            other => {
                return Err(AdapterError::UnsupportedOutput {
                    adapter: self.name().to_string(),
                    kind: value_kind(other).to_string(),
                })
            }
        }

        Ok(path)
    }
}
