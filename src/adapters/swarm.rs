use serde_json::Value;

use super::{
    alternative_from, array_field, as_object, object_field, string_field, text_of, value_kind,
    AgentAdapter,
};
use crate::decision::{ConfidenceLevel, DecisionPath, Payload, ThoughtStep};
use crate::error::{AdapterError, AdapterResult};

const DEFAULT_SWARM_CONFIDENCE: f64 = 0.5;

/// Adapter for swarm-style multi-agent runs.
///
/// Expects an object with an `execution_path` of steps, each carrying an
/// `action`, `reasoning`, numeric `confidence`, free-form `data` and
/// `considered_actions`, plus top-level `result`, `confidence`, `reasoning`
/// and `metrics`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwarmAdapter;

impl SwarmAdapter {
    fn convert_step(value: &Value, index: usize) -> AdapterResult<ThoughtStep> {
        let step = as_object(value, "execution_path", index)?;
        let confidence = step
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_SWARM_CONFIDENCE);

        let alternatives = array_field(step, "considered_actions")?
            .iter()
            .enumerate()
            .map(|(i, action)| {
                as_object(action, "considered_actions", i)
                    .map(|action| alternative_from(action, "name", "pros", "cons", "feasibility_score"))
            })
            .collect::<AdapterResult<Vec<_>>>()?;

        Ok(ThoughtStep::new(
            string_field(step, "action", "Unknown action"),
            string_field(step, "reasoning", "No reasoning provided"),
            ConfidenceLevel::from_score(confidence),
        )
        .with_evidence("swarm_data", Value::Object(object_field(step, "data")))
        .with_alternatives(alternatives))
    }
}

impl AgentAdapter for SwarmAdapter {
    fn name(&self) -> &str {
        "swarm"
    }

    fn convert(&self, task: &str, output: &Value, context: Payload) -> AdapterResult<DecisionPath> {
        let object = output
            .as_object()
            .ok_or_else(|| AdapterError::UnsupportedOutput {
                adapter: self.name().to_string(),
                kind: value_kind(output).to_string(),
            })?;

        let mut path = DecisionPath::new(task).with_context(context);
        for (index, step) in array_field(object, "execution_path")?.iter().enumerate() {
            path.add_step(Self::convert_step(step, index)?);
        }

        if let Some(result) = object.get("result").filter(|v| !v.is_null()) {
            let confidence = object
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_SWARM_CONFIDENCE);

            let mut chain = Payload::new();
            chain.insert(
                "swarm_reasoning".to_string(),
                object.get("reasoning").cloned().unwrap_or(Value::Object(Payload::new())),
            );
            chain.insert(
                "swarm_metrics".to_string(),
                Value::Object(object_field(object, "metrics")),
            );
            path.set_outcome(text_of(result), Some(confidence), Some(chain));
        }

        if let Some(Value::Object(metrics)) = object.get("metrics") {
            for (name, value) in metrics {
                path.add_metric(name.as_str(), value.clone());
            }
        }

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn swarm_output() -> Value {
        json!({
            "execution_path": [
                {
                    "action": "Gather market data",
                    "reasoning": "Need a baseline",
                    "confidence": 0.8,
                    "data": {"sources": 3},
                    "considered_actions": [
                        {"name": "Skip research", "pros": ["fast"], "cons": ["blind"], "feasibility_score": 2},
                        {"name": "Hire analyst"}
                    ]
                },
                {"action": "Compare", "confidence": 0.3},
                {"action": "Decide"}
            ],
            "result": "Invest",
            "confidence": 0.72,
            "reasoning": "Strong fundamentals",
            "metrics": {"token_usage": 900, "agents": 3}
        })
    }

    #[test]
    fn test_execution_path_becomes_steps() {
        let path = SwarmAdapter
            .convert("evaluate", &swarm_output(), Payload::new())
            .unwrap();

        let levels: Vec<_> = path.steps.iter().map(|s| s.confidence).collect();
        assert_eq!(
            levels,
            vec![ConfidenceLevel::High, ConfidenceLevel::Low, ConfidenceLevel::Medium]
        );

        let first = &path.steps[0];
        assert_eq!(first.thought, "Gather market data");
        assert_eq!(first.supporting_evidence["swarm_data"], json!({"sources": 3}));
        assert_eq!(first.alternatives_considered.len(), 2);
        assert_eq!(first.alternatives_considered[0].approach, "Skip research");
        assert_eq!(first.alternatives_considered[0].feasibility, 2);
        assert_eq!(first.alternatives_considered[0].disadvantages, vec!["blind"]);
        assert_eq!(first.alternatives_considered[1].feasibility, 5);

        assert_eq!(path.steps[2].reasoning, "No reasoning provided");
        assert_eq!(path.steps[2].supporting_evidence["swarm_data"], json!({}));
    }

    #[test]
    fn test_result_and_metrics() {
        let path = SwarmAdapter
            .convert("evaluate", &swarm_output(), Payload::new())
            .unwrap();
        assert_eq!(path.final_decision.as_deref(), Some("Invest"));
        assert_eq!(path.confidence_score, Some(0.72));
        assert_eq!(path.confidence_level(), Some(ConfidenceLevel::High));

        let chain = path.reasoning_chain.as_ref().unwrap();
        assert_eq!(chain["swarm_reasoning"], json!("Strong fundamentals"));
        assert_eq!(chain["swarm_metrics"]["agents"], json!(3));
        assert_eq!(path.metrics.as_ref().unwrap()["token_usage"], json!(900));
    }

    #[test]
    fn test_non_string_result_and_default_confidence() {
        let path = SwarmAdapter
            .convert("count", &json!({"result": 42}), Payload::new())
            .unwrap();
        assert_eq!(path.final_decision.as_deref(), Some("42"));
        assert_eq!(path.confidence_score, Some(0.5));
    }

    #[test]
    fn test_rejects_non_object_output() {
        let err = SwarmAdapter
            .convert("t", &json!("plain text"), Payload::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "swarm adapter cannot convert string output");
    }

    #[test]
    fn test_malformed_considered_actions() {
        let output = json!({"execution_path": [{"considered_actions": {"name": "x"}}]});
        let err = SwarmAdapter.convert("t", &output, Payload::new()).unwrap_err();
        assert!(matches!(err, AdapterError::MalformedField { .. }));
    }
}
