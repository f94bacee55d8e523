//! Integration tests for session tracking
//!
//! Exercises the observer, adapters and workflow runner through the public API.

use serde_json::{json, Value};

use agent_observer::adapters::{
    AgentAdapter, AgentFuture, GenericAdapter, ObservedAdapter, SwarmAdapter, WorkflowObserver,
};
use agent_observer::decision::{ConfidenceLevel, DecisionPath, Payload, ThoughtStep};
use agent_observer::error::ObserverError;
use agent_observer::observer::{aggregate, DecisionAnalyzer, Observer};
use agent_observer::AppError;

fn payload(value: Value) -> Payload {
    serde_json::from_value(value).unwrap()
}

#[cfg(test)]
mod session_tests {
    use super::*;

    #[test]
    fn test_two_decision_session_metrics() {
        let observer = Observer::new();
        let s1 = observer.open_session(Some("s1")).unwrap();

        observer
            .track_decision(
                &s1,
                "agentA",
                Payload::new(),
                Payload::new(),
                Some(payload(json!({"success": true, "response_time": 1.0}))),
            )
            .unwrap();
        observer
            .track_decision(
                &s1,
                "agentA",
                Payload::new(),
                Payload::new(),
                Some(payload(json!({"success": false, "response_time": 3.0}))),
            )
            .unwrap();
        observer.close_session(&s1).unwrap();

        let metrics = observer.get_session_metrics("s1").unwrap();
        assert_eq!(metrics.decision_count, 2);
        assert_eq!(metrics.agents.iter().collect::<Vec<_>>(), vec!["agentA"]);
        assert_eq!(metrics.averages.avg_response_time, 2.0);
        assert_eq!(metrics.averages.avg_token_usage, 0.0);
        assert_eq!(metrics.averages.success_rate, 50.0);
        assert!(!metrics.open);
        assert!(metrics.duration >= 0.0);
    }

    #[test]
    fn test_open_session_duration_runs_to_now() {
        let observer = Observer::new();
        let wall = std::time::Instant::now();
        observer.open_session(Some("running")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));

        let metrics = observer.get_session_metrics("running").unwrap();
        let elapsed = wall.elapsed().as_secs_f64();

        assert!(metrics.open);
        assert!(metrics.duration >= 0.04, "duration {}", metrics.duration);
        assert!(
            metrics.duration <= elapsed + 0.01,
            "duration {} exceeds wall clock {}",
            metrics.duration,
            elapsed
        );
    }

    #[test]
    fn test_empty_session_has_zero_averages() {
        let observer = Observer::new();
        let guard = observer.scope(Some("empty")).unwrap();
        let metrics = guard.finish().unwrap();

        assert_eq!(metrics.decision_count, 0);
        assert!(metrics.agents.is_empty());
        assert_eq!(metrics.averages, aggregate(&[]));
        assert_eq!(metrics.averages.success_rate, 0.0);
    }

    #[test]
    fn test_tracking_requires_open_session() {
        let observer = Observer::new();

        let err = observer
            .track_active("agentA", Payload::new(), Payload::new(), None)
            .unwrap_err();
        assert_eq!(err, ObserverError::NoActiveSession);

        let handle = observer.open_session(None).unwrap();
        observer.close_session(&handle).unwrap();
        let err = observer
            .track_decision(&handle, "agentA", Payload::new(), Payload::new(), None)
            .unwrap_err();
        assert!(matches!(err, ObserverError::SessionClosed { .. }));

        // Closing twice is harmless and keeps the first end time
        let ended = observer.session(handle.id()).unwrap().ended_at;
        observer.close_session(&handle).unwrap();
        assert_eq!(observer.session(handle.id()).unwrap().ended_at, ended);
    }

    #[test]
    fn test_single_active_session() {
        let observer = Observer::new();
        let first = observer.open_session(Some("first")).unwrap();

        let err = observer.open_session(Some("second")).unwrap_err();
        assert!(matches!(err, ObserverError::SessionAlreadyActive { ref active_id } if active_id == "first"));

        observer.close_session(&first).unwrap();
        observer.open_session(Some("second")).unwrap();
        assert_eq!(observer.session_ids(), vec!["first", "second"]);

        let err = observer.open_session(Some("first")).unwrap_err();
        assert!(matches!(err, ObserverError::SessionAlreadyActive { .. }));
    }

    #[test]
    fn test_scope_closes_on_early_return() {
        let observer = Observer::new();

        let result: Result<(), AppError> = observer.with_session(Some("scoped"), |handle| {
            observer.track_decision(handle, "agentA", Payload::new(), Payload::new(), None)?;
            Err(AppError::Internal {
                message: "agent crashed".to_string(),
            })
        });

        assert!(matches!(result, Err(AppError::Internal { .. })));
        assert!(observer.active_session().is_none());
        let session = observer.session("scoped").unwrap();
        assert!(session.ended_at.is_some());
        assert_eq!(session.decisions.len(), 1);
    }

    #[tokio::test]
    async fn test_observe_async_scope() {
        let observer = Observer::new();
        let inner = observer.clone();

        let count = observer
            .observe(Some("async"), |handle| async move {
                for agent in ["a", "b", "a"] {
                    inner.track_decision(&handle, agent, Payload::new(), Payload::new(), None)?;
                }
                Ok::<_, ObserverError>(inner.session(handle.id())?.decisions.len())
            })
            .await
            .unwrap();

        assert_eq!(count, 3);
        let metrics = observer.get_session_metrics("async").unwrap();
        assert!(!metrics.open);
        assert_eq!(metrics.agents.len(), 2);
    }
}

#[cfg(test)]
mod adapter_tests {
    use super::*;

    #[test]
    fn test_failed_conversion_is_recorded_not_raised() {
        let observer = Observer::new();
        let handle = observer.open_session(Some("adapters")).unwrap();
        let swarm = ObservedAdapter::new(SwarmAdapter, observer.clone(), "swarm-agent");
        let generic = ObservedAdapter::new(GenericAdapter, observer.clone(), "generic-agent");

        let failed = swarm
            .record(&handle, "classify", &json!([1, 2, 3]), Payload::new())
            .unwrap();
        assert!(!failed.is_converted());

        let converted = generic
            .record(&handle, "classify", &json!("spam"), Payload::new())
            .unwrap();
        assert_eq!(
            converted.decision_path().unwrap().final_decision.as_deref(),
            Some("spam")
        );

        let session = observer.session("adapters").unwrap();
        assert_eq!(session.decisions.len(), 2);
        assert_eq!(
            session.decisions[0].outputs["error"],
            json!("swarm adapter cannot convert array output")
        );
        assert!(session.decisions[0].failed());
        assert!(session.decisions[1].succeeded());
        assert!(session.is_open());
    }

    #[test]
    fn test_generic_structured_output() {
        let output = json!({
            "steps": [
                {
                    "thought": "Compare vendors",
                    "reasoning": "Two candidates",
                    "confidence": "high",
                    "alternatives": [
                        {"approach": "Vendor A", "advantages": ["cheap"], "feasibility": "7/10"},
                        {"approach": "Vendor B", "feasibility": "high"}
                    ]
                }
            ],
            "decision": "Vendor A",
            "confidence": 0.65
        });

        let path = GenericAdapter
            .convert("pick vendor", &output, Payload::new())
            .unwrap();

        assert_eq!(path.steps[0].confidence, ConfidenceLevel::High);
        let alternatives = &path.steps[0].alternatives_considered;
        assert_eq!(alternatives[0].feasibility, 7);
        assert_eq!(alternatives[1].feasibility, 5);
        assert_eq!(path.confidence_level(), Some(ConfidenceLevel::Medium));
    }

    #[test]
    fn test_decision_path_flat_mapping_round_trip() {
        let mut path = DecisionPath::new("ship release").with_context(payload(json!({"env": "prod"})));
        path.add_step(ThoughtStep::new("Check tests", "All green", ConfidenceLevel::High));
        path.set_outcome("ship", Some(0.9), None);

        let flat = path.to_payload().unwrap();
        assert_eq!(flat["steps"][0]["confidence"], json!("HIGH"));
        assert_eq!(flat["final_decision"], json!("ship"));

        let restored = DecisionPath::from_payload(flat).unwrap();
        assert_eq!(restored, path);
    }
}

#[cfg(test)]
mod workflow_tests {
    use super::*;

    fn agent<'a>(result: Result<Value, AppError>) -> AgentFuture<'a, AppError> {
        Box::pin(async move { result })
    }

    #[tokio::test]
    async fn test_workflow_run_records_each_agent() {
        let workflow = WorkflowObserver::new(Observer::new());

        let run = workflow
            .run(
                "review",
                "review the design",
                vec![
                    ("drafter".to_string(), agent(Ok(json!("draft")))),
                    ("reviewer".to_string(), agent(Ok(json!({"approved": true})))),
                ],
            )
            .await
            .unwrap();

        assert_eq!(run.results, vec![json!("draft"), json!({"approved": true})]);
        assert_eq!(run.metrics.decision_count, 2);
        assert_eq!(run.metrics.averages.success_rate, 100.0);
        assert!(run.session.id().starts_with("workflow_review_"));
        assert!(workflow.observer().active_session().is_none());
    }

    #[tokio::test]
    async fn test_workflow_failure_is_recorded_and_returned() {
        let observer = Observer::new();
        let workflow = WorkflowObserver::new(observer.clone());

        let err = workflow
            .run(
                "review",
                "review the design",
                vec![
                    ("drafter".to_string(), agent(Ok(json!("draft")))),
                    (
                        "reviewer".to_string(),
                        agent(Err(AppError::Internal {
                            message: "reviewer offline".to_string(),
                        })),
                    ),
                    ("publisher".to_string(), agent(Ok(json!("never runs")))),
                ],
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("reviewer offline"));

        let decisions = observer.all_decisions();
        let agents: Vec<_> = decisions.iter().map(|d| d.agent_id.as_str()).collect();
        assert_eq!(agents, vec!["drafter", "reviewer", "workflow"]);
        assert!(decisions[2].failed());
        assert!(observer.active_session().is_none());

        let rates = DecisionAnalyzer::new(&decisions).success_rate_by_agent(None);
        assert_eq!(rates["drafter"], 1.0);
        assert_eq!(rates["reviewer"], 0.0);
    }
}
