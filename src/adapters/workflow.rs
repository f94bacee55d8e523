use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::decision::Payload;
use crate::error::ObserverError;
use crate::observer::{Observer, SessionHandle, SessionMetrics, RESPONSE_TIME_KEY, SUCCESS_KEY};

/// One agent's unit of work within a workflow.
pub type AgentFuture<'a, E> = Pin<Box<dyn Future<Output = Result<Value, E>> + Send + 'a>>;

/// Outcome of a workflow that ran to completion.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    /// Session the run was recorded in.
    pub session: SessionHandle,
    /// Each agent's result, in run order.
    pub results: Vec<Value>,
    /// Metrics of the closed session.
    pub metrics: SessionMetrics,
}

/// Observes multi-agent workflows, one session per run.
#[derive(Debug, Clone, Default)]
pub struct WorkflowObserver {
    observer: Observer,
}

impl WorkflowObserver {
    /// Create a workflow observer over `observer`.
    pub fn new(observer: Observer) -> Self {
        Self { observer }
    }

    /// The underlying session store.
    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    /// Run `agents` in order inside a fresh session.
    ///
    /// Every agent's outcome is recorded with its response time. The first
    /// failing agent stops the run: its error is recorded for the agent and
    /// for the workflow as a whole, then returned unchanged. The session is
    /// closed on every exit path.
    pub async fn run<'a, E>(
        &self,
        workflow: &str,
        task: &str,
        agents: Vec<(String, AgentFuture<'a, E>)>,
    ) -> Result<WorkflowRun, E>
    where
        E: Display + From<ObserverError>,
    {
        let session_name = format!("workflow_{}_{}", workflow, Uuid::new_v4().simple());
        let guard = self.observer.scope(Some(&session_name))?;
        info!(workflow = %workflow, session_id = %guard.handle(), agents = agents.len(), "Workflow started");

        let mut results = Vec::with_capacity(agents.len());
        for (agent_id, agent) in agents {
            let started = Instant::now();
            let outcome = agent.await;
            let elapsed = started.elapsed().as_secs_f64();

            match outcome {
                Ok(result) => {
                    let mut outputs = Payload::new();
                    outputs.insert("result".to_string(), result.clone());
                    guard.track(
                        agent_id.as_str(),
                        task_inputs(task),
                        outputs,
                        Some(outcome_metadata(true, Some(elapsed))),
                    )?;
                    results.push(result);
                }
                Err(err) => {
                    warn!(workflow = %workflow, agent_id = %agent_id, error = %err, "Workflow agent failed");
                    guard.track(
                        agent_id.as_str(),
                        task_inputs(task),
                        error_outputs(&err),
                        Some(outcome_metadata(false, Some(elapsed))),
                    )?;
                    guard.track(
                        "workflow",
                        task_inputs(task),
                        error_outputs(&err),
                        Some(outcome_metadata(false, None)),
                    )?;
                    return Err(err);
                }
            }
        }

        let session = guard.handle().clone();
        let metrics = guard.finish()?;
        info!(
            workflow = %workflow,
            session_id = %session,
            success_rate = metrics.averages.success_rate,
            "Workflow completed"
        );
        Ok(WorkflowRun {
            session,
            results,
            metrics,
        })
    }
}

fn task_inputs(task: &str) -> Payload {
    let mut inputs = Payload::new();
    inputs.insert("task".to_string(), json!(task));
    inputs
}

fn error_outputs(err: &impl Display) -> Payload {
    let mut outputs = Payload::new();
    outputs.insert("error".to_string(), json!(err.to_string()));
    outputs
}

fn outcome_metadata(success: bool, response_time: Option<f64>) -> Payload {
    let mut metadata = Payload::new();
    if let Some(seconds) = response_time {
        metadata.insert(RESPONSE_TIME_KEY.to_string(), json!(seconds));
    }
    metadata.insert(SUCCESS_KEY.to_string(), json!(success));
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use crate::AppError;

    fn ok_agent<'a>(value: Value) -> AgentFuture<'a, AppError> {
        Box::pin(async move { Ok(value) })
    }

    fn failing_agent<'a>(message: &'static str) -> AgentFuture<'a, AppError> {
        Box::pin(async move {
            Err(AppError::Adapter(AdapterError::Agent {
                message: message.to_string(),
            }))
        })
    }

    #[tokio::test]
    async fn test_successful_workflow() {
        let workflows = WorkflowObserver::default();
        let run = workflows
            .run(
                "research",
                "summarise",
                vec![
                    ("researcher".to_string(), ok_agent(json!("notes"))),
                    ("writer".to_string(), ok_agent(json!({"draft": 1}))),
                ],
            )
            .await
            .unwrap();

        assert_eq!(run.results, vec![json!("notes"), json!({"draft": 1})]);
        assert_eq!(run.metrics.decision_count, 2);
        assert_eq!(run.metrics.averages.success_rate, 100.0);
        assert!(!run.metrics.open);
        assert!(run.session.id().starts_with("workflow_research_"));
        assert!(workflows.observer().active_session().is_none());
    }

    #[tokio::test]
    async fn test_failing_agent_is_recorded_and_reraised() {
        let workflows = WorkflowObserver::default();
        let err = workflows
            .run(
                "research",
                "summarise",
                vec![
                    ("researcher".to_string(), ok_agent(json!("notes"))),
                    ("writer".to_string(), failing_agent("model timeout")),
                    ("editor".to_string(), ok_agent(json!("never runs"))),
                ],
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Adapter error: Agent failed: model timeout");

        let observer = workflows.observer();
        let ids = observer.session_ids();
        let session = observer.session(&ids[0]).unwrap();
        assert!(!session.is_open());

        let agents: Vec<_> = session.decisions.iter().map(|d| d.agent_id.as_str()).collect();
        assert_eq!(agents, vec!["researcher", "writer", "workflow"]);
        assert!(session.decisions[1].failed());
        assert_eq!(
            session.decisions[2].outputs["error"],
            json!("Adapter error: Agent failed: model timeout")
        );

        let metrics = observer.get_session_metrics(&ids[0]).unwrap();
        assert!((metrics.averages.success_rate - 100.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rejected_while_session_active() {
        let observer = Observer::new();
        let _busy = observer.scope(Some("busy")).unwrap();
        let workflows = WorkflowObserver::new(observer);

        let err = workflows
            .run("w", "t", vec![("a".to_string(), ok_agent(json!(1)))])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Observer(ObserverError::SessionAlreadyActive { .. })
        ));
    }
}
