use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::SharedState;
use crate::adapters::{
    AgentAdapter, ConversionOutcome, GenericAdapter, ObservedAdapter, SwarmAdapter,
};
use crate::decision::{DecisionPath, Payload};
use crate::error::{McpError, McpResult, ObserverError};
use crate::observer::{
    DecisionAnalyzer, PatternStats, SessionHandle, SessionMetrics, RESPONSE_TIME_KEY, SUCCESS_KEY,
    TOKEN_USAGE_KEY,
};
use crate::storage::Storage;

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");

    match tool_name {
        // Session tools
        "observer_open_session" => handle_open_session(state, arguments).await,
        "observer_close_session" => handle_close_session(state, arguments).await,
        "observer_track_decision" => handle_track_decision(state, arguments).await,
        "observer_session_metrics" => handle_session_metrics(state, arguments).await,
        "observer_list_sessions" => handle_list_sessions(state).await,
        "observer_persist_session" => handle_persist_session(state, arguments).await,
        // Adapter & analysis tools
        "observer_convert_output" => handle_convert_output(state, arguments).await,
        "observer_agent_success_rates" => handle_agent_success_rates(state, arguments).await,
        "observer_analyze_task" => handle_analyze_task(state, arguments).await,
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }
}

// ============================================================================
// Session Handlers
// ============================================================================

/// Parameters for opening a session
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenSessionParams {
    /// Optional session identifier
    pub name: Option<String>,
}

/// Response for opening a session
#[derive(Debug, Clone, Serialize)]
pub struct OpenSessionResponse {
    /// Identifier of the opened session
    pub session_id: String,
    /// Open time, RFC 3339
    pub started_at: String,
}

/// Handle observer_open_session tool call
async fn handle_open_session(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: OpenSessionParams =
        parse_optional_arguments("observer_open_session", arguments)?;

    let handle = state.observer.open_session(params.name.as_deref())?;
    let session = state.observer.session(handle.id())?;

    let response = OpenSessionResponse {
        session_id: session.id,
        started_at: session.started_at.to_rfc3339(),
    };
    serde_json::to_value(response).map_err(McpError::Json)
}

#[derive(Debug, Clone, Deserialize)]
struct SessionIdParams {
    session_id: String,
}

/// Response for closing a session
#[derive(Debug, Clone, Serialize)]
pub struct CloseSessionResponse {
    /// Final metrics of the closed session
    pub metrics: SessionMetrics,
    /// Whether the closed session was written to storage.
    pub persisted: bool,
}

/// Handle observer_close_session tool call
async fn handle_close_session(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: SessionIdParams = parse_arguments("observer_close_session", arguments)?;
    let handle = SessionHandle::from_id(params.session_id);

    state.observer.close_session(&handle)?;
    let metrics = state.observer.get_session_metrics(handle.id())?;

    let persisted = if state.config.observer.persist_on_close {
        let session = state.observer.session(handle.id())?;
        state.storage.save_session(&session).await?;
        true
    } else {
        false
    };

    info!(
        session_id = %handle,
        decisions = metrics.decision_count,
        persisted,
        "Session closed via tool call"
    );

    let response = CloseSessionResponse { metrics, persisted };
    serde_json::to_value(response).map_err(McpError::Json)
}

/// Parameters for tracking a decision
#[derive(Debug, Clone, Deserialize)]
pub struct TrackDecisionParams {
    /// Target session; the active session when absent
    pub session_id: Option<String>,
    /// Agent that made the decision
    pub agent_id: String,
    /// What the agent was given
    #[serde(default)]
    pub inputs: Payload,
    /// What the agent produced
    #[serde(default)]
    pub outputs: Payload,
    /// Recognised keys: response_time, token_usage, success
    pub metadata: Option<Payload>,
}

/// Response for tracking a decision
#[derive(Debug, Clone, Serialize)]
pub struct TrackDecisionResponse {
    /// Session the decision was appended to
    pub session_id: String,
    /// Decisions in the session after this one was appended
    pub decision_count: usize,
}

/// Handle observer_track_decision tool call
async fn handle_track_decision(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: TrackDecisionParams = parse_arguments("observer_track_decision", arguments)?;

    let handle = match params.session_id {
        Some(id) => {
            let handle = SessionHandle::from_id(id);
            state.observer.track_decision(
                &handle,
                params.agent_id,
                params.inputs,
                params.outputs,
                params.metadata,
            )?;
            handle
        }
        None => {
            state.observer.track_active(
                params.agent_id,
                params.inputs,
                params.outputs,
                params.metadata,
            )?;
            // Resolved after the append; the session cannot be swapped without a close
            state
                .observer
                .active_session()
                .ok_or(ObserverError::NoActiveSession)?
        }
    };

    let decision_count = state.observer.session(handle.id())?.decisions.len();
    let response = TrackDecisionResponse {
        session_id: handle.id().to_string(),
        decision_count,
    };
    serde_json::to_value(response).map_err(McpError::Json)
}

/// Response for session metrics
#[derive(Debug, Clone, Serialize)]
pub struct SessionMetricsResponse {
    /// "memory" for sessions held by the observer, "storage" otherwise
    pub source: &'static str,
    /// Metrics computed from the session
    pub metrics: SessionMetrics,
}

/// Handle observer_session_metrics tool call
async fn handle_session_metrics(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: SessionIdParams = parse_arguments("observer_session_metrics", arguments)?;

    let response = match state.observer.get_session_metrics(&params.session_id) {
        Ok(metrics) => SessionMetricsResponse {
            source: "memory",
            metrics,
        },
        Err(ObserverError::SessionNotFound { session_id }) => {
            let session = state
                .storage
                .get_session(&session_id)
                .await?
                .ok_or(ObserverError::SessionNotFound { session_id })?;
            SessionMetricsResponse {
                source: "storage",
                metrics: SessionMetrics::from_session(&session),
            }
        }
        Err(e) => return Err(e.into()),
    };

    serde_json::to_value(response).map_err(McpError::Json)
}

/// Response for listing sessions
#[derive(Debug, Clone, Serialize)]
pub struct ListSessionsResponse {
    /// Currently active session, if any
    pub active: Option<String>,
    /// Sessions held in memory, in open order
    pub live: Vec<String>,
    /// Sessions in storage, oldest first
    pub stored: Vec<String>,
}

/// Handle observer_list_sessions tool call
async fn handle_list_sessions(state: &SharedState) -> McpResult<Value> {
    let response = ListSessionsResponse {
        active: state
            .observer
            .active_session()
            .map(|handle| handle.id().to_string()),
        live: state.observer.session_ids(),
        stored: state.storage.list_session_ids().await?,
    };
    serde_json::to_value(response).map_err(McpError::Json)
}

/// Response for persisting a session
#[derive(Debug, Clone, Serialize)]
pub struct PersistSessionResponse {
    /// Persisted session
    pub session_id: String,
    /// Decisions written
    pub decision_count: usize,
    /// Whether the session was still open when saved
    pub open: bool,
}

/// Handle observer_persist_session tool call
async fn handle_persist_session(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "observer_persist_session",
        arguments,
        |params: SessionIdParams| async move {
            let session = state.observer.session(&params.session_id)?;
            state.storage.save_session(&session).await?;
            Ok::<_, McpError>(PersistSessionResponse {
                decision_count: session.decisions.len(),
                open: session.is_open(),
                session_id: session.id,
            })
        },
    )
    .await
}

// ============================================================================
// Adapter & Analysis Handlers
// ============================================================================

/// Adapter selector for output conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    /// Plain text or structured output
    Generic,
    /// Swarm execution paths
    Swarm,
}

/// Parameters for output conversion
#[derive(Debug, Clone, Deserialize)]
pub struct ConvertOutputParams {
    /// Target session; the active session when absent
    pub session_id: Option<String>,
    /// Agent recorded for the conversion
    pub agent_id: String,
    /// Adapter to convert with
    pub adapter: AdapterKind,
    /// Task the output answers
    pub task: String,
    /// Raw agent output
    pub output: Value,
    /// Context attached to the decision path
    #[serde(default)]
    pub context: Payload,
}

/// Response for output conversion
#[derive(Debug, Clone, Serialize)]
pub struct ConvertOutputResponse {
    /// Session the conversion was recorded in
    pub session_id: String,
    /// Whether conversion succeeded
    pub converted: bool,
    /// The converted path on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_path: Option<DecisionPath>,
    /// The conversion error on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Handle observer_convert_output tool call
///
/// A conversion failure is recorded and reported in the response; only
/// tracking failures fail the call.
async fn handle_convert_output(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: ConvertOutputParams = parse_arguments("observer_convert_output", arguments)?;
    let handle = resolve_session(state, params.session_id)?;

    let outcome = match params.adapter {
        AdapterKind::Generic => record_with(
            GenericAdapter,
            state,
            &handle,
            params.agent_id,
            &params.task,
            &params.output,
            params.context,
        )?,
        AdapterKind::Swarm => record_with(
            SwarmAdapter,
            state,
            &handle,
            params.agent_id,
            &params.task,
            &params.output,
            params.context,
        )?,
    };

    let response = match outcome {
        ConversionOutcome::Converted(path) => ConvertOutputResponse {
            session_id: handle.id().to_string(),
            converted: true,
            decision_path: Some(path),
            error: None,
        },
        ConversionOutcome::Failed(err) => ConvertOutputResponse {
            session_id: handle.id().to_string(),
            converted: false,
            decision_path: None,
            error: Some(err.to_string()),
        },
    };
    serde_json::to_value(response).map_err(McpError::Json)
}

fn record_with<A: AgentAdapter>(
    adapter: A,
    state: &SharedState,
    handle: &SessionHandle,
    agent_id: String,
    task: &str,
    output: &Value,
    context: Payload,
) -> McpResult<ConversionOutcome> {
    let observed = ObservedAdapter::new(adapter, state.observer.clone(), agent_id);
    Ok(observed.record(handle, task, output, context)?)
}

/// Parameters for success rate queries
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentSuccessRatesParams {
    /// Restrict the rates to one agent
    pub agent_id: Option<String>,
}

/// Response for success rate queries
#[derive(Debug, Clone, Serialize)]
pub struct AgentSuccessRatesResponse {
    /// Fraction (0-1) per agent over persisted sessions
    pub stored: BTreeMap<String, f64>,
    /// Fraction (0-1) per agent over sessions held in memory
    pub live: BTreeMap<String, f64>,
    /// Task/decision patterns over sessions held in memory
    pub patterns: BTreeMap<String, PatternStats>,
}

/// Handle observer_agent_success_rates tool call
async fn handle_agent_success_rates(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    let params: AgentSuccessRatesParams =
        parse_optional_arguments("observer_agent_success_rates", arguments)?;
    let agent_id = params.agent_id.as_deref();

    let stored = state.storage.agent_success_rates(agent_id).await?;
    let decisions = state.observer.all_decisions();
    let analyzer = DecisionAnalyzer::new(&decisions);

    let response = AgentSuccessRatesResponse {
        stored,
        live: analyzer.success_rate_by_agent(agent_id),
        patterns: analyzer.common_patterns(),
    };
    serde_json::to_value(response).map_err(McpError::Json)
}

/// Parameters for task analysis
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeTaskParams {
    /// Free-form task to analyze
    pub task: Option<String>,
    /// Analyze a company as an investment opportunity
    pub company: Option<String>,
    #[serde(default)]
    /// Extra context for `task`; rejected together with `company`
    pub context: Payload,
    /// Target session; the active session when absent
    pub session_id: Option<String>,
    /// Agent id to record (default: the agent's name)
    pub agent_id: Option<String>,
}

/// Response for task analysis
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeTaskResponse {
    /// Session the decision was recorded in, if any
    pub session_id: Option<String>,
    /// The produced decision path
    pub decision_path: DecisionPath,
}

/// Handle observer_analyze_task tool call
///
/// The analysis is recorded in the named session, or the active one when no
/// session is named. With neither, the analysis runs unrecorded.
async fn handle_analyze_task(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: AnalyzeTaskParams = parse_arguments("observer_analyze_task", arguments)?;

    let agent = state
        .agent
        .as_ref()
        .ok_or_else(|| McpError::ExecutionFailed {
            message: "No completion backend configured; set LANGBASE_API_KEY".to_string(),
        })?;

    if params.company.is_some() && !params.context.is_empty() {
        return Err(McpError::InvalidParameters {
            tool_name: "observer_analyze_task".to_string(),
            message: "'context' applies to 'task' only and cannot be combined with 'company'"
                .to_string(),
        });
    }

    let session = match params.session_id {
        Some(id) => {
            if !state.observer.session(&id)?.is_open() {
                return Err(ObserverError::SessionClosed { session_id: id }.into());
            }
            Some(SessionHandle::from_id(id))
        }
        None => state.observer.active_session(),
    };
    let agent_id = params
        .agent_id
        .unwrap_or_else(|| agent.name().to_string());

    let started = Instant::now();
    let (task, result) = match (params.task, params.company) {
        (_, Some(company)) => {
            let task = format!("Analyze investment opportunity for {}", company);
            (task, agent.analyze_investment_opportunity(&company).await)
        }
        (Some(task), None) => {
            let result = agent.analyze_task(&task, params.context.clone()).await;
            (task, result)
        }
        (None, None) => {
            return Err(McpError::InvalidParameters {
                tool_name: "observer_analyze_task".to_string(),
                message: "Either 'task' or 'company' must be provided".to_string(),
            });
        }
    };
    let elapsed = started.elapsed().as_secs_f64();

    if let Some(handle) = &session {
        let mut inputs = Payload::new();
        inputs.insert("task".to_string(), json!(task));
        inputs.insert("context".to_string(), Value::Object(params.context));

        let mut metadata = Payload::new();
        metadata.insert(RESPONSE_TIME_KEY.to_string(), json!(elapsed));
        metadata.insert(SUCCESS_KEY.to_string(), json!(result.is_ok()));

        let outputs = match &result {
            Ok(path) => {
                if let Some(tokens) = path.metrics.as_ref().and_then(|m| m.get(TOKEN_USAGE_KEY)) {
                    metadata.insert(TOKEN_USAGE_KEY.to_string(), tokens.clone());
                }
                path.to_payload()?
            }
            Err(e) => {
                warn!(error = %e, task = %task, "Task analysis failed");
                let mut outputs = Payload::new();
                outputs.insert("error".to_string(), json!(e.to_string()));
                outputs
            }
        };

        state
            .observer
            .track_decision(handle, agent_id, inputs, outputs, Some(metadata))?;
    }

    let response = AnalyzeTaskResponse {
        session_id: session.map(|handle| handle.id().to_string()),
        decision_path: result?,
    };
    serde_json::to_value(response).map_err(McpError::Json)
}

// ============================================================================
// Helper functions
// ============================================================================

/// Named session, or the active one
fn resolve_session(state: &SharedState, session_id: Option<String>) -> McpResult<SessionHandle> {
    match session_id {
        Some(id) => Ok(SessionHandle::from_id(id)),
        None => Ok(state
            .observer
            .active_session()
            .ok_or(ObserverError::NoActiveSession)?),
    }
}

/// Helper to parse arguments with consistent error handling
fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}

/// Like [`parse_arguments`], but missing arguments yield the default
fn parse_optional_arguments<T: serde::de::DeserializeOwned + Default>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => parse_arguments(tool_name, Some(args)),
        None => Ok(T::default()),
    }
}

/// Generic handler that executes an operation with consistent error handling.
///
/// This helper reduces boilerplate by handling:
/// - Argument parsing with typed deserialization
/// - Error conversion to McpError
/// - Result serialization to JSON Value
async fn execute_handler<P, R, E, F, Fut>(
    tool_name: &str,
    arguments: Option<Value>,
    operation: F,
) -> McpResult<Value>
where
    P: serde::de::DeserializeOwned,
    R: Serialize,
    E: std::fmt::Display,
    F: FnOnce(P) -> Fut,
    Fut: std::future::Future<Output = Result<R, E>>,
{
    let params: P = parse_arguments(tool_name, arguments)?;

    let result = operation(params)
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: e.to_string(),
        })?;

    serde_json::to_value(result).map_err(McpError::Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct TestParams {
        content: String,
        value: i32,
    }

    #[test]
    fn test_parse_arguments_success() {
        let args = Some(json!({
            "content": "test content",
            "value": 42
        }));

        let result: McpResult<TestParams> = parse_arguments("test.tool", args);
        assert!(result.is_ok());

        let params = result.unwrap();
        assert_eq!(params.content, "test content");
        assert_eq!(params.value, 42);
    }

    #[test]
    fn test_parse_arguments_missing_arguments() {
        let result: McpResult<TestParams> = parse_arguments("test.tool", None);
        assert!(result.is_err());

        let err = result.unwrap_err();
        assert!(matches!(err, McpError::InvalidParameters { .. }));
        assert!(err.to_string().contains("Missing arguments"));
        assert!(err.to_string().contains("test.tool"));
    }

    #[test]
    fn test_parse_arguments_wrong_type() {
        let args = Some(json!({
            "content": "test",
            "value": "not a number"
        }));

        let result: McpResult<TestParams> = parse_arguments("test.tool", args);
        assert!(matches!(result, Err(McpError::InvalidParameters { .. })));
    }

    #[test]
    fn test_parse_optional_arguments_defaults() {
        let params: OpenSessionParams =
            parse_optional_arguments("observer_open_session", None).unwrap();
        assert!(params.name.is_none());

        let params: OpenSessionParams =
            parse_optional_arguments("observer_open_session", Some(json!({"name": "s1"})))
                .unwrap();
        assert_eq!(params.name.as_deref(), Some("s1"));
    }

    #[test]
    fn test_parse_track_decision_params() {
        let args = Some(json!({
            "agent_id": "a1",
            "metadata": {"response_time": 1.5, "success": true}
        }));

        let params: TrackDecisionParams =
            parse_arguments("observer_track_decision", args).unwrap();
        assert_eq!(params.agent_id, "a1");
        assert!(params.session_id.is_none());
        assert!(params.inputs.is_empty());
        assert!(params.outputs.is_empty());
        assert_eq!(params.metadata.unwrap()["response_time"], json!(1.5));
    }

    #[test]
    fn test_parse_track_decision_params_requires_agent() {
        let result: McpResult<TrackDecisionParams> =
            parse_arguments("observer_track_decision", Some(json!({"inputs": {}})));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("agent_id"));
    }

    #[test]
    fn test_parse_convert_output_params() {
        let args = Some(json!({
            "agent_id": "swarm-1",
            "adapter": "swarm",
            "task": "Route traffic",
            "output": {"result": "east"}
        }));

        let params: ConvertOutputParams =
            parse_arguments("observer_convert_output", args).unwrap();
        assert_eq!(params.adapter, AdapterKind::Swarm);
        assert_eq!(params.output["result"], json!("east"));
        assert!(params.context.is_empty());
    }

    #[test]
    fn test_parse_convert_output_rejects_unknown_adapter() {
        let args = Some(json!({
            "agent_id": "a",
            "adapter": "langchain",
            "task": "t",
            "output": "x"
        }));

        let result: McpResult<ConvertOutputParams> =
            parse_arguments("observer_convert_output", args);
        assert!(matches!(result, Err(McpError::InvalidParameters { .. })));
    }

    #[tokio::test]
    async fn test_execute_handler_maps_operation_error() {
        let result = execute_handler(
            "test.tool",
            Some(json!({"content": "c", "value": 1})),
            |_: TestParams| async { Err::<Value, _>(ObserverError::NoActiveSession) },
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, McpError::ExecutionFailed { .. }));
        assert!(err.to_string().contains("No active session"));
    }
}
