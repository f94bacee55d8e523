//! MCP protocol implementation for JSON-RPC 2.0 communication.
//!
//! This module provides the core MCP server implementation including:
//! - JSON-RPC 2.0 request/response handling
//! - Tool definitions and schemas
//! - Stdio-based server communication
//!
//! The tool surface exposes the observer: sessions are opened, decisions
//! tracked and converted, and metrics read back through `observer_*` tools.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use super::{handle_tool_call, SharedState};
use crate::error::AppError;
use crate::storage::Storage;

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request identifier (None for notifications).
    pub id: Option<Value>,
    /// The method name to invoke.
    pub method: String,
    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request identifier (null for notifications; always serialized per JSON-RPC 2.0).
    pub id: Value,
    /// The result on success (mutually exclusive with error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure (mutually exclusive with result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Error code (negative for predefined errors).
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// MCP server information returned during initialization.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    /// The server name identifier.
    pub name: String,
    /// The server version string.
    pub version: String,
}

/// MCP server capabilities advertised to clients.
#[derive(Debug, Serialize)]
pub struct Capabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
}

/// Tool-specific capabilities.
#[derive(Debug, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change dynamically.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Result of the MCP initialize handshake.
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    /// The MCP protocol version supported.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capabilities.
    pub capabilities: Capabilities,
    /// Server identification information.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// MCP tool definition with JSON Schema.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    /// Unique tool name (used in tool calls).
    pub name: String,
    /// Human-readable description of the tool.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Parameters for a tools/call request.
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    /// The name of the tool to invoke.
    pub name: String,
    /// Optional arguments for the tool.
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Content item within a tool result.
#[derive(Debug, Serialize)]
pub struct ToolResultContent {
    /// The content type (e.g., "text").
    #[serde(rename = "type")]
    pub content_type: String,
    /// The text content of the result.
    pub text: String,
}

/// Result of a tool invocation.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    /// The result content items.
    pub content: Vec<ToolResultContent>,
    /// Whether the result represents an error.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// MCP Server running over stdio.
///
/// Handles JSON-RPC 2.0 messages over stdin/stdout for MCP protocol
/// communication with clients.
pub struct McpServer {
    /// Shared application state.
    state: SharedState,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Run the server on stdin/stdout until stdin closes
    pub async fn run(&self) -> std::io::Result<()> {
        info!("Agent observer MCP server starting...");
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve newline-delimited JSON-RPC from `input`, answering on `output`.
    ///
    /// When `input` ends, the active session (if any) is closed before
    /// returning.
    pub async fn serve<R, W>(&self, input: R, mut output: W) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(input).lines();

        while let Some(line) = lines.next_line().await? {
            let Some(response) = self.process_line(&line).await else {
                continue;
            };

            let response_json = serde_json::to_string(&response)?;
            debug!(response = %response_json, "Sending response");

            output.write_all(response_json.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }

        info!("EOF received, shutting down");
        self.shutdown().await;
        Ok(())
    }

    /// Decode one input line and handle it. Blank lines and notifications
    /// produce no response.
    pub async fn process_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        debug!(request = %trimmed, "Received request");

        match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                error!(error = %e, "Failed to parse request");
                Some(JsonRpcResponse::error(
                    None,
                    -32700,
                    format!("Parse error: {}", e),
                ))
            }
        }
    }

    /// Close a session left active by the client, persisting it when
    /// `persist_on_close` is set.
    async fn shutdown(&self) {
        let Some(handle) = self.state.observer.active_session() else {
            return;
        };

        if let Err(e) = self.state.observer.close_session(&handle) {
            warn!(session_id = %handle, error = %e, "Failed to close active session on shutdown");
            return;
        }
        info!(session_id = %handle, "Closed active session on shutdown");

        if self.state.config.observer.persist_on_close {
            let saved = match self.state.observer.session(handle.id()) {
                Ok(session) => self.state.storage.save_session(&session).await.map_err(AppError::from),
                Err(e) => Err(e.into()),
            };
            if let Err(e) = saved {
                warn!(session_id = %handle, error = %e, "Failed to persist session on shutdown");
            }
        }
    }

    /// Handle a single JSON-RPC request
    /// Returns None for notifications (requests without id) per JSON-RPC 2.0
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        // Check if this is a notification (no id = no response required)
        let is_notification = request.id.is_none();

        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(request.id)),
            "initialized" | "notifications/initialized" => {
                // Notification - no response per JSON-RPC 2.0
                debug!("Received initialized notification");
                None
            }
            "notifications/cancelled" => {
                // Notification - no response
                debug!("Received cancelled notification");
                None
            }
            "tools/list" => Some(self.handle_tools_list(request.id)),
            "tools/call" => Some(self.handle_tool_call(request.id, request.params).await),
            "ping" => Some(JsonRpcResponse::success(
                request.id,
                Value::Object(Default::default()),
            )),
            method => {
                // For unknown methods, only respond if it's a request (has id)
                if is_notification {
                    debug!(method = %method, "Unknown notification, ignoring");
                    None
                } else {
                    error!(method = %method, "Unknown method");
                    Some(JsonRpcResponse::error(
                        request.id,
                        -32601,
                        format!("Method not found: {}", method),
                    ))
                }
            }
        }
    }

    /// Handle initialize request
    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling initialize request");

        let result = InitializeResult {
            protocol_version: "2024-11-05".to_string(),
            capabilities: Capabilities {
                tools: ToolCapabilities {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: "agent-observer".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        match serde_json::to_value(result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize initialize result");
                JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
            }
        }
    }

    /// Handle tools/list request
    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling tools/list request");

        let mut tools = vec![
            get_open_session_tool(),
            get_close_session_tool(),
            get_track_decision_tool(),
            get_session_metrics_tool(),
            get_list_sessions_tool(),
            get_convert_output_tool(),
            get_persist_session_tool(),
            get_agent_success_rates_tool(),
        ];
        // Analysis needs a completion backend
        if self.state.agent.is_some() {
            tools.push(get_analyze_task_tool());
        }

        JsonRpcResponse::success(
            id,
            serde_json::json!({
                "tools": tools
            }),
        )
    }

    /// Handle tools/call request
    async fn handle_tool_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(p) => p,
                Err(e) => {
                    return JsonRpcResponse::error(id, -32602, format!("Invalid params: {}", e));
                }
            },
            None => {
                return JsonRpcResponse::error(id, -32602, "Missing params");
            }
        };

        info!(tool = %params.name, "Handling tool call");

        let (content, is_error) =
            match handle_tool_call(&self.state, &params.name, params.arguments).await {
                Ok(result) => {
                    let text = serde_json::to_string_pretty(&result).unwrap_or_else(|e| {
                        error!(error = %e, "Failed to serialize tool result");
                        format!("{{\"error\": \"Serialization failed: {}\"}}", e)
                    });
                    (
                        ToolResultContent {
                            content_type: "text".to_string(),
                            text,
                        },
                        None,
                    )
                }
                Err(e) => (
                    ToolResultContent {
                        content_type: "text".to_string(),
                        text: format!("Error: {}", e),
                    },
                    Some(true),
                ),
            };

        let tool_result = ToolCallResult {
            content: vec![content],
            is_error,
        };

        match serde_json::to_value(tool_result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize tool call result");
                JsonRpcResponse::error(id.clone(), -32603, format!("Internal error: {}", e))
            }
        }
    }
}

// ============================================================================
// Session Tools
// ============================================================================

/// Get the open session tool definition
fn get_open_session_tool() -> Tool {
    Tool {
        name: "observer_open_session".to_string(),
        description: "Open an observation session. Only one session can be active at a time; decisions tracked without an explicit session go to the active one.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Optional session identifier (generated if not provided)"
                }
            },
            "additionalProperties": false
        }),
    }
}

/// Get the close session tool definition
fn get_close_session_tool() -> Tool {
    Tool {
        name: "observer_close_session".to_string(),
        description: "Close an observation session and return its metrics. Closing an already closed session is a no-op.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "The session ID to close"
                }
            },
            "required": ["session_id"],
            "additionalProperties": false
        }),
    }
}

/// Get the track decision tool definition
fn get_track_decision_tool() -> Tool {
    Tool {
        name: "observer_track_decision".to_string(),
        description: "Record one agent decision. Metadata keys response_time (seconds), token_usage and success feed the session metrics.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Target session (defaults to the active session)"
                },
                "agent_id": {
                    "type": "string",
                    "description": "Identifier of the agent that made the decision"
                },
                "inputs": {
                    "type": "object",
                    "description": "What the agent was given",
                    "additionalProperties": true
                },
                "outputs": {
                    "type": "object",
                    "description": "What the agent produced",
                    "additionalProperties": true
                },
                "metadata": {
                    "type": "object",
                    "properties": {
                        "response_time": { "type": "number", "minimum": 0 },
                        "token_usage": { "type": "number", "minimum": 0 },
                        "success": { "type": "boolean" }
                    },
                    "description": "Optional metadata",
                    "additionalProperties": true
                }
            },
            "required": ["agent_id"],
            "additionalProperties": false
        }),
    }
}

/// Get the session metrics tool definition
fn get_session_metrics_tool() -> Tool {
    Tool {
        name: "observer_session_metrics".to_string(),
        description: "Get duration, decision count, agents and averages (response time, token usage, success rate) for a live or stored session.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "The session ID"
                }
            },
            "required": ["session_id"],
            "additionalProperties": false
        }),
    }
}

/// Get the list sessions tool definition
fn get_list_sessions_tool() -> Tool {
    Tool {
        name: "observer_list_sessions".to_string(),
        description: "List the active session, sessions held in memory and sessions persisted to storage.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }),
    }
}

/// Get the persist session tool definition
fn get_persist_session_tool() -> Tool {
    Tool {
        name: "observer_persist_session".to_string(),
        description: "Write a session and all its decisions to storage, replacing any earlier copy.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "The session ID to persist"
                }
            },
            "required": ["session_id"],
            "additionalProperties": false
        }),
    }
}

// ============================================================================
// Adapter & Analysis Tools
// ============================================================================

/// Get the convert output tool definition
fn get_convert_output_tool() -> Tool {
    Tool {
        name: "observer_convert_output".to_string(),
        description: "Convert raw agent output into a decision path with the generic or swarm adapter and record the conversion as a decision.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Target session (defaults to the active session)"
                },
                "agent_id": {
                    "type": "string",
                    "description": "Identifier recorded for the decision"
                },
                "adapter": {
                    "type": "string",
                    "enum": ["generic", "swarm"],
                    "description": "Which adapter to convert with"
                },
                "task": {
                    "type": "string",
                    "description": "The task the agent worked on"
                },
                "output": {
                    "description": "Raw agent output (string or object for generic, object for swarm)"
                },
                "context": {
                    "type": "object",
                    "description": "Optional task context",
                    "additionalProperties": true
                }
            },
            "required": ["agent_id", "adapter", "task", "output"],
            "additionalProperties": false
        }),
    }
}

/// Get the agent success rates tool definition
fn get_agent_success_rates_tool() -> Tool {
    Tool {
        name: "observer_agent_success_rates".to_string(),
        description: "Success rate per agent over stored and in-memory decisions, plus the most common task/decision patterns.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "agent_id": {
                    "type": "string",
                    "description": "Restrict to one agent"
                }
            },
            "additionalProperties": false
        }),
    }
}

/// Get the analyze task tool definition
fn get_analyze_task_tool() -> Tool {
    Tool {
        name: "observer_analyze_task".to_string(),
        description: "Run the reasoning agent on a task (analysis, alternatives, trade-offs, final decision) and record the result as a decision.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "The task to analyze"
                },
                "company": {
                    "type": "string",
                    "description": "Analyze this company as an investment opportunity instead of a free-form task"
                },
                "context": {
                    "type": "object",
                    "description": "Optional context for 'task'; not accepted with 'company'",
                    "additionalProperties": true
                },
                "session_id": {
                    "type": "string",
                    "description": "Target session (defaults to the active session)"
                },
                "agent_id": {
                    "type": "string",
                    "description": "Identifier recorded for the decision (default: the agent's name)"
                }
            },
            "additionalProperties": false
        }),
    }
}
