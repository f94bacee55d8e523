//! # Agent Observer
//!
//! Session-scoped decision tracking for autonomous agents, exposed as a
//! Model Context Protocol (MCP) server.
//!
//! ## Features
//!
//! - **Sessions**: At most one active observation window at a time, with scoped
//!   acquisition that always closes what it opens
//! - **Decision Tracking**: Append-only records of what each agent was given,
//!   what it produced and how long it took
//! - **Metrics**: Duration, agents, average response time, token usage and
//!   success rate per session
//! - **Adapters**: Conversion of generic and swarm-style agent output into
//!   structured decision paths, recorded as decisions
//! - **Reasoning Agent**: A four-step analysis (analysis, alternatives,
//!   trade-offs, decision) backed by a Langbase pipe
//! - **Persistence**: SQLite storage and CLI reports over stored sessions
//!
//! ## Architecture
//!
//! ```text
//! Agent output → Adapter → Observer (sessions) → Metrics
//!                               ↓
//! MCP Client → MCP Server → SQLite (persisted sessions)
//!                  ↓
//!           Langbase Pipes (HTTP, optional)
//! ```
//!
//! ## Example
//!
//! ```
//! use agent_observer::decision::Payload;
//! use agent_observer::Observer;
//! use serde_json::json;
//!
//! let observer = Observer::new();
//! let guard = observer.scope(Some("example")).unwrap();
//!
//! let metadata: Payload = serde_json::from_value(json!({
//!     "response_time": 1.2,
//!     "token_usage": 150,
//!     "success": true
//! }))
//! .unwrap();
//! guard
//!     .track("planner", Payload::new(), Payload::new(), Some(metadata))
//!     .unwrap();
//!
//! let metrics = guard.finish().unwrap();
//! assert_eq!(metrics.decision_count, 1);
//! assert_eq!(metrics.averages.success_rate, 100.0);
//! ```

#![warn(missing_docs)]

/// Agent-output adapters and observed conversions.
pub mod adapters;
/// Multi-step reasoning agent over a completion backend.
pub mod agent;
/// CLI report commands over persisted sessions.
pub mod cli;
/// Configuration management.
pub mod config;
/// Decision path model and confidence classification.
pub mod decision;
/// Error types and result aliases for the application.
pub mod error;
/// Langbase API client and types for pipe communication.
pub mod langbase;
/// Session store, decision tracker and metrics.
pub mod observer;
/// Parsers for the structured blocks in model responses.
pub mod parsing;
/// Prompts for the reasoning agent.
pub mod prompts;
/// MCP server implementation and request handling.
pub mod server;
/// SQLite storage layer for persistence.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use observer::Observer;
pub use server::{AppState, McpServer, SharedState};
