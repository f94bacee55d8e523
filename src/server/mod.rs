//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Tool call handlers and routing
//! - Shared application state management

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;

use crate::agent::{CompletionClient, ReasoningAgent};
use crate::config::Config;
use crate::observer::Observer;
use crate::storage::SqliteStorage;

/// Reasoning agent over any completion backend.
pub type SharedAgent = ReasoningAgent<Arc<dyn CompletionClient>>;

/// Application state shared across handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// In-process session store.
    pub observer: Observer,
    /// SQLite storage backend.
    pub storage: SqliteStorage,
    /// Reasoning agent, present only when a completion backend is configured.
    pub agent: Option<SharedAgent>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: Config,
        storage: SqliteStorage,
        completion: Option<Arc<dyn CompletionClient>>,
    ) -> Self {
        tracing::info!(
            analysis_pipe = %config.pipes.analysis,
            agent_enabled = completion.is_some(),
            persist_on_close = config.observer.persist_on_close,
            "AppState initializing"
        );

        Self {
            config,
            observer: Observer::new(),
            storage,
            agent: completion.map(|client| ReasoningAgent::new("reasoning-agent", client)),
        }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;
