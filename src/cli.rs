//! CLI report commands over persisted sessions.
//!
//! Reads the SQLite store directly; nothing here touches a running server.

use clap::Subcommand;

use crate::observer::{Session, SessionMetrics};
use crate::storage::{SqliteStorage, Storage};

/// Report subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum ReportCommands {
    /// List stored sessions with their headline metrics
    Sessions {
        /// Maximum number of sessions to show (most recent first)
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show one stored session and its decisions
    Session {
        /// Session identifier
        id: String,
    },

    /// Show success rates per agent across stored sessions
    Agents {
        /// Restrict to one agent
        #[arg(long)]
        agent: Option<String>,
    },
}

/// Result of CLI command execution.
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Execute a report command.
pub async fn execute_command(command: ReportCommands, storage: &SqliteStorage) -> CliResult {
    match command {
        ReportCommands::Sessions { limit } => execute_sessions(storage, limit).await,
        ReportCommands::Session { id } => execute_session(storage, &id).await,
        ReportCommands::Agents { agent } => execute_agents(storage, agent.as_deref()).await,
    }
}

const RULE: &str =
    "═══════════════════════════════════════════════════════════════════════════════\n\n";

async fn execute_sessions(storage: &SqliteStorage, limit: usize) -> CliResult {
    let ids = match storage.list_session_ids().await {
        Ok(ids) => ids,
        Err(e) => return CliResult::error(format!("Failed to list sessions: {}", e)),
    };

    let mut output = String::new();
    output.push_str("\nStored Sessions\n");
    output.push_str(RULE);

    if ids.is_empty() {
        output.push_str("No sessions stored.\n");
        return CliResult::success(output);
    }

    output.push_str(&format!(
        "Showing {} of {} session(s):\n\n",
        ids.len().min(limit),
        ids.len()
    ));

    for id in ids.iter().rev().take(limit) {
        match storage.get_session(id).await {
            Ok(Some(session)) => {
                output.push_str(&session_line(&SessionMetrics::from_session(&session), &session));
            }
            Ok(None) => output.push_str(&format!("{} | (missing)\n", id)),
            Err(e) => return CliResult::error(format!("Failed to load session {}: {}", id, e)),
        }
    }

    CliResult::success(output)
}

async fn execute_session(storage: &SqliteStorage, id: &str) -> CliResult {
    let session = match storage.get_session(id).await {
        Ok(Some(session)) => session,
        Ok(None) => return CliResult::error(format!("Session not found: {}", id)),
        Err(e) => return CliResult::error(format!("Failed to load session {}: {}", id, e)),
    };
    let metrics = SessionMetrics::from_session(&session);

    let mut output = String::new();
    output.push_str(&format!("\nSession {}\n", session.id));
    output.push_str(RULE);
    output.push_str(&format!(
        "Started:   {}\n",
        session.started_at.format("%Y-%m-%d %H:%M:%S")
    ));
    match session.ended_at {
        Some(ended) => output.push_str(&format!("Ended:     {}\n", ended.format("%Y-%m-%d %H:%M:%S"))),
        None => output.push_str("Ended:     (open)\n"),
    }
    output.push_str(&format!("Duration:  {:.1}s\n", metrics.duration));
    output.push_str(&format!("Decisions: {}\n", metrics.decision_count));
    output.push_str(&format!(
        "Agents:    {}\n",
        metrics.agents.iter().cloned().collect::<Vec<_>>().join(", ")
    ));
    output.push_str(&format!(
        "Averages:  response {:.3}s | tokens {:.1} | success {:.1}%\n\n",
        metrics.averages.avg_response_time,
        metrics.averages.avg_token_usage,
        metrics.averages.success_rate
    ));

    for (index, decision) in session.decisions.iter().enumerate() {
        let outcome = if decision.succeeded() {
            "✓"
        } else if decision.failed() {
            "✗"
        } else {
            "·"
        };
        output.push_str(&format!(
            "{:>3}. {} {} | {} | {:.3}s\n",
            index + 1,
            outcome,
            decision.timestamp.format("%H:%M:%S"),
            decision.agent_id,
            decision.response_time()
        ));
    }

    CliResult::success(output)
}

async fn execute_agents(storage: &SqliteStorage, agent: Option<&str>) -> CliResult {
    let rates = match storage.agent_success_rates(agent).await {
        Ok(rates) => rates,
        Err(e) => return CliResult::error(format!("Failed to compute success rates: {}", e)),
    };

    let mut output = String::new();
    output.push_str("\nAgent Success Rates\n");
    output.push_str(RULE);

    if rates.is_empty() {
        output.push_str("No decisions recorded.\n");
    }
    for (agent_id, rate) in rates {
        output.push_str(&format!("{:<30} {:>6.1}%\n", agent_id, rate * 100.0));
    }

    CliResult::success(output)
}

fn session_line(metrics: &SessionMetrics, session: &Session) -> String {
    format!(
        "{} | {} | {} decision(s) | {:.1}s | success {:.1}%{}\n",
        session.started_at.format("%Y-%m-%d %H:%M:%S"),
        session.id,
        metrics.decision_count,
        metrics.duration,
        metrics.averages.success_rate,
        if metrics.open { " | open" } else { "" }
    )
}
