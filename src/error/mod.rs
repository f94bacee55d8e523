use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid or missing configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong with the configuration.
        message: String,
    },

    /// Session store failure.
    #[error("Observer error: {0}")]
    Observer(#[from] ObserverError),

    /// Output conversion failure.
    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// Persistence failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Completion backend failure.
    #[error("Langbase error: {0}")]
    Langbase(#[from] LangbaseError),

    /// Protocol-level failure.
    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    /// Anything else.
    #[error("Internal error: {message}")]
    Internal {
        /// Error description.
        message: String,
    },
}

/// Session store and decision tracker errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObserverError {
    /// Implicit tracking was attempted while no session is active.
    #[error("No active session; open a session before tracking decisions")]
    NoActiveSession,

    /// The handle points at a session that has already been closed.
    #[error("Session is closed: {session_id}")]
    SessionClosed {
        /// The closed session.
        session_id: String,
    },

    /// No session with this identifier was ever opened.
    #[error("Session not found: {session_id}")]
    SessionNotFound {
        /// The requested identifier.
        session_id: String,
    },

    /// Another session is still open.
    #[error("Session {active_id} is already active; close it before opening another")]
    SessionAlreadyActive {
        /// The session that is currently open.
        active_id: String,
    },

    /// The identifier was used by an earlier session.
    #[error("Session identifier already used: {session_id}")]
    DuplicateSession {
        /// The reused identifier.
        session_id: String,
    },

    /// A decision record failed validation.
    #[error("Invalid decision record: {message}")]
    InvalidRecord {
        /// Why the record was rejected.
        message: String,
    },
}

impl ObserverError {
    /// True for the "no active session" family of precondition failures.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ObserverError::NoActiveSession | ObserverError::SessionClosed { .. }
        )
    }
}

/// Errors raised while converting agent output into a decision path
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// The output has a shape the adapter does not handle.
    #[error("{adapter} adapter cannot convert {kind} output")]
    UnsupportedOutput {
        /// Adapter name.
        adapter: String,
        /// JSON kind of the rejected output.
        kind: String,
    },

    /// A recognised field held an unusable value.
    #[error("Malformed field '{field}': {message}")]
    MalformedField {
        /// Field name.
        field: String,
        /// What was wrong with it.
        message: String,
    },

    /// The wrapped agent itself failed.
    #[error("Agent failed: {message}")]
    Agent {
        /// Agent error text.
        message: String,
    },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Could not open the database.
    #[error("Database connection failed: {message}")]
    Connection {
        /// Driver error text.
        message: String,
    },

    /// A query failed or returned unusable data.
    #[error("Query failed: {message}")]
    Query {
        /// Error description.
        message: String,
    },

    /// No stored session with this identifier.
    #[error("Session not found: {session_id}")]
    SessionNotFound {
        /// The requested identifier.
        session_id: String,
    },

    /// Schema migration failed.
    #[error("Migration failed: {message}")]
    Migration {
        /// Migrator error text.
        message: String,
    },

    /// A payload column could not be encoded or decoded.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Raw driver error.
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Langbase API errors
#[derive(Debug, Error)]
pub enum LangbaseError {
    /// All attempts failed.
    #[error("Langbase unavailable: {message} (retries: {retries})")]
    Unavailable {
        /// Last error seen.
        message: String,
        /// Number of attempts made.
        retries: u32,
    },

    /// Non-success HTTP status.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// The response body could not be used.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// What was wrong with it.
        message: String,
    },

    /// The request exceeded its deadline.
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// Transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    /// Malformed JSON-RPC request.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// What was wrong with it.
        message: String,
    },

    /// No tool with this name.
    #[error("Unknown tool: {tool_name}")]
    UnknownTool {
        /// The requested tool.
        tool_name: String,
    },

    /// Tool arguments failed to deserialize or validate.
    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters {
        /// The called tool.
        tool_name: String,
        /// Validation error.
        message: String,
    },

    /// The tool ran and failed.
    #[error("Tool execution failed: {message}")]
    ExecutionFailed {
        /// Underlying error text.
        message: String,
    },

    /// Result serialization failed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

impl From<ObserverError> for McpError {
    fn from(err: ObserverError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

impl From<StorageError> for McpError {
    fn from(err: StorageError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

impl From<LangbaseError> for McpError {
    fn from(err: LangbaseError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for session store and tracker operations
pub type ObserverResult<T> = Result<T, ObserverError>;

/// Result type alias for adapter conversions
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for Langbase operations
pub type LangbaseResult<T> = Result<T, LangbaseError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;
