use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Verification-protocol errors.
///
/// These are caller-recoverable failures of the dialogue protocol itself,
/// distinct from a business-level `failed` verdict (evidence insufficient),
/// which is carried in the reply status and is never an error.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Unknown session: {session_id}")]
    UnknownSession { session_id: String },

    #[error("Session {session_id} already finished with status '{status}'")]
    Terminated { session_id: String, status: String },

    #[error("Session already active: {session_id}")]
    Duplicate { session_id: String },

    #[error("Invalid answer '{value}': expected yes, no or unknown")]
    InvalidAnswer { value: String },

    #[error("Invalid target: {reason}")]
    InvalidTarget { reason: String },

    #[error("Session {session_id} has no pending question")]
    NoPendingQuestion { session_id: String },
}

impl SessionError {
    /// Machine-readable error kind carried in protocol error replies.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::UnknownSession { .. } => "unknown_session",
            SessionError::Terminated { .. } => "session_terminated",
            SessionError::Duplicate { .. } => "duplicate_session",
            SessionError::InvalidAnswer { .. } => "invalid_answer",
            SessionError::InvalidTarget { .. } => "invalid_target",
            SessionError::NoPendingQuestion { .. } => "no_pending_question",
        }
    }
}

/// Rule-engine API errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters { tool_name: String, message: String },

    #[error("Tool execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Machine-readable kind for in-band `status: "error"` replies.
    pub fn error_kind(&self) -> &'static str {
        match self {
            AppError::Config { .. } => "config_error",
            AppError::Session(e) => e.kind(),
            AppError::Engine(_) => "engine_error",
            AppError::Mcp(_) => "protocol_error",
            AppError::Internal { .. } => "internal_error",
        }
    }
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;
