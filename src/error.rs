//! Error types for worklog.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Spreadsheet backend errors (local libSQL or remote Sheets API).
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Sheet {sheet} request failed: {reason}")]
    Remote { sheet: String, reason: String },

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
}

/// Typed table access errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkbookError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("{entity} already exists: {key}")]
    Duplicate { entity: &'static str, key: String },

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("No LLM configured")]
    NotConfigured,
}

/// File storage errors.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Upload of {filename} failed: {reason}")]
    Failed { filename: String, reason: String },

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
}

/// Calendar service errors.
#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("Event insert into {calendar_id} failed: {reason}")]
    InsertFailed { calendar_id: String, reason: String },

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
}

/// Google OAuth token errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid service account key: {0}")]
    InvalidKey(String),

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),
}

/// Note submission errors.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Content is empty")]
    EmptyContent,

    #[error("No tasks configured")]
    NoTasks,

    #[error("AI mode is unavailable: no LLM configured")]
    AiUnavailable,

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error(transparent)]
    Workbook(#[from] WorkbookError),
}
