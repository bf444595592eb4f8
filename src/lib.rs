pub mod actions;
pub mod config;
pub mod error;
pub mod protocol;
pub mod query;
pub mod security;
pub mod session;
pub mod types;

use thiserror::Error;

pub use error::EngineError;

#[derive(Error, Debug)]
pub enum ColdQueryError {
    #[error("Maximum number of concurrent sessions reached ({max})")]
    ResourceExhausted { max: usize },

    #[error("Invalid or expired session: {0}")]
    InvalidSession(String),

    #[error("Invalid isolation level: {0}")]
    InvalidIsolationLevel(String),

    #[error("Invalid identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(
        "Write operations require an active session or 'autocommit=true'. \
         Use the 'pg_tx' tool to begin a transaction and obtain a session_id."
    )]
    WriteAccessDenied,

    #[error("Tool '{0}' is locked. Use 'auth_unlock' with a valid token to enable dangerous tools.")]
    Locked(String),

    #[error("Database error: {0}")]
    Engine(#[from] EngineError),

    #[error("Connection error: {0}")]
    Connectivity(String),

    #[error("Transaction failed at operation {index}: {source}")]
    BatchFailed {
        index: usize,
        #[source]
        source: Box<ColdQueryError>,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Feature not supported: {0}")]
    NotSupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ColdQueryError>;

impl ColdQueryError {
    /// Stable machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ColdQueryError::ResourceExhausted { .. } => "resource_exhausted",
            ColdQueryError::InvalidSession(_) => "invalid_session",
            ColdQueryError::InvalidIsolationLevel(_) => "invalid_isolation_level",
            ColdQueryError::InvalidIdentifier { .. } => "invalid_identifier",
            ColdQueryError::InvalidParameter(_) => "invalid_parameter",
            ColdQueryError::WriteAccessDenied => "write_access_denied",
            ColdQueryError::Locked(_) => "locked",
            ColdQueryError::Engine(_) => "engine_error",
            ColdQueryError::Connectivity(_) => "connectivity_error",
            ColdQueryError::BatchFailed { .. } => "batch_failed",
            ColdQueryError::InvalidRequest(_) => "invalid_request",
            ColdQueryError::NotSupported(_) => "not_supported",
            ColdQueryError::Io(_) => "io_error",
        }
    }

    /// SQLSTATE-style code; engine errors keep the code the server reported
    pub fn code(&self) -> Option<&str> {
        match self {
            ColdQueryError::ResourceExhausted { .. } => Some("53300"), // too_many_connections
            ColdQueryError::InvalidSession(_) => Some("08003"), // connection_does_not_exist
            ColdQueryError::InvalidIsolationLevel(_) => Some("22023"), // invalid_parameter_value
            ColdQueryError::InvalidIdentifier { .. } => Some("42602"), // invalid_name
            ColdQueryError::InvalidParameter(_) => Some("22023"),
            ColdQueryError::WriteAccessDenied => Some("42501"), // insufficient_privilege
            ColdQueryError::Locked(_) => Some("28000"), // invalid_authorization_specification
            ColdQueryError::Engine(e) => e.code.as_deref(),
            ColdQueryError::Connectivity(_) => Some("08006"), // connection_failure
            ColdQueryError::BatchFailed { source, .. } => source.code(),
            ColdQueryError::InvalidRequest(_) => Some("08P01"), // protocol_violation
            ColdQueryError::NotSupported(_) => Some("0A000"), // feature_not_supported
            ColdQueryError::Io(_) => Some("58030"), // io_error
        }
    }

    pub fn invalid_identifier(name: &str, reason: impl Into<String>) -> Self {
        ColdQueryError::InvalidIdentifier {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
