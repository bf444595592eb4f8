use crate::ColdQueryError;
use crate::query::params::ParamError;
use serde::Serialize;
use std::error::Error as _;
use std::fmt;
use tokio_postgres::error::{DbError, ErrorPosition};

/// Error reported by the PostgreSQL server for a statement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineError {
    /// SQLSTATE code, e.g. 42601 for a syntax error
    pub code: Option<String>,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub position: Option<u32>,
}

impl EngineError {
    pub fn from_db_error(err: &DbError) -> Self {
        let position = match err.position() {
            Some(ErrorPosition::Original(pos)) => Some(*pos),
            Some(ErrorPosition::Internal { position, .. }) => Some(*position),
            None => None,
        };

        EngineError {
            code: Some(err.code().code().to_string()),
            message: err.message().to_string(),
            detail: err.detail().map(str::to_string),
            hint: err.hint().map(str::to_string),
            position,
        }
    }

    /// Whether retrying the whole transaction may succeed (serialization failure, deadlock)
    pub fn is_transient(&self) -> bool {
        matches!(self.code.as_deref(), Some("40001") | Some("40P01"))
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} (SQLSTATE {})", self.message, code)?,
            None => write!(f, "{}", self.message)?,
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {}", detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for EngineError {}

impl From<tokio_postgres::Error> for ColdQueryError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_error) = err.as_db_error() {
            return ColdQueryError::Engine(EngineError::from_db_error(db_error));
        }

        // Parameter encoding failures surface through the driver as its own error type
        if let Some(param_error) = err.source().and_then(|s| s.downcast_ref::<ParamError>()) {
            return ColdQueryError::InvalidParameter(param_error.to_string());
        }

        ColdQueryError::Connectivity(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for ColdQueryError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        ColdQueryError::Connectivity(format!("failed to acquire connection: {}", err))
    }
}
