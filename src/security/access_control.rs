use crate::{ColdQueryError, Result};

/// Writes must run inside a session or be explicitly marked autocommit
pub fn require_write_access(session_id: Option<&str>, autocommit: bool) -> Result<()> {
    match session_id {
        Some(id) if !id.is_empty() => Ok(()),
        _ if autocommit => Ok(()),
        _ => Err(ColdQueryError::WriteAccessDenied),
    }
}
