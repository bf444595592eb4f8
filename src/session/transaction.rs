use crate::query::QueryResult;
use crate::security::identifiers::sanitize_identifier;
use crate::session::executor::QueryExecutor;
use crate::session::manager::SessionManager;
use crate::{ColdQueryError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = ColdQueryError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
        match normalized.as_str() {
            "READ UNCOMMITTED" => Ok(IsolationLevel::ReadUncommitted),
            "READ COMMITTED" => Ok(IsolationLevel::ReadCommitted),
            "REPEATABLE READ" => Ok(IsolationLevel::RepeatableRead),
            "SERIALIZABLE" => Ok(IsolationLevel::Serializable),
            _ => Err(ColdQueryError::InvalidIsolationLevel(s.to_string())),
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// One statement of a batched transaction
#[derive(Debug, Clone, Deserialize)]
pub struct BatchOperation {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

fn session_executor(sessions: &SessionManager, session_id: &str) -> Result<Arc<dyn QueryExecutor>> {
    sessions
        .lookup_executor(session_id)
        .ok_or_else(|| ColdQueryError::InvalidSession(session_id.to_string()))
}

/// Open a session and start a transaction on it.
///
/// The isolation level is validated before any connection is checked out. If
/// BEGIN fails the session is closed again.
pub async fn begin(sessions: &SessionManager, isolation_level: Option<&str>) -> Result<String> {
    let isolation = isolation_level.map(IsolationLevel::from_str).transpose()?;

    let session_id = sessions.create().await?;
    let sql = match isolation {
        Some(level) => format!("BEGIN ISOLATION LEVEL {}", level),
        None => "BEGIN".to_string(),
    };

    let started = match session_executor(sessions, &session_id) {
        Ok(executor) => executor.execute(&sql, &[], None).await,
        Err(e) => Err(e),
    };
    if let Err(e) = started {
        sessions.close(&session_id).await;
        return Err(e);
    }

    debug!("Session {} started: {}", session_id, sql);
    Ok(session_id)
}

pub async fn commit(sessions: &SessionManager, session_id: &str) -> Result<()> {
    finish(sessions, session_id, "COMMIT").await
}

pub async fn rollback(sessions: &SessionManager, session_id: &str) -> Result<()> {
    finish(sessions, session_id, "ROLLBACK").await
}

// The session is closed whether or not the statement succeeds
async fn finish(sessions: &SessionManager, session_id: &str, sql: &str) -> Result<()> {
    let executor = session_executor(sessions, session_id)?;
    let outcome = executor.execute(sql, &[], None).await;
    sessions.close(session_id).await;
    outcome.map(|_| ())
}

pub async fn savepoint(sessions: &SessionManager, session_id: &str, name: &str) -> Result<()> {
    in_session(sessions, session_id, &format!("SAVEPOINT {}", sanitize_identifier(name)?)).await
}

pub async fn release(sessions: &SessionManager, session_id: &str, name: &str) -> Result<()> {
    in_session(sessions, session_id, &format!("RELEASE SAVEPOINT {}", sanitize_identifier(name)?)).await
}

pub async fn rollback_to(sessions: &SessionManager, session_id: &str, name: &str) -> Result<()> {
    in_session(sessions, session_id, &format!("ROLLBACK TO SAVEPOINT {}", sanitize_identifier(name)?)).await
}

async fn in_session(sessions: &SessionManager, session_id: &str, sql: &str) -> Result<()> {
    let executor = session_executor(sessions, session_id)?;
    executor.execute(sql, &[], None).await?;
    Ok(())
}

/// Run `operations` atomically on a throwaway session.
///
/// The first failing operation rolls the transaction back and is reported
/// with its index. The session is always closed afterward.
pub async fn run_batch(
    sessions: &SessionManager,
    operations: &[BatchOperation],
    timeout: Option<Duration>,
) -> Result<Vec<QueryResult>> {
    if operations.is_empty() {
        return Err(ColdQueryError::InvalidParameter(
            "a transaction batch needs at least one operation".to_string(),
        ));
    }

    let session_id = sessions.create().await?;
    let outcome = run_in_session(sessions, &session_id, operations, timeout).await;
    sessions.close(&session_id).await;
    outcome
}

async fn run_in_session(
    sessions: &SessionManager,
    session_id: &str,
    operations: &[BatchOperation],
    timeout: Option<Duration>,
) -> Result<Vec<QueryResult>> {
    let executor = session_executor(sessions, session_id)?;
    executor.execute("BEGIN", &[], None).await?;

    let mut results = Vec::with_capacity(operations.len());
    for (index, operation) in operations.iter().enumerate() {
        match executor.execute(&operation.sql, &operation.params, timeout).await {
            Ok(result) => results.push(result),
            Err(e) => {
                if let Err(rollback_error) = executor.execute("ROLLBACK", &[], None).await {
                    warn!("Rollback after failed operation {} failed: {}", index, rollback_error);
                }
                return Err(ColdQueryError::BatchFailed {
                    index,
                    source: Box::new(e),
                });
            }
        }
    }

    executor.execute("COMMIT", &[], None).await?;
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_level_parsing() {
        assert_eq!("serializable".parse::<IsolationLevel>().unwrap(), IsolationLevel::Serializable);
        assert_eq!(
            "  repeatable   read ".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::RepeatableRead
        );
        assert_eq!(IsolationLevel::ReadUncommitted.to_string(), "READ UNCOMMITTED");

        let err = "SNAPSHOT".parse::<IsolationLevel>().unwrap_err();
        assert_eq!(err.kind(), "invalid_isolation_level");
        assert!(err.to_string().contains("SNAPSHOT"));
    }

    #[test]
    fn test_batch_operation_params_default_to_empty() {
        let op: BatchOperation = serde_json::from_str(r#"{"sql": "DELETE FROM t"}"#).unwrap();
        assert!(op.params.is_empty());
    }
}
