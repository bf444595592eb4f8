use crate::config::Config;
use crate::session::executor::QueryExecutor;
use crate::session::manager::SessionManager;
use crate::{ColdQueryError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Shared state handed to every request handler
#[derive(Clone)]
pub struct ActionContext {
    /// Pool-backed executor used for autocommit requests
    pub executor: Arc<dyn QueryExecutor>,
    pub sessions: SessionManager,
    /// Responses warn about sessions expiring sooner than this
    pub expiry_warning: Duration,
}

impl ActionContext {
    pub fn new(executor: Arc<dyn QueryExecutor>, config: &Config) -> Self {
        let sessions = SessionManager::new(executor.clone(), config.max_sessions, config.session_ttl_duration());
        ActionContext {
            executor,
            sessions,
            expiry_warning: config.expiry_warning_duration(),
        }
    }

    pub fn with_sessions(executor: Arc<dyn QueryExecutor>, sessions: SessionManager, expiry_warning: Duration) -> Self {
        ActionContext {
            executor,
            sessions,
            expiry_warning,
        }
    }

    /// Executor for a request: the pool without a session id, the session's own connection otherwise.
    /// An unknown session id is an error and never falls back to the pool.
    pub fn resolve_executor(&self, session_id: Option<&str>) -> Result<Arc<dyn QueryExecutor>> {
        match session_id {
            None => Ok(self.executor.clone()),
            Some(id) => self
                .sessions
                .lookup_executor(id)
                .ok_or_else(|| ColdQueryError::InvalidSession(id.to_string())),
        }
    }

    /// Roll back and close every session, then close the pool
    pub async fn shutdown(&self) {
        let closed = self.sessions.close_all().await;
        info!("Shutting down ({} sessions closed)", closed);
        if let Err(e) = self.executor.disconnect(false).await {
            warn!("Failed to close connection pool: {}", e);
        }
    }
}
