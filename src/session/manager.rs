use crate::query::QueryResult;
use crate::session::executor::QueryExecutor;
use crate::{ColdQueryError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Registry of transaction sessions, each pinned to one dedicated connection.
///
/// Every session carries a sliding inactivity timer. Looking up its executor
/// restarts the timer, and so does every statement finishing on it; a timer
/// firing while a statement is still running is ignored. Otherwise the
/// session is removed and its connection destroyed. Removal is "pop if present" under the map lock, so a
/// connection is released exactly once no matter how `close` and expiry
/// interleave.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    pool_executor: Arc<dyn QueryExecutor>,
    max_sessions: usize,
    ttl: Duration,
}

struct SessionEntry {
    executor: Arc<ActiveExecutor>,
    created_at: DateTime<Utc>,
    last_accessed: Instant,
    // Bumped on every reschedule; a timer only expires the generation it was started for
    generation: u64,
    expiry: Option<JoinHandle<()>>,
}

impl SessionEntry {
    fn info(&self, id: &str, ttl: Duration) -> SessionInfo {
        let idle = self.last_accessed.elapsed();
        SessionInfo {
            id: id.to_string(),
            created_at: self.created_at,
            idle,
            expires_in: ttl.saturating_sub(idle),
        }
    }
}

/// Read-only snapshot of one session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub idle: Duration,
    pub expires_in: Duration,
}

impl SessionInfo {
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            created_at: self.created_at,
            idle_seconds: self.idle.as_secs(),
            expires_in_seconds: self.expires_in.as_secs(),
        }
    }
}

/// Serializable entry returned by [`SessionManager::list`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub idle_seconds: u64,
    pub expires_in_seconds: u64,
}

impl SessionManager {
    pub fn new(pool_executor: Arc<dyn QueryExecutor>, max_sessions: usize, ttl: Duration) -> Self {
        SessionManager {
            inner: Arc::new(Inner {
                sessions: Mutex::new(HashMap::new()),
                pool_executor,
                max_sessions,
                ttl,
            }),
        }
    }

    pub fn max_sessions(&self) -> usize {
        self.inner.max_sessions
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open a new session on a dedicated connection and return its id
    pub async fn create(&self) -> Result<String> {
        let max = self.inner.max_sessions;
        if self.len() >= max {
            return Err(ColdQueryError::ResourceExhausted { max });
        }

        let connection = self.inner.pool_executor.create_session().await?;
        let id = Uuid::new_v4().to_string();
        let executor = Arc::new(ActiveExecutor {
            id: id.clone(),
            registry: Arc::downgrade(&self.inner),
            executor: connection,
            in_flight: AtomicUsize::new(0),
        });

        // Other creates may have filled the registry while the connection was being acquired
        let rejected = {
            let mut sessions = self.inner.sessions.lock();
            if sessions.len() >= max {
                Some(executor)
            } else {
                let generation = 0;
                sessions.insert(
                    id.clone(),
                    SessionEntry {
                        executor,
                        created_at: Utc::now(),
                        last_accessed: Instant::now(),
                        generation,
                        expiry: spawn_expiry(&self.inner, &id, generation),
                    },
                );
                None
            }
        };

        if let Some(executor) = rejected {
            if let Err(e) = executor.disconnect(true).await {
                warn!("Failed to release connection of rejected session: {}", e);
            }
            return Err(ColdQueryError::ResourceExhausted { max });
        }

        info!("Created session {} ({}/{} active)", id, self.len(), max);
        Ok(id)
    }

    /// Executor of a live session; refreshes its last-access time and restarts its timer
    pub fn lookup_executor(&self, id: &str) -> Option<Arc<dyn QueryExecutor>> {
        let executor: Arc<dyn QueryExecutor> = self.inner.touch(id)?;
        Some(executor)
    }

    /// Metadata of a live session without touching its timer
    pub fn lookup_metadata(&self, id: &str) -> Option<SessionInfo> {
        self.inner
            .sessions
            .lock()
            .get(id)
            .map(|entry| entry.info(id, self.inner.ttl))
    }

    pub fn list(&self) -> Vec<SessionSummary> {
        let sessions = self.inner.sessions.lock();
        let mut summaries: Vec<SessionSummary> = sessions
            .iter()
            .map(|(id, entry)| entry.info(id, self.inner.ttl).summary())
            .collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    /// Remove a session and destroy its connection; false when the id is unknown
    pub async fn close(&self, id: &str) -> bool {
        let entry = self.inner.sessions.lock().remove(id);
        let Some(mut entry) = entry else {
            debug!("Session {} already closed", id);
            return false;
        };

        if let Some(timer) = entry.expiry.take() {
            timer.abort();
        }
        if let Err(e) = entry.executor.disconnect(true).await {
            warn!("Failed to release connection for session {}: {}", id, e);
        }

        info!("Closed session {} ({} active)", id, self.len());
        true
    }

    /// Close every session; used at shutdown
    pub async fn close_all(&self) -> usize {
        let drained: Vec<(String, SessionEntry)> = self.inner.sessions.lock().drain().collect();
        let count = drained.len();

        join_all(drained.into_iter().map(|(id, mut entry)| async move {
            if let Some(timer) = entry.expiry.take() {
                timer.abort();
            }
            if let Err(e) = entry.executor.disconnect(true).await {
                warn!("Failed to release connection for session {}: {}", id, e);
            }
        }))
        .await;

        if count > 0 {
            info!("Closed {} sessions", count);
        }
        count
    }
}

impl Inner {
    /// Refresh the last-access time and restart the timer of a live session
    fn touch(self: &Arc<Self>, id: &str) -> Option<Arc<ActiveExecutor>> {
        let mut sessions = self.sessions.lock();
        let entry = sessions.get_mut(id)?;

        entry.last_accessed = Instant::now();
        entry.generation += 1;
        if let Some(timer) = entry.expiry.take() {
            timer.abort();
        }
        entry.expiry = spawn_expiry(self, id, entry.generation);

        Some(entry.executor.clone())
    }

    async fn expire(&self, id: &str, generation: u64) {
        let entry = {
            let mut sessions = self.sessions.lock();
            let current = sessions
                .get(id)
                .is_some_and(|entry| entry.generation == generation && entry.executor.is_idle());
            if current { sessions.remove(id) } else { None }
        };
        // The entry's timer handle is this task; dropping it detaches
        let Some(entry) = entry else {
            return;
        };

        warn!(
            "Session {} expired after {}s of inactivity, rolling back",
            id,
            self.ttl.as_secs()
        );
        if let Err(e) = entry.executor.disconnect(true).await {
            warn!("Failed to release connection for expired session {}: {}", id, e);
        }
    }
}

/// None once the runtime is gone, as when a statement is cancelled during shutdown
fn spawn_expiry(inner: &Arc<Inner>, id: &str, generation: u64) -> Option<JoinHandle<()>> {
    let runtime = Handle::try_current().ok()?;
    let weak: Weak<Inner> = Arc::downgrade(inner);
    let ttl = inner.ttl;
    let id = id.to_string();

    Some(runtime.spawn(async move {
        tokio::time::sleep(ttl).await;
        if let Some(inner) = weak.upgrade() {
            inner.expire(&id, generation).await;
        }
    }))
}

/// Session connection that tracks running statements and restarts the
/// session timer whenever one finishes
struct ActiveExecutor {
    id: String,
    registry: Weak<Inner>,
    executor: Arc<dyn QueryExecutor>,
    in_flight: AtomicUsize,
}

impl ActiveExecutor {
    fn is_idle(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) == 0
    }
}

/// Marks one running statement; leaving restarts the session timer, even on cancellation
struct InFlight<'a>(&'a ActiveExecutor);

impl<'a> InFlight<'a> {
    fn enter(executor: &'a ActiveExecutor) -> Self {
        executor.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlight(executor)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Some(registry) = self.0.registry.upgrade() {
            registry.touch(&self.0.id);
        }
    }
}

#[async_trait]
impl QueryExecutor for ActiveExecutor {
    async fn execute(&self, sql: &str, params: &[Value], timeout: Option<Duration>) -> Result<QueryResult> {
        let _running = InFlight::enter(self);
        self.executor.execute(sql, params, timeout).await
    }

    async fn disconnect(&self, destroy: bool) -> Result<()> {
        self.executor.disconnect(destroy).await
    }

    async fn create_session(&self) -> Result<Arc<dyn QueryExecutor>> {
        self.executor.create_session().await
    }
}
