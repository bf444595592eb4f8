use async_trait::async_trait;
use coldquery::query::{FieldInfo, QueryResult, QueryType};
use coldquery::session::{ActionContext, QueryExecutor, SessionManager};
use coldquery::{ColdQueryError, EngineError, Result};
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Connection bookkeeping shared by a fake pool and every session it hands out
#[derive(Default)]
pub struct Counters {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub double_release: AtomicUsize,
}

impl Counters {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn double_release(&self) -> usize {
        self.double_release.load(Ordering::SeqCst)
    }
}

/// In-memory stand-in for the pool-backed executor
pub struct FakeExecutor {
    pub counters: Arc<Counters>,
    pub pool_statements: Arc<Mutex<Vec<String>>>,
    pub session_statements: Arc<Mutex<Vec<String>>>,
    fail_on: Vec<String>,
    acquire_delay: Option<Duration>,
    slow_on: Option<(String, Duration)>,
}

impl FakeExecutor {
    pub fn new() -> Arc<Self> {
        Self::build(Vec::new(), None, None)
    }

    /// Statements containing any of `patterns` fail with a syntax error
    #[allow(dead_code)]
    pub fn failing_on(patterns: &[&str]) -> Arc<Self> {
        Self::build(patterns.iter().map(|p| p.to_string()).collect(), None, None)
    }

    /// Every `create_session` suspends for `delay` before handing out a connection
    #[allow(dead_code)]
    pub fn with_acquire_delay(delay: Duration) -> Arc<Self> {
        Self::build(Vec::new(), Some(delay), None)
    }

    /// Statements containing `pattern` take `delay` to run, on the pool and in sessions
    #[allow(dead_code)]
    pub fn sleeping_on(pattern: &str, delay: Duration) -> Arc<Self> {
        Self::build(Vec::new(), None, Some((pattern.to_string(), delay)))
    }

    fn build(
        fail_on: Vec<String>,
        acquire_delay: Option<Duration>,
        slow_on: Option<(String, Duration)>,
    ) -> Arc<Self> {
        Arc::new(FakeExecutor {
            counters: Arc::new(Counters::default()),
            pool_statements: Arc::new(Mutex::new(Vec::new())),
            session_statements: Arc::new(Mutex::new(Vec::new())),
            fail_on,
            acquire_delay,
            slow_on,
        })
    }

    #[allow(dead_code)]
    pub fn pool_statements(&self) -> Vec<String> {
        self.pool_statements.lock().clone()
    }

    #[allow(dead_code)]
    pub fn session_statements(&self) -> Vec<String> {
        self.session_statements.lock().clone()
    }
}

async fn pause(slow_on: &Option<(String, Duration)>, sql: &str) {
    if let Some((pattern, delay)) = slow_on {
        if sql.contains(pattern.as_str()) {
            tokio::time::sleep(*delay).await;
        }
    }
}

fn respond(fail_on: &[String], sql: &str) -> Result<QueryResult> {
    if fail_on.iter().any(|pattern| sql.contains(pattern.as_str())) {
        return Err(ColdQueryError::Engine(EngineError {
            code: Some("42601".to_string()),
            message: format!("syntax error in \"{}\"", sql),
            detail: None,
            hint: None,
            position: Some(1),
        }));
    }

    if QueryType::detect(sql).returns_rows() {
        let column = if sql.contains("health_check") { "health_check" } else { "value" };
        let mut row = Map::new();
        row.insert(column.to_string(), json!(1));
        return Ok(QueryResult::from_rows(
            vec![row],
            vec![FieldInfo {
                name: column.to_string(),
                type_name: "int4".to_string(),
            }],
        ));
    }

    Ok(QueryResult::from_status(1))
}

#[async_trait]
impl QueryExecutor for FakeExecutor {
    async fn execute(&self, sql: &str, _params: &[Value], _timeout: Option<Duration>) -> Result<QueryResult> {
        self.pool_statements.lock().push(sql.to_string());
        pause(&self.slow_on, sql).await;
        respond(&self.fail_on, sql)
    }

    async fn disconnect(&self, _destroy: bool) -> Result<()> {
        Ok(())
    }

    async fn create_session(&self) -> Result<Arc<dyn QueryExecutor>> {
        if let Some(delay) = self.acquire_delay {
            tokio::time::sleep(delay).await;
        }
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);

        Ok(Arc::new(FakeSessionExecutor {
            counters: self.counters.clone(),
            statements: self.session_statements.clone(),
            fail_on: self.fail_on.clone(),
            slow_on: self.slow_on.clone(),
            released: AtomicBool::new(false),
        }))
    }
}

/// Fake dedicated connection; counts releases and flags a second release
pub struct FakeSessionExecutor {
    counters: Arc<Counters>,
    statements: Arc<Mutex<Vec<String>>>,
    fail_on: Vec<String>,
    slow_on: Option<(String, Duration)>,
    released: AtomicBool,
}

#[async_trait]
impl QueryExecutor for FakeSessionExecutor {
    async fn execute(&self, sql: &str, _params: &[Value], _timeout: Option<Duration>) -> Result<QueryResult> {
        if self.released.load(Ordering::SeqCst) {
            return Err(ColdQueryError::Connectivity("session connection already released".to_string()));
        }
        self.statements.lock().push(sql.to_string());
        pause(&self.slow_on, sql).await;
        respond(&self.fail_on, sql)
    }

    async fn disconnect(&self, destroy: bool) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            self.counters.double_release.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        if destroy {
            self.counters.destroyed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn create_session(&self) -> Result<Arc<dyn QueryExecutor>> {
        Err(ColdQueryError::NotSupported("nested sessions are not supported".to_string()))
    }
}

#[allow(dead_code)]
pub fn session_manager(fake: &Arc<FakeExecutor>, max_sessions: usize, ttl: Duration) -> SessionManager {
    SessionManager::new(fake.clone(), max_sessions, ttl)
}

#[allow(dead_code)]
pub fn action_context(fake: &Arc<FakeExecutor>, max_sessions: usize, ttl: Duration, expiry_warning: Duration) -> ActionContext {
    ActionContext::with_sessions(fake.clone(), session_manager(fake, max_sessions, ttl), expiry_warning)
}
