use crate::query::{FieldInfo, QueryResult, QueryType, bind_params};
use crate::session::pool::ConnectionPool;
use crate::types::ValueConverter;
use crate::{ColdQueryError, Result};
use async_trait::async_trait;
use deadpool_postgres::Object;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, SimpleQueryMessage};
use tracing::{debug, warn};

/// Runs SQL statements and normalizes their results.
///
/// Two implementations exist: [`PoolExecutor`] borrows a pooled connection per
/// call (autocommit), [`SessionExecutor`] owns one connection for the lifetime
/// of a transaction session.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute one statement with positional parameters and an optional statement timeout
    async fn execute(&self, sql: &str, params: &[Value], timeout: Option<Duration>) -> Result<QueryResult>;

    /// Release held resources; `destroy` closes the physical connection instead of recycling it
    async fn disconnect(&self, destroy: bool) -> Result<()>;

    /// Check out a dedicated connection and wrap it in a session executor
    async fn create_session(&self) -> Result<Arc<dyn QueryExecutor>>;
}

/// Stateless executor over the shared pool
pub struct PoolExecutor {
    pool: ConnectionPool,
}

impl PoolExecutor {
    pub fn new(pool: ConnectionPool) -> Self {
        PoolExecutor { pool }
    }
}

#[async_trait]
impl QueryExecutor for PoolExecutor {
    async fn execute(&self, sql: &str, params: &[Value], timeout: Option<Duration>) -> Result<QueryResult> {
        let client = self.pool.acquire().await?;
        run_statement(&client, sql, params, timeout).await
    }

    async fn disconnect(&self, _destroy: bool) -> Result<()> {
        self.pool.close();
        Ok(())
    }

    async fn create_session(&self) -> Result<Arc<dyn QueryExecutor>> {
        let client = self.pool.acquire().await?;
        Ok(Arc::new(SessionExecutor::new(client)))
    }
}

/// Executor pinned to one connection checked out for a session
pub struct SessionExecutor {
    client: Mutex<Option<Object>>,
}

impl SessionExecutor {
    pub fn new(client: Object) -> Self {
        SessionExecutor {
            client: Mutex::new(Some(client)),
        }
    }
}

#[async_trait]
impl QueryExecutor for SessionExecutor {
    async fn execute(&self, sql: &str, params: &[Value], timeout: Option<Duration>) -> Result<QueryResult> {
        // The lock serializes statements issued concurrently on one session
        let guard = self.client.lock().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| ColdQueryError::Connectivity("session connection already released".to_string()))?;
        run_statement(client, sql, params, timeout).await
    }

    async fn disconnect(&self, destroy: bool) -> Result<()> {
        let Some(client) = self.client.lock().await.take() else {
            debug!("Session connection already released");
            return Ok(());
        };

        if destroy {
            // Detach from the pool so the socket closes instead of being recycled
            drop(Object::take(client));
        } else {
            drop(client);
        }
        Ok(())
    }

    async fn create_session(&self) -> Result<Arc<dyn QueryExecutor>> {
        Err(ColdQueryError::NotSupported(
            "nested sessions are not supported".to_string(),
        ))
    }
}

/// Apply the optional timeout, run the statement, then clear the timeout
pub(crate) async fn run_statement(
    client: &Client,
    sql: &str,
    params: &[Value],
    timeout: Option<Duration>,
) -> Result<QueryResult> {
    if let Some(limit) = timeout {
        client
            .batch_execute(&format!("SET statement_timeout = {}", limit.as_millis()))
            .await?;
    }

    let outcome = execute_statement(client, sql, params).await;

    if timeout.is_some() {
        if let Err(e) = client.batch_execute("RESET statement_timeout").await {
            warn!("Failed to reset statement_timeout: {}", e);
        }
    }

    outcome
}

async fn execute_statement(client: &Client, sql: &str, params: &[Value]) -> Result<QueryResult> {
    let statement = match client.prepare(sql).await {
        Ok(statement) => statement,
        // Scripts of several statements cannot be prepared; without parameters they run as one simple query
        Err(e) if params.is_empty() && e.code() == Some(&SqlState::SYNTAX_ERROR) => {
            debug!("Statement did not prepare, running as a script: {}", e);
            return run_script(client, sql, None).await;
        }
        Err(e) => return Err(e.into()),
    };
    if statement.params().len() != params.len() {
        return Err(ColdQueryError::InvalidParameter(format!(
            "statement expects {} parameters but {} were supplied",
            statement.params().len(),
            params.len()
        )));
    }

    let bound = bind_params(params);
    let refs: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

    let query_type = QueryType::detect(sql);
    let columns = statement.columns();
    // INSERT ... RETURNING and friends describe result columns
    if !query_type.returns_rows() && columns.is_empty() {
        debug!("Executing {:?} on status path", query_type);
        let count = client.execute(&statement, &refs).await?;
        return Ok(QueryResult::from_status(count));
    }

    debug!("Executing {:?} on row path", query_type);
    let fields: Vec<FieldInfo> = columns
        .iter()
        .map(|c| FieldInfo {
            name: c.name().to_string(),
            type_name: c.type_().name().to_string(),
        })
        .collect();
    let names: Vec<&str> = columns.iter().map(|c| c.name()).collect();
    let as_text: Vec<bool> = columns
        .iter()
        .map(|c| !ValueConverter::is_supported(c.type_()))
        .collect();

    if as_text.iter().any(|&text| text) {
        if query_type.nests_as_subquery() {
            match client.prepare(&text_projection(sql, &as_text)).await {
                Ok(projected) => {
                    let rows = client.query(&projected, &refs).await?;
                    let rows = rows
                        .iter()
                        .map(|row| ValueConverter::row_to_json_as(row, &names))
                        .collect::<Result<Vec<_>>>()?;
                    return Ok(QueryResult::from_rows(rows, fields));
                }
                Err(e) => debug!("Text projection did not prepare: {}", e),
            }
        }

        if params.is_empty() {
            let types: Vec<Type> = columns.iter().map(|c| c.type_().clone()).collect();
            let mut result = run_script(client, sql, Some(&types)).await?;
            if !result.fields.is_empty() {
                result.fields = fields;
            }
            return Ok(result);
        }
        debug!("Falling back to hex for columns without a binary decoder");
    }

    let rows = client.query(&statement, &refs).await?;
    let rows = rows
        .iter()
        .map(ValueConverter::row_to_json)
        .collect::<Result<Vec<_>>>()?;
    Ok(QueryResult::from_rows(rows, fields))
}

/// Run `sql` over the simple query protocol, where every value arrives in text form.
///
/// The outcome of the last statement is returned. `types` types the columns of
/// a single described statement; without it values stay strings.
async fn run_script(client: &Client, sql: &str, types: Option<&[Type]>) -> Result<QueryResult> {
    let mut last = QueryResult::from_status(0);
    let mut names: Vec<String> = Vec::new();
    let mut rows = Vec::new();
    let mut described = false;

    for message in client.simple_query(sql).await? {
        match message {
            SimpleQueryMessage::RowDescription(columns) => {
                names = columns.iter().map(|c| c.name().to_string()).collect();
                rows.clear();
                described = true;
            }
            SimpleQueryMessage::Row(row) => {
                let mut map = Map::with_capacity(names.len());
                for (idx, name) in names.iter().enumerate() {
                    let text = row.try_get(idx).ok().flatten();
                    let ty = types.and_then(|types| types.get(idx));
                    map.insert(name.clone(), ValueConverter::text_value(text, ty));
                }
                rows.push(map);
            }
            SimpleQueryMessage::CommandComplete(count) => {
                last = if described {
                    let fields = names
                        .iter()
                        .map(|name| FieldInfo {
                            name: name.clone(),
                            type_name: "text".to_string(),
                        })
                        .collect();
                    QueryResult::from_rows(std::mem::take(&mut rows), fields)
                } else {
                    QueryResult::from_status(count)
                };
                described = false;
            }
            _ => {}
        }
    }

    Ok(last)
}

/// `sql` nested in a SELECT that casts the flagged columns to text.
///
/// Columns are renamed positionally so duplicate or unnamed output columns
/// still resolve.
fn text_projection(sql: &str, as_text: &[bool]) -> String {
    let inner = sql.trim().trim_end_matches(';');
    let aliases: Vec<String> = (1..=as_text.len()).map(|i| format!("c{}", i)).collect();
    let select_list: Vec<String> = aliases
        .iter()
        .zip(as_text)
        .map(|(alias, &text)| {
            if text {
                format!("cq_source.{}::text", alias)
            } else {
                format!("cq_source.{}", alias)
            }
        })
        .collect();

    format!(
        "SELECT {} FROM (\n{}\n) AS cq_source({})",
        select_list.join(", "),
        inner,
        aliases.join(", ")
    )
}
