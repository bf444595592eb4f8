use crate::actions::{enrich, session_ref};
use crate::session::ActionContext;
use crate::Result;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

const ACTIVITY: &str = "
    SELECT pid, usename, client_addr::text AS client_addr, state, query_start, query
    FROM pg_stat_activity
    WHERE state IS DISTINCT FROM 'idle' OR $1::bool
    ORDER BY query_start DESC NULLS LAST";

const CONNECTIONS: &str = "
    SELECT datname, numbackends
    FROM pg_stat_database
    WHERE datname IS NOT NULL
    ORDER BY datname";

const LOCKS: &str = "
    SELECT locktype, relation::regclass::text AS relation, page, tuple,
           virtualtransaction, pid, mode, granted
    FROM pg_locks";

const DATABASE_SIZE: &str = "SELECT pg_size_pretty(pg_database_size($1::name)) AS size";

const ALL_DATABASE_SIZES: &str = "
    SELECT datname, pg_size_pretty(pg_database_size(datname)) AS size
    FROM pg_database
    WHERE datallowconn
    ORDER BY pg_database_size(datname) DESC";

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MonitorAction {
    Health,
    Activity(ActivityArgs),
    Connections(MonitorArgs),
    Locks(MonitorArgs),
    Size(SizeArgs),
}

#[derive(Debug, Deserialize)]
pub struct MonitorArgs {
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityArgs {
    #[serde(default)]
    pub include_idle: bool,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SizeArgs {
    pub database: Option<String>,
    pub session_id: Option<String>,
}

pub async fn execute(ctx: &ActionContext, action: MonitorAction) -> Result<Value> {
    match action {
        MonitorAction::Health => Ok(health(ctx).await),
        MonitorAction::Activity(args) => {
            run(ctx, session_ref(&args.session_id), ACTIVITY, &[json!(args.include_idle)]).await
        }
        MonitorAction::Connections(args) => run(ctx, session_ref(&args.session_id), CONNECTIONS, &[]).await,
        MonitorAction::Locks(args) => run(ctx, session_ref(&args.session_id), LOCKS, &[]).await,
        MonitorAction::Size(args) => match &args.database {
            Some(database) => run(ctx, session_ref(&args.session_id), DATABASE_SIZE, &[json!(database)]).await,
            None => run(ctx, session_ref(&args.session_id), ALL_DATABASE_SIZES, &[]).await,
        },
    }
}

/// Always runs on the pool path and never fails; errors are reported in the body
async fn health(ctx: &ActionContext) -> Value {
    let sessions = json!({
        "active": ctx.sessions.len(),
        "max": ctx.sessions.max_sessions(),
    });

    match ctx.executor.execute("SELECT 1 AS health_check", &[], None).await {
        Ok(result) if result.row_count == 1 && result.first_value("health_check") == Some(&json!(1)) => {
            json!({"status": "ok", "sessions": sessions})
        }
        Ok(_) => json!({
            "status": "error",
            "reason": "Health check query failed",
            "sessions": sessions,
        }),
        Err(e) => {
            warn!("Health check failed: {}", e);
            json!({"status": "error", "reason": e.to_string(), "sessions": sessions})
        }
    }
}

async fn run(ctx: &ActionContext, session_id: Option<&str>, sql: &str, params: &[Value]) -> Result<Value> {
    let executor = ctx.resolve_executor(session_id)?;
    let result = executor.execute(sql, params, None).await?;
    Ok(enrich::with_session(ctx, session_id, result.to_json()))
}
