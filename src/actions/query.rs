use crate::actions::{enrich, nullable_params, session_ref, timeout_from_millis};
use crate::query::QueryType;
use crate::security::require_write_access;
use crate::session::transaction::{self, BatchOperation};
use crate::session::ActionContext;
use crate::Result;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum QueryAction {
    Read(StatementArgs),
    Write(WriteArgs),
    Explain(ExplainArgs),
    Transaction(TransactionArgs),
}

impl QueryAction {
    pub fn is_dangerous(&self) -> bool {
        matches!(self, QueryAction::Write(_) | QueryAction::Transaction(_))
    }
}

#[derive(Debug, Deserialize)]
pub struct StatementArgs {
    pub sql: String,
    #[serde(default, deserialize_with = "nullable_params")]
    pub params: Vec<Value>,
    pub session_id: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct WriteArgs {
    #[serde(flatten)]
    pub statement: StatementArgs,
    #[serde(default)]
    pub autocommit: bool,
}

#[derive(Debug, Deserialize)]
pub struct ExplainArgs {
    #[serde(flatten)]
    pub statement: StatementArgs,
    #[serde(default)]
    pub analyze: bool,
}

#[derive(Debug, Deserialize)]
pub struct TransactionArgs {
    pub operations: Vec<BatchOperation>,
    pub timeout_ms: Option<u64>,
}

pub async fn execute(ctx: &ActionContext, action: QueryAction) -> Result<Value> {
    match action {
        QueryAction::Read(args) => run(ctx, &args, &args.sql).await,
        QueryAction::Write(args) => {
            require_write_access(session_ref(&args.statement.session_id), args.autocommit)?;
            run(ctx, &args.statement, &args.statement.sql).await
        }
        QueryAction::Explain(args) => {
            // EXPLAIN ANALYZE executes the statement, so writes need the usual guard
            if args.analyze && !QueryType::detect(&args.statement.sql).returns_rows() {
                require_write_access(session_ref(&args.statement.session_id), false)?;
            }
            let options = if args.analyze { "ANALYZE, FORMAT JSON" } else { "FORMAT JSON" };
            let sql = format!("EXPLAIN ({}) {}", options, args.statement.sql);
            run(ctx, &args.statement, &sql).await
        }
        QueryAction::Transaction(args) => {
            let results = transaction::run_batch(
                &ctx.sessions,
                &args.operations,
                timeout_from_millis(args.timeout_ms),
            )
            .await?;
            Ok(json!({
                "status": "committed",
                "results": results.iter().map(|r| r.to_json()).collect::<Vec<_>>(),
            }))
        }
    }
}

async fn run(ctx: &ActionContext, args: &StatementArgs, sql: &str) -> Result<Value> {
    let session_id = session_ref(&args.session_id);
    let executor = ctx.resolve_executor(session_id)?;
    debug!("Running statement ({})", session_id.unwrap_or("autocommit"));

    let result = executor
        .execute(sql, &args.params, timeout_from_millis(args.timeout_ms))
        .await?;
    Ok(enrich::with_session(ctx, session_id, result.to_json()))
}
