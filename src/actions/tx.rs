use crate::actions::enrich;
use crate::session::ActionContext;
use crate::session::transaction::{self, IsolationLevel};
use crate::Result;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TxAction {
    Begin(BeginArgs),
    Commit(SessionArgs),
    Rollback(SessionArgs),
    Savepoint(SavepointArgs),
    Release(SavepointArgs),
    RollbackTo(SavepointArgs),
    List,
}

#[derive(Debug, Default, Deserialize)]
pub struct BeginArgs {
    pub isolation_level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionArgs {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SavepointArgs {
    pub session_id: String,
    #[serde(alias = "name")]
    pub savepoint_name: String,
}

pub async fn execute(ctx: &ActionContext, action: TxAction) -> Result<Value> {
    let sessions = &ctx.sessions;
    match action {
        TxAction::Begin(args) => {
            let session_id = transaction::begin(sessions, args.isolation_level.as_deref()).await?;
            let isolation = match args.isolation_level.as_deref() {
                Some(level) => level.parse::<IsolationLevel>()?,
                None => IsolationLevel::ReadCommitted,
            };
            let response = json!({
                "session_id": session_id,
                "isolation_level": isolation.as_sql(),
                "status": "transaction started",
            });
            Ok(enrich::with_session(ctx, Some(&session_id), response))
        }
        TxAction::Commit(args) => {
            transaction::commit(sessions, &args.session_id).await?;
            Ok(json!({"status": "transaction committed"}))
        }
        TxAction::Rollback(args) => {
            transaction::rollback(sessions, &args.session_id).await?;
            Ok(json!({"status": "transaction rolled back"}))
        }
        TxAction::Savepoint(args) => {
            transaction::savepoint(sessions, &args.session_id, &args.savepoint_name).await?;
            Ok(savepoint_response(ctx, &args, "savepoint created"))
        }
        TxAction::Release(args) => {
            transaction::release(sessions, &args.session_id, &args.savepoint_name).await?;
            Ok(savepoint_response(ctx, &args, "savepoint released"))
        }
        TxAction::RollbackTo(args) => {
            transaction::rollback_to(sessions, &args.session_id, &args.savepoint_name).await?;
            Ok(savepoint_response(ctx, &args, "rolled back to savepoint"))
        }
        TxAction::List => {
            let list = sessions.list();
            Ok(json!({
                "count": list.len(),
                "max_sessions": sessions.max_sessions(),
                "sessions": list,
            }))
        }
    }
}

fn savepoint_response(ctx: &ActionContext, args: &SavepointArgs, status: &str) -> Value {
    let response = json!({
        "status": status,
        "savepoint_name": args.savepoint_name,
    });
    enrich::with_session(ctx, Some(&args.session_id), response)
}
