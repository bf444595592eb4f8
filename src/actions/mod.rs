// Tool actions layered on top of the session core
pub mod admin;
pub mod enrich;
pub mod monitor;
pub mod prompts;
pub mod query;
pub mod resources;
pub mod schema;
pub mod tx;

use crate::session::ActionContext;
use crate::{ColdQueryError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::time::Duration;

pub use admin::AdminAction;
pub use monitor::MonitorAction;
pub use prompts::PromptRequest;
pub use query::QueryAction;
pub use resources::ResourceRequest;
pub use schema::SchemaAction;
pub use tx::TxAction;

/// A parsed tool invocation
#[derive(Debug)]
pub enum ToolCall {
    Query(QueryAction),
    Tx(TxAction),
    Schema(SchemaAction),
    Admin(AdminAction),
    Monitor(MonitorAction),
    Resources(ResourceRequest),
    Prompts(PromptRequest),
}

impl ToolCall {
    pub fn parse(tool: &str, arguments: Value) -> Result<Self> {
        let arguments = if arguments.is_null() { Value::Object(Default::default()) } else { arguments };
        match tool {
            "pg_query" => Ok(ToolCall::Query(from_arguments(tool, arguments)?)),
            "pg_tx" => Ok(ToolCall::Tx(from_arguments(tool, arguments)?)),
            "pg_schema" => Ok(ToolCall::Schema(from_arguments(tool, arguments)?)),
            "pg_admin" => Ok(ToolCall::Admin(from_arguments(tool, arguments)?)),
            "pg_monitor" => Ok(ToolCall::Monitor(from_arguments(tool, arguments)?)),
            "resources/list" => Ok(ToolCall::Resources(ResourceRequest::List)),
            "resources/read" => Ok(ToolCall::Resources(ResourceRequest::Read(from_arguments(tool, arguments)?))),
            "prompts/list" => Ok(ToolCall::Prompts(PromptRequest::List)),
            "prompts/get" => Ok(ToolCall::Prompts(PromptRequest::Get(from_arguments(tool, arguments)?))),
            other => Err(ColdQueryError::InvalidRequest(format!("unknown tool '{}'", other))),
        }
    }

    pub fn tool(&self) -> &'static str {
        match self {
            ToolCall::Query(_) => "pg_query",
            ToolCall::Tx(_) => "pg_tx",
            ToolCall::Schema(_) => "pg_schema",
            ToolCall::Admin(_) => "pg_admin",
            ToolCall::Monitor(_) => "pg_monitor",
            ToolCall::Resources(ResourceRequest::List) => "resources/list",
            ToolCall::Resources(ResourceRequest::Read(_)) => "resources/read",
            ToolCall::Prompts(PromptRequest::List) => "prompts/list",
            ToolCall::Prompts(PromptRequest::Get(_)) => "prompts/get",
        }
    }

    /// Actions that modify data, schema or server state and sit behind the auth gate
    pub fn is_dangerous(&self) -> bool {
        match self {
            ToolCall::Query(action) => action.is_dangerous(),
            ToolCall::Schema(action) => action.is_dangerous(),
            ToolCall::Admin(action) => action.is_dangerous(),
            ToolCall::Tx(_) | ToolCall::Monitor(_) | ToolCall::Resources(_) | ToolCall::Prompts(_) => false,
        }
    }
}

/// Run a parsed tool call
pub async fn execute(ctx: &ActionContext, call: ToolCall) -> Result<Value> {
    match call {
        ToolCall::Query(action) => query::execute(ctx, action).await,
        ToolCall::Tx(action) => tx::execute(ctx, action).await,
        ToolCall::Schema(action) => schema::execute(ctx, action).await,
        ToolCall::Admin(action) => admin::execute(ctx, action).await,
        ToolCall::Monitor(action) => monitor::execute(ctx, action).await,
        ToolCall::Resources(request) => resources::execute(ctx, request).await,
        ToolCall::Prompts(request) => prompts::execute(request),
    }
}

fn from_arguments<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T> {
    serde_json::from_value(arguments)
        .map_err(|e| ColdQueryError::InvalidRequest(format!("invalid arguments for '{}': {}", tool, e)))
}

/// Missing and `null` parameter lists both mean "no parameters"
pub(crate) fn nullable_params<'de, D>(deserializer: D) -> std::result::Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Blank session ids count as absent
pub(crate) fn session_ref(session_id: &Option<String>) -> Option<&str> {
    session_id.as_deref().filter(|id| !id.trim().is_empty())
}

pub(crate) fn timeout_from_millis(timeout_ms: Option<u64>) -> Option<Duration> {
    timeout_ms.map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_routes_by_tool_and_action() {
        let call = ToolCall::parse("pg_query", json!({"action": "read", "sql": "SELECT 1"})).unwrap();
        assert_eq!(call.tool(), "pg_query");
        assert!(!call.is_dangerous());

        let call = ToolCall::parse("pg_query", json!({"action": "write", "sql": "DELETE FROM t"})).unwrap();
        assert!(call.is_dangerous());

        let call = ToolCall::parse("pg_tx", json!({"action": "list"})).unwrap();
        assert!(matches!(call, ToolCall::Tx(TxAction::List)));
    }

    #[test]
    fn test_parse_resources_and_prompts() {
        let call = ToolCall::parse("resources/read", json!({"uri": "postgres://monitor/health"})).unwrap();
        assert_eq!(call.tool(), "resources/read");
        assert!(!call.is_dangerous());

        let call = ToolCall::parse("prompts/list", Value::Null).unwrap();
        assert!(matches!(call, ToolCall::Prompts(PromptRequest::List)));

        let err = ToolCall::parse("resources/read", json!({})).unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
    }

    #[test]
    fn test_parse_rejects_malformed_arguments() {
        let err = ToolCall::parse("pg_query", json!({"action": "read"})).unwrap_err();
        assert_eq!(err.kind(), "invalid_request");

        let err = ToolCall::parse("pg_query", json!({"action": "shred", "sql": "x"})).unwrap_err();
        assert_eq!(err.kind(), "invalid_request");

        let err = ToolCall::parse("pg_nothing", json!({})).unwrap_err();
        assert!(err.to_string().contains("pg_nothing"));
    }

    #[test]
    fn test_blank_session_id_is_absent() {
        assert_eq!(session_ref(&Some("  ".to_string())), None);
        assert_eq!(session_ref(&Some("abc".to_string())), Some("abc"));
        assert_eq!(session_ref(&None), None);
    }
}
