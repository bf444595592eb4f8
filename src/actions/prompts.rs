use crate::{ColdQueryError, Result};
use serde::Deserialize;
use serde_json::{Map, Value, json};

/// Canned investigation workflows that tell an agent which tools to call
#[derive(Debug)]
pub enum PromptRequest {
    List,
    Get(GetArgs),
}

#[derive(Debug, Deserialize)]
pub struct GetArgs {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

const ANALYZE_QUERY_PERFORMANCE: &str = "analyze_query_performance";
const DEBUG_LOCK_CONTENTION: &str = "debug_lock_contention";

pub fn execute(request: PromptRequest) -> Result<Value> {
    match request {
        PromptRequest::List => Ok(catalog()),
        PromptRequest::Get(args) => {
            let text = render(&args.name, &args.arguments)?;
            Ok(json!({
                "name": args.name,
                "messages": [{"role": "user", "content": text}],
            }))
        }
    }
}

fn render(name: &str, arguments: &Map<String, Value>) -> Result<String> {
    match name {
        ANALYZE_QUERY_PERFORMANCE => {
            let sql = arguments
                .get("sql")
                .and_then(Value::as_str)
                .filter(|sql| !sql.trim().is_empty())
                .ok_or_else(|| {
                    ColdQueryError::InvalidRequest(format!("prompt '{}' requires a 'sql' argument", name))
                })?;

            Ok(format!(
                "Analyze the performance of this SQL query:\n\n\
                 ```sql\n{}\n```\n\n\
                 Steps:\n\n\
                 1. Use `pg_query` with `action=\"explain\"` and `analyze=true` to get the query plan.\n\
                 2. Use `pg_admin` with `action=\"stats\"` to check table statistics for the tables involved in the query.\n\
                 3. Use `pg_schema` with `action=\"describe\"` to review the indexes on the tables.\n\
                 4. Provide optimization recommendations based on the information gathered.\n",
                sql
            ))
        }
        DEBUG_LOCK_CONTENTION => Ok("Investigate database lock contention:\n\n\
             1. Use `pg_monitor` with `action=\"locks\"` to see current locks.\n\
             2. Use `pg_monitor` with `action=\"activity\"` to see blocking queries.\n\
             3. Use `pg_tx` with `action=\"list\"` to see active transactions.\n\
             4. Provide recommendations for resolving contention based on the findings.\n"
            .to_string()),
        other => Err(ColdQueryError::InvalidRequest(format!("unknown prompt '{}'", other))),
    }
}

fn catalog() -> Value {
    json!({
        "prompts": [
            {
                "name": ANALYZE_QUERY_PERFORMANCE,
                "description": "Walk through the plan, statistics and indexes behind a slow query",
                "arguments": [{"name": "sql", "description": "Query to analyze", "required": true}],
            },
            {
                "name": DEBUG_LOCK_CONTENTION,
                "description": "Find blocking locks and the transactions holding them",
                "arguments": [],
            },
        ],
    })
}
