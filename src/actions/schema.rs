use crate::actions::{enrich, session_ref};
use crate::security::require_write_access;
use crate::session::ActionContext;
use crate::Result;
use serde::Deserialize;
use serde_json::{Value, json};

const LIST_TABLES: &str = "
    SELECT schemaname AS schema, tablename AS name, tableowner AS owner
    FROM pg_tables
    WHERE schemaname NOT IN ('pg_catalog', 'information_schema')
      AND ($1::text IS NULL OR schemaname = $1)
    ORDER BY schemaname, tablename
    LIMIT $2 OFFSET $3";

const LIST_TABLES_WITH_SIZES: &str = "
    SELECT t.schemaname AS schema, t.tablename AS name, t.tableowner AS owner,
           pg_total_relation_size(c.oid) AS total_bytes,
           pg_size_pretty(pg_total_relation_size(c.oid)) AS total_size
    FROM pg_tables t
    JOIN pg_namespace n ON n.nspname = t.schemaname
    JOIN pg_class c ON c.relnamespace = n.oid AND c.relname = t.tablename
    WHERE t.schemaname NOT IN ('pg_catalog', 'information_schema')
      AND ($1::text IS NULL OR t.schemaname = $1)
    ORDER BY t.schemaname, t.tablename
    LIMIT $2 OFFSET $3";

const LIST_VIEWS: &str = "
    SELECT schemaname AS schema, viewname AS name, viewowner AS owner
    FROM pg_views
    WHERE schemaname NOT IN ('pg_catalog', 'information_schema')
      AND ($1::text IS NULL OR schemaname = $1)
    ORDER BY schemaname, viewname
    LIMIT $2 OFFSET $3";

const LIST_SCHEMAS: &str = "
    SELECT schema_name::text AS name, schema_owner::text AS owner
    FROM information_schema.schemata
    WHERE schema_name NOT IN ('pg_catalog', 'information_schema')
      AND ($1::text IS NULL OR schema_name = $1)
    ORDER BY schema_name
    LIMIT $2 OFFSET $3";

const LIST_FUNCTIONS: &str = "
    SELECT n.nspname AS schema, p.proname AS name,
           pg_get_function_identity_arguments(p.oid) AS arguments,
           pg_get_function_result(p.oid) AS result_type
    FROM pg_proc p
    JOIN pg_namespace n ON n.oid = p.pronamespace
    WHERE n.nspname NOT IN ('pg_catalog', 'information_schema')
      AND ($1::text IS NULL OR n.nspname = $1)
    ORDER BY n.nspname, p.proname
    LIMIT $2 OFFSET $3";

const LIST_SEQUENCES: &str = "
    SELECT schemaname AS schema, sequencename AS name, data_type::text AS data_type, last_value
    FROM pg_sequences
    WHERE schemaname NOT IN ('pg_catalog', 'information_schema')
      AND ($1::text IS NULL OR schemaname = $1)
    ORDER BY schemaname, sequencename
    LIMIT $2 OFFSET $3";

const DESCRIBE_COLUMNS: &str = "
    SELECT column_name::text AS column_name, data_type::text AS data_type,
           is_nullable::text AS is_nullable, column_default::text AS column_default
    FROM information_schema.columns
    WHERE table_schema = $1 AND table_name = $2
    ORDER BY ordinal_position";

const DESCRIBE_INDEXES: &str = "
    SELECT indexname AS name, indexdef AS definition
    FROM pg_indexes
    WHERE schemaname = $1 AND tablename = $2
    ORDER BY indexname";

const DESCRIBE_CONSTRAINTS: &str = "
    SELECT con.conname AS name, con.contype::text AS type, pg_get_constraintdef(con.oid) AS definition
    FROM pg_constraint con
    JOIN pg_class rel ON rel.oid = con.conrelid
    JOIN pg_namespace nsp ON nsp.oid = rel.relnamespace
    WHERE nsp.nspname = $1 AND rel.relname = $2
    ORDER BY con.conname";

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SchemaAction {
    List(ListArgs),
    Describe(DescribeArgs),
    Create(DdlArgs),
    Alter(DdlArgs),
    Drop(DdlArgs),
}

impl SchemaAction {
    pub fn is_dangerous(&self) -> bool {
        matches!(self, SchemaAction::Create(_) | SchemaAction::Alter(_) | SchemaAction::Drop(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListTarget {
    #[default]
    Table,
    View,
    Schema,
    Function,
    Sequence,
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Deserialize)]
pub struct ListArgs {
    #[serde(default)]
    pub target: ListTarget,
    pub schema: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub include_sizes: bool,
    pub session_id: Option<String>,
}

fn default_schema() -> String {
    "public".to_string()
}

#[derive(Debug, Deserialize)]
pub struct DescribeArgs {
    #[serde(alias = "table")]
    pub name: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DdlArgs {
    pub sql: String,
    pub session_id: Option<String>,
    #[serde(default)]
    pub autocommit: bool,
}

pub async fn execute(ctx: &ActionContext, action: SchemaAction) -> Result<Value> {
    match action {
        SchemaAction::List(args) => list(ctx, &args).await,
        SchemaAction::Describe(args) => describe(ctx, &args).await,
        SchemaAction::Create(args) | SchemaAction::Alter(args) | SchemaAction::Drop(args) => {
            let session_id = session_ref(&args.session_id);
            require_write_access(session_id, args.autocommit)?;
            let executor = ctx.resolve_executor(session_id)?;
            let result = executor.execute(&args.sql, &[], None).await?;
            Ok(enrich::with_session(ctx, session_id, result.to_json()))
        }
    }
}

async fn list(ctx: &ActionContext, args: &ListArgs) -> Result<Value> {
    let sql = match args.target {
        ListTarget::Table if args.include_sizes => LIST_TABLES_WITH_SIZES,
        ListTarget::Table => LIST_TABLES,
        ListTarget::View => LIST_VIEWS,
        ListTarget::Schema => LIST_SCHEMAS,
        ListTarget::Function => LIST_FUNCTIONS,
        ListTarget::Sequence => LIST_SEQUENCES,
    };
    let params = [json!(args.schema), json!(args.limit.max(0)), json!(args.offset.max(0))];

    let session_id = session_ref(&args.session_id);
    let executor = ctx.resolve_executor(session_id)?;
    let result = executor.execute(sql, &params, None).await?;
    Ok(enrich::with_session(ctx, session_id, result.to_json()))
}

async fn describe(ctx: &ActionContext, args: &DescribeArgs) -> Result<Value> {
    let session_id = session_ref(&args.session_id);
    let executor = ctx.resolve_executor(session_id)?;
    let params = [json!(args.schema), json!(args.name)];

    let columns = executor.execute(DESCRIBE_COLUMNS, &params, None).await?;
    let indexes = executor.execute(DESCRIBE_INDEXES, &params, None).await?;
    let constraints = executor.execute(DESCRIBE_CONSTRAINTS, &params, None).await?;

    let response = json!({
        "table": args.name,
        "schema": args.schema,
        "columns": columns.rows,
        "indexes": indexes.rows,
        "constraints": constraints.rows,
    });
    Ok(enrich::with_session(ctx, session_id, response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_defaults() {
        let action: SchemaAction = serde_json::from_value(json!({"action": "list"})).unwrap();
        let SchemaAction::List(args) = action else {
            panic!("expected list");
        };
        assert_eq!(args.target, ListTarget::Table);
        assert_eq!(args.limit, 100);
        assert_eq!(args.offset, 0);
        assert!(!args.include_sizes);
    }

    #[test]
    fn test_describe_accepts_table_alias() {
        let action: SchemaAction =
            serde_json::from_value(json!({"action": "describe", "table": "users"})).unwrap();
        let SchemaAction::Describe(args) = action else {
            panic!("expected describe");
        };
        assert_eq!(args.name, "users");
        assert_eq!(args.schema, "public");
    }

    #[test]
    fn test_ddl_is_dangerous() {
        let action: SchemaAction =
            serde_json::from_value(json!({"action": "drop", "sql": "DROP TABLE t"})).unwrap();
        assert!(action.is_dangerous());
    }
}
