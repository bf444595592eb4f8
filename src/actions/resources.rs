use super::monitor::{self, ActivityArgs, MonitorAction};
use super::schema::{self, DescribeArgs, ListArgs, ListTarget, SchemaAction};
use crate::session::ActionContext;
use crate::{ColdQueryError, Result};
use serde::Deserialize;
use serde_json::{Value, json};

const HEALTH_URI: &str = "postgres://monitor/health";
const ACTIVITY_URI: &str = "postgres://monitor/activity";
const TABLES_URI: &str = "postgres://schema/tables";
const TABLE_URI_PREFIX: &str = "postgres://schema/";
const TABLE_URI_TEMPLATE: &str = "postgres://schema/{schema}/{table}";

/// Read-only views addressed by URI
#[derive(Debug)]
pub enum ResourceRequest {
    List,
    Read(ReadArgs),
}

#[derive(Debug, Deserialize)]
pub struct ReadArgs {
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Health,
    Activity,
    Tables,
    Table { schema: String, table: String },
}

impl Resource {
    pub fn parse(uri: &str) -> Result<Self> {
        match uri {
            HEALTH_URI => return Ok(Resource::Health),
            ACTIVITY_URI => return Ok(Resource::Activity),
            TABLES_URI => return Ok(Resource::Tables),
            _ => {}
        }

        let table = uri
            .strip_prefix(TABLE_URI_PREFIX)
            .and_then(|path| path.split_once('/'))
            .filter(|(schema, table)| !schema.is_empty() && !table.is_empty() && !table.contains('/'));
        match table {
            Some((schema, table)) => Ok(Resource::Table {
                schema: schema.to_string(),
                table: table.to_string(),
            }),
            None => Err(ColdQueryError::InvalidRequest(format!("unknown resource '{}'", uri))),
        }
    }
}

pub async fn execute(ctx: &ActionContext, request: ResourceRequest) -> Result<Value> {
    match request {
        ResourceRequest::List => Ok(catalog()),
        ResourceRequest::Read(args) => {
            let contents = read(ctx, Resource::parse(&args.uri)?).await?;
            Ok(json!({
                "uri": args.uri,
                "mime_type": "application/json",
                "contents": contents,
            }))
        }
    }
}

async fn read(ctx: &ActionContext, resource: Resource) -> Result<Value> {
    match resource {
        Resource::Health => monitor::execute(ctx, MonitorAction::Health).await,
        Resource::Activity => {
            let args = ActivityArgs {
                include_idle: false,
                session_id: None,
            };
            monitor::execute(ctx, MonitorAction::Activity(args)).await
        }
        Resource::Tables => {
            let args = ListArgs {
                target: ListTarget::Table,
                schema: None,
                limit: 100,
                offset: 0,
                include_sizes: false,
                session_id: None,
            };
            schema::execute(ctx, SchemaAction::List(args)).await
        }
        Resource::Table { schema, table } => {
            let args = DescribeArgs {
                name: table,
                schema,
                session_id: None,
            };
            schema::execute(ctx, SchemaAction::Describe(args)).await
        }
    }
}

fn catalog() -> Value {
    json!({
        "resources": [
            {"uri": HEALTH_URI, "name": "health", "description": "Database health and session usage"},
            {"uri": ACTIVITY_URI, "name": "activity", "description": "Active queries, idle connections excluded"},
            {"uri": TABLES_URI, "name": "tables", "description": "First 100 tables across user schemas"},
        ],
        "resource_templates": [
            {"uri_template": TABLE_URI_TEMPLATE, "name": "table", "description": "Columns, indexes and constraints of one table"},
        ],
    })
}
