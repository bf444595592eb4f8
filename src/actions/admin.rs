use crate::actions::{enrich, session_ref};
use crate::security::{require_write_access, sanitize_table_name};
use crate::session::ActionContext;
use crate::{ColdQueryError, Result};
use serde::Deserialize;
use serde_json::{Value, json};

const TABLE_STATS: &str = "
    SELECT n_live_tup, n_dead_tup, seq_scan, idx_scan,
           last_vacuum, last_autovacuum, last_analyze, last_autoanalyze
    FROM pg_stat_user_tables
    WHERE relname = $1 AND schemaname = $2";

const ALL_SETTINGS: &str = "
    SELECT name, setting, unit, category, short_desc
    FROM pg_settings
    WHERE $1::text IS NULL OR category ILIKE '%' || $1 || '%'
    ORDER BY category, name";

const SHOW_SETTING: &str = "SELECT $1::text AS name, current_setting($1) AS setting";

const SET_SETTING: &str = "SELECT set_config($1, $2, false) AS setting";

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdminAction {
    Vacuum(VacuumArgs),
    Analyze(MaintenanceArgs),
    Reindex(MaintenanceArgs),
    Stats(StatsArgs),
    Settings(SettingsArgs),
}

impl AdminAction {
    pub fn is_dangerous(&self) -> bool {
        match self {
            AdminAction::Vacuum(_) | AdminAction::Analyze(_) | AdminAction::Reindex(_) => true,
            AdminAction::Settings(args) => args.setting_value.is_some(),
            AdminAction::Stats(_) => false,
        }
    }
}

fn autocommit_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct MaintenanceArgs {
    pub table: Option<String>,
    pub schema: Option<String>,
    #[serde(default)]
    pub verbose: bool,
    pub session_id: Option<String>,
    #[serde(default = "autocommit_default")]
    pub autocommit: bool,
}

#[derive(Debug, Deserialize)]
pub struct VacuumArgs {
    #[serde(flatten)]
    pub target: MaintenanceArgs,
    #[serde(default)]
    pub full: bool,
}

#[derive(Debug, Deserialize)]
pub struct StatsArgs {
    pub table: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    pub session_id: Option<String>,
}

fn default_schema() -> String {
    "public".to_string()
}

#[derive(Debug, Deserialize)]
pub struct SettingsArgs {
    pub setting_name: Option<String>,
    pub setting_value: Option<String>,
    pub category: Option<String>,
    pub session_id: Option<String>,
    #[serde(default = "autocommit_default")]
    pub autocommit: bool,
}

pub async fn execute(ctx: &ActionContext, action: AdminAction) -> Result<Value> {
    match action {
        AdminAction::Vacuum(args) => {
            let mut options = Vec::new();
            if args.full {
                options.push("FULL");
            }
            if args.target.verbose {
                options.push("VERBOSE");
            }
            maintenance(ctx, "VACUUM", &options, &args.target).await
        }
        AdminAction::Analyze(args) => {
            let options = if args.verbose { vec!["VERBOSE"] } else { Vec::new() };
            maintenance(ctx, "ANALYZE", &options, &args).await
        }
        AdminAction::Reindex(args) => {
            let Some(table) = args.table.as_deref() else {
                return Err(ColdQueryError::InvalidParameter(
                    "'table' is required for reindex".to_string(),
                ));
            };
            let session_id = session_ref(&args.session_id);
            require_write_access(session_id, args.autocommit)?;
            let sql = format!("REINDEX TABLE {}", sanitize_table_name(table, args.schema.as_deref())?);
            run(ctx, session_id, &sql, &[]).await
        }
        AdminAction::Stats(args) => {
            let params = [json!(args.table), json!(args.schema)];
            run(ctx, session_ref(&args.session_id), TABLE_STATS, &params).await
        }
        AdminAction::Settings(args) => settings(ctx, &args).await,
    }
}

async fn maintenance(ctx: &ActionContext, command: &str, options: &[&str], args: &MaintenanceArgs) -> Result<Value> {
    let session_id = session_ref(&args.session_id);
    require_write_access(session_id, args.autocommit)?;

    let mut sql = command.to_string();
    if !options.is_empty() {
        sql.push_str(&format!(" ({})", options.join(", ")));
    }
    if let Some(table) = args.table.as_deref() {
        sql.push(' ');
        sql.push_str(&sanitize_table_name(table, args.schema.as_deref())?);
    }

    run(ctx, session_id, &sql, &[]).await
}

async fn settings(ctx: &ActionContext, args: &SettingsArgs) -> Result<Value> {
    let session_id = session_ref(&args.session_id);
    match (&args.setting_name, &args.setting_value) {
        (Some(name), Some(value)) => {
            require_write_access(session_id, args.autocommit)?;
            run(ctx, session_id, SET_SETTING, &[json!(name), json!(value)]).await
        }
        (Some(name), None) => run(ctx, session_id, SHOW_SETTING, &[json!(name)]).await,
        (None, _) => run(ctx, session_id, ALL_SETTINGS, &[json!(args.category)]).await,
    }
}

async fn run(ctx: &ActionContext, session_id: Option<&str>, sql: &str, params: &[Value]) -> Result<Value> {
    let executor = ctx.resolve_executor(session_id)?;
    let result = executor.execute(sql, params, None).await?;
    Ok(enrich::with_session(ctx, session_id, result.to_json()))
}
