/// Statement category derived from the leading keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Select,
    With,
    Show,
    Values,
    Table,
    Explain,
    Fetch,
    Insert,
    Update,
    Delete,
    Merge,
    Create,
    Drop,
    Alter,
    Truncate,
    Begin,
    Commit,
    Rollback,
    Savepoint,
    Release,
    Set,
    Maintenance,
    Unknown,
}

impl QueryType {
    /// Classify a statement by its trimmed, case-insensitive leading keyword
    pub fn detect(sql: &str) -> QueryType {
        let keyword = leading_keyword(sql);

        match keyword.to_ascii_uppercase().as_str() {
            "SELECT" => QueryType::Select,
            "WITH" => QueryType::With,
            "SHOW" => QueryType::Show,
            "VALUES" => QueryType::Values,
            "TABLE" => QueryType::Table,
            "EXPLAIN" => QueryType::Explain,
            "FETCH" => QueryType::Fetch,
            "INSERT" => QueryType::Insert,
            "UPDATE" => QueryType::Update,
            "DELETE" => QueryType::Delete,
            "MERGE" => QueryType::Merge,
            "CREATE" => QueryType::Create,
            "DROP" => QueryType::Drop,
            "ALTER" => QueryType::Alter,
            "TRUNCATE" => QueryType::Truncate,
            "BEGIN" | "START" => QueryType::Begin,
            "COMMIT" | "END" => QueryType::Commit,
            "ROLLBACK" | "ABORT" => QueryType::Rollback,
            "SAVEPOINT" => QueryType::Savepoint,
            "RELEASE" => QueryType::Release,
            "SET" | "RESET" => QueryType::Set,
            "VACUUM" | "ANALYZE" | "REINDEX" | "CLUSTER" => QueryType::Maintenance,
            _ => QueryType::Unknown,
        }
    }

    /// Whether the statement produces a result set rather than a command status
    pub fn returns_rows(self) -> bool {
        matches!(
            self,
            QueryType::Select
                | QueryType::With
                | QueryType::Show
                | QueryType::Values
                | QueryType::Table
                | QueryType::Explain
                | QueryType::Fetch
        )
    }

    /// Whether the statement is a plain query that may appear as a subquery in FROM
    pub fn nests_as_subquery(self) -> bool {
        matches!(
            self,
            QueryType::Select | QueryType::With | QueryType::Values | QueryType::Table
        )
    }
}

/// First keyword of the statement, skipping whitespace, comments and opening parentheses
fn leading_keyword(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map(|(_, tail)| tail).unwrap_or("");
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map(|(_, tail)| tail).unwrap_or("");
        } else {
            break;
        }
    }

    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    &rest[..end]
}
