use serde::Serialize;
use serde_json::{Map, Value};

/// Column name and engine type name of one result column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// Normalized outcome of one statement
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub rows: Vec<Map<String, Value>>,
    pub row_count: u64,
    pub fields: Vec<FieldInfo>,
}

impl QueryResult {
    /// Result of a row-returning statement; row_count always equals the number of rows
    pub fn from_rows(rows: Vec<Map<String, Value>>, fields: Vec<FieldInfo>) -> Self {
        QueryResult {
            row_count: rows.len() as u64,
            rows,
            fields,
        }
    }

    /// Result of a status-returning statement
    pub fn from_status(row_count: u64) -> Self {
        QueryResult {
            rows: Vec::new(),
            row_count,
            fields: Vec::new(),
        }
    }

    /// Value of `column` in the first row
    pub fn first_value(&self, column: &str) -> Option<&Value> {
        self.rows.first().and_then(|row| row.get(column))
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
