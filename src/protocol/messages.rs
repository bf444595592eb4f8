use crate::ColdQueryError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// One request line: `{"id": ..., "tool": "...", "arguments": {...}}`
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Value,
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

/// One response line; exactly one of `result` and `error` is present
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ErrorBody {
    pub fn from_error(err: &ColdQueryError) -> Self {
        let detail = match err {
            ColdQueryError::Engine(engine) => Some(json!({
                "detail": engine.detail,
                "hint": engine.hint,
                "position": engine.position,
                "retryable": engine.is_transient(),
            })),
            ColdQueryError::BatchFailed { index, source } => Some(json!({
                "operation_index": index,
                "cause": source.kind(),
            })),
            ColdQueryError::InvalidIdentifier { name, reason } => Some(json!({
                "identifier": name,
                "reason": reason,
            })),
            ColdQueryError::InvalidSession(id) => Some(json!({"session_id": id})),
            ColdQueryError::ResourceExhausted { max } => Some(json!({"max_sessions": max})),
            _ => None,
        };

        ErrorBody {
            kind: err.kind().to_string(),
            message: err.to_string(),
            code: err.code().map(str::to_string),
            detail,
        }
    }
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Response {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, err: &ColdQueryError) -> Self {
        Response {
            id,
            result: None,
            error: Some(ErrorBody::from_error(err)),
        }
    }

    /// Serialize as a single line without the trailing newline
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            json!({
                "id": self.id,
                "error": {"kind": "internal", "message": format!("failed to encode response: {}", e)},
            })
            .to_string()
        })
    }
}
