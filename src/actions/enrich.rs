use crate::session::ActionContext;
use serde_json::{Value, json};

/// Attach an `active_session` warning when the request's session is about to expire.
///
/// Reads session metadata only, so the warning itself never extends the TTL.
pub fn with_session(ctx: &ActionContext, session_id: Option<&str>, mut response: Value) -> Value {
    let Some(id) = session_id else {
        return response;
    };
    let Some(info) = ctx.sessions.lookup_metadata(id) else {
        return response;
    };

    if info.expires_in < ctx.expiry_warning {
        if let Value::Object(map) = &mut response {
            map.insert(
                "active_session".to_string(),
                json!({
                    "id": info.id,
                    "expires_in": format!("{}m", info.expires_in.as_secs() / 60),
                    "hint": "Warning: Session expiring soon. Commit your work shortly.",
                }),
            );
        }
    }

    response
}
