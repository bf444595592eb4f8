use crate::actions::{self, ToolCall};
use crate::protocol::messages::{Request, Response};
use crate::security::AuthGate;
use crate::session::ActionContext;
use crate::{ColdQueryError, Result};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct UnlockArgs {
    token: String,
}

/// Per-connection request handling; holds the connection's unlock state
pub struct Connection {
    ctx: ActionContext,
    auth: AuthGate,
    unlocked: bool,
}

/// What to do with one request line
enum Dispatch {
    /// Answered without touching the database
    Ready(Response),
    /// A tool call that passed the auth gate, to run in the background
    Run(Value, ToolCall),
}

impl Connection {
    pub fn new(ctx: ActionContext, auth: AuthGate) -> Self {
        Connection {
            ctx,
            auth,
            unlocked: false,
        }
    }

    /// Decode one request line; unlocks and gate checks apply in arrival order
    fn dispatch(&mut self, line: &str) -> Dispatch {
        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                let err = ColdQueryError::InvalidRequest(format!("malformed request: {}", e));
                return Dispatch::Ready(Response::failure(Value::Null, &err));
            }
        };

        if request.tool == "auth_unlock" {
            let outcome = self.unlock(request.arguments);
            return Dispatch::Ready(respond(request.id, outcome));
        }

        let admitted = ToolCall::parse(&request.tool, request.arguments).and_then(|call| {
            self.auth.check(call.tool(), call.is_dangerous(), self.unlocked)?;
            Ok(call)
        });
        match admitted {
            Ok(call) => Dispatch::Run(request.id, call),
            Err(e) => Dispatch::Ready(respond(request.id, Err(e))),
        }
    }

    fn unlock(&mut self, arguments: Value) -> Result<Value> {
        let args: UnlockArgs = serde_json::from_value(arguments)
            .map_err(|e| ColdQueryError::InvalidRequest(format!("invalid arguments for 'auth_unlock': {}", e)))?;

        if self.auth.unlock(&args.token)? {
            self.unlocked = true;
            Ok(json!({"status": "unlocked", "message": "Session unlocked. Dangerous tools enabled."}))
        } else {
            Ok(json!({"status": "rejected", "message": "Invalid token."}))
        }
    }
}

fn respond(id: Value, outcome: Result<Value>) -> Response {
    match outcome {
        Ok(result) => Response::success(id, result),
        Err(e) => {
            debug!("Request failed: {} ({})", e, e.kind());
            Response::failure(id, &e)
        }
    }
}

fn codec_error(err: LinesCodecError) -> ColdQueryError {
    match err {
        LinesCodecError::Io(e) => ColdQueryError::Io(e),
        LinesCodecError::MaxLineLengthExceeded => {
            ColdQueryError::InvalidRequest("request exceeds the maximum line length".to_string())
        }
    }
}

/// Serve requests from `reader` until EOF, writing one response line per request.
///
/// Tool calls on one connection run concurrently, so a slow statement does
/// not hold up the requests behind it; responses are written as they complete
/// and carry the request id. An oversized request line is answered with an
/// error and stops reading; calls already running still get their responses
/// before the connection closes.
pub async fn serve<R, W>(
    reader: R,
    writer: W,
    ctx: ActionContext,
    auth: AuthGate,
    max_request_bytes: usize,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut requests = FramedRead::new(reader, LinesCodec::new_with_max_length(max_request_bytes));
    let mut responses = FramedWrite::new(writer, LinesCodec::new());
    let mut connection = Connection::new(ctx, auth);
    let mut running: JoinSet<Response> = JoinSet::new();
    let mut reading = true;

    while reading || !running.is_empty() {
        tokio::select! {
            frame = requests.next(), if reading => {
                let line = match frame {
                    Some(Ok(line)) => line,
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        let err = codec_error(LinesCodecError::MaxLineLengthExceeded);
                        warn!("Closing connection: {}", err);
                        responses
                            .send(Response::failure(Value::Null, &err).to_line())
                            .await
                            .map_err(codec_error)?;
                        reading = false;
                        continue;
                    }
                    Some(Err(e)) => return Err(codec_error(e)),
                    None => {
                        debug!("Connection reached end of input");
                        reading = false;
                        continue;
                    }
                };

                if line.trim().is_empty() {
                    continue;
                }

                match connection.dispatch(&line) {
                    Dispatch::Ready(response) => {
                        responses.send(response.to_line()).await.map_err(codec_error)?;
                    }
                    Dispatch::Run(id, call) => {
                        let ctx = connection.ctx.clone();
                        running.spawn(async move { respond(id, actions::execute(&ctx, call).await) });
                    }
                }
            }
            Some(joined) = running.join_next(), if !running.is_empty() => match joined {
                Ok(response) => responses.send(response.to_line()).await.map_err(codec_error)?,
                Err(e) => warn!("Request task failed: {}", e),
            },
        }
    }

    Ok(())
}
