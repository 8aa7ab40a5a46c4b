//! Line-delimited JSON-RPC server over stdin/stdout.
//!
//! Every request runs in its own task. Responses go through a single
//! writer task so frames never interleave. A request tracked in the
//! in-flight map gets exactly one terminal frame: whoever removes it from
//! the map (the task on completion, or `cancel`) sends it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinSet};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use hearth_core::Feedback;

use crate::app::{ambient_context, Runtime};
use crate::rpc::{self, RpcError, RpcRequest};

type Outbox = mpsc::UnboundedSender<Value>;
type InFlight = Arc<Mutex<HashMap<String, AbortHandle>>>;

/// Outbound side of one request. Token frames only go out while the
/// request is still in the in-flight map; the check and the send happen
/// under the map's lock, so nothing follows a cancellation frame.
struct RequestFrames {
    out: Outbox,
    inflight: InFlight,
    key: String,
}

impl RequestFrames {
    fn send_if_live(&self, frame: Value) -> bool {
        let map = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        map.contains_key(&self.key) && self.out.send(frame).is_ok()
    }
}

/// How a successful request finishes.
enum Reply {
    Result(Value),
    /// Streamed requests end with a completion frame.
    Complete(Value),
}

pub async fn serve<R, W>(runtime: Arc<Runtime>, input: R, output: W) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();
    let writer = tokio::spawn(async move {
        let mut output = output;
        while let Some(frame) = out_rx.recv().await {
            let mut line = frame.to_string();
            line.push('\n');
            if let Err(e) = output.write_all(line.as_bytes()).await {
                error!(error = %e, "Failed to write response");
                break;
            }
            if let Err(e) = output.flush().await {
                error!(error = %e, "Failed to flush response");
                break;
            }
        }
    });

    let inflight: InFlight = Arc::new(Mutex::new(HashMap::new()));
    let mut tasks = JoinSet::new();
    let mut lines = LinesStream::new(BufReader::new(input).lines());
    info!("Stdio server ready");

    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "Failed to read from stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let request = match RpcRequest::parse(&line) {
            Ok(request) => request,
            Err(response) => {
                warn!("Malformed request");
                let _ = out_tx.send(response);
                continue;
            }
        };
        debug!(method = %request.method, id = %request.key(), "Request received");

        if request.method == "cancel" {
            let response = cancel(&inflight, &out_tx, request.params);
            let _ = out_tx.send(match response {
                Ok(result) => rpc::result_response(request.id, result),
                Err(e) => e.into_response(request.id),
            });
            continue;
        }

        let key = request.key();
        let mut map = inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(&key) {
            let _ = out_tx.send(
                RpcError::new(rpc::INVALID_REQUEST, format!("Request id {key} is already in flight"))
                    .into_response(request.id),
            );
            continue;
        }
        let handle = tasks.spawn(handle_request(
            runtime.clone(),
            request,
            out_tx.clone(),
            inflight.clone(),
        ));
        map.insert(key, handle);
    }

    info!("Input closed, draining in-flight requests");
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            if !e.is_cancelled() {
                error!(error = %e, "Request task failed");
            }
        }
    }
    drop(out_tx);
    let _ = writer.await;
    Ok(())
}

async fn handle_request(runtime: Arc<Runtime>, request: RpcRequest, out: Outbox, inflight: InFlight) {
    let frames = RequestFrames {
        out,
        inflight,
        key: request.key(),
    };
    let id = request.id.clone();
    let reply = dispatch(&runtime, request, &frames).await;

    let still_ours = frames
        .inflight
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&frames.key)
        .is_some();
    if !still_ours {
        return;
    }
    let frame = match reply {
        Ok(Reply::Result(result)) => rpc::result_response(id, result),
        Ok(Reply::Complete(result)) => rpc::complete_frame(id, result),
        Err(e) => e.into_response(id),
    };
    let _ = frames.out.send(frame);
}

#[derive(Deserialize)]
struct CancelParams {
    id: Value,
}

fn cancel(inflight: &InFlight, out: &Outbox, params: Value) -> Result<Value, RpcError> {
    let params: CancelParams = rpc::params(params)?;
    let key = rpc::id_key(&params.id);
    let mut map = inflight.lock().unwrap_or_else(PoisonError::into_inner);
    match map.remove(&key) {
        Some(handle) => {
            handle.abort();
            let _ = out.send(RpcError::cancelled().into_response(params.id));
            drop(map);
            info!(id = %key, "Request cancelled");
            Ok(json!({ "cancelled": true }))
        }
        None => Ok(json!({ "cancelled": false })),
    }
}

#[derive(Deserialize)]
struct ProcessMessageParams {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    streaming: bool,
}

#[derive(Deserialize)]
struct RespondApprovalParams {
    session_id: String,
    approval_id: String,
    approved: bool,
}

#[derive(Deserialize)]
struct EndSessionParams {
    session_id: String,
}

#[derive(Deserialize)]
struct ExecuteToolParams {
    tool: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    approved: bool,
}

#[derive(Deserialize)]
struct SuggestionsParams {
    action: String,
    #[serde(default)]
    context: Value,
}

#[derive(Deserialize)]
struct FeedbackParams {
    suggestion_id: String,
    feedback: String,
    #[serde(default)]
    modification: Option<String>,
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal(e.to_string()))
}

async fn dispatch(
    runtime: &Runtime,
    request: RpcRequest,
    frames: &RequestFrames,
) -> Result<Reply, RpcError> {
    let RpcRequest { id, method, params, .. } = request;
    match method.as_str() {
        "ping" | "health" => Ok(Reply::Result(json!({
            "status": "ok",
            "backends": runtime.pipeline.gateway().availability(),
        }))),

        "process_message" => {
            let p: ProcessMessageParams = rpc::params(params)?;
            if p.message.trim().is_empty() {
                return Err(RpcError::invalid_params("message must not be empty"));
            }
            let (session_id, state) = runtime.sessions.get_or_create(p.session_id).await;
            let mut state = state.lock().await;
            debug!(%session_id, streaming = p.streaming, "Processing message");

            if !p.streaming {
                let result = runtime.pipeline.process_message(&mut state, &p.message, None).await;
                return Ok(Reply::Result(to_value(&result)?));
            }

            let (tx, mut rx) = mpsc::unbounded_channel::<String>();
            let turn = async {
                let result = runtime
                    .pipeline
                    .process_message(&mut state, &p.message, Some(&tx))
                    .await;
                drop(tx);
                result
            };
            let forward = async {
                while let Some(token) = rx.recv().await {
                    if !frames.send_if_live(rpc::token_frame(&id, &token)) {
                        break;
                    }
                }
            };
            let (result, ()) = tokio::join!(turn, forward);
            Ok(Reply::Complete(to_value(&result)?))
        }

        "respond_approval" => {
            let p: RespondApprovalParams = rpc::params(params)?;
            let state = runtime
                .sessions
                .get(&p.session_id)
                .await
                .ok_or_else(|| RpcError::invalid_params(format!("Unknown session: {}", p.session_id)))?;
            let mut state = state.lock().await;
            let result = runtime
                .pipeline
                .resume_with_decision(&mut state, &p.approval_id, p.approved, None)
                .await?;
            Ok(Reply::Result(to_value(&result)?))
        }

        "end_session" => {
            let p: EndSessionParams = rpc::params(params)?;
            let ended = runtime.sessions.remove(&p.session_id).await;
            debug!(session_id = %p.session_id, ended, "Session ended");
            Ok(Reply::Result(json!({ "ended": ended })))
        }

        "execute_tool" => {
            let p: ExecuteToolParams = rpc::params(params)?;
            let executor = runtime.pipeline.executor();
            let tool = executor
                .registry()
                .get(&p.tool)
                .ok_or_else(|| RpcError::invalid_params(format!("tool not found: {}", p.tool)))?;
            if tool.requires_approval() && !p.approved {
                return Err(RpcError::invalid_params(format!(
                    "Tool '{}' requires approval; resend with \"approved\": true",
                    p.tool
                )));
            }
            let args = if p.params.is_null() { json!({}) } else { p.params };
            let output = executor.execute_tool(&p.tool, args).await?;
            Ok(Reply::Result(to_value(&output)?))
        }

        "get_context" => Ok(Reply::Result(ambient_context())),

        "get_suggestions" => {
            let p: SuggestionsParams = rpc::params(params)?;
            let suggestions = runtime.learner.suggest(&p.action, &p.context).await;
            Ok(Reply::Result(json!({ "suggestions": suggestions })))
        }

        "suggestion_feedback" => {
            let p: FeedbackParams = rpc::params(params)?;
            let feedback = Feedback::parse(&p.feedback).ok_or_else(|| {
                RpcError::invalid_params(format!("Unknown feedback: {}", p.feedback))
            })?;
            runtime
                .learner
                .feedback(&p.suggestion_id, feedback, p.modification.as_deref())
                .await;
            Ok(Reply::Result(json!({ "recorded": true })))
        }

        "suggestion_stats" => Ok(Reply::Result(to_value(&runtime.learner.stats())?)),

        other => Err(RpcError::method_not_found(other)),
    }
}
