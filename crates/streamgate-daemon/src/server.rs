//! HTTP control surface and WebSocket channel endpoint.
//!
//! REST handlers mirror the manager interface: 200 for synchronous
//! reads, 202 for accepted asynchronous operations (stop, signal), 400
//! for malformed identifiers, 404 for unknown processes. Error bodies
//! are `{"error": <code>, "errno": <status>}`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::debug;

use streamgate_core::{GatewayError, Result, SignalSpec};

use crate::channel;
use crate::manager::{Pid, ProcessManager};
use crate::registry::StreamMode;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ProcessManager>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/pids", get(list_pids))
        .route("/processes/{pid}", get(get_process).delete(delete_process))
        .route("/processes/{pid}/signal", post(signal_process))
        .route("/processes/{pid}/stats", get(process_stats))
        .route("/channels/{pid}", get(open_default_channel))
        .route("/channels/{pid}/{stream}", get(open_named_channel))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn parse_pid(raw: &str) -> Result<Pid> {
    raw.parse()
        .map_err(|_| GatewayError::BadValue(format!("pid {raw:?}")))
}

fn error_response(err: &GatewayError) -> Response {
    let status =
        StatusCode::from_u16(err.errno()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.to_body())).into_response()
}

/// `GET /pids` — currently running process identifiers.
async fn list_pids(State(state): State<AppState>) -> Response {
    Json(json!({ "pids": state.manager.running().await })).into_response()
}

/// `GET /processes/{pid}` — process metadata. HEAD requests take the
/// same route and status, body stripped by the server.
async fn get_process(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let result = async {
        let pid = parse_pid(&raw)?;
        let process = state.manager.get_process(pid).await?;
        Ok(Json(process.info().clone()).into_response())
    }
    .await;
    result.unwrap_or_else(|err: GatewayError| error_response(&err))
}

/// `DELETE /processes/{pid}` — request asynchronous termination.
async fn delete_process(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let result = async {
        let pid = parse_pid(&raw)?;
        state.manager.stop_process(pid).await?;
        Ok((StatusCode::ACCEPTED, Json(json!({ "ok": true }))).into_response())
    }
    .await;
    result.unwrap_or_else(|err: GatewayError| error_response(&err))
}

/// `POST /processes/{pid}/signal` — body `{"signal": <number or name>}`.
async fn signal_process(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    body: Bytes,
) -> Response {
    let result = async {
        let pid = parse_pid(&raw)?;
        let signal = serde_json::from_slice::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| value.get("signal").cloned())
            .ok_or_else(|| GatewayError::BadValue("missing signal".to_string()))?;
        let spec: SignalSpec = serde_json::from_value(signal)
            .map_err(|_| GatewayError::BadValue("malformed signal".to_string()))?;
        state.manager.send_signal(pid, &spec).await?;
        Ok((StatusCode::ACCEPTED, Json(json!({ "ok": true }))).into_response())
    }
    .await;
    result.unwrap_or_else(|err: GatewayError| error_response(&err))
}

/// `GET /processes/{pid}/stats` — resource/runtime snapshot.
async fn process_stats(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let result = async {
        let pid = parse_pid(&raw)?;
        let process = state.manager.get_process(pid).await?;
        Ok(Json(json!({ "stats": process.stats().await })).into_response())
    }
    .await;
    result.unwrap_or_else(|err: GatewayError| error_response(&err))
}

#[derive(Debug, Deserialize)]
struct ChannelQuery {
    mode: Option<String>,
}

/// Parse the raw `mode` query value; absent means both directions.
fn parse_mode(raw: Option<&str>) -> Result<StreamMode> {
    match raw {
        None => Ok(StreamMode::default()),
        Some(raw) => raw
            .parse::<u8>()
            .map_err(|_| GatewayError::BadValue(format!("mode {raw:?}")))
            .and_then(StreamMode::from_mask),
    }
}

/// `GET /channels/{pid}?mode=` — duplex channel to the default redirects.
async fn open_default_channel(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Query(query): Query<ChannelQuery>,
) -> Response {
    upgrade_channel(ws, state, &raw, None, query)
}

/// `GET /channels/{pid}/{stream}?mode=` — duplex channel to a named
/// redirect or custom stream.
async fn open_named_channel(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path((raw, stream)): Path<(String, String)>,
    Query(query): Query<ChannelQuery>,
) -> Response {
    upgrade_channel(ws, state, &raw, Some(stream), query)
}

/// Reject malformed identifiers before the upgrade; everything else is
/// resolved inside the session so the error arrives as a frame.
fn upgrade_channel(
    ws: WebSocketUpgrade,
    state: AppState,
    raw_pid: &str,
    stream: Option<String>,
    query: ChannelQuery,
) -> Response {
    let pid = match parse_pid(raw_pid) {
        Ok(pid) => pid,
        Err(err) => return error_response(&err),
    };
    let mode = match parse_mode(query.mode.as_deref()) {
        Ok(mode) => mode,
        Err(err) => return error_response(&err),
    };

    ws.on_upgrade(move |socket| serve_channel(socket, state.manager, pid, stream, mode))
}

/// Adapt one WebSocket to the transport the session core speaks:
/// raw frame bytes in, encoded frames out.
async fn serve_channel(
    socket: WebSocket,
    manager: Arc<ProcessManager>,
    pid: Pid,
    stream: Option<String>,
    mode: StreamMode,
) {
    let (mut sink, mut ws_rx) = socket.split();
    let (in_tx, in_rx) = mpsc::channel::<Vec<u8>>(64);
    let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(64);

    let writer = tokio::spawn(async move {
        while let Some(buf) = out_rx.recv().await {
            if sink.send(Message::Binary(buf.into())).await.is_err() {
                return;
            }
        }
        // session finished: close the socket
        let _ = sink.close().await;
    });

    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Binary(bytes) => {
                    if in_tx.send(bytes.to_vec()).await.is_err() {
                        break;
                    }
                }
                // text frames carry the same wire bytes
                Message::Text(text) => {
                    if in_tx.send(text.as_bytes().to_vec()).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
        // dropping in_tx reports transport close to the session
    });

    channel::run(manager, pid, stream, mode, in_rx, out_tx).await;

    debug!(pid, "channel transport shutting down");
    let _ = writer.await;
    reader.abort();
}
