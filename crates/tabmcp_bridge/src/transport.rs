//! Loopback transport: HTTP bootstrap endpoint plus the WebSocket upgrade
//! the extension keeps open.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::auth;
use crate::error::BridgeError;
use crate::state::BridgeState;
use crate::wire;

/// Consecutive unparseable frames tolerated before the connection is
/// treated as a fault storm and closed.
const MAX_MALFORMED_STREAK: u32 = 16;

/// Routes for the extension-facing surface. The MCP endpoint is nested
/// separately by the server entry point.
pub fn extension_routes(state: Arc<BridgeState>) -> Router {
    Router::new()
        .route(
            "/session",
            get(session).options(session_preflight).fallback(not_found),
        )
        .route("/ws", get(ws_upgrade).fallback(not_found))
        .fallback(not_found)
        .with_state(state)
}

/// Unknown paths and methods get a plain 404, never a method listing.
async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

fn request_origin(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::ORIGIN).and_then(|v| v.to_str().ok())
}

/// `GET /session`: hands the session token to allowlisted origins so the
/// extension can authenticate its upgrade. Never cached.
async fn session(State(state): State<Arc<BridgeState>>, headers: HeaderMap) -> Response {
    let origin = request_origin(&headers);
    if !auth::validate_origin(origin) {
        log::warn!("rejected /session request from origin {origin:?}");
        return (
            StatusCode::FORBIDDEN,
            BridgeError::Auth("origin not allowed".to_string()).to_string(),
        )
            .into_response();
    }

    let mut response = Json(json!({ "token": state.token() })).into_response();
    let headers_mut = response.headers_mut();
    headers_mut.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    if let Some(origin) = origin
        && let Ok(value) = HeaderValue::from_str(origin)
    {
        headers_mut.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    response
}

/// CORS preflight for `/session`; succeeds only for allowed origins.
async fn session_preflight(headers: HeaderMap) -> Response {
    let origin = request_origin(&headers);
    if !auth::validate_origin(origin) {
        return StatusCode::FORBIDDEN.into_response();
    }
    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers_mut = response.headers_mut();
    if let Some(origin) = origin
        && let Ok(value) = HeaderValue::from_str(origin)
    {
        headers_mut.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers_mut.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    );
    headers_mut.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type"),
    );
    response
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// `GET /ws?token=...`: token mismatch rejects the upgrade before any
/// bidirectional channel exists.
async fn ws_upgrade(
    State(state): State<Arc<BridgeState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if query.token.as_deref() != Some(state.token()) {
        log::warn!("rejected websocket upgrade with bad token");
        return (
            StatusCode::UNAUTHORIZED,
            BridgeError::Auth("invalid session token".to_string()).to_string(),
        )
            .into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

enum Teardown {
    Replaced,
    PeerClosed,
    HeartbeatLost,
    FaultStorm,
    WriteFailed,
}

async fn handle_socket(socket: WebSocket, state: Arc<BridgeState>) {
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let conn_id = state.install_connection(outbound_tx);
    log::info!("extension connection {conn_id} active");

    let (mut sink, mut stream) = socket.split();
    let mut heartbeat = tokio::time::interval(state.timing.heartbeat_interval);
    // First tick completes immediately; skip it so the first ping waits a
    // full interval.
    heartbeat.tick().await;
    let mut awaiting_pong = false;
    let mut malformed_streak: u32 = 0;
    let mut last_seen = Instant::now();

    let teardown = loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                // Our sender was dropped from state: a newer authenticated
                // connection replaced this one.
                let Some(frame) = frame else { break Teardown::Replaced };
                let text = match wire::encode_frame(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        log::error!("failed to encode frame: {e}");
                        continue;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break Teardown::WriteFailed;
                }
            }
            _ = heartbeat.tick() => {
                if awaiting_pong && last_seen.elapsed() >= state.timing.heartbeat_interval {
                    break Teardown::HeartbeatLost;
                }
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break Teardown::WriteFailed;
                }
                awaiting_pong = true;
            }
            inbound = stream.next() => {
                let Some(Ok(msg)) = inbound else { break Teardown::PeerClosed };
                last_seen = Instant::now();
                awaiting_pong = false;
                match msg {
                    Message::Text(text) => {
                        if let Some(frame) = wire::parse_frame(text.as_str()) {
                            malformed_streak = 0;
                            state.handle_frame(frame);
                        } else {
                            malformed_streak += 1;
                            if malformed_streak >= MAX_MALFORMED_STREAK {
                                log::error!(
                                    "connection {conn_id}: {malformed_streak} consecutive \
                                     malformed frames, closing"
                                );
                                break Teardown::FaultStorm;
                            }
                        }
                    }
                    Message::Close(_) => break Teardown::PeerClosed,
                    // Binary frames are not part of the protocol.
                    Message::Binary(_) => log::debug!("ignoring binary frame"),
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
        }
    };

    match teardown {
        Teardown::Replaced => {
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::NORMAL,
                    reason: "replaced".into(),
                })))
                .await;
        }
        Teardown::HeartbeatLost => {
            log::warn!("connection {conn_id}: heartbeat unanswered, terminating");
        }
        Teardown::PeerClosed | Teardown::FaultStorm | Teardown::WriteFailed => {}
    }

    // No-op when this connection was already replaced.
    state.drop_connection(conn_id);
}
