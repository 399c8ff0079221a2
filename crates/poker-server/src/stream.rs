use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use poker_core::auth::Principal;
use poker_engine::topic::Subscription;
use serde::Deserialize;
use tracing::{debug, info};

use crate::handlers::ApiError;
use crate::server::AppState;

/// Query parameters of a stream upgrade. WebSocket clients can not set
/// headers, so the token travels in the query string.
#[derive(Debug, Deserialize)]
pub struct StreamParams {
    pub token: Option<String>,
    /// `sync=1` requests an immediate frame with the current state.
    pub sync: Option<u8>,
}

/// `GET /ws/session` — session change broadcasts, masked per viewer.
pub async fn ws_session(
    ws: WebSocketUpgrade,
    Query(params): Query<StreamParams>,
    State(state): State<AppState>,
) -> Response {
    let caller = match state.auth.authenticate(params.token.as_deref().unwrap_or("")) {
        Ok(caller) => caller,
        Err(err) => return ApiError(err).into_response(),
    };
    let sync = params.sync.unwrap_or(0) == 1;
    ws.on_upgrade(move |socket| session_stream(socket, state, caller, sync))
}

/// `GET /ws/presence` — who is online; also counts the caller as online.
pub async fn ws_presence(
    ws: WebSocketUpgrade,
    Query(params): Query<StreamParams>,
    State(state): State<AppState>,
) -> Response {
    let caller = match state.auth.authenticate(params.token.as_deref().unwrap_or("")) {
        Ok(caller) => caller,
        Err(err) => return ApiError(err).into_response(),
    };
    ws.on_upgrade(move |socket| presence_stream(socket, state, caller))
}

async fn session_stream(socket: WebSocket, state: AppState, caller: Principal, sync: bool) {
    let subscription = match state.service.subscribe(&caller).await {
        Ok(subscription) => subscription,
        Err(_) => return,
    };
    info!(name = caller.name(), subscriber = %subscription.id(), "session stream connected");
    let initial = if sync {
        serde_json::to_value(state.service.fetch(&caller).await).ok()
    } else {
        None
    };
    stream_loop(socket, caller, subscription, initial, state.keepalive).await;
}

async fn presence_stream(socket: WebSocket, state: AppState, caller: Principal) {
    let subscription = match state.service.presence_subscribe(&caller).await {
        Ok(subscription) => subscription,
        Err(_) => return,
    };
    info!(name = caller.name(), subscriber = %subscription.id(), "presence stream connected");
    // every connection starts from the roster as of now
    let initial = serde_json::to_value(state.service.presence_current()).ok();
    stream_loop(socket, caller, subscription, initial, state.keepalive).await;
}

/// Pump broadcasts to one socket until either side goes away, pinging on
/// the keepalive interval. Always tears the subscription down so queued
/// frames are drained.
async fn stream_loop(
    socket: WebSocket,
    caller: Principal,
    mut subscription: Subscription,
    initial: Option<serde_json::Value>,
    keepalive: Duration,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    if let Some(frame) = initial {
        if ws_tx
            .send(WsMessage::Text(frame.to_string().into()))
            .await
            .is_err()
        {
            subscription.leave().await;
            return;
        }
    }

    let mut ping = tokio::time::interval(keepalive);
    ping.tick().await; // consume first immediate tick

    loop {
        tokio::select! {
            message = subscription.recv() => {
                let Some(message) = message else { break };
                let frame = message.render(&caller).to_string();
                if ws_tx.send(WsMessage::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {} // axum answers pings itself
                }
            }
        }
    }

    debug!(name = caller.name(), "stream disconnected");
    subscription.leave().await;
}
