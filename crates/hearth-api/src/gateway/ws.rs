//! WebSocket transport for live sessions.
//!
//! Clients connect to `/api/v1/ws` and must send
//! `{"type":"CONNECT","authorization":"Bearer <token>"}` as their first
//! frame. The server answers `CONNECTED` and from then on writes every
//! fan-out payload addressed to that user as a text frame.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, trace, warn};

use hearth_core::Error;

use super::connection::{rejection_reason, Connection, FrameOutcome, ServerFrame};
use super::Gateway;
use crate::auth::AuthenticatedUser;
use crate::state::AppState;

type WsSender = SplitSink<WebSocket, Message>;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    ws.on_upgrade(move |socket| handle_socket(socket, state.gateway, authorization))
}

/// Write one frame within `limit`. False when the peer is gone or too slow.
async fn send_bounded(sender: &mut WsSender, message: Message, limit: Duration) -> bool {
    match tokio::time::timeout(limit, sender.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(subsystem = "gateway", component = "ws", error = %e, "Socket write failed");
            false
        }
        Err(_) => {
            warn!(
                subsystem = "gateway",
                component = "ws",
                timeout_ms = limit.as_millis() as u64,
                "Socket write timed out"
            );
            false
        }
    }
}

async fn reject(sender: &mut WsSender, reason: &str, limit: Duration) {
    let frame = ServerFrame::Error {
        reason: reason.to_string(),
    };
    if let Ok(json) = frame.to_json() {
        send_bounded(sender, Message::Text(json), limit).await;
    }
    send_bounded(sender, Message::Close(None), limit).await;
}

async fn handle_socket(socket: WebSocket, gateway: Gateway, authorization: Option<String>) {
    let config = gateway.config().clone();
    let (mut sender, mut receiver) = socket.split();
    let mut connection = Connection::new(gateway.authenticator.clone(), authorization);

    // Wait for the first text frame; pings and pongs do not count.
    let handshake = tokio::time::timeout(config.handshake_timeout, async {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => return Some(connection.on_frame(&text).await),
                Message::Binary(_) => {
                    return Some(Err(Error::Validation("binary handshake frame".to_string())))
                }
                Message::Close(_) => return None,
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
        None
    })
    .await;

    let user: AuthenticatedUser = match handshake {
        Ok(Some(Ok(FrameOutcome::Authenticated(user)))) => user,
        Ok(Some(Ok(FrameOutcome::PassThrough))) => {
            reject(&mut sender, "PROTOCOL_ERROR", config.push_timeout).await;
            return;
        }
        Ok(Some(Err(e))) => {
            let reason = rejection_reason(&e);
            if matches!(e, Error::Auth(_)) {
                info!(subsystem = "gateway", component = "ws", reason, "Handshake rejected");
            } else {
                warn!(subsystem = "gateway", component = "ws", reason, error = %e, "Handshake failed");
            }
            reject(&mut sender, reason, config.push_timeout).await;
            return;
        }
        Ok(None) => {
            debug!(subsystem = "gateway", component = "ws", "Peer left before handshake");
            return;
        }
        Err(_) => {
            info!(
                subsystem = "gateway",
                component = "ws",
                timeout_secs = config.handshake_timeout.as_secs(),
                "Handshake timed out"
            );
            reject(&mut sender, "HANDSHAKE_TIMEOUT", config.push_timeout).await;
            return;
        }
    };

    let user_id = user.user_id;
    let (session_id, mut outbound) = gateway.open_session(user_id).await;

    let connected = ServerFrame::Connected {
        session_id,
        user_id,
    };
    let delivered = match connected.to_json() {
        Ok(json) => send_bounded(&mut sender, Message::Text(json), config.push_timeout).await,
        Err(_) => false,
    };
    if !delivered {
        gateway.close_session(session_id).await;
        return;
    }

    let push_timeout = config.push_timeout;
    let ping_interval = config.ping_interval;
    let mut send_task = tokio::spawn(async move {
        let mut ping = tokio::time::interval_at(tokio::time::Instant::now() + ping_interval, ping_interval);
        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };
                    if !send_bounded(&mut sender, Message::Text(frame), push_timeout).await {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if !send_bounded(&mut sender, Message::Ping(Vec::new()), push_timeout).await {
                        break;
                    }
                }
            }
        }
        let _ = sender.close().await;
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => break,
                Message::Text(text) => {
                    if let Ok(FrameOutcome::PassThrough) = connection.on_frame(&text).await {
                        trace!(subsystem = "gateway", component = "ws", user_id, "Client frame ignored");
                    }
                }
                _ => {}
            }
        }
        connection.close();
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    gateway.close_session(session_id).await;
}
