//! Host listener: HTTP routes and the WebSocket connection lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::protocol::Frame;
use crate::util::id::new_peer_id;

use super::connection::{next_conn_id, ConnId};
use super::NetEvent;

#[derive(Clone)]
pub struct AppState {
    /// Prefixed session id this host answers to.
    pub session_id: Arc<str>,
    pub events: mpsc::UnboundedSender<NetEvent>,
}

#[derive(Debug, Deserialize)]
pub struct PeerParams {
    #[serde(default)]
    pub name: String,
    /// The dialing client's own peer id.
    #[serde(default)]
    pub from: Option<String>,
}

async fn healthz() -> &'static str {
    "ok"
}

pub fn router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/healthz", get(healthz))
        .route("/peer/:peer_id", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
    Query(PeerParams { name, from }): Query<PeerParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if peer_id != *state.session_id {
        return (StatusCode::NOT_FOUND, "no such session").into_response();
    }
    let peer = from.filter(|f| !f.is_empty()).unwrap_or_else(new_peer_id);
    let conn = next_conn_id();
    ws.on_upgrade(move |socket| handle_socket(socket, conn, peer, name, state.events))
}

async fn handle_socket(
    socket: WebSocket,
    conn: ConnId,
    peer: String,
    name: String,
    events: mpsc::UnboundedSender<NetEvent>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    if events.send(NetEvent::Opened { conn, peer: peer.clone(), name, tx }).is_err() {
        return;
    }

    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame.encode() {
                Ok(text) => {
                    if ws_tx.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(err) => tracing::warn!(conn, %err, "dropping unencodable frame"),
            }
        }
        let _ = ws_tx.close().await;
    });

    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => match Frame::decode(&text) {
                Ok(frame) => {
                    if events.send(NetEvent::Frame { conn, frame }).is_err() {
                        break;
                    }
                }
                Err(err) if err.is_unknown() => tracing::debug!(conn, %err, "ignoring frame"),
                Err(err) => tracing::debug!(conn, %err, "malformed frame"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }
    tracing::debug!(conn, %peer, "ws closed");
    let _ = events.send(NetEvent::Closed { conn });
}

/// Bind `addr` and serve until `shutdown` fires.
pub async fn serve(addr: SocketAddr, state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
