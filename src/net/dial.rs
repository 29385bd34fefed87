//! Client side of the transport: dial the host's session endpoint.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::Frame;

use super::connection::{next_conn_id, ConnId};
use super::NetEvent;

#[derive(thiserror::Error, Debug)]
pub enum DialError {
    #[error("could not reach host: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Everything needed to (re)dial the same host under the same identity.
#[derive(Debug, Clone)]
pub struct Dialer {
    url: String,
    session_id: String,
}

impl Dialer {
    /// `addr` is `host:port`; `session_id` already carries the prefix.
    pub fn new(addr: &str, session_id: &str, name: &str, from: &str) -> Self {
        let url = format!(
            "ws://{addr}/peer/{session_id}?name={}&from={}",
            urlencoding::encode(name),
            urlencoding::encode(from),
        );
        Self { url, session_id: session_id.to_string() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open a channel to the host and start pumping it. The host is
    /// reported to `events` under the session id as its peer id.
    pub async fn connect(&self, events: mpsc::UnboundedSender<NetEvent>) -> Result<ConnId, DialError> {
        let (stream, _resp) = connect_async(self.url.as_str()).await?;
        let conn = next_conn_id();
        tracing::info!(conn, url = %self.url, "connected to host");
        let (mut ws_tx, mut ws_rx) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
        let _ = events.send(NetEvent::Opened {
            conn,
            peer: self.session_id.clone(),
            name: String::new(),
            tx,
        });

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

        tokio::spawn(async move {
            while let Some(Ok(msg)) = ws_rx.next().await {
                match msg {
                    Message::Text(text) => match Frame::decode(&text) {
                        Ok(frame) => {
                            if events.send(NetEvent::Frame { conn, frame }).is_err() {
                                break;
                            }
                        }
                        Err(err) => tracing::debug!(conn, %err, "ignoring frame"),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            let _ = events.send(NetEvent::Closed { conn });
        });

        Ok(conn)
    }
}
