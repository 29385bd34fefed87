//! Transport: one WebSocket per data channel.
//!
//! The host listens with axum, clients dial with tokio-tungstenite. Both sides
//! turn socket activity into `NetEvent`s for the session loop and accept
//! outbound `Frame`s through a per-connection channel.

pub mod connection;
pub mod dial;
pub mod router;
pub mod server;

use crate::model::PeerId;
use crate::protocol::Frame;

pub use connection::{next_conn_id, ConnId, Connection, ConnectionManager, FrameSender};
pub use dial::{DialError, Dialer};
pub use router::{Router, SendOptions, Target};

#[derive(Debug)]
pub enum NetEvent {
    /// A socket finished its handshake. `tx` feeds the socket's forwarder.
    Opened { conn: ConnId, peer: PeerId, name: String, tx: FrameSender },
    Frame { conn: ConnId, frame: Frame },
    Closed { conn: ConnId },
    DialFailed { error: String },
}
