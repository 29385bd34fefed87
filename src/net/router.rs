//! Message Router: fan-out of frames to one, many, or every admitted channel.
//!
//! Local dispatch (`to_self_too`) is performed by the session role that owns
//! the router, since only it knows how to apply a payload to its own state.

use std::time::{Duration, Instant};

use crate::model::PeerId;
use crate::protocol::Frame;

use super::connection::{ConnId, ConnectionManager, FrameSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every admitted connection.
    All,
    /// One connection, admitted or not.
    Only(ConnId),
    AllExcept(ConnId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    pub target: Target,
    pub to_self_too: bool,
}

impl SendOptions {
    pub fn all() -> Self {
        Self { target: Target::All, to_self_too: false }
    }

    pub fn all_except(conn: ConnId) -> Self {
        Self { target: Target::AllExcept(conn), to_self_too: false }
    }

    /// Send to every admitted connection and apply locally as well.
    pub fn everyone() -> Self {
        Self::all().and_self()
    }

    pub fn and_self(mut self) -> Self {
        self.to_self_too = true;
        self
    }
}

#[derive(Debug, Default)]
pub struct Router {
    conns: ConnectionManager,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.conns
    }

    pub fn register(&mut self, conn: ConnId, peer: PeerId, name: String, tx: FrameSender, now: Instant) {
        tracing::debug!(conn, %peer, %name, "channel open");
        self.conns.insert(conn, peer, name, tx, now);
    }

    pub fn admit(&mut self, conn: ConnId) {
        self.conns.admit(conn);
    }

    pub fn touch(&mut self, conn: ConnId, now: Instant) {
        self.conns.touch(conn, now);
    }

    pub fn close(&mut self, conn: ConnId) -> Option<super::Connection> {
        let closed = self.conns.remove(conn);
        if closed.is_some() {
            tracing::debug!(conn, "channel closed");
        }
        closed
    }

    pub fn stale(&self, now: Instant, timeout: Duration) -> Vec<ConnId> {
        self.conns.stale(now, timeout)
    }

    /// Queue `frame` for every connection `target` selects. Returns how many
    /// connections accepted it.
    pub fn send(&self, frame: impl Into<Frame>, target: Target) -> usize {
        let frame = frame.into();
        match target {
            Target::Only(id) => match self.conns.get(id) {
                Some(c) => c.send(frame) as usize,
                None => {
                    tracing::debug!(conn = id, "send to unknown channel dropped");
                    0
                }
            },
            Target::All | Target::AllExcept(_) => {
                let skip = match target {
                    Target::AllExcept(id) => Some(id),
                    _ => None,
                };
                self.conns
                    .iter()
                    .filter(|c| c.admitted && Some(c.id) != skip)
                    .filter(|c| c.send(frame.clone()))
                    .count()
            }
        }
    }
}
