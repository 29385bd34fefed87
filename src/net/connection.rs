//! Connection Manager: the set of open data channels and their liveness.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::model::PeerId;
use crate::protocol::Frame;

pub type ConnId = u64;
pub type FrameSender = mpsc::UnboundedSender<Frame>;

static NEXT_CONN: AtomicU64 = AtomicU64::new(1);

pub fn next_conn_id() -> ConnId {
    NEXT_CONN.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug)]
pub struct Connection {
    pub id: ConnId,
    pub peer: PeerId,
    /// Display name carried as connection metadata.
    pub name: String,
    pub admitted: bool,
    last_seen: Instant,
    tx: FrameSender,
}

impl Connection {
    /// Queue a frame for the socket. False once the socket is gone.
    pub fn send(&self, frame: Frame) -> bool {
        self.tx.send(frame).is_ok()
    }
}

#[derive(Debug, Default)]
pub struct ConnectionManager {
    conns: HashMap<ConnId, Connection>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ConnId, peer: PeerId, name: String, tx: FrameSender, now: Instant) {
        self.conns.insert(id, Connection { id, peer, name, admitted: false, last_seen: now, tx });
    }

    pub fn get(&self, id: ConnId) -> Option<&Connection> {
        self.conns.get(&id)
    }

    pub fn admit(&mut self, id: ConnId) {
        if let Some(c) = self.conns.get_mut(&id) {
            c.admitted = true;
        }
    }

    /// The admitted connection currently serving `peer`.
    pub fn by_peer(&self, peer: &str) -> Option<&Connection> {
        self.conns.values().find(|c| c.admitted && c.peer == peer)
    }

    pub fn touch(&mut self, id: ConnId, now: Instant) {
        if let Some(c) = self.conns.get_mut(&id) {
            c.last_seen = now;
        }
    }

    /// Forget the connection. Dropping its sender makes the forwarder close
    /// the socket once queued frames are flushed.
    pub fn remove(&mut self, id: ConnId) -> Option<Connection> {
        self.conns.remove(&id)
    }

    /// Connections silent for longer than `timeout`, oldest first.
    pub fn stale(&self, now: Instant, timeout: Duration) -> Vec<ConnId> {
        let mut stale: Vec<&Connection> = self
            .conns
            .values()
            .filter(|c| now.saturating_duration_since(c.last_seen) > timeout)
            .collect();
        stale.sort_by_key(|c| (c.last_seen, c.id));
        stale.into_iter().map(|c| c.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.conns.values()
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }
}
