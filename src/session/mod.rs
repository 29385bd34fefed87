//! Session roles.
//!
//! A peer runs exactly one `GameSession`: the `Host`, which owns the
//! authoritative table, or a `Client`, which mirrors it. Both keep a
//! `SessionState` and feed host broadcasts through
//! `SessionState::apply_broadcast`.

pub mod client;
pub mod command;
pub mod driver;
pub mod host;
pub mod reconnect;
pub mod state;

use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::model::{PeerId, ToastMode};
use crate::net::{ConnId, FrameSender};
use crate::protocol::Frame;

pub use client::Client;
pub use command::{Command, SettingsPatch};
pub use driver::Driver;
pub use host::Host;
pub use reconnect::ReconnectionCache;
pub use state::SessionState;

/// Capability shared by both roles. The driver calls these sequentially, so
/// implementations never need locking.
pub trait GameSession {
    fn state(&self) -> &SessionState;

    fn on_open(&mut self, conn: ConnId, peer: PeerId, name: String, tx: FrameSender, now: Instant);

    fn on_frame(&mut self, conn: ConnId, frame: Frame, now: Instant);

    fn on_closed(&mut self, conn: ConnId);

    fn on_dial_failed(&mut self, error: &str) {
        tracing::debug!(%error, "dial failed");
    }

    /// Periodic liveness sweep.
    fn on_keepalive(&mut self, now: Instant);

    /// One-second round timer tick.
    fn on_second(&mut self);

    fn on_timer(&mut self, timer: TimerEvent);

    fn on_command(&mut self, command: Command);

    fn take_directives(&mut self) -> Vec<Directive>;
}

/// Deferred work a session asks the driver to fire back at it. Round timers
/// carry the host's game generation so a timer armed before a cancel cannot
/// land in the next game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    CzarGrace { generation: u32, round: u32 },
    AdvanceRound { generation: u32, round: u32 },
    ApplyTimeSync { time: u32 },
    ReturnToLobby,
    Reconnect { attempt: u32 },
}

/// Side effects a session cannot perform itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Schedule { after: Duration, timer: TimerEvent },
    Dial,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Entry,
    Lobby,
    Game,
}

/// What the presentation layer is told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Toast { message: String, mode: ToastMode, key: Option<&'static str> },
    HideToast(&'static str),
    Navigate(Screen),
    RoundWon { name: String },
    GameWon { player_id: PeerId },
}

/// Optional outlet for `UiEvent`s. A detached sink drops everything.
#[derive(Debug, Clone, Default)]
pub struct UiSink(Option<mpsc::UnboundedSender<UiEvent>>);

impl UiSink {
    pub fn new(tx: mpsc::UnboundedSender<UiEvent>) -> Self {
        Self(Some(tx))
    }

    pub fn detached() -> Self {
        Self(None)
    }

    pub fn emit(&self, event: UiEvent) {
        if let Some(tx) = &self.0 {
            let _ = tx.send(event);
        }
    }

    pub fn toast(&self, message: impl Into<String>, mode: ToastMode) {
        self.emit(UiEvent::Toast { message: message.into(), mode, key: None });
    }

    pub fn keyed_toast(&self, key: &'static str, message: impl Into<String>, mode: ToastMode) {
        self.emit(UiEvent::Toast { message: message.into(), mode, key: Some(key) });
    }

    pub fn hide(&self, key: &'static str) {
        self.emit(UiEvent::HideToast(key));
    }

    pub fn navigate(&self, screen: Screen) {
        self.emit(UiEvent::Navigate(screen));
    }
}
