//! Client role: a read-mostly mirror of the host's session.
//!
//! The only local writes are optimistic card moves, which are immediately
//! proposed to the host and later overwritten by its authoritative sync.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::deck::CardLibrary;
use crate::game::Tick;
use crate::model::{CardId, PeerId, ToastMode, User};
use crate::net::{ConnId, FrameSender, Router, SendOptions, Target};
use crate::protocol::{Frame, Payload};

use super::command::Command;
use super::state::SessionState;
use super::{Directive, GameSession, Screen, TimerEvent, UiSink};

pub struct Client {
    state: SessionState,
    router: Router,
    host_conn: Option<ConnId>,
    kicked: bool,
    leaving: bool,
    /// Attempt number while redialing after a lost host.
    reconnecting: Option<u32>,
    dialing: bool,
    reconnect_attempts: u32,
    reconnect_delay: Duration,
    peer_timeout: Duration,
}

impl Client {
    /// A client that dials as soon as the driver starts.
    pub fn new(
        peer_id: impl Into<PeerId>,
        name: impl Into<String>,
        library: Arc<CardLibrary>,
        ui: UiSink,
        config: &Config,
    ) -> Self {
        let me = User { id: peer_id.into(), name: name.into(), is_host: false, is_ready: false };
        let mut state = SessionState::new(me, library, ui);
        state.directives.push(Directive::Dial);
        Self {
            state,
            router: Router::new(),
            host_conn: None,
            kicked: false,
            leaving: false,
            reconnecting: None,
            dialing: true,
            reconnect_attempts: config.reconnect_attempts,
            reconnect_delay: config.reconnect_delay,
            peer_timeout: config.peer_timeout,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.host_conn.is_some()
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting.is_some()
    }

    fn to_host(&self, payload: Payload) {
        if let Some(conn) = self.host_conn {
            self.router.send(payload, Target::Only(conn));
        }
    }

    fn send(&mut self, payload: Payload, opts: SendOptions) {
        self.router.send(payload.clone(), opts.target);
        if opts.to_self_too {
            self.state.apply_broadcast(&payload);
        }
    }

    fn notify(&self, message: impl Into<String>) {
        self.state.ui.toast(message, ToastMode::Error);
    }

    fn give_up(&mut self, message: &str) {
        self.state.ui.toast(message, ToastMode::Error);
        self.state.ui.navigate(Screen::Entry);
        self.state.directives.push(Directive::Shutdown);
    }

    fn host_lost(&mut self) {
        self.host_conn = None;
        let was_joined = self.state.connected;
        self.state.reset();
        if self.leaving {
            self.state.directives.push(Directive::Shutdown);
        } else if self.kicked {
            self.give_up("Connection lost with the host");
        } else if !was_joined && self.reconnecting.is_none() {
            // refused at the door; the host's toast already said why
            self.state.ui.navigate(Screen::Entry);
            self.state.directives.push(Directive::Shutdown);
        } else {
            tracing::warn!("host connection lost");
            self.state
                .ui
                .toast("Connection lost with the host, attempting to reconnect...", ToastMode::Error);
            self.reconnecting = Some(1);
            self.state.schedule(self.reconnect_delay, TimerEvent::Reconnect { attempt: 1 });
        }
    }

    fn reconnect(&mut self, attempt: u32) {
        if self.host_conn.is_some() || self.reconnecting.is_none() {
            return;
        }
        if attempt > self.reconnect_attempts {
            tracing::warn!(attempts = self.reconnect_attempts, "giving up on host");
            self.reconnecting = None;
            self.give_up("Failed to reconnect after multiple attempts");
            return;
        }
        if self.dialing {
            self.state.schedule(self.reconnect_delay, TimerEvent::Reconnect { attempt });
            return;
        }
        tracing::info!(attempt, "redialing host");
        self.reconnecting = Some(attempt);
        self.dialing = true;
        self.state.directives.push(Directive::Dial);
        self.state.schedule(self.reconnect_delay, TimerEvent::Reconnect { attempt: attempt + 1 });
    }

    /// Stage a card move on a copy of the mirror and propose it to the host.
    fn stage(&mut self, card: CardId, withdraw: bool) {
        let pick = self.state.current_pick();
        let Some(mut next) = self.state.table.clone() else {
            self.notify("No game in progress");
            return;
        };
        let me = self.state.me.id.clone();
        let result = if withdraw {
            next.cancel_card(&me, &card)
        } else {
            next.play_card(&me, &card, pick)
        };
        match result {
            Ok(()) => {
                let proposal = Payload::GameSync {
                    game_state: next.state.clone(),
                    players: next.players.clone(),
                    new_round: false,
                };
                self.state.table = Some(next);
                self.to_host(proposal);
            }
            Err(err) => self.notify(err.to_string()),
        }
    }
}

impl GameSession for Client {
    fn state(&self) -> &SessionState {
        &self.state
    }

    fn on_open(&mut self, conn: ConnId, peer: PeerId, name: String, tx: FrameSender, now: Instant) {
        self.dialing = false;
        if self.host_conn.is_some() {
            tracing::debug!(conn, "extra channel to host dropped");
            return;
        }
        self.router.register(conn, peer, name, tx, now);
        self.router.admit(conn);
        self.host_conn = Some(conn);
        self.reconnecting = None;
        self.router.send(Frame::Join, Target::Only(conn));
    }

    fn on_frame(&mut self, conn: ConnId, frame: Frame, now: Instant) {
        if self.host_conn != Some(conn) {
            return;
        }
        self.router.touch(conn, now);
        match frame {
            Frame::Ping => {
                self.router.send(Frame::Ping, Target::Only(conn));
            }
            Frame::Join => {}
            Frame::Payload(Payload::Kick) => {
                tracing::info!("kicked by host");
                self.kicked = true;
                self.state.ui.toast("You've been kicked!", ToastMode::Error);
                self.router.close(conn);
                self.host_lost();
            }
            Frame::Payload(payload) => {
                tracing::debug!(kind = payload.kind(), "recv");
                self.state.apply_broadcast(&payload);
            }
        }
    }

    fn on_closed(&mut self, conn: ConnId) {
        if self.host_conn == Some(conn) {
            self.router.close(conn);
            self.host_lost();
        }
    }

    fn on_dial_failed(&mut self, error: &str) {
        self.dialing = false;
        tracing::warn!(%error, "dial failed");
        if self.reconnecting.is_none() && self.host_conn.is_none() {
            self.give_up("Could not reach the host");
        }
    }

    fn on_keepalive(&mut self, now: Instant) {
        let Some(conn) = self.host_conn else {
            return;
        };
        if self.router.stale(now, self.peer_timeout).contains(&conn) {
            tracing::warn!(conn, "host timed out");
            self.router.close(conn);
            self.host_lost();
        }
    }

    fn on_second(&mut self) {
        if self.state.timer.tick() != Tick::Expired {
            return;
        }
        if self.state.answering() {
            self.to_host(Payload::EndGame);
        }
    }

    fn on_timer(&mut self, timer: TimerEvent) {
        match timer {
            TimerEvent::ApplyTimeSync { time } => {
                // judging may have begun while the correction was pending
                if self.state.answering() {
                    let round_time = self.state.settings.round_time;
                    self.state.timer.correct(time, round_time);
                }
            }
            TimerEvent::ReturnToLobby => {
                if self.state.table.as_ref().is_some_and(|t| t.state.overall_winner().is_some()) {
                    self.state.return_to_lobby();
                }
            }
            TimerEvent::Reconnect { attempt } => self.reconnect(attempt),
            TimerEvent::CzarGrace { .. } | TimerEvent::AdvanceRound { .. } => {}
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Chat(text) => {
                if text.trim().is_empty() {
                    return;
                }
                let line = self.state.chat_line(text, false);
                self.send(Payload::Message(line), SendOptions::everyone());
            }
            Command::Ready(is_ready) => {
                let me = &self.state.me;
                let payload = Payload::Ready { id: me.id.clone(), name: me.name.clone(), is_ready };
                self.send(payload, SendOptions::everyone());
            }
            Command::PlayCard(card) => self.stage(card, false),
            Command::CancelCard(card) => self.stage(card, true),
            Command::ChooseWinner(winner) => {
                let me = self.state.me.id.clone();
                if self.state.table.as_ref().is_some_and(|t| t.is_czar(&me)) {
                    self.to_host(Payload::ChooseWinner { player_id: winner, card_id: None });
                } else {
                    self.notify("Only the Card Czar can choose the winner");
                }
            }
            Command::StartGame
            | Command::Kick(_)
            | Command::Configure(_)
            | Command::TogglePack(_)
            | Command::CancelGame
            | Command::ForceJudging => self.notify("Only the host can do that"),
            Command::Leave => {
                self.leaving = true;
                match self.host_conn {
                    Some(conn) => {
                        self.router.close(conn);
                        self.host_lost();
                    }
                    None => self.state.directives.push(Directive::Shutdown),
                }
            }
        }
    }

    fn take_directives(&mut self) -> Vec<Directive> {
        std::mem::take(&mut self.state.directives)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::TIME_SYNC_DELAY;
    use crate::model::{GameState, PlayedCard, Player, UserStatus};
    use crate::session::UiEvent;
    use tokio::sync::mpsc;

    fn client() -> (Client, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let c = Client::new("me", "ann", Arc::new(CardLibrary::new()), UiSink::new(tx), &Config::default());
        (c, rx)
    }

    fn connect(c: &mut Client, conn: ConnId) -> mpsc::UnboundedReceiver<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        c.on_open(conn, "DOD-HOST00".into(), String::new(), tx, Instant::now());
        rx
    }

    fn joined(c: &mut Client, conn: ConnId) {
        let history = Payload::History { messages: vec![], users: vec![] };
        c.on_frame(conn, history.into(), Instant::now());
    }

    fn ui(rx: &mut mpsc::UnboundedReceiver<UiEvent>) -> Vec<UiEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn opens_by_sending_join_and_answers_pings() {
        let (mut c, _ui) = client();
        assert_eq!(c.take_directives(), vec![Directive::Dial]);
        let mut rx = connect(&mut c, 1);
        assert_eq!(rx.try_recv().unwrap(), Frame::Join);
        c.on_frame(1, Frame::Ping, Instant::now());
        assert_eq!(rx.try_recv().unwrap(), Frame::Ping);
    }

    #[test]
    fn lost_host_triggers_bounded_redial() {
        let (mut c, mut ui_rx) = client();
        c.take_directives();
        let _rx = connect(&mut c, 1);
        joined(&mut c, 1);
        c.on_closed(1);
        assert!(c.is_reconnecting());
        let d = c.take_directives();
        assert_eq!(
            d,
            vec![Directive::Schedule { after: Duration::from_millis(1000), timer: TimerEvent::Reconnect { attempt: 1 } }]
        );

        for attempt in 1..=3 {
            c.on_timer(TimerEvent::Reconnect { attempt });
            assert!(c.take_directives().contains(&Directive::Dial));
            c.on_dial_failed("refused");
        }
        c.on_timer(TimerEvent::Reconnect { attempt: 4 });
        assert!(c.take_directives().contains(&Directive::Shutdown));
        let events = ui(&mut ui_rx);
        assert!(events.contains(&UiEvent::Navigate(Screen::Entry)));
        assert!(events.iter().any(|e| matches!(e, UiEvent::Toast { message, .. } if message == "Failed to reconnect after multiple attempts")));
    }

    #[test]
    fn successful_redial_stops_retrying() {
        let (mut c, _ui) = client();
        let _rx = connect(&mut c, 1);
        joined(&mut c, 1);
        c.on_closed(1);
        c.on_timer(TimerEvent::Reconnect { attempt: 1 });
        let _rx2 = connect(&mut c, 2);
        c.take_directives();
        c.on_timer(TimerEvent::Reconnect { attempt: 2 });
        assert!(c.take_directives().is_empty());
        assert!(c.is_connected());
    }

    #[test]
    fn kick_ends_the_session() {
        let (mut c, mut ui_rx) = client();
        let _rx = connect(&mut c, 1);
        joined(&mut c, 1);
        c.take_directives();
        c.on_frame(1, Payload::Kick.into(), Instant::now());
        assert!(!c.is_connected());
        assert!(!c.is_reconnecting());
        assert!(c.take_directives().contains(&Directive::Shutdown));
        assert!(ui(&mut ui_rx).iter().any(|e| matches!(e, UiEvent::Toast { message, .. } if message == "You've been kicked!")));
    }

    #[test]
    fn refused_join_does_not_retry() {
        let (mut c, _ui) = client();
        c.take_directives();
        let _rx = connect(&mut c, 1);
        let refusal = Payload::toast("Lobby is already full", ToastMode::Error);
        c.on_frame(1, refusal.into(), Instant::now());
        c.on_closed(1);
        assert!(!c.is_reconnecting());
        assert!(c.take_directives().contains(&Directive::Shutdown));
    }

    #[test]
    fn play_is_proposed_with_lookahead() {
        let (mut c, _ui) = client();
        let mut rx = connect(&mut c, 1);
        joined(&mut c, 1);
        let sync = Payload::GameSync {
            game_state: GameState {
                round: 1,
                czar: "host".into(),
                answer_cards: vec![PlayedCard::empty("me")],
                ..GameState::default()
            },
            players: vec![
                Player { id: "host".into(), name: "hana".into(), score: 0, cards: vec!["x0".into()] },
                Player { id: "me".into(), name: "ann".into(), score: 0, cards: vec!["x1".into(), "x2".into()] },
            ],
            new_round: false,
        };
        c.on_frame(1, sync.into(), Instant::now());
        std::iter::from_fn(|| rx.try_recv().ok()).for_each(drop);

        c.on_command(Command::PlayCard("x2".into()));
        let table = c.state().table.as_ref().unwrap();
        assert_eq!(table.state.entry("me").unwrap().card_id, ["x2"]);
        match rx.try_recv().unwrap() {
            Frame::Payload(Payload::GameSync { game_state, .. }) => {
                assert_eq!(game_state.entry("me").unwrap().card_id, ["x2"]);
            }
            other => panic!("unexpected {other:?}"),
        }

        // a second card exceeds the single pick
        c.on_command(Command::PlayCard("x1".into()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn late_time_sync_does_not_restart_judging() {
        let (mut c, _ui) = client();
        let _rx = connect(&mut c, 1);
        joined(&mut c, 1);
        let mut game_state = GameState {
            round: 1,
            czar: "host".into(),
            answer_cards: vec![PlayedCard::empty("me")],
            ..GameState::default()
        };
        let sync = Payload::GameSync { game_state: game_state.clone(), players: vec![], new_round: false };
        c.on_frame(1, sync.into(), Instant::now());
        c.on_frame(1, Payload::SyncTime { time: 1 }.into(), Instant::now());
        assert!(c
            .take_directives()
            .contains(&Directive::Schedule { after: TIME_SYNC_DELAY, timer: TimerEvent::ApplyTimeSync { time: 1 } }));

        game_state.is_choosing = true;
        c.on_frame(1, Payload::GameState { game_state }.into(), Instant::now());
        c.on_timer(TimerEvent::ApplyTimeSync { time: 1 });
        assert!(!c.state().timer.is_running());
        assert_eq!(c.state().timer.remaining(), 0);
    }

    #[test]
    fn time_sync_corrects_a_running_round() {
        let (mut c, _ui) = client();
        let _rx = connect(&mut c, 1);
        joined(&mut c, 1);
        let game_state = GameState { round: 1, czar: "host".into(), ..GameState::default() };
        c.on_frame(1, Payload::GameSync { game_state, players: vec![], new_round: false }.into(), Instant::now());
        c.on_timer(TimerEvent::ApplyTimeSync { time: 12 });
        assert!(c.state().timer.is_running());
        assert_eq!(c.state().timer.remaining(), 11);
    }

    #[test]
    fn roster_follows_host_notices() {
        let (mut c, _ui) = client();
        let _rx = connect(&mut c, 1);
        joined(&mut c, 1);
        let arrive = Payload::User { id: Some("b".into()), name: "bob".into(), status: UserStatus::Connected };
        c.on_frame(1, arrive.into(), Instant::now());
        assert!(c.state().lobby.contains("b"));
        let leave = Payload::User { id: Some("b".into()), name: "bob".into(), status: UserStatus::Disconnected };
        c.on_frame(1, leave.into(), Instant::now());
        assert!(!c.state().lobby.contains("b"));
    }
}
