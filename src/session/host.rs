//! Host role: owns the authoritative table and arbitrates every change.
//!
//! Clients only ever propose. The host validates, computes the next snapshot
//! and broadcasts it with `to_self_too`, so its own mirror goes through the
//! same `apply_broadcast` path as everybody else's.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::deck::{new_seed, CardLibrary, Deck};
use crate::game::{
    GameError, Phase, Table, Tick, CZAR_GRACE, ROUND_SETTLE_DELAY,
};
use crate::lobby::LobbyDirectory;
use crate::model::{
    CardId, CardType, GameState, PeerId, ToastMode, User, UserStatus, DEFAULT_PACK,
};
use crate::net::{ConnId, FrameSender, Router, SendOptions, Target};
use crate::protocol::{Frame, Payload};
use crate::util::id::now_millis;

use super::command::{Command, SettingsPatch};
use super::reconnect::{Reclaimed, ReconnectionCache};
use super::state::SessionState;
use super::{Directive, GameSession, TimerEvent, UiSink};

pub struct Host {
    state: SessionState,
    router: Router,
    phase: Phase,
    /// Bumped on every start.
    generation: u32,
    cache: ReconnectionCache,
    peer_timeout: Duration,
}

impl Host {
    pub fn new(
        session_id: impl Into<PeerId>,
        name: impl Into<String>,
        library: Arc<CardLibrary>,
        ui: UiSink,
        config: &Config,
    ) -> Self {
        let (id, name) = (session_id.into(), name.into());
        let me = User { id: id.clone(), name: name.clone(), is_host: true, is_ready: true };
        let mut state = SessionState::new(me, library, ui);
        state.lobby = LobbyDirectory::with_host(id, name);
        state.connected = true;
        if !state.library.contains(DEFAULT_PACK) {
            if let Some(first) = state.library.sorted_names().into_iter().next() {
                state.settings.card_packs = vec![first];
            }
        }
        Self {
            state,
            router: Router::new(),
            phase: Phase::Lobby,
            generation: 0,
            cache: ReconnectionCache::new(),
            peer_timeout: config.peer_timeout,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn cache(&self) -> &ReconnectionCache {
        &self.cache
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    fn send(&mut self, payload: Payload, opts: SendOptions) {
        self.router.send(payload.clone(), opts.target);
        if opts.to_self_too {
            self.state.apply_broadcast(&payload);
        }
    }

    fn publish(&mut self, table: &Table, new_round: bool) {
        let payload = Payload::GameSync {
            game_state: table.state.clone(),
            players: table.players.clone(),
            new_round,
        };
        self.send(payload, SendOptions::everyone());
    }

    fn notify(&self, message: impl Into<String>) {
        self.state.ui.toast(message, ToastMode::Error);
    }

    fn send_chat(&mut self, text: String, is_system: bool, opts: SendOptions) {
        if text.trim().is_empty() {
            return;
        }
        let line = self.state.chat_line(text, is_system);
        self.send(Payload::Message(line), opts);
    }

    fn current_round(&self) -> Option<u32> {
        self.state.table.as_ref().map(|t| t.state.round)
    }

    fn is_current(&self, generation: u32, round: u32) -> bool {
        self.generation == generation && self.current_round() == Some(round)
    }

    // ---- lobby ----

    fn handle_join(&mut self, conn: ConnId) {
        let Some(c) = self.router.connections().get(conn) else {
            return;
        };
        if c.admitted {
            return;
        }
        let (peer, name) = (c.peer.clone(), c.name.clone());

        if let Some(old) = self.router.connections().by_peer(&peer).map(|c| c.id) {
            tracing::info!(conn, old, %peer, "peer replaced its channel");
            self.router.close(old);
            self.router.admit(conn);
            self.catch_up(conn, true);
            return;
        }

        if self.state.in_game() {
            if let Some(seat) = self.cache.take(&peer, &name) {
                self.rejoin(conn, seat);
                return;
            }
        }

        if let Err(err) = self.state.lobby.check_admission(&name, self.state.settings.max_players) {
            tracing::warn!(conn, %peer, %name, %err, "join rejected");
            self.notify(err.host_notice());
            self.router.send(Payload::toast(err.remote_message(), ToastMode::Error), Target::Only(conn));
            self.router.close(conn);
            return;
        }

        self.state.lobby.admit(peer.clone(), name.clone());
        self.router.admit(conn);
        tracing::info!(conn, %peer, %name, "joined");
        self.catch_up(conn, false);
        let arrival = Payload::User { id: Some(peer), name: name.clone(), status: UserStatus::Connected };
        self.send(arrival, SendOptions::all_except(conn).and_self());
        self.send_chat(format!("{name} has joined the lobby"), true, SendOptions::all_except(conn).and_self());
    }

    /// Chat history, roster and settings; plus the game when `with_game` is
    /// set and the peer holds a seat.
    fn catch_up(&mut self, conn: ConnId, with_game: bool) {
        let history = Payload::History {
            messages: self.state.messages.clone(),
            users: self.state.lobby.users().to_vec(),
        };
        self.router.send(history, Target::Only(conn));
        self.router.send(Payload::GameSettings { settings: self.state.settings.clone() }, Target::Only(conn));
        if !with_game {
            return;
        }
        let seated = self
            .router
            .connections()
            .get(conn)
            .zip(self.state.table.as_ref())
            .is_some_and(|(c, t)| t.player(&c.peer).is_some());
        if let (true, Some(table)) = (seated, &self.state.table) {
            let sync = Payload::GameSync {
                game_state: table.state.clone(),
                players: table.players.clone(),
                new_round: false,
            };
            self.router.send(sync, Target::Only(conn));
            self.send_game_extras(conn);
        }
    }

    fn send_game_extras(&self, conn: ConnId) {
        if let Some(table) = &self.state.table {
            self.router.send(Payload::GameHistory { history: table.history.clone() }, Target::Only(conn));
        }
        if self.phase == Phase::Answering {
            self.router.send(Payload::SyncTime { time: self.state.timer.remaining() }, Target::Only(conn));
        }
    }

    fn rejoin(&mut self, conn: ConnId, seat: Reclaimed) {
        let (peer, name) = (seat.player.id.clone(), seat.player.name.clone());
        if seat.rekeyed() {
            tracing::info!(conn, %peer, previous = %seat.previous_id, %name, "seat reclaimed by name");
        }
        tracing::info!(conn, %peer, %name, score = seat.player.score, "player reconnected");
        self.state.lobby.admit(peer.clone(), name.clone());
        self.router.admit(conn);
        self.router.send(Frame::Ping, Target::Only(conn));
        self.catch_up(conn, false);

        let Some(table) = &mut self.state.table else {
            return;
        };
        table.reseat(&seat.previous_id, seat.player);
        let table = table.clone();

        let arrival = Payload::User { id: Some(peer), name: name.clone(), status: UserStatus::Connected };
        self.router.send(arrival, Target::AllExcept(conn));
        self.publish(&table, false);
        self.send_game_extras(conn);
        self.send(Payload::toast(format!("{name} reconnected"), ToastMode::Success), SendOptions::everyone());
    }

    /// Remove a departed peer. Mid-game, the player's seat is parked in the
    /// reconnection cache unless they were kicked.
    fn depart(&mut self, peer: &str, name: &str) {
        let keep = !self.state.lobby.was_kicked(peer) && self.phase != Phase::GameOver;
        let mut seat_changed = false;
        if let Some(table) = &mut self.state.table {
            if let Some(player) = table.remove_player(peer) {
                seat_changed = true;
                if keep {
                    self.cache.store(player);
                }
            }
        }
        let leave = Payload::User { id: Some(peer.to_string()), name: name.to_string(), status: UserStatus::Disconnected };
        self.send(leave, SendOptions::everyone());
        self.send_chat(format!("{name} has left the lobby"), true, SendOptions::everyone());
        if seat_changed {
            if let Some(table) = self.state.table.clone() {
                self.publish(&table, false);
            }
        }
    }

    fn kick(&mut self, target: &str) {
        let found = self
            .router
            .connections()
            .iter()
            .find(|c| c.admitted && (c.peer == target || c.name == target))
            .map(|c| (c.id, c.peer.clone(), c.name.clone()));
        let Some((conn, peer, name)) = found else {
            self.notify(format!("No player called {target}"));
            return;
        };
        tracing::info!(conn, %peer, %name, "kicking");
        self.router.send(Payload::Kick, Target::Only(conn));
        self.state.lobby.mark_kicked(peer.clone());
        self.router.close(conn);
        self.depart(&peer, &name);
    }

    fn update_settings(&mut self, patch: SettingsPatch) {
        if self.phase != Phase::Lobby {
            self.notify("Settings are locked while a game is running");
            return;
        }
        let mut settings = self.state.settings.clone();
        if let Some(v) = patch.max_players {
            settings.max_players = v;
        }
        if let Some(v) = patch.max_score {
            settings.max_score = v;
        }
        if let Some(v) = patch.round_time {
            settings.round_time = v;
        }
        let settings = settings.clamped(&self.state.settings.card_packs);
        self.send(Payload::GameSettings { settings }, SendOptions::everyone());
    }

    fn toggle_pack(&mut self, pack: String) {
        if self.phase != Phase::Lobby {
            self.notify("Settings are locked while a game is running");
            return;
        }
        let mut settings = self.state.settings.clone();
        if let Some(pos) = settings.card_packs.iter().position(|p| *p == pack) {
            if settings.card_packs.len() == 1 {
                self.notify("At least one card pack is required");
                return;
            }
            settings.card_packs.remove(pos);
        } else if self.state.library.contains(&pack) {
            settings.card_packs.push(pack);
        } else {
            self.notify(format!("Unknown card pack {pack}"));
            return;
        }
        self.send(Payload::GameSettings { settings }, SendOptions::everyone());
    }

    // ---- game ----

    fn start_game(&mut self) {
        if self.phase != Phase::Lobby {
            self.notify("A game is already running");
            return;
        }
        if !self.state.lobby.all_ready() {
            self.notify("Everyone needs to be ready before starting");
            return;
        }
        let pool = match self.state.library.pool(&self.state.settings.card_packs) {
            Ok(pool) => pool,
            Err(err) => {
                self.notify(format!("Could not load cards: {err}"));
                return;
            }
        };
        let seed = new_seed();
        let mut deck = Deck::new(pool);
        deck.shuffle(seed);
        let table = match Table::deal(self.state.lobby.users(), &deck, now_millis()) {
            Ok(table) => table,
            Err(err) => {
                self.notify(format!("Cannot start: {err}"));
                return;
            }
        };
        self.generation = self.generation.wrapping_add(1);
        tracing::info!(players = table.players.len(), seed, generation = self.generation, "game started");
        self.cache.clear();
        self.send(Payload::StartGame, SendOptions::everyone());
        self.send(Payload::CardShuffle { seed }, SendOptions::everyone());
        self.phase = Phase::Dealt;
        self.publish(&table, false);
        self.phase = Phase::Answering;
    }

    /// Host-side play or withdrawal of its own card.
    fn play_own(&mut self, card: CardId, withdraw: bool) {
        if self.phase != Phase::Answering {
            self.notify("Answers are closed");
            return;
        }
        let pick = self.state.current_pick();
        let Some(mut next) = self.state.table.clone() else {
            return;
        };
        let me = self.state.me.id.clone();
        let result = if withdraw {
            next.cancel_card(&me, &card)
        } else {
            next.play_card(&me, &card, pick)
        };
        match result {
            Ok(()) => self.publish(&next, false),
            Err(err) => self.notify(err.to_string()),
        }
    }

    /// A client's optimistic `gameSync`. Only the sender's own submission is
    /// taken from it; the rest is the host's business.
    fn accept_lookahead(&mut self, conn: ConnId, peer: &str, proposed: &GameState) {
        let pick = self.state.current_pick();
        let Some(table) = &self.state.table else {
            return;
        };
        let mut next = table.clone();
        let wanted: Vec<CardId> = proposed.entry(peer).map(|e| e.card_id.clone()).unwrap_or_default();
        let result = if self.phase == Phase::Answering {
            next.apply_submission(peer, &wanted, pick)
        } else {
            Err(GameError::AnswersClosed)
        };
        match result {
            Ok(true) => self.publish(&next, false),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(conn, %peer, %err, "rejected submission");
                let sync = Payload::GameSync {
                    game_state: table.state.clone(),
                    players: table.players.clone(),
                    new_round: false,
                };
                self.router.send(sync, Target::Only(conn));
            }
        }
    }

    fn begin_judging(&mut self) {
        if self.phase != Phase::Answering {
            return;
        }
        let Some(mut next) = self.state.table.clone() else {
            return;
        };
        if let Err(err) = next.begin_judging() {
            tracing::warn!(%err, "cannot start judging");
            return;
        }
        let round = next.state.round;
        self.phase = Phase::Judging;
        self.send(Payload::GameState { game_state: next.state }, SendOptions::everyone());
        let generation = self.generation;
        self.state.schedule(CZAR_GRACE, TimerEvent::CzarGrace { generation, round });
    }

    fn decide_winner(&mut self, winner: Option<PeerId>) -> Result<(), GameError> {
        if self.phase != Phase::Judging {
            return Err(GameError::NotJudging);
        }
        let table = self.state.table.as_ref().ok_or(GameError::NotJudging)?;
        let cards = match &winner {
            Some(id) => Some(table.submission_of(id)?),
            None => None,
        };
        let round = table.state.round;
        tracing::info!(round, winner = ?winner, "round settled");
        self.send(Payload::ChooseWinner { player_id: winner, card_id: cards }, SendOptions::everyone());
        self.phase = Phase::RoundSettled;
        let generation = self.generation;
        self.state.schedule(ROUND_SETTLE_DELAY, TimerEvent::AdvanceRound { generation, round });
        Ok(())
    }

    fn advance(&mut self, generation: u32, round: u32) {
        if self.phase != Phase::RoundSettled || !self.is_current(generation, round) {
            return;
        }
        let Some(table) = self.state.table.clone() else {
            return;
        };

        if let Some(leader) = table.leader(self.state.settings.max_score) {
            tracing::info!(winner = %leader.name, score = leader.score, "game over");
            let mut game_state = table.state.clone();
            game_state.is_choosing = false;
            game_state.overall_winner = leader.id.clone();
            self.phase = Phase::GameOver;
            self.cache.clear();
            self.send(Payload::GameState { game_state }, SendOptions::everyone());
            return;
        }

        let (answers, prompt) = table.spent_cards();
        if !answers.is_empty() {
            self.send(Payload::CardRemove { card_type: CardType::Answer, card_id: answers }, SendOptions::everyone());
        }
        self.send(Payload::CardRemove { card_type: CardType::Prompt, card_id: vec![prompt] }, SendOptions::everyone());
        self.send(Payload::CardShuffle { seed: new_seed() }, SendOptions::everyone());

        match table.next_round(&self.state.deck, now_millis()) {
            Ok(next) => {
                self.phase = Phase::Answering;
                self.publish(&next, true);
                self.send(Payload::GameHistory { history: next.history }, SendOptions::everyone());
            }
            Err(err) => {
                tracing::warn!(%err, "cannot deal next round");
                let message = match err {
                    GameError::NoPromptCards => "Out of prompt cards".to_string(),
                    other => other.to_string(),
                };
                self.send(Payload::toast(message, ToastMode::Error), SendOptions::everyone());
                self.cancel_game();
            }
        }
    }

    fn cancel_game(&mut self) {
        if !self.state.in_game() {
            self.notify("No game to cancel");
            return;
        }
        tracing::info!("game cancelled");
        self.phase = Phase::Lobby;
        self.cache.clear();
        self.send(Payload::CancelGame, SendOptions::everyone());
    }

    fn handle_remote(&mut self, conn: ConnId, peer: PeerId, name: String, payload: Payload) {
        match payload {
            Payload::Message(mut line) => {
                if line.text.trim().is_empty() {
                    return;
                }
                line.is_system = false;
                let line = Payload::Message(line);
                self.state.apply_broadcast(&line);
                self.router.send(line, Target::AllExcept(conn));
            }
            Payload::Ready { is_ready, .. } => {
                if self.phase != Phase::Lobby {
                    return;
                }
                self.send(Payload::Ready { id: peer, name, is_ready }, SendOptions::everyone());
            }
            Payload::GameSync { game_state, .. } => self.accept_lookahead(conn, &peer, &game_state),
            Payload::ChooseWinner { player_id, .. } => {
                let is_czar = self.state.table.as_ref().is_some_and(|t| t.is_czar(&peer));
                if !is_czar {
                    tracing::warn!(conn, %peer, "chooseWinner from a non-czar ignored");
                    return;
                }
                if let Err(err) = self.decide_winner(player_id) {
                    tracing::debug!(conn, %err, "chooseWinner ignored");
                }
            }
            Payload::EndGame => {
                // a client's countdown ran out; only honour it if ours has too
                if self.phase == Phase::Answering && !self.state.timer.is_running() {
                    self.begin_judging();
                }
            }
            other => {
                tracing::warn!(conn, %peer, kind = other.kind(), "host-only message from client ignored");
            }
        }
    }
}

impl GameSession for Host {
    fn state(&self) -> &SessionState {
        &self.state
    }

    fn on_open(&mut self, conn: ConnId, peer: PeerId, name: String, tx: FrameSender, now: Instant) {
        self.router.register(conn, peer, name, tx, now);
    }

    fn on_frame(&mut self, conn: ConnId, frame: Frame, now: Instant) {
        let Some(c) = self.router.connections().get(conn) else {
            return;
        };
        let (admitted, peer, name) = (c.admitted, c.peer.clone(), c.name.clone());
        self.router.touch(conn, now);
        match frame {
            Frame::Ping => {}
            Frame::Join => self.handle_join(conn),
            Frame::Payload(payload) if admitted => {
                tracing::debug!(conn, kind = payload.kind(), "recv");
                self.handle_remote(conn, peer, name, payload);
            }
            Frame::Payload(payload) => {
                tracing::debug!(conn, kind = payload.kind(), "payload before join ignored");
            }
        }
    }

    fn on_closed(&mut self, conn: ConnId) {
        if let Some(c) = self.router.close(conn) {
            if c.admitted {
                tracing::info!(conn, peer = %c.peer, name = %c.name, "left");
                self.depart(&c.peer, &c.name);
            }
        }
    }

    fn on_keepalive(&mut self, now: Instant) {
        for conn in self.router.stale(now, self.peer_timeout) {
            if let Some(c) = self.router.close(conn) {
                tracing::warn!(conn, peer = %c.peer, "peer timed out");
                if c.admitted {
                    self.depart(&c.peer, &c.name);
                }
            }
        }
        self.router.send(Frame::Ping, Target::All);
        if self.phase == Phase::Answering {
            self.router.send(Payload::SyncTime { time: self.state.timer.remaining() }, Target::All);
        }
    }

    fn on_second(&mut self) {
        if self.state.timer.tick() == Tick::Expired && self.phase == Phase::Answering {
            self.begin_judging();
        }
    }

    fn on_timer(&mut self, timer: TimerEvent) {
        match timer {
            TimerEvent::CzarGrace { generation, round } => {
                if self.phase == Phase::Judging && self.is_current(generation, round) {
                    tracing::info!(round, "czar did not choose in time");
                    if let Err(err) = self.decide_winner(None) {
                        tracing::debug!(%err, "grace expiry ignored");
                    }
                }
            }
            TimerEvent::AdvanceRound { generation, round } => self.advance(generation, round),
            TimerEvent::ReturnToLobby => {
                if self.phase == Phase::GameOver {
                    self.phase = Phase::Lobby;
                    self.state.return_to_lobby();
                }
            }
            TimerEvent::ApplyTimeSync { .. } | TimerEvent::Reconnect { .. } => {}
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Chat(text) => self.send_chat(text, false, SendOptions::everyone()),
            Command::Ready(_) => tracing::debug!("the host is always ready"),
            Command::PlayCard(card) => self.play_own(card, false),
            Command::CancelCard(card) => self.play_own(card, true),
            Command::ChooseWinner(winner) => {
                let me = self.state.me.id.clone();
                if !self.state.table.as_ref().is_some_and(|t| t.is_czar(&me)) {
                    self.notify("Only the Card Czar can choose the winner");
                } else if let Err(err) = self.decide_winner(winner) {
                    self.notify(err.to_string());
                }
            }
            Command::StartGame => self.start_game(),
            Command::Kick(target) => self.kick(&target),
            Command::Configure(patch) => self.update_settings(patch),
            Command::TogglePack(pack) => self.toggle_pack(pack),
            Command::CancelGame => self.cancel_game(),
            Command::ForceJudging => self.begin_judging(),
            Command::Leave => self.state.directives.push(Directive::Shutdown),
        }
    }

    fn take_directives(&mut self) -> Vec<Directive> {
        std::mem::take(&mut self.state.directives)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Card, Cards};
    use crate::session::UiEvent;
    use tokio::sync::mpsc;

    pub(crate) fn library(answers: usize, prompts: usize) -> Arc<CardLibrary> {
        let mut lib = CardLibrary::new();
        lib.insert(
            DEFAULT_PACK,
            Cards {
                prompt: (0..prompts)
                    .map(|i| Card { id: format!("basep{i}"), text: "_".into(), min_pick: Some(1) })
                    .collect(),
                answer: (0..answers)
                    .map(|i| Card { id: format!("basea{i}"), text: i.to_string(), min_pick: None })
                    .collect(),
            },
        );
        Arc::new(lib)
    }

    struct Peer {
        conn: ConnId,
        rx: mpsc::UnboundedReceiver<Frame>,
    }

    impl Peer {
        fn frames(&mut self) -> Vec<Frame> {
            std::iter::from_fn(|| self.rx.try_recv().ok()).collect()
        }
    }

    fn host() -> (Host, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let host = Host::new("DOD-HOST00", "hana", library(60, 5), UiSink::new(tx), &Config::default());
        (host, rx)
    }

    fn join(host: &mut Host, conn: ConnId, peer: &str, name: &str) -> Peer {
        let (tx, rx) = mpsc::unbounded_channel();
        host.on_open(conn, peer.into(), name.into(), tx, Instant::now());
        host.on_frame(conn, Frame::Join, Instant::now());
        Peer { conn, rx }
    }

    fn ready(host: &mut Host, peer: &Peer, id: &str) {
        let p = Payload::Ready { id: id.into(), name: String::new(), is_ready: true };
        host.on_frame(peer.conn, p.into(), Instant::now());
    }

    #[test]
    fn join_sends_catch_up_then_announces() {
        let (mut host, _ui) = host();
        let mut ann = join(&mut host, 1, "a", "ann");
        let frames = ann.frames();
        assert!(matches!(&frames[0], Frame::Payload(Payload::History { users, .. }) if users.len() == 2));
        assert!(matches!(&frames[1], Frame::Payload(Payload::GameSettings { .. })));
        assert_eq!(host.state().lobby.len(), 2);

        let mut bob = join(&mut host, 2, "b", "bob");
        bob.frames();
        let seen = ann.frames();
        assert!(seen.iter().any(|f| matches!(f, Frame::Payload(Payload::User { name, status: UserStatus::Connected, .. }) if name == "bob")));
        assert!(seen.iter().any(|f| matches!(f, Frame::Payload(Payload::Message(m)) if m.is_system)));
    }

    #[test]
    fn duplicate_name_is_rejected_and_closed() {
        let (mut host, mut ui) = host();
        join(&mut host, 1, "a", "ann");
        let mut dup = join(&mut host, 2, "x", "ann");
        assert_eq!(
            dup.frames(),
            vec![Frame::Payload(Payload::toast(
                "Your username is already taken by someone in the lobby",
                ToastMode::Error
            ))]
        );
        assert!(matches!(dup.rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));
        assert_eq!(host.state().lobby.len(), 2);
        let notices: Vec<_> = std::iter::from_fn(|| ui.try_recv().ok()).collect();
        assert!(notices.iter().any(|e| matches!(e, UiEvent::Toast { mode: ToastMode::Error, .. })));
    }

    #[test]
    fn full_lobby_rejects() {
        let (mut host, _ui) = host();
        host.on_command(Command::Configure(SettingsPatch { max_players: Some(3), ..Default::default() }));
        join(&mut host, 1, "a", "ann");
        join(&mut host, 2, "b", "bob");
        let mut late = join(&mut host, 3, "c", "cat");
        assert_eq!(
            late.frames(),
            vec![Frame::Payload(Payload::toast("Lobby is already full", ToastMode::Error))]
        );
    }

    #[test]
    fn start_requires_everyone_ready() {
        let (mut host, _ui) = host();
        let ann = join(&mut host, 1, "a", "ann");
        host.on_command(Command::StartGame);
        assert_eq!(host.phase(), Phase::Lobby);
        ready(&mut host, &ann, "spoofed");
        assert!(host.state().lobby.get("a").unwrap().is_ready);
        host.on_command(Command::StartGame);
        assert_eq!(host.phase(), Phase::Answering);
        let table = host.state().table.as_ref().unwrap();
        assert_eq!(table.players.len(), 2);
        assert_eq!(table.state.czar, "DOD-HOST00");
        assert_eq!(table.players[1].cards.len(), 10);
    }

    fn started() -> (Host, Peer, Peer) {
        let (mut host, _ui) = host();
        let ann = join(&mut host, 1, "a", "ann");
        let bob = join(&mut host, 2, "b", "bob");
        ready(&mut host, &ann, "a");
        ready(&mut host, &bob, "b");
        host.on_command(Command::StartGame);
        (host, ann, bob)
    }

    fn propose(host: &mut Host, peer: &Peer, id: &str, cards: Vec<CardId>) {
        let mut gs = host.state().table.as_ref().unwrap().state.clone();
        if let Some(e) = gs.entry_mut(id) {
            e.card_id = cards;
        }
        let sync = Payload::GameSync { game_state: gs, players: vec![], new_round: false };
        host.on_frame(peer.conn, sync.into(), Instant::now());
    }

    #[test]
    fn lookahead_only_moves_the_senders_entry() {
        let (mut host, ann, _bob) = started();
        let card = host.state().table.as_ref().unwrap().player("a").unwrap().cards[0].clone();
        propose(&mut host, &ann, "a", vec![card.clone()]);
        let table = host.state().table.as_ref().unwrap();
        assert_eq!(table.state.entry("a").unwrap().card_id, [card.clone()]);
        assert!(!table.player("a").unwrap().cards.contains(&card));

        // ann cannot play bob's cards
        let bobs = table.player("b").unwrap().cards[0].clone();
        propose(&mut host, &ann, "b", vec![bobs]);
        assert!(host.state().table.as_ref().unwrap().state.entry("b").unwrap().card_id.is_empty());
    }

    #[test]
    fn only_czar_may_choose_and_only_once() {
        let (mut host, ann, bob) = started();
        let card = host.state().table.as_ref().unwrap().player("a").unwrap().cards[0].clone();
        propose(&mut host, &ann, "a", vec![card]);
        host.on_command(Command::ForceJudging);
        assert_eq!(host.phase(), Phase::Judging);

        let pick = Payload::ChooseWinner { player_id: Some("a".into()), card_id: None };
        host.on_frame(bob.conn, pick.clone().into(), Instant::now());
        assert_eq!(host.phase(), Phase::Judging);

        host.on_command(Command::ChooseWinner(Some("a".into())));
        host.on_command(Command::ChooseWinner(Some("a".into())));
        assert_eq!(host.phase(), Phase::RoundSettled);
        assert_eq!(host.state().table.as_ref().unwrap().player("a").unwrap().score, 1);
    }

    #[test]
    fn czar_grace_settles_without_winner() {
        let (mut host, _ann, _bob) = started();
        host.on_command(Command::ForceJudging);
        let directives = host.take_directives();
        assert!(directives.contains(&Directive::Schedule {
            after: CZAR_GRACE,
            timer: TimerEvent::CzarGrace { generation: 1, round: 1 },
        }));
        host.on_timer(TimerEvent::CzarGrace { generation: 1, round: 1 });
        assert_eq!(host.phase(), Phase::RoundSettled);
        let table = host.state().table.as_ref().unwrap();
        assert!(table.state.winner.is_none());
        assert!(table.players.iter().all(|p| p.score == 0));

        host.on_timer(TimerEvent::AdvanceRound { generation: 1, round: 1 });
        assert_eq!(host.phase(), Phase::Answering);
        let table = host.state().table.as_ref().unwrap();
        assert_eq!(table.state.round, 2);
        assert_eq!(table.state.czar, "a");
        assert_eq!(host.state().round, 2);
        assert_eq!(table.history.len(), 1);
    }

    fn settle_with_winner(host: &mut Host, ann: &Peer) {
        let card = host.state().table.as_ref().unwrap().player("a").unwrap().cards[0].clone();
        propose(host, ann, "a", vec![card]);
        host.on_command(Command::ForceJudging);
        host.on_command(Command::ChooseWinner(Some("a".into())));
        assert_eq!(host.phase(), Phase::RoundSettled);
    }

    #[test]
    fn timers_from_a_cancelled_game_are_ignored() {
        let (mut host, ann, bob) = started();
        settle_with_winner(&mut host, &ann);
        host.on_command(Command::CancelGame);
        assert_eq!(host.phase(), Phase::Lobby);

        ready(&mut host, &ann, "a");
        ready(&mut host, &bob, "b");
        host.on_command(Command::StartGame);
        assert_eq!(host.generation(), 2);
        let card = host.state().table.as_ref().unwrap().player("a").unwrap().cards[0].clone();
        propose(&mut host, &ann, "a", vec![card]);
        host.on_command(Command::ForceJudging);

        host.on_timer(TimerEvent::CzarGrace { generation: 1, round: 1 });
        assert_eq!(host.phase(), Phase::Judging);

        host.on_command(Command::ChooseWinner(Some("a".into())));
        host.on_timer(TimerEvent::AdvanceRound { generation: 1, round: 1 });
        assert_eq!(host.phase(), Phase::RoundSettled);
        assert_eq!(host.state().table.as_ref().unwrap().state.round, 1);

        host.on_timer(TimerEvent::AdvanceRound { generation: 2, round: 1 });
        assert_eq!(host.phase(), Phase::Answering);
        assert_eq!(host.state().table.as_ref().unwrap().state.round, 2);
    }

    #[test]
    fn out_of_prompts_cancels() {
        let (tx, _ui) = mpsc::unbounded_channel();
        let mut host = Host::new("DOD-HOST00", "hana", library(40, 1), UiSink::new(tx), &Config::default());
        let ann = join(&mut host, 1, "a", "ann");
        ready(&mut host, &ann, "a");
        host.on_command(Command::StartGame);
        host.on_command(Command::ForceJudging);
        host.on_timer(TimerEvent::CzarGrace { generation: 1, round: 1 });
        host.on_timer(TimerEvent::AdvanceRound { generation: 1, round: 1 });
        assert_eq!(host.phase(), Phase::Lobby);
        assert!(host.state().table.is_none());
    }

    #[test]
    fn kick_closes_and_skips_cache() {
        let (mut host, mut ann, _bob) = started();
        ann.frames();
        host.on_command(Command::Kick("ann".into()));
        assert_eq!(ann.frames(), vec![Frame::Payload(Payload::Kick)]);
        assert!(host.cache().is_empty());
        assert!(host.state().lobby.get("a").is_none());
        assert!(host.state().table.as_ref().unwrap().player("a").is_none());
    }

    #[test]
    fn settings_are_host_clamped_and_packs_never_empty() {
        let (mut host, _ui) = host();
        host.on_command(Command::Configure(SettingsPatch { round_time: Some(500), ..Default::default() }));
        assert_eq!(host.state().settings.round_time, 120);
        host.on_command(Command::TogglePack(DEFAULT_PACK.into()));
        assert_eq!(host.state().settings.card_packs, [DEFAULT_PACK]);
    }

    #[test]
    fn stale_peer_is_dropped_on_sweep() {
        let (mut host, _ann, _bob) = started();
        let later = Instant::now() + Duration::from_secs(30);
        host.on_keepalive(later);
        assert_eq!(host.state().lobby.len(), 1);
        assert_eq!(host.cache().len(), 2);
    }
}
