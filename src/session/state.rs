//! The local mirror every peer keeps, and the single entry point through which
//! host broadcasts reach it.

use std::sync::Arc;

use crate::deck::{CardLibrary, Deck};
use crate::game::{RoundTimer, Table, GAME_OVER_DELAY, TIME_SYNC_DELAY};
use crate::lobby::LobbyDirectory;
use crate::model::{ChatMessage, GameSettings, GameState, Player, ToastMode, User, UserStatus};
use crate::protocol::Payload;
use crate::util::id::new_message_id;

use super::{Directive, Screen, TimerEvent, UiEvent, UiSink};

pub const TOAST_TIMES_UP: &str = "timesup";
pub const TOAST_WON: &str = "won";
pub const TOAST_NO_WIN: &str = "nowin";

#[derive(Debug)]
pub struct SessionState {
    pub me: User,
    pub lobby: LobbyDirectory,
    pub messages: Vec<ChatMessage>,
    pub settings: GameSettings,
    pub table: Option<Table>,
    pub deck: Deck,
    /// Locally counted round, bumped by `newRound` syncs.
    pub round: u32,
    pub timer: RoundTimer,
    /// Set once the host's catch-up `history` has arrived.
    pub connected: bool,
    pub library: Arc<CardLibrary>,
    pub ui: UiSink,
    pub directives: Vec<Directive>,
}

impl SessionState {
    pub fn new(me: User, library: Arc<CardLibrary>, ui: UiSink) -> Self {
        Self {
            me,
            lobby: LobbyDirectory::new(),
            messages: Vec::new(),
            settings: GameSettings::default(),
            table: None,
            deck: Deck::default(),
            round: 0,
            timer: RoundTimer::new(),
            connected: false,
            library,
            ui,
            directives: Vec::new(),
        }
    }

    /// Forget everything learned from the session, keeping identity.
    pub fn reset(&mut self) {
        self.lobby.clear();
        self.messages.clear();
        self.settings = GameSettings::default();
        self.table = None;
        self.deck.clear();
        self.round = 0;
        self.timer.stop();
        self.connected = false;
    }

    pub fn schedule(&mut self, after: std::time::Duration, timer: TimerEvent) {
        self.directives.push(Directive::Schedule { after, timer });
    }

    pub fn in_game(&self) -> bool {
        self.table.is_some()
    }

    /// The mirror shows a round still taking answers.
    pub fn answering(&self) -> bool {
        self.table.as_ref().is_some_and(|t| {
            !t.state.is_choosing && t.state.winner.is_none() && t.state.overall_winner().is_none()
        })
    }

    /// Cards the current prompt asks for; 1 if the prompt is unknown locally.
    pub fn current_pick(&self) -> u32 {
        self.table
            .as_ref()
            .and_then(|t| self.deck.prompt(&t.state.prompt_card))
            .map(|c| c.pick())
            .unwrap_or(1)
    }

    pub fn chat_line(&self, text: impl Into<String>, is_system: bool) -> ChatMessage {
        ChatMessage {
            id: new_message_id(),
            sender: self.me.name.clone(),
            text: text.into(),
            is_system,
        }
    }

    fn push_message(&mut self, message: ChatMessage) {
        if !self.messages.iter().any(|m| m.id == message.id) {
            self.messages.push(message);
        }
    }

    fn load_deck(&mut self) {
        match self.library.pool(&self.settings.card_packs) {
            Ok(cards) => self.deck = Deck::new(cards),
            Err(err) => {
                tracing::warn!(%err, "cannot load card pool");
                self.ui.toast(format!("Could not load cards: {err}"), ToastMode::Error);
            }
        }
    }

    /// Leave the game view and drop all game data.
    pub fn return_to_lobby(&mut self) {
        self.table = None;
        self.deck.clear();
        self.round = 0;
        self.timer.stop();
        self.ui.navigate(Screen::Lobby);
    }

    /// Apply one host broadcast. Every peer, the host included, runs the same
    /// code for the same payload.
    pub fn apply_broadcast(&mut self, payload: &Payload) {
        match payload {
            Payload::History { messages, users } => {
                for m in messages {
                    self.push_message(m.clone());
                }
                self.lobby.merge(users.iter().cloned());
                self.connected = true;
            }
            Payload::GameSettings { settings } => {
                self.settings = settings.clone();
            }
            Payload::User { id, name, status } => match status {
                UserStatus::Disconnected => {
                    if let Some(id) = id {
                        self.lobby.remove(id);
                    }
                    self.ui.toast(format!("{name} has left the lobby"), ToastMode::Error);
                }
                UserStatus::Connected => {
                    if let Some(id) = id {
                        if !self.lobby.contains(id) {
                            self.lobby.upsert(User {
                                id: id.clone(),
                                name: name.clone(),
                                is_host: false,
                                is_ready: false,
                            });
                        }
                    }
                    self.ui.toast(format!("{name} has joined the lobby"), ToastMode::Success);
                }
            },
            Payload::Message(message) => self.push_message(message.clone()),
            Payload::Toast { message, mode } => self.ui.toast(message.clone(), *mode),
            Payload::Ready { id, is_ready, .. } => {
                self.lobby.set_ready(id, *is_ready);
            }
            Payload::StartGame => {
                self.load_deck();
                self.round = 0;
            }
            Payload::CardShuffle { seed } => self.deck.shuffle(*seed),
            Payload::CardRemove { card_type, card_id } => self.deck.remove(*card_type, card_id),
            Payload::GameSync { game_state, players, new_round } => {
                self.apply_sync(game_state, players, *new_round)
            }
            Payload::GameState { game_state } => self.apply_game_state(game_state),
            Payload::GameHistory { history } => {
                if let Some(table) = &mut self.table {
                    table.history = history.clone();
                }
            }
            Payload::SyncTime { time } => {
                self.schedule(TIME_SYNC_DELAY, TimerEvent::ApplyTimeSync { time: *time });
            }
            Payload::ChooseWinner { player_id, card_id } => {
                self.apply_choose_winner(player_id.as_deref(), card_id.clone())
            }
            Payload::CancelGame => {
                self.ui.toast("Game cancelled", ToastMode::Error);
                self.return_to_lobby();
            }
            Payload::Kick | Payload::EndGame | Payload::NextRound => {
                tracing::debug!(kind = payload.kind(), "not a broadcast, ignored");
            }
        }
    }

    fn apply_sync(&mut self, game_state: &GameState, players: &[Player], new_round: bool) {
        match &mut self.table {
            Some(table) => {
                table.state = game_state.clone();
                table.players = players.to_vec();
                if new_round {
                    self.round = (self.round + 1).max(game_state.round);
                    self.timer.reset(self.settings.round_time);
                    self.ui.hide(TOAST_WON);
                    self.ui.hide(TOAST_NO_WIN);
                } else {
                    self.round = self.round.max(game_state.round);
                }
            }
            None => {
                self.table = Some(Table::new(game_state.clone(), players.to_vec()));
                self.round = self.round.max(game_state.round);
                if !self.deck.is_loaded() {
                    self.load_deck();
                }
                if !game_state.is_choosing {
                    self.timer.reset(self.settings.round_time);
                }
                self.ui.navigate(Screen::Game);
            }
        }
    }

    fn apply_game_state(&mut self, game_state: &GameState) {
        let Some(table) = &mut self.table else {
            tracing::debug!("gameState outside a game, ignored");
            return;
        };
        let judging_started = game_state.is_choosing && !table.state.is_choosing;
        table.state = game_state.clone();
        if judging_started {
            self.timer.stop();
            self.ui.keyed_toast(
                TOAST_TIMES_UP,
                "Time's up!, Czar will choose the funniest card combo in 10s",
                ToastMode::Success,
            );
        }
        if let Some(winner) = game_state.overall_winner() {
            self.timer.stop();
            self.ui.emit(UiEvent::GameWon { player_id: winner.to_string() });
            self.schedule(GAME_OVER_DELAY, TimerEvent::ReturnToLobby);
        }
    }

    fn apply_choose_winner(&mut self, player_id: Option<&str>, card_id: Option<Vec<String>>) {
        let Some(table) = &mut self.table else {
            return;
        };
        match table.choose_winner(player_id, card_id) {
            Ok(Some(name)) => {
                self.ui.hide(TOAST_TIMES_UP);
                self.ui.hide(TOAST_WON);
                self.ui.emit(UiEvent::RoundWon { name: name.clone() });
                self.ui.keyed_toast(TOAST_WON, format!("{name} won the round!"), ToastMode::Success);
            }
            Ok(None) => {
                self.ui.hide(TOAST_TIMES_UP);
                self.ui.hide(TOAST_NO_WIN);
                self.ui.keyed_toast(
                    TOAST_NO_WIN,
                    "Time's up!, Czar thinks the cards combo not funny enough",
                    ToastMode::Error,
                );
            }
            Err(err) => tracing::debug!(%err, "chooseWinner ignored"),
        }
    }
}
