//! Shared data model. Every type here crosses the wire as camelCase JSON.

use serde::{Deserialize, Serialize};

pub type PeerId = String;
pub type CardId = String;

/// Lobby-level identity, one per connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: PeerId,
    pub name: String,
    pub is_host: bool,
    pub is_ready: bool,
}

/// Game-level identity. `cards` holds the answer card ids currently in hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PeerId,
    pub name: String,
    pub score: u32,
    pub cards: Vec<CardId>,
}

pub const MAX_PLAYERS_RANGE: (usize, usize) = (3, 12);
pub const MAX_SCORE_RANGE: (u32, u32) = (1, 20);
pub const ROUND_TIME_RANGE: (u32, u32) = (10, 120);
pub const DEFAULT_PACK: &str = "CAH Base Set";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSettings {
    pub max_players: usize,
    pub max_score: u32,
    pub card_packs: Vec<String>,
    /// Seconds per answering phase.
    pub round_time: u32,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            max_players: 8,
            max_score: 10,
            card_packs: vec![DEFAULT_PACK.to_string()],
            round_time: 30,
        }
    }
}

impl GameSettings {
    /// Clamp numeric fields into their allowed ranges. An empty pack list is
    /// replaced with `fallback_packs` so `card_packs` is never empty.
    pub fn clamped(mut self, fallback_packs: &[String]) -> Self {
        self.max_players = self.max_players.clamp(MAX_PLAYERS_RANGE.0, MAX_PLAYERS_RANGE.1);
        self.max_score = self.max_score.clamp(MAX_SCORE_RANGE.0, MAX_SCORE_RANGE.1);
        self.round_time = self.round_time.clamp(ROUND_TIME_RANGE.0, ROUND_TIME_RANGE.1);
        if self.card_packs.is_empty() {
            self.card_packs = if fallback_packs.is_empty() {
                vec![DEFAULT_PACK.to_string()]
            } else {
                fallback_packs.to_vec()
            };
        }
        self
    }
}

/// One player's submission for the current prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayedCard {
    #[serde(rename = "playerID")]
    pub player_id: PeerId,
    #[serde(rename = "cardID")]
    pub card_id: Vec<CardId>,
}

impl PlayedCard {
    pub fn empty(player_id: impl Into<PeerId>) -> Self {
        Self { player_id: player_id.into(), card_id: Vec::new() }
    }
}

/// The authoritative round snapshot, replicated verbatim from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub round: u32,
    pub czar: PeerId,
    pub prompt_card: CardId,
    pub answer_cards: Vec<PlayedCard>,
    pub is_choosing: bool,
    pub winner: Option<PlayedCard>,
    /// Empty until someone wins the whole game.
    #[serde(rename = "overralWinner", default)]
    pub overall_winner: PeerId,
    pub timestamp: i64,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            round: 0,
            czar: String::new(),
            prompt_card: String::new(),
            answer_cards: Vec::new(),
            is_choosing: false,
            winner: None,
            overall_winner: String::new(),
            timestamp: 0,
        }
    }
}

impl GameState {
    pub fn overall_winner(&self) -> Option<&str> {
        if self.overall_winner.is_empty() { None } else { Some(&self.overall_winner) }
    }

    pub fn entry(&self, player_id: &str) -> Option<&PlayedCard> {
        self.answer_cards.iter().find(|e| e.player_id == player_id)
    }

    pub fn entry_mut(&mut self, player_id: &str) -> Option<&mut PlayedCard> {
        self.answer_cards.iter_mut().find(|e| e.player_id == player_id)
    }

    /// Every card id currently in play this round.
    pub fn cards_in_play(&self) -> impl Iterator<Item = &CardId> {
        self.answer_cards.iter().flat_map(|e| e.card_id.iter())
    }
}

/// Chat line. Append-only, deduplicated by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: u64,
    pub sender: String,
    pub text: String,
    #[serde(default)]
    pub is_system: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: CardId,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_pick: Option<u32>,
}

impl Card {
    /// Number of answer cards a prompt asks for.
    pub fn pick(&self) -> u32 {
        self.min_pick.unwrap_or(1).max(1)
    }
}

/// The working deck.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cards {
    pub prompt: Vec<Card>,
    pub answer: Vec<Card>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastMode {
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Answer,
    Prompt,
}
