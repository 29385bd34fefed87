//! Wire protocol: raw keepalive/join ticks plus the tagged payload union.
//!
//! Frames travel as JSON text. The bare numbers `0` and `1` are the keepalive
//! tick and the initial join request; everything else is an object carrying a
//! `type` discriminator.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::model::{
    CardId, CardType, ChatMessage, GameSettings, GameState, PeerId, Player, ToastMode, User,
    UserStatus,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Payload {
    History {
        messages: Vec<ChatMessage>,
        users: Vec<User>,
    },
    GameSettings {
        settings: GameSettings,
    },
    User {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<PeerId>,
        name: String,
        status: UserStatus,
    },
    Message(ChatMessage),
    Toast {
        message: String,
        mode: ToastMode,
    },
    Kick,
    Ready {
        id: PeerId,
        name: String,
        is_ready: bool,
    },
    StartGame,
    CardShuffle {
        seed: u32,
    },
    CardRemove {
        card_type: CardType,
        #[serde(rename = "cardID", deserialize_with = "one_or_many")]
        card_id: Vec<CardId>,
    },
    GameSync {
        game_state: GameState,
        players: Vec<Player>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        new_round: bool,
    },
    GameState {
        game_state: GameState,
    },
    GameHistory {
        history: Vec<GameState>,
    },
    EndGame,
    SyncTime {
        time: u32,
    },
    ChooseWinner {
        #[serde(rename = "playerID", default, skip_serializing_if = "Option::is_none")]
        player_id: Option<PeerId>,
        #[serde(rename = "cardID", default, skip_serializing_if = "Option::is_none")]
        card_id: Option<Vec<CardId>>,
    },
    NextRound,
    CancelGame,
}

const KNOWN_TYPES: &[&str] = &[
    "history", "gameSettings", "user", "message", "toast", "kick", "ready", "startGame",
    "cardShuffle", "cardRemove", "gameSync", "gameState", "gameHistory", "endGame", "syncTime",
    "chooseWinner", "nextRound", "cancelGame",
];

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::History { .. } => "history",
            Payload::GameSettings { .. } => "gameSettings",
            Payload::User { .. } => "user",
            Payload::Message(_) => "message",
            Payload::Toast { .. } => "toast",
            Payload::Kick => "kick",
            Payload::Ready { .. } => "ready",
            Payload::StartGame => "startGame",
            Payload::CardShuffle { .. } => "cardShuffle",
            Payload::CardRemove { .. } => "cardRemove",
            Payload::GameSync { .. } => "gameSync",
            Payload::GameState { .. } => "gameState",
            Payload::GameHistory { .. } => "gameHistory",
            Payload::EndGame => "endGame",
            Payload::SyncTime { .. } => "syncTime",
            Payload::ChooseWinner { .. } => "chooseWinner",
            Payload::NextRound => "nextRound",
            Payload::CancelGame => "cancelGame",
        }
    }

    pub fn toast(message: impl Into<String>, mode: ToastMode) -> Self {
        Payload::Toast { message: message.into(), mode }
    }
}

/// One unit on a data channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Raw `0`: keepalive ping/pong.
    Ping,
    /// Raw `1`: join request, sent once when a connection opens.
    Join,
    Payload(Payload),
}

impl From<Payload> for Frame {
    fn from(p: Payload) -> Self {
        Frame::Payload(p)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown raw tick {0}")]
    UnknownTick(String),
    #[error("unknown message type {0:?}")]
    UnknownType(String),
    #[error("frame has no type discriminator")]
    MissingType,
}

impl ProtocolError {
    /// Unknown tags are expected from newer peers and are dropped quietly.
    pub fn is_unknown(&self) -> bool {
        matches!(self, ProtocolError::UnknownType(_) | ProtocolError::UnknownTick(_))
    }
}

impl Frame {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(match self {
            Frame::Ping => "0".to_string(),
            Frame::Join => "1".to_string(),
            Frame::Payload(p) => serde_json::to_string(p)?,
        })
    }

    pub fn decode(text: &str) -> Result<Frame, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        match &value {
            Value::Number(n) => match n.as_u64() {
                Some(0) => Ok(Frame::Ping),
                Some(1) => Ok(Frame::Join),
                _ => Err(ProtocolError::UnknownTick(n.to_string())),
            },
            Value::Object(map) => {
                let tag = map
                    .get("type")
                    .and_then(Value::as_str)
                    .ok_or(ProtocolError::MissingType)?;
                if !KNOWN_TYPES.contains(&tag) {
                    return Err(ProtocolError::UnknownType(tag.to_string()));
                }
                Ok(Frame::Payload(serde_json::from_value(value)?))
            }
            _ => Err(ProtocolError::MissingType),
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<CardId>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(CardId),
        Many(Vec<CardId>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(id) => vec![id],
        OneOrMany::Many(ids) => ids,
    })
}
