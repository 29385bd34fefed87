//! Local user intents, parsed from console lines.

use std::str::FromStr;

use crate::model::{CardId, PeerId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub max_players: Option<usize>,
    pub max_score: Option<u32>,
    pub round_time: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Chat(String),
    Ready(bool),
    PlayCard(CardId),
    CancelCard(CardId),
    /// `None` passes on every submission.
    ChooseWinner(Option<PeerId>),
    StartGame,
    /// Peer id or display name.
    Kick(String),
    Configure(SettingsPatch),
    TogglePack(String),
    CancelGame,
    ForceJudging,
    Leave,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("{0} needs an argument")]
    MissingArgument(&'static str),
    #[error("bad setting {0:?}, expected players=N, score=N or time=N")]
    BadSetting(String),
    #[error("unknown command {0}")]
    Unknown(String),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Command::Chat(line.to_string()));
        };
        let (verb, arg) = match rest.split_once(char::is_whitespace) {
            Some((v, a)) => (v, a.trim()),
            None => (rest, ""),
        };
        let required = |name: &'static str| {
            if arg.is_empty() {
                Err(CommandError::MissingArgument(name))
            } else {
                Ok(arg.to_string())
            }
        };
        Ok(match verb {
            "start" => Command::StartGame,
            "ready" => Command::Ready(!matches!(arg, "off" | "no" | "false")),
            "unready" => Command::Ready(false),
            "play" => Command::PlayCard(required("/play")?),
            "cancel" => Command::CancelCard(required("/cancel")?),
            "win" => Command::ChooseWinner((!arg.is_empty()).then(|| arg.to_string())),
            "kick" => Command::Kick(required("/kick")?),
            "pack" => Command::TogglePack(required("/pack")?),
            "settings" => Command::Configure(parse_patch(arg)?),
            "abort" => Command::CancelGame,
            "end" => Command::ForceJudging,
            "quit" => Command::Leave,
            other => return Err(CommandError::Unknown(other.to_string())),
        })
    }
}

fn parse_patch(arg: &str) -> Result<SettingsPatch, CommandError> {
    let mut patch = SettingsPatch::default();
    for pair in arg.split_whitespace() {
        let bad = || CommandError::BadSetting(pair.to_string());
        let (key, value) = pair.split_once('=').ok_or_else(bad)?;
        match key {
            "players" => patch.max_players = Some(value.parse().map_err(|_| bad())?),
            "score" => patch.max_score = Some(value.parse().map_err(|_| bad())?),
            "time" => patch.round_time = Some(value.parse().map_err(|_| bad())?),
            _ => return Err(bad()),
        }
    }
    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_chat() {
        assert_eq!("hello all".parse::<Command>(), Ok(Command::Chat("hello all".into())));
    }

    #[test]
    fn slash_commands() {
        assert_eq!("/play basea4".parse::<Command>(), Ok(Command::PlayCard("basea4".into())));
        assert_eq!("/win".parse::<Command>(), Ok(Command::ChooseWinner(None)));
        assert_eq!("/ready off".parse::<Command>(), Ok(Command::Ready(false)));
        assert_eq!("/play".parse::<Command>(), Err(CommandError::MissingArgument("/play")));
        assert!(matches!("/dance".parse::<Command>(), Err(CommandError::Unknown(_))));
    }

    #[test]
    fn settings_patch() {
        let cmd: Command = "/settings players=5 time=60".parse().unwrap();
        assert_eq!(
            cmd,
            Command::Configure(SettingsPatch { max_players: Some(5), max_score: None, round_time: Some(60) })
        );
        assert!("/settings speed=3".parse::<Command>().is_err());
    }
}
