//! Game State Machine and Round Timer.

pub mod engine;
pub mod timer;

use std::time::Duration;

pub use engine::{GameError, Phase, Table, STARTING_HAND};
pub use timer::{RoundTimer, Tick};

/// Pause between a settled judging and the next round (or game over).
pub const ROUND_SETTLE_DELAY: Duration = Duration::from_secs(5);
/// How long the czar has to pick before the round settles with no winner.
pub const CZAR_GRACE: Duration = Duration::from_secs(10);
/// Deliberate lag applied to `syncTime` corrections.
pub const TIME_SYNC_DELAY: Duration = Duration::from_secs(1);
/// Celebration pause before everyone is sent back to the lobby.
pub const GAME_OVER_DELAY: Duration = Duration::from_secs(3);
