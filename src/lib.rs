//! Host-authoritative peer-to-peer card party game.
//!
//! One peer hosts the lobby and owns the game; the others dial in over
//! WebSockets and mirror whatever the host broadcasts.

pub mod config;
pub mod deck;
pub mod game;
pub mod lobby;
pub mod model;
pub mod net;
pub mod protocol;
pub mod session;
pub mod telemetry;
pub mod util;
