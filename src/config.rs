//! Configuration utilities (ports, card directory, liveness timings, env vars)

use std::{env, net::{Ipv4Addr, SocketAddr}};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Session ids are always used network-side with this tag in front of the code.
pub const DEFAULT_PREFIX: &str = "DOD-";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub cards_dir: PathBuf,
    pub prefix: String,
    pub keepalive_interval: Duration,
    pub peer_timeout: Duration,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            cards_dir: PathBuf::from("./cards"),
            prefix: DEFAULT_PREFIX.to_string(),
            keepalive_interval: Duration::from_secs(5),
            peer_timeout: Duration::from_secs(10),
            reconnect_attempts: 3,
            reconnect_delay: Duration::from_millis(1000),
        }
    }
}

impl Config {
    /// Build the configuration from the environment, falling back to defaults
    /// for anything unset or unparsable.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            port: parsed("PORT").unwrap_or(d.port),
            cards_dir: env::var("DOD_CARDS_DIR").map(PathBuf::from).unwrap_or(d.cards_dir),
            prefix: env::var("DOD_PREFIX").unwrap_or(d.prefix),
            keepalive_interval: parsed("DOD_KEEPALIVE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(d.keepalive_interval),
            peer_timeout: parsed("DOD_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(d.peer_timeout),
            reconnect_attempts: parsed("DOD_RECONNECT_ATTEMPTS").unwrap_or(d.reconnect_attempts),
            reconnect_delay: parsed("DOD_RECONNECT_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.reconnect_delay),
        }
    }

    /// Socket address the host listens on: 0.0.0.0 and `PORT` (8080 by default).
    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }

    /// Network-side session id for a lobby code. Codes already carrying the
    /// prefix are returned unchanged.
    pub fn session_id(&self, code: &str) -> String {
        if code.starts_with(&self.prefix) {
            code.to_string()
        } else {
            format!("{}{}", self.prefix, code)
        }
    }

    /// Human-shareable lobby code with the prefix stripped.
    pub fn lobby_code<'a>(&self, session_id: &'a str) -> &'a str {
        session_id.strip_prefix(self.prefix.as_str()).unwrap_or(session_id)
    }
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
