//! ID utilities (lobby codes, peer ids, chat message ids).

use rand::{Rng, seq::SliceRandom};
use time::OffsetDateTime;
use ulid::Ulid;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const CODE_LEN: usize = 6;

/// Generate a six-character uppercase alphanumeric lobby code.
pub fn new_lobby_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .filter_map(|_| CODE_ALPHABET.choose(&mut rng))
        .map(|b| char::from(*b))
        .collect()
}

/// Check that `code` looks like something `new_lobby_code` produced.
pub fn is_valid_lobby_code(code: &str) -> bool {
    code.len() == CODE_LEN && code.bytes().all(|b| CODE_ALPHABET.contains(&b))
}

/// Generate a peer id for a dialing client. Stable for the lifetime of the process.
pub fn new_peer_id() -> String {
    Ulid::new().to_string()
}

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Chat message id: millisecond timestamp with a random low-order suffix so two
/// peers typing in the same millisecond don't dedupe each other away.
pub fn new_message_id() -> u64 {
    let millis = now_millis().max(0) as u64;
    millis * 1000 + rand::thread_rng().gen_range(0..1000)
}
