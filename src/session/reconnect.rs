//! Reconnection Cache: in-game data of players whose channel dropped.
//!
//! Entries are consumed by a successful rejoin and dropped wholesale when the
//! game ends or is cancelled. There is no time-based expiry.

use std::collections::HashMap;

use crate::model::{PeerId, Player};

/// A cached seat handed back to a rejoining peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reclaimed {
    /// Id the seat was cached under. Differs from `player.id` after a name match.
    pub previous_id: PeerId,
    pub player: Player,
}

impl Reclaimed {
    pub fn rekeyed(&self) -> bool {
        self.previous_id != self.player.id
    }
}

#[derive(Debug, Default)]
pub struct ReconnectionCache {
    entries: HashMap<PeerId, Player>,
}

impl ReconnectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&mut self, player: Player) {
        tracing::debug!(peer = %player.id, name = %player.name, "caching departed player");
        self.entries.insert(player.id.clone(), player);
    }

    /// Claim the entry for a rejoining peer: matched by peer id first, then by
    /// display name. The returned player carries `peer` as its id.
    pub fn take(&mut self, peer: &str, name: &str) -> Option<Reclaimed> {
        let key = if self.entries.contains_key(peer) {
            peer.to_string()
        } else {
            self.entries.values().find(|p| p.name == name)?.id.clone()
        };
        let mut player = self.entries.remove(&key)?;
        player.id = peer.to_string();
        Some(Reclaimed { previous_id: key, player })
    }

    pub fn contains(&self, peer: &str) -> bool {
        self.entries.contains_key(peer)
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!(evicted = self.entries.len(), "reconnection cache cleared");
        }
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: &str, name: &str) -> Player {
        Player { id: id.into(), name: name.into(), score: 2, cards: vec!["pack-a0".into(), "pack-a3".into()] }
    }

    #[test]
    fn take_by_id_consumes_entry() {
        let mut cache = ReconnectionCache::new();
        cache.store(player("p1", "ann"));
        let Reclaimed { previous_id, player: p } = cache.take("p1", "ann").unwrap();
        assert_eq!(previous_id, "p1");
        assert_eq!(p.cards, ["pack-a0", "pack-a3"]);
        assert_eq!(p.score, 2);
        assert!(cache.is_empty());
        assert!(cache.take("p1", "ann").is_none());
    }

    #[test]
    fn take_falls_back_to_name_and_rekeys() {
        let mut cache = ReconnectionCache::new();
        cache.store(player("old", "ann"));
        assert!(cache.take("new", "bob").is_none());
        let seat = cache.take("new", "ann").unwrap();
        assert_eq!(seat.player.id, "new");
        assert_eq!(seat.previous_id, "old");
        assert!(seat.rekeyed());
    }
}
