//! Lobby directory: who is connected, who is ready, who was kicked.

use std::collections::HashSet;

use crate::model::{PeerId, User};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("display name {0:?} already taken")]
    NameTaken(String),
    #[error("lobby full")]
    Full,
}

impl AdmissionError {
    /// Text sent to the rejected connection before it is closed.
    pub fn remote_message(&self) -> &'static str {
        match self {
            AdmissionError::NameTaken(_) => "Your username is already taken by someone in the lobby",
            AdmissionError::Full => "Lobby is already full",
        }
    }

    /// Text shown to the host.
    pub fn host_notice(&self) -> String {
        match self {
            AdmissionError::NameTaken(name) => {
                format!("Someone tried to join with the same username as \"{name}\"")
            }
            AdmissionError::Full => "Someone tried to join but the lobby is already full".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LobbyDirectory {
    users: Vec<User>,
    kicked: HashSet<PeerId>,
}

impl LobbyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roster seeded with the host, who is always ready.
    pub fn with_host(id: impl Into<PeerId>, name: impl Into<String>) -> Self {
        let mut lobby = Self::new();
        lobby.upsert(User { id: id.into(), name: name.into(), is_host: true, is_ready: true });
        lobby
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn name_taken(&self, name: &str) -> bool {
        self.users.iter().any(|u| u.name == name)
    }

    pub fn check_admission(&self, name: &str, max_players: usize) -> Result<(), AdmissionError> {
        if self.name_taken(name) {
            return Err(AdmissionError::NameTaken(name.to_string()));
        }
        if self.users.len() >= max_players {
            return Err(AdmissionError::Full);
        }
        Ok(())
    }

    /// Add a freshly admitted, not-yet-ready user.
    pub fn admit(&mut self, id: impl Into<PeerId>, name: impl Into<String>) {
        let id = id.into();
        self.kicked.remove(&id);
        self.upsert(User { id, name: name.into(), is_host: false, is_ready: false });
    }

    /// Insert or replace by id, keeping first-seen order.
    pub fn upsert(&mut self, user: User) {
        match self.users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = user,
            None => self.users.push(user),
        }
    }

    pub fn merge(&mut self, users: impl IntoIterator<Item = User>) {
        for user in users {
            self.upsert(user);
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<User> {
        let pos = self.users.iter().position(|u| u.id == id)?;
        Some(self.users.remove(pos))
    }

    pub fn set_ready(&mut self, id: &str, ready: bool) -> Option<&User> {
        let user = self.users.iter_mut().find(|u| u.id == id)?;
        user.is_ready = ready;
        Some(&*user)
    }

    /// A game can start once more than one user is present and all are ready.
    pub fn all_ready(&self) -> bool {
        self.users.len() > 1 && self.users.iter().all(|u| u.is_ready)
    }

    pub fn mark_kicked(&mut self, id: impl Into<PeerId>) {
        self.kicked.insert(id.into());
    }

    pub fn was_kicked(&self, id: &str) -> bool {
        self.kicked.contains(id)
    }

    pub fn clear(&mut self) {
        self.users.clear();
        self.kicked.clear();
    }
}
