//! Card pool loading.
//!
//! Edition files are JSON documents `{ name, white: [{text}], black: [{text, pick}] }`.
//! Card ids are derived from the edition name (spaces removed, lowercased),
//! the pile letter (`a`nswer / `p`rompt) and the card's index in its pile.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::model::{Card, Cards};

#[derive(thiserror::Error, Debug)]
pub enum DeckError {
    #[error("unknown card edition {0:?}")]
    UnknownEdition(String),
    #[error("failed to read edition file: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad edition file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
pub struct EditionFile {
    pub name: String,
    #[serde(default)]
    pub white: Vec<WhiteCard>,
    #[serde(default)]
    pub black: Vec<BlackCard>,
}

#[derive(Debug, Deserialize)]
pub struct WhiteCard {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct BlackCard {
    pub text: String,
    #[serde(default)]
    pub pick: Option<u32>,
}

fn id_stem(edition: &str) -> String {
    edition.replace(' ', "").to_lowercase()
}

impl EditionFile {
    pub fn into_cards(self) -> Cards {
        let stem = id_stem(&self.name);
        let answer = self
            .white
            .into_iter()
            .enumerate()
            .map(|(i, c)| Card { id: format!("{stem}a{i}"), text: c.text, min_pick: None })
            .collect();
        let prompt = self
            .black
            .into_iter()
            .enumerate()
            .map(|(i, c)| Card {
                id: format!("{stem}p{i}"),
                text: c.text,
                min_pick: Some(c.pick.unwrap_or(1)),
            })
            .collect();
        Cards { prompt, answer }
    }
}

/// All editions this peer can serve, keyed by edition name.
#[derive(Debug, Clone, Default)]
pub struct CardLibrary {
    editions: HashMap<String, Cards>,
}

impl CardLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, cards: Cards) {
        self.editions.insert(name.into(), cards);
    }

    pub fn add_edition(&mut self, file: EditionFile) {
        let name = file.name.clone();
        self.insert(name, file.into_cards());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.editions.contains_key(name)
    }

    /// Edition names in a stable order.
    pub fn sorted_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.editions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.editions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.editions.is_empty()
    }

    /// Load every `*.json` edition file in `dir`.
    pub async fn load_dir(dir: &Path) -> Result<Self, DeckError> {
        let mut lib = Self::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let text = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<EditionFile>(&text) {
                Ok(file) => {
                    tracing::debug!(path = %path.display(), edition = %file.name, "loaded edition");
                    lib.add_edition(file);
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "skipping unreadable edition");
                }
            }
        }
        Ok(lib)
    }

    /// Concatenate the named editions in order. Every peer calls this with the
    /// same pack list, so every peer starts from the same pool order.
    pub fn pool(&self, packs: &[String]) -> Result<Cards, DeckError> {
        let mut pool = Cards::default();
        for pack in packs {
            let cards = self
                .editions
                .get(pack)
                .ok_or_else(|| DeckError::UnknownEdition(pack.clone()))?;
            pool.prompt.extend(cards.prompt.iter().cloned());
            pool.answer.extend(cards.answer.iter().cloned());
        }
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edition(json: &str) -> EditionFile {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn ids_derive_from_edition_name() {
        let cards = edition(
            r#"{"name":"CAH Base Set","white":[{"text":"A"},{"text":"B"}],"black":[{"text":"_?","pick":2},{"text":"_."}]}"#,
        )
        .into_cards();
        assert_eq!(cards.answer[1].id, "cahbaseseta1");
        assert_eq!(cards.prompt[0].id, "cahbasesetp0");
        assert_eq!(cards.prompt[0].min_pick, Some(2));
        assert_eq!(cards.prompt[1].min_pick, Some(1));
    }

    #[test]
    fn pool_concatenates_in_pack_order() {
        let mut lib = CardLibrary::new();
        lib.add_edition(edition(r#"{"name":"One","white":[{"text":"x"}],"black":[]}"#));
        lib.add_edition(edition(r#"{"name":"Two","white":[{"text":"y"}],"black":[]}"#));
        let pool = lib.pool(&["Two".into(), "One".into()]).unwrap();
        let ids: Vec<_> = pool.answer.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["twoa0", "onea0"]);
        assert!(matches!(lib.pool(&["Nope".into()]), Err(DeckError::UnknownEdition(_))));
    }
}
