//! Round state machine. Pure mutation logic over a `Table`; the host decides,
//! every peer applies.

use std::collections::HashSet;

use crate::deck::Deck;
use crate::model::{CardId, GameState, PeerId, PlayedCard, Player, User};

/// Answer cards dealt to each player when the game starts.
pub const STARTING_HAND: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    Dealt,
    Answering,
    Judging,
    RoundSettled,
    GameOver,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("at least two players are needed")]
    NotEnoughPlayers,
    #[error("the deck has no prompt cards left")]
    NoPromptCards,
    #[error("the deck has too few answer cards to deal")]
    NotEnoughAnswers,
    #[error("unknown player {0}")]
    UnknownPlayer(PeerId),
    #[error("player {0} has no answer slot this round")]
    NoEntry(PeerId),
    #[error("card {0} is not in hand")]
    NotInHand(CardId),
    #[error("card {0} was not played")]
    NotPlayed(CardId),
    #[error("the czar cannot answer")]
    CzarCannotAnswer,
    #[error("answers are closed, the czar is choosing")]
    AnswersClosed,
    #[error("already played {0} card(s)")]
    PickLimit(u32),
    #[error("no judging in progress")]
    NotJudging,
    #[error("{0} submitted nothing")]
    EmptySubmission(PeerId),
    #[error("the game is over")]
    GameOver,
}

/// The replicated game: the round snapshot, the players and settled rounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub state: GameState,
    pub players: Vec<Player>,
    pub history: Vec<GameState>,
}

impl Table {
    pub fn new(state: GameState, players: Vec<Player>) -> Self {
        Self { state, players, history: Vec::new() }
    }

    /// Build the first round from the lobby roster. Player `i` receives the
    /// ten answer cards at `i * 10` in the shared shuffled order, so hands are
    /// disjoint. The first player judges first.
    pub fn deal(users: &[User], deck: &Deck, now: i64) -> Result<Table, GameError> {
        if users.len() < 2 {
            return Err(GameError::NotEnoughPlayers);
        }
        let prompt = deck.first_prompt().ok_or(GameError::NoPromptCards)?;
        let players: Vec<Player> = users
            .iter()
            .enumerate()
            .map(|(i, u)| Player {
                id: u.id.clone(),
                name: u.name.clone(),
                score: 0,
                cards: deck.answer_ids(i * STARTING_HAND, STARTING_HAND),
            })
            .collect();
        if players.iter().any(|p| p.cards.len() < STARTING_HAND) {
            return Err(GameError::NotEnoughAnswers);
        }
        let czar = players[0].id.clone();
        let state = GameState {
            round: 1,
            answer_cards: answer_slots(&players, &czar),
            czar,
            prompt_card: prompt.id.clone(),
            is_choosing: false,
            winner: None,
            overall_winner: String::new(),
            timestamp: now,
        };
        Ok(Table::new(state, players))
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn is_czar(&self, id: &str) -> bool {
        self.state.czar == id
    }

    /// Move `card_id` from the player's hand into their submission.
    pub fn play_card(&mut self, player_id: &str, card_id: &str, pick: u32) -> Result<(), GameError> {
        self.check_answering(player_id)?;
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == player_id)
            .ok_or_else(|| GameError::UnknownPlayer(player_id.to_string()))?;
        let pos = player
            .cards
            .iter()
            .position(|c| c == card_id)
            .ok_or_else(|| GameError::NotInHand(card_id.to_string()))?;
        let entry = self
            .state
            .answer_cards
            .iter_mut()
            .find(|e| e.player_id == player_id)
            .ok_or_else(|| GameError::NoEntry(player_id.to_string()))?;
        if entry.card_id.len() as u32 >= pick {
            return Err(GameError::PickLimit(pick));
        }
        let card = player.cards.remove(pos);
        entry.card_id.push(card);
        Ok(())
    }

    /// Take `card_id` back out of the submission and return it to the hand.
    pub fn cancel_card(&mut self, player_id: &str, card_id: &str) -> Result<(), GameError> {
        self.check_answering(player_id)?;
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == player_id)
            .ok_or_else(|| GameError::UnknownPlayer(player_id.to_string()))?;
        let entry = self
            .state
            .answer_cards
            .iter_mut()
            .find(|e| e.player_id == player_id)
            .ok_or_else(|| GameError::NoEntry(player_id.to_string()))?;
        let pos = entry
            .card_id
            .iter()
            .position(|c| c == card_id)
            .ok_or_else(|| GameError::NotPlayed(card_id.to_string()))?;
        let card = entry.card_id.remove(pos);
        player.cards.push(card);
        Ok(())
    }

    /// Bring `player_id`'s submission to `proposed` through the same moves a
    /// player would make: withdraw what is gone, then play what is new.
    /// Returns whether anything changed. Other players are never touched.
    pub fn apply_submission(
        &mut self,
        player_id: &str,
        proposed: &[CardId],
        pick: u32,
    ) -> Result<bool, GameError> {
        let current = self
            .state
            .entry(player_id)
            .map(|e| e.card_id.clone())
            .unwrap_or_default();
        let mut changed = false;
        for card in current.iter().filter(|c| !proposed.contains(c)) {
            self.cancel_card(player_id, card)?;
            changed = true;
        }
        for card in proposed.iter().filter(|c| !current.contains(c)) {
            self.play_card(player_id, card, pick)?;
            changed = true;
        }
        Ok(changed)
    }

    fn check_answering(&self, player_id: &str) -> Result<(), GameError> {
        if self.state.overall_winner().is_some() {
            return Err(GameError::GameOver);
        }
        if self.state.is_choosing {
            return Err(GameError::AnswersClosed);
        }
        if self.is_czar(player_id) {
            return Err(GameError::CzarCannotAnswer);
        }
        Ok(())
    }

    pub fn begin_judging(&mut self) -> Result<(), GameError> {
        if self.state.overall_winner().is_some() {
            return Err(GameError::GameOver);
        }
        if self.state.is_choosing {
            return Err(GameError::NotJudging);
        }
        self.state.is_choosing = true;
        Ok(())
    }

    /// Host-side check that `winner` is a legal pick: a known player with a
    /// non-empty submission. Returns the submitted card ids.
    pub fn submission_of(&self, winner: &str) -> Result<Vec<CardId>, GameError> {
        if !self.state.is_choosing {
            return Err(GameError::NotJudging);
        }
        self.player(winner).ok_or_else(|| GameError::UnknownPlayer(winner.to_string()))?;
        match self.state.entry(winner) {
            Some(e) if !e.card_id.is_empty() => Ok(e.card_id.clone()),
            _ => Err(GameError::EmptySubmission(winner.to_string())),
        }
    }

    /// Settle judging. A known winner scores a point and is recorded; an
    /// absent or unknown winner leaves `winner` empty. Either way judging ends
    /// and the round is appended to history. Returns the winner's name.
    pub fn choose_winner(
        &mut self,
        winner: Option<&str>,
        card_id: Option<Vec<CardId>>,
    ) -> Result<Option<String>, GameError> {
        if !self.state.is_choosing {
            return Err(GameError::NotJudging);
        }
        let mut name = None;
        if let Some(player) = winner.and_then(|w| self.players.iter_mut().find(|p| p.id == w)) {
            player.score += 1;
            let cards = match card_id {
                Some(cards) => cards,
                None => self
                    .state
                    .entry(&player.id)
                    .map(|e| e.card_id.clone())
                    .unwrap_or_default(),
            };
            self.state.winner = Some(PlayedCard { player_id: player.id.clone(), card_id: cards });
            name = Some(player.name.clone());
        }
        self.state.is_choosing = false;
        self.history.push(self.state.clone());
        Ok(name)
    }

    /// First player whose score has reached `max_score`.
    pub fn leader(&self, max_score: u32) -> Option<&Player> {
        self.players.iter().find(|p| p.score >= max_score)
    }

    /// Answer cards in play plus the prompt card: everything this round used up.
    pub fn spent_cards(&self) -> (Vec<CardId>, CardId) {
        let answers = self.state.cards_in_play().cloned().collect();
        (answers, self.state.prompt_card.clone())
    }

    /// Next round on a deck that has already had the spent cards removed and
    /// been reshuffled. The czar passes to the next player in order, wrapping;
    /// if the old czar has left, the first player takes over. Each player is
    /// topped up with as many fresh cards as the new prompt asks for, drawn in
    /// deck order and skipping anything already held.
    pub fn next_round(&self, deck: &Deck, now: i64) -> Result<Table, GameError> {
        if self.players.is_empty() {
            return Err(GameError::NotEnoughPlayers);
        }
        let prompt = deck.first_prompt().ok_or(GameError::NoPromptCards)?;
        let pick = prompt.pick() as usize;

        let czar_idx = self
            .players
            .iter()
            .position(|p| p.id == self.state.czar)
            .map(|i| (i + 1) % self.players.len())
            .unwrap_or(0);
        let czar = self.players[czar_idx].id.clone();

        let mut held: HashSet<CardId> = self
            .players
            .iter()
            .flat_map(|p| p.cards.iter().cloned())
            .chain(self.state.cards_in_play().cloned())
            .collect();
        let mut players = self.players.clone();
        for player in players.iter_mut() {
            let drawn = deck.draw_answers(pick, |id| !held.contains(id));
            held.extend(drawn.iter().cloned());
            player.cards.extend(drawn);
        }

        let state = GameState {
            round: self.state.round + 1,
            answer_cards: answer_slots(&players, &czar),
            czar,
            prompt_card: prompt.id.clone(),
            is_choosing: false,
            winner: None,
            overall_winner: String::new(),
            timestamp: now,
        };
        Ok(Table { state, players, history: self.history.clone() })
    }

    /// Seat a player coming back from the reconnection cache. When the seat
    /// was cached under `previous_id`, every reference the round holds to
    /// that id moves to the player's current id, so an answer already
    /// submitted stays theirs and no second slot is opened.
    pub fn reseat(&mut self, previous_id: &str, player: Player) {
        let id = player.id.clone();
        if previous_id != id {
            if let Some(entry) = self.state.entry_mut(previous_id) {
                entry.player_id = id.clone();
            }
            if self.state.czar == previous_id {
                self.state.czar = id.clone();
            }
            if let Some(winner) = self.state.winner.as_mut().filter(|w| w.player_id == previous_id) {
                winner.player_id = id.clone();
            }
            if self.state.overall_winner == previous_id {
                self.state.overall_winner = id.clone();
            }
        }
        if self.state.entry(&id).is_none() && !self.is_czar(&id) {
            self.state.answer_cards.push(PlayedCard::empty(id));
        }
        self.players.push(player);
    }

    /// Drop a departed player from the active list.
    pub fn remove_player(&mut self, id: &str) -> Option<Player> {
        let pos = self.players.iter().position(|p| p.id == id)?;
        Some(self.players.remove(pos))
    }
}

fn answer_slots(players: &[Player], czar: &str) -> Vec<PlayedCard> {
    players
        .iter()
        .filter(|p| p.id != czar)
        .map(|p| PlayedCard::empty(p.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Card, Cards};

    fn deck(prompts: &[u32], answers: usize) -> Deck {
        Deck::new(Cards {
            prompt: prompts
                .iter()
                .enumerate()
                .map(|(i, pick)| Card { id: format!("tp{i}"), text: "_".into(), min_pick: Some(*pick) })
                .collect(),
            answer: (0..answers)
                .map(|i| Card { id: format!("ta{i}"), text: format!("a{i}"), min_pick: None })
                .collect(),
        })
    }

    fn users(n: usize) -> Vec<User> {
        (0..n)
            .map(|i| User { id: format!("p{i}"), name: format!("n{i}"), is_host: i == 0, is_ready: true })
            .collect()
    }

    fn assert_hands_disjoint(table: &Table) {
        let mut seen = HashSet::new();
        for p in &table.players {
            for c in &p.cards {
                assert!(seen.insert(c.clone()), "card {c} held twice");
            }
        }
        for c in table.state.cards_in_play() {
            assert!(seen.insert(c.clone()), "card {c} both in hand and in play");
        }
    }

    #[test]
    fn deal_gives_disjoint_hands_and_czar_has_no_slot() {
        let table = Table::deal(&users(3), &deck(&[1], 40), 0).unwrap();
        assert_eq!(table.state.round, 1);
        assert_eq!(table.state.czar, "p0");
        assert_eq!(table.state.prompt_card, "tp0");
        assert_eq!(table.players[1].cards[0], "ta10");
        assert_eq!(table.state.answer_cards.len(), 2);
        assert!(table.state.entry("p0").is_none());
        assert_hands_disjoint(&table);
    }

    #[test]
    fn deal_needs_two_players_and_enough_cards() {
        assert_eq!(Table::deal(&users(1), &deck(&[1], 40), 0), Err(GameError::NotEnoughPlayers));
        assert_eq!(Table::deal(&users(3), &deck(&[1], 25), 0), Err(GameError::NotEnoughAnswers));
        assert_eq!(Table::deal(&users(2), &deck(&[], 25), 0), Err(GameError::NoPromptCards));
    }

    #[test]
    fn play_respects_pick_and_czar() {
        let mut table = Table::deal(&users(2), &deck(&[2], 30), 0).unwrap();
        assert_eq!(table.play_card("p0", "ta0", 2), Err(GameError::CzarCannotAnswer));
        table.play_card("p1", "ta10", 2).unwrap();
        table.play_card("p1", "ta11", 2).unwrap();
        assert_eq!(table.play_card("p1", "ta12", 2), Err(GameError::PickLimit(2)));
        assert_eq!(table.play_card("p1", "ta0", 2), Err(GameError::NotInHand("ta0".into())));
        assert_eq!(table.players[1].cards.len(), 8);
        assert_hands_disjoint(&table);

        table.cancel_card("p1", "ta10").unwrap();
        assert_eq!(table.state.entry("p1").unwrap().card_id, ["ta11"]);
        assert!(table.players[1].cards.contains(&"ta10".to_string()));
        assert_hands_disjoint(&table);
    }

    #[test]
    fn submission_diff_only_moves_the_senders_cards() {
        let mut table = Table::deal(&users(3), &deck(&[2], 40), 0).unwrap();
        table.play_card("p1", "ta10", 2).unwrap();
        assert!(table.apply_submission("p1", &["ta11".into(), "ta12".into()], 2).unwrap());
        assert_eq!(table.state.entry("p1").unwrap().card_id, ["ta11", "ta12"]);
        assert!(table.players[1].cards.contains(&"ta10".to_string()));
        assert!(!table.apply_submission("p1", &["ta11".into(), "ta12".into()], 2).unwrap());

        // someone else's card is not in p1's hand
        let mut copy = table.clone();
        assert_eq!(
            copy.apply_submission("p1", &["ta20".into()], 2),
            Err(GameError::NotInHand("ta20".into()))
        );
        assert_hands_disjoint(&table);
    }

    #[test]
    fn answers_close_when_judging() {
        let mut table = Table::deal(&users(2), &deck(&[1], 30), 0).unwrap();
        table.begin_judging().unwrap();
        assert_eq!(table.play_card("p1", "ta10", 1), Err(GameError::AnswersClosed));
        assert_eq!(table.begin_judging(), Err(GameError::NotJudging));
    }

    #[test]
    fn winner_scores_once() {
        let mut table = Table::deal(&users(2), &deck(&[1], 30), 0).unwrap();
        table.play_card("p1", "ta10", 1).unwrap();
        table.begin_judging().unwrap();
        assert_eq!(table.submission_of("p1").unwrap(), ["ta10"]);
        let name = table.choose_winner(Some("p1"), None).unwrap();
        assert_eq!(name.as_deref(), Some("n1"));
        assert_eq!(table.players[1].score, 1);
        assert_eq!(table.state.winner.as_ref().unwrap().card_id, ["ta10"]);
        assert_eq!(table.history.len(), 1);
        // a second delivery of the same decision changes nothing
        assert_eq!(table.choose_winner(Some("p1"), None), Err(GameError::NotJudging));
        assert_eq!(table.players[1].score, 1);
    }

    #[test]
    fn no_winner_skips_scoring() {
        let mut table = Table::deal(&users(2), &deck(&[1], 30), 0).unwrap();
        table.begin_judging().unwrap();
        assert_eq!(table.submission_of("p1"), Err(GameError::EmptySubmission("p1".into())));
        assert_eq!(table.choose_winner(None, None).unwrap(), None);
        assert!(table.state.winner.is_none());
        assert!(!table.state.is_choosing);
        assert!(table.players.iter().all(|p| p.score == 0));
    }

    #[test]
    fn next_round_rotates_czar_and_tops_up() {
        let mut d = deck(&[1, 2], 40);
        let mut table = Table::deal(&users(3), &d, 0).unwrap();
        table.play_card("p1", "ta10", 1).unwrap();
        table.begin_judging().unwrap();
        table.choose_winner(Some("p1"), None).unwrap();

        let (answers, prompt) = table.spent_cards();
        d.remove(crate::model::CardType::Answer, &answers);
        d.remove(crate::model::CardType::Prompt, &[prompt]);
        let next = table.next_round(&d, 1).unwrap();

        assert_eq!(next.state.round, 2);
        assert_eq!(next.state.czar, "p1");
        assert_eq!(next.state.prompt_card, "tp1");
        // new prompt asks for two, so everyone draws two
        assert_eq!(next.players[0].cards.len(), 12);
        assert_eq!(next.players[1].cards.len(), 11);
        assert_eq!(next.players[1].score, 1);
        assert!(next.state.entry("p1").is_none());
        assert!(next.state.answer_cards.iter().all(|e| e.card_id.is_empty()));
        assert_hands_disjoint(&next);
        assert_eq!(next.history.len(), 1);
    }

    #[test]
    fn czar_wraps_and_falls_back_to_first() {
        let d = deck(&[1, 1], 40);
        let mut table = Table::deal(&users(2), &d, 0).unwrap();
        table.state.czar = "p1".into();
        assert_eq!(table.next_round(&d, 0).unwrap().state.czar, "p0");
        table.state.czar = "gone".into();
        assert_eq!(table.next_round(&d, 0).unwrap().state.czar, "p0");
    }

    #[test]
    fn leader_reached_max_score() {
        let mut table = Table::deal(&users(2), &deck(&[1], 30), 0).unwrap();
        assert!(table.leader(1).is_none());
        table.players[1].score = 1;
        assert_eq!(table.leader(1).unwrap().id, "p1");
    }

    #[test]
    fn reseat_under_new_id_keeps_the_submission() {
        let mut table = Table::deal(&users(3), &deck(&[1], 40), 0).unwrap();
        table.play_card("p1", "ta10", 1).unwrap();
        let mut ann = table.remove_player("p1").unwrap();
        ann.id = "p1-new".into();
        table.reseat("p1", ann);

        assert_eq!(table.state.answer_cards.len(), 2);
        assert!(table.state.entry("p1").is_none());
        assert_eq!(table.state.entry("p1-new").unwrap().card_id, ["ta10"]);
        assert_eq!(table.play_card("p1-new", "ta11", 1), Err(GameError::PickLimit(1)));
        table.begin_judging().unwrap();
        assert_eq!(table.submission_of("p1-new").unwrap(), ["ta10"]);
    }

    #[test]
    fn reseat_moves_the_czar_seat() {
        let mut table = Table::deal(&users(3), &deck(&[1], 40), 0).unwrap();
        let mut czar = table.remove_player("p0").unwrap();
        czar.id = "p0-new".into();
        table.reseat("p0", czar);

        assert_eq!(table.state.czar, "p0-new");
        assert_eq!(table.state.answer_cards.len(), 2);
        assert!(table.state.entry("p0-new").is_none());
    }
}
