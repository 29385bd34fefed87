//! Deterministic deck service.
//!
//! Every peer holds an identical copy of the card pool. The host picks a seed
//! and broadcasts it; each peer runs the same seeded Fisher-Yates pass over its
//! own copy, so the orders agree without the pool ever being re-sent.

pub mod library;

use rand::{Error, RngCore, SeedableRng};
use rand::rngs::OsRng;

use crate::model::{Card, CardId, CardType, Cards};

pub use library::{CardLibrary, DeckError};

/// Mulberry32: one 32-bit word of state, bit-identical to the browser build.
#[derive(Debug, Clone)]
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }
}

impl RngCore for Mulberry32 {
    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x6D2B_79F5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }

    fn next_u64(&mut self) -> u64 {
        let lo = self.next_u32() as u64;
        let hi = self.next_u32() as u64;
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let word = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for Mulberry32 {
    type Seed = [u8; 4];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u32::from_le_bytes(seed))
    }
}

/// Seeded in-place shuffle: walk from the last index down to 1 and swap each
/// element with one at a uniformly chosen index `j <= i`.
pub fn shuffle<T>(items: &mut [T], seed: u32) {
    let mut rng = Mulberry32::new(seed);
    for i in (1..items.len()).rev() {
        // floor(u / 2^32 * (i + 1)), computed exactly in integers
        let j = ((rng.next_u32() as u64 * (i as u64 + 1)) >> 32) as usize;
        items.swap(i, j);
    }
}

/// Drop every card whose id appears in `ids`, keeping the order of the rest.
pub fn remove_by_ids(pool: &mut Vec<Card>, ids: &[CardId]) {
    pool.retain(|c| !ids.contains(&c.id));
}

/// A fresh seed, uniformly random over the full 32-bit range.
pub fn new_seed() -> u32 {
    OsRng.next_u32()
}

/// The working deck each peer keeps locally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deck {
    cards: Cards,
}

impl Deck {
    pub fn new(cards: Cards) -> Self {
        Self { cards }
    }

    pub fn cards(&self) -> &Cards {
        &self.cards
    }

    pub fn is_loaded(&self) -> bool {
        !self.cards.prompt.is_empty() || !self.cards.answer.is_empty()
    }

    pub fn clear(&mut self) {
        self.cards = Cards::default();
    }

    /// Answer and prompt piles are shuffled independently with the same seed.
    pub fn shuffle(&mut self, seed: u32) {
        shuffle(&mut self.cards.answer, seed);
        shuffle(&mut self.cards.prompt, seed);
    }

    pub fn remove(&mut self, card_type: CardType, ids: &[CardId]) {
        match card_type {
            CardType::Answer => remove_by_ids(&mut self.cards.answer, ids),
            CardType::Prompt => remove_by_ids(&mut self.cards.prompt, ids),
        }
    }

    pub fn prompt(&self, id: &str) -> Option<&Card> {
        self.cards.prompt.iter().find(|c| c.id == id)
    }

    pub fn first_prompt(&self) -> Option<&Card> {
        self.cards.prompt.first()
    }

    /// `count` answer ids starting at `offset` in the current order.
    pub fn answer_ids(&self, offset: usize, count: usize) -> Vec<CardId> {
        self.cards
            .answer
            .iter()
            .skip(offset)
            .take(count)
            .map(|c| c.id.clone())
            .collect()
    }

    /// Walk the answer pile in order and take the first `count` ids for which
    /// `available` holds.
    pub fn draw_answers<F>(&self, count: usize, mut available: F) -> Vec<CardId>
    where
        F: FnMut(&CardId) -> bool,
    {
        self.cards
            .answer
            .iter()
            .map(|c| &c.id)
            .filter(|id| available(*id))
            .take(count)
            .cloned()
            .collect()
    }
}
