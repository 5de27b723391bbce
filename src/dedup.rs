//! Per-keyword dedup and accumulation.
//!
//! `KeywordResult` is the ordered set of unique cards for one keyword.
//! Accumulation is first-seen-wins: a card whose id is already present is
//! discarded whole, no field merge. The scroll loop accumulates after every
//! extraction pass, so partial progress survives a later pagination failure.
//!
//! There is deliberately no cross-keyword dedup — "found under keyword X" is
//! part of what the output records, so the same note may appear under two
//! keywords, once each.

use std::collections::HashSet;

use crate::core::types::Card;

#[derive(Debug, Default)]
pub struct KeywordResult {
    cards: Vec<Card>,
    seen: HashSet<String>,
}

impl KeywordResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold newly extracted cards in, preserving first-seen field values and
    /// insertion order. Returns how many cards were actually new — the scroll
    /// driver's idle-termination signal.
    pub fn accumulate<I>(&mut self, extracted: I) -> usize
    where
        I: IntoIterator<Item = Card>,
    {
        let mut added = 0;
        for card in extracted {
            if self.seen.insert(card.id.clone()) {
                self.cards.push(card);
                added += 1;
            }
        }
        added
    }

    /// Derived, never stored independently: always equals the set size.
    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Mutable access for the enrichment pass; ids are never changed there.
    pub fn cards_mut(&mut self) -> &mut [Card] {
        &mut self.cards
    }

    pub fn into_cards(self) -> Vec<Card> {
        self.cards
    }
}
