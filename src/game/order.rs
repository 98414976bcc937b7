//! Orders and Selections
//!
//! An [`Order`] is what the customer asked for; a [`Selection`] is what the
//! player has picked so far. Serving compares the two as sequences.

use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;
use crate::game::catalog::{Catalog, Item, ItemId};
use crate::{BASE_ORDER_SIZE, LEVELS_PER_SIZE_STEP, MAX_ORDER_SIZE};

/// Number of items in an order at `level`, with the game's default rules.
///
/// `min(5, 2 + (level - 1) / 3)`: levels 1-3 ask for 2 items, 4-6 for 3,
/// and from level 10 on every order has 5.
pub fn order_size(level: u32) -> usize {
    order_size_for(level, BASE_ORDER_SIZE, MAX_ORDER_SIZE, LEVELS_PER_SIZE_STEP)
}

/// Order size with explicit growth parameters.
pub fn order_size_for(level: u32, base: usize, max: usize, levels_per_step: u32) -> usize {
    let steps = level.saturating_sub(1) / levels_per_step.max(1);
    base.saturating_add(steps as usize).min(max)
}

/// Sample a fresh order of `size` distinct catalog items.
pub fn generate_order(catalog: &Catalog, rng: &mut DeterministicRng, size: usize) -> Order {
    Order(rng.sample(catalog.items(), size))
}

/// Target sequence of items for the current round.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Order(Vec<Item>);

impl Order {
    /// Create an order from an explicit item sequence.
    pub fn new(items: Vec<Item>) -> Self {
        Self(items)
    }

    /// Items in required sequence.
    pub fn items(&self) -> &[Item] {
        &self.0
    }

    /// Item ids in required sequence.
    pub fn ids(&self) -> Vec<ItemId> {
        self.0.iter().map(|item| item.id).collect()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the order is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sequence equality: same items, same positions, same count.
    pub fn is_matched_by(&self, selection: &Selection) -> bool {
        self.0.len() == selection.0.len()
            && self.0.iter().zip(&selection.0).all(|(want, got)| want.id == got.id)
    }
}

/// The player's in-progress pick list. Append-only until cleared.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection(Vec<Item>);

impl Selection {
    /// Append an item.
    pub fn push(&mut self, item: Item) {
        self.0.push(item);
    }

    /// Remove all items.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Items in pick order.
    pub fn items(&self) -> &[Item] {
        &self.0
    }

    /// Number of items picked.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing has been picked.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Item> for Selection {
    fn from_iter<I: IntoIterator<Item = Item>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
