//! Round State Definitions
//!
//! The aggregate mutated by the round engine, and the immutable snapshot
//! published to observers after every mutation.

use serde::{Serialize, Deserialize};

use crate::game::catalog::Item;
use crate::game::order::{Order, Selection};

// =============================================================================
// ROUND PHASE
// =============================================================================

/// Stable phase of the engine.
///
/// Clearing a round and losing a life are transient: they pass straight
/// back to `Active` (or on to `GameOver`) within the same operation and
/// only show up as events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Accepting selections, countdown running
    #[default]
    Active,
    /// No lives left; waits for an explicit reset
    GameOver,
}

// =============================================================================
// ROUND STATE
// =============================================================================

/// Complete state of one game.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundState {
    /// Accumulated score
    pub score: u32,

    /// Lives left (starts at 3)
    pub lives: u8,

    /// Current level (starts at 1, unbounded)
    pub level: u32,

    /// Seconds left on the countdown
    pub time_remaining: u32,

    /// Correct serves since the last level up
    pub correct_streak: u32,

    /// What the customer wants
    pub order: Order,

    /// What the player has picked so far
    pub selection: Selection,

    /// Active or game over
    pub phase: RoundPhase,

    /// Bumped on every new order; countdown ticks carry it
    pub order_epoch: u64,

    /// Whether the final score has been handed to the sink
    pub reported: bool,
}

impl RoundState {
    /// Fresh state before the first order is drawn.
    pub fn new(starting_lives: u8, round_seconds: u32) -> Self {
        Self {
            score: 0,
            lives: starting_lives,
            level: 1,
            time_remaining: round_seconds,
            correct_streak: 0,
            order: Order::default(),
            selection: Selection::default(),
            phase: RoundPhase::Active,
            order_epoch: 0,
            reported: false,
        }
    }

    /// Check if the game has ended.
    pub fn is_game_over(&self) -> bool {
        matches!(self.phase, RoundPhase::GameOver)
    }

    /// Check if the engine accepts input.
    pub fn is_active(&self) -> bool {
        matches!(self.phase, RoundPhase::Active)
    }

    /// Read-only copy for rendering.
    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            score: self.score,
            lives: self.lives,
            level: self.level,
            time_remaining: self.time_remaining,
            correct_streak: self.correct_streak,
            order: self.order.items().to_vec(),
            selection: self.selection.items().to_vec(),
            phase: self.phase,
            order_epoch: self.order_epoch,
        }
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Immutable view of a [`RoundState`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    /// Accumulated score
    pub score: u32,
    /// Lives left
    pub lives: u8,
    /// Current level
    pub level: u32,
    /// Seconds left on the countdown
    pub time_remaining: u32,
    /// Correct serves since the last level up
    pub correct_streak: u32,
    /// Target order
    pub order: Vec<Item>,
    /// Current selection
    pub selection: Vec<Item>,
    /// Active or game over
    pub phase: RoundPhase,
    /// Order epoch
    pub order_epoch: u64,
}
