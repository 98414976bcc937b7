//! Game Events
//!
//! Transitions emitted by the round engine. Sessions forward them to
//! clients, which play the matching sound cue and drive navigation
//! (for example, leaving the game screen on [`GameEventData::GameOver`]).

use serde::{Serialize, Deserialize};
use crate::game::catalog::ItemId;

/// Final outcome of a game, reported once to the score sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreReport {
    /// Score when the last life was lost
    pub final_score: u32,
    /// Level when the last life was lost
    pub final_level: u32,
}

/// Why a life was lost.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissReason {
    /// The served selection did not equal the order
    WrongOrder,
    /// The countdown ran out
    Timeout,
}

/// Sound effect a client should play.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundCue {
    /// Any accepted button press (select, clear, serve)
    ButtonClick,
    /// Level increased
    PassLevel,
    /// Last life lost
    GameOver,
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameEventData {
    /// Engine was (re)started from scratch
    GameReset,

    /// A new order was drawn and the countdown restarted
    OrderGenerated {
        /// Items to serve, in order
        order: Vec<ItemId>,
        /// Seconds on the countdown
        time_limit: u32,
    },

    /// Player appended an item to the selection
    ItemSelected {
        /// Item that was added
        item_id: ItemId,
        /// Selection length after the add
        selection_len: usize,
    },

    /// Player emptied the selection
    SelectionCleared,

    /// Selection matched the order (the round was cleared)
    OrderServed {
        /// Points awarded
        points: u32,
        /// Score after the serve
        new_score: u32,
        /// Correct serves since the last level change
        streak: u32,
    },

    /// Enough correct serves in a row to advance
    LevelUp {
        /// Level reached
        new_level: u32,
        /// Order size at the new level
        order_size: usize,
    },

    /// Wrong serve or timeout
    LifeLost {
        /// What cost the life
        reason: MissReason,
        /// Lives left after the miss
        lives_remaining: u8,
    },

    /// No lives left
    GameOver {
        /// Final score and level
        report: ScoreReport,
    },
}

/// A game event tagged with the order it happened under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Order epoch at the time of the event
    pub epoch: u64,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(epoch: u64, data: GameEventData) -> Self {
        Self { epoch, data }
    }

    /// Create order generated event.
    pub fn order_generated(epoch: u64, order: Vec<ItemId>, time_limit: u32) -> Self {
        Self::new(epoch, GameEventData::OrderGenerated { order, time_limit })
    }

    /// Create item selected event.
    pub fn item_selected(epoch: u64, item_id: ItemId, selection_len: usize) -> Self {
        Self::new(epoch, GameEventData::ItemSelected { item_id, selection_len })
    }

    /// Create order served event.
    pub fn order_served(epoch: u64, points: u32, new_score: u32, streak: u32) -> Self {
        Self::new(epoch, GameEventData::OrderServed { points, new_score, streak })
    }

    /// Create level up event.
    pub fn level_up(epoch: u64, new_level: u32, order_size: usize) -> Self {
        Self::new(epoch, GameEventData::LevelUp { new_level, order_size })
    }

    /// Create life lost event.
    pub fn life_lost(epoch: u64, reason: MissReason, lives_remaining: u8) -> Self {
        Self::new(epoch, GameEventData::LifeLost { reason, lives_remaining })
    }

    /// Create game over event.
    pub fn game_over(epoch: u64, report: ScoreReport) -> Self {
        Self::new(epoch, GameEventData::GameOver { report })
    }

    /// Sound cue for this event, if any.
    pub fn sound_cue(&self) -> Option<SoundCue> {
        match &self.data {
            GameEventData::ItemSelected { .. }
            | GameEventData::SelectionCleared
            | GameEventData::OrderServed { .. } => Some(SoundCue::ButtonClick),
            GameEventData::LifeLost { reason: MissReason::WrongOrder, .. } => {
                Some(SoundCue::ButtonClick)
            }
            GameEventData::LevelUp { .. } => Some(SoundCue::PassLevel),
            GameEventData::GameOver { .. } => Some(SoundCue::GameOver),
            GameEventData::LifeLost { reason: MissReason::Timeout, .. }
            | GameEventData::GameReset
            | GameEventData::OrderGenerated { .. } => None,
        }
    }

    /// Final report if this is the game over event.
    pub fn score_report(&self) -> Option<ScoreReport> {
        match self.data {
            GameEventData::GameOver { report } => Some(report),
            _ => None,
        }
    }
}
