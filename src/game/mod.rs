//! Game Logic Module
//!
//! The round engine and everything it works on. No I/O, no clocks: time
//! arrives as explicit countdown ticks and randomness from a seeded RNG.
//!
//! ## Module Structure
//!
//! - `catalog`: The closed set of orderable items
//! - `order`: Orders, selections, order size by level
//! - `state`: Round state and snapshots
//! - `events`: Transition events, sound cues, score reports
//! - `engine`: The round state machine

pub mod catalog;
pub mod order;
pub mod state;
pub mod events;
pub mod engine;

// Re-export key types
pub use catalog::{Catalog, Category, Item, ItemId};
pub use order::{order_size, Order, Selection};
pub use state::{RoundPhase, RoundSnapshot, RoundState};
pub use events::{GameEvent, GameEventData, MissReason, ScoreReport, SoundCue};
pub use engine::{NullSink, RoundEngine, RulesConfig, ScoreSink, ServeOutcome, TickOutcome};
