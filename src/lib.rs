//! # Café Manager Game Server
//!
//! Order-matching café game: a customer's order appears, the player picks
//! drinks and desserts from the menu in the same sequence and serves them
//! before the countdown runs out.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   CAFÉ MANAGER SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  └── rng.rs      - Seeded Xorshift128+ PRNG                  │
//! │                                                              │
//! │  game/           - Game rules (no I/O, no clocks)            │
//! │  ├── catalog.rs  - Drinks and desserts on the menu           │
//! │  ├── order.rs    - Orders, selections, order size by level   │
//! │  ├── state.rs    - Round state and snapshots                 │
//! │  ├── events.rs   - Transition events and sound cues          │
//! │  └── engine.rs   - Round state machine                       │
//! │                                                              │
//! │  store/          - Profiles and leaderboard                  │
//! │  ├── scores.rs   - In-memory / JSON file store               │
//! │  └── recorder.rs - Final score sink for signed-in players    │
//! │                                                              │
//! │  network/        - Async layer                               │
//! │  ├── auth.rs     - ID token validation                       │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── session.rs  - Per-game actor and countdown              │
//! │  └── server.rs   - WebSocket server                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Time
//!
//! The engine never reads a clock. The countdown is a series of explicit
//! ticks tagged with the order they belong to, so a tick that arrives
//! after the order changed is ignored.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod store;

// Re-export commonly used types
pub use core::rng::DeterministicRng;
pub use game::catalog::{Catalog, Item, ItemId};
pub use game::engine::{RoundEngine, RulesConfig, ScoreSink};
pub use game::events::ScoreReport;
pub use game::state::RoundSnapshot;
pub use store::ScoreStore;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Countdown per order, in seconds
pub const ROUND_SECONDS: u32 = 30;

/// Lives at the start of a game
pub const STARTING_LIVES: u8 = 3;

/// Points for a correctly served order
pub const POINTS_PER_SERVE: u32 = 20;

/// Correct serves needed to advance a level
pub const SERVES_PER_LEVEL: u32 = 5;

/// Items in an order at level 1
pub const BASE_ORDER_SIZE: usize = 2;

/// Largest order size
pub const MAX_ORDER_SIZE: usize = 5;

/// Levels between order size increments
pub const LEVELS_PER_SIZE_STEP: u32 = 3;
