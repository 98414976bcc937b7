//! Player profiles and the leaderboard.
//!
//! - [`ScoreStore`]: profiles and scores, in memory or backed by a JSON file
//! - [`ScoreRecorder`]: the engine's score sink for a signed-in player

pub mod models;
pub mod recorder;
pub mod scores;

pub use models::{PlayerScore, StatsUpdate, UserProfile};
pub use recorder::{record_score, ScoreRecorder};
pub use scores::{ScoreStore, StoreError};
