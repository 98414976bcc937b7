//! Stored records.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// A registered player's profile with their best results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Chosen at registration
    pub username: String,
    /// From the identity provider, if it shared one
    pub email: Option<String>,
    /// Best final score
    pub highest_score: u32,
    /// Best final level
    pub highest_level: u32,
    /// Registration time
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// Fresh profile with no results yet.
    pub fn new(username: String, email: Option<String>) -> Self {
        Self {
            username,
            email,
            highest_score: 0,
            highest_level: 0,
            created_at: Utc::now(),
        }
    }
}

/// One leaderboard entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerScore {
    /// Entry id
    pub doc_id: String,
    /// Owner's uid
    pub user_id: String,
    /// Name shown on the leaderboard
    pub player_name: String,
    /// Final score of the game
    pub score: u32,
    /// When the game ended
    pub recorded_at: DateTime<Utc>,
}

/// Which profile fields an update raised.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsUpdate {
    /// `highest_score` was raised
    pub score_raised: bool,
    /// `highest_level` was raised
    pub level_raised: bool,
}

impl StatsUpdate {
    /// Whether anything changed.
    pub fn changed(&self) -> bool {
        self.score_raised || self.level_raised
    }
}
