//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket. Every
//! message is a JSON text frame tagged by `"type"`.

use serde::{Serialize, Deserialize};

use crate::game::catalog::{Item, ItemId};
use crate::game::events::{GameEvent, ScoreReport, SoundCue};
use crate::game::state::RoundSnapshot;
use crate::store::{PlayerScore, UserProfile};

/// Leaderboard size when the client does not ask for one.
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;

/// Largest leaderboard a client may request.
pub const MAX_LEADERBOARD_LIMIT: usize = 100;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Sign in with a provider ID token.
    Auth {
        /// Provider-issued JWT
        token: String,
    },

    /// Create the signed-in player's profile.
    Register {
        /// Name to show in the profile
        username: String,
    },

    /// Start a new game, or restart the current one.
    Start,

    /// Add a catalog item to the selection.
    Select {
        /// Catalog id of the item
        item_id: ItemId,
    },

    /// Empty the selection.
    ClearSelection,

    /// Serve the current selection.
    Serve,

    /// Request the full menu.
    GetCatalog,

    /// Request the signed-in player's profile.
    GetProfile,

    /// Request the top scores.
    GetLeaderboard {
        /// Number of entries; defaults to 10, capped at 100
        #[serde(default)]
        limit: Option<usize>,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client clock, echoed back
        timestamp: u64,
    },

    /// End the current game and disconnect.
    Leave,
}

/// Clamp a requested leaderboard size.
pub fn leaderboard_limit(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
        .min(MAX_LEADERBOARD_LIMIT)
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication result.
    AuthResult(AuthResult),

    /// The full menu.
    Catalog {
        /// Every item, in id order
        items: Vec<Item>,
    },

    /// Round state after a change.
    State(RoundSnapshot),

    /// Game event notification.
    Event(GameEvent),

    /// Sound effect to play.
    Sound {
        /// Effect to play
        cue: SoundCue,
    },

    /// The game ended; the client should leave the game screen.
    GameOver(ScoreReport),

    /// The signed-in player's profile.
    Profile(UserProfile),

    /// Top scores, highest first.
    Leaderboard {
        /// Entries, highest first
        scores: Vec<PlayerScore>,
    },

    /// Error message.
    Error(ServerError),

    /// Pong response.
    Pong {
        /// Timestamp from the ping
        timestamp: u64,
        /// Server clock in milliseconds since the Unix epoch
        server_time: u64,
    },
}

/// Authentication result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether auth succeeded.
    pub success: bool,
    /// Leaderboard name if successful.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub player_name: Option<String>,
    /// Error message if failed.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

/// Error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Create an error message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed message, binary frame or unknown item.
    InvalidInput,
    /// The request needs a signed-in player.
    NotAuthenticated,
    /// Profile does not exist.
    NotFound,
    /// Profile already exists.
    AlreadyExists,
    /// Server-side failure.
    Internal,
}

// =============================================================================
// SERIALIZATION
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Shorthand for an error message.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError::new(code, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::catalog::Catalog;
    use crate::game::events::{GameEventData, MissReason};
    use crate::game::state::RoundState;

    #[test]
    fn test_client_message_wire_names() {
        let cases = [
            (r#"{"type":"auth","token":"abc"}"#, ClientMessage::Auth { token: "abc".into() }),
            (r#"{"type":"start"}"#, ClientMessage::Start),
            (r#"{"type":"select","item_id":7}"#, ClientMessage::Select { item_id: 7 }),
            (r#"{"type":"clear_selection"}"#, ClientMessage::ClearSelection),
            (r#"{"type":"serve"}"#, ClientMessage::Serve),
            (r#"{"type":"get_catalog"}"#, ClientMessage::GetCatalog),
            (r#"{"type":"get_profile"}"#, ClientMessage::GetProfile),
            (r#"{"type":"leave"}"#, ClientMessage::Leave),
        ];

        for (json, expected) in cases {
            assert_eq!(ClientMessage::from_json(json).unwrap(), expected, "{}", json);
        }
    }

    #[test]
    fn test_client_message_json_roundtrip() {
        let msg = ClientMessage::Register { username: "barista".into() };
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"register\""));
        assert_eq!(ClientMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_leaderboard_limit_optional() {
        let msg = ClientMessage::from_json(r#"{"type":"get_leaderboard"}"#).unwrap();
        assert_eq!(msg, ClientMessage::GetLeaderboard { limit: None });

        let msg = ClientMessage::from_json(r#"{"type":"get_leaderboard","limit":3}"#).unwrap();
        assert_eq!(msg, ClientMessage::GetLeaderboard { limit: Some(3) });
    }

    #[test]
    fn test_leaderboard_limit_clamped() {
        assert_eq!(leaderboard_limit(None), DEFAULT_LEADERBOARD_LIMIT);
        assert_eq!(leaderboard_limit(Some(5)), 5);
        assert_eq!(leaderboard_limit(Some(10_000)), MAX_LEADERBOARD_LIMIT);
    }

    #[test]
    fn test_unknown_message_rejected() {
        assert!(ClientMessage::from_json(r#"{"type":"teleport"}"#).is_err());
        assert!(ClientMessage::from_json(r#"{"type":"select"}"#).is_err());
        assert!(ClientMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_state_message_json_roundtrip() {
        let catalog = Catalog::cafe_menu();
        let mut state = RoundState::new(3, 30);
        state.selection.push(catalog.get(3).unwrap().clone());
        state.score = 40;

        let msg = ServerMessage::State(state.snapshot());
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"state\""));
        assert!(json.contains("\"phase\":\"active\""));

        assert_eq!(ServerMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_event_message_nests_kind() {
        let msg = ServerMessage::Event(GameEvent::life_lost(4, MissReason::Timeout, 2));
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"event\""));
        assert!(json.contains("\"kind\":\"life_lost\""));
        assert!(json.contains("\"reason\":\"timeout\""));

        match ServerMessage::from_json(&json).unwrap() {
            ServerMessage::Event(event) => {
                assert_eq!(event.epoch, 4);
                assert!(matches!(event.data, GameEventData::LifeLost { lives_remaining: 2, .. }));
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_game_over_and_sound() {
        let msg = ServerMessage::GameOver(ScoreReport { final_score: 180, final_level: 2 });
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"game_over\""));
        assert!(json.contains("\"final_score\":180"));

        let msg = ServerMessage::Sound { cue: SoundCue::PassLevel };
        assert_eq!(msg.to_json().unwrap(), r#"{"type":"sound","cue":"pass_level"}"#);
    }

    #[test]
    fn test_error_codes() {
        let msg = ServerMessage::error(ErrorCode::AlreadyExists, "Profile exists");
        let json = msg.to_json().unwrap();
        assert!(json.contains("already_exists"));

        let msg = ServerMessage::error(ErrorCode::NotAuthenticated, "Sign in first");
        assert!(msg.to_json().unwrap().contains("not_authenticated"));
    }

    #[test]
    fn test_auth_result_omits_empty_fields() {
        let msg = ServerMessage::AuthResult(AuthResult {
            success: true,
            player_name: Some("Barista".into()),
            error: None,
        });
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"player_name\":\"Barista\""));
        assert!(!json.contains("\"error\""));
        assert_eq!(ServerMessage::from_json(&json).unwrap(), msg);
    }
}
