//! Network Layer
//!
//! WebSocket server, sign-in and per-connection game sessions. Game rules
//! live in `game/`; this layer only schedules and relays them.

pub mod auth;
pub mod protocol;
pub mod session;
pub mod server;

pub use auth::{authenticate, validate_token, AuthConfig, AuthError, PlayerId, TokenClaims, UserIdentity};
pub use protocol::{ClientMessage, ErrorCode, ServerError, ServerMessage};
pub use session::{GameSession, SessionContext, SessionError, SessionFeed, SessionId};
pub use server::{GameServer, GameServerError, ServerConfig};
