//! Network Layer
//!
//! WebSocket server for real-time multiplayer communication.
//! This layer is **non-deterministic** - all game logic runs through `game/`.

pub mod auth;
pub mod interest;
pub mod protocol;
pub mod server;
pub mod session;

pub use auth::{validate_token, AuthConfig, AuthError, AuthProvider, JwtAuthProvider, ResolvedUser, TokenClaims};
pub use interest::{InterestManager, InterestState};
pub use protocol::{ClientMessage, EventPayload, ServerMessage, SnapshotPayload};
pub use server::{GameServer, GameServerError, ServerHandle};
pub use session::{ConnectedSession, RateLimiter, SessionId, SessionRegistry};
