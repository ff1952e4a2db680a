//! Connection Session Management
//!
//! Tracks one authenticated WebSocket connection: its outbound channel, rate
//! limiters, idle/reconnect timers. Match simulation state lives in the Match
//! Runtime, not here — a session only ever points at a match by id.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, RwLock};

use crate::game::state::PlayerId;
use crate::network::auth::ResolvedUser;
use crate::network::protocol::ServerMessage;

/// Unique per-connection session identifier.
pub type SessionId = [u8; 16];

/// Window a disconnected player may reconnect within and resume the same session.
pub const DISCONNECT_GRACE: Duration = Duration::from_secs(30);

/// Idle period with no inbound message (including heartbeats) before a session
/// is force-closed.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(20);

/// Connection liveness.
#[derive(Debug, Clone, Copy)]
pub enum ConnectionState {
    /// Actively connected; `last_seen` updated on every inbound message.
    Connected,
    /// Socket dropped; eligible to reconnect until `since + DISCONNECT_GRACE`.
    Disconnected {
        /// When the disconnect was observed.
        since: Instant,
    },
}

/// Fixed-window rate limiter: at most `limit` admissions per `period`.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    limit: u32,
    period: Duration,
    window_start: Instant,
    count: u32,
}

impl RateLimiter {
    /// Construct a limiter admitting up to `limit` events per `period`.
    pub fn new(limit: u32, period: Duration) -> Self {
        Self { limit, period, window_start: Instant::now(), count: 0 }
    }

    /// Attempt to admit one event now. Resets the window once `period` has elapsed.
    pub fn try_admit(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= self.period {
            self.window_start = now;
            self.count = 0;
        }
        if self.count >= self.limit {
            return false;
        }
        self.count += 1;
        true
    }
}

/// One authenticated connection.
pub struct ConnectedSession {
    /// Session identity, independent of the user's stable player id.
    pub id: SessionId,
    /// Resolved identity from the auth provider.
    pub user: ResolvedUser,
    /// Match this session is attached to, if any.
    pub match_id: Option<[u8; 16]>,
    /// Outbound message channel to the writer task.
    pub outbound: mpsc::Sender<ServerMessage>,
    /// Liveness state.
    pub connection_state: ConnectionState,
    /// Last time any inbound message (including heartbeats) was received.
    pub last_seen: Instant,
    /// Input message rate limiter.
    pub input_limiter: RateLimiter,
    /// Fire message rate limiter.
    pub fire_limiter: RateLimiter,
    /// Most recent round-trip estimate, in simulation ticks, used for lag compensation.
    pub rtt_ticks: u64,
}

impl ConnectedSession {
    /// Construct a freshly connected session.
    pub fn new(id: SessionId, user: ResolvedUser, outbound: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            user,
            match_id: None,
            outbound,
            connection_state: ConnectionState::Connected,
            last_seen: Instant::now(),
            input_limiter: RateLimiter::new(
                crate::game::input::INPUT_RATE_LIMIT,
                Duration::from_secs(1),
            ),
            fire_limiter: RateLimiter::new(crate::game::input::FIRE_RATE_LIMIT, Duration::from_secs(1)),
            rtt_ticks: 0,
        }
    }

    /// The stable player id this session authenticates as.
    pub fn player_id(&self) -> PlayerId {
        self.user.user_id
    }

    /// Record that any message was received, resetting the idle clock.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Mark the socket as dropped without discarding the session's state.
    pub fn mark_disconnected(&mut self) {
        self.connection_state = ConnectionState::Disconnected { since: Instant::now() };
    }

    /// Rebind a disconnected session to a new socket, if still within grace.
    pub fn reconnect(&mut self, outbound: mpsc::Sender<ServerMessage>) -> bool {
        if let ConnectionState::Disconnected { since } = self.connection_state {
            if since.elapsed() > DISCONNECT_GRACE {
                return false;
            }
        }
        self.outbound = outbound;
        self.connection_state = ConnectionState::Connected;
        self.touch();
        true
    }

    /// Whether this session has exceeded its reconnect grace window.
    pub fn is_expired(&self) -> bool {
        matches!(self.connection_state, ConnectionState::Disconnected { since } if since.elapsed() > DISCONNECT_GRACE)
    }

    /// Whether this session has gone idle past [`IDLE_TIMEOUT`].
    pub fn is_idle(&self) -> bool {
        self.last_seen.elapsed() > IDLE_TIMEOUT
    }
}

/// Registry of live connections, keyed by session id, with a secondary index
/// from player id so a reconnecting user can find (and evict) any prior session.
pub struct SessionRegistry {
    sessions: RwLock<BTreeMap<SessionId, Arc<RwLock<ConnectedSession>>>>,
    by_player: RwLock<BTreeMap<PlayerId, SessionId>>,
}

impl SessionRegistry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self { sessions: RwLock::new(BTreeMap::new()), by_player: RwLock::new(BTreeMap::new()) }
    }

    /// Insert a new session, evicting (and returning) any prior session for the same
    /// player so the caller can notify it of replacement before dropping it.
    pub async fn insert(
        &self,
        session: ConnectedSession,
    ) -> (SessionId, Option<Arc<RwLock<ConnectedSession>>>) {
        let id = session.id;
        let player_id = session.player_id();

        let mut sessions = self.sessions.write().await;
        let mut by_player = self.by_player.write().await;

        let previous_id = by_player.insert(player_id, id);
        let previous = previous_id.and_then(|prev_id| sessions.remove(&prev_id));

        sessions.insert(id, Arc::new(RwLock::new(session)));
        (id, previous)
    }

    /// Look up a session by id.
    pub async fn get(&self, id: &SessionId) -> Option<Arc<RwLock<ConnectedSession>>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Look up a session by player id.
    pub async fn get_by_player(&self, player_id: &PlayerId) -> Option<Arc<RwLock<ConnectedSession>>> {
        let session_id = *self.by_player.read().await.get(player_id)?;
        self.get(&session_id).await
    }

    /// Remove a session entirely (voluntary leave, or expired past grace).
    pub async fn remove(&self, id: &SessionId) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.remove(id) {
            let player_id = session.read().await.player_id();
            self.by_player.write().await.remove(&player_id);
        }
    }

    /// Sweep sessions that are disconnected past [`DISCONNECT_GRACE`], returning their ids.
    pub async fn sweep_expired(&self) -> Vec<SessionId> {
        let sessions = self.sessions.read().await;
        let mut expired = Vec::new();
        for (id, session) in sessions.iter() {
            if session.read().await.is_expired() {
                expired.push(*id);
            }
        }
        drop(sessions);
        for id in &expired {
            self.remove(id).await;
        }
        expired
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(byte: u8) -> ResolvedUser {
        ResolvedUser { user_id: PlayerId::new([byte; 16]), display_name: "p".into(), rating: 1000 }
    }

    #[test]
    fn rate_limiter_admits_up_to_limit_then_blocks() {
        let mut limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.try_admit());
        assert!(limiter.try_admit());
        assert!(limiter.try_admit());
        assert!(!limiter.try_admit());
    }

    #[test]
    fn reconnect_within_grace_succeeds() {
        let (tx, _rx) = mpsc::channel(8);
        let mut session = ConnectedSession::new([1; 16], user(1), tx);
        session.mark_disconnected();

        let (tx2, _rx2) = mpsc::channel(8);
        assert!(session.reconnect(tx2));
        assert!(matches!(session.connection_state, ConnectionState::Connected));
    }

    #[tokio::test]
    async fn inserting_second_session_for_same_player_evicts_first() {
        let registry = SessionRegistry::new();
        let (tx1, _rx1) = mpsc::channel(8);
        let (tx2, _rx2) = mpsc::channel(8);

        let (id1, evicted1) = registry.insert(ConnectedSession::new([1; 16], user(9), tx1)).await;
        assert!(evicted1.is_none());

        let (id2, evicted2) = registry.insert(ConnectedSession::new([2; 16], user(9), tx2)).await;
        assert!(evicted2.is_some());
        assert_eq!(registry.get(&id1).await.is_none(), true);
        assert!(registry.get(&id2).await.is_some());
    }

    #[tokio::test]
    async fn remove_clears_player_index() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel(8);
        let (id, _) = registry.insert(ConnectedSession::new([1; 16], user(3), tx)).await;

        registry.remove(&id).await;
        assert!(registry.get_by_player(&PlayerId::new([3; 16])).await.is_none());
    }
}
