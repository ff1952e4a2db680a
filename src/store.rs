//! Ephemeral Shared State
//!
//! The narrow seam for state that must be visible across server processes but
//! doesn't need durability: presence, the matchmaking queue mirror, a cached
//! leaderboard, rate-limit counters. Production backs this with Redis or
//! similar; the server only ever sees [`EphemeralStore`].

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::game::state::PlayerId;
use crate::repository::LeaderboardEntry;

/// Errors an [`EphemeralStore`] call can return.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The store did not respond within its configured timeout.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A queued matchmaking ticket as mirrored into the shared store, so any
/// matchmaker instance can see the full queue.
#[derive(Debug, Clone)]
pub struct QueueEntrySnapshot {
    /// Player identifier.
    pub player_id: PlayerId,
    /// Rating at enqueue time.
    pub rating: i32,
    /// When this ticket was enqueued.
    pub queued_at: Instant,
}

/// Shared ephemeral state, independent of any one server process.
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Record a session's presence, keyed by session id.
    async fn session_set(&self, session_id: [u8; 16], player_id: PlayerId) -> Result<(), StoreError>;
    /// Look up which player owns a session id.
    async fn session_get(&self, session_id: [u8; 16]) -> Result<Option<PlayerId>, StoreError>;
    /// Remove a session's presence record.
    async fn session_delete(&self, session_id: [u8; 16]) -> Result<(), StoreError>;

    /// Upsert a player's matchmaking ticket into the shared queue mirror.
    async fn queue_upsert(&self, entry: QueueEntrySnapshot) -> Result<(), StoreError>;
    /// Remove a player's ticket from the shared queue mirror.
    async fn queue_remove(&self, player_id: PlayerId) -> Result<(), StoreError>;
    /// Number of tickets currently mirrored.
    async fn queue_size(&self) -> Result<usize, StoreError>;
    /// A snapshot of all mirrored tickets, for reconciliation after a restart.
    async fn queue_snapshot(&self) -> Result<Vec<QueueEntrySnapshot>, StoreError>;

    /// Replace the cached leaderboard.
    async fn leaderboard_set(&self, entries: Vec<LeaderboardEntry>) -> Result<(), StoreError>;
    /// Read the top `limit` cached leaderboard entries.
    async fn leaderboard_top(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError>;

    /// Increment a named rate-limit counter and return its value after the increment.
    /// Counters reset when `window` has elapsed since the first increment.
    async fn rate_limit_inc(&self, key: &str, window: Duration) -> Result<u32, StoreError>;
}

#[derive(Default)]
struct Counter {
    window_start: Instant,
    count: u32,
}

/// In-process [`EphemeralStore`] for tests and single-node development.
pub struct InMemoryStore {
    sessions: Mutex<BTreeMap<[u8; 16], PlayerId>>,
    queue: Mutex<BTreeMap<PlayerId, QueueEntrySnapshot>>,
    leaderboard: Mutex<Vec<LeaderboardEntry>>,
    counters: Mutex<BTreeMap<String, Counter>>,
}

impl InMemoryStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(BTreeMap::new()),
            queue: Mutex::new(BTreeMap::new()),
            leaderboard: Mutex::new(Vec::new()),
            counters: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EphemeralStore for InMemoryStore {
    async fn session_set(&self, session_id: [u8; 16], player_id: PlayerId) -> Result<(), StoreError> {
        self.sessions.lock().unwrap().insert(session_id, player_id);
        Ok(())
    }

    async fn session_get(&self, session_id: [u8; 16]) -> Result<Option<PlayerId>, StoreError> {
        Ok(self.sessions.lock().unwrap().get(&session_id).copied())
    }

    async fn session_delete(&self, session_id: [u8; 16]) -> Result<(), StoreError> {
        self.sessions.lock().unwrap().remove(&session_id);
        Ok(())
    }

    async fn queue_upsert(&self, entry: QueueEntrySnapshot) -> Result<(), StoreError> {
        self.queue.lock().unwrap().insert(entry.player_id, entry);
        Ok(())
    }

    async fn queue_remove(&self, player_id: PlayerId) -> Result<(), StoreError> {
        self.queue.lock().unwrap().remove(&player_id);
        Ok(())
    }

    async fn queue_size(&self) -> Result<usize, StoreError> {
        Ok(self.queue.lock().unwrap().len())
    }

    async fn queue_snapshot(&self) -> Result<Vec<QueueEntrySnapshot>, StoreError> {
        Ok(self.queue.lock().unwrap().values().cloned().collect())
    }

    async fn leaderboard_set(&self, entries: Vec<LeaderboardEntry>) -> Result<(), StoreError> {
        *self.leaderboard.lock().unwrap() = entries;
        Ok(())
    }

    async fn leaderboard_top(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let board = self.leaderboard.lock().unwrap();
        Ok(board.iter().take(limit).cloned().collect())
    }

    async fn rate_limit_inc(&self, key: &str, window: Duration) -> Result<u32, StoreError> {
        let mut counters = self.counters.lock().unwrap();
        let now = Instant::now();
        let counter = counters.entry(key.to_string()).or_insert_with(|| Counter { window_start: now, count: 0 });
        if now.duration_since(counter.window_start) >= window {
            counter.window_start = now;
            counter.count = 0;
        }
        counter.count += 1;
        Ok(counter.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_roundtrips() {
        let store = InMemoryStore::new();
        let player = PlayerId::new([1; 16]);
        store.session_set([1; 16], player).await.unwrap();
        assert_eq!(store.session_get([1; 16]).await.unwrap(), Some(player));
        store.session_delete([1; 16]).await.unwrap();
        assert_eq!(store.session_get([1; 16]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn queue_upsert_and_remove() {
        let store = InMemoryStore::new();
        let player = PlayerId::new([2; 16]);
        store.queue_upsert(QueueEntrySnapshot { player_id: player, rating: 1000, queued_at: Instant::now() }).await.unwrap();
        assert_eq!(store.queue_size().await.unwrap(), 1);
        store.queue_remove(player).await.unwrap();
        assert_eq!(store.queue_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rate_limit_counter_resets_after_window() {
        let store = InMemoryStore::new();
        let first = store.rate_limit_inc("k", Duration::from_millis(10)).await.unwrap();
        assert_eq!(first, 1);
        let second = store.rate_limit_inc("k", Duration::from_millis(10)).await.unwrap();
        assert_eq!(second, 2);

        tokio::time::sleep(Duration::from_millis(15)).await;
        let after_reset = store.rate_limit_inc("k", Duration::from_millis(10)).await.unwrap();
        assert_eq!(after_reset, 1);
    }
}
