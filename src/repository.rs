//! Persistence Boundary
//!
//! The narrow seam for everything durable: user records, match history,
//! ratings, leaderboards. Production backs this with whatever the deployment
//! runs (Postgres, DynamoDB, ...); the server only ever sees [`Repository`].

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::game::state::PlayerId;
use crate::network::auth::ResolvedUser;

/// A finished match's outcome, ready to persist.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// Match identifier.
    pub match_id: [u8; 16],
    /// Final tick.
    pub end_tick: u64,
    /// Placements, winner first.
    pub placements: Vec<(PlayerId, u32)>,
    /// Rating deltas applied.
    pub rating_deltas: Vec<(PlayerId, i32)>,
}

/// One leaderboard row.
#[derive(Debug, Clone)]
pub struct LeaderboardEntry {
    /// Player identifier.
    pub player_id: PlayerId,
    /// Display name at time of last update.
    pub display_name: String,
    /// Current rating.
    pub rating: i32,
}

/// Durable persistence. Implementors must be safe to call concurrently from
/// many match runtimes; the trait itself makes no ordering guarantee beyond
/// what a single call provides.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Resolve a previously-validated bearer token to a user record, for auth
    /// providers that need a repository round-trip instead of embedding claims.
    async fn get_user_by_token(&self, token: &str) -> Result<ResolvedUser, RepositoryError>;
    /// Look up a user by stable id.
    async fn get_user_by_id(&self, id: PlayerId) -> Result<ResolvedUser, RepositoryError>;
    /// Persist a match's static metadata at creation time.
    async fn save_match(&self, match_id: [u8; 16], player_ids: &[PlayerId]) -> Result<(), RepositoryError>;
    /// Persist a finished match's outcome.
    async fn save_match_result(&self, result: &MatchResult) -> Result<(), RepositoryError>;
    /// Apply a rating delta to a user, returning their new rating.
    async fn update_rating(&self, id: PlayerId, delta: i32) -> Result<i32, RepositoryError>;
    /// Fetch the top `limit` users by rating.
    async fn get_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, RepositoryError>;
}

/// Errors a [`Repository`] call can return.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RepositoryError {
    /// The requested entity does not exist.
    #[error("not found")]
    NotFound,
    /// The backing store could not be reached in time.
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// A concurrent write raced this one.
    #[error("conflict")]
    Conflict,
    /// Any other failure the caller should treat as non-retryable.
    #[error("internal: {0}")]
    Internal(String),
}

/// In-memory [`Repository`] for tests and local development. Not durable
/// across process restarts.
#[derive(Default)]
pub struct InMemoryRepository {
    users: Mutex<BTreeMap<PlayerId, ResolvedUser>>,
    matches: Mutex<BTreeMap<[u8; 16], Vec<PlayerId>>>,
    results: Mutex<Vec<MatchResult>>,
}

impl InMemoryRepository {
    /// Construct an empty repository, pre-seeded with `users` so tests don't
    /// need a live auth provider to exercise rating updates.
    pub fn new(users: Vec<ResolvedUser>) -> Self {
        let users = users.into_iter().map(|u| (u.user_id, u)).collect();
        Self { users: Mutex::new(users), matches: Mutex::new(BTreeMap::new()), results: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user_by_token(&self, _token: &str) -> Result<ResolvedUser, RepositoryError> {
        Err(RepositoryError::NotFound)
    }

    async fn get_user_by_id(&self, id: PlayerId) -> Result<ResolvedUser, RepositoryError> {
        self.users.lock().unwrap().get(&id).cloned().ok_or(RepositoryError::NotFound)
    }

    async fn save_match(&self, match_id: [u8; 16], player_ids: &[PlayerId]) -> Result<(), RepositoryError> {
        self.matches.lock().unwrap().insert(match_id, player_ids.to_vec());
        Ok(())
    }

    async fn save_match_result(&self, result: &MatchResult) -> Result<(), RepositoryError> {
        self.results.lock().unwrap().push(result.clone());
        Ok(())
    }

    async fn update_rating(&self, id: PlayerId, delta: i32) -> Result<i32, RepositoryError> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        user.rating += delta;
        Ok(user.rating)
    }

    async fn get_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, RepositoryError> {
        let users = self.users.lock().unwrap();
        let mut entries: Vec<LeaderboardEntry> = users
            .values()
            .map(|u| LeaderboardEntry { player_id: u.user_id, display_name: u.display_name.clone(), rating: u.rating })
            .collect();
        entries.sort_by(|a, b| b.rating.cmp(&a.rating));
        entries.truncate(limit);
        Ok(entries)
    }
}

/// Append-only fallback for match results that failed to persist to the
/// primary repository after retry. A background sweep drains this file back
/// into the repository once it recovers.
pub struct OutboxWriter {
    path: std::path::PathBuf,
}

impl OutboxWriter {
    /// Construct a writer targeting `path`.
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one failed match result as a JSON line.
    pub fn append(&self, result: &MatchResult) -> std::io::Result<()> {
        use std::io::Write;
        let placements: Vec<(String, u32)> =
            result.placements.iter().map(|(id, place)| (id.to_uuid_string(), *place)).collect();
        let deltas: Vec<(String, i32)> =
            result.rating_deltas.iter().map(|(id, delta)| (id.to_uuid_string(), *delta)).collect();
        let line = serde_json::json!({
            "match_id": hex::encode(result.match_id),
            "end_tick": result.end_tick,
            "placements": placements,
            "rating_deltas": deltas,
        });

        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(byte: u8, rating: i32) -> ResolvedUser {
        ResolvedUser { user_id: PlayerId::new([byte; 16]), display_name: format!("p{byte}"), rating }
    }

    #[tokio::test]
    async fn update_rating_persists_delta() {
        let repo = InMemoryRepository::new(vec![user(1, 1000)]);
        let new_rating = repo.update_rating(PlayerId::new([1; 16]), 25).await.unwrap();
        assert_eq!(new_rating, 1025);

        let fetched = repo.get_user_by_id(PlayerId::new([1; 16])).await.unwrap();
        assert_eq!(fetched.rating, 1025);
    }

    #[tokio::test]
    async fn leaderboard_sorts_descending_by_rating() {
        let repo = InMemoryRepository::new(vec![user(1, 900), user(2, 1500), user(3, 1200)]);
        let board = repo.get_leaderboard(10).await.unwrap();
        assert_eq!(board[0].rating, 1500);
        assert_eq!(board[1].rating, 1200);
        assert_eq!(board[2].rating, 900);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let repo = InMemoryRepository::new(vec![]);
        let result = repo.get_user_by_id(PlayerId::new([9; 16])).await;
        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }

    #[test]
    fn outbox_appends_one_json_line_per_result() {
        let dir = std::env::temp_dir().join(format!("skirmish-outbox-test-{}", std::process::id()));
        let writer = OutboxWriter::new(&dir);
        let result = MatchResult {
            match_id: [7; 16],
            end_tick: 100,
            placements: vec![(PlayerId::new([1; 16]), 1)],
            rating_deltas: vec![(PlayerId::new([1; 16]), 20)],
        };
        writer.append(&result).unwrap();
        let contents = std::fs::read_to_string(&dir).unwrap();
        assert_eq!(contents.lines().count(), 1);
        std::fs::remove_file(&dir).ok();
    }
}
