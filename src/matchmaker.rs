//! Matchmaker
//!
//! Rating-based queue with sliding tolerance expansion. Runs as a single poll
//! task, cancelled cooperatively via [`CancellationToken`], that scans the
//! queue at a fixed cadence and groups tickets into matches once enough
//! players fall within each other's tolerance band.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::game::state::PlayerId;
use crate::store::{EphemeralStore, QueueEntrySnapshot};

/// Cadence the matchmaker scans the queue at.
pub const MATCH_POLL: Duration = Duration::from_secs(1);

/// A queued player's ticket.
#[derive(Debug, Clone)]
pub struct QueueTicket {
    /// Player identifier.
    pub player_id: PlayerId,
    /// Rating at enqueue time.
    pub rating: i32,
    /// When the ticket was enqueued.
    pub queued_at: Instant,
    /// Channel the matchmaker notifies with status changes.
    pub notify: mpsc::Sender<MatchmakingStatus>,
}

/// Status pushed to a ticket's owner as matchmaking progresses.
#[derive(Debug, Clone)]
pub enum MatchmakingStatus {
    /// Still searching; current tolerance band, for client-side display.
    Searching {
        /// Current rating tolerance.
        tolerance: i32,
    },
    /// A match has been formed.
    Found {
        /// Match identifier assigned by the registry.
        match_id: [u8; 16],
        /// All players placed into the match, including this one.
        player_ids: Vec<PlayerId>,
    },
    /// The ticket was withdrawn by its owner.
    Cancelled,
    /// The ticket exceeded [`AppConfig::queue_timeout_sec`] without forming a match.
    TimedOut,
}

/// Errors returned by [`Matchmaker`] operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MatchmakerError {
    /// Player already has a ticket in the queue.
    #[error("already queued")]
    AlreadyQueued,
    /// Player has no ticket in the queue.
    #[error("not queued")]
    NotQueued,
}

/// Rating-tolerance-expanding FIFO matchmaker.
///
/// Tickets are kept in a local map for the poll loop's fast path, and
/// mirrored into the shared [`EphemeralStore`] so any matchmaker instance in
/// a multi-node deployment sees the same queue.
pub struct Matchmaker {
    config: AppConfig,
    store: Arc<dyn EphemeralStore>,
    tickets: Mutex<BTreeMap<PlayerId, QueueTicket>>,
    on_match_formed: Box<dyn Fn(Vec<PlayerId>) -> [u8; 16] + Send + Sync>,
}

impl Matchmaker {
    /// Construct a matchmaker. `on_match_formed` is called synchronously with
    /// the players chosen for a match and must return the match id the
    /// registry assigned it.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn EphemeralStore>,
        on_match_formed: impl Fn(Vec<PlayerId>) -> [u8; 16] + Send + Sync + 'static,
    ) -> Self {
        Self { config, store, tickets: Mutex::new(BTreeMap::new()), on_match_formed: Box::new(on_match_formed) }
    }

    /// Enqueue a player. Mirrors the ticket into the shared store so other
    /// matchmaker instances see it on their next poll.
    pub async fn enqueue(
        &self,
        player_id: PlayerId,
        rating: i32,
        notify: mpsc::Sender<MatchmakingStatus>,
    ) -> Result<(), MatchmakerError> {
        let mut tickets = self.tickets.lock().await;
        if tickets.contains_key(&player_id) {
            return Err(MatchmakerError::AlreadyQueued);
        }
        let queued_at = Instant::now();
        tickets.insert(player_id, QueueTicket { player_id, rating, queued_at, notify });
        drop(tickets);

        let _ = self.store.queue_upsert(QueueEntrySnapshot { player_id, rating, queued_at }).await;
        Ok(())
    }

    /// Withdraw a player's ticket.
    pub async fn withdraw(&self, player_id: PlayerId) -> Result<(), MatchmakerError> {
        let removed = self.tickets.lock().await.remove(&player_id);
        if removed.is_none() {
            return Err(MatchmakerError::NotQueued);
        }
        let _ = self.store.queue_remove(player_id).await;
        Ok(())
    }

    /// Current tolerance band for a ticket that has been queued for `elapsed`.
    fn tolerance_at(&self, elapsed: Duration) -> i32 {
        let steps = (elapsed.as_secs() / self.config.growth_step_sec) as i32;
        (self.config.base_tol + steps * self.config.growth_rate).min(self.config.max_tol)
    }

    /// One scan of the queue: expire timed-out tickets, then sweep a
    /// rating-sorted sliding window across the remainder to form matches.
    async fn scan_once(&self) {
        let mut tickets = self.tickets.lock().await;
        let now = Instant::now();
        let queue_timeout = Duration::from_secs(self.config.queue_timeout_sec);

        let timed_out: Vec<PlayerId> = tickets
            .values()
            .filter(|t| now.duration_since(t.queued_at) > queue_timeout)
            .map(|t| t.player_id)
            .collect();
        for player_id in &timed_out {
            if let Some(ticket) = tickets.remove(player_id) {
                let _ = ticket.notify.send(MatchmakingStatus::TimedOut).await;
                let _ = self.store.queue_remove(*player_id).await;
            }
        }

        let min_players = self.config.min_players as usize;
        let max_players = self.config.max_players as usize;
        let force_after = Duration::from_secs(self.config.force_match_sec);

        if tickets.len() >= min_players {
            // Sorted by rating ascending so the window's spread is just the
            // difference between its two ends; ties broken by earliest
            // enqueued_at, then player id for full determinism.
            let mut ordered: Vec<PlayerId> = tickets.keys().copied().collect();
            ordered.sort_by_key(|id| {
                let ticket = &tickets[id];
                (ticket.rating, ticket.queued_at, *id)
            });

            let mut start = 0usize;
            while start < ordered.len() {
                let mut end = start;
                let mut oldest_in_window = tickets[&ordered[start]].queued_at;

                loop {
                    let next = end + 1;
                    if next >= ordered.len() || next - start + 1 > max_players {
                        break;
                    }
                    let candidate_oldest = oldest_in_window.min(tickets[&ordered[next]].queued_at);
                    let tolerance = self.tolerance_at(now.duration_since(candidate_oldest));
                    let spread = tickets[&ordered[next]].rating - tickets[&ordered[start]].rating;
                    if spread <= tolerance {
                        end = next;
                        oldest_in_window = candidate_oldest;
                    } else {
                        break;
                    }
                }

                let window_size = end - start + 1;
                let oldest_elapsed = now.duration_since(oldest_in_window);
                let should_form =
                    window_size >= max_players || (window_size >= min_players && oldest_elapsed >= force_after);

                if should_form {
                    let player_ids: Vec<PlayerId> = ordered[start..=end].to_vec();
                    let match_id = (self.on_match_formed)(player_ids.clone());

                    for id in &player_ids {
                        if let Some(ticket) = tickets.remove(id) {
                            let _ = ticket
                                .notify
                                .send(MatchmakingStatus::Found { match_id, player_ids: player_ids.clone() })
                                .await;
                            let _ = self.store.queue_remove(*id).await;
                        }
                    }
                    info!(match_id = %hex::encode(match_id), players = player_ids.len(), "match formed");
                    start = end + 1;
                } else {
                    start += 1;
                }
            }
        }

        for (idx, ticket) in tickets.values().enumerate() {
            if idx > 64 {
                break; // avoid paging every idle searcher on a large queue each scan
            }
            let tolerance = self.tolerance_at(now.duration_since(ticket.queued_at));
            let _ = ticket.notify.send(MatchmakingStatus::Searching { tolerance }).await;
        }
    }

    /// Run the poll loop until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(MATCH_POLL);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.scan_once().await;
                }
                _ = cancel.cancelled() => {
                    debug!("matchmaker poll loop stopping");
                    break;
                }
            }
        }
    }

    /// Number of tickets currently queued locally.
    pub async fn queue_len(&self) -> usize {
        self.tickets.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config() -> AppConfig {
        AppConfig { min_players: 2, max_players: 4, base_tol: 100, growth_rate: 50, growth_step_sec: 30, max_tol: 500, ..Default::default() }
    }

    #[tokio::test]
    async fn forms_a_match_once_min_players_within_tolerance() {
        let formed = Arc::new(AtomicU32::new(0));
        let formed_clone = formed.clone();
        let matchmaker = Matchmaker::new(config(), Arc::new(InMemoryStore::new()), move |_players| {
            formed_clone.fetch_add(1, Ordering::SeqCst);
            [9u8; 16]
        });

        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        matchmaker.enqueue(PlayerId::new([1; 16]), 1000, tx1).await.unwrap();
        matchmaker.enqueue(PlayerId::new([2; 16]), 1020, tx2).await.unwrap();

        matchmaker.scan_once().await;

        assert_eq!(formed.load(Ordering::SeqCst), 1);
        assert!(matches!(rx1.recv().await, Some(MatchmakingStatus::Found { .. })));
        assert!(matches!(rx2.recv().await, Some(MatchmakingStatus::Found { .. })));
        assert_eq!(matchmaker.queue_len().await, 0);
    }

    #[tokio::test]
    async fn distant_ratings_stay_queued_until_tolerance_grows() {
        let matchmaker = Matchmaker::new(config(), Arc::new(InMemoryStore::new()), |_| [0u8; 16]);
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, _rx2) = mpsc::channel(8);
        matchmaker.enqueue(PlayerId::new([1; 16]), 1000, tx1).await.unwrap();
        matchmaker.enqueue(PlayerId::new([2; 16]), 1500, tx2).await.unwrap();

        matchmaker.scan_once().await;
        assert_eq!(matchmaker.queue_len().await, 2);
        assert!(matches!(rx1.recv().await, Some(MatchmakingStatus::Searching { .. })));
    }

    #[tokio::test]
    async fn withdraw_removes_ticket() {
        let matchmaker = Matchmaker::new(config(), Arc::new(InMemoryStore::new()), |_| [0u8; 16]);
        let (tx, _rx) = mpsc::channel(8);
        let player = PlayerId::new([1; 16]);
        matchmaker.enqueue(player, 1000, tx).await.unwrap();
        matchmaker.withdraw(player).await.unwrap();
        assert_eq!(matchmaker.queue_len().await, 0);
        assert!(matches!(matchmaker.withdraw(player).await, Err(MatchmakerError::NotQueued)));
    }
}
