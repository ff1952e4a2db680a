//! Match Registry
//!
//! Thin routing layer between connections and match runtimes. The registry
//! itself never touches a [`World`](crate::game::state::World) — it only
//! knows how to reach the task that does. Resolving "which match is this
//! player in" and "how do I hand this input to that match" are the only two
//! questions it answers.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crate::game::state::PlayerId;
use crate::runtime::RuntimeInput;

/// Handle to a running match, held by the registry and by the matchmaker
/// callback that created it.
#[derive(Clone)]
pub struct MatchHandle {
    /// Match identifier.
    pub match_id: [u8; 16],
    /// Channel into the match's single-writer runtime task.
    pub input_tx: mpsc::Sender<RuntimeInput>,
    /// Members at creation time, for reconciliation after a crash/restart.
    pub players: Arc<[PlayerId]>,
}

/// Errors returned by registry operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// No match is registered under the given id, or the player has none attached.
    #[error("match not found")]
    MatchNotFound,
    /// The match's runtime task has already exited; its input channel is closed.
    #[error("match runtime is no longer accepting input")]
    RuntimeGone,
}

/// Process-wide routing table from match id / player id to a running match.
pub struct MatchRegistry {
    matches: RwLock<BTreeMap<[u8; 16], MatchHandle>>,
    by_player: RwLock<BTreeMap<PlayerId, [u8; 16]>>,
}

impl MatchRegistry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self { matches: RwLock::new(BTreeMap::new()), by_player: RwLock::new(BTreeMap::new()) }
    }

    /// Register a newly spawned match's handle and attach all its members.
    pub async fn create_match(&self, handle: MatchHandle) {
        let mut by_player = self.by_player.write().await;
        for player_id in handle.players.iter() {
            by_player.insert(*player_id, handle.match_id);
        }
        drop(by_player);
        self.matches.write().await.insert(handle.match_id, handle);
    }

    /// Attach a reconnecting session to a match it was already a member of.
    pub async fn attach_session(&self, player_id: PlayerId, match_id: [u8; 16]) {
        self.by_player.write().await.insert(player_id, match_id);
    }

    /// Remove a player's routing entry (disconnect or match end). Does not
    /// touch the match itself; the runtime decides independently when to end.
    pub async fn detach_session(&self, player_id: PlayerId) {
        self.by_player.write().await.remove(&player_id);
    }

    /// Forward an input frame to the match the player is currently routed to.
    pub async fn route_input(&self, player_id: PlayerId, input: RuntimeInput) -> Result<(), RegistryError> {
        let match_id = self.match_of(player_id).await.ok_or(RegistryError::MatchNotFound)?;
        let handle = self.matches.read().await.get(&match_id).cloned().ok_or(RegistryError::MatchNotFound)?;
        handle.input_tx.send(input).await.map_err(|_| RegistryError::RuntimeGone)
    }

    /// Look up the match id a player is currently attached to.
    pub async fn match_of(&self, player_id: PlayerId) -> Option<[u8; 16]> {
        self.by_player.read().await.get(&player_id).copied()
    }

    /// Drop a finished match's handle. Any sessions still pointing at it are
    /// left to detach on their own next lifecycle event.
    pub async fn remove_match(&self, match_id: [u8; 16]) {
        self.matches.write().await.remove(&match_id);
    }

    /// Number of matches currently tracked.
    pub async fn match_count(&self) -> usize {
        self.matches.read().await.len()
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(byte: u8) -> PlayerId {
        PlayerId([byte; 16])
    }

    #[tokio::test]
    async fn route_input_reaches_the_attached_match() {
        let registry = MatchRegistry::new();
        let (tx, mut rx) = mpsc::channel(8);
        let players: Arc<[PlayerId]> = Arc::from(vec![pid(1), pid(2)]);
        registry.create_match(MatchHandle { match_id: [1; 16], input_tx: tx, players }).await;

        registry.route_input(pid(1), RuntimeInput::Disconnect { player_id: pid(1) }).await.unwrap();
        assert!(matches!(rx.recv().await, Some(RuntimeInput::Disconnect { .. })));
    }

    #[tokio::test]
    async fn routing_to_an_unattached_player_fails() {
        let registry = MatchRegistry::new();
        let result = registry.route_input(pid(9), RuntimeInput::Disconnect { player_id: pid(9) }).await;
        assert!(matches!(result, Err(RegistryError::MatchNotFound)));
    }

    #[tokio::test]
    async fn detach_then_route_fails() {
        let registry = MatchRegistry::new();
        let (tx, _rx) = mpsc::channel(8);
        let players: Arc<[PlayerId]> = Arc::from(vec![pid(1)]);
        registry.create_match(MatchHandle { match_id: [2; 16], input_tx: tx, players }).await;
        registry.detach_session(pid(1)).await;
        let result = registry.route_input(pid(1), RuntimeInput::Disconnect { player_id: pid(1) }).await;
        assert!(matches!(result, Err(RegistryError::MatchNotFound)));
    }
}
