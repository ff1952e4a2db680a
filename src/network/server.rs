//! WebSocket Game Server
//!
//! Accepts connections, authenticates them, and wires each into the
//! matchmaker or an existing match. Everything stateful beyond one
//! connection's own bookkeeping — the queue, the authoritative world, the
//! routing table — lives in [`Matchmaker`], [`MatchRuntime`], and
//! [`MatchRegistry`]; this module is the glue between a raw socket and those.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::AppConfig;
use crate::game::state::PlayerId;
use crate::matchmaker::{Matchmaker, MatchmakingStatus};
use crate::network::auth::{AuthError, AuthProvider};
use crate::network::protocol::{AuthErrorReason, ClientMessage, ServerMessage};
use crate::network::session::{ConnectedSession, SessionId, SessionRegistry};
use crate::registry::{MatchHandle, MatchRegistry};
use crate::repository::{OutboxWriter, Repository};
use crate::runtime::{MatchRuntime, RuntimeInput};

/// Errors that can prevent the server from starting or running.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind the game-port listener.
    #[error("failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),
}

/// Everything a running match needs to be assembled, minus the players
/// themselves (resolved just before spawn, since a ticket only carries ids).
struct MatchBuildRequest {
    match_id: [u8; 16],
    player_ids: Vec<PlayerId>,
}

/// The game server: owns the listener, the matchmaker, and the routing
/// tables shared by every connection.
pub struct GameServer {
    config: AppConfig,
    auth: Arc<dyn AuthProvider>,
    repository: Arc<dyn Repository>,
    outbox: Arc<OutboxWriter>,
    sessions: Arc<SessionRegistry>,
    registry: Arc<MatchRegistry>,
    matchmaker: Arc<Matchmaker>,
    build_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<MatchBuildRequest>>>,
}

impl GameServer {
    /// Construct a server over the given adapters. Call [`GameServer::spawn`]
    /// to actually start accepting connections.
    pub fn new(
        config: AppConfig,
        auth: Arc<dyn AuthProvider>,
        repository: Arc<dyn Repository>,
        store: Arc<dyn crate::store::EphemeralStore>,
        outbox: Arc<OutboxWriter>,
    ) -> Arc<Self> {
        let sessions = Arc::new(SessionRegistry::new());
        let registry = Arc::new(MatchRegistry::new());

        let (build_tx, build_rx) = mpsc::unbounded_channel();
        // `on_match_formed` must be synchronous (the matchmaker calls it while
        // holding its ticket lock), so it only mints an id and hands the
        // player list to the builder task below, which does the actual async
        // session lookups and `MatchRuntime::spawn`.
        let matchmaker = Arc::new(Matchmaker::new(config.clone(), store, move |player_ids| {
            let match_id = *uuid::Uuid::new_v4().as_bytes();
            let _ = build_tx.send(MatchBuildRequest { match_id, player_ids });
            match_id
        }));

        Arc::new(Self {
            config,
            auth,
            repository,
            outbox,
            sessions,
            registry,
            matchmaker,
            build_rx: tokio::sync::Mutex::new(Some(build_rx)),
        })
    }

    /// Bind the game-port listener and spawn the accept loop, the matchmaker
    /// poll loop, and the match-builder task. Returns a handle the caller
    /// uses to drive a graceful shutdown.
    #[instrument(skip(self))]
    pub async fn spawn(self: Arc<Self>) -> Result<ServerHandle, GameServerError> {
        let bind_addr: SocketAddr = ([0, 0, 0, 0], self.config.game_port).into();
        let listener = TcpListener::bind(bind_addr).await?;
        info!(%bind_addr, "game server listening");

        let cancel = CancellationToken::new();

        let matchmaker_task = {
            let matchmaker = self.matchmaker.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { matchmaker.run(cancel).await })
        };

        let build_rx = self.build_rx.lock().await.take().expect("spawn called once");
        let builder_task = {
            let server = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { server.run_match_builder(build_rx, cancel).await })
        };

        let accept_task = {
            let server = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { server.run_accept_loop(listener, cancel).await })
        };

        Ok(ServerHandle { cancel, accept_task, matchmaker_task, builder_task })
    }

    async fn run_accept_loop(self: Arc<Self>, listener: TcpListener, cancel: CancellationToken) {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let server = self.clone();
                            let cancel = cancel.clone();
                            tokio::spawn(async move { server.handle_connection(stream, addr, cancel).await });
                        }
                        Err(err) => error!(%err, "accept failed"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!("accept loop stopping");
                    break;
                }
            }
        }
    }

    /// Drains formed-match requests and actually builds the runtime: each
    /// request only carries player ids, so the sender/identity for each
    /// player is resolved from the live session registry just before spawn.
    async fn run_match_builder(
        self: Arc<Self>,
        mut build_rx: mpsc::UnboundedReceiver<MatchBuildRequest>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                Some(request) = build_rx.recv() => {
                    self.build_match(request).await;
                }
                _ = cancel.cancelled() => {
                    debug!("match builder stopping");
                    break;
                }
                else => break,
            }
        }
    }

    async fn build_match(&self, request: MatchBuildRequest) {
        let mut members = Vec::with_capacity(request.player_ids.len());
        for player_id in &request.player_ids {
            let Some(session) = self.sessions.get_by_player(player_id).await else {
                warn!(match_id = %hex::encode(request.match_id), ?player_id, "player vanished before match build");
                continue;
            };
            let session = session.read().await;
            members.push((session.user.clone(), session.outbound.clone()));
        }

        if members.len() < 2 {
            warn!(match_id = %hex::encode(request.match_id), "too few surviving members to start match");
            return;
        }

        let handle: MatchHandle = MatchRuntime::spawn(
            request.match_id,
            members,
            self.config.clone(),
            self.sessions.clone(),
            self.registry.clone(),
            self.repository.clone(),
            self.outbox.clone(),
        );
        self.registry.create_match(handle).await;
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream, addr: SocketAddr, cancel: CancellationToken) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(err) => {
                debug!(%addr, %err, "websocket handshake failed");
                return;
            }
        };
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(self.config.outbound_queue);

        let writer_task: JoinHandle<()> = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let text = match msg.to_json() {
                    Ok(t) => t,
                    Err(err) => {
                        error!(%err, "failed to serialize outbound message");
                        continue;
                    }
                };
                if ws_sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        let session_id = self.authenticate(&mut ws_receiver, &outbound_tx).await;
        let Some(session_id) = session_id else {
            writer_task.abort();
            return;
        };

        self.run_session_reader(session_id, &mut ws_receiver, cancel).await;

        writer_task.abort();
        self.on_disconnect(session_id).await;
        debug!(%addr, "connection cleaned up");
    }

    /// Wait for the first message on a fresh connection to be `Authenticate`,
    /// resolve it, register the session, and (if the player has no existing
    /// match) enqueue them with the matchmaker. Returns the new session id on
    /// success, or `None` if the connection should be dropped.
    async fn authenticate(
        &self,
        ws_receiver: &mut (impl futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
        outbound_tx: &mpsc::Sender<ServerMessage>,
    ) -> Option<SessionId> {
        let raw = loop {
            match ws_receiver.next().await {
                Some(Ok(Message::Text(text))) => break text,
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                _ => return None,
            }
        };

        let token = match ClientMessage::from_json(&raw) {
            Ok(ClientMessage::Authenticate { token }) => token,
            _ => {
                let _ = outbound_tx.send(ServerMessage::AuthErr { reason: AuthErrorReason::InvalidToken }).await;
                return None;
            }
        };

        let user = match self.auth.authenticate(&token) {
            Ok(user) => user,
            Err(err) => {
                let reason = match err {
                    AuthError::Banned => AuthErrorReason::Banned,
                    AuthError::NotConfigured => AuthErrorReason::Unavailable,
                    _ => AuthErrorReason::InvalidToken,
                };
                let _ = outbound_tx.send(ServerMessage::AuthErr { reason }).await;
                return None;
            }
        };

        let session_id = *uuid::Uuid::new_v4().as_bytes();
        let (session_id, evicted) =
            self.sessions.insert(ConnectedSession::new(session_id, user.clone(), outbound_tx.clone())).await;
        if let Some(previous) = evicted {
            let previous = previous.read().await;
            let _ = previous.outbound.send(ServerMessage::AuthErr { reason: AuthErrorReason::Replaced }).await;
        }

        let match_id = self.registry.match_of(user.user_id).await;
        let _ = outbound_tx
            .send(ServerMessage::AuthOk { user_id: user.user_id.0, match_id, tick_rate: self.config.tick_hz })
            .await;

        match match_id {
            Some(match_id) => self.registry.attach_session(user.user_id, match_id).await,
            None => self.enqueue_for_matchmaking(user.user_id, user.rating).await,
        }

        Some(session_id)
    }

    async fn enqueue_for_matchmaking(&self, player_id: PlayerId, rating: i32) {
        let (notify_tx, mut notify_rx) = mpsc::channel(8);
        if self.matchmaker.enqueue(player_id, rating, notify_tx).await.is_err() {
            return;
        }

        let sessions = self.sessions.clone();
        let registry = self.registry.clone();
        tokio::spawn(async move {
            while let Some(status) = notify_rx.recv().await {
                let Some(session) = sessions.get_by_player(&player_id).await else { break };
                let session = session.read().await;
                match status {
                    MatchmakingStatus::Searching { tolerance } => {
                        let _ = session.outbound.send(ServerMessage::Queued { tolerance }).await;
                    }
                    MatchmakingStatus::Found { match_id, .. } => {
                        registry.attach_session(player_id, match_id).await;
                        break;
                    }
                    MatchmakingStatus::TimedOut => {
                        let _ = session.outbound.send(ServerMessage::QueueTimedOut).await;
                        break;
                    }
                    MatchmakingStatus::Cancelled => break,
                }
            }
        });
    }

    async fn run_session_reader(
        &self,
        session_id: SessionId,
        ws_receiver: &mut (impl futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if !self.handle_client_message(session_id, &text).await {
                                break;
                            }
                        }
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(err)) => {
                            debug!(%err, "websocket read error");
                            break;
                        }
                        _ => {}
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    }

    /// Returns `false` if the connection should be torn down (parse failure
    /// past auth is treated as protocol abuse, voluntary leave, or the
    /// session having been replaced).
    async fn handle_client_message(&self, session_id: SessionId, text: &str) -> bool {
        let Some(session) = self.sessions.get(&session_id).await else { return false };

        let msg = match ClientMessage::from_json(text) {
            Ok(msg) => msg,
            Err(err) => {
                debug!(%err, "malformed client message");
                return true;
            }
        };

        let player_id = {
            let mut guard = session.write().await;
            guard.touch();
            guard.player_id()
        };

        match msg {
            ClientMessage::Authenticate { .. } => true,
            ClientMessage::Heartbeat => true,
            ClientMessage::Leave => {
                let _ = self.matchmaker.withdraw(player_id).await;
                let _ = self.registry.route_input(player_id, RuntimeInput::Disconnect { player_id }).await;
                self.registry.detach_session(player_id).await;
                false
            }
            ClientMessage::Input { seq, client_tick, vx, vy, facing, .. } => {
                let admitted = session.write().await.input_limiter.try_admit();
                if !admitted {
                    return true;
                }
                let frame = crate::game::input::InputFrame {
                    seq,
                    client_tick,
                    intended_velocity: crate::core::vec2::FixedVec2::new(vx, vy),
                    facing,
                };
                let _ = self.registry.route_input(player_id, RuntimeInput::Movement { player_id, frame }).await;
                true
            }
            ClientMessage::Fire { seq, client_tick, aim_angle } => {
                let admitted = session.write().await.fire_limiter.try_admit();
                if !admitted {
                    return true;
                }
                let rtt_ticks = session.read().await.rtt_ticks;
                let request = crate::game::input::FireRequest { seq, client_tick, aim_angle };
                let _ = self.registry.route_input(player_id, RuntimeInput::Fire { player_id, request, rtt_ticks }).await;
                true
            }
        }
    }

    async fn on_disconnect(&self, session_id: SessionId) {
        let Some(session) = self.sessions.get(&session_id).await else { return };
        let player_id = session.read().await.player_id();
        let _ = self.matchmaker.withdraw(player_id).await;
        let _ = self.registry.route_input(player_id, RuntimeInput::Disconnect { player_id }).await;
        session.write().await.mark_disconnected();
    }

    /// Sweep sessions that overstayed their reconnect grace or went idle.
    pub async fn sweep_stale_sessions(&self) {
        for session_id in self.sessions.sweep_expired().await {
            debug!(session_id = %hex::encode(session_id), "session expired past reconnect grace");
        }
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.sessions.len().await
    }

    /// Number of tickets currently queued.
    pub async fn queue_len(&self) -> usize {
        self.matchmaker.queue_len().await
    }

    /// Number of matches currently running.
    pub async fn match_count(&self) -> usize {
        self.registry.match_count().await
    }
}

/// Handle to a spawned server's background tasks, used to drive shutdown.
pub struct ServerHandle {
    cancel: CancellationToken,
    accept_task: JoinHandle<()>,
    matchmaker_task: JoinHandle<()>,
    builder_task: JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting new connections and matchmaking, then wait up to
    /// `grace` for in-flight work to wind down on its own. Running matches
    /// are not forcibly terminated; they finish through their own tick loop
    /// and detach their sessions as they go.
    pub async fn shutdown(self, grace: Duration) {
        self.cancel.cancel();
        let drain = async {
            let _ = self.accept_task.await;
            let _ = self.matchmaker_task.await;
            let _ = self.builder_task.await;
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            warn!("server shutdown grace period elapsed with tasks still draining");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::auth::{AuthProvider, ResolvedUser};
    use crate::repository::InMemoryRepository;
    use crate::store::InMemoryStore;

    struct FixedAuth(ResolvedUser);

    impl AuthProvider for FixedAuth {
        fn authenticate(&self, _token: &str) -> Result<ResolvedUser, AuthError> {
            Ok(self.0.clone())
        }
    }

    fn test_config() -> AppConfig {
        AppConfig { game_port: 0, min_players: 2, max_players: 4, ..Default::default() }
    }

    #[tokio::test]
    async fn fresh_server_has_no_connections_or_matches() {
        let user = ResolvedUser { user_id: PlayerId::new([1; 16]), display_name: "p".into(), rating: 1000 };
        let server = GameServer::new(
            test_config(),
            Arc::new(FixedAuth(user)),
            Arc::new(InMemoryRepository::new(vec![])),
            Arc::new(InMemoryStore::new()),
            Arc::new(OutboxWriter::new(std::env::temp_dir().join("skirmish-test-outbox.jsonl"))),
        );
        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.match_count().await, 0);
        assert_eq!(server.queue_len().await, 0);
    }

    #[tokio::test]
    async fn spawn_binds_and_shuts_down_cleanly() {
        let user = ResolvedUser { user_id: PlayerId::new([2; 16]), display_name: "p".into(), rating: 1000 };
        let server = GameServer::new(
            test_config(),
            Arc::new(FixedAuth(user)),
            Arc::new(InMemoryRepository::new(vec![])),
            Arc::new(InMemoryStore::new()),
            Arc::new(OutboxWriter::new(std::env::temp_dir().join("skirmish-test-outbox2.jsonl"))),
        );
        let handle = server.spawn().await.unwrap();
        handle.shutdown(Duration::from_secs(1)).await;
    }
}
