//! Match Runtime
//!
//! The single-writer task that owns one match's [`World`] for its entire
//! lifetime. Nothing else mutates world state: inputs arrive through a
//! channel and are buffered per player until the next tick; every tick's
//! output is pushed to each member's session outbound channel, filtered
//! through that member's [`InterestState`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::core::fixed::HARD_MATCH_END_TICKS;
use crate::core::rng::{derive_match_seed, DeterministicRng};
use crate::game::input::{FireRequest, InputFrame, InputRejection, MAX_INPUTS_PER_TICK};
use crate::game::state::{MatchPhase, PlayerId, World};
use crate::game::tick::{tick, PlayerTickInput};
use crate::game::{loot, map};
use crate::network::auth::ResolvedUser;
use crate::network::interest::InterestManager;
use crate::network::protocol::{
    EventPayload, MapDescriptor, PlayerPlacement, RatingDelta, ServerMessage,
};
use crate::network::session::SessionRegistry;
use crate::registry::{MatchHandle, MatchRegistry};
use crate::repository::{MatchResult, OutboxWriter, Repository};

/// Points awarded for placement 1.
const WIN_GAIN: i32 = 30;
/// Points awarded for placement 2.
const RUNNER_UP_GAIN: i32 = 10;
/// Points awarded for placement 3.
const THIRD_PLACE_GAIN: i32 = 5;
/// Points deducted for every other placement.
const LOSS_PENALTY: i32 = -15;
/// Brief pre-match buffer before the first simulated tick.
const COUNTDOWN_SECONDS: u32 = 3;

/// Input routed to a running match by the [`MatchRegistry`].
#[derive(Debug, Clone)]
pub enum RuntimeInput {
    /// Validated movement intent.
    Movement { player_id: PlayerId, frame: InputFrame },
    /// A fire request, carrying the sender's most recent measured RTT in ticks.
    Fire { player_id: PlayerId, request: FireRequest, rtt_ticks: u64 },
    /// The player's session disconnected; their inputs stop but they remain in the world
    /// until eliminated or the match ends (the reconnect grace window lives in the session layer).
    Disconnect { player_id: PlayerId },
}

/// The task driving one match's simulation.
pub struct MatchRuntime {
    match_id: [u8; 16],
    world: World,
    interest: InterestManager,
    pending: BTreeMap<PlayerId, PlayerTickInput>,
    ratings: BTreeMap<PlayerId, i32>,
    sessions: Arc<SessionRegistry>,
    registry: Arc<MatchRegistry>,
    repository: Arc<dyn Repository>,
    outbox: Arc<OutboxWriter>,
    config: AppConfig,
    input_rx: mpsc::Receiver<RuntimeInput>,
}

impl MatchRuntime {
    /// Build the world (map, loot, spawns), register the match, and spawn its tick task.
    /// Returns the handle the matchmaker hands back to the caller that formed the lobby.
    pub fn spawn(
        match_id: [u8; 16],
        members: Vec<(ResolvedUser, mpsc::Sender<ServerMessage>)>,
        config: AppConfig,
        sessions: Arc<SessionRegistry>,
        registry: Arc<MatchRegistry>,
        repository: Arc<dyn Repository>,
        outbox: Arc<OutboxWriter>,
    ) -> MatchHandle {
        let mut player_ids: Vec<PlayerId> = members.iter().map(|(u, _)| u.user_id).collect();
        player_ids.sort();

        let rng_seed = derive_match_seed(&match_entropy(), &match_id, &player_ids.iter().map(|id| id.0).collect::<Vec<_>>());
        let mut map_rng = DeterministicRng::new(rng_seed);
        let generated = map::generate(&mut map_rng);

        let mut world = World::new(match_id, rng_seed);
        world.obstacles = generated.obstacles().to_vec();
        world.phase = MatchPhase::Countdown { ticks_remaining: (COUNTDOWN_SECONDS * config.tick_hz) as u64 };

        // Map and loot generation both draw from `map_rng`, kept separate from
        // `world.rng` so pre-match setup never perturbs the tick loop's own sequence.
        let spawns = generated.spawn_points(&mut map_rng, player_ids.len());
        for (id, position) in player_ids.iter().zip(spawns.iter()) {
            world.add_player(*id, *position);
        }

        let map_width = to_float(2 * crate::core::fixed::MAP_HALF_WIDTH);
        let map_height = to_float(2 * crate::core::fixed::MAP_HALF_HEIGHT);
        let loot_count = (to_float(loot::LOOT_DENSITY) * map_width * map_height).round().max(0.0) as usize;
        let loot_positions = generated.random_free_points(&mut map_rng, loot_count);
        loot::spawn_initial_loot(&mut world, &loot_positions);

        let ratings: BTreeMap<PlayerId, i32> = members.iter().map(|(u, _)| (u.user_id, u.rating)).collect();

        let (input_tx, input_rx) = mpsc::channel(config.outbound_queue.max(64));
        let handle = MatchHandle { match_id, input_tx, players: Arc::from(player_ids.clone()) };

        let runtime = MatchRuntime {
            match_id,
            world,
            interest: InterestManager::new(),
            pending: BTreeMap::new(),
            ratings,
            sessions,
            registry,
            repository,
            outbox,
            config,
            input_rx,
        };

        tokio::spawn(runtime.run());
        handle
    }

    async fn run(mut self) {
        let map_descriptor = MapDescriptor::from_obstacles(&self.world.obstacles);
        self.announce_match_found(&map_descriptor).await;

        let period = Duration::from_secs_f64(1.0 / self.config.tick_hz as f64);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let started = tokio::time::Instant::now();
                    self.drain_input();
                    let outcome = tick(&mut self.world, &std::mem::take(&mut self.pending));
                    self.publish(&outcome.events).await;

                    for (player_id, rejection) in &outcome.rejected_inputs {
                        debug!(match_id = %hex::encode(self.match_id), ?player_id, ?rejection, "dropped invalid input frame");
                        metrics::counter!("input_frames_rejected_total", "reason" => rejection_label(*rejection)).increment(1);
                    }

                    let elapsed = started.elapsed();
                    metrics::histogram!("match_tick_duration_ms").record(elapsed.as_secs_f64() * 1000.0);
                    if elapsed > period {
                        warn!(match_id = %hex::encode(self.match_id), ?elapsed, "tick overrun");
                    }

                    if outcome.match_ended || self.world.tick >= HARD_MATCH_END_TICKS {
                        self.finish("elimination").await;
                        break;
                    }
                }
                Some(input) = self.input_rx.recv() => {
                    self.apply_input(input);
                }
                else => break,
            }
        }

        self.registry.remove_match(self.match_id).await;
        info!(match_id = %hex::encode(self.match_id), "match runtime exited");
    }

    fn drain_input(&mut self) {
        while let Ok(input) = self.input_rx.try_recv() {
            self.apply_input(input);
        }
    }

    fn apply_input(&mut self, input: RuntimeInput) {
        match input {
            RuntimeInput::Movement { player_id, frame } => {
                let entry = self.pending.entry(player_id).or_default();
                if entry.movement.len() < MAX_INPUTS_PER_TICK {
                    entry.movement.push(frame);
                }
            }
            RuntimeInput::Fire { player_id, request, rtt_ticks } => {
                let entry = self.pending.entry(player_id).or_default();
                entry.rtt_ticks = rtt_ticks;
                if entry.fire.len() < MAX_INPUTS_PER_TICK {
                    entry.fire.push(request);
                }
            }
            RuntimeInput::Disconnect { .. } => {
                // The player's session layer tracks the reconnect grace window; the
                // simulation keeps them in the world, simply receiving no more input.
            }
        }
    }

    async fn announce_match_found(&self, map_descriptor: &MapDescriptor) {
        for (player_id, _) in &self.ratings {
            if let Some(session) = self.sessions.get_by_player(player_id).await {
                let session = session.read().await;
                let _ = session
                    .outbound
                    .send(ServerMessage::MatchFound {
                        match_id: self.match_id,
                        map_descriptor: map_descriptor.clone(),
                        self_id: player_id.0,
                        tick_now: self.world.tick,
                    })
                    .await;
            }
        }
    }

    async fn publish(&mut self, events: &[crate::game::events::GameEvent]) {
        let player_ids: Vec<PlayerId> = self.world.players.keys().copied().collect();
        for player_id in player_ids {
            let Some(session) = self.sessions.get_by_player(&player_id).await else { continue };
            let snapshot = self.interest.snapshot_for(
                &self.world,
                player_id,
                self.config.interest_radius,
                self.config.keyframe_interval_ticks,
            );
            let session = session.read().await;
            let _ = session.outbound.send(ServerMessage::Snapshot(snapshot)).await;

            for event in events {
                if !event_visible_to(event, player_id, &self.world, self.config.interest_radius) {
                    continue;
                }
                let _ = session
                    .outbound
                    .send(ServerMessage::Event { tick: event.tick, payload: EventPayload::from_event_data(&event.data) })
                    .await;
            }
        }
    }

    async fn finish(&mut self, reason: &str) {
        let placements = self.world.get_placements();
        let rating_deltas: Vec<(PlayerId, i32)> =
            placements.iter().map(|(player_id, place)| (*player_id, rating_delta_for(*place))).collect();

        let result = MatchResult {
            match_id: self.match_id,
            end_tick: self.world.tick,
            placements: placements.clone(),
            rating_deltas: rating_deltas.clone(),
        };

        if self.persist_with_retry(&result).await.is_err() {
            if let Err(err) = self.outbox.append(&result) {
                warn!(match_id = %hex::encode(self.match_id), %err, "failed to append match result to outbox");
            }
        }

        let wire_placements: Vec<PlayerPlacement> = placements
            .iter()
            .map(|(id, place)| {
                let player = &self.world.players[id];
                PlayerPlacement {
                    player_id: id.0,
                    place: *place,
                    kills: player.kills,
                    damage_dealt: player.damage_dealt as i32,
                    survival_ticks: player.survival_ticks,
                }
            })
            .collect();
        let wire_deltas: Vec<RatingDelta> =
            rating_deltas.iter().map(|(id, delta)| RatingDelta { player_id: id.0, delta: *delta }).collect();

        for (player_id, _) in &self.ratings {
            if let Some(session) = self.sessions.get_by_player(player_id).await {
                let session = session.read().await;
                let _ = session
                    .outbound
                    .send(ServerMessage::MatchEnd {
                        placements: wire_placements.clone(),
                        rating_deltas: wire_deltas.clone(),
                        reason: reason.to_string(),
                    })
                    .await;
            }
            self.registry.detach_session(*player_id).await;
        }
    }

    async fn persist_with_retry(&self, result: &MatchResult) -> Result<(), ()> {
        let retry = crate::error::RetryPolicy::default();
        let repository = self.repository.clone();
        let player_ids: Vec<PlayerId> = result.placements.iter().map(|(id, _)| *id).collect();
        let match_id = result.match_id;

        let save_match = retry
            .retry(|| {
                let repository = repository.clone();
                let player_ids = player_ids.clone();
                async move {
                    repository
                        .save_match(match_id, &player_ids)
                        .await
                        .map_err(|e| crate::error::ServerError::Transient(crate::error::TransientError::StoreUnavailable(e.to_string())))
                }
            })
            .await;
        if save_match.is_err() {
            return Err(());
        }

        let save_result = retry
            .retry(|| {
                let repository = repository.clone();
                let result = result.clone();
                async move {
                    repository
                        .save_match_result(&result)
                        .await
                        .map_err(|e| crate::error::ServerError::Transient(crate::error::TransientError::StoreUnavailable(e.to_string())))
                }
            })
            .await;

        for (player_id, delta) in &result.rating_deltas {
            let _ = repository.update_rating(*player_id, *delta).await;
        }

        save_result.map_err(|_| ())
    }
}

fn rejection_label(rejection: InputRejection) -> &'static str {
    match rejection {
        InputRejection::StaleSequence => "stale_sequence",
        InputRejection::ClockOutOfTolerance => "clock_out_of_tolerance",
        InputRejection::VelocityTooFast => "velocity_too_fast",
    }
}

fn rating_delta_for(place: u32) -> i32 {
    match place {
        1 => WIN_GAIN,
        2 => RUNNER_UP_GAIN,
        3 => THIRD_PLACE_GAIN,
        _ => LOSS_PENALTY,
    }
}

fn event_visible_to(
    event: &crate::game::events::GameEvent,
    viewer: PlayerId,
    world: &World,
    radius: crate::core::fixed::Fixed,
) -> bool {
    use crate::game::events::GameEventData;
    match &event.data {
        GameEventData::MatchEnded { .. } => false, // carried by ServerMessage::MatchEnd, not an Event frame
        GameEventData::ZonePhaseChanged { .. } => true,
        _ => {
            let Some(origin) = world.players.get(&viewer).map(|p| p.position) else { return false };
            let subject_position = match &event.data {
                GameEventData::Hit { victim_id, .. } => world.players.get(victim_id).map(|p| p.position),
                GameEventData::Elimination { victim_id, .. } => world.players.get(victim_id).map(|p| p.position),
                GameEventData::Pickup { player_id, .. } => world.players.get(player_id).map(|p| p.position),
                _ => None,
            };
            match subject_position {
                Some(position) => {
                    let r = radius as i64;
                    origin.distance_squared(position) as i64 <= (r * r) >> 16
                }
                None => true,
            }
        }
    }
}

fn match_entropy() -> [u8; 32] {
    let nonce = uuid::Uuid::new_v4();
    let mut hasher = Sha256::new();
    hasher.update(b"SKIRMISH_ARENA_ENTROPY_V1");
    hasher.update(nonce.as_bytes());
    hasher.finalize().into()
}

fn to_float(fixed: crate::core::fixed::Fixed) -> f64 {
    fixed as f64 / crate::core::fixed::FIXED_ONE as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_delta_rewards_top_three_penalizes_the_rest() {
        assert_eq!(rating_delta_for(1), WIN_GAIN);
        assert_eq!(rating_delta_for(2), RUNNER_UP_GAIN);
        assert_eq!(rating_delta_for(3), THIRD_PLACE_GAIN);
        assert_eq!(rating_delta_for(4), LOSS_PENALTY);
        assert_eq!(rating_delta_for(16), LOSS_PENALTY);
    }
}
