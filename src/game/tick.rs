//! Authoritative Simulation Tick
//!
//! The core game loop. Must be 100% deterministic: BTreeMap iteration order,
//! fixed-point math only, and the world's own RNG advanced nowhere else.

use std::collections::BTreeMap;

use crate::core::fixed::{HARD_MATCH_END_TICKS, LAG_COMP_MAX_TICKS};
use crate::game::events::GameEvent;
use crate::game::input::{normalize_facing, FireRequest, InputFrame, InputRejection};
use crate::game::state::{MatchPhase, PlayerId, World};
use crate::game::{combat, loot, physics, zone};

/// One player's drained, already-validated inputs for a single tick.
#[derive(Clone, Debug, Default)]
pub struct PlayerTickInput {
    /// Movement frames accepted since the previous tick, oldest first.
    pub movement: Vec<InputFrame>,
    /// Fire requests accepted since the previous tick, oldest first.
    pub fire: Vec<FireRequest>,
    /// Most recent measured round-trip time for this player, in ticks. Used to
    /// clamp the lag-compensation rewind on fire requests.
    pub rtt_ticks: u64,
}

/// Outcome of one call to [`tick`].
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Events generated this tick, in priority order.
    pub events: Vec<GameEvent>,
    /// Whether the match concluded this tick.
    pub match_ended: bool,
    /// Winner, if the match ended with one (ties with zero survivors have none).
    pub winner: Option<PlayerId>,
    /// Movement frames dropped this tick for failing [`InputFrame::validate`],
    /// paired with the reason, for the transport layer to count as
    /// [`crate::error::ValidationError`].
    pub rejected_inputs: Vec<(PlayerId, InputRejection)>,
}

/// Advance `world` by one tick using `inputs`. No-op once the match has ended.
///
/// Pipeline: apply validated movement → resolve fire requests with lag
/// compensation → integrate projectiles and resolve hits → resolve loot pickups
/// → advance the safe zone and apply zone damage → check end conditions → push
/// the lag-compensation history snapshot.
pub fn tick(world: &mut World, inputs: &BTreeMap<PlayerId, PlayerTickInput>) -> TickOutcome {
    let mut outcome = TickOutcome::default();

    match world.phase {
        MatchPhase::Countdown { ticks_remaining } => {
            world.phase = if ticks_remaining == 0 {
                MatchPhase::Playing
            } else {
                MatchPhase::Countdown { ticks_remaining: ticks_remaining - 1 }
            };
            return outcome;
        }
        MatchPhase::Ended => {
            outcome.match_ended = true;
            return outcome;
        }
        MatchPhase::Playing => {}
    }

    world.tick += 1;

    apply_movement(world, inputs, &mut outcome);
    apply_fire_requests(world, inputs);
    combat::step_projectiles(world);
    loot::resolve_pickups(world);
    zone::step(world);
    check_end_conditions(world, &mut outcome);
    world.push_history();

    outcome.events = world.take_events();
    outcome
}

fn apply_movement(world: &mut World, inputs: &BTreeMap<PlayerId, PlayerTickInput>, outcome: &mut TickOutcome) {
    let server_tick = world.tick;

    for (player_id, input) in inputs {
        let Some(player) = world.players.get_mut(player_id) else { continue };
        if !player.alive {
            continue;
        }

        for frame in &input.movement {
            match frame.validate(player.last_accepted_seq, server_tick) {
                Ok(()) => {
                    player.velocity = physics::velocity_from_intent(frame.intended_velocity, crate::core::fixed::BASE_SPEED);
                    player.facing = normalize_facing(frame.facing);
                    player.last_accepted_seq = frame.seq;
                }
                Err(rejection) => outcome.rejected_inputs.push((*player_id, rejection)),
            }
        }
    }

    physics::step(world);
}

fn apply_fire_requests(world: &mut World, inputs: &BTreeMap<PlayerId, PlayerTickInput>) {
    for (player_id, input) in inputs {
        if input.fire.is_empty() {
            continue;
        }
        let rewind_ticks = input.rtt_ticks / 2;
        let rewind_ticks = rewind_ticks.min(LAG_COMP_MAX_TICKS);
        let rewound_position = world
            .history_at(rewind_ticks)
            .and_then(|snapshot| snapshot.get(player_id))
            .map(|s| s.position)
            .or_else(|| world.players.get(player_id).map(|p| p.position));

        let Some(rewound_position) = rewound_position else { continue };

        for request in &input.fire {
            let _ = combat::try_fire(world, *player_id, normalize_facing(request.aim_angle), rewound_position);
        }
    }
}

fn check_end_conditions(world: &mut World, outcome: &mut TickOutcome) {
    if world.is_ended() || world.tick >= HARD_MATCH_END_TICKS {
        world.crown_winner();
        world.phase = MatchPhase::Ended;
        outcome.match_ended = true;

        let winner = world.players.values().find(|p| p.alive).map(|p| p.id);
        outcome.winner = winner;
        world.push_event(GameEvent::match_ended(world.tick, winner));
    }
}

/// Replay a match from recorded per-player input logs, for determinism verification.
/// Returns the final world and every event emitted across the run.
pub fn replay_match(
    mut world: World,
    player_inputs: &BTreeMap<PlayerId, Vec<PlayerTickInput>>,
    tick_count: u64,
) -> (World, Vec<GameEvent>) {
    world.phase = MatchPhase::Playing;
    let mut all_events = Vec::new();

    for t in 0..tick_count {
        let mut tick_inputs = BTreeMap::new();
        for (player_id, frames) in player_inputs {
            let input = frames.get(t as usize).cloned().unwrap_or_default();
            tick_inputs.insert(*player_id, input);
        }

        let outcome = tick(&mut world, &tick_inputs);
        all_events.extend(outcome.events);
        if outcome.match_ended {
            break;
        }
    }

    (world, all_events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::FixedVec2;

    fn pid(byte: u8) -> PlayerId {
        PlayerId([byte; 16])
    }

    fn playing_world(player_count: u8) -> World {
        let mut world = World::new([0u8; 16], 12345);
        world.phase = MatchPhase::Playing;
        for i in 0..player_count {
            world.add_player(pid(i), FixedVec2::new((i as i32) * crate::core::fixed::to_fixed(10.0), 0));
        }
        world
    }

    #[test]
    fn tick_is_deterministic_across_independent_worlds() {
        let mut world1 = playing_world(4);
        let mut world2 = playing_world(4);

        let mut inputs = BTreeMap::new();
        for i in 0..4u8 {
            inputs.insert(
                pid(i),
                PlayerTickInput {
                    movement: vec![InputFrame {
                        seq: 1,
                        client_tick: 1,
                        intended_velocity: FixedVec2::new(crate::core::fixed::to_fixed(1.0), 0),
                        facing: 0,
                    }],
                    fire: Vec::new(),
                    rtt_ticks: 0,
                },
            );
        }

        for _ in 0..50 {
            tick(&mut world1, &inputs);
            tick(&mut world2, &inputs);
        }

        assert_eq!(world1.tick, world2.tick);
        assert_eq!(world1.compute_hash(), world2.compute_hash());
    }

    #[test]
    fn movement_input_advances_player_position() {
        let mut world = playing_world(1);
        let mut inputs = BTreeMap::new();
        inputs.insert(
            pid(0),
            PlayerTickInput {
                movement: vec![InputFrame {
                    seq: 1,
                    client_tick: 1,
                    intended_velocity: FixedVec2::new(crate::core::fixed::to_fixed(5.0), 0),
                    facing: 0,
                }],
                fire: Vec::new(),
                rtt_ticks: 0,
            },
        );

        tick(&mut world, &inputs);
        assert!(world.players[&pid(0)].position.x > 0);
    }

    #[test]
    fn overspeed_frame_is_dropped_not_clamped() {
        let mut world = playing_world(1);
        let claimed_speed = crate::core::fixed::fixed_mul(
            crate::core::fixed::BASE_SPEED,
            crate::game::input::SPEED_SLACK_MULT,
        ) + 1;
        let mut inputs = BTreeMap::new();
        inputs.insert(
            pid(0),
            PlayerTickInput {
                movement: vec![InputFrame {
                    seq: 1,
                    client_tick: 1,
                    intended_velocity: FixedVec2::new(claimed_speed, 0),
                    facing: 0,
                }],
                fire: Vec::new(),
                rtt_ticks: 0,
            },
        );

        let outcome = tick(&mut world, &inputs);
        assert_eq!(outcome.rejected_inputs.len(), 1);
        assert_eq!(outcome.rejected_inputs[0].1, crate::game::input::InputRejection::VelocityTooFast);
        assert_eq!(world.players[&pid(0)].position.x, 0);
        assert_eq!(world.players[&pid(0)].last_accepted_seq, 0);
    }

    #[test]
    fn clock_drifted_frame_is_dropped() {
        let mut world = playing_world(1);
        world.tick = 100;
        let mut inputs = BTreeMap::new();
        inputs.insert(
            pid(0),
            PlayerTickInput {
                movement: vec![InputFrame {
                    seq: 1,
                    client_tick: 0,
                    intended_velocity: FixedVec2::new(crate::core::fixed::to_fixed(1.0), 0),
                    facing: 0,
                }],
                fire: Vec::new(),
                rtt_ticks: 0,
            },
        );

        let outcome = tick(&mut world, &inputs);
        assert_eq!(outcome.rejected_inputs.len(), 1);
        assert_eq!(outcome.rejected_inputs[0].1, crate::game::input::InputRejection::ClockOutOfTolerance);
    }

    #[test]
    fn match_ends_when_one_or_zero_players_remain() {
        let mut world = playing_world(2);
        world.eliminate_player(pid(1), Some(pid(0)));

        let outcome = tick(&mut world, &BTreeMap::new());
        assert!(outcome.match_ended);
        assert_eq!(outcome.winner, Some(pid(0)));
    }

    #[test]
    fn match_ends_at_hard_deadline_regardless_of_survivors() {
        let mut world = playing_world(3);
        world.tick = HARD_MATCH_END_TICKS - 1;

        let outcome = tick(&mut world, &BTreeMap::new());
        assert!(outcome.match_ended);
    }

    #[test]
    fn replay_from_recorded_inputs_is_deterministic() {
        let world1 = playing_world(3);
        let world2 = playing_world(3);

        let mut inputs: BTreeMap<PlayerId, Vec<PlayerTickInput>> = BTreeMap::new();
        for i in 0..3u8 {
            let frames: Vec<PlayerTickInput> = (0..30)
                .map(|t| PlayerTickInput {
                    movement: vec![InputFrame {
                        seq: t + 1,
                        client_tick: t as u64 + 1,
                        intended_velocity: FixedVec2::new(crate::core::fixed::to_fixed((i as f64) + 1.0), 0),
                        facing: 0,
                    }],
                    fire: Vec::new(),
                    rtt_ticks: 0,
                })
                .collect();
            inputs.insert(pid(i), frames);
        }

        let (final1, events1) = replay_match(world1, &inputs, 30);
        let (final2, events2) = replay_match(world2, &inputs, 30);

        assert_eq!(final1.compute_hash(), final2.compute_hash());
        assert_eq!(events1.len(), events2.len());
    }
}
