//! Safe Zone
//!
//! Hold / Shrink / Final state machine for the shrinking play area, plus the
//! out-of-zone damage tick.

use crate::core::fixed::{
    fixed_clamp, fixed_div, fixed_lerp, fixed_mul, Fixed, FINAL_RADIUS, MAP_HALF_WIDTH,
    ZONE_DPS_PER_TICK, ZONE_HOLD_TICKS, ZONE_SHRINK_FACTOR, ZONE_SHRINK_TICKS,
};
use crate::core::vec2::FixedVec2;
use crate::game::events::GameEvent;
use crate::game::state::{SafeZone, World, ZonePhase};

/// Construct the zone's starting state: a full-radius Hold phase beginning at tick 0.
pub fn initial_zone() -> SafeZone {
    SafeZone {
        center: FixedVec2::ZERO,
        start_radius: MAP_HALF_WIDTH,
        current_radius: MAP_HALF_WIDTH,
        target_radius: MAP_HALF_WIDTH,
        phase_start_tick: 0,
        phase_end_tick: ZONE_HOLD_TICKS,
        phase: ZonePhase::Hold,
    }
}

/// Advance the safe zone by one tick: handle phase transitions, interpolate the
/// current radius during Shrink, and apply out-of-zone damage to alive players.
pub fn step(world: &mut World) {
    advance_phase(world);
    apply_zone_damage(world);
}

fn advance_phase(world: &mut World) {
    let tick = world.tick;
    let zone = world.safe_zone.clone();

    match zone.phase {
        ZonePhase::Hold => {
            if tick >= zone.phase_end_tick {
                begin_shrink(world);
            }
        }
        ZonePhase::Shrink => {
            if tick >= zone.phase_end_tick {
                world.safe_zone.current_radius = zone.target_radius;
                if zone.target_radius < FINAL_RADIUS {
                    begin_final(world);
                } else {
                    begin_shrink(world);
                }
            } else {
                let span = (zone.phase_end_tick - zone.phase_start_tick).max(1);
                let elapsed = tick - zone.phase_start_tick;
                let t = fixed_div(
                    crate::core::fixed::to_fixed(elapsed as f64),
                    crate::core::fixed::to_fixed(span as f64),
                );
                let t = fixed_clamp(t, 0, crate::core::fixed::FIXED_ONE);
                world.safe_zone.current_radius = fixed_lerp(zone.start_radius, zone.target_radius, t);
            }
        }
        ZonePhase::Final => {}
    }
}

fn begin_shrink(world: &mut World) {
    let prev = world.safe_zone.clone();
    let target_radius = fixed_mul(prev.current_radius, ZONE_SHRINK_FACTOR);
    let new_center = random_center_within(world, prev.center, prev.current_radius, target_radius);

    let zone = &mut world.safe_zone;
    zone.center = new_center;
    zone.start_radius = prev.current_radius;
    zone.target_radius = target_radius;
    zone.phase_start_tick = world.tick;
    zone.phase_end_tick = world.tick + ZONE_SHRINK_TICKS;
    zone.phase = ZonePhase::Shrink;

    world.push_event(GameEvent::zone_phase_changed(world.tick, ZonePhase::Shrink, new_center, target_radius, zone.phase_end_tick));
}

fn begin_final(world: &mut World) {
    let zone = &mut world.safe_zone;
    zone.current_radius = FINAL_RADIUS;
    zone.start_radius = FINAL_RADIUS;
    zone.target_radius = FINAL_RADIUS;
    zone.phase_start_tick = world.tick;
    zone.phase_end_tick = u64::MAX;
    zone.phase = ZonePhase::Final;
    let center = zone.center;

    world.push_event(GameEvent::zone_phase_changed(world.tick, ZonePhase::Final, center, FINAL_RADIUS, u64::MAX));
}

/// Pick a new zone center uniformly within a disc of radius `(old_radius - new_radius)`
/// around `old_center`, so the new zone is always fully contained in the old one.
fn random_center_within(world: &mut World, old_center: FixedVec2, old_radius: Fixed, new_radius: Fixed) -> FixedVec2 {
    let slack = (old_radius - new_radius).max(0);
    if slack == 0 {
        return old_center;
    }
    world.rng.random_position_in_circle(old_center, slack)
}

fn apply_zone_damage(world: &mut World) {
    let center = world.safe_zone.center;
    let radius_sq = fixed_mul(world.safe_zone.current_radius, world.safe_zone.current_radius);

    let outside: Vec<_> = world
        .players
        .iter()
        .filter(|(_, p)| p.alive && p.position.distance_squared(center) > radius_sq)
        .map(|(id, _)| *id)
        .collect();

    for id in outside {
        if let Some(player) = world.players.get_mut(&id) {
            let health_loss = player.apply_damage(ZONE_DPS_PER_TICK);
            let died = !player.alive;
            let _ = health_loss;
            if died {
                world.eliminate_player(id, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::to_fixed;
    use crate::game::state::PlayerId;

    fn pid(byte: u8) -> PlayerId {
        PlayerId([byte; 16])
    }

    #[test]
    fn hold_transitions_to_shrink_at_phase_end() {
        let mut world = World::new([0u8; 16], 1);
        world.safe_zone = initial_zone();
        world.tick = ZONE_HOLD_TICKS;
        step(&mut world);
        assert_eq!(world.safe_zone.phase, ZonePhase::Shrink);
    }

    #[test]
    fn shrink_interpolates_radius_linearly() {
        let mut world = World::new([0u8; 16], 1);
        world.safe_zone = initial_zone();
        world.tick = ZONE_HOLD_TICKS;
        step(&mut world); // enters Shrink

        let start = world.safe_zone.start_radius;
        let target = world.safe_zone.target_radius;
        world.tick += ZONE_SHRINK_TICKS / 2;
        step(&mut world);
        let mid = world.safe_zone.current_radius;
        assert!(mid < start && mid > target);
    }

    #[test]
    fn out_of_zone_player_takes_fixed_damage_per_tick() {
        let mut world = World::new([0u8; 16], 1);
        world.safe_zone.current_radius = to_fixed(10.0);
        world.add_player(pid(1), FixedVec2::new(to_fixed(1000.0), 0));
        apply_zone_damage(&mut world);
        assert_eq!(world.players[&pid(1)].health, crate::core::fixed::MAX_HP - ZONE_DPS_PER_TICK);
    }

    #[test]
    fn in_zone_player_takes_no_damage() {
        let mut world = World::new([0u8; 16], 1);
        world.safe_zone.current_radius = to_fixed(1000.0);
        world.add_player(pid(1), FixedVec2::ZERO);
        apply_zone_damage(&mut world);
        assert_eq!(world.players[&pid(1)].health, crate::core::fixed::MAX_HP);
    }
}
