//! Combat & Projectiles
//!
//! Weapon stats dispatch, fire-cooldown validation, projectile integration and
//! lag-compensated hit resolution.

use crate::core::fixed::{Fixed, fixed_mul, fixed_div, to_fixed, FIXED_ONE};
use crate::core::vec2::FixedVec2;
use crate::game::events::GameEvent;
use crate::game::state::{Obstacle, PlayerId, Projectile, Weapon, World};

/// Fixed per-weapon stats. Looked up by `weapon_stats`, never stored per-player.
#[derive(Clone, Copy, Debug)]
pub struct WeaponStats {
    /// Base damage of a single hit (or, for the shotgun, a single pellet).
    pub base_damage: i32,
    /// Base cooldown in ticks before `firerate_stacks` are applied.
    pub base_cooldown_ticks: u32,
    /// Projectile speed, units/tick.
    pub projectile_speed: Fixed,
    /// Maximum range, in map units.
    pub range: Fixed,
    /// Per-pellet spread, fixed-point radians. Zero for single-projectile weapons.
    pub spread: Fixed,
    /// Number of projectiles spawned per fire.
    pub pellets: u32,
}

/// Look up the fixed stats for `weapon`.
pub fn weapon_stats(weapon: Weapon) -> WeaponStats {
    match weapon {
        Weapon::Pistol => WeaponStats {
            base_damage: 15,
            base_cooldown_ticks: 15,
            projectile_speed: to_fixed(10.0),
            range: to_fixed(600.0),
            spread: 0,
            pellets: 1,
        },
        Weapon::Rifle => WeaponStats {
            base_damage: 20,
            base_cooldown_ticks: 12,
            projectile_speed: to_fixed(12.0),
            range: to_fixed(800.0),
            spread: to_fixed(0.02),
            pellets: 1,
        },
        Weapon::Shotgun => WeaponStats {
            base_damage: 7, // 7 per pellet * 5 pellets = 35 total
            base_cooldown_ticks: 24,
            projectile_speed: to_fixed(8.0),
            range: to_fixed(400.0),
            spread: to_fixed(0.15),
            pellets: 5,
        },
        Weapon::Sniper => WeaponStats {
            base_damage: 50,
            base_cooldown_ticks: 36,
            projectile_speed: to_fixed(15.0),
            range: to_fixed(1200.0),
            spread: 0,
            pellets: 1,
        },
    }
}

/// `base_damage * (1 + 0.15 * damage_stacks)`.
pub fn effective_damage(base_damage: i32, damage_stacks: u8) -> i32 {
    let mult = FIXED_ONE + fixed_mul(crate::core::fixed::DAMAGE_STACK_BONUS, to_fixed(damage_stacks as f64));
    fixed_mul(to_fixed(base_damage as f64), mult) / FIXED_ONE
}

/// `ceil(base_cooldown * 0.80^firerate_stacks)`.
pub fn effective_cooldown(base_cooldown_ticks: u32, firerate_stacks: u8) -> u32 {
    let mut scaled = to_fixed(base_cooldown_ticks as f64);
    for _ in 0..firerate_stacks {
        scaled = fixed_mul(scaled, crate::core::fixed::FIRERATE_STACK_MULT);
    }
    let whole = scaled / FIXED_ONE;
    let frac = scaled - whole * FIXED_ONE;
    (if frac > 0 { whole + 1 } else { whole }).max(1) as u32
}

/// Reason a fire request was rejected without spawning a projectile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FireRejection {
    /// Player is dead.
    Dead,
    /// `server_tick - last_fire_tick < effective_cooldown`.
    OnCooldown,
}

/// Validate and, on success, spawn projectile(s) for a fire request. `rewound_positions`
/// is the per-player position snapshot at the lag-compensated tick used only to resolve
/// the projectiles' initial placement; subsequent integration always uses live positions.
#[allow(clippy::too_many_arguments)]
pub fn try_fire(
    world: &mut World,
    shooter_id: PlayerId,
    aim_angle: Fixed,
    rewound_shooter_position: FixedVec2,
) -> Result<(), FireRejection> {
    let tick = world.tick;
    let (weapon, damage_stacks, last_fire_tick) = {
        let shooter = world.players.get(&shooter_id).ok_or(FireRejection::Dead)?;
        if !shooter.alive {
            return Err(FireRejection::Dead);
        }
        (shooter.weapon, shooter.damage_stacks, shooter.last_fire_tick)
    };

    let stats = weapon_stats(weapon);
    let firerate_stacks = world.players[&shooter_id].firerate_stacks;
    let cooldown = effective_cooldown(stats.base_cooldown_ticks, firerate_stacks) as u64;
    if last_fire_tick != u64::MAX && tick.saturating_sub(last_fire_tick) < cooldown {
        return Err(FireRejection::OnCooldown);
    }

    let damage = effective_damage(stats.base_damage, damage_stacks);
    let expires_after = (stats.range / stats.projectile_speed).max(1) as u64;

    for pellet in 0..stats.pellets {
        let angle_offset = if stats.pellets <= 1 {
            0
        } else {
            let span = fixed_mul(stats.spread, to_fixed(2.0));
            let step = span / (stats.pellets as i32 - 1).max(1);
            -stats.spread + step * pellet as i32
        };
        let angle = aim_angle + angle_offset;
        let (sin, cos) = approx_sin_cos(angle);
        let velocity = FixedVec2::new(fixed_mul(cos, stats.projectile_speed), fixed_mul(sin, stats.projectile_speed));

        let id = world.alloc_projectile_id();
        world.projectiles.insert(
            id,
            Projectile {
                id,
                owner_id: shooter_id,
                position: rewound_shooter_position,
                prev_position: rewound_shooter_position,
                velocity,
                damage,
                spawn_tick: tick,
                expires_at_tick: tick + expires_after,
            },
        );
    }

    if let Some(shooter) = world.players.get_mut(&shooter_id) {
        shooter.last_fire_tick = tick;
    }

    Ok(())
}

/// Integrate all projectiles one tick and resolve hits: obstacles first (terminate,
/// no damage), then live players (owner excluded).
pub fn step_projectiles(world: &mut World) {
    let ids: Vec<_> = world.projectiles.keys().copied().collect();
    let player_ids: Vec<PlayerId> = world.players.keys().copied().collect();

    for id in ids {
        let Some(proj) = world.projectiles.get_mut(&id) else { continue };
        proj.prev_position = proj.position;
        proj.position = proj.position.add(proj.velocity);
        let (prev, curr, owner, damage) = (proj.prev_position, proj.position, proj.owner_id, proj.damage);

        if world.tick >= proj.expires_at_tick {
            world.projectiles.remove(&id);
            continue;
        }

        if sweeps_any_obstacle(&world.obstacles, prev, curr) {
            world.projectiles.remove(&id);
            continue;
        }

        if let Some(victim_id) = first_player_hit(world, &player_ids, owner, prev, curr) {
            apply_hit(world, owner, victim_id, damage);
            world.projectiles.remove(&id);
        }
    }
}

fn sweeps_any_obstacle(obstacles: &[Obstacle], from: FixedVec2, to: FixedVec2) -> bool {
    obstacles.iter().any(|o| segment_hits_obstacle(o, from, to))
}

fn segment_hits_obstacle(obstacle: &Obstacle, from: FixedVec2, to: FixedVec2) -> bool {
    match obstacle {
        Obstacle::Rect { center, half_extent } => {
            segment_hits_rect(from, to, *center, *half_extent)
        }
        Obstacle::Polyline { points, half_width } => points
            .windows(2)
            .any(|w| segment_distance_within(from, to, w[0], w[1], *half_width)),
    }
}

fn segment_hits_rect(from: FixedVec2, to: FixedVec2, center: FixedVec2, half_extent: FixedVec2) -> bool {
    // Sample along the segment; sufficient at projectile speeds relative to rect size.
    const SAMPLES: i32 = 8;
    for i in 0..=SAMPLES {
        let t = to_fixed(i as f64) / SAMPLES;
        let p = from.lerp(to, t);
        let local = p.sub(center);
        if local.x.abs() <= half_extent.x && local.y.abs() <= half_extent.y {
            return true;
        }
    }
    false
}

fn segment_distance_within(from: FixedVec2, to: FixedVec2, a: FixedVec2, b: FixedVec2, half_width: Fixed) -> bool {
    const SAMPLES: i32 = 8;
    let threshold_sq = fixed_mul(half_width, half_width);
    for i in 0..=SAMPLES {
        let t = to_fixed(i as f64) / SAMPLES;
        let p = from.lerp(to, t);
        if distance_squared_to_segment(p, a, b) <= threshold_sq {
            return true;
        }
    }
    false
}

fn distance_squared_to_segment(point: FixedVec2, start: FixedVec2, end: FixedVec2) -> Fixed {
    let ab = end.sub(start);
    let ab_len_sq = ab.dot(ab);
    if ab_len_sq == 0 {
        return point.distance_squared(start);
    }
    let ap = point.sub(start);
    let t = fixed_div(ap.dot(ab), ab_len_sq);
    let t_clamped = if t < 0 { 0 } else if t > FIXED_ONE { FIXED_ONE } else { t };
    let closest = start.add(ab.scale(t_clamped));
    point.distance_squared(closest)
}

fn first_player_hit(
    world: &World,
    player_ids: &[PlayerId],
    owner: PlayerId,
    from: FixedVec2,
    to: FixedVec2,
) -> Option<PlayerId> {
    for &id in player_ids {
        if id == owner {
            continue;
        }
        let Some(player) = world.players.get(&id) else { continue };
        if !player.alive {
            continue;
        }
        let radius_sq = fixed_mul(player.radius, player.radius);
        if distance_squared_to_segment(player.position, from, to) <= radius_sq {
            return Some(id);
        }
    }
    None
}

fn apply_hit(world: &mut World, attacker_id: PlayerId, victim_id: PlayerId, damage: i32) {
    let Some(victim) = world.players.get_mut(&victim_id) else { return };
    let health_loss = victim.apply_damage(damage);
    let victim_health_after = victim.health;
    let victim_shield_after = victim.shield;
    let victim_died = !victim.alive;

    if let Some(attacker) = world.players.get_mut(&attacker_id) {
        attacker.damage_dealt += health_loss.max(0) as u32;
    }

    world.push_event(GameEvent::hit(world.tick, attacker_id, victim_id, damage, victim_health_after, victim_shield_after));

    if victim_died {
        world.eliminate_player(victim_id, Some(attacker_id));
    }
}

/// Small fixed-point sine/cosine approximation (Bhaskara I), sufficient for aim direction;
/// determinism only requires the same approximation on every platform, not trig accuracy.
fn approx_sin_cos(angle: Fixed) -> (Fixed, Fixed) {
    let two_pi = to_fixed(2.0 * std::f64::consts::PI);
    let mut a = angle % two_pi;
    if a < 0 {
        a += two_pi;
    }
    let half_pi = to_fixed(std::f64::consts::FRAC_PI_2);
    let sin = bhaskara_sin(a);
    let cos = bhaskara_sin(a + half_pi);
    (sin, cos)
}

fn bhaskara_sin(x: Fixed) -> Fixed {
    let pi = to_fixed(std::f64::consts::PI);
    let two_pi = pi * 2;
    let mut x = x % two_pi;
    if x < 0 {
        x += two_pi;
    }
    let sign = if x > pi {
        x -= pi;
        -1
    } else {
        1
    };
    let num = fixed_mul(to_fixed(16.0), fixed_mul(x, pi - x));
    let den = fixed_mul(to_fixed(5.0), fixed_mul(pi, pi)) - fixed_mul(x, pi - x);
    let result = fixed_div(num, den.max(1));
    result * sign
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::PlayerId;

    fn pid(byte: u8) -> PlayerId {
        PlayerId([byte; 16])
    }

    #[test]
    fn effective_damage_scales_with_stacks() {
        assert_eq!(effective_damage(20, 0), 20);
        // 20 * 1.15 = 23
        assert_eq!(effective_damage(20, 1), 23);
    }

    #[test]
    fn effective_cooldown_shrinks_with_firerate_stacks() {
        let c0 = effective_cooldown(15, 0);
        let c1 = effective_cooldown(15, 1);
        let c3 = effective_cooldown(15, 3);
        assert_eq!(c0, 15);
        assert!(c1 < c0);
        assert!(c3 < c1);
    }

    #[test]
    fn fire_rejected_on_cooldown() {
        let mut world = World::new([0u8; 16], 1);
        world.add_player(pid(1), FixedVec2::ZERO);
        world.tick = 5;
        world.players.get_mut(&pid(1)).unwrap().last_fire_tick = 1;
        world.players.get_mut(&pid(1)).unwrap().weapon = Weapon::Rifle; // cooldown 12
        let result = try_fire(&mut world, pid(1), 0, FixedVec2::ZERO);
        assert_eq!(result, Err(FireRejection::OnCooldown));
    }

    #[test]
    fn fire_rejected_when_dead() {
        let mut world = World::new([0u8; 16], 1);
        world.add_player(pid(1), FixedVec2::ZERO);
        world.players.get_mut(&pid(1)).unwrap().alive = false;
        assert_eq!(try_fire(&mut world, pid(1), 0, FixedVec2::ZERO), Err(FireRejection::Dead));
    }

    #[test]
    fn shotgun_spawns_five_pellets() {
        let mut world = World::new([0u8; 16], 1);
        world.add_player(pid(1), FixedVec2::ZERO);
        world.players.get_mut(&pid(1)).unwrap().weapon = Weapon::Shotgun;
        try_fire(&mut world, pid(1), 0, FixedVec2::ZERO).unwrap();
        assert_eq!(world.projectiles.len(), 5);
    }

    #[test]
    fn hit_applies_shield_before_health() {
        let mut world = World::new([0u8; 16], 1);
        world.add_player(pid(1), FixedVec2::ZERO);
        world.add_player(pid(2), FixedVec2::ZERO);
        world.players.get_mut(&pid(2)).unwrap().shield_stacks = 1;
        world.players.get_mut(&pid(2)).unwrap().shield = 50;
        apply_hit(&mut world, pid(1), pid(2), 30);
        assert_eq!(world.players[&pid(2)].shield, 20);
        assert_eq!(world.players[&pid(2)].health, crate::core::fixed::MAX_HP);
    }
}
