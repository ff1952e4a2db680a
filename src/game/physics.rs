//! Physics & Collision
//!
//! Fixed-step Euler integration and the bounds → obstacles → players collision
//! resolution order.

use crate::core::fixed::{Fixed, fixed_mul, fixed_div, fixed_clamp, FIXED_ONE, TICK_DURATION, BASE_SPEED};
use crate::core::vec2::FixedVec2;
use crate::game::state::{Obstacle, PlayerId, World};

/// Integrate one tick of movement for every alive player, then resolve collisions in
/// the order bounds → obstacles → other players.
pub fn step(world: &mut World) {
    let player_ids: Vec<PlayerId> = world.players.keys().copied().collect();

    for id in &player_ids {
        let Some(player) = world.players.get_mut(id) else { continue };
        if !player.alive {
            continue;
        }
        let dx = fixed_mul(player.velocity.x, TICK_DURATION);
        let dy = fixed_mul(player.velocity.y, TICK_DURATION);
        player.position.x = player.position.x.wrapping_add(dx);
        player.position.y = player.position.y.wrapping_add(dy);
        player.position = player.position.clamp_to_bounds();
    }

    for id in &player_ids {
        resolve_obstacles(world, *id);
    }

    resolve_player_pairs(world, &player_ids);
}

fn resolve_obstacles(world: &mut World, id: PlayerId) {
    let Some(player) = world.players.get(&id) else { return };
    if !player.alive {
        return;
    }
    let position = player.position;
    let radius = player.radius;

    let mut resolved = position;
    for obstacle in &world.obstacles {
        if let Some(push) = obstacle_pushback(obstacle, resolved, radius) {
            resolved = resolved.add(push);
        }
    }
    resolved = resolved.clamp_to_bounds();

    if let Some(player) = world.players.get_mut(&id) {
        player.position = resolved;
    }
}

/// Returns the outward-normal pushback vector needed to resolve an overlap with
/// `obstacle`, or `None` if the circle does not overlap it.
fn obstacle_pushback(obstacle: &Obstacle, position: FixedVec2, radius: Fixed) -> Option<FixedVec2> {
    match obstacle {
        Obstacle::Rect { center, half_extent } => {
            let local = position.sub(*center);
            let closest = FixedVec2::new(
                fixed_clamp(local.x, -half_extent.x, half_extent.x),
                fixed_clamp(local.y, -half_extent.y, half_extent.y),
            );
            let delta = local.sub(closest);
            let dist_sq = delta.length_squared();
            let radius_sq = fixed_mul(radius, radius);
            if dist_sq >= radius_sq {
                return None;
            }
            if dist_sq == 0 {
                // Center is inside the rect; push out along the shallowest axis.
                let px = half_extent.x - local.x.abs();
                let py = half_extent.y - local.y.abs();
                return Some(if px < py {
                    FixedVec2::new(if local.x < 0 { -px } else { px }, 0)
                } else {
                    FixedVec2::new(0, if local.y < 0 { -py } else { py })
                });
            }
            let dist = crate::core::fixed::fixed_sqrt(dist_sq);
            let overlap = radius - dist;
            let normal = delta.scale(fixed_div(FIXED_ONE, dist));
            Some(normal.scale(overlap))
        }
        Obstacle::Polyline { points, half_width } => {
            let mut pushback: Option<FixedVec2> = None;
            for window in points.windows(2) {
                let (a, b) = (window[0], window[1]);
                let ab = b.sub(a);
                let ab_len_sq = ab.dot(ab);
                let t = if ab_len_sq == 0 { 0 } else { fixed_clamp(fixed_div(position.sub(a).dot(ab), ab_len_sq), 0, FIXED_ONE) };
                let closest = a.add(ab.scale(t));
                let delta = position.sub(closest);
                let dist_sq = delta.length_squared();
                let combined = *half_width + radius;
                let combined_sq = fixed_mul(combined, combined);
                if dist_sq < combined_sq {
                    let dist = crate::core::fixed::fixed_sqrt(dist_sq).max(1);
                    let overlap = combined - dist;
                    let normal = delta.scale(fixed_div(FIXED_ONE, dist));
                    let push = normal.scale(overlap);
                    pushback = Some(match pushback {
                        Some(existing) if existing.length_squared() >= push.length_squared() => existing,
                        _ => push,
                    });
                }
            }
            pushback
        }
    }
}

/// Resolve overlapping player pairs by splitting the overlap equally along the
/// connecting axis, tie-broken by lower player_id pushing along the canonical direction.
fn resolve_player_pairs(world: &mut World, player_ids: &[PlayerId]) {
    for i in 0..player_ids.len() {
        for j in (i + 1)..player_ids.len() {
            let id_a = player_ids[i];
            let id_b = player_ids[j];
            let (Some(a), Some(b)) = (world.players.get(&id_a), world.players.get(&id_b)) else { continue };
            if !a.alive || !b.alive {
                continue;
            }

            let combined_radius = a.radius + b.radius;
            let delta = b.position.sub(a.position);
            let dist_sq = delta.length_squared();
            let combined_sq = fixed_mul(combined_radius, combined_radius);
            if dist_sq >= combined_sq || dist_sq == 0 {
                continue;
            }

            let dist = crate::core::fixed::fixed_sqrt(dist_sq);
            let overlap = combined_radius - dist;
            let normal = delta.scale(fixed_div(FIXED_ONE, dist));
            let half_push = normal.scale(overlap / 2);

            // id_a is always the lower id by construction (i < j in a sorted key vec).
            if let Some(a) = world.players.get_mut(&id_a) {
                a.position = a.position.sub(half_push).clamp_to_bounds();
            }
            if let Some(b) = world.players.get_mut(&id_b) {
                b.position = b.position.add(half_push).clamp_to_bounds();
            }
        }
    }
}

/// Resolve a validated input frame into a clamped velocity for one tick.
pub fn velocity_from_intent(intended: FixedVec2, speed_cap: Fixed) -> FixedVec2 {
    let len_sq = intended.length_squared();
    let cap_sq = fixed_mul(speed_cap, speed_cap);
    if len_sq <= cap_sq {
        intended
    } else {
        intended.normalize().scale(speed_cap)
    }
}
