//! Loot System
//!
//! Weighted initial spawn and atomic, stack-capped pickup effects. Loot does not
//! respawn during a match.

use crate::core::fixed::{Fixed, STACK_SHIELD};
use crate::core::vec2::FixedVec2;
use crate::game::events::GameEvent;
use crate::game::state::{Loot, LootKind, PlayerId, Weapon, World};

/// Loot items per unit of map area used to size the initial spawn.
pub const LOOT_DENSITY: Fixed = 26; // ~0.0004 items/unit^2 in Q16.16

/// Spawn the initial loot field at `positions.len()` candidate points, drawing kinds
/// from the weighted table. `positions` are pre-validated spawn-free locations chosen
/// by the caller (map generation owns reachability).
pub fn spawn_initial_loot(world: &mut World, positions: &[FixedVec2]) {
    for &position in positions {
        let kind = roll_loot_kind(world);
        let id = world.alloc_loot_id();
        world.loot.insert(id, Loot { id, position, kind });
    }
}

fn roll_loot_kind(world: &mut World) -> LootKind {
    let total: u32 = LootKind::WEIGHTS.iter().map(|(_, w)| w).sum();
    let mut roll = world.rng.next_int(total);
    for (kind, weight) in LootKind::WEIGHTS {
        if roll < weight {
            return kind;
        }
        roll -= weight;
    }
    LootKind::WEIGHTS[0].0
}

/// Check every alive player against every uncollected loot item, in deterministic
/// (player ascending, then loot ascending) order, and apply the first match per item.
pub fn resolve_pickups(world: &mut World) {
    let player_ids: Vec<PlayerId> = world.players.keys().copied().collect();
    let loot_ids: Vec<_> = world.loot.keys().copied().collect();

    for loot_id in loot_ids {
        let Some(loot) = world.loot.get(&loot_id) else { continue };
        let (loot_position, loot_kind) = (loot.position, loot.kind);

        let picked_up_by = player_ids.iter().copied().find(|id| {
            world.players.get(id).is_some_and(|p| {
                p.alive && player_overlaps_point(p.position, p.radius, loot_position)
            })
        });

        if let Some(player_id) = picked_up_by {
            apply_pickup(world, player_id, loot_kind);
            world.loot.remove(&loot_id);
            world.push_event(GameEvent::pickup(world.tick, player_id, loot_id, loot_kind));
        }
    }
}

fn player_overlaps_point(player_position: FixedVec2, radius: Fixed, point: FixedVec2) -> bool {
    let radius_sq = crate::core::fixed::fixed_mul(radius, radius);
    player_position.distance_squared(point) <= radius_sq
}

/// Apply `kind`'s effect to `player_id`. A no-op if the cap is already reached.
fn apply_pickup(world: &mut World, player_id: PlayerId, kind: LootKind) {
    let Some(player) = world.players.get_mut(&player_id) else { return };
    match kind {
        LootKind::Shield => {
            if player.shield_stacks < 3 {
                player.shield_stacks += 1;
                player.shield = player.shield_stacks as i32 * STACK_SHIELD;
            }
        }
        LootKind::DamageBoost => {
            player.damage_stacks = (player.damage_stacks + 1).min(3);
        }
        LootKind::FireRateBoost => {
            player.firerate_stacks = (player.firerate_stacks + 1).min(3);
        }
        LootKind::WeaponRifle => player.weapon = Weapon::Rifle,
        LootKind::WeaponShotgun => player.weapon = Weapon::Shotgun,
        LootKind::WeaponSniper => player.weapon = Weapon::Sniper,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(byte: u8) -> PlayerId {
        PlayerId([byte; 16])
    }

    #[test]
    fn shield_pickup_caps_at_three_stacks() {
        let mut world = World::new([0u8; 16], 1);
        world.add_player(pid(1), FixedVec2::ZERO);
        for _ in 0..4 {
            apply_pickup(&mut world, pid(1), LootKind::Shield);
        }
        let p = &world.players[&pid(1)];
        assert_eq!(p.shield_stacks, 3);
        assert_eq!(p.shield, 150);
    }

    #[test]
    fn pickup_is_atomic_and_removes_item() {
        let mut world = World::new([0u8; 16], 1);
        world.add_player(pid(1), FixedVec2::ZERO);
        let id = world.alloc_loot_id();
        world.loot.insert(id, Loot { id, position: FixedVec2::ZERO, kind: LootKind::DamageBoost });

        resolve_pickups(&mut world);

        assert!(world.loot.is_empty());
        assert_eq!(world.players[&pid(1)].damage_stacks, 1);

        // Second resolution pass on an already-empty item list is a no-op.
        resolve_pickups(&mut world);
        assert_eq!(world.players[&pid(1)].damage_stacks, 1);
    }
}
