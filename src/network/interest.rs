//! Interest Management
//!
//! Builds each recipient's filtered [`SnapshotPayload`] from the authoritative
//! [`World`]: entities outside the viewer's radius are omitted, entities that
//! left the set since the viewer's last acknowledged tick are reported via
//! `removed`, and a full keyframe is forced periodically so a client can never
//! drift permanently out of sync from a dropped delta.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::fixed::Fixed;
use crate::game::state::{LootId, PlayerId, ProjectileId, World};
use crate::network::protocol::{LootView, PlayerView, ProjectileView, RemovedEntity, SnapshotPayload, ZoneView};

/// Tracks what one recipient has previously been shown, so deltas can report removals.
#[derive(Debug, Clone, Default)]
pub struct InterestState {
    visible_players: BTreeSet<PlayerId>,
    visible_projectiles: BTreeSet<ProjectileId>,
    visible_loot: BTreeSet<LootId>,
    ticks_since_keyframe: u32,
}

impl InterestState {
    /// Fresh state for a newly (re)connected viewer; their next snapshot is a full keyframe.
    pub fn new() -> Self {
        Self { ticks_since_keyframe: u32::MAX, ..Default::default() }
    }

    /// Build the next snapshot for `viewer` centered on their own position.
    ///
    /// Entities whose distance to the viewer exceeds `radius` are excluded; any
    /// entity visible in the previous call that falls outside this call's set is
    /// reported in `removed`. Every `keyframe_interval` ticks, the full world
    /// (ignoring radius) is sent and `removed` is left empty, since a keyframe
    /// resets the client's view from scratch.
    pub fn build_snapshot(
        &mut self,
        world: &World,
        viewer: PlayerId,
        radius: Fixed,
        keyframe_interval: u32,
    ) -> SnapshotPayload {
        let is_full = self.ticks_since_keyframe >= keyframe_interval;

        let origin = world.players.get(&viewer).map(|p| p.position);

        let mut players = Vec::new();
        let mut now_visible_players = BTreeSet::new();
        for (id, player) in &world.players {
            if !is_full {
                let Some(origin) = origin else { continue };
                if origin.distance_squared(player.position) > fixed_sq(radius) {
                    continue;
                }
            }
            now_visible_players.insert(*id);
            players.push(PlayerView {
                id: id.0,
                position: player.position,
                velocity: player.velocity,
                facing: player.facing,
                health: player.health,
                shield: player.shield,
                weapon: player.weapon,
                alive: player.alive,
            });
        }

        let mut projectiles = Vec::new();
        let mut now_visible_projectiles = BTreeSet::new();
        for (id, projectile) in &world.projectiles {
            if !is_full {
                let Some(origin) = origin else { continue };
                if origin.distance_squared(projectile.position) > fixed_sq(radius) {
                    continue;
                }
            }
            now_visible_projectiles.insert(*id);
            projectiles.push(ProjectileView { id: id.0, position: projectile.position });
        }

        let mut loot = Vec::new();
        let mut now_visible_loot = BTreeSet::new();
        for (id, item) in &world.loot {
            if !is_full {
                let Some(origin) = origin else { continue };
                if origin.distance_squared(item.position) > fixed_sq(radius) {
                    continue;
                }
            }
            now_visible_loot.insert(*id);
            loot.push(LootView::from(item));
        }

        let mut removed = Vec::new();
        if !is_full {
            for id in self.visible_players.difference(&now_visible_players) {
                removed.push(RemovedEntity::Player { id: id.0 });
            }
            for id in self.visible_projectiles.difference(&now_visible_projectiles) {
                removed.push(RemovedEntity::Projectile { id: id.0 });
            }
            for id in self.visible_loot.difference(&now_visible_loot) {
                removed.push(RemovedEntity::Loot { id: id.0 });
            }
        }

        self.visible_players = now_visible_players;
        self.visible_projectiles = now_visible_projectiles;
        self.visible_loot = now_visible_loot;
        self.ticks_since_keyframe = if is_full { 0 } else { self.ticks_since_keyframe + 1 };

        SnapshotPayload { tick: world.tick, is_full, players, projectiles, loot, removed, zone: ZoneView::from(&world.safe_zone) }
    }
}

fn fixed_sq(value: Fixed) -> Fixed {
    ((value as i64 * value as i64) >> 16) as Fixed
}

/// Per-match interest state for every connected viewer, keyed by player id.
#[derive(Debug, Default)]
pub struct InterestManager {
    states: BTreeMap<PlayerId, InterestState>,
}

impl InterestManager {
    /// Construct an empty manager.
    pub fn new() -> Self {
        Self { states: BTreeMap::new() }
    }

    /// Build this tick's snapshot for `viewer`, creating fresh interest state on first contact.
    pub fn snapshot_for(
        &mut self,
        world: &World,
        viewer: PlayerId,
        radius: Fixed,
        keyframe_interval: u32,
    ) -> SnapshotPayload {
        self.states.entry(viewer).or_insert_with(InterestState::new).build_snapshot(world, viewer, radius, keyframe_interval)
    }

    /// Drop a viewer's interest state, e.g. once they disconnect.
    pub fn remove(&mut self, viewer: &PlayerId) {
        self.states.remove(viewer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::to_fixed;
    use crate::core::vec2::FixedVec2;

    fn pid(byte: u8) -> PlayerId {
        PlayerId([byte; 16])
    }

    fn world_with_two_players(far_apart: bool) -> World {
        let mut world = World::new([0; 16], 1);
        world.add_player(pid(1), FixedVec2::new(0, 0));
        let offset = if far_apart { to_fixed(5000.0) } else { to_fixed(10.0) };
        world.add_player(pid(2), FixedVec2::new(offset, 0));
        world
    }

    #[test]
    fn first_snapshot_is_always_a_full_keyframe() {
        let world = world_with_two_players(false);
        let mut state = InterestState::new();
        let snapshot = state.build_snapshot(&world, pid(1), to_fixed(800.0), 30);
        assert!(snapshot.is_full);
        assert_eq!(snapshot.players.len(), 2);
    }

    #[test]
    fn distant_player_is_excluded_after_keyframe() {
        let world = world_with_two_players(true);
        let mut state = InterestState::new();
        let _ = state.build_snapshot(&world, pid(1), to_fixed(800.0), 30);
        let snapshot = state.build_snapshot(&world, pid(1), to_fixed(800.0), 30);
        assert!(!snapshot.is_full);
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(snapshot.players[0].id, pid(1).0);
    }

    #[test]
    fn player_leaving_radius_is_reported_as_removed() {
        let mut world = world_with_two_players(false);
        let mut state = InterestState::new();
        let _ = state.build_snapshot(&world, pid(1), to_fixed(800.0), 30);

        world.players.get_mut(&pid(2)).unwrap().position = FixedVec2::new(to_fixed(5000.0), 0);
        let snapshot = state.build_snapshot(&world, pid(1), to_fixed(800.0), 30);

        assert!(snapshot.removed.iter().any(|r| matches!(r, RemovedEntity::Player { id } if *id == pid(2).0)));
    }

    #[test]
    fn keyframe_interval_forces_a_periodic_full_snapshot() {
        let world = world_with_two_players(true);
        let mut state = InterestState::new();
        let first = state.build_snapshot(&world, pid(1), to_fixed(800.0), 3);
        assert!(first.is_full);

        let mut saw_second_full = false;
        for _ in 0..6 {
            let snapshot = state.build_snapshot(&world, pid(1), to_fixed(800.0), 3);
            if snapshot.is_full {
                saw_second_full = true;
                assert_eq!(snapshot.players.len(), 2);
                break;
            }
        }
        assert!(saw_second_full, "keyframe interval never forced a second full snapshot");
    }
}
