//! Game State Definitions
//!
//! All state types for match simulation.
//! Uses BTreeMap for deterministic iteration order.

use std::collections::{BTreeMap, VecDeque};
use serde::{Serialize, Deserialize};

use crate::core::fixed::{
    Fixed, FIXED_ONE,
    BASE_SPEED, PLAYER_RADIUS, MAX_HP, MAX_SHIELD, STACK_SHIELD,
    MAP_HALF_WIDTH, MAP_HALF_HEIGHT,
};
use crate::core::vec2::FixedVec2;
use crate::core::rng::DeterministicRng;
use crate::core::hash::{StateHash, StateHasher, compute_state_hash};
use crate::game::events::GameEvent;

/// Number of ticks of player-position history retained for lag compensation.
/// Must cover at least 350ms at 30 Hz: ceil(350 / 33.333) = 11, rounded up for slack.
pub const HISTORY_TICKS: usize = 16;

// =============================================================================
// PLAYER ID
// =============================================================================

/// Unique player identifier (UUID as bytes). Equal to the external user_id.
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Default)]
pub struct PlayerId(pub [u8; 16]);

impl PlayerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s)
            .ok()
            .map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

/// Opaque projectile identifier, unique within one match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct ProjectileId(pub u32);

/// Opaque loot identifier, unique within one match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct LootId(pub u32);

// =============================================================================
// WEAPON
// =============================================================================

/// Equippable weapon kind. Stats are looked up in [`crate::game::combat::weapon_stats`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum Weapon {
    /// Starting weapon: low damage, fast cooldown.
    #[default]
    Pistol,
    /// Balanced mid-range weapon.
    Rifle,
    /// Multi-pellet, short range.
    Shotgun,
    /// High damage, long range, slow cooldown.
    Sniper,
}

// =============================================================================
// LOOT KIND
// =============================================================================

/// Loot effect kind. Dispatch lives in [`crate::game::loot::apply_pickup`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LootKind {
    /// Adds one shield stack, refills shield to the new cap.
    Shield,
    /// Adds one damage stack (caps at 3).
    DamageBoost,
    /// Adds one fire-rate stack (caps at 3).
    FireRateBoost,
    /// Replaces current weapon with the Rifle.
    WeaponRifle,
    /// Replaces current weapon with the Shotgun.
    WeaponShotgun,
    /// Replaces current weapon with the Sniper.
    WeaponSniper,
}

impl LootKind {
    /// Weighted spawn table from the runtime loot generation step:
    /// Shield 25%, Rifle 20%, Shotgun 15%, Sniper 10%, DamageBoost 15%, FireRateBoost 15%.
    pub const WEIGHTS: [(LootKind, u32); 6] = [
        (LootKind::Shield, 25),
        (LootKind::WeaponRifle, 20),
        (LootKind::WeaponShotgun, 15),
        (LootKind::WeaponSniper, 10),
        (LootKind::DamageBoost, 15),
        (LootKind::FireRateBoost, 15),
    ];
}

// =============================================================================
// PLAYER
// =============================================================================

/// One participant's simulation state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Player {
    /// Stable identity, equal to the external user_id.
    pub id: PlayerId,
    /// Current position.
    pub position: FixedVec2,
    /// Current velocity (units/tick).
    pub velocity: FixedVec2,
    /// Facing angle, fixed-point radians.
    pub facing: Fixed,
    /// Collision radius.
    pub radius: Fixed,
    /// Current health, 0..=MAX_HP.
    pub health: i32,
    /// Current shield, 0..=shield_stacks*STACK_SHIELD.
    pub shield: i32,
    /// Shield stacks, 0..=3.
    pub shield_stacks: u8,
    /// Damage stacks, 0..=3.
    pub damage_stacks: u8,
    /// Fire-rate stacks, 0..=3.
    pub firerate_stacks: u8,
    /// Currently equipped weapon.
    pub weapon: Weapon,
    /// Tick of the last accepted fire input.
    pub last_fire_tick: u64,
    /// Sequence number of the last accepted input frame (movement staleness guard).
    pub last_accepted_seq: u32,
    /// Whether the player is still alive.
    pub alive: bool,
    /// Kills credited to this player.
    pub kills: u32,
    /// Total damage dealt by this player.
    pub damage_dealt: u32,
    /// Ticks survived (incremented each tick while alive).
    pub survival_ticks: u64,
    /// Final placement (1 = winner), assigned at elimination or match end.
    pub placement: Option<u32>,
    /// True while the connection is in its reconnect grace window.
    pub disconnected_since_tick: Option<u64>,
}

impl Player {
    /// Spawn a fresh player at `position`.
    pub fn new(id: PlayerId, position: FixedVec2) -> Self {
        Self {
            id,
            position,
            velocity: FixedVec2::ZERO,
            facing: 0,
            radius: PLAYER_RADIUS,
            health: MAX_HP,
            shield: 0,
            shield_stacks: 0,
            damage_stacks: 0,
            firerate_stacks: 0,
            weapon: Weapon::Pistol,
            last_fire_tick: u64::MAX, // sentinel: no shot fired yet
            last_accepted_seq: 0,
            alive: true,
            kills: 0,
            damage_dealt: 0,
            survival_ticks: 0,
            placement: None,
            disconnected_since_tick: None,
        }
    }

    /// Shield capacity for the player's current stack count.
    #[inline]
    pub fn shield_cap(&self) -> i32 {
        self.shield_stacks as i32 * STACK_SHIELD
    }

    /// Apply `amount` damage, shield first, then health. Returns the damage that reached health.
    pub fn apply_damage(&mut self, amount: i32) -> i32 {
        let absorbed = amount.min(self.shield);
        self.shield -= absorbed;
        let remainder = amount - absorbed;
        let health_loss = remainder.min(self.health);
        self.health -= health_loss;
        if self.health <= 0 {
            self.health = 0;
            self.alive = false;
        }
        health_loss
    }

    /// Hash this player's state into `hasher`, in a fixed field order.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_uuid(&self.id.0);
        hasher.update_vec2(self.position);
        hasher.update_vec2(self.velocity);
        hasher.update_fixed(self.facing);
        hasher.update_i32(self.health);
        hasher.update_i32(self.shield);
        hasher.update_u8(self.shield_stacks);
        hasher.update_u8(self.damage_stacks);
        hasher.update_u8(self.firerate_stacks);
        hasher.update_u8(self.weapon as u8);
        hasher.update_bool(self.alive);
        hasher.update_u32(self.kills);
    }
}

// =============================================================================
// PROJECTILE
// =============================================================================

/// A single fired shot in flight.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Projectile {
    /// Identity, unique per match.
    pub id: ProjectileId,
    /// Firing player; excluded from its own hit tests.
    pub owner_id: PlayerId,
    /// Current position.
    pub position: FixedVec2,
    /// Position at the previous tick, used for the sweep test.
    pub prev_position: FixedVec2,
    /// Velocity (units/tick).
    pub velocity: FixedVec2,
    /// Damage, fixed at fire time (includes the owner's damage boost).
    pub damage: i32,
    /// Tick the projectile was spawned.
    pub spawn_tick: u64,
    /// Tick after which the projectile expires even if it hasn't hit anything.
    pub expires_at_tick: u64,
}

// =============================================================================
// OBSTACLE
// =============================================================================

/// Immutable collision geometry, fixed for the match's lifetime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Obstacle {
    /// Axis-aligned rectangle given by its center and half-extents.
    Rect {
        /// Rectangle center.
        center: FixedVec2,
        /// Half-width and half-height.
        half_extent: FixedVec2,
    },
    /// A chain of line segments (walls), `half_width` thick.
    Polyline {
        /// Ordered vertices; each consecutive pair is one segment.
        points: Vec<FixedVec2>,
        /// Half-thickness applied to every segment.
        half_width: Fixed,
    },
}

// =============================================================================
// LOOT
// =============================================================================

/// A pickup on the ground.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Loot {
    /// Identity, unique per match.
    pub id: LootId,
    /// World position.
    pub position: FixedVec2,
    /// Effect kind.
    pub kind: LootKind,
}

// =============================================================================
// SAFE ZONE
// =============================================================================

/// Safe zone lifecycle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZonePhase {
    /// Holding at full radius.
    Hold,
    /// Linearly shrinking toward `target_radius`.
    Shrink,
    /// Holding at `FINAL_RADIUS`, no further shrink cycles.
    Final,
}

/// The shrinking play area.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SafeZone {
    /// Current center.
    pub center: FixedVec2,
    /// Radius at the start of the current phase.
    pub start_radius: Fixed,
    /// Current radius (interpolated during Shrink).
    pub current_radius: Fixed,
    /// Radius this phase is shrinking toward.
    pub target_radius: Fixed,
    /// Tick the current phase began.
    pub phase_start_tick: u64,
    /// Tick the current phase ends.
    pub phase_end_tick: u64,
    /// Current phase.
    pub phase: ZonePhase,
}

// =============================================================================
// MATCH PHASE
// =============================================================================

/// Coarse match lifecycle, distinct from the zone's own phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// Players are being spawned and the map is being generated; not yet simulating.
    Countdown {
        /// Ticks remaining before the world starts ticking.
        ticks_remaining: u32,
    },
    /// Normal simulation.
    Playing,
    /// Match has concluded; tick() becomes a no-op.
    Ended,
}

// =============================================================================
// WORLD
// =============================================================================

/// One match's authoritative simulation state. Owned exclusively by its Match Runtime task.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct World {
    /// Match identity.
    pub match_id: [u8; 16],
    /// Current lifecycle phase.
    pub phase: MatchPhase,
    /// Seed this match's RNG was derived from (block hash + match id + sorted player ids).
    pub rng_seed: u64,
    /// Deterministic RNG, advanced only inside the tick loop.
    pub rng: DeterministicRng,
    /// Monotonic tick counter.
    pub tick: u64,
    /// Players, keyed by id for deterministic iteration.
    pub players: BTreeMap<PlayerId, Player>,
    /// In-flight projectiles.
    pub projectiles: BTreeMap<ProjectileId, Projectile>,
    /// Immutable collision geometry.
    pub obstacles: Vec<Obstacle>,
    /// Ground pickups.
    pub loot: BTreeMap<LootId, Loot>,
    /// The shrinking play area.
    pub safe_zone: SafeZone,
    /// Next projectile id to hand out.
    pub next_projectile_id: u32,
    /// Next loot id to hand out.
    pub next_loot_id: u32,
    /// Count of players still alive; tracked incrementally to avoid a full scan each tick.
    pub alive_count: u32,
    /// Next placement to assign (counts down from player_count as eliminations occur).
    pub next_placement_from_back: u32,
    /// Events generated this tick, drained by the transport layer after each tick.
    #[serde(skip)]
    pub pending_events: Vec<GameEvent>,
    /// Ring of recent per-tick player snapshots, for lag-compensated hit resolution.
    #[serde(skip)]
    pub history: VecDeque<BTreeMap<PlayerId, PlayerSnapshot>>,
}

/// A minimal per-tick position/radius/alive snapshot retained in [`World::history`]
/// so that hit resolution can rewind to an earlier tick for lag compensation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// Position at the snapshotted tick.
    pub position: FixedVec2,
    /// Collision radius at the snapshotted tick.
    pub radius: Fixed,
    /// Whether the player was alive at the snapshotted tick.
    pub alive: bool,
}

impl World {
    /// Construct an empty world; caller is responsible for map generation, loot spawn,
    /// and player placement (see [`crate::runtime::MatchRuntime::spawn`]).
    pub fn new(match_id: [u8; 16], rng_seed: u64) -> Self {
        Self {
            match_id,
            phase: MatchPhase::Countdown { ticks_remaining: 0 },
            rng_seed,
            rng: DeterministicRng::new(rng_seed),
            tick: 0,
            players: BTreeMap::new(),
            projectiles: BTreeMap::new(),
            obstacles: Vec::new(),
            loot: BTreeMap::new(),
            safe_zone: SafeZone {
                center: FixedVec2::ZERO,
                start_radius: MAP_HALF_WIDTH,
                current_radius: MAP_HALF_WIDTH,
                target_radius: MAP_HALF_WIDTH,
                phase_start_tick: 0,
                phase_end_tick: 0,
                phase: ZonePhase::Hold,
            },
            next_projectile_id: 0,
            next_loot_id: 0,
            alive_count: 0,
            next_placement_from_back: 0,
            pending_events: Vec::new(),
            history: VecDeque::with_capacity(HISTORY_TICKS),
        }
    }

    /// Add a player to the world, updating the alive count and placement counter.
    pub fn add_player(&mut self, id: PlayerId, position: FixedVec2) {
        self.players.insert(id, Player::new(id, position));
        self.alive_count += 1;
        self.next_placement_from_back += 1;
    }

    /// Allocate the next projectile id.
    pub fn alloc_projectile_id(&mut self) -> ProjectileId {
        let id = ProjectileId(self.next_projectile_id);
        self.next_projectile_id += 1;
        id
    }

    /// Allocate the next loot id.
    pub fn alloc_loot_id(&mut self) -> LootId {
        let id = LootId(self.next_loot_id);
        self.next_loot_id += 1;
        id
    }

    /// Eliminate `victim_id`, crediting `killer_id` if present. Assigns placement in
    /// reverse elimination order: the first player eliminated gets the highest placement
    /// number, the winner (last alive) gets placement 1.
    pub fn eliminate_player(&mut self, victim_id: PlayerId, killer_id: Option<PlayerId>) {
        match self.players.get(&victim_id) {
            Some(victim) if victim.alive => {}
            _ => return,
        }

        let placement = self.next_placement_from_back;
        self.next_placement_from_back -= 1;

        let victim = self.players.get_mut(&victim_id).expect("checked above");
        victim.alive = false;
        victim.health = 0;
        victim.placement = Some(placement);
        self.alive_count = self.alive_count.saturating_sub(1);

        if let Some(killer_id) = killer_id {
            if let Some(killer) = self.players.get_mut(&killer_id) {
                killer.kills += 1;
            }
        }

        let mut event = GameEvent::kill(self.tick, victim_id, killer_id);
        if let crate::game::events::GameEventData::Elimination { placement: p, .. } = &mut event.data {
            *p = placement;
        }
        self.pending_events.push(event);
    }

    /// Assign placement 1 to the sole remaining alive player, if any.
    pub fn crown_winner(&mut self) {
        let winner_id = self
            .players
            .values()
            .find(|p| p.alive)
            .map(|p| p.id);
        if let Some(winner_id) = winner_id {
            if let Some(winner) = self.players.get_mut(&winner_id) {
                winner.placement = Some(1);
            }
        }
    }

    /// True once at most one player remains alive.
    pub fn is_ended(&self) -> bool {
        self.alive_count <= 1
    }

    /// Final placements, sorted ascending (1 = winner first). Players without a placement
    /// (should not happen once `crown_winner` has run) sort last.
    pub fn get_placements(&self) -> Vec<(PlayerId, u32)> {
        let mut placements: Vec<(PlayerId, u32)> = self
            .players
            .values()
            .map(|p| (p.id, p.placement.unwrap_or(u32::MAX)))
            .collect();
        placements.sort_by_key(|&(_, placement)| placement);
        placements
    }

    /// Push the current tick's player positions into the lag-compensation history ring.
    pub fn push_history(&mut self) {
        let snapshot: BTreeMap<PlayerId, PlayerSnapshot> = self
            .players
            .iter()
            .map(|(id, p)| (*id, PlayerSnapshot { position: p.position, radius: p.radius, alive: p.alive }))
            .collect();
        self.history.push_back(snapshot);
        while self.history.len() > HISTORY_TICKS {
            self.history.pop_front();
        }
    }

    /// Look up the history snapshot `ticks_back` ticks before the present, clamped to the
    /// oldest retained tick.
    pub fn history_at(&self, ticks_back: u64) -> Option<&BTreeMap<PlayerId, PlayerSnapshot>> {
        if self.history.is_empty() {
            return None;
        }
        let back = (ticks_back as usize).min(self.history.len() - 1);
        let idx = self.history.len() - 1 - back;
        self.history.get(idx)
    }

    /// Compute a deterministic hash of the full world state (players, projectiles, loot,
    /// zone, tick). Used to verify replay determinism across independent runs.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.tick as u32, self.rng_seed, |hasher| {
            for player in self.players.values() {
                player.hash_into(hasher);
            }
            for projectile in self.projectiles.values() {
                hasher.update_u32(projectile.id.0);
                hasher.update_vec2(projectile.position);
                hasher.update_i32(projectile.damage);
            }
            for loot in self.loot.values() {
                hasher.update_u32(loot.id.0);
                hasher.update_vec2(loot.position);
            }
            hasher.update_vec2(self.safe_zone.center);
            hasher.update_fixed(self.safe_zone.current_radius);
        })
    }

    /// Drain and return this tick's accumulated events, in generation order.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Record an event for delivery to clients after this tick.
    pub fn push_event(&mut self, event: GameEvent) {
        self.pending_events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(byte: u8) -> PlayerId {
        PlayerId([byte; 16])
    }

    #[test]
    fn player_apply_damage_shield_first() {
        let mut p = Player::new(pid(1), FixedVec2::ZERO);
        p.shield_stacks = 1;
        p.shield = 50;
        let health_loss = p.apply_damage(30);
        assert_eq!(health_loss, 0);
        assert_eq!(p.shield, 20);
        assert_eq!(p.health, MAX_HP);

        let health_loss = p.apply_damage(40);
        assert_eq!(health_loss, 20);
        assert_eq!(p.shield, 0);
        assert_eq!(p.health, MAX_HP - 20);
    }

    #[test]
    fn player_apply_damage_kills_at_zero_health() {
        let mut p = Player::new(pid(1), FixedVec2::ZERO);
        p.apply_damage(1000);
        assert_eq!(p.health, 0);
        assert!(!p.alive);
    }

    #[test]
    fn eliminate_player_assigns_reverse_order_placement() {
        let mut world = World::new([0u8; 16], 1);
        for i in 0..4u8 {
            world.add_player(pid(i), FixedVec2::ZERO);
        }
        assert_eq!(world.alive_count, 4);

        world.eliminate_player(pid(0), Some(pid(1)));
        assert_eq!(world.players[&pid(0)].placement, Some(4));
        assert_eq!(world.players[&pid(1)].kills, 1);
        assert_eq!(world.alive_count, 3);

        world.eliminate_player(pid(2), Some(pid(1)));
        assert_eq!(world.players[&pid(2)].placement, Some(3));
        assert_eq!(world.alive_count, 2);

        world.eliminate_player(pid(3), Some(pid(1)));
        assert_eq!(world.players[&pid(3)].placement, Some(2));
        assert_eq!(world.alive_count, 1);

        assert!(world.is_ended());
        world.crown_winner();
        assert_eq!(world.players[&pid(1)].placement, Some(1));

        let placements = world.get_placements();
        assert_eq!(placements[0], (pid(1), 1));
        assert_eq!(placements[3].1, 4);
    }

    #[test]
    fn double_elimination_is_noop() {
        let mut world = World::new([0u8; 16], 1);
        world.add_player(pid(0), FixedVec2::ZERO);
        world.add_player(pid(1), FixedVec2::ZERO);
        world.eliminate_player(pid(0), Some(pid(1)));
        let kills_after_first = world.players[&pid(1)].kills;
        world.eliminate_player(pid(0), Some(pid(1)));
        assert_eq!(world.players[&pid(1)].kills, kills_after_first);
    }

    #[test]
    fn hash_is_deterministic_and_order_independent_of_insertion() {
        let mut w1 = World::new([0u8; 16], 42);
        let mut w2 = World::new([0u8; 16], 42);
        w1.add_player(pid(3), FixedVec2::new(FIXED_ONE, 0));
        w1.add_player(pid(1), FixedVec2::new(0, FIXED_ONE));
        w2.add_player(pid(1), FixedVec2::new(0, FIXED_ONE));
        w2.add_player(pid(3), FixedVec2::new(FIXED_ONE, 0));
        assert_eq!(w1.compute_hash(), w2.compute_hash());
    }

    #[test]
    fn history_ring_caps_at_history_ticks() {
        let mut world = World::new([0u8; 16], 1);
        world.add_player(pid(0), FixedVec2::ZERO);
        for t in 0..(HISTORY_TICKS as u64 + 5) {
            world.tick = t;
            world.push_history();
        }
        assert_eq!(world.history.len(), HISTORY_TICKS);
    }
}
