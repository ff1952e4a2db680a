//! Game Events
//!
//! Events generated during simulation, delivered to clients after each tick
//! and folded into the replay-determinism record.

use serde::{Serialize, Deserialize};
use crate::core::vec2::FixedVec2;
use crate::game::state::{PlayerId, LootId, LootKind, ZonePhase};

/// Priority for event processing order within a single tick.
///
/// Lower value = processed first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventPriority {
    /// Eliminations are recorded before anything that could reference the victim.
    Elimination = 0,
    /// Hits, after eliminations so a killing hit and the elimination it causes order together.
    Hit = 1,
    /// Pickups.
    Pickup = 2,
    /// Safe zone phase transitions.
    ZoneTransition = 3,
    /// Match lifecycle (end, etc). Lowest priority, always last in a tick.
    Other = 255,
}

/// Game event data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum GameEventData {
    /// A projectile struck a player.
    Hit {
        attacker_id: PlayerId,
        victim_id: PlayerId,
        damage: i32,
        victim_health_after: i32,
        victim_shield_after: i32,
    },

    /// A player was eliminated.
    Elimination {
        victim_id: PlayerId,
        killer_id: Option<PlayerId>,
        placement: u32,
    },

    /// A player picked up loot.
    Pickup {
        player_id: PlayerId,
        loot_id: LootId,
        kind: LootKind,
    },

    /// The safe zone entered a new phase.
    ZonePhaseChanged {
        phase: ZonePhase,
        center: FixedVec2,
        target_radius: crate::core::fixed::Fixed,
        phase_end_tick: u64,
    },

    /// The match concluded.
    MatchEnded {
        winner_id: Option<PlayerId>,
        duration_ticks: u64,
    },
}

/// A game event with timing and priority, ordered deterministically within a tick.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameEvent {
    /// Tick the event occurred on.
    pub tick: u64,
    /// Processing / delivery priority.
    pub priority: EventPriority,
    /// Player most associated with this event, used as the final tie-break.
    pub player_id: Option<PlayerId>,
    /// Event payload.
    pub data: GameEventData,
}

impl GameEvent {
    /// Construct an event, deriving `player_id` from the payload.
    pub fn new(tick: u64, priority: EventPriority, data: GameEventData) -> Self {
        let player_id = match &data {
            GameEventData::Hit { victim_id, .. } => Some(*victim_id),
            GameEventData::Elimination { victim_id, .. } => Some(*victim_id),
            GameEventData::Pickup { player_id, .. } => Some(*player_id),
            GameEventData::MatchEnded { winner_id, .. } => *winner_id,
            GameEventData::ZonePhaseChanged { .. } => None,
        };

        Self { tick, priority, player_id, data }
    }

    /// Convenience constructor for a hit event.
    pub fn hit(
        tick: u64,
        attacker_id: PlayerId,
        victim_id: PlayerId,
        damage: i32,
        victim_health_after: i32,
        victim_shield_after: i32,
    ) -> Self {
        Self::new(
            tick,
            EventPriority::Hit,
            GameEventData::Hit { attacker_id, victim_id, damage, victim_health_after, victim_shield_after },
        )
    }

    /// Convenience constructor for an elimination event. `placement` is filled in by the
    /// caller once [`crate::game::state::World::eliminate_player`] has assigned it.
    pub fn kill(tick: u64, victim_id: PlayerId, killer_id: Option<PlayerId>) -> Self {
        Self::new(
            tick,
            EventPriority::Elimination,
            GameEventData::Elimination { victim_id, killer_id, placement: 0 },
        )
    }

    /// Convenience constructor for a pickup event.
    pub fn pickup(tick: u64, player_id: PlayerId, loot_id: LootId, kind: LootKind) -> Self {
        Self::new(tick, EventPriority::Pickup, GameEventData::Pickup { player_id, loot_id, kind })
    }

    /// Convenience constructor for a zone phase transition event.
    pub fn zone_phase_changed(
        tick: u64,
        phase: ZonePhase,
        center: FixedVec2,
        target_radius: crate::core::fixed::Fixed,
        phase_end_tick: u64,
    ) -> Self {
        Self::new(
            tick,
            EventPriority::ZoneTransition,
            GameEventData::ZonePhaseChanged { phase, center, target_radius, phase_end_tick },
        )
    }

    /// Convenience constructor for the match-ended event.
    pub fn match_ended(tick: u64, winner_id: Option<PlayerId>) -> Self {
        Self::new(tick, EventPriority::Other, GameEventData::MatchEnded { winner_id, duration_ticks: tick })
    }
}

impl PartialEq for GameEvent {
    fn eq(&self, other: &Self) -> bool {
        self.tick == other.tick && self.priority == other.priority && self.player_id == other.player_id
    }
}

impl Eq for GameEvent {}

impl PartialOrd for GameEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GameEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.tick
            .cmp(&other.tick)
            .then(self.priority.cmp(&other.priority))
            .then(self.player_id.cmp(&other.player_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ordering() {
        let id1 = PlayerId::new([1; 16]);
        let id2 = PlayerId::new([2; 16]);

        let event1 = GameEvent::kill(10, id1, None);
        let event2 = GameEvent::pickup(10, id1, LootId(0), LootKind::Shield);
        let event3 = GameEvent::kill(10, id2, None);

        // Same tick, but elimination sorts before pickup
        assert!(event1 < event2);

        // Same tick and priority, but id1 < id2
        assert!(event1 < event3);
    }
}
