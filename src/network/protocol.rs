//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket. Primary encoding
//! is a `serde`-tagged enum over `serde_json`; a `bincode` path is available for
//! flat, non-tagged payloads such as ack piggybacking.

use serde::{Deserialize, Serialize};

use crate::core::fixed::Fixed;
use crate::core::vec2::FixedVec2;
use crate::game::events::{EventPriority, GameEventData};
use crate::game::state::{Loot, LootKind, Obstacle, PlayerId, SafeZone, Weapon, ZonePhase};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First message on a new connection; carries the bearer token to resolve.
    Authenticate {
        /// Opaque bearer token, verified by the configured [`crate::network::auth::AuthProvider`].
        token: String,
    },
    /// Keepalive; resets the idle timeout without carrying gameplay intent.
    Heartbeat,
    /// Per-tick movement intent.
    Input {
        /// Monotonic per-session sequence number.
        seq: u32,
        /// Tick the client believes is current.
        client_tick: u64,
        /// Claimed velocity X component.
        vx: Fixed,
        /// Claimed velocity Y component.
        vy: Fixed,
        /// Claimed facing angle, fixed-point radians.
        facing: Fixed,
        /// Most recent snapshot tick the client has acknowledged, for delta encoding.
        last_ack_tick: u64,
    },
    /// Fire request.
    Fire {
        /// Monotonic per-session sequence number, shared space with `Input`.
        seq: u32,
        /// Tick the client believes is current.
        client_tick: u64,
        /// Aim angle, fixed-point radians.
        aim_angle: Fixed,
    },
    /// Voluntary departure from the current match.
    Leave,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Reason an `authenticate` attempt was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorReason {
    /// Token failed verification (bad signature, expired, malformed).
    InvalidToken,
    /// This user's prior session was replaced by a newer connection.
    Replaced,
    /// User is banned from matchmaking.
    Banned,
    /// Auth provider could not be reached.
    Unavailable,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication succeeded; session is live.
    AuthOk {
        /// Resolved user identifier.
        user_id: [u8; 16],
        /// Match assigned at connect time, if reconnecting mid-match.
        match_id: Option<[u8; 16]>,
        /// Simulation tick rate, for client-side prediction pacing.
        tick_rate: u32,
    },
    /// Authentication failed; the connection is closed after this frame.
    AuthErr {
        /// Rejection reason.
        reason: AuthErrorReason,
    },
    /// A match has been formed or rejoined for this session.
    MatchFound {
        /// Match identifier.
        match_id: [u8; 16],
        /// Static map description for client-side rendering of obstacles.
        map_descriptor: MapDescriptor,
        /// This session's player id within the match.
        self_id: [u8; 16],
        /// Server tick at the moment of this message.
        tick_now: u64,
    },
    /// A tick's world view, filtered to the recipient's interest set.
    Snapshot(SnapshotPayload),
    /// A discrete gameplay event.
    Event {
        /// Tick the event was generated on.
        tick: u64,
        /// Event payload, tagged by kind.
        payload: EventPayload,
    },
    /// The match has concluded.
    MatchEnd {
        /// Final placements, winner (1) first.
        placements: Vec<PlayerPlacement>,
        /// Rating delta applied to each player.
        rating_deltas: Vec<RatingDelta>,
        /// Human-readable reason ("elimination", "deadline", "shutdown").
        reason: String,
    },
    /// Still in the matchmaking queue; current rating tolerance, for client display.
    Queued {
        /// Current rating tolerance band.
        tolerance: i32,
    },
    /// The matchmaking ticket expired without forming a match.
    QueueTimedOut,
}

/// Static obstacle layout sent once, at match start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapDescriptor {
    /// Obstacle rectangles and polylines, serialized as wire-friendly shapes.
    pub obstacles: Vec<ObstacleShape>,
}

/// Wire representation of an obstacle, flattened from [`crate::game::state::Obstacle`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObstacleShape {
    /// Axis-aligned rectangle.
    Rect {
        /// Center position.
        center: FixedVec2,
        /// Half-width and half-height.
        half_extent: FixedVec2,
    },
    /// Chain of line segments.
    Polyline {
        /// Ordered vertices.
        points: Vec<FixedVec2>,
        /// Half-thickness of every segment.
        half_width: Fixed,
    },
}

/// One tick's filtered world view for a single recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPayload {
    /// Tick this snapshot was produced at.
    pub tick: u64,
    /// Whether this is a full keyframe or a delta against the client's last ack.
    pub is_full: bool,
    /// Players within the viewer's interest set.
    pub players: Vec<PlayerView>,
    /// Projectiles within the viewer's interest set.
    pub projectiles: Vec<ProjectileView>,
    /// Loot within the viewer's interest set.
    pub loot: Vec<LootView>,
    /// Removed entity ids (no longer visible), tagged by kind.
    pub removed: Vec<RemovedEntity>,
    /// The safe zone, always included.
    pub zone: ZoneView,
}

/// An entity that left a viewer's interest set since the last delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemovedEntity {
    /// A player left the interest set (not necessarily eliminated).
    Player {
        /// Player identifier.
        id: [u8; 16],
    },
    /// A projectile expired, hit something, or left the interest set.
    Projectile {
        /// Projectile identifier.
        id: u32,
    },
    /// A loot item was picked up or left the interest set.
    Loot {
        /// Loot identifier.
        id: u32,
    },
}

/// Wire view of a player, trimmed to what a client needs to render and predict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerView {
    /// Player identifier.
    pub id: [u8; 16],
    /// Current position.
    pub position: FixedVec2,
    /// Current velocity.
    pub velocity: FixedVec2,
    /// Current facing angle.
    pub facing: Fixed,
    /// Current health.
    pub health: i32,
    /// Current shield.
    pub shield: i32,
    /// Equipped weapon.
    pub weapon: Weapon,
    /// Whether the player is alive.
    pub alive: bool,
}

/// Wire view of a projectile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectileView {
    /// Projectile identifier.
    pub id: u32,
    /// Current position.
    pub position: FixedVec2,
}

/// Wire view of a loot item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LootView {
    /// Loot identifier.
    pub id: u32,
    /// Position.
    pub position: FixedVec2,
    /// Kind.
    pub kind: LootKind,
}

impl From<&Obstacle> for ObstacleShape {
    fn from(obstacle: &Obstacle) -> Self {
        match obstacle {
            Obstacle::Rect { center, half_extent } => {
                ObstacleShape::Rect { center: *center, half_extent: *half_extent }
            }
            Obstacle::Polyline { points, half_width } => {
                ObstacleShape::Polyline { points: points.clone(), half_width: *half_width }
            }
        }
    }
}

impl MapDescriptor {
    /// Build a wire map descriptor from the world's immutable obstacle list.
    pub fn from_obstacles(obstacles: &[Obstacle]) -> Self {
        Self { obstacles: obstacles.iter().map(ObstacleShape::from).collect() }
    }
}

impl From<&Loot> for LootView {
    fn from(loot: &Loot) -> Self {
        Self { id: loot.id.0, position: loot.position, kind: loot.kind }
    }
}

/// Wire view of the safe zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneView {
    /// Current center.
    pub center: FixedVec2,
    /// Current radius.
    pub current_radius: Fixed,
    /// Radius this phase is shrinking toward.
    pub target_radius: Fixed,
    /// Current lifecycle phase.
    pub phase: ZonePhase,
    /// Tick the current phase ends.
    pub phase_end_tick: u64,
}

impl From<&SafeZone> for ZoneView {
    fn from(zone: &SafeZone) -> Self {
        Self {
            center: zone.center,
            current_radius: zone.current_radius,
            target_radius: zone.target_radius,
            phase: zone.phase,
            phase_end_tick: zone.phase_end_tick,
        }
    }
}

/// Wire payload for a gameplay event, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// A projectile hit a player.
    Hit {
        /// Attacking player.
        attacker_id: [u8; 16],
        /// Player hit.
        victim_id: [u8; 16],
        /// Damage that reached health after shield absorption.
        damage: i32,
        /// Victim's health after the hit.
        victim_health_after: i32,
        /// Victim's shield after the hit.
        victim_shield_after: i32,
    },
    /// A player was eliminated.
    Kill {
        /// Eliminated player.
        victim_id: [u8; 16],
        /// Credited killer, if any (zone damage has none).
        killer_id: Option<[u8; 16]>,
        /// Final placement assigned to the victim.
        placement: u32,
    },
    /// A player picked up a loot item.
    Pickup {
        /// Player who picked up the item.
        player_id: [u8; 16],
        /// Loot identifier consumed.
        loot_id: u32,
        /// Kind consumed.
        kind: LootKind,
    },
    /// The safe zone transitioned to a new phase.
    ZonePhase {
        /// New phase.
        phase: ZonePhase,
        /// New center.
        center: FixedVec2,
        /// Target radius for this phase.
        target_radius: Fixed,
        /// Tick this phase ends.
        phase_end_tick: u64,
    },
}

impl EventPayload {
    /// Convert an internal [`GameEventData`] into its wire representation.
    pub fn from_event_data(data: &GameEventData) -> Self {
        match *data {
            GameEventData::Hit { attacker_id, victim_id, damage, victim_health_after, victim_shield_after } => {
                EventPayload::Hit {
                    attacker_id: attacker_id.0,
                    victim_id: victim_id.0,
                    damage,
                    victim_health_after,
                    victim_shield_after,
                }
            }
            GameEventData::Elimination { victim_id, killer_id, placement } => EventPayload::Kill {
                victim_id: victim_id.0,
                killer_id: killer_id.map(|id| id.0),
                placement,
            },
            GameEventData::Pickup { player_id, loot_id, kind } => {
                EventPayload::Pickup { player_id: player_id.0, loot_id: loot_id.0, kind }
            }
            GameEventData::ZonePhaseChanged { phase, center, target_radius, phase_end_tick } => {
                EventPayload::ZonePhase { phase, center, target_radius, phase_end_tick }
            }
            GameEventData::MatchEnded { .. } => {
                unreachable!("match end is carried by ServerMessage::MatchEnd, not an Event frame")
            }
        }
    }

    /// Priority this payload's originating event carried, for outbound queue ordering.
    pub fn priority(data: &GameEventData) -> EventPriority {
        match data {
            GameEventData::Hit { .. } => EventPriority::Hit,
            GameEventData::Elimination { .. } => EventPriority::Elimination,
            GameEventData::Pickup { .. } => EventPriority::Pickup,
            GameEventData::ZonePhaseChanged { .. } => EventPriority::ZoneTransition,
            GameEventData::MatchEnded { .. } => EventPriority::Other,
        }
    }
}

/// One player's final standing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerPlacement {
    /// Player identifier.
    pub player_id: [u8; 16],
    /// Final place, 1 = winner.
    pub place: u32,
    /// Kills credited.
    pub kills: u32,
    /// Total damage dealt.
    pub damage_dealt: i32,
    /// Ticks survived.
    pub survival_ticks: u64,
}

/// Rating adjustment applied to one player at match end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingDelta {
    /// Player identifier.
    pub player_id: [u8; 16],
    /// Signed delta applied to the player's rating.
    pub delta: i32,
}

impl PlayerId {
    /// Convert to the wire's raw-bytes representation.
    pub fn to_wire(self) -> [u8; 16] {
        self.0
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON text, the primary wire encoding.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON text.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON text, the primary wire encoding.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON text.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to a flat binary encoding, for payloads that don't need the
    /// tagged-enum envelope (e.g. ack piggybacking over a side channel).
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_input_json_roundtrip() {
        let msg = ClientMessage::Input {
            seq: 7,
            client_tick: 100,
            vx: 1000,
            vy: -500,
            facing: 0,
            last_ack_tick: 90,
        };
        let json = msg.to_json().unwrap();
        let parsed = ClientMessage::from_json(&json).unwrap();
        match parsed {
            ClientMessage::Input { seq, client_tick, .. } => {
                assert_eq!(seq, 7);
                assert_eq!(client_tick, 100);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn auth_err_json_tags_reason() {
        let msg = ServerMessage::AuthErr { reason: AuthErrorReason::InvalidToken };
        let json = msg.to_json().unwrap();
        assert!(json.contains("invalid_token"));
    }

    #[test]
    fn event_payload_converts_from_hit_data() {
        let data = GameEventData::Hit {
            attacker_id: PlayerId([1; 16]),
            victim_id: PlayerId([2; 16]),
            damage: 20,
            victim_health_after: 80,
            victim_shield_after: 0,
        };
        let payload = EventPayload::from_event_data(&data);
        match payload {
            EventPayload::Hit { damage, .. } => assert_eq!(damage, 20),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn server_message_leave_roundtrip() {
        let msg = ClientMessage::Leave;
        let json = msg.to_json().unwrap();
        let parsed = ClientMessage::from_json(&json).unwrap();
        assert!(matches!(parsed, ClientMessage::Leave));
    }
}
