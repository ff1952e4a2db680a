//! Game Logic Module
//!
//! All game simulation code. 100% deterministic.
//!
//! ## Module Structure
//!
//! - `input`: input capture, validation, buffering
//! - `state`: world state, player state, entities
//! - `spatial`: uniform grid for neighborhood queries
//! - `physics`: integration and collision resolution
//! - `combat`: weapon stats, firing, projectile sweep and hit resolution
//! - `loot`: weighted spawn and pickup effects
//! - `zone`: safe zone phase state machine and zone damage
//! - `map`: procedural obstacle and spawn-point generation
//! - `tick`: authoritative simulation loop
//! - `events`: game events for replay/verification

pub mod combat;
pub mod events;
pub mod input;
pub mod loot;
pub mod map;
pub mod physics;
pub mod spatial;
pub mod state;
pub mod tick;
pub mod zone;

pub use events::GameEvent;
pub use input::{FireRequest, InputFrame, PlayerInputLog, PlayerInputQueue};
pub use state::{MatchPhase, Player, PlayerId, World};
pub use tick::{PlayerTickInput, TickOutcome};
