//! # Skirmish Arena Server
//!
//! Authoritative real-time simulation for a 16-player battle-royale shooter.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SKIRMISH ARENA SERVER                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── fixed.rs    - Q16.16 fixed-point arithmetic             │
//! │  ├── vec2.rs     - 2D vector with fixed-point                │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  └── hash.rs     - State hashing for verification            │
//! │                                                              │
//! │  game/           - Game logic (deterministic)                │
//! │  ├── input.rs    - Input capture and validation              │
//! │  ├── state.rs    - World and player state                    │
//! │  ├── spatial.rs  - Uniform grid for neighborhood queries      │
//! │  ├── physics.rs  - Integration and collision resolution      │
//! │  ├── combat.rs   - Weapon stats, firing, hit resolution       │
//! │  ├── loot.rs      - Weighted spawns, pickup effects           │
//! │  ├── zone.rs     - Safe zone phase state machine              │
//! │  ├── map.rs      - Procedural map generation                 │
//! │  └── tick.rs     - Authoritative simulation loop              │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── auth.rs     - Session authentication                    │
//! │  ├── protocol.rs - Wire message types                        │
//! │  ├── session.rs  - Per-connection state                      │
//! │  ├── interest.rs - Per-client snapshot filtering              │
//! │  └── server.rs   - WebSocket accept loop                      │
//! │                                                              │
//! │  matchmaker.rs   - Rating-bucketed queue, lobby formation     │
//! │  registry.rs     - Connection/match routing table             │
//! │  runtime.rs      - Match Runtime: owns the World, drives ticks│
//! │  repository.rs   - Durable persistence seam                   │
//! │  store.rs        - Ephemeral shared-state seam                │
//! │  config.rs       - Typed startup configuration                │
//! │  error.rs        - Error taxonomy and retry policy            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules are **100% deterministic**:
//! - No floating-point arithmetic in game logic
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies
//! - All randomness from the seeded Xorshift128+ generator
//!
//! Given an identical lobby, map seed, and input log, the simulation produces
//! **identical results** on any platform.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod error;
pub mod game;
pub mod matchmaker;
pub mod network;
pub mod registry;
pub mod repository;
pub mod runtime;
pub mod store;

pub use core::fixed::{Fixed, FIXED_HALF, FIXED_ONE, FIXED_SCALE};
pub use core::rng::DeterministicRng;
pub use core::vec2::FixedVec2;
pub use game::state::{MatchPhase, Player, PlayerId, World};
pub use game::{FireRequest, GameEvent, InputFrame};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick rate (Hz).
pub const TICK_RATE: u32 = 30;
