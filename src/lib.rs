//! # Tank Battle Server
//!
//! Authoritative server for turn-based tank battles played by networked bots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TANK BATTLE SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Primitives                               │
//! │  ├── vec2.rs      - Points and degree angles                 │
//! │  ├── color.rs     - Bot colors (#RGB / #RRGGBB)              │
//! │  ├── rng.rs       - Deterministic Xorshift128+ PRNG          │
//! │  └── hash.rs      - Turn state hashing                       │
//! │                                                              │
//! │  game/            - Rules (deterministic, no I/O)            │
//! │  ├── setup.rs     - Game types and setup validation          │
//! │  ├── state.rs     - Bots, bullets, round/turn clock          │
//! │  ├── intent.rs    - Sticky per-turn bot orders               │
//! │  ├── physics.rs   - Speed ramp, turning, movement            │
//! │  ├── collision.rs - Bullet and bot collisions                │
//! │  ├── radar.rs     - Radar sweeps                             │
//! │  ├── turn.rs      - Authoritative turn pipeline              │
//! │  └── score.rs     - Scoring and ranking                      │
//! │                                                              │
//! │  network/         - Sockets and clocks                       │
//! │  ├── server.rs    - Accept loop and handshakes               │
//! │  ├── scheduler.rs - Turn loop task                           │
//! │  ├── broadcast.rs - Tick fan-out                             │
//! │  └── protocol.rs  - Wire messages                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! Given the same start positions and the same intents on the same turns,
//! `game/` produces the same event log and state hash:
//! - BTreeMap everywhere, so bots and bullets are visited in id order
//! - Collision passes always run in the same sequence
//! - All randomness comes from a seeded Xorshift128+

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod cli;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use crate::core::rng::DeterministicRng;
pub use crate::core::vec2::Point;
pub use crate::game::state::{BotId, BotState, GameState};
pub use crate::network::server::{GameServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
