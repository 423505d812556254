//! Core primitives.
//!
//! Arena geometry, colors, the seeded RNG used for start positions, and
//! snapshot hashing. Nothing in here knows about bots or sockets.

pub mod vec2;
pub mod color;
pub mod rng;
pub mod hash;

// Re-export core types
pub use vec2::Point;
pub use color::Color;
pub use rng::DeterministicRng;
pub use hash::compute_state_hash;
