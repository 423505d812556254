//! Game Logic Module
//!
//! The rules engine and scoring. Pure and deterministic: no I/O, no clocks,
//! no tasks.
//!
//! ## Module Structure
//!
//! - `rules`: Ruleset constants and damage/heat/speed formulas
//! - `setup`: Game types, presets and setup validation
//! - `state`: Bots, bullets, and the round/turn clock
//! - `intent`: Per-turn bot orders and their sticky merge
//! - `events`: Turn event log
//! - `physics`: Speed ramp, turning, movement
//! - `collision`: Bullet and bot collision passes
//! - `radar`: Sweep scanning
//! - `turn`: The authoritative per-turn pipeline
//! - `score`: Scoring engine driven by the event log

pub mod rules;
pub mod setup;
pub mod state;
pub mod intent;
pub mod events;
pub mod physics;
pub mod collision;
pub mod radar;
pub mod turn;
pub mod score;

// Re-export key types
pub use events::{Event, EventKind};
pub use intent::{BotIntent, BotIntentUpdate, TeamMessage};
pub use score::{BotResults, ScoreTracker};
pub use setup::{GameSetup, GameSetupRequest, InitialPosition, SetupError};
pub use state::{BotId, BotState, BulletId, BulletState, BulletView, GameState, RoundEntry};
pub use turn::{run_turn, RulesError, TurnResult};
