//! Game State Definitions
//!
//! The canonical battle snapshot: arena, bots, bullets, and the round/turn
//! clock. Uses BTreeMap so every iteration runs in id order.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

use crate::core::color::Color;
use crate::core::hash::{compute_state_hash, StateHash, StateHasher};
use crate::core::rng::DeterministicRng;
use crate::core::vec2::{normalize_absolute_degrees, Point};
use crate::game::events::Event;
use crate::game::rules::{bullet_speed, BOT_RADIUS, INITIAL_GUN_HEAT, START_ENERGY};
use crate::game::setup::{GameSetup, InitialPosition};

/// Placement attempts before accepting an overlapping random position.
const MAX_PLACEMENT_ATTEMPTS: u32 = 1000;

// =============================================================================
// IDS
// =============================================================================

/// Bot identifier, unique within one battle.
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BotId(pub u32);

/// Bullet identifier, unique within one battle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BulletId(pub u32);

impl std::fmt::Display for BotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bot#{}", self.0)
    }
}

// =============================================================================
// COLORS
// =============================================================================

/// Paint for each bot part. Unset parts use the client's default.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotColors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turret_color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radar_color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bullet_color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracks_color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gun_color: Option<Color>,
}

// =============================================================================
// BOT STATE
// =============================================================================

/// Per-turn state of one bot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotState {
    pub id: BotId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<u32>,

    pub energy: f64,

    #[serde(flatten)]
    pub position: Point,

    /// Body direction (degrees)
    pub direction: f64,

    /// Gun direction (degrees)
    pub gun_direction: f64,

    /// Radar direction (degrees)
    pub radar_direction: f64,

    /// Signed angle the radar swept this turn, ending at `radar_direction`
    pub radar_sweep: f64,

    pub speed: f64,

    pub turn_rate: f64,
    pub gun_turn_rate: f64,
    pub radar_turn_rate: f64,

    pub gun_heat: f64,

    /// Opponents still alive (teammates excluded)
    pub enemy_count: u32,

    #[serde(flatten)]
    pub colors: BotColors,

    // =========================================================================
    // Output captured from the bot for observers, reset every turn
    // =========================================================================
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_out: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_err: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_graphics: Option<String>,

    /// Position of the last bot this one scanned (fire assist target)
    #[serde(skip)]
    pub last_scanned_position: Option<Point>,
}

impl BotState {
    /// Create a bot at the start of a round.
    pub fn new(id: BotId, team_id: Option<u32>, position: Point, direction: f64) -> Self {
        let direction = normalize_absolute_degrees(direction);
        Self {
            id,
            team_id,
            energy: START_ENERGY,
            position,
            direction,
            gun_direction: direction,
            radar_direction: direction,
            radar_sweep: 0.0,
            speed: 0.0,
            turn_rate: 0.0,
            gun_turn_rate: 0.0,
            radar_turn_rate: 0.0,
            gun_heat: INITIAL_GUN_HEAT,
            enemy_count: 0,
            colors: BotColors::default(),
            std_out: None,
            std_err: None,
            debug_graphics: None,
            last_scanned_position: None,
        }
    }

    /// Whether the bot is still in play.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.energy > 0.0
    }

    /// Whether two bots are on the same team. A bot without a team has no
    /// teammates.
    #[inline]
    pub fn is_teammate_of(&self, other: &BotState) -> bool {
        self.id != other.id && self.team_id.is_some() && self.team_id == other.team_id
    }

    /// Add this bot's public state to a snapshot hash.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u32(self.id.0);
        hasher.update_f64(self.energy);
        hasher.update_point(self.position);
        hasher.update_f64(self.direction);
        hasher.update_f64(self.gun_direction);
        hasher.update_f64(self.radar_direction);
        hasher.update_f64(self.radar_sweep);
        hasher.update_f64(self.speed);
        hasher.update_f64(self.gun_heat);
    }
}

// =============================================================================
// BULLET STATE
// =============================================================================

/// A fired bullet.
///
/// Bullets travel in a straight line at constant speed, so only the start
/// point and firing turn are stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BulletState {
    pub id: BulletId,
    pub owner_id: BotId,
    pub power: f64,
    pub direction: f64,
    pub color: Option<Color>,
    pub start: Point,
    pub fired_turn: u32,
}

/// Wire view of a bullet at one turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulletView {
    pub bullet_id: BulletId,
    pub owner_id: BotId,
    pub power: f64,
    pub x: f64,
    pub y: f64,
    pub direction: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

impl BulletState {
    /// Speed of this bullet.
    #[inline]
    pub fn speed(&self) -> f64 {
        bullet_speed(self.power)
    }

    /// Position at `turn` (the start point on the firing turn).
    pub fn position_at(&self, turn: u32) -> Point {
        let elapsed = turn.saturating_sub(self.fired_turn) as f64;
        self.start.advance(self.direction, self.speed() * elapsed)
    }

    /// Wire view at `turn`.
    pub fn view_at(&self, turn: u32) -> BulletView {
        let p = self.position_at(turn);
        BulletView {
            bullet_id: self.id,
            owner_id: self.owner_id,
            power: self.power,
            x: p.x,
            y: p.y,
            direction: self.direction,
            color: self.color,
        }
    }
}

// =============================================================================
// ROUND ENTRY
// =============================================================================

/// A participant entering a round.
#[derive(Clone, Debug, PartialEq)]
pub struct RoundEntry {
    pub id: BotId,
    pub team_id: Option<u32>,
    pub initial_position: Option<InitialPosition>,
}

// =============================================================================
// GAME STATE
// =============================================================================

/// The complete battle state.
///
/// Owned by one scheduler task; never shared.
#[derive(Clone, Debug)]
pub struct GameState {
    pub setup: GameSetup,

    /// Current round (1-based; 0 before the first round)
    pub round: u32,

    /// Current turn within the round (0 at round start)
    pub turn: u32,

    /// Alive bots
    pub bots: BTreeMap<BotId, BotState>,

    /// Bullets in flight
    pub bullets: BTreeMap<BulletId, BulletState>,

    /// Consecutive turns without bullet or ram damage
    pub inactivity_turns: u32,

    /// Set once the round's end condition was reached
    pub round_ended: bool,

    /// Next bullet id (never reused within the battle)
    next_bullet_id: u32,

    /// Events generated during the current turn
    events: Vec<Event>,
}

impl GameState {
    /// Create the state for a new battle.
    pub fn new(setup: GameSetup) -> Self {
        Self {
            setup,
            round: 0,
            turn: 0,
            bots: BTreeMap::new(),
            bullets: BTreeMap::new(),
            inactivity_turns: 0,
            round_ended: false,
            next_bullet_id: 1,
            events: Vec::new(),
        }
    }

    /// Begin the next round: place every participant and reset round state.
    pub fn start_round(&mut self, rng: &mut DeterministicRng, entries: &[RoundEntry]) {
        self.round += 1;
        self.turn = 0;
        self.bots.clear();
        self.bullets.clear();
        self.inactivity_turns = 0;
        self.round_ended = false;
        self.events.clear();

        let width = self.setup.width();
        let height = self.setup.height();
        let min = Point::new(BOT_RADIUS, BOT_RADIUS);
        let max = Point::new(width - BOT_RADIUS, height - BOT_RADIUS);
        let mut placed: Vec<Point> = Vec::with_capacity(entries.len());

        for entry in entries {
            let requested = entry
                .initial_position
                .filter(|_| self.setup.initial_positions_enabled);

            let position = match requested {
                Some(InitialPosition { x: Some(x), y: Some(y), .. }) if x.is_finite() && y.is_finite() => {
                    Point::new(x, y).clamp(min, max)
                }
                _ => random_free_position(rng, width, height, &placed),
            };
            let direction = requested
                .and_then(|p| p.direction)
                .filter(|d| d.is_finite())
                .unwrap_or_else(|| rng.random_direction());

            placed.push(position);
            self.bots.insert(entry.id, BotState::new(entry.id, entry.team_id, position, direction));
        }

        self.update_enemy_counts();
    }

    /// Allocate a fresh bullet id.
    pub fn next_bullet_id(&mut self) -> BulletId {
        let id = BulletId(self.next_bullet_id);
        self.next_bullet_id += 1;
        id
    }

    /// Get bot by ID.
    pub fn get_bot(&self, id: &BotId) -> Option<&BotState> {
        self.bots.get(id)
    }

    /// Get mutable bot by ID.
    pub fn get_bot_mut(&mut self, id: &BotId) -> Option<&mut BotState> {
        self.bots.get_mut(id)
    }

    /// Number of alive bots.
    pub fn alive_count(&self) -> usize {
        self.bots.len()
    }

    /// Distinct sides (teams, or solo bots) still alive.
    pub fn alive_sides(&self) -> usize {
        let mut teams: Vec<u32> = Vec::new();
        let mut solo = 0;
        for bot in self.bots.values() {
            match bot.team_id {
                Some(t) if !teams.contains(&t) => teams.push(t),
                Some(_) => {}
                None => solo += 1,
            }
        }
        teams.len() + solo
    }

    /// Recompute each bot's count of alive opponents.
    pub fn update_enemy_counts(&mut self) {
        let snapshot: Vec<(BotId, Option<u32>)> =
            self.bots.values().map(|b| (b.id, b.team_id)).collect();
        for bot in self.bots.values_mut() {
            bot.enemy_count = snapshot
                .iter()
                .filter(|(id, team)| *id != bot.id && (bot.team_id.is_none() || *team != bot.team_id))
                .count() as u32;
        }
    }

    /// Push an event into the current turn's log.
    pub fn push_event(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Take the current turn's event log.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Current bullet views.
    pub fn bullet_views(&self) -> Vec<BulletView> {
        self.bullets.values().map(|b| b.view_at(self.turn)).collect()
    }

    /// Snapshot hash of the current turn.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.round, self.turn, |hasher| {
            hasher.update_u32(self.bots.len() as u32);
            for bot in self.bots.values() {
                bot.hash_into(hasher);
            }

            hasher.update_u32(self.bullets.len() as u32);
            for bullet in self.bullets.values() {
                hasher.update_u32(bullet.id.0);
                hasher.update_u32(bullet.owner_id.0);
                hasher.update_f64(bullet.power);
                hasher.update_f64(bullet.direction);
                hasher.update_point(bullet.position_at(self.turn));
            }

            hasher.update_u32(self.inactivity_turns);
        })
    }
}

/// Random position that does not overlap any already placed bot.
fn random_free_position(rng: &mut DeterministicRng, width: f64, height: f64, placed: &[Point]) -> Point {
    let min_distance_sq = (2.0 * BOT_RADIUS) * (2.0 * BOT_RADIUS);
    let mut candidate = rng.random_position(width, height, BOT_RADIUS);
    for _ in 0..MAX_PLACEMENT_ATTEMPTS {
        if placed.iter().all(|p| p.distance_squared(candidate) > min_distance_sq) {
            break;
        }
        candidate = rng.random_position(width, height, BOT_RADIUS);
    }
    candidate
}

// =============================================================================
// TESTS
// =============================================================================
