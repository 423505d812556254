//! Ruleset Constants and Formulas
//!
//! The numeric ruleset shared by every game type. Distances are arena
//! units, angles are degrees, rates are per turn.

// =============================================================================
// BOT
// =============================================================================

/// Bot bounding circle radius.
pub const BOT_RADIUS: f64 = 18.0;

/// Energy every bot starts a round with.
pub const START_ENERGY: f64 = 100.0;

/// Maximum driving speed (absolute).
pub const MAX_SPEED: f64 = 8.0;

/// Speed gained per turn when increasing magnitude.
pub const ACCELERATION: f64 = 1.0;

/// Speed lost per turn when decreasing magnitude.
pub const DECELERATION: f64 = 2.0;

/// Body turn rate at standstill.
pub const MAX_TURN_RATE: f64 = 10.0;

/// Body turn rate lost per unit of speed.
pub const TURN_RATE_SPEED_FACTOR: f64 = 0.75;

/// Gun turn rate.
pub const MAX_GUN_TURN_RATE: f64 = 20.0;

/// Radar turn rate.
pub const MAX_RADAR_TURN_RATE: f64 = 45.0;

/// Radar scan distance.
pub const RADAR_RADIUS: f64 = 1200.0;

/// Damage dealt to both bots on a ram.
pub const RAM_DAMAGE: f64 = 0.6;

// =============================================================================
// GUN
// =============================================================================

/// Minimum firepower.
pub const MIN_FIREPOWER: f64 = 0.1;

/// Maximum firepower.
pub const MAX_FIREPOWER: f64 = 3.0;

/// Gun heat every bot starts a round with.
pub const INITIAL_GUN_HEAT: f64 = 3.0;

/// Gun heat below this is treated as fully cooled.
pub const GUN_HEAT_EPSILON: f64 = 1e-9;

// =============================================================================
// TEAM MESSAGES
// =============================================================================

/// Team messages a bot may send in one turn.
pub const MAX_TEAM_MESSAGES_PER_TURN: usize = 10;

/// Size limit of one team message.
pub const MAX_TEAM_MESSAGE_SIZE: usize = 32_768;

// =============================================================================
// FORMULAS
// =============================================================================

/// Maximum body turn rate at the given speed.
#[inline]
pub fn max_turn_rate(speed: f64) -> f64 {
    MAX_TURN_RATE - TURN_RATE_SPEED_FACTOR * speed.abs()
}

/// Bullet speed for a firepower.
#[inline]
pub fn bullet_speed(power: f64) -> f64 {
    20.0 - 3.0 * power
}

/// Damage a bullet deals on hit.
///
/// Bullets above power 1 carry bonus damage of `2 * (power - 1)`.
#[inline]
pub fn bullet_damage(power: f64) -> f64 {
    let bonus = if power > 1.0 { 2.0 * (power - 1.0) } else { 0.0 };
    4.0 * power + bonus
}

/// Energy the shooter regains when its bullet hits.
#[inline]
pub fn bullet_energy_return(power: f64) -> f64 {
    3.0 * power
}

/// Gun heat produced by firing.
#[inline]
pub fn gun_heat_after_fire(power: f64) -> f64 {
    1.0 + power / 5.0
}

/// Damage a bot takes from hitting a wall at `speed`.
#[inline]
pub fn wall_damage(speed: f64) -> f64 {
    (speed.abs() / 2.0 - 1.0).max(0.0)
}

/// Whether `power` is an acceptable firepower.
#[inline]
pub fn is_valid_firepower(power: f64) -> bool {
    power.is_finite() && (MIN_FIREPOWER..=MAX_FIREPOWER).contains(&power)
}
