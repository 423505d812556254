//! Bot Movement
//!
//! Pure per-bot motion: turning body, gun and radar, then the speed ramp,
//! then moving along the new heading.

use crate::core::vec2::normalize_absolute_degrees;
use crate::game::intent::BotIntent;
use crate::game::rules::{
    max_turn_rate, ACCELERATION, DECELERATION, MAX_GUN_TURN_RATE, MAX_RADAR_TURN_RATE, MAX_SPEED,
};
use crate::game::state::BotState;

/// Speed after one turn of driving from `current` toward `target`.
///
/// Speed grows by at most [`ACCELERATION`] and shrinks by at most
/// [`DECELERATION`] per turn. When the turn passes through zero, the time
/// before zero decelerates and the rest accelerates, so `(1, -8)` gives
/// `-0.5` and `(-0.5, 8)` gives `0.75`.
pub fn calc_new_bot_speed(current: f64, target: f64) -> f64 {
    let target = target.clamp(-MAX_SPEED, MAX_SPEED);
    let delta = target - current;

    let step = if current >= 0.0 {
        if delta >= 0.0 {
            delta.min(ACCELERATION)
        } else {
            delta.max(-max_deceleration(current))
        }
    } else if delta < 0.0 {
        delta.max(-ACCELERATION)
    } else {
        delta.min(max_deceleration(-current))
    };

    (current + step).clamp(-MAX_SPEED, MAX_SPEED)
}

/// Largest speed drop in one turn starting at `speed` (>= 0): full
/// deceleration until zero, acceleration in the opposite direction after.
fn max_deceleration(speed: f64) -> f64 {
    let decel_time = speed / DECELERATION;
    let accel_time = 1.0 - decel_time;
    decel_time.min(1.0) * DECELERATION + accel_time.max(0.0) * ACCELERATION
}

/// Body, gun and radar rotation actually applied in a turn.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TurnAmounts {
    pub body: f64,
    pub gun: f64,
    pub radar: f64,
}

/// Rotation for this turn, limited by the current speed.
///
/// The gun turns with the body unless `adjust_gun_for_body_turn` is set.
/// The radar turns with the body and gun unless the matching adjust flag
/// is set.
pub fn calc_turn_amounts(speed: f64, intent: &BotIntent) -> TurnAmounts {
    let body_limit = max_turn_rate(speed);
    let body = intent.turn_rate.clamp(-body_limit, body_limit);
    let gun_own = intent.gun_turn_rate.clamp(-MAX_GUN_TURN_RATE, MAX_GUN_TURN_RATE);
    let radar_own = intent.radar_turn_rate.clamp(-MAX_RADAR_TURN_RATE, MAX_RADAR_TURN_RATE);

    let gun = if intent.adjust_gun_for_body_turn { gun_own } else { gun_own + body };

    let mut radar = radar_own;
    if !intent.adjust_radar_for_gun_turn {
        radar += gun_own;
    }
    if !intent.adjust_radar_for_body_turn {
        radar += body;
    }

    TurnAmounts { body, gun, radar }
}

/// Turn and drive one bot for one turn.
///
/// A rescan with no radar movement keeps the previous sweep, so the same
/// sector is scanned again.
pub fn move_bot(bot: &mut BotState, intent: &BotIntent) {
    let amounts = calc_turn_amounts(bot.speed, intent);

    bot.turn_rate = amounts.body;
    bot.gun_turn_rate = amounts.gun;
    bot.radar_turn_rate = amounts.radar;

    bot.direction = normalize_absolute_degrees(bot.direction + amounts.body);
    bot.gun_direction = normalize_absolute_degrees(bot.gun_direction + amounts.gun);
    bot.radar_direction = normalize_absolute_degrees(bot.radar_direction + amounts.radar);
    if !(intent.rescan && amounts.radar == 0.0) {
        bot.radar_sweep = amounts.radar;
    }

    bot.speed = calc_new_bot_speed(bot.speed, intent.target_speed);
    bot.position = bot.position.advance(bot.direction, bot.speed);
}

// =============================================================================
// TESTS
// =============================================================================
