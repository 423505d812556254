//! Authoritative Turn
//!
//! Applies one turn of the rules to the game state. Everything here is
//! synchronous and deterministic: bots and bullets are visited in id order
//! and the collision passes always run in the same sequence.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::core::vec2::{angle_delta, normalize_absolute_degrees};
use crate::game::collision::{
    process_bot_collisions, process_bot_walls, process_bullet_collisions, process_bullet_hits,
    process_bullet_walls,
};
use crate::game::events::{Event, EventKind};
use crate::game::intent::BotIntent;
use crate::game::physics::move_bot;
use crate::game::radar::process_scans;
use crate::game::rules::{gun_heat_after_fire, is_valid_firepower, GUN_HEAT_EPSILON};
use crate::game::state::{BotId, BotState, BulletState, GameState};

/// Gun and radar count as aligned for fire assist within this angle.
const FIRE_ASSIST_ALIGNMENT: f64 = 1e-6;

/// A broken internal invariant. Aborts the battle, never the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesError {
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Result of a turn.
#[derive(Debug, Default)]
pub struct TurnResult {
    /// Events generated this turn, in order
    pub events: Vec<Event>,
    /// Final state of every bot that died this turn
    pub deaths: Vec<BotState>,
    /// Whether the round ended this turn
    pub round_ended: bool,
    /// Round winners (one bot, or the surviving team)
    pub winners: Vec<BotId>,
}

/// Run one turn.
///
/// # Arguments
///
/// * `state` - The game state (mutated)
/// * `intents` - Standing intent of every bot (BTreeMap for id order)
/// * `skipped` - Bots whose intent did not arrive in time
/// * `disconnected` - Bots whose connection is gone; they die this turn
pub fn run_turn(
    state: &mut GameState,
    intents: &BTreeMap<BotId, BotIntent>,
    skipped: &BTreeSet<BotId>,
    disconnected: &BTreeSet<BotId>,
) -> Result<TurnResult, RulesError> {
    if state.round_ended {
        return Err(RulesError::Invariant(format!(
            "turn applied after round {} ended",
            state.round
        )));
    }
    if state.round == 0 {
        return Err(RulesError::Invariant("turn applied before the first round".into()));
    }

    let mut result = TurnResult::default();
    let default_intent = BotIntent::default();

    // 0. Advance turn counter
    state.turn += 1;
    let turn = state.turn;

    // 1. Skipped turns and disconnects
    for id in skipped {
        if state.bots.contains_key(id) && !disconnected.contains(id) {
            state.push_event(Event::skipped_turn(turn, *id));
        }
    }
    for id in disconnected {
        if let Some(bot) = state.get_bot_mut(id) {
            bot.energy = 0.0;
        }
    }

    // 2. Cool guns, apply console output and colors
    let cooling = state.setup.gun_cooling_rate;
    for bot in state.bots.values_mut() {
        let intent = intents.get(&bot.id).unwrap_or(&default_intent);
        bot.gun_heat = (bot.gun_heat - cooling).max(0.0);
        if bot.gun_heat < GUN_HEAT_EPSILON {
            bot.gun_heat = 0.0;
        }
        bot.colors = intent.colors.clone();
        bot.std_out = intent.std_out.clone();
        bot.std_err = intent.std_err.clone();
        bot.debug_graphics = intent.debug_graphics.clone();
    }

    // 3. Turn and move bots
    for bot in state.bots.values_mut() {
        if !bot.is_alive() {
            continue;
        }
        let intent = intents.get(&bot.id).unwrap_or(&default_intent);
        move_bot(bot, intent);
    }

    // 4. Collisions, in fixed order
    process_bullet_collisions(state);
    let bullet_damage = process_bullet_hits(state);
    let ram_damage = process_bot_collisions(state);
    process_bot_walls(state);
    process_bullet_walls(state);

    // 5. Deaths
    process_deaths(state, &mut result);

    // 6. Fire guns
    process_firing(state, intents)?;

    // 7. Radar
    process_scans(state);

    // 8. Team messages
    process_team_messages(state, intents);

    // 9. Inactivity
    if bullet_damage || ram_damage {
        state.inactivity_turns = 0;
    } else {
        state.inactivity_turns += 1;
    }

    // 10. Round end
    state.update_enemy_counts();
    check_round_end(state, &mut result);

    result.events = state.take_events();
    Ok(result)
}

fn process_deaths(state: &mut GameState, result: &mut TurnResult) {
    let turn = state.turn;
    let dead: Vec<BotId> = state.bots.values().filter(|b| !b.is_alive()).map(|b| b.id).collect();
    for id in dead {
        if let Some(mut bot) = state.bots.remove(&id) {
            bot.energy = 0.0;
            state.push_event(Event::bot_death(turn, id));
            result.deaths.push(bot);
        }
    }
}

fn process_firing(state: &mut GameState, intents: &BTreeMap<BotId, BotIntent>) -> Result<(), RulesError> {
    let turn = state.turn;
    let shooters: Vec<(BotId, f64)> = state
        .bots
        .values()
        .filter_map(|bot| {
            let power = intents.get(&bot.id)?.firepower;
            let can_fire = bot.is_alive()
                && bot.gun_heat == 0.0
                && is_valid_firepower(power)
                && bot.energy > power;
            can_fire.then_some((bot.id, power))
        })
        .collect();

    for (id, power) in shooters {
        let fire_assist = intents.get(&id).map(|i| i.fire_assist).unwrap_or(false);
        let bullet_id = state.next_bullet_id();
        if state.bullets.contains_key(&bullet_id) {
            return Err(RulesError::Invariant(format!("bullet id {} reused", bullet_id.0)));
        }
        let Some(bot) = state.bots.get_mut(&id) else {
            continue;
        };

        let aligned = angle_delta(bot.gun_direction, bot.radar_direction).abs() < FIRE_ASSIST_ALIGNMENT;
        let direction = match bot.last_scanned_position {
            Some(target) if fire_assist && aligned => bot.position.direction_to(target),
            _ => normalize_absolute_degrees(bot.gun_direction),
        };

        bot.energy -= power;
        bot.gun_heat = gun_heat_after_fire(power);

        let bullet = BulletState {
            id: bullet_id,
            owner_id: id,
            power,
            direction,
            color: bot.colors.bullet_color,
            start: bot.position,
            fired_turn: turn,
        };
        state.push_event(Event::bullet_fired(turn, bullet.view_at(turn)));
        state.bullets.insert(bullet_id, bullet);
    }
    Ok(())
}

fn process_team_messages(state: &mut GameState, intents: &BTreeMap<BotId, BotIntent>) {
    let turn = state.turn;
    let mut outgoing = Vec::new();

    for sender in state.bots.values() {
        let Some(intent) = intents.get(&sender.id) else {
            continue;
        };
        if sender.team_id.is_none() {
            continue;
        }
        for message in &intent.team_messages {
            let receivers: Vec<BotId> = state
                .bots
                .values()
                .filter(|b| sender.is_teammate_of(b))
                .filter(|b| message.receiver_id.map_or(true, |r| r == b.id))
                .map(|b| b.id)
                .collect();
            for receiver_id in receivers {
                outgoing.push(Event::new(
                    turn,
                    EventKind::TeamMessage {
                        message: message.message.clone(),
                        message_type: message.message_type.clone(),
                        sender_id: sender.id,
                        receiver_id,
                    },
                ));
            }
        }
    }

    for event in outgoing {
        state.push_event(event);
    }
}

fn check_round_end(state: &mut GameState, result: &mut TurnResult) {
    let turn = state.turn;
    let last_side = state.alive_sides() <= 1;
    let inactive = state.inactivity_turns >= state.setup.max_inactivity_turns;

    if !last_side && !inactive {
        return;
    }

    state.round_ended = true;
    result.round_ended = true;
    if last_side {
        let winners: Vec<BotId> = state.bots.keys().copied().collect();
        for id in &winners {
            state.push_event(Event::won_round(turn, *id));
        }
        result.winners = winners;
    }
}

// =============================================================================
// TESTS
// =============================================================================
