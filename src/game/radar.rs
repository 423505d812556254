//! Radar Scanning
//!
//! Each bot's radar sweeps a circular sector this turn: from its previous
//! radar direction to the current one, out to [`RADAR_RADIUS`]. Any
//! opponent whose bounding circle touches that sector is scanned.

use crate::core::vec2::{angle_in_sweep, Point};
use crate::game::events::{Event, EventKind};
use crate::game::rules::{BOT_RADIUS, RADAR_RADIUS};
use crate::game::state::{BotId, BotState, GameState};

/// Distance from `p` to the segment `a-b`.
fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq == 0.0 {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    p.distance(a + ab.scale(t))
}

/// Whether a circle touches the sector starting at `start` and spanning
/// `span` degrees (negative spans sweep clockwise).
///
/// A zero span is a single ray.
pub fn sector_hits_circle(origin: Point, start: f64, span: f64, radius: f64, center: Point, r: f64) -> bool {
    let distance = origin.distance(center);
    if distance > radius + r {
        return false;
    }
    if distance <= r {
        return true;
    }

    if distance <= radius && angle_in_sweep(origin.direction_to(center), start, span) {
        return true;
    }

    // Otherwise the circle must cross one of the two edge rays
    let edge_start = origin.advance(start, radius);
    let edge_end = origin.advance(start + span, radius);
    distance_to_segment(center, origin, edge_start) <= r || distance_to_segment(center, origin, edge_end) <= r
}

/// Whether `scanner` sees `target` this turn.
pub fn scans(scanner: &BotState, target: &BotState) -> bool {
    let start = scanner.radar_direction - scanner.radar_sweep;
    sector_hits_circle(
        scanner.position,
        start,
        scanner.radar_sweep,
        RADAR_RADIUS,
        target.position,
        BOT_RADIUS,
    )
}

/// Run every bot's radar. Emits `ScannedBot` to the scanner only and
/// remembers the nearest scanned bot for fire assist.
pub fn process_scans(state: &mut GameState) {
    let turn = state.turn;
    let mut found: Vec<(BotId, Event, Point)> = Vec::new();

    // Fire assist only ever aims at this turn's sighting
    for bot in state.bots.values_mut() {
        bot.last_scanned_position = None;
    }

    for scanner in state.bots.values() {
        if !scanner.is_alive() {
            continue;
        }
        for target in state.bots.values() {
            if target.id == scanner.id || !target.is_alive() || scanner.is_teammate_of(target) {
                continue;
            }
            if scans(scanner, target) {
                let event = Event::new(
                    turn,
                    EventKind::ScannedBot {
                        scanned_by_bot_id: scanner.id,
                        scanned_bot_id: target.id,
                        energy: target.energy,
                        x: target.position.x,
                        y: target.position.y,
                        direction: target.direction,
                        speed: target.speed,
                    },
                );
                found.push((scanner.id, event, target.position));
            }
        }
    }

    let mut nearest: Vec<(BotId, Point)> = Vec::new();
    for (scanner_id, event, position) in found {
        state.push_event(event);
        let Some(scanner) = state.bots.get(&scanner_id) else {
            continue;
        };
        let origin = scanner.position;
        match nearest.iter_mut().find(|(id, _)| *id == scanner_id) {
            Some((_, best)) if origin.distance_squared(position) < origin.distance_squared(*best) => *best = position,
            Some(_) => {}
            None => nearest.push((scanner_id, position)),
        }
    }
    for (scanner_id, position) in nearest {
        if let Some(scanner) = state.bots.get_mut(&scanner_id) {
            scanner.last_scanned_position = Some(position);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
