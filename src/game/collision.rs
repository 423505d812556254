//! Collision Detection
//!
//! The collision passes run once per turn after movement, always in this
//! order: bullet-bullet, bullet-bot, bot-bot, bot-wall, bullet-wall.
//! Bullets are tested as segments from last turn's position to this
//! turn's. Each pass walks ids in ascending order.

use std::collections::BTreeSet;

use crate::core::vec2::Point;
use crate::game::events::{Event, EventKind};
use crate::game::rules::{bullet_damage, bullet_energy_return, wall_damage, BOT_RADIUS, RAM_DAMAGE};
use crate::game::state::{BotId, BulletId, GameState};

// =============================================================================
// GEOMETRY
// =============================================================================

/// Check if two circles overlap.
#[inline]
pub fn circles_overlap(pos_a: Point, radius_a: f64, pos_b: Point, radius_b: f64) -> bool {
    let combined = radius_a + radius_b;
    pos_a.distance_squared(pos_b) < combined * combined
}

/// Whether segments `a1-a2` and `b1-b2` share a point.
pub fn segments_intersect(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    let d1 = (a2 - a1).cross(b1 - a1);
    let d2 = (a2 - a1).cross(b2 - a1);
    let d3 = (b2 - b1).cross(a1 - b1);
    let d4 = (b2 - b1).cross(a2 - b1);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    // Collinear or touching cases
    (d1 == 0.0 && on_segment(a1, a2, b1))
        || (d2 == 0.0 && on_segment(a1, a2, b2))
        || (d3 == 0.0 && on_segment(b1, b2, a1))
        || (d4 == 0.0 && on_segment(b1, b2, a2))
}

/// `p` is collinear with `a-b`; check it lies within the bounding box.
fn on_segment(a: Point, b: Point, p: Point) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Earliest fraction `t` in `[0, 1]` at which the segment `from-to` comes
/// within `radius` of `center`, if it does.
pub fn segment_circle_hit(from: Point, to: Point, center: Point, radius: f64) -> Option<f64> {
    let d = to - from;
    let f = from - center;
    let r_sq = radius * radius;

    if f.length_squared() <= r_sq {
        return Some(0.0);
    }

    let a = d.length_squared();
    if a == 0.0 {
        return None;
    }
    let b = 2.0 * f.dot(d);
    let c = f.length_squared() - r_sq;
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let t = (-b - disc.sqrt()) / (2.0 * a);
    (0.0..=1.0).contains(&t).then_some(t)
}

// =============================================================================
// BULLET PASSES
// =============================================================================

/// Bullets that collided with each other. Each pair yields one event and
/// both bullets are removed.
pub fn process_bullet_collisions(state: &mut GameState) -> bool {
    let turn = state.turn;
    let paths: Vec<(BulletId, Point, Point)> = state
        .bullets
        .values()
        .map(|b| (b.id, b.position_at(turn.saturating_sub(1)), b.position_at(turn)))
        .collect();

    let mut destroyed: BTreeSet<BulletId> = BTreeSet::new();
    let mut pairs: Vec<(BulletId, BulletId)> = Vec::new();

    for i in 0..paths.len() {
        let (id_a, a1, a2) = paths[i];
        if destroyed.contains(&id_a) {
            continue;
        }
        for &(id_b, b1, b2) in &paths[i + 1..] {
            if destroyed.contains(&id_b) {
                continue;
            }
            if segments_intersect(a1, a2, b1, b2) {
                destroyed.insert(id_a);
                destroyed.insert(id_b);
                pairs.push((id_a, id_b));
                break;
            }
        }
    }

    for (id_a, id_b) in &pairs {
        if let (Some(a), Some(b)) = (state.bullets.remove(id_a), state.bullets.remove(id_b)) {
            state.push_event(Event::new(
                turn,
                EventKind::BulletHitBullet { bullet: a.view_at(turn), hit_bullet: b.view_at(turn) },
            ));
        }
    }

    !pairs.is_empty()
}

/// Bullets hitting bots. Returns true if any damage was dealt.
///
/// A bullet hits the first bot along its path (ties go to the lower id) and
/// never its owner.
pub fn process_bullet_hits(state: &mut GameState) -> bool {
    let turn = state.turn;
    let bullet_ids: Vec<BulletId> = state.bullets.keys().copied().collect();
    let mut damaged = false;

    for bullet_id in bullet_ids {
        let Some(bullet) = state.bullets.get(&bullet_id) else {
            continue;
        };
        let from = bullet.position_at(turn.saturating_sub(1));
        let to = bullet.position_at(turn);

        let mut best: Option<(f64, BotId)> = None;
        for bot in state.bots.values() {
            if bot.id == bullet.owner_id || !bot.is_alive() {
                continue;
            }
            if let Some(t) = segment_circle_hit(from, to, bot.position, BOT_RADIUS) {
                if best.map_or(true, |(bt, _)| t < bt) {
                    best = Some((t, bot.id));
                }
            }
        }

        let Some((_, victim_id)) = best else {
            continue;
        };
        let Some(bullet) = state.bullets.remove(&bullet_id) else {
            continue;
        };

        let damage = bullet_damage(bullet.power);
        let energy = match state.bots.get_mut(&victim_id) {
            Some(victim) => {
                victim.energy = (victim.energy - damage).max(0.0);
                victim.energy
            }
            None => continue,
        };
        if let Some(owner) = state.bots.get_mut(&bullet.owner_id) {
            if owner.is_alive() {
                owner.energy += bullet_energy_return(bullet.power);
            }
        }

        state.push_event(Event::new(
            turn,
            EventKind::BulletHitBot { victim_id, bullet: bullet.view_at(turn), damage, energy },
        ));
        damaged = true;
    }

    damaged
}

/// Bullets that left the arena.
pub fn process_bullet_walls(state: &mut GameState) {
    let turn = state.turn;
    let width = state.setup.width();
    let height = state.setup.height();

    let gone: Vec<BulletId> = state
        .bullets
        .values()
        .filter(|b| {
            let p = b.position_at(turn);
            p.x < 0.0 || p.y < 0.0 || p.x > width || p.y > height
        })
        .map(|b| b.id)
        .collect();

    for id in gone {
        if let Some(bullet) = state.bullets.remove(&id) {
            state.push_event(Event::bullet_hit_wall(turn, bullet.view_at(turn)));
        }
    }
}

// =============================================================================
// BOT PASSES
// =============================================================================

/// Whether `bot` is driving into `other`.
fn is_ramming(position: Point, direction: f64, speed: f64, other: Point) -> bool {
    if speed == 0.0 {
        return false;
    }
    let heading = Point::from_direction(direction).scale(speed.signum());
    heading.dot(other - position) > 0.0
}

/// Bots overlapping each other. Returns true if any ram damage was dealt.
///
/// Both bots take ram damage. Rammers are moved back to touching distance
/// and stopped; when neither bot is moving into the other they are split
/// apart evenly. Each bot gets its own `BotHitBot` event.
pub fn process_bot_collisions(state: &mut GameState) -> bool {
    let turn = state.turn;
    let ids: Vec<BotId> = state.bots.keys().copied().collect();
    let mut damaged = false;

    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            let (Some(a), Some(b)) = (state.bots.get(&ids[i]), state.bots.get(&ids[j])) else {
                continue;
            };
            if !a.is_alive() || !b.is_alive() {
                continue;
            }
            if !circles_overlap(a.position, BOT_RADIUS, b.position, BOT_RADIUS) {
                continue;
            }

            let a_rams = is_ramming(a.position, a.direction, a.speed, b.position);
            let b_rams = is_ramming(b.position, b.direction, b.speed, a.position);

            let distance = a.position.distance(b.position);
            let axis = if distance > 0.0 {
                (b.position - a.position).scale(1.0 / distance)
            } else {
                Point::from_direction(a.direction)
            };
            let overlap = 2.0 * BOT_RADIUS - distance;
            let (a_share, b_share) = match (a_rams, b_rams) {
                (true, false) => (1.0, 0.0),
                (false, true) => (0.0, 1.0),
                _ => (0.5, 0.5),
            };
            let (a_id, b_id) = (a.id, b.id);

            if let Some(a) = state.bots.get_mut(&a_id) {
                a.position = a.position - axis.scale(overlap * a_share);
                a.energy = (a.energy - RAM_DAMAGE).max(0.0);
                if a_rams {
                    a.speed = 0.0;
                }
            }
            if let Some(b) = state.bots.get_mut(&b_id) {
                b.position = b.position + axis.scale(overlap * b_share);
                b.energy = (b.energy - RAM_DAMAGE).max(0.0);
                if b_rams {
                    b.speed = 0.0;
                }
            }

            let (Some(a), Some(b)) = (state.bots.get(&a_id), state.bots.get(&b_id)) else {
                continue;
            };
            let for_a = EventKind::BotHitBot {
                victim_id: b.id,
                bot_id: a.id,
                energy: b.energy,
                x: b.position.x,
                y: b.position.y,
                rammed: a_rams,
            };
            let for_b = EventKind::BotHitBot {
                victim_id: a.id,
                bot_id: b.id,
                energy: a.energy,
                x: a.position.x,
                y: a.position.y,
                rammed: b_rams,
            };
            state.push_event(Event::new(turn, for_a));
            state.push_event(Event::new(turn, for_b));
            damaged = true;
        }
    }

    damaged
}

/// Bots outside the arena are put back against the wall, stopped, and
/// damaged by their impact speed.
pub fn process_bot_walls(state: &mut GameState) {
    let turn = state.turn;
    let min = Point::new(BOT_RADIUS, BOT_RADIUS);
    let max = Point::new(state.setup.width() - BOT_RADIUS, state.setup.height() - BOT_RADIUS);
    let mut hits = Vec::new();

    for bot in state.bots.values_mut() {
        if !bot.is_alive() {
            continue;
        }
        let clamped = bot.position.clamp(min, max);
        if clamped != bot.position {
            bot.position = clamped;
            bot.energy = (bot.energy - wall_damage(bot.speed)).max(0.0);
            bot.speed = 0.0;
            hits.push(bot.id);
        }
    }

    for id in hits {
        state.push_event(Event::bot_hit_wall(turn, id));
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::DeterministicRng;
    use crate::game::setup::GameSetup;
    use crate::game::state::{BotState, BulletState, RoundEntry};

    fn state_with_bots(positions: &[(f64, f64)]) -> GameState {
        let mut state = GameState::new(GameSetup::preset("classic").unwrap());
        let entries: Vec<RoundEntry> = (1..=positions.len() as u32)
            .map(|i| RoundEntry { id: BotId(i), team_id: None, initial_position: None })
            .collect();
        state.start_round(&mut DeterministicRng::new(1), &entries);
        for (i, (x, y)) in positions.iter().enumerate() {
            let bot = state.get_bot_mut(&BotId(i as u32 + 1)).unwrap();
            bot.position = Point::new(*x, *y);
            bot.direction = 0.0;
        }
        state.turn = 1;
        state
    }

    fn add_bullet(state: &mut GameState, owner: u32, start: (f64, f64), direction: f64, power: f64) -> BulletId {
        let id = state.next_bullet_id();
        state.bullets.insert(
            id,
            BulletState {
                id,
                owner_id: BotId(owner),
                power,
                direction,
                color: None,
                start: Point::new(start.0, start.1),
                fired_turn: 0,
            },
        );
        id
    }

    #[test]
    fn test_segments_intersect() {
        let p = Point::new;
        assert!(segments_intersect(p(0.0, 0.0), p(10.0, 10.0), p(0.0, 10.0), p(10.0, 0.0)));
        assert!(!segments_intersect(p(0.0, 0.0), p(10.0, 0.0), p(0.0, 1.0), p(10.0, 1.0)));
        // Touching at an endpoint
        assert!(segments_intersect(p(0.0, 0.0), p(5.0, 0.0), p(5.0, 0.0), p(5.0, 5.0)));
    }

    #[test]
    fn test_segment_circle_hit() {
        let c = Point::new(50.0, 0.0);
        let t = segment_circle_hit(Point::new(0.0, 0.0), Point::new(100.0, 0.0), c, 18.0).unwrap();
        assert!((t - 0.32).abs() < 1e-9);
        assert!(segment_circle_hit(Point::new(0.0, 30.0), Point::new(100.0, 30.0), c, 18.0).is_none());
        assert!(segment_circle_hit(Point::new(0.0, 0.0), Point::new(20.0, 0.0), c, 18.0).is_none());
    }

    #[test]
    fn test_crossing_bullets_destroy_each_other_once() {
        let mut state = state_with_bots(&[(50.0, 50.0), (750.0, 550.0)]);
        // Two bullets crossing at (400, 300) during turn 1
        add_bullet(&mut state, 1, (390.0, 300.0), 0.0, 1.0);
        add_bullet(&mut state, 2, (400.0, 290.0), 90.0, 1.0);

        assert!(process_bullet_collisions(&mut state));
        assert!(state.bullets.is_empty());

        let events = state.take_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].kind, EventKind::BulletHitBullet { .. }));
    }

    #[test]
    fn test_bullet_hits_nearest_bot_not_owner() {
        let mut state = state_with_bots(&[(100.0, 300.0), (130.0, 300.0), (170.0, 300.0)]);
        state.get_bot_mut(&BotId(2)).unwrap().energy = 10.0;
        add_bullet(&mut state, 1, (100.0, 300.0), 0.0, 3.0);
        // Second turn of flight: 111 -> 122 reaches bot 2 but not bot 3
        state.turn = 2;

        assert!(process_bullet_hits(&mut state));
        let events = state.take_events();
        assert_eq!(events.len(), 1);
        match &events[0].kind {
            EventKind::BulletHitBot { victim_id, damage, energy, .. } => {
                assert_eq!(*victim_id, BotId(2));
                assert_eq!(*damage, 16.0);
                assert_eq!(*energy, 0.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
        // Shooter regains 3 * power
        assert_eq!(state.get_bot(&BotId(1)).unwrap().energy, 109.0);
        assert_eq!(state.get_bot(&BotId(3)).unwrap().energy, 100.0);
    }

    #[test]
    fn test_ram_damages_both_and_separates() {
        let mut state = state_with_bots(&[(100.0, 300.0), (130.0, 300.0)]);
        {
            let a = state.get_bot_mut(&BotId(1)).unwrap();
            a.speed = 8.0;
        }

        assert!(process_bot_collisions(&mut state));
        let a = state.get_bot(&BotId(1)).unwrap();
        let b = state.get_bot(&BotId(2)).unwrap();
        assert!((a.energy - 99.4).abs() < 1e-9);
        assert!((b.energy - 99.4).abs() < 1e-9);
        assert_eq!(a.speed, 0.0);
        assert!((a.position.distance(b.position) - 36.0).abs() < 1e-9);
        // Only the rammer moved
        assert_eq!(b.position, Point::new(130.0, 300.0));

        let events = state.take_events();
        assert_eq!(events.len(), 2);
        match (&events[0].kind, &events[1].kind) {
            (
                EventKind::BotHitBot { bot_id: first, rammed: first_rammed, .. },
                EventKind::BotHitBot { bot_id: second, rammed: second_rammed, .. },
            ) => {
                assert_eq!((*first, *first_rammed), (BotId(1), true));
                assert_eq!((*second, *second_rammed), (BotId(2), false));
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn test_wall_hit_clamps_and_damages() {
        let mut state = state_with_bots(&[(5.0, 300.0), (400.0, 300.0)]);
        state.get_bot_mut(&BotId(1)).unwrap().speed = -8.0;

        process_bot_walls(&mut state);
        let bot: &BotState = state.get_bot(&BotId(1)).unwrap();
        assert_eq!(bot.position.x, BOT_RADIUS);
        assert_eq!(bot.speed, 0.0);
        assert_eq!(bot.energy, 97.0);

        let events = state.take_events();
        assert_eq!(events, vec![Event::bot_hit_wall(1, BotId(1))]);
    }

    #[test]
    fn test_bullet_leaves_arena() {
        let mut state = state_with_bots(&[(50.0, 50.0), (750.0, 550.0)]);
        add_bullet(&mut state, 1, (795.0, 300.0), 0.0, 1.0);
        process_bullet_walls(&mut state);
        assert!(state.bullets.is_empty());
        assert!(matches!(state.take_events()[0].kind, EventKind::BulletHitWall { .. }));
    }
}
