//! Broadcast Layer
//!
//! Turns a finished turn into per-recipient tick messages and fans them out.
//! Bots see their own state, their own bullets and the events addressed to
//! them; controllers and observers see everything.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error};

use crate::game::events::Event;
use crate::game::state::{BotId, BotState, GameState};
use crate::network::connection::{ConnectionHandle, ConnectionId, DeliveryError};
use crate::network::protocol::ServerMessage;

/// Encode once for many recipients.
pub fn encode(message: &ServerMessage) -> Option<Arc<str>> {
    match message.to_json() {
        Ok(text) => Some(text.into()),
        Err(e) => {
            error!("Failed to serialize message: {}", e);
            None
        }
    }
}

/// Tick for a single bot.
pub fn bot_tick(state: &GameState, bot: &BotState, events: &[Event]) -> ServerMessage {
    ServerMessage::TickEventForBot {
        round_number: state.round,
        turn_number: state.turn,
        bot_state: bot.clone(),
        bullet_states: state
            .bullets
            .values()
            .filter(|b| b.owner_id == bot.id)
            .map(|b| b.view_at(state.turn))
            .collect(),
        events: events.iter().filter(|e| e.is_addressed_to(bot.id)).cloned().collect(),
    }
}

/// Tick for controllers and observers. `deaths` are the bots removed this
/// turn, shown once more in their final state.
pub fn observer_tick(state: &GameState, deaths: &[BotState], events: &[Event]) -> ServerMessage {
    let mut bot_states: Vec<BotState> = state.bots.values().cloned().collect();
    bot_states.extend(deaths.iter().cloned());
    bot_states.sort_by_key(|b| b.id);

    ServerMessage::TickEventForObserver {
        round_number: state.round,
        turn_number: state.turn,
        bot_states,
        bullet_states: state.bullet_views(),
        events: events.to_vec(),
        state_hash: hex::encode(state.compute_hash()),
    }
}

/// Send the same frame to every handle. Returns the ids whose delivery
/// failed; those connections are already closing.
pub fn fan_out<'a>(handles: impl IntoIterator<Item = &'a ConnectionHandle>, text: &Arc<str>) -> Vec<ConnectionId> {
    let mut failed = Vec::new();
    for handle in handles {
        if let Err(e) = handle.try_deliver(text.clone()) {
            debug!(conn = handle.id, "Broadcast dropped: {}", e);
            failed.push(handle.id);
        }
    }
    failed
}

/// Encode and send one message to a single handle.
pub fn deliver(handle: &ConnectionHandle, message: &ServerMessage) -> Result<(), DeliveryError> {
    let result = handle.send(message);
    if let Err(e) = &result {
        debug!(conn = handle.id, "Delivery failed: {}", e);
    }
    result
}

/// Per-bot ticks for everyone who should hear about this turn: alive bots
/// and bots that died this turn.
pub fn bot_ticks(state: &GameState, deaths: &[BotState], events: &[Event]) -> BTreeMap<BotId, ServerMessage> {
    state
        .bots
        .values()
        .chain(deaths.iter())
        .map(|bot| (bot.id, bot_tick(state, bot, events)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::DeterministicRng;
    use crate::game::setup::GameSetup;
    use crate::game::state::{BulletId, BulletState, RoundEntry};
    use crate::core::vec2::Point;

    fn state() -> GameState {
        let mut state = GameState::new(GameSetup::preset("classic").unwrap());
        let entries: Vec<RoundEntry> = (1..=3)
            .map(|i| RoundEntry { id: BotId(i), team_id: None, initial_position: None })
            .collect();
        state.start_round(&mut DeterministicRng::new(11), &entries);
        state.turn = 4;
        for (id, owner) in [(1, 1), (2, 2)] {
            state.bullets.insert(
                BulletId(id),
                BulletState {
                    id: BulletId(id),
                    owner_id: BotId(owner),
                    power: 1.0,
                    direction: 0.0,
                    color: None,
                    start: Point::new(100.0, 100.0),
                    fired_turn: 3,
                },
            );
        }
        state
    }

    #[test]
    fn test_bot_tick_is_filtered() {
        let state = state();
        let events = vec![
            Event::skipped_turn(4, BotId(1)),
            Event::skipped_turn(4, BotId(2)),
            Event::bot_death(4, BotId(3)),
        ];
        let bot = state.get_bot(&BotId(1)).unwrap();
        match bot_tick(&state, bot, &events) {
            ServerMessage::TickEventForBot { turn_number, bot_state, bullet_states, events, .. } => {
                assert_eq!(turn_number, 4);
                assert_eq!(bot_state.id, BotId(1));
                assert_eq!(bullet_states.len(), 1);
                assert_eq!(bullet_states[0].owner_id, BotId(1));
                // Own skip and the public death, not bot 2's skip
                assert_eq!(events.len(), 2);
            }
            other => panic!("Wrong message: {other:?}"),
        }
    }

    #[test]
    fn test_observer_tick_has_everything() {
        let mut state = state();
        let dead = state.bots.remove(&BotId(2)).unwrap();
        let events = vec![Event::bot_death(4, BotId(2))];
        match observer_tick(&state, &[dead], &events) {
            ServerMessage::TickEventForObserver { bot_states, bullet_states, events, state_hash, .. } => {
                let ids: Vec<BotId> = bot_states.iter().map(|b| b.id).collect();
                assert_eq!(ids, vec![BotId(1), BotId(2), BotId(3)]);
                assert_eq!(bullet_states.len(), 2);
                assert_eq!(events.len(), 1);
                assert_eq!(state_hash.len(), 64);
            }
            other => panic!("Wrong message: {other:?}"),
        }
    }

    #[test]
    fn test_dead_bots_get_a_final_tick() {
        let mut state = state();
        let dead = state.bots.remove(&BotId(3)).unwrap();
        let ticks = bot_ticks(&state, &[dead], &[]);
        assert_eq!(ticks.keys().copied().collect::<Vec<_>>(), vec![BotId(1), BotId(2), BotId(3)]);
    }

    #[tokio::test]
    async fn test_fan_out_reports_failures() {
        let addr = "127.0.0.1:1".parse().unwrap();
        let (a, _rx_a, _) = ConnectionHandle::new(1, addr, 4);
        let (b, rx_b, _) = ConnectionHandle::new(2, addr, 4);
        drop(rx_b);
        let text = encode(&ServerMessage::GameAbortedEvent).unwrap();
        assert_eq!(fan_out([&a, &b], &text), vec![2]);
    }
}
