//! Game Events
//!
//! Facts produced while a turn is applied. Each event carries the turn it
//! happened in and is never changed after it was pushed. On the wire the
//! variant name is the `type` discriminator.

use serde::{Deserialize, Serialize};

use crate::game::state::{BotId, BulletView};

/// Event payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    /// A bot's energy reached zero
    #[serde(rename = "BotDeathEvent", rename_all = "camelCase")]
    BotDeath { victim_id: BotId },

    /// A bot drove into a wall
    #[serde(rename = "BotHitWallEvent", rename_all = "camelCase")]
    BotHitWall { victim_id: BotId },

    /// `bot_id` collided with `victim_id`; `rammed` is set when `bot_id`
    /// was driving into the victim
    #[serde(rename = "BotHitBotEvent", rename_all = "camelCase")]
    BotHitBot {
        victim_id: BotId,
        bot_id: BotId,
        energy: f64,
        x: f64,
        y: f64,
        rammed: bool,
    },

    #[serde(rename = "BulletFiredEvent", rename_all = "camelCase")]
    BulletFired { bullet: BulletView },

    #[serde(rename = "BulletHitBotEvent", rename_all = "camelCase")]
    BulletHitBot {
        victim_id: BotId,
        bullet: BulletView,
        damage: f64,
        /// Victim energy after the hit
        energy: f64,
    },

    #[serde(rename = "BulletHitBulletEvent", rename_all = "camelCase")]
    BulletHitBullet { bullet: BulletView, hit_bullet: BulletView },

    #[serde(rename = "BulletHitWallEvent", rename_all = "camelCase")]
    BulletHitWall { bullet: BulletView },

    #[serde(rename = "ScannedBotEvent", rename_all = "camelCase")]
    ScannedBot {
        scanned_by_bot_id: BotId,
        scanned_bot_id: BotId,
        energy: f64,
        x: f64,
        y: f64,
        direction: f64,
        speed: f64,
    },

    /// The bot did not deliver an intent in time for this turn
    #[serde(rename = "SkippedTurnEvent", rename_all = "camelCase")]
    SkippedTurn { bot_id: BotId },

    #[serde(rename = "WonRoundEvent", rename_all = "camelCase")]
    WonRound { bot_id: BotId },

    #[serde(rename = "TeamMessageEvent", rename_all = "camelCase")]
    TeamMessage {
        message: String,
        message_type: String,
        sender_id: BotId,
        receiver_id: BotId,
    },
}

/// A game event stamped with its turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Turn in which the event happened
    pub turn_number: u32,

    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    /// Create a new event.
    pub fn new(turn_number: u32, kind: EventKind) -> Self {
        Self { turn_number, kind }
    }

    /// Whether a bot's tick should include this event.
    ///
    /// Deaths are public; everything else goes only to the bots it
    /// involves.
    pub fn is_addressed_to(&self, bot: BotId) -> bool {
        match &self.kind {
            EventKind::BotDeath { .. } => true,
            EventKind::BotHitWall { victim_id } => *victim_id == bot,
            EventKind::BotHitBot { bot_id, .. } => *bot_id == bot,
            EventKind::BulletFired { bullet } => bullet.owner_id == bot,
            EventKind::BulletHitBot { victim_id, bullet, .. } => {
                *victim_id == bot || bullet.owner_id == bot
            }
            EventKind::BulletHitBullet { bullet, hit_bullet } => {
                bullet.owner_id == bot || hit_bullet.owner_id == bot
            }
            EventKind::BulletHitWall { bullet } => bullet.owner_id == bot,
            EventKind::ScannedBot { scanned_by_bot_id, .. } => *scanned_by_bot_id == bot,
            EventKind::SkippedTurn { bot_id } => *bot_id == bot,
            EventKind::WonRound { bot_id } => *bot_id == bot,
            EventKind::TeamMessage { receiver_id, .. } => *receiver_id == bot,
        }
    }

    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create bot death event.
    pub fn bot_death(turn: u32, victim_id: BotId) -> Self {
        Self::new(turn, EventKind::BotDeath { victim_id })
    }

    /// Create bot hit wall event.
    pub fn bot_hit_wall(turn: u32, victim_id: BotId) -> Self {
        Self::new(turn, EventKind::BotHitWall { victim_id })
    }

    /// Create skipped turn event.
    pub fn skipped_turn(turn: u32, bot_id: BotId) -> Self {
        Self::new(turn, EventKind::SkippedTurn { bot_id })
    }

    /// Create won round event.
    pub fn won_round(turn: u32, bot_id: BotId) -> Self {
        Self::new(turn, EventKind::WonRound { bot_id })
    }

    /// Create bullet fired event.
    pub fn bullet_fired(turn: u32, bullet: BulletView) -> Self {
        Self::new(turn, EventKind::BulletFired { bullet })
    }

    /// Create bullet hit wall event.
    pub fn bullet_hit_wall(turn: u32, bullet: BulletView) -> Self {
        Self::new(turn, EventKind::BulletHitWall { bullet })
    }
}
