//! Bot Intents
//!
//! A bot sends a [`BotIntentUpdate`] each turn in which every field is
//! optional. Updates merge into the bot's standing [`BotIntent`]: movement
//! and turning orders stick until changed, while firing, rescans, team
//! messages and console output only apply to the turn they arrive for.

use serde::{Deserialize, Serialize};

use crate::core::color::Color;
use crate::game::rules::{MAX_SPEED, MAX_TEAM_MESSAGES_PER_TURN, MAX_TEAM_MESSAGE_SIZE};
use crate::game::state::{BotColors, BotId};

/// A message to teammates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMessage {
    /// Serialized payload, opaque to the server
    pub message: String,
    /// Payload type name, opaque to the server
    pub message_type: String,
    /// Single recipient, or every teammate when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<BotId>,
}

/// Wire form of an intent: every field optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotIntentUpdate {
    #[serde(default)]
    pub turn_rate: Option<f64>,
    #[serde(default)]
    pub gun_turn_rate: Option<f64>,
    #[serde(default)]
    pub radar_turn_rate: Option<f64>,
    #[serde(default)]
    pub target_speed: Option<f64>,
    #[serde(default)]
    pub firepower: Option<f64>,
    #[serde(default)]
    pub adjust_gun_for_body_turn: Option<bool>,
    #[serde(default)]
    pub adjust_radar_for_body_turn: Option<bool>,
    #[serde(default)]
    pub adjust_radar_for_gun_turn: Option<bool>,
    #[serde(default)]
    pub rescan: Option<bool>,
    #[serde(default)]
    pub fire_assist: Option<bool>,
    #[serde(default)]
    pub body_color: Option<String>,
    #[serde(default)]
    pub turret_color: Option<String>,
    #[serde(default)]
    pub radar_color: Option<String>,
    #[serde(default)]
    pub bullet_color: Option<String>,
    #[serde(default)]
    pub scan_color: Option<String>,
    #[serde(default)]
    pub tracks_color: Option<String>,
    #[serde(default)]
    pub gun_color: Option<String>,
    #[serde(default)]
    pub team_messages: Option<Vec<TeamMessage>>,
    #[serde(default)]
    pub std_out: Option<String>,
    #[serde(default)]
    pub std_err: Option<String>,
    #[serde(default)]
    pub debug_graphics: Option<String>,
}

/// A bot's standing orders.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BotIntent {
    pub turn_rate: f64,
    pub gun_turn_rate: f64,
    pub radar_turn_rate: f64,
    pub target_speed: f64,
    pub firepower: f64,
    pub adjust_gun_for_body_turn: bool,
    pub adjust_radar_for_body_turn: bool,
    pub adjust_radar_for_gun_turn: bool,
    pub rescan: bool,
    pub fire_assist: bool,
    pub colors: BotColors,
    pub team_messages: Vec<TeamMessage>,
    pub std_out: Option<String>,
    pub std_err: Option<String>,
    pub debug_graphics: Option<String>,
}

/// Keep finite numbers only.
fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

/// Apply a color field. An empty string clears the color; an unparsable
/// one is ignored.
fn merge_color(slot: &mut Option<Color>, update: Option<&String>) {
    match update.map(|s| s.trim()) {
        None => {}
        Some("") => *slot = None,
        Some(s) => {
            if let Ok(c) = s.parse() {
                *slot = Some(c);
            }
        }
    }
}

impl BotIntent {
    /// Merge a wire update. Invalid fields are dropped without touching the
    /// standing value.
    pub fn merge(&mut self, update: &BotIntentUpdate) {
        if let Some(v) = finite(update.turn_rate) {
            self.turn_rate = v;
        }
        if let Some(v) = finite(update.gun_turn_rate) {
            self.gun_turn_rate = v;
        }
        if let Some(v) = finite(update.radar_turn_rate) {
            self.radar_turn_rate = v;
        }
        if let Some(v) = finite(update.target_speed) {
            self.target_speed = v.clamp(-MAX_SPEED, MAX_SPEED);
        }
        if let Some(v) = finite(update.firepower) {
            self.firepower = v;
        }
        if let Some(v) = update.adjust_gun_for_body_turn {
            self.adjust_gun_for_body_turn = v;
        }
        if let Some(v) = update.adjust_radar_for_body_turn {
            self.adjust_radar_for_body_turn = v;
        }
        if let Some(v) = update.adjust_radar_for_gun_turn {
            self.adjust_radar_for_gun_turn = v;
        }
        if let Some(v) = update.rescan {
            self.rescan = v;
        }
        if let Some(v) = update.fire_assist {
            self.fire_assist = v;
        }

        merge_color(&mut self.colors.body_color, update.body_color.as_ref());
        merge_color(&mut self.colors.turret_color, update.turret_color.as_ref());
        merge_color(&mut self.colors.radar_color, update.radar_color.as_ref());
        merge_color(&mut self.colors.bullet_color, update.bullet_color.as_ref());
        merge_color(&mut self.colors.scan_color, update.scan_color.as_ref());
        merge_color(&mut self.colors.tracks_color, update.tracks_color.as_ref());
        merge_color(&mut self.colors.gun_color, update.gun_color.as_ref());

        if let Some(messages) = &update.team_messages {
            self.team_messages = messages
                .iter()
                .filter(|m| m.message.len() <= MAX_TEAM_MESSAGE_SIZE)
                .take(MAX_TEAM_MESSAGES_PER_TURN)
                .cloned()
                .collect();
        }
        if update.std_out.is_some() {
            self.std_out = update.std_out.clone();
        }
        if update.std_err.is_some() {
            self.std_err = update.std_err.clone();
        }
        if update.debug_graphics.is_some() {
            self.debug_graphics = update.debug_graphics.clone();
        }
    }

    /// Drop the single-turn fields after a turn was applied.
    pub fn clear_transient(&mut self) {
        self.firepower = 0.0;
        self.rescan = false;
        self.team_messages.clear();
        self.std_out = None;
        self.std_err = None;
        self.debug_graphics = None;
    }
}

// =============================================================================
// TESTS
// =============================================================================
