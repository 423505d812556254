//! Protocol Messages
//!
//! Wire format for every connection role. One JSON object per WebSocket
//! text frame, discriminated by its `type` field; field names are
//! camelCase.

use serde::{Deserialize, Serialize};

use crate::game::events::Event;
use crate::game::intent::BotIntentUpdate;
use crate::game::score::BotResults;
use crate::game::setup::{GameSetup, GameSetupRequest, InitialPosition};
use crate::game::state::{BotId, BotState, BulletView};

// =============================================================================
// HANDSHAKES
// =============================================================================

/// Self-description a bot sends at handshake.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotDetails {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub country_codes: Vec<String>,
    #[serde(default)]
    pub game_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub programming_lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_position: Option<InitialPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_version: Option<String>,
}

/// Bot handshake.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotHandshake {
    #[serde(flatten)]
    pub details: BotDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// Controller or observer handshake.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerHandshake {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// Address of a connected bot, as reported by `BotListUpdate`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotAddress {
    pub host: String,
    pub port: u16,
}

/// A connected bot, as listed to controllers and observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotInfo {
    pub host: String,
    pub port: u16,
    #[serde(flatten)]
    pub details: BotDetails,
}

/// A bot taking part in a battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: BotId,
    #[serde(flatten)]
    pub details: BotDetails,
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from any client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// First message of a bot connection.
    BotHandshake(BotHandshake),

    /// First message of a controller connection.
    ControllerHandshake(PeerHandshake),

    /// First message of an observer connection.
    ObserverHandshake(PeerHandshake),

    /// Bot is ready for the game it was invited to.
    BotReady,

    /// Bot orders for the next turn.
    BotIntent(BotIntentUpdate),

    /// Start a battle with the bots at the given addresses.
    #[serde(rename_all = "camelCase")]
    StartGame {
        #[serde(default)]
        game_setup: Option<GameSetupRequest>,
        #[serde(default)]
        bot_addresses: Vec<BotAddress>,
    },

    StopGame,
    PauseGame,
    ResumeGame,

    /// Run one turn while paused.
    NextTurn,

    /// Restart the running battle from round 1.
    RestartGame,

    /// Change turns per second (-1 = unlimited, 0 = paused).
    ChangeTps { tps: i32 },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Reply to a successful handshake.
    ServerHandshake(ServerHandshake),

    /// Connected bots changed.
    BotListUpdate { bots: Vec<BotInfo> },

    #[serde(rename_all = "camelCase")]
    GameStartedEventForBot {
        my_id: BotId,
        teammate_ids: Vec<BotId>,
        game_setup: GameSetup,
    },

    #[serde(rename_all = "camelCase")]
    GameStartedEventForObserver {
        game_setup: GameSetup,
        participants: Vec<Participant>,
    },

    GameAbortedEvent,

    #[serde(rename_all = "camelCase")]
    GameEndedEventForBot {
        number_of_rounds: u32,
        results: BotResults,
    },

    #[serde(rename_all = "camelCase")]
    GameEndedEventForObserver {
        number_of_rounds: u32,
        results: Vec<BotResults>,
    },

    GamePausedEventForObserver,
    GameResumedEventForObserver,

    TpsChangedEvent { tps: i32 },

    #[serde(rename_all = "camelCase")]
    RoundStartedEvent { round_number: u32 },

    #[serde(rename_all = "camelCase")]
    RoundEndedEventForBot {
        round_number: u32,
        turn_number: u32,
        results: BotResults,
    },

    #[serde(rename_all = "camelCase")]
    RoundEndedEventForObserver {
        round_number: u32,
        turn_number: u32,
        results: Vec<BotResults>,
    },

    /// Bot-scoped turn state.
    #[serde(rename_all = "camelCase")]
    TickEventForBot {
        round_number: u32,
        turn_number: u32,
        bot_state: BotState,
        bullet_states: Vec<BulletView>,
        events: Vec<Event>,
    },

    /// Full turn state for controllers and observers.
    #[serde(rename_all = "camelCase")]
    TickEventForObserver {
        round_number: u32,
        turn_number: u32,
        bot_states: Vec<BotState>,
        bullet_states: Vec<BulletView>,
        events: Vec<Event>,
        /// Hex SHA-256 of the turn snapshot
        state_hash: String,
    },

    /// A controller command could not be carried out.
    CommandRejected(CommandRejected),
}

/// Server identity sent after a handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerHandshake {
    pub session_id: String,
    pub name: String,
    pub version: String,
    pub variant: String,
    pub game_types: Vec<String>,
}

/// Why a command was not carried out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRejected {
    pub code: ErrorCode,
    pub message: String,
}

/// Rejection codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Setup failed validation.
    InvalidSetup,
    /// A battle is already running.
    GameInProgress,
    /// No battle to act on.
    NoGameRunning,
    /// Message could not be parsed.
    MalformedMessage,
    /// Message not allowed for this connection role.
    NotAllowed,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Wire type name, for logs and rejection reasons.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BotHandshake(_) => "BotHandshake",
            Self::ControllerHandshake(_) => "ControllerHandshake",
            Self::ObserverHandshake(_) => "ObserverHandshake",
            Self::BotReady => "BotReady",
            Self::BotIntent(_) => "BotIntent",
            Self::StartGame { .. } => "StartGame",
            Self::StopGame => "StopGame",
            Self::PauseGame => "PauseGame",
            Self::ResumeGame => "ResumeGame",
            Self::NextTurn => "NextTurn",
            Self::RestartGame => "RestartGame",
            Self::ChangeTps { .. } => "ChangeTps",
        }
    }

    /// Whether this message opens a connection.
    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            Self::BotHandshake(_) | Self::ControllerHandshake(_) | Self::ObserverHandshake(_)
        )
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Rejection helper.
    pub fn rejected(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::CommandRejected(CommandRejected { code, message: message.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bot_handshake_parses() {
        let json = r#"{
            "type": "BotHandshake",
            "name": "Walls",
            "version": "1.0",
            "authors": ["A. Author"],
            "gameTypes": ["classic", "melee"],
            "teamId": 4,
            "initialPosition": {"x": 50, "y": 60},
            "secret": "s3cret"
        }"#;
        match ClientMessage::from_json(json).unwrap() {
            ClientMessage::BotHandshake(hs) => {
                assert_eq!(hs.details.name, "Walls");
                assert_eq!(hs.details.game_types, vec!["classic", "melee"]);
                assert_eq!(hs.details.team_id, Some(4));
                assert_eq!(hs.details.initial_position.unwrap().x, Some(50.0));
                assert_eq!(hs.secret.as_deref(), Some("s3cret"));
            }
            other => panic!("Wrong message type: {other:?}"),
        }
    }

    #[test]
    fn test_controller_commands_parse() {
        let start = ClientMessage::from_json(
            r#"{"type":"StartGame","gameSetup":{"gameType":"classic","numberOfRounds":1},
                "botAddresses":[{"host":"127.0.0.1","port":5000}]}"#,
        )
        .unwrap();
        match start {
            ClientMessage::StartGame { game_setup, bot_addresses } => {
                assert_eq!(game_setup.unwrap().number_of_rounds, Some(1));
                assert_eq!(bot_addresses, vec![BotAddress { host: "127.0.0.1".into(), port: 5000 }]);
            }
            other => panic!("Wrong message type: {other:?}"),
        }

        assert_eq!(ClientMessage::from_json(r#"{"type":"PauseGame"}"#).unwrap(), ClientMessage::PauseGame);
        assert_eq!(
            ClientMessage::from_json(r#"{"type":"ChangeTps","tps":-1}"#).unwrap(),
            ClientMessage::ChangeTps { tps: -1 }
        );
    }

    #[test]
    fn test_bot_intent_parses() {
        let msg = ClientMessage::from_json(r#"{"type":"BotIntent","targetSpeed":8,"firepower":3}"#).unwrap();
        match msg {
            ClientMessage::BotIntent(update) => {
                assert_eq!(update.target_speed, Some(8.0));
                assert_eq!(update.firepower, Some(3.0));
            }
            other => panic!("Wrong message type: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(ClientMessage::from_json(r#"{"type":"Teleport"}"#).is_err());
        assert!(ClientMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_server_handshake_shape() {
        let msg = ServerMessage::ServerHandshake(ServerHandshake {
            session_id: "abc".into(),
            name: "server".into(),
            version: "0.1.0".into(),
            variant: "Tank Battle".into(),
            game_types: vec!["classic".into()],
        });
        let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "ServerHandshake");
        assert_eq!(json["sessionId"], "abc");
        assert_eq!(json["gameTypes"][0], "classic");
    }

    #[test]
    fn test_tick_event_shape() {
        let msg = ServerMessage::TickEventForObserver {
            round_number: 1,
            turn_number: 7,
            bot_states: vec![],
            bullet_states: vec![],
            events: vec![Event::skipped_turn(7, BotId(2))],
            state_hash: "00".into(),
        };
        let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "TickEventForObserver");
        assert_eq!(json["turnNumber"], 7);
        assert_eq!(json["events"][0]["type"], "SkippedTurnEvent");
        assert_eq!(json["stateHash"], "00");
    }

    #[test]
    fn test_rejection_codes() {
        let json = ServerMessage::rejected(ErrorCode::InvalidSetup, "arena too small").to_json().unwrap();
        assert!(json.contains("\"type\":\"CommandRejected\""));
        assert!(json.contains("invalid_setup"));
    }

    #[test]
    fn test_unit_server_messages() {
        let json = ServerMessage::GameAbortedEvent.to_json().unwrap();
        assert_eq!(json, r#"{"type":"GameAbortedEvent"}"#);
        assert_eq!(ServerMessage::from_json(&json).unwrap(), ServerMessage::GameAbortedEvent);
    }
}
