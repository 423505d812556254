//! Game Setup
//!
//! The immutable battle configuration. A controller's `StartGame` carries an
//! optional [`GameSetupRequest`]; it is merged over the preset for the
//! requested game type and validated before any round begins.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Game type used when a controller does not name one.
pub const DEFAULT_GAME_TYPE: &str = "classic";

/// Game types every server knows presets for.
pub const KNOWN_GAME_TYPES: [&str; 4] = ["classic", "melee", "1v1", "custom"];

/// Default turn timeout (30 ms).
pub const DEFAULT_TURN_TIMEOUT_MICROS: u64 = 30_000;

/// Default time bots get to answer `GameStarted` with `BotReady` (1 s).
pub const DEFAULT_READY_TIMEOUT_MICROS: u64 = 1_000_000;

/// Default turns without damage before a round is called.
pub const DEFAULT_MAX_INACTIVITY_TURNS: u32 = 450;

/// Default gun cooling per turn.
pub const DEFAULT_GUN_COOLING_RATE: f64 = 0.1;

/// Default turns per second.
pub const DEFAULT_TURNS_PER_SECOND: i32 = 30;

/// Arena size bounds (each axis).
pub const MIN_ARENA_SIZE: u32 = 400;
pub const MAX_ARENA_SIZE: u32 = 5000;

/// Round count bounds.
pub const MIN_ROUNDS: u32 = 1;
pub const MAX_ROUNDS: u32 = 1000;

/// Gun cooling rate bounds.
pub const MIN_GUN_COOLING_RATE: f64 = 0.1;
pub const MAX_GUN_COOLING_RATE: f64 = 0.7;

/// Setup rejected before a battle starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SetupError {
    #[error("game type '{0}' is not supported by this server")]
    UnsupportedGameType(String),

    #[error("arena size {width}x{height} outside {min}..={max}")]
    ArenaSize { width: u32, height: u32, min: u32, max: u32 },

    #[error("number of rounds {0} outside 1..=1000")]
    Rounds(u32),

    #[error("gun cooling rate {0} outside 0.1..=0.7")]
    GunCoolingRate(f64),

    #[error("turn timeout must be positive")]
    TurnTimeout,

    #[error("ready timeout must be positive")]
    ReadyTimeout,

    #[error("max inactivity turns must be positive")]
    InactivityTurns,

    #[error("minimum number of participants must be at least 1")]
    MinParticipants,

    #[error("at least {required} participants needed, got {actual}")]
    TooFewParticipants { required: u32, actual: u32 },

    #[error("at most {allowed} participants allowed, got {actual}")]
    TooManyParticipants { allowed: u32, actual: u32 },
}

/// Validated, immutable battle configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSetup {
    pub game_type: String,
    pub arena_width: u32,
    pub arena_height: u32,
    pub min_number_of_participants: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_number_of_participants: Option<u32>,
    pub number_of_rounds: u32,
    pub gun_cooling_rate: f64,
    pub max_inactivity_turns: u32,
    pub turn_timeout: u64,
    pub ready_timeout: u64,
    pub default_turns_per_second: i32,
    /// Whether bots' handshake `initialPosition` is honoured
    pub initial_positions_enabled: bool,
}

/// Controller-supplied overrides; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSetupRequest {
    #[serde(default)]
    pub game_type: Option<String>,
    #[serde(default)]
    pub arena_width: Option<u32>,
    #[serde(default)]
    pub arena_height: Option<u32>,
    #[serde(default)]
    pub min_number_of_participants: Option<u32>,
    #[serde(default)]
    pub max_number_of_participants: Option<u32>,
    #[serde(default)]
    pub number_of_rounds: Option<u32>,
    #[serde(default)]
    pub gun_cooling_rate: Option<f64>,
    #[serde(default)]
    pub max_inactivity_turns: Option<u32>,
    #[serde(default)]
    pub turn_timeout: Option<u64>,
    #[serde(default)]
    pub ready_timeout: Option<u64>,
    #[serde(default)]
    pub default_turns_per_second: Option<i32>,
}

/// Bot-requested start position, honoured only when enabled on the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialPosition {
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub direction: Option<f64>,
}

impl GameSetup {
    /// Preset for a known game type.
    pub fn preset(game_type: &str) -> Option<Self> {
        let (width, height, min, max) = match game_type {
            "classic" => (800, 600, 2, None),
            "melee" => (1000, 1000, 10, None),
            "1v1" => (1000, 1000, 2, Some(2)),
            "custom" => (800, 600, 1, None),
            _ => return None,
        };
        Some(Self {
            game_type: game_type.to_string(),
            arena_width: width,
            arena_height: height,
            min_number_of_participants: min,
            max_number_of_participants: max,
            number_of_rounds: 10,
            gun_cooling_rate: DEFAULT_GUN_COOLING_RATE,
            max_inactivity_turns: DEFAULT_MAX_INACTIVITY_TURNS,
            turn_timeout: DEFAULT_TURN_TIMEOUT_MICROS,
            ready_timeout: DEFAULT_READY_TIMEOUT_MICROS,
            default_turns_per_second: DEFAULT_TURNS_PER_SECOND,
            initial_positions_enabled: false,
        })
    }

    /// Build and validate a setup from a controller request.
    ///
    /// `server_game_types` is the set the server was started with;
    /// `participants` is the number of bots the controller selected.
    pub fn from_request(
        request: Option<&GameSetupRequest>,
        server_game_types: &[String],
        initial_positions_enabled: bool,
        participants: u32,
    ) -> Result<Self, SetupError> {
        let empty = GameSetupRequest::default();
        let req = request.unwrap_or(&empty);

        let game_type = req
            .game_type
            .clone()
            .or_else(|| server_game_types.first().cloned())
            .unwrap_or_else(|| DEFAULT_GAME_TYPE.to_string());

        if !server_game_types.iter().any(|t| *t == game_type) {
            return Err(SetupError::UnsupportedGameType(game_type));
        }
        let mut setup = Self::preset(&game_type)
            .ok_or_else(|| SetupError::UnsupportedGameType(game_type.clone()))?;

        if let Some(v) = req.arena_width {
            setup.arena_width = v;
        }
        if let Some(v) = req.arena_height {
            setup.arena_height = v;
        }
        if let Some(v) = req.min_number_of_participants {
            setup.min_number_of_participants = v;
        }
        if req.max_number_of_participants.is_some() {
            setup.max_number_of_participants = req.max_number_of_participants;
        }
        if let Some(v) = req.number_of_rounds {
            setup.number_of_rounds = v;
        }
        if let Some(v) = req.gun_cooling_rate {
            setup.gun_cooling_rate = v;
        }
        if let Some(v) = req.max_inactivity_turns {
            setup.max_inactivity_turns = v;
        }
        if let Some(v) = req.turn_timeout {
            setup.turn_timeout = v;
        }
        if let Some(v) = req.ready_timeout {
            setup.ready_timeout = v;
        }
        if let Some(v) = req.default_turns_per_second {
            setup.default_turns_per_second = v;
        }
        setup.initial_positions_enabled = initial_positions_enabled;

        setup.validate(participants)?;
        Ok(setup)
    }

    /// Check every bound, including the participant count.
    pub fn validate(&self, participants: u32) -> Result<(), SetupError> {
        let size_ok = |v: u32| (MIN_ARENA_SIZE..=MAX_ARENA_SIZE).contains(&v);
        if !size_ok(self.arena_width) || !size_ok(self.arena_height) {
            return Err(SetupError::ArenaSize {
                width: self.arena_width,
                height: self.arena_height,
                min: MIN_ARENA_SIZE,
                max: MAX_ARENA_SIZE,
            });
        }
        if !(MIN_ROUNDS..=MAX_ROUNDS).contains(&self.number_of_rounds) {
            return Err(SetupError::Rounds(self.number_of_rounds));
        }
        if !(MIN_GUN_COOLING_RATE..=MAX_GUN_COOLING_RATE).contains(&self.gun_cooling_rate) {
            return Err(SetupError::GunCoolingRate(self.gun_cooling_rate));
        }
        if self.turn_timeout == 0 {
            return Err(SetupError::TurnTimeout);
        }
        if self.ready_timeout == 0 {
            return Err(SetupError::ReadyTimeout);
        }
        if self.max_inactivity_turns == 0 {
            return Err(SetupError::InactivityTurns);
        }
        if self.min_number_of_participants == 0 {
            return Err(SetupError::MinParticipants);
        }
        if participants < self.min_number_of_participants {
            return Err(SetupError::TooFewParticipants {
                required: self.min_number_of_participants,
                actual: participants,
            });
        }
        if let Some(max) = self.max_number_of_participants {
            if participants > max {
                return Err(SetupError::TooManyParticipants { allowed: max, actual: participants });
            }
        }
        Ok(())
    }

    /// Arena width as f64.
    #[inline]
    pub fn width(&self) -> f64 {
        self.arena_width as f64
    }

    /// Arena height as f64.
    #[inline]
    pub fn height(&self) -> f64 {
        self.arena_height as f64
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn types(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_presets() {
        let classic = GameSetup::preset("classic").unwrap();
        assert_eq!((classic.arena_width, classic.arena_height), (800, 600));
        assert_eq!(classic.min_number_of_participants, 2);

        let duel = GameSetup::preset("1v1").unwrap();
        assert_eq!(duel.max_number_of_participants, Some(2));

        assert!(GameSetup::preset("chess").is_none());
    }

    #[test]
    fn test_from_request_defaults_to_first_server_type() {
        let setup = GameSetup::from_request(None, &types(&["melee", "classic"]), false, 10).unwrap();
        assert_eq!(setup.game_type, "melee");
    }

    #[test]
    fn test_from_request_overrides() {
        let req = GameSetupRequest {
            game_type: Some("classic".into()),
            number_of_rounds: Some(1),
            arena_width: Some(1200),
            ..Default::default()
        };
        let setup = GameSetup::from_request(Some(&req), &types(&["classic"]), true, 2).unwrap();
        assert_eq!(setup.number_of_rounds, 1);
        assert_eq!(setup.arena_width, 1200);
        assert_eq!(setup.arena_height, 600);
        assert!(setup.initial_positions_enabled);
    }

    #[test]
    fn test_rejects_unsupported_type() {
        let req = GameSetupRequest { game_type: Some("melee".into()), ..Default::default() };
        let err = GameSetup::from_request(Some(&req), &types(&["classic"]), false, 10).unwrap_err();
        assert_eq!(err, SetupError::UnsupportedGameType("melee".into()));
    }

    #[test]
    fn test_rejects_out_of_bounds() {
        let server = types(&["classic"]);

        let small = GameSetupRequest { arena_width: Some(100), ..Default::default() };
        assert!(matches!(
            GameSetup::from_request(Some(&small), &server, false, 2),
            Err(SetupError::ArenaSize { .. })
        ));

        let rounds = GameSetupRequest { number_of_rounds: Some(0), ..Default::default() };
        assert_eq!(
            GameSetup::from_request(Some(&rounds), &server, false, 2),
            Err(SetupError::Rounds(0))
        );

        let cooling = GameSetupRequest { gun_cooling_rate: Some(0.9), ..Default::default() };
        assert!(matches!(
            GameSetup::from_request(Some(&cooling), &server, false, 2),
            Err(SetupError::GunCoolingRate(_))
        ));
    }

    #[test]
    fn test_participant_bounds() {
        assert_eq!(
            GameSetup::from_request(None, &types(&["classic"]), false, 1),
            Err(SetupError::TooFewParticipants { required: 2, actual: 1 })
        );
        assert_eq!(
            GameSetup::from_request(None, &types(&["1v1"]), false, 3),
            Err(SetupError::TooManyParticipants { allowed: 2, actual: 3 })
        );
    }

    #[test]
    fn test_rejects_degenerate_counts() {
        let server = types(&["custom"]);

        let inactivity = GameSetupRequest { max_inactivity_turns: Some(0), ..Default::default() };
        assert_eq!(
            GameSetup::from_request(Some(&inactivity), &server, false, 2),
            Err(SetupError::InactivityTurns)
        );

        let nobody = GameSetupRequest { min_number_of_participants: Some(0), ..Default::default() };
        assert_eq!(
            GameSetup::from_request(Some(&nobody), &server, false, 0),
            Err(SetupError::MinParticipants)
        );

        // custom needs one bot, so an empty selection still fails
        assert_eq!(
            GameSetup::from_request(None, &server, false, 0),
            Err(SetupError::TooFewParticipants { required: 1, actual: 0 })
        );
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(GameSetup::preset("classic").unwrap()).unwrap();
        assert_eq!(json["arenaWidth"], 800);
        assert_eq!(json["gunCoolingRate"], 0.1);
        assert!(json.get("maxNumberOfParticipants").is_none());
    }
}
