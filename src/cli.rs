//! Command Line
//!
//! Every flag can also come from a `TANK_BATTLE_*` environment variable.

use std::time::Duration;

use clap::Parser;

use crate::network::auth::SecretSet;
use crate::network::server::{PortSetting, ServerConfig, DEFAULT_PORT};

/// Tank battle authoritative server.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Cli {
    /// Interface to bind
    #[arg(long, env = "TANK_BATTLE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port number, or "inherit" to take a free port and print it
    #[arg(short, long, env = "TANK_BATTLE_PORT", default_value_t = PortSetting::Fixed(DEFAULT_PORT), value_parser = parse_port)]
    pub port: PortSetting,

    /// Game types to offer, comma separated; the first is the default
    #[arg(short, long, env = "TANK_BATTLE_GAMES", value_delimiter = ',', default_value = "classic,melee,1v1")]
    pub games: Vec<String>,

    /// Secrets accepted from controllers, comma separated
    #[arg(long, env = "TANK_BATTLE_CONTROLLER_SECRETS", default_value = "")]
    pub controller_secrets: String,

    /// Secrets accepted from bots, comma separated
    #[arg(long, env = "TANK_BATTLE_BOT_SECRETS", default_value = "")]
    pub bot_secrets: String,

    /// Turns per second: -1 unlimited, 0 paused
    #[arg(short, long, env = "TANK_BATTLE_TPS", default_value_t = 30, allow_negative_numbers = true)]
    pub tps: i32,

    /// Let bots choose their start position
    #[arg(long, env = "TANK_BATTLE_ENABLE_INITIAL_POSITION")]
    pub enable_initial_position: bool,

    /// Stdin line that stops the server
    #[arg(long, env = "TANK_BATTLE_QUIT_TOKEN", default_value = "q")]
    pub quit_token: String,

    /// Maximum concurrent connections
    #[arg(long, env = "TANK_BATTLE_MAX_CONNECTIONS", default_value_t = 256)]
    pub max_connections: usize,
}

fn parse_port(s: &str) -> Result<PortSetting, String> {
    s.parse()
}

impl Cli {
    /// Build the server configuration.
    pub fn into_config(self) -> Result<ServerConfig, String> {
        if self.tps < -1 {
            return Err(format!("tps must be -1 or more, got {}", self.tps));
        }
        let game_types: Vec<String> = self
            .games
            .iter()
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect();
        if game_types.is_empty() {
            return Err("at least one game type is required".to_string());
        }

        Ok(ServerConfig {
            host: self.host,
            port: self.port,
            game_types,
            controller_secrets: SecretSet::parse(&self.controller_secrets),
            bot_secrets: SecretSet::parse(&self.bot_secrets),
            tps: self.tps,
            initial_positions_enabled: self.enable_initial_position,
            max_connections: self.max_connections,
            quit_token: self.quit_token,
            handshake_timeout: Duration::from_secs(10),
            ..ServerConfig::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Cli::parse_from(["tank-battle-server"]).into_config().unwrap();
        assert_eq!(config.port, PortSetting::Fixed(DEFAULT_PORT));
        assert_eq!(config.game_types, vec!["classic", "melee", "1v1"]);
        assert_eq!(config.tps, 30);
        assert_eq!(config.quit_token, "q");
        assert!(!config.bot_secrets.is_configured());
    }

    #[test]
    fn test_flags() {
        let cli = Cli::parse_from([
            "tank-battle-server",
            "--port",
            "inherit",
            "--games",
            "melee,1v1",
            "--controller-secrets",
            "abc,def",
            "--tps",
            "-1",
            "--enable-initial-position",
        ]);
        let config = cli.into_config().unwrap();
        assert_eq!(config.port, PortSetting::Inherit);
        assert_eq!(config.game_types, vec!["melee", "1v1"]);
        assert_eq!(config.controller_secrets.len(), 2);
        assert_eq!(config.tps, -1);
        assert!(config.initial_positions_enabled);
    }

    #[test]
    fn test_bad_values() {
        assert!(Cli::try_parse_from(["tank-battle-server", "--port", "nope"]).is_err());
        let cli = Cli::parse_from(["tank-battle-server", "--tps", "-5"]);
        assert!(cli.into_config().is_err());
    }
}
