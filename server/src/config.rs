//! Match and server configuration
//!
//! Everything the engine needs is handed over once at startup. The binary
//! builds these structs from command-line flags; tests build them directly.

use crate::error::ConfigError;
use shared::{DEFAULT_PLAYER_PORT, DEFAULT_SPECTATOR_PORT};
use std::time::Duration;

/// Rules for every game the session runs.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Players needed before a game starts
    pub required_players: usize,
    /// Hard connection limit
    pub max_players: usize,
    /// Number of games played by one session
    pub games: u32,
    /// Rounds per game
    pub rounds: u32,
    pub width: u16,
    pub height: u16,
    /// Time the round clock waits for commands per round
    pub command_timeout: Duration,
    /// Lower bound for the round clock
    pub min_timeout: Duration,
    /// Grace delay between reaching quorum and starting
    pub start_delay: Duration,
    /// Rounds until a placed bomb detonates
    pub bomb_fuse_rounds: u32,
    /// Bombs a player may have on the map at once
    pub bombs_per_player: u32,
    /// Rounds a blast keeps a player paralyzed, 0 keeps them paralyzed until the game ends
    pub paralysis_rounds: u32,
    /// Chance for a free cell to receive a destructible wall
    pub wall_density: f64,
    /// Chance for an open cell to receive a pickup
    pub special_density: f64,
    /// Fixed RNG seed for reproducible maps
    pub seed: Option<u64>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            required_players: 2,
            max_players: 2,
            games: 2,
            rounds: 200,
            width: 20,
            height: 20,
            command_timeout: Duration::from_millis(500),
            min_timeout: Duration::from_millis(100),
            start_delay: Duration::from_secs(1),
            bomb_fuse_rounds: 3,
            bombs_per_player: 1,
            paralysis_rounds: 5,
            wall_density: 0.3,
            special_density: 0.05,
            seed: None,
        }
    }
}

impl MatchConfig {
    /// Interval of the round clock; the command timeout never undercuts the minimum.
    pub fn round_interval(&self) -> Duration {
        self.command_timeout.max(self.min_timeout)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.required_players == 0 {
            return Err(ConfigError::NoPlayers);
        }
        if self.max_players < self.required_players {
            return Err(ConfigError::CapacityBelowQuorum {
                max: self.max_players,
                required: self.required_players,
            });
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::EmptyMap {
                width: self.width,
                height: self.height,
            });
        }
        if self.games == 0 || self.rounds == 0 {
            return Err(ConfigError::NothingToPlay);
        }
        if self.round_interval().is_zero() {
            return Err(ConfigError::ZeroRoundInterval);
        }
        for density in [self.wall_density, self.special_density] {
            if !(0.0..=1.0).contains(&density) {
                return Err(ConfigError::Density(density));
            }
        }
        Ok(())
    }
}

/// Network-facing settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub player_port: u16,
    pub spectator_port: u16,
    pub command_queue_capacity: usize,
    pub spectator_write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            player_port: DEFAULT_PLAYER_PORT,
            spectator_port: DEFAULT_SPECTATOR_PORT,
            command_queue_capacity: 1000,
            spectator_write_timeout: Duration::from_secs(1),
        }
    }
}

impl ServerConfig {
    pub fn player_address(&self) -> String {
        format!("{}:{}", self.host, self.player_port)
    }

    pub fn spectator_address(&self) -> String {
        format!("{}:{}", self.host, self.spectator_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_defaults_match_classic_parameters() {
        let config = MatchConfig::default();
        assert_eq!(config.required_players, 2);
        assert_eq!(config.rounds, 200);
        assert_eq!((config.width, config.height), (20, 20));
        assert_approx_eq!(config.command_timeout.as_secs_f64(), 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_round_interval_respects_minimum() {
        let config = MatchConfig {
            command_timeout: Duration::from_millis(20),
            min_timeout: Duration::from_millis(100),
            ..MatchConfig::default()
        };
        assert_eq!(config.round_interval(), Duration::from_millis(100));

        let config = MatchConfig {
            command_timeout: Duration::from_secs_f64(0.75),
            ..MatchConfig::default()
        };
        assert_approx_eq!(config.round_interval().as_secs_f64(), 0.75);
    }

    #[test]
    fn test_validate_rejects_capacity_below_quorum() {
        let config = MatchConfig {
            required_players: 3,
            max_players: 2,
            ..MatchConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CapacityBelowQuorum { max: 2, required: 3 })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_map_and_bad_density() {
        let config = MatchConfig {
            width: 0,
            ..MatchConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::EmptyMap { .. })));

        let config = MatchConfig {
            wall_density: 1.5,
            ..MatchConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Density(_))));
    }

    #[test]
    fn test_server_addresses() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            ..ServerConfig::default()
        };
        assert_eq!(config.player_address(), "127.0.0.1:5000");
        assert_eq!(config.spectator_address(), "127.0.0.1:5001");
    }
}
