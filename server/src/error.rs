//! Error types for the match engine

use shared::{
    PlayerId, CAPACITY_REJECTION, MATCH_RUNNING_REJECTION, SERIES_FINISHED_REJECTION,
};

/// Failures around players and their connections.
///
/// None of these is fatal to the process: each one is contained to the
/// connection or command that produced it.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("player limit of {max} reached")]
    CapacityExceeded { max: usize },

    #[error("player {0} is not registered")]
    NotFound(PlayerId),

    #[error("connection lost: {0}")]
    ConnectionLost(#[from] std::io::Error),

    #[error("a match is already running")]
    MatchInProgress,

    #[error("all games have been played")]
    SeriesFinished,

    #[error("match engine is no longer accepting commands")]
    EngineClosed,
}

impl MatchError {
    /// Line written to a connection whose join was refused, if any.
    pub fn rejection_message(&self) -> Option<&'static str> {
        match self {
            MatchError::CapacityExceeded { .. } => Some(CAPACITY_REJECTION),
            MatchError::MatchInProgress => Some(MATCH_RUNNING_REJECTION),
            MatchError::SeriesFinished => Some(SERIES_FINISHED_REJECTION),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one player is required")]
    NoPlayers,

    #[error("player limit {max} is below the required {required} players")]
    CapacityBelowQuorum { max: usize, required: usize },

    #[error("map of {width}x{height} has no cells")]
    EmptyMap { width: u16, height: u16 },

    #[error("games and rounds must both be at least 1")]
    NothingToPlay,

    #[error("round interval must be longer than zero")]
    ZeroRoundInterval,

    #[error("density {0} is outside 0.0..=1.0")]
    Density(f64),
}
