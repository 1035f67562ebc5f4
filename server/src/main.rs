use clap::Parser;
use log::info;
use server::config::{MatchConfig, ServerConfig};
use server::server::Server;
use shared::{DEFAULT_PLAYER_PORT, DEFAULT_SPECTATOR_PORT};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Players required before a game starts
    #[arg(long, default_value = "2")]
    players: usize,

    /// Connection limit, defaults to --players
    #[arg(long)]
    max_players: Option<usize>,

    /// Games played in one session, defaults to --players
    #[arg(long)]
    games: Option<u32>,

    /// Rounds per game
    #[arg(long, default_value = "200")]
    rounds: u32,

    /// Map height in cells (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "20")]
    height: u16,

    /// Map width in cells
    #[arg(long, default_value = "20")]
    width: u16,

    /// Seconds the round clock waits for commands
    #[arg(long, default_value = "0.5")]
    timeout: f64,

    /// Lower bound for the round interval in milliseconds
    #[arg(long, default_value = "100")]
    mintimeout: u64,

    /// Grace delay between reaching quorum and starting, in milliseconds
    #[arg(long, default_value = "1000")]
    start_delay: u64,

    /// Rounds until a bomb detonates
    #[arg(long, default_value = "3")]
    bomb_fuse: u32,

    /// Rounds a blast paralyzes a player, 0 for the rest of the game
    #[arg(long, default_value = "5")]
    paralysis: u32,

    /// Seed for reproducible maps
    #[arg(long)]
    seed: Option<u64>,

    /// Address to bind both listeners to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port for player connections
    #[arg(short, long, default_value_t = DEFAULT_PLAYER_PORT)]
    port: u16,

    /// Port for spectator connections
    #[arg(long, default_value_t = DEFAULT_SPECTATOR_PORT)]
    spectator_port: u16,
}

impl Args {
    fn match_config(&self) -> Result<MatchConfig, Box<dyn std::error::Error>> {
        Ok(MatchConfig {
            required_players: self.players,
            max_players: self.max_players.unwrap_or(self.players),
            games: self.games.unwrap_or(self.players as u32),
            rounds: self.rounds,
            width: self.width,
            height: self.height,
            command_timeout: Duration::try_from_secs_f64(self.timeout)?,
            min_timeout: Duration::from_millis(self.mintimeout),
            start_delay: Duration::from_millis(self.start_delay),
            bomb_fuse_rounds: self.bomb_fuse,
            paralysis_rounds: self.paralysis,
            seed: self.seed,
            ..MatchConfig::default()
        })
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            player_port: self.port,
            spectator_port: self.spectator_port,
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let match_config = args.match_config()?;
    let server_config = args.server_config();

    info!("Starting Bomberman server...");
    info!(
        "Players: {} required, {} max",
        match_config.required_players, match_config.max_players
    );
    info!(
        "Games: {}, rounds per game: {}, map: {}x{}",
        match_config.games, match_config.rounds, match_config.width, match_config.height
    );
    info!(
        "Round interval: {:?} (timeout {:?}, minimum {:?})",
        match_config.round_interval(),
        match_config.command_timeout,
        match_config.min_timeout
    );
    info!(
        "Player port: {}, spectator port: {}",
        server_config.player_port, server_config.spectator_port
    );

    let server = Server::bind(server_config, match_config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_player_count() {
        let args = Args::parse_from(["server", "--players", "3"]);
        let config = args.match_config().unwrap();

        assert_eq!(config.required_players, 3);
        assert_eq!(config.max_players, 3);
        assert_eq!(config.games, 3);
        assert_eq!(config.command_timeout, Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_timeout_is_rejected() {
        let args = Args::parse_from(["server", "--timeout=-1"]);
        assert!(args.match_config().is_err());
    }

    #[test]
    fn test_ports_and_host() {
        let args = Args::parse_from(["server", "-H", "127.0.0.1", "-p", "6000"]);
        let config = args.server_config();

        assert_eq!(config.player_address(), "127.0.0.1:6000");
        assert_eq!(config.spectator_port, DEFAULT_SPECTATOR_PORT);
    }
}
