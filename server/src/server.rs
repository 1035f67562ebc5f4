//! Server wiring: listeners, queues and the long-running tasks

use crate::config::{MatchConfig, ServerConfig};
use crate::gateway::{accept_players, accept_spectators};
use crate::session::{MatchCommand, MatchSession, Phase};
use crate::spectators::run_fanout;
use log::{debug, info};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};

/// Bound player and spectator listeners plus the match they feed
pub struct Server {
    player_listener: TcpListener,
    spectator_listener: TcpListener,
    server_config: ServerConfig,
    match_config: MatchConfig,
}

impl Server {
    /// Validates the match rules and binds both ports
    pub async fn bind(
        server_config: ServerConfig,
        match_config: MatchConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        match_config.validate()?;

        let player_listener = TcpListener::bind(server_config.player_address()).await?;
        let spectator_listener = TcpListener::bind(server_config.spectator_address()).await?;
        info!("Players connect on {}", player_listener.local_addr()?);
        info!("Spectators connect on {}", spectator_listener.local_addr()?);

        Ok(Server {
            player_listener,
            spectator_listener,
            server_config,
            match_config,
        })
    }

    pub fn player_addr(&self) -> std::io::Result<SocketAddr> {
        self.player_listener.local_addr()
    }

    pub fn spectator_addr(&self) -> std::io::Result<SocketAddr> {
        self.spectator_listener.local_addr()
    }

    /// Spawns the engine tasks and accepts players until the task is dropped
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let (command_tx, command_rx) = mpsc::channel(self.server_config.command_queue_capacity);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (attach_tx, attach_rx) = mpsc::unbounded_channel();

        let round_interval = self.match_config.round_interval();
        let session = MatchSession::new(self.match_config, command_tx.clone(), event_tx);
        let phase = session.subscribe_phase();

        tokio::spawn(session.run(command_rx));
        tokio::spawn(run_fanout(
            event_rx,
            attach_rx,
            self.server_config.spectator_write_timeout,
        ));
        tokio::spawn(run_round_clock(command_tx.clone(), round_interval));
        tokio::spawn(log_phase_changes(phase));
        tokio::spawn(accept_spectators(self.spectator_listener, attach_tx));

        info!("Server started successfully");
        accept_players(self.player_listener, command_tx).await;

        Ok(())
    }
}

/// Sends a `RoundTick` every interval; the session ignores them outside Running
async fn run_round_clock(commands: mpsc::Sender<MatchCommand>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Skip the first tick since it fires immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if commands.send(MatchCommand::RoundTick).await.is_err() {
            debug!("Engine stopped, round clock exiting");
            break;
        }
    }
}

async fn log_phase_changes(mut phase: watch::Receiver<Phase>) {
    while phase.changed().await.is_ok() {
        let current = *phase.borrow();
        debug!("Match phase is now {:?}", current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_round_clock_ticks_each_interval() {
        let (tx, mut rx) = mpsc::channel(8);
        tokio::spawn(run_round_clock(tx, Duration::from_millis(100)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(matches!(rx.try_recv(), Ok(MatchCommand::RoundTick)));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(rx.try_recv(), Ok(MatchCommand::RoundTick)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_rules() {
        let server_config = ServerConfig {
            host: "127.0.0.1".to_string(),
            player_port: 0,
            spectator_port: 0,
            ..ServerConfig::default()
        };
        let match_config = MatchConfig {
            required_players: 0,
            ..MatchConfig::default()
        };

        assert!(Server::bind(server_config, match_config).await.is_err());
    }

    #[tokio::test]
    async fn test_bind_on_ephemeral_ports() {
        let server_config = ServerConfig {
            host: "127.0.0.1".to_string(),
            player_port: 0,
            spectator_port: 0,
            ..ServerConfig::default()
        };

        let server = Server::bind(server_config, MatchConfig::default()).await.unwrap();
        let players = server.player_addr().unwrap();
        let spectators = server.spectator_addr().unwrap();
        assert_ne!(players.port(), 0);
        assert_ne!(players.port(), spectators.port());
    }
}
