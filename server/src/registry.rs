//! Player registry for the match session
//!
//! This module tracks every connected player and their per-game state:
//! - Identity assignment (numeric ID and display name)
//! - Position on the map and paralysis status
//! - Capacity enforcement for new connections
//! - The outbound line handle used to talk back to the player's socket
//!
//! The registry holds no locks. It is owned by the match session task and
//! only ever touched from there, so every mutation is already serialized.

use crate::error::MatchError;
use crate::utils::display_name;
use log::{debug, info};
use shared::{PlayerId, Position, ScoreLine};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// Represents a connected player
///
/// The connection itself stays with the gateway; the player only keeps a
/// sender into that connection's writer task.
#[derive(Debug)]
pub struct Player {
    /// Unique player identifier assigned by the registry
    pub id: PlayerId,
    /// Human-readable name sent during the handshake
    pub name: String,
    /// Remote address of the player's connection
    pub addr: SocketAddr,
    /// Cell the player currently occupies
    pub position: Position,
    /// Set by explosions, cleared when the paralysis runs out
    pub is_paralyzed: bool,
    /// Rounds of paralysis left; zero while paralyzed means until the game ends
    pub paralysis_rounds: u32,
    /// False once the connection's writer went away
    pub connected: bool,
    /// Points collected in the current game
    pub score: u32,
    /// Bombs this player may have on the map at once
    pub bomb_capacity: u32,
    outbox: mpsc::UnboundedSender<String>,
}

impl Player {
    /// Creates a player standing at `position`
    pub fn new(
        id: PlayerId,
        addr: SocketAddr,
        position: Position,
        bomb_capacity: u32,
        outbox: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            id,
            name: display_name(id),
            addr,
            position,
            is_paralyzed: false,
            paralysis_rounds: 0,
            connected: true,
            score: 0,
            bomb_capacity,
            outbox,
        }
    }

    /// Queues a line for the player's connection
    ///
    /// A failed send means the writer task has ended; the player is then
    /// flagged as disconnected and the gateway will report the leave.
    pub fn send_line(&mut self, line: impl Into<String>) -> bool {
        if self.outbox.send(line.into()).is_err() {
            if self.connected {
                debug!("Player {} outbox closed", self.id);
            }
            self.connected = false;
        }
        self.connected
    }

    pub fn paralyze(&mut self, rounds: u32) {
        self.is_paralyzed = true;
        self.paralysis_rounds = rounds;
    }

    /// Runs the paralysis down by one round
    ///
    /// Returns true when the player recovered with this round.
    pub fn tick_paralysis(&mut self) -> bool {
        if !self.is_paralyzed || self.paralysis_rounds == 0 {
            return false;
        }

        self.paralysis_rounds -= 1;
        if self.paralysis_rounds == 0 {
            self.is_paralyzed = false;
            return true;
        }
        false
    }

    pub fn score_line(&self) -> ScoreLine {
        ScoreLine {
            id: self.id,
            name: self.name.clone(),
            score: self.score,
        }
    }
}

/// Manages all connected players
///
/// Player IDs start at 1 and are never reused within a process, so a late
/// message for a player that already left can never hit a newcomer.
#[derive(Debug)]
pub struct PlayerRegistry {
    /// Connected players indexed by their ID
    players: BTreeMap<PlayerId, Player>,
    /// Next ID handed out on connect
    next_player_id: u32,
    /// Maximum number of concurrent players
    max_players: usize,
    /// Bomb capacity every player starts a game with
    default_bombs: u32,
}

impl PlayerRegistry {
    pub fn new(max_players: usize, default_bombs: u32) -> Self {
        Self {
            players: BTreeMap::new(),
            next_player_id: 1,
            max_players,
            default_bombs,
        }
    }

    /// Registers a new player at `position`
    ///
    /// Fails with `CapacityExceeded` once the limit is reached; nothing is
    /// registered in that case.
    pub fn connect(
        &mut self,
        addr: SocketAddr,
        outbox: mpsc::UnboundedSender<String>,
        position: Position,
    ) -> Result<&mut Player, MatchError> {
        if self.players.len() >= self.max_players {
            return Err(MatchError::CapacityExceeded {
                max: self.max_players,
            });
        }

        let id = PlayerId(self.next_player_id);
        self.next_player_id += 1;

        let player = Player::new(id, addr, position, self.default_bombs, outbox);
        info!("Player {} ({}) connected from {}", id, player.name, addr);

        Ok(self.players.entry(id).or_insert(player))
    }

    /// Removes a player; calling it twice is harmless
    pub fn disconnect(&mut self, id: PlayerId) -> Option<Player> {
        let removed = self.players.remove(&id);
        if let Some(player) = &removed {
            info!("Player {} ({}) disconnected", player.id, player.name);
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn lookup(&self, id: PlayerId) -> Result<&Player, MatchError> {
        self.players.get(&id).ok_or(MatchError::NotFound(id))
    }

    pub fn lookup_mut(&mut self, id: PlayerId) -> Result<&mut Player, MatchError> {
        self.players.get_mut(&id).ok_or(MatchError::NotFound(id))
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.players.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    /// Sends a line to one player; unknown IDs are ignored
    pub fn notify(&mut self, id: PlayerId, line: impl Into<String>) {
        if let Ok(player) = self.lookup_mut(id) {
            player.send_line(line);
        }
    }

    pub fn notify_all(&mut self, line: &str) {
        for player in self.players.values_mut() {
            player.send_line(line);
        }
    }

    /// Scores of the current game, best first
    pub fn standings(&self) -> Vec<ScoreLine> {
        let mut lines: Vec<ScoreLine> = self.players.values().map(Player::score_line).collect();
        lines.sort_by(|a, b| b.score.cmp(&a.score).then(a.id.cmp(&b.id)));
        lines
    }

    /// Clears the per-game state of every player before a new game
    pub fn reset_for_game(&mut self) {
        for player in self.players.values_mut() {
            player.is_paralyzed = false;
            player.paralysis_rounds = 0;
            player.score = 0;
            player.bomb_capacity = self.default_bombs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    fn outbox() -> (mpsc::UnboundedSender<String>, mpsc::UnboundedReceiver<String>) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn test_connect_assigns_sequential_ids() {
        let mut registry = PlayerRegistry::new(3, 1);
        let (tx, _rx) = outbox();

        let first = registry.connect(test_addr(), tx.clone(), Position::new(0, 0)).unwrap().id;
        let second = registry.connect(test_addr(), tx, Position::new(1, 0)).unwrap().id;

        assert_eq!(first, PlayerId(1));
        assert_eq!(second, PlayerId(2));
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.lookup(second).unwrap().position, Position::new(1, 0));
    }

    #[test]
    fn test_connect_beyond_capacity_fails() {
        let mut registry = PlayerRegistry::new(1, 1);
        let (tx, _rx) = outbox();

        assert!(registry.connect(test_addr(), tx.clone(), Position::new(0, 0)).is_ok());

        let result = registry.connect(test_addr(), tx, Position::new(0, 0));
        assert!(matches!(result, Err(MatchError::CapacityExceeded { max: 1 })));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut registry = PlayerRegistry::new(2, 1);
        let (tx, _rx) = outbox();
        let id = registry.connect(test_addr(), tx, Position::new(0, 0)).unwrap().id;

        assert!(registry.disconnect(id).is_some());
        assert!(registry.disconnect(id).is_none());
        assert!(registry.is_empty());
        assert!(matches!(registry.lookup(id), Err(MatchError::NotFound(_))));
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut registry = PlayerRegistry::new(1, 1);
        let (tx, _rx) = outbox();

        let first = registry.connect(test_addr(), tx.clone(), Position::new(0, 0)).unwrap().id;
        registry.disconnect(first);
        let second = registry.connect(test_addr(), tx, Position::new(0, 0)).unwrap().id;

        assert_ne!(first, second);
    }

    #[test]
    fn test_send_line_marks_closed_outbox() {
        let mut registry = PlayerRegistry::new(1, 1);
        let (tx, rx) = outbox();
        let id = registry.connect(test_addr(), tx, Position::new(0, 0)).unwrap().id;

        drop(rx);
        registry.notify(id, "hello");
        assert!(!registry.lookup(id).unwrap().connected);
    }

    #[test]
    fn test_paralysis_runs_down() {
        let (tx, _rx) = outbox();
        let mut player = Player::new(PlayerId(1), test_addr(), Position::new(0, 0), 1, tx);

        player.paralyze(2);
        assert!(player.is_paralyzed);
        assert!(!player.tick_paralysis());
        assert!(player.tick_paralysis());
        assert!(!player.is_paralyzed);
    }

    #[test]
    fn test_unlimited_paralysis_never_recovers() {
        let (tx, _rx) = outbox();
        let mut player = Player::new(PlayerId(1), test_addr(), Position::new(0, 0), 1, tx);

        player.paralyze(0);
        for _ in 0..10 {
            assert!(!player.tick_paralysis());
        }
        assert!(player.is_paralyzed);
    }

    #[test]
    fn test_standings_and_reset() {
        let mut registry = PlayerRegistry::new(2, 1);
        let (tx, _rx) = outbox();
        let a = registry.connect(test_addr(), tx.clone(), Position::new(0, 0)).unwrap().id;
        let b = registry.connect(test_addr(), tx, Position::new(0, 0)).unwrap().id;

        registry.lookup_mut(b).unwrap().score = 6;
        registry.lookup_mut(a).unwrap().bomb_capacity = 3;

        let standings = registry.standings();
        assert_eq!(standings[0].id, b);
        assert_eq!(standings[0].score, 6);

        registry.reset_for_game();
        assert_eq!(registry.lookup(b).unwrap().score, 0);
        assert_eq!(registry.lookup(a).unwrap().bomb_capacity, 1);
    }
}
