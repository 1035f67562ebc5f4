//! Match state machine
//!
//! A `MatchSession` owns the map, the player registry, the live bombs and
//! the round/game counters. It is driven by a single consumer task that
//! drains one command queue, so every state change happens in arrival order
//! and without locks. Connections, the start timer and the round clock only
//! ever talk to it through `MatchCommand` messages.

use crate::bomb::{detonate_due, Bomb, Explosion};
use crate::config::MatchConfig;
use crate::error::MatchError;
use crate::grid::{GameMap, MapLayout, Special};
use crate::registry::PlayerRegistry;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    Command, Direction, Handshake, MatchEvent, PlayerId, Position, NOTICE_GAME_OVER,
    NOTICE_GAME_STARTED, NOTICE_PARALYZED, NOTICE_RECOVERED,
};
use std::net::SocketAddr;
use tokio::sync::{mpsc, oneshot, watch};

const COIN_POINTS: u32 = 3;
const OPPONENT_PARALYZED_POINTS: u32 = 5;
const WALL_DESTROYED_POINTS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Fewer than the required players are connected
    Waiting,
    /// Quorum reached, grace delay running
    Starting,
    /// Commands are applied and rounds counted
    Running,
    /// Every game of the session has been played
    Ended,
}

/// Identity handed back to the gateway after a successful join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerTicket {
    pub id: PlayerId,
    pub name: String,
}

/// Messages into the session's command queue
#[derive(Debug)]
pub enum MatchCommand {
    Join {
        addr: SocketAddr,
        outbox: mpsc::UnboundedSender<String>,
        reply: oneshot::Sender<Result<PlayerTicket, MatchError>>,
    },
    Input {
        player: PlayerId,
        text: String,
    },
    Leave {
        player: PlayerId,
    },
    /// The start timer armed under `epoch` ran out
    GraceElapsed {
        epoch: u64,
    },
    RoundTick,
}

pub struct MatchSession {
    config: MatchConfig,
    map: GameMap,
    registry: PlayerRegistry,
    bombs: Vec<Bomb>,
    phase: Phase,
    game: u32,
    round: u32,
    start_epoch: u64,
    rng: StdRng,
    scheduler: mpsc::Sender<MatchCommand>,
    events: mpsc::UnboundedSender<String>,
    phase_tx: watch::Sender<Phase>,
}

impl MatchSession {
    /// Creates the session for the first game
    ///
    /// `scheduler` must feed the same queue the session is run on; the start
    /// timer reports back through it. Rendered events go to `events`.
    pub fn new(
        config: MatchConfig,
        scheduler: mpsc::Sender<MatchCommand>,
        events: mpsc::UnboundedSender<String>,
    ) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let map = GameMap::generate(config.width, config.height, layout(&config), &mut rng);
        let registry = PlayerRegistry::new(config.max_players, config.bombs_per_player);
        let (phase_tx, _) = watch::channel(Phase::Waiting);

        Self {
            config,
            map,
            registry,
            bombs: Vec::new(),
            phase: Phase::Waiting,
            game: 1,
            round: 0,
            start_epoch: 0,
            rng,
            scheduler,
            events,
            phase_tx,
        }
    }

    /// Replaces the generated map, e.g. with a hand-built one
    pub fn with_map(mut self, map: GameMap) -> Self {
        self.map = map;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase_tx.subscribe()
    }

    pub fn game(&self) -> u32 {
        self.game
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn map(&self) -> &GameMap {
        &self.map
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    pub fn bombs(&self) -> &[Bomb] {
        &self.bombs
    }

    /// Drains the command queue until every sender is gone
    pub async fn run(mut self, mut commands: mpsc::Receiver<MatchCommand>) {
        info!(
            "Match engine running: {} games of {} rounds, {} players required",
            self.config.games, self.config.rounds, self.config.required_players
        );

        while let Some(command) = commands.recv().await {
            self.handle(command);
        }

        info!("Command queue closed, match engine stopping");
    }

    /// Applies one command; the only entry point that mutates match state
    pub fn handle(&mut self, command: MatchCommand) {
        match command {
            MatchCommand::Join {
                addr,
                outbox,
                reply,
            } => {
                let result = self.join(addr, outbox);
                if let Err(e) = &result {
                    info!("Refused player from {}: {}", addr, e);
                }
                if reply.send(result).is_err() {
                    debug!("Joining connection from {} went away before the reply", addr);
                }
            }
            MatchCommand::Input { player, text } => self.apply_input(player, &text),
            MatchCommand::Leave { player } => self.leave(player),
            MatchCommand::GraceElapsed { epoch } => self.grace_elapsed(epoch),
            MatchCommand::RoundTick => self.round_tick(),
        }
    }

    fn join(
        &mut self,
        addr: SocketAddr,
        outbox: mpsc::UnboundedSender<String>,
    ) -> Result<PlayerTicket, MatchError> {
        match self.phase {
            Phase::Running => return Err(MatchError::MatchInProgress),
            Phase::Ended => return Err(MatchError::SeriesFinished),
            Phase::Waiting | Phase::Starting => {}
        }

        let spawn = self.map.spawn_point(&mut self.rng);
        let player = self.registry.connect(addr, outbox, spawn)?;
        let handshake = Handshake {
            id: player.id,
            name: player.name.clone(),
        };
        player.send_line(handshake.id_line());
        player.send_line(handshake.name_line());
        self.map.place_player(handshake.id, spawn);

        info!(
            "{}/{} players connected",
            self.registry.count(),
            self.config.required_players
        );
        self.emit(MatchEvent::PlayerJoined {
            id: handshake.id,
            name: handshake.name.clone(),
            position: spawn,
            players: self.registry.count(),
            required: self.config.required_players,
        });

        if self.phase == Phase::Waiting && self.registry.count() == self.config.required_players {
            self.arm_start();
        }

        Ok(PlayerTicket {
            id: handshake.id,
            name: handshake.name,
        })
    }

    fn leave(&mut self, id: PlayerId) {
        let Some(player) = self.registry.disconnect(id) else {
            debug!("Player {} already left", id);
            return;
        };

        self.map.remove_player(id, player.position);
        self.bombs.retain(|bomb| bomb.owner != id);
        info!(
            "{}/{} players connected",
            self.registry.count(),
            self.config.required_players
        );
        self.emit(MatchEvent::PlayerLeft {
            id,
            players: self.registry.count(),
        });

        if self.phase == Phase::Running && self.registry.is_empty() {
            info!("Every player left game {}", self.game);
            self.finish_game();
        }
    }

    /// Waiting -> Starting: arms the one-shot grace timer
    fn arm_start(&mut self) {
        self.start_epoch += 1;
        let epoch = self.start_epoch;
        let delay = self.config.start_delay;

        self.set_phase(Phase::Starting);
        info!("Quorum reached, game {} starts in {:?}", self.game, delay);
        self.emit(MatchEvent::MatchStarting {
            game: self.game,
            in_millis: delay.as_millis() as u64,
        });

        let scheduler = self.scheduler.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if scheduler
                .send(MatchCommand::GraceElapsed { epoch })
                .await
                .is_err()
            {
                debug!("Start timer fired after the engine stopped");
            }
        });
    }

    /// Starting -> Running, or back to Waiting if players left meanwhile
    fn grace_elapsed(&mut self, epoch: u64) {
        if self.phase != Phase::Starting || epoch != self.start_epoch {
            debug!("Ignoring stale start timer {}", epoch);
            return;
        }

        let players = self.registry.count();
        if players < self.config.required_players {
            warn!(
                "Only {}/{} players left during the start delay, waiting again",
                players, self.config.required_players
            );
            self.set_phase(Phase::Waiting);
            self.emit(MatchEvent::StartAborted {
                game: self.game,
                players,
                required: self.config.required_players,
            });
            return;
        }

        self.round = 0;
        self.set_phase(Phase::Running);
        info!("Game {} of {} started", self.game, self.config.games);
        self.emit(MatchEvent::MatchStarted {
            game: self.game,
            width: self.map.width(),
            height: self.map.height(),
            players: self.registry.standings(),
        });
        self.registry.notify_all(NOTICE_GAME_STARTED);
        self.emit_round();
    }

    fn apply_input(&mut self, id: PlayerId, text: &str) {
        let command = Command::parse(text);

        let player = match self.registry.lookup(id) {
            Ok(player) => player,
            Err(e) => {
                debug!("Dropping input {:?}: {}", text, e);
                return;
            }
        };
        let paralyzed = player.is_paralyzed;

        match command {
            Command::Quit => {
                info!("Player {} quit", id);
                self.leave(id);
            }
            Command::Wait => {}
            Command::Unknown(text) => {
                self.registry.notify(id, format!("Unknown command: {}", text));
            }
            Command::Move(_) | Command::PlaceBomb if self.phase != Phase::Running => {
                self.registry.notify(id, "Match is not running");
            }
            Command::Move(_) | Command::PlaceBomb if paralyzed => {
                self.registry.notify(id, NOTICE_PARALYZED);
            }
            Command::Move(direction) => self.try_move(id, direction),
            Command::PlaceBomb => self.try_place_bomb(id),
        }
    }

    fn try_move(&mut self, id: PlayerId, direction: Direction) {
        let Ok(player) = self.registry.lookup_mut(id) else {
            return;
        };
        let from = player.position;

        let target = from
            .step(direction, self.map.width(), self.map.height())
            .filter(|pos| self.map.is_walkable(*pos))
            .filter(|pos| !self.bombs.iter().any(|bomb| bomb.origin == *pos));
        let Some(to) = target else {
            player.send_line("Blocked");
            return;
        };

        player.position = to;
        self.map.move_player(id, from, to);

        match self.map.take_special(to) {
            Some(Special::ExtraBomb) => player.bomb_capacity += 1,
            Some(Special::Coin) => player.score += COIN_POINTS,
            None => {}
        }

        self.emit(MatchEvent::PlayerMoved { id, position: to });
    }

    fn try_place_bomb(&mut self, id: PlayerId) {
        let Ok(player) = self.registry.lookup_mut(id) else {
            return;
        };
        let origin = player.position;

        let active = self.bombs.iter().filter(|bomb| bomb.owner == id).count() as u32;
        if active >= player.bomb_capacity {
            player.send_line("No bombs left");
            return;
        }
        if self.bombs.iter().any(|bomb| bomb.origin == origin) {
            player.send_line("Cell already holds a bomb");
            return;
        }

        let fuse = self.config.bomb_fuse_rounds;
        self.bombs.push(Bomb::new(id, origin, fuse));
        debug!("Player {} placed a bomb at {}", id, origin);
        self.emit(MatchEvent::BombPlaced {
            owner: id,
            position: origin,
            fuse,
        });
    }

    fn round_tick(&mut self) {
        if self.phase != Phase::Running {
            return;
        }

        self.round += 1;

        let mut recovered = Vec::new();
        for player in self.registry.iter_mut() {
            if player.tick_paralysis() {
                player.send_line(NOTICE_RECOVERED);
                recovered.push(player.id);
            }
        }
        for id in recovered {
            self.emit(MatchEvent::PlayerRecovered { id });
        }

        let explosions = detonate_due(
            &mut self.bombs,
            &mut self.map,
            &mut self.registry,
            self.config.paralysis_rounds,
        );
        for explosion in &explosions {
            self.settle_explosion(explosion);
        }

        self.emit_round();

        if self.round >= self.config.rounds {
            self.finish_game();
        }
    }

    /// Scores an explosion for its owner and tells the victims
    fn settle_explosion(&mut self, explosion: &Explosion) {
        for id in &explosion.paralyzed {
            self.registry.notify(*id, NOTICE_PARALYZED);
        }

        let opponents = explosion
            .paralyzed
            .iter()
            .filter(|id| **id != explosion.owner)
            .count() as u32;
        let points = explosion.destroyed_walls.len() as u32 * WALL_DESTROYED_POINTS
            + opponents * OPPONENT_PARALYZED_POINTS;
        if let Ok(owner) = self.registry.lookup_mut(explosion.owner) {
            owner.score += points;
        }

        self.emit(explosion.to_event());
    }

    /// Running -> Ended, then on to the next game if one is left
    fn finish_game(&mut self) {
        self.set_phase(Phase::Ended);
        info!("Game {} ended after {} rounds", self.game, self.round);
        self.emit(MatchEvent::MatchEnded {
            game: self.game,
            rounds: self.round,
            scores: self.registry.standings(),
        });
        self.registry.notify_all(NOTICE_GAME_OVER);

        if self.game >= self.config.games {
            info!("All {} games played", self.config.games);
            self.emit(MatchEvent::SeriesEnded {
                games: self.config.games,
            });
            return;
        }

        self.prepare_next_game();
    }

    fn prepare_next_game(&mut self) {
        self.game += 1;
        self.round = 0;
        self.bombs.clear();
        self.map = GameMap::generate(
            self.config.width,
            self.config.height,
            layout(&self.config),
            &mut self.rng,
        );
        self.registry.reset_for_game();

        for id in self.registry.ids() {
            let spawn = self.map.spawn_point(&mut self.rng);
            if let Ok(player) = self.registry.lookup_mut(id) {
                player.position = spawn;
            }
            self.map.place_player(id, spawn);
        }

        self.set_phase(Phase::Waiting);
        if self.registry.count() >= self.config.required_players {
            self.arm_start();
        }
    }

    fn emit_round(&mut self) {
        let bombs: Vec<Position> = self.bombs.iter().map(|bomb| bomb.origin).collect();
        self.emit(MatchEvent::Round {
            game: self.game,
            round: self.round,
            map: self.map.render(&bombs),
        });
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.phase_tx.send_replace(phase);
    }

    fn emit(&self, event: MatchEvent) {
        match event.to_line() {
            Ok(line) => {
                if self.events.send(line).is_err() {
                    debug!("No spectator fan-out attached");
                }
            }
            Err(e) => error!("Failed to serialize match event: {}", e),
        }
    }
}

fn layout(config: &MatchConfig) -> MapLayout {
    MapLayout {
        wall_density: config.wall_density,
        special_density: config.special_density,
    }
}
