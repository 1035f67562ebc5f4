use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_PLAYER_PORT: u16 = 5000;
pub const DEFAULT_SPECTATOR_PORT: u16 = 5001;

pub const WELCOME_LINE: &str = "Successfully connected to Bomberman-Server";
pub const QUIT_HINT_LINE: &str = "Enter q to disconnect.";
pub const ID_PREFIX: &str = "YourID:";
pub const NAME_PREFIX: &str = "YourName:";

pub const CAPACITY_REJECTION: &str = "Sorry, the player limit is reached.";
pub const MATCH_RUNNING_REJECTION: &str = "Sorry, a match is already running.";
pub const SERIES_FINISHED_REJECTION: &str = "Sorry, all games have been played.";

pub const QUIT_COMMAND: &str = "q";

pub const NOTICE_GAME_STARTED: &str = "GameStarted";
pub const NOTICE_GAME_OVER: &str = "GameOver";
pub const NOTICE_PARALYZED: &str = "Paralyzed";
pub const NOTICE_RECOVERED: &str = "Recovered";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A cell coordinate: `x` is the column, `y` the row, origin top-left.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub x: u16,
    pub y: u16,
}

impl Position {
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// Returns the neighbouring position in `direction`, or `None` when it
    /// would leave a `width` x `height` grid.
    pub fn step(self, direction: Direction, width: u16, height: u16) -> Option<Position> {
        let (dx, dy) = direction.offset();
        let x = i32::from(self.x) + dx;
        let y = i32::from(self.y) + dy;

        if x < 0 || y < 0 || x >= i32::from(width) || y >= i32::from(height) {
            return None;
        }

        Some(Position::new(x as u16, y as u16))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub const fn offset(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

/// A player command as typed over the player connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Move(Direction),
    PlaceBomb,
    Wait,
    Quit,
    Unknown(String),
}

impl Command {
    /// Parses one line of player input. Matching ignores case and
    /// surrounding whitespace; an empty line means "wait".
    pub fn parse(line: &str) -> Command {
        let token = line.trim().to_ascii_lowercase();

        match token.as_str() {
            "u" | "up" => Command::Move(Direction::Up),
            "d" | "down" => Command::Move(Direction::Down),
            "l" | "left" => Command::Move(Direction::Left),
            "r" | "right" => Command::Move(Direction::Right),
            "b" | "bomb" => Command::PlaceBomb,
            "" | "w" | "wait" => Command::Wait,
            "q" | "quit" => Command::Quit,
            _ => Command::Unknown(line.trim().to_string()),
        }
    }

    /// Canonical short form, as a client would send it.
    pub fn as_line(&self) -> &str {
        match self {
            Command::Move(Direction::Up) => "u",
            Command::Move(Direction::Down) => "d",
            Command::Move(Direction::Left) => "l",
            Command::Move(Direction::Right) => "r",
            Command::PlaceBomb => "b",
            Command::Wait => "w",
            Command::Quit => QUIT_COMMAND,
            Command::Unknown(text) => text,
        }
    }
}

/// Identity a player receives right after connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub id: PlayerId,
    pub name: String,
}

impl Handshake {
    pub fn id_line(&self) -> String {
        format!("{}{}", ID_PREFIX, self.id)
    }

    pub fn name_line(&self) -> String {
        format!("{}{}", NAME_PREFIX, self.name)
    }

    /// Reads the identity back out of the `YourID:` and `YourName:` lines.
    pub fn from_lines(id_line: &str, name_line: &str) -> Option<Handshake> {
        let id = id_line.trim().strip_prefix(ID_PREFIX)?.parse().ok()?;
        let name = name_line.trim().strip_prefix(NAME_PREFIX)?;

        Some(Handshake {
            id: PlayerId(id),
            name: name.to_string(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ScoreLine {
    pub id: PlayerId,
    pub name: String,
    pub score: u32,
}

/// Events broadcast to spectators, one JSON object per line.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MatchEvent {
    PlayerJoined {
        id: PlayerId,
        name: String,
        position: Position,
        players: usize,
        required: usize,
    },
    PlayerLeft {
        id: PlayerId,
        players: usize,
    },
    MatchStarting {
        game: u32,
        in_millis: u64,
    },
    StartAborted {
        game: u32,
        players: usize,
        required: usize,
    },
    MatchStarted {
        game: u32,
        width: u16,
        height: u16,
        players: Vec<ScoreLine>,
    },
    PlayerMoved {
        id: PlayerId,
        position: Position,
    },
    BombPlaced {
        owner: PlayerId,
        position: Position,
        fuse: u32,
    },
    Explosion {
        owner: PlayerId,
        origin: Position,
        affected: Vec<Position>,
        destroyed_walls: Vec<Position>,
        paralyzed: Vec<PlayerId>,
    },
    PlayerRecovered {
        id: PlayerId,
    },
    Round {
        game: u32,
        round: u32,
        map: Vec<String>,
    },
    MatchEnded {
        game: u32,
        rounds: u32,
        scores: Vec<ScoreLine>,
    },
    SeriesEnded {
        games: u32,
    },
}

impl MatchEvent {
    /// Renders the event as a single newline-terminated JSON line.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    pub fn from_line(line: &str) -> Result<MatchEvent, serde_json::Error> {
        serde_json::from_str(line.trim_end())
    }
}
