//! Grid model: the arena map and ray propagation
//!
//! The map is a dense row-major array of cells. Each cell may hold a wall, a
//! pickup, and any number of players. Only the match session mutates it.

use rand::Rng;
use shared::{Direction, PlayerId, Position};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wall {
    Destructible,
    Indestructible,
}

/// Pickups lying on open cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Special {
    /// Raises the bomb capacity of whoever picks it up
    ExtraBomb,
    /// Worth a few points
    Coin,
}

impl Special {
    pub const fn symbol(self) -> char {
        match self {
            Special::ExtraBomb => '^',
            Special::Coin => '$',
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub wall: Option<Wall>,
    pub special: Option<Special>,
    pub players: BTreeSet<PlayerId>,
}

impl Cell {
    pub fn is_blocked(&self) -> bool {
        self.wall.is_some()
    }
}

/// Random content of a generated map.
#[derive(Debug, Clone, Copy)]
pub struct MapLayout {
    pub wall_density: f64,
    pub special_density: f64,
}

#[derive(Debug, Clone)]
pub struct GameMap {
    width: u16,
    height: u16,
    cells: Vec<Cell>,
}

impl GameMap {
    /// A map without any walls or pickups.
    pub fn open(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            cells: vec![Cell::default(); usize::from(width) * usize::from(height)],
        }
    }

    /// Builds a classic arena: pillars on odd/odd cells, random destructible
    /// walls elsewhere, pickups on open cells, and clear corners for spawning.
    pub fn generate<R: Rng>(width: u16, height: u16, layout: MapLayout, rng: &mut R) -> Self {
        let mut map = Self::open(width, height);
        let reserved: Vec<Position> = map
            .corners()
            .into_iter()
            .flat_map(|corner| {
                let mut area = vec![corner];
                area.extend(
                    Direction::ALL
                        .iter()
                        .filter_map(|dir| corner.step(*dir, width, height)),
                );
                area
            })
            .collect();

        for y in 0..height {
            for x in 0..width {
                let pos = Position::new(x, y);
                if reserved.contains(&pos) {
                    continue;
                }

                let cell = map.cell_mut_unchecked(pos);
                if x % 2 == 1 && y % 2 == 1 {
                    cell.wall = Some(Wall::Indestructible);
                } else if rng.gen_bool(layout.wall_density) {
                    cell.wall = Some(Wall::Destructible);
                } else if rng.gen_bool(layout.special_density) {
                    cell.special = Some(if rng.gen_bool(0.5) {
                        Special::ExtraBomb
                    } else {
                        Special::Coin
                    });
                }
            }
        }

        map
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    fn index(&self, pos: Position) -> usize {
        usize::from(pos.y) * usize::from(self.width) + usize::from(pos.x)
    }

    pub fn cell(&self, pos: Position) -> Option<&Cell> {
        if self.in_bounds(pos) {
            self.cells.get(self.index(pos))
        } else {
            None
        }
    }

    pub fn cell_mut(&mut self, pos: Position) -> Option<&mut Cell> {
        if self.in_bounds(pos) {
            let index = self.index(pos);
            self.cells.get_mut(index)
        } else {
            None
        }
    }

    fn cell_mut_unchecked(&mut self, pos: Position) -> &mut Cell {
        let index = self.index(pos);
        &mut self.cells[index]
    }

    pub fn wall_at(&self, pos: Position) -> Option<Wall> {
        self.cell(pos).and_then(|cell| cell.wall)
    }

    pub fn special_at(&self, pos: Position) -> Option<Special> {
        self.cell(pos).and_then(|cell| cell.special)
    }

    pub fn set_wall(&mut self, pos: Position, wall: Option<Wall>) {
        if let Some(cell) = self.cell_mut(pos) {
            cell.wall = wall;
        }
    }

    pub fn set_special(&mut self, pos: Position, special: Option<Special>) {
        if let Some(cell) = self.cell_mut(pos) {
            cell.special = special;
        }
    }

    pub fn take_special(&mut self, pos: Position) -> Option<Special> {
        self.cell_mut(pos).and_then(|cell| cell.special.take())
    }

    /// Players can stand on any in-bounds cell without a wall.
    pub fn is_walkable(&self, pos: Position) -> bool {
        self.cell(pos).is_some_and(|cell| !cell.is_blocked())
    }

    pub fn occupants(&self, pos: Position) -> Vec<PlayerId> {
        self.cell(pos)
            .map(|cell| cell.players.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn place_player(&mut self, id: PlayerId, pos: Position) {
        if let Some(cell) = self.cell_mut(pos) {
            cell.players.insert(id);
        }
    }

    pub fn remove_player(&mut self, id: PlayerId, pos: Position) -> bool {
        self.cell_mut(pos)
            .is_some_and(|cell| cell.players.remove(&id))
    }

    pub fn move_player(&mut self, id: PlayerId, from: Position, to: Position) {
        self.remove_player(id, from);
        self.place_player(id, to);
    }

    /// Every cell visible from `origin` along the four axes.
    ///
    /// Each ray stops at the first cell holding an indestructible wall and
    /// does not include it; destructible walls do not stop a ray. The origin
    /// itself is not part of the result.
    pub fn neighbors_along_axes(&self, origin: Position) -> Vec<Position> {
        let mut visible = Vec::new();
        if !self.in_bounds(origin) {
            return visible;
        }

        for direction in Direction::ALL {
            let mut current = origin;
            while let Some(next) = current.step(direction, self.width, self.height) {
                if self.wall_at(next) == Some(Wall::Indestructible) {
                    break;
                }
                visible.push(next);
                current = next;
            }
        }

        visible
    }

    pub fn corners(&self) -> [Position; 4] {
        let right = self.width.saturating_sub(1);
        let bottom = self.height.saturating_sub(1);
        [
            Position::new(0, 0),
            Position::new(right, bottom),
            Position::new(right, 0),
            Position::new(0, bottom),
        ]
    }

    /// Spawn cell for the next player placed on this map.
    ///
    /// Free corners come first, in `corners()` order. Once every corner is
    /// taken or walled in, a random free walkable cell is used; a crowded
    /// map falls back to any walkable cell.
    pub fn spawn_point<R: Rng>(&self, rng: &mut R) -> Position {
        let corners = self.corners();
        let is_free = |pos: &Position| {
            self.is_walkable(*pos) && self.cell(*pos).map_or(false, |c| c.players.is_empty())
        };

        if let Some(corner) = corners.iter().find(|pos| is_free(pos)) {
            return *corner;
        }

        let walkable: Vec<Position> = (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| Position::new(x, y)))
            .filter(|pos| self.is_walkable(*pos))
            .collect();
        let free: Vec<Position> = walkable.iter().copied().filter(is_free).collect();

        let pool = if free.is_empty() { &walkable } else { &free };
        if pool.is_empty() {
            return corners[0];
        }
        pool[rng.gen_range(0..pool.len())]
    }

    /// Text picture of the map, one string per row.
    pub fn render(&self, bombs: &[Position]) -> Vec<String> {
        (0..self.height)
            .map(|y| {
                (0..self.width)
                    .map(|x| {
                        let pos = Position::new(x, y);
                        let cell = &self.cells[self.index(pos)];
                        match cell.wall {
                            Some(Wall::Indestructible) => '#',
                            Some(Wall::Destructible) => '+',
                            None if bombs.contains(&pos) => 'B',
                            None if !cell.players.is_empty() => 'P',
                            None => cell.special.map_or('.', Special::symbol),
                        }
                    })
                    .collect()
            })
            .collect()
    }
}
