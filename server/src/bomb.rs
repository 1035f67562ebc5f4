//! Bombs and explosion propagation

use crate::grid::{GameMap, Wall};
use crate::registry::PlayerRegistry;
use log::debug;
use shared::{MatchEvent, PlayerId, Position};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bomb {
    pub owner: PlayerId,
    pub origin: Position,
    /// Rounds left until detonation
    pub fuse: u32,
}

/// Everything one detonation changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Explosion {
    pub owner: PlayerId,
    pub origin: Position,
    pub affected: Vec<Position>,
    pub destroyed_walls: Vec<Position>,
    pub cleared_specials: Vec<Position>,
    pub paralyzed: Vec<PlayerId>,
}

impl Explosion {
    pub fn to_event(&self) -> MatchEvent {
        MatchEvent::Explosion {
            owner: self.owner,
            origin: self.origin,
            affected: self.affected.clone(),
            destroyed_walls: self.destroyed_walls.clone(),
            paralyzed: self.paralyzed.clone(),
        }
    }
}

impl Bomb {
    pub fn new(owner: PlayerId, origin: Position, fuse: u32) -> Self {
        Self {
            owner,
            origin,
            fuse,
        }
    }

    /// Counts the fuse down by one round; returns true once it is spent.
    pub fn tick(&mut self) -> bool {
        self.fuse = self.fuse.saturating_sub(1);
        self.fuse == 0
    }

    /// Blows the bomb up.
    ///
    /// Every cell on the four blast rays plus the origin loses its
    /// destructible wall and its pickup, and every player standing there is
    /// paralyzed for `paralysis_rounds`. Indestructible walls are never on a
    /// ray, so they survive.
    pub fn detonate(
        self,
        map: &mut GameMap,
        registry: &mut PlayerRegistry,
        paralysis_rounds: u32,
    ) -> Explosion {
        let mut affected = map.neighbors_along_axes(self.origin);
        affected.push(self.origin);

        let mut explosion = Explosion {
            owner: self.owner,
            origin: self.origin,
            affected: Vec::new(),
            destroyed_walls: Vec::new(),
            cleared_specials: Vec::new(),
            paralyzed: Vec::new(),
        };

        for pos in &affected {
            let Some(cell) = map.cell_mut(*pos) else {
                continue;
            };

            if cell.wall == Some(Wall::Destructible) {
                cell.wall = None;
                explosion.destroyed_walls.push(*pos);
            }

            if cell.special.take().is_some() {
                explosion.cleared_specials.push(*pos);
            }

            for id in &cell.players {
                if let Ok(player) = registry.lookup_mut(*id) {
                    player.paralyze(paralysis_rounds);
                    explosion.paralyzed.push(*id);
                } else {
                    debug!("Blast at {} hit unregistered player {}", pos, id);
                }
            }
        }

        explosion.affected = affected;
        explosion
    }
}

/// Ticks every fuse and detonates what is due.
///
/// Blasts chain: a live bomb whose cell is reached by a blast detonates in
/// the same round. Each bomb goes off once. Explosions are returned in the
/// order they happened.
pub fn detonate_due(
    bombs: &mut Vec<Bomb>,
    map: &mut GameMap,
    registry: &mut PlayerRegistry,
    paralysis_rounds: u32,
) -> Vec<Explosion> {
    let mut pending = Vec::new();
    let mut waiting = Vec::new();
    for mut bomb in std::mem::take(bombs) {
        if bomb.tick() {
            pending.push(bomb);
        } else {
            waiting.push(bomb);
        }
    }
    *bombs = waiting;

    let mut explosions = Vec::new();
    let mut next = 0;
    while next < pending.len() {
        let bomb = pending[next].clone();
        next += 1;

        let explosion = bomb.detonate(map, registry, paralysis_rounds);

        let (chained, rest): (Vec<Bomb>, Vec<Bomb>) = std::mem::take(bombs)
            .into_iter()
            .partition(|other| explosion.affected.contains(&other.origin));
        *bombs = rest;
        pending.extend(chained);

        explosions.push(explosion);
    }

    explosions
}
