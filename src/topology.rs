//! Rank-to-grid addressing on a square torus.
//!
//! A communicator of `size` processes is laid out row-major on a
//! `side x side` grid where `side * side == size`. Rank `r` sits at
//! `x = r % side`, `y = r / side`, and both axes wrap, so every rank has
//! exactly four neighbors. Neighbor ranks are computed on demand and every
//! process arrives at the same answer independently.
//!
//! # Example
//!
//! ```
//! use torus_exchange::{neighbors, Neighbors};
//!
//! // 3x3 torus, rank 0 sits in the top-left corner
//! let n = neighbors(0, 9).unwrap();
//! assert_eq!(n, Neighbors { left: 2, right: 1, up: 6, down: 3 });
//! ```

use crate::error::{Error, Result};
use std::fmt;

/// Number of neighbors every rank has on a 2-D torus.
pub const NEIGHBOR_COUNT: usize = 4;

/// One of the four neighbor slots.
///
/// The declaration order is the exchange order: the combined result always
/// holds the left chunk first, then right, up, and down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum Direction {
    /// `x - 1`, wrapping
    Left = 0,
    /// `x + 1`, wrapping
    Right = 1,
    /// `y - 1`, wrapping
    Up = 2,
    /// `y + 1`, wrapping
    Down = 3,
}

impl Direction {
    /// All directions in exchange order.
    pub const ALL: [Direction; NEIGHBOR_COUNT] = [
        Direction::Left,
        Direction::Right,
        Direction::Up,
        Direction::Down,
    ];

    /// The direction pointing back at the caller from the neighbor.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    /// Message tag for traffic travelling in this direction.
    pub fn tag(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Up => "up",
            Direction::Down => "down",
        };
        f.write_str(name)
    }
}

/// The four neighbor ranks of one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Neighbors {
    /// Rank to the left
    pub left: usize,
    /// Rank to the right
    pub right: usize,
    /// Rank above
    pub up: usize,
    /// Rank below
    pub down: usize,
}

impl Neighbors {
    /// Rank in the given slot.
    pub fn get(&self, direction: Direction) -> usize {
        match direction {
            Direction::Left => self.left,
            Direction::Right => self.right,
            Direction::Up => self.up,
            Direction::Down => self.down,
        }
    }

    /// `(direction, rank)` pairs in exchange order.
    pub fn iter(&self) -> impl Iterator<Item = (Direction, usize)> + '_ {
        Direction::ALL.into_iter().map(|d| (d, self.get(d)))
    }
}

/// Integer square root, rounded down.
pub fn isqrt(n: usize) -> usize {
    if n < 2 {
        return n;
    }
    // Float estimate, then correct for rounding at large n
    let mut x = (n as f64).sqrt() as usize;
    while x.checked_mul(x).is_none_or(|sq| sq > n) {
        x -= 1;
    }
    while (x + 1).checked_mul(x + 1).is_some_and(|sq| sq <= n) {
        x += 1;
    }
    x
}

/// Side length of the torus for `size` processes.
///
/// Fails with [`Error::Topology`] unless `size` is a positive perfect square.
pub fn grid_side(size: usize) -> Result<usize> {
    let side = isqrt(size);
    if size == 0 || side * side != size {
        return Err(Error::Topology(size));
    }
    Ok(side)
}

/// Compute the four wrap-around neighbors of `rank` on a torus of `size` processes.
pub fn neighbors(rank: usize, size: usize) -> Result<Neighbors> {
    Ok(TorusTopology::new(rank, size)?.neighbors())
}

/// Position of one process on the torus.
///
/// Derived from `(rank, size)` on every call site; never cached across
/// rounds or shared between processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TorusTopology {
    rank: usize,
    size: usize,
    side: usize,
}

impl TorusTopology {
    /// Build the topology for `rank` in a communicator of `size` processes.
    pub fn new(rank: usize, size: usize) -> Result<Self> {
        let side = grid_side(size)?;
        if rank >= size {
            return Err(Error::InvalidRank { rank, size });
        }
        Ok(TorusTopology { rank, size, side })
    }

    /// Rank of this process.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Total number of processes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Grid side length.
    pub fn side(&self) -> usize {
        self.side
    }

    /// `(x, y)` coordinates of this process.
    pub fn coords(&self) -> (usize, usize) {
        (self.rank % self.side, self.rank / self.side)
    }

    /// Rank at grid position `(x, y)`, with both coordinates taken modulo the side.
    pub fn rank_at(&self, x: usize, y: usize) -> usize {
        (x % self.side) + (y % self.side) * self.side
    }

    /// Rank of the neighbor in one direction.
    pub fn neighbor(&self, direction: Direction) -> usize {
        let (x, y) = self.coords();
        let side = self.side;
        match direction {
            Direction::Left => self.rank_at(x + side - 1, y),
            Direction::Right => self.rank_at(x + 1, y),
            Direction::Up => self.rank_at(x, y + side - 1),
            Direction::Down => self.rank_at(x, y + 1),
        }
    }

    /// All four neighbors.
    pub fn neighbors(&self) -> Neighbors {
        Neighbors {
            left: self.neighbor(Direction::Left),
            right: self.neighbor(Direction::Right),
            up: self.neighbor(Direction::Up),
            down: self.neighbor(Direction::Down),
        }
    }
}
