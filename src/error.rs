//! Error types returned by the library

use thiserror::Error;

/// A move that cannot be applied to a [`Position`](crate::position::Position)
///
/// Column numbers carried by the variants are 1-based, as typed by a player.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveError {
    #[error("could not parse '{0}' as a valid move")]
    Parse(char),
    #[error("Invalid move, column {0} out of range. Columns must be between 1 and {max}", max = crate::WIDTH)]
    InvalidColumn(usize),
    #[error("Invalid move, column {0} full")]
    ColumnFull(usize),
    #[error("Invalid position, game is over")]
    GameOver,
}

/// A search that did not run to completion
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveError {
    #[error("search cancelled")]
    Cancelled,
}

/// Failure to read or write a transposition table snapshot
#[derive(Error, Debug)]
pub enum TableError {
    #[error("transposition table i/o failed")]
    Io(#[from] std::io::Error),
    #[error("not a transposition table snapshot")]
    BadMagic,
    #[error("snapshot is for a {width}x{height} board")]
    DimensionMismatch { width: usize, height: usize },
    #[error("snapshot capacity {0} is not usable for this board")]
    BadCapacity(u64),
    #[error("snapshot entry {index} holds {value}, which is not an encoded score bound")]
    BadValue { index: usize, value: u8 },
}
