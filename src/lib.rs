//! A perfect solver for the board game 'Connect 4'
//!
//! The solver uses an exact game tree search to find the
//! mathematically optimal score and move for any position.
//!
//! # Basic Usage
//!
//! ```
//! use connect4_solver::{position::Position, solver::Solver};
//! use connect4_solver::transposition_table::TranspositionTable;
//!
//!# use std::error::Error;
//!# fn main() -> Result<(), Box<dyn Error>> {
//! let position = Position::from_moves("112233")?;
//! let mut solver = Solver::with_transposition_table(TranspositionTable::with_capacity(1 << 20));
//!
//! // the first player wins with their next tile
//! assert!(position.is_winning_move(3));
//! assert_eq!(solver.solve(&position, false)?, 18);
//! assert_eq!(solver.node_count, 0);
//!# Ok(())
//!# }
//! ```

use static_assertions::*;

pub mod error;

pub mod transposition_table;

pub mod position;

pub mod solver;


pub use error::{MoveError, SolveError, TableError};
pub use position::{Cell, Position};
pub use solver::Solver;
pub use transposition_table::{ScoreCache, SharedTranspositionTable, TranspositionTable};

/// The width of the game board in tiles
pub const WIDTH: usize = 7;

/// The height of the game board in tiles
pub const HEIGHT: usize = 6;

// ensure that the given dimensions fit in a u64 for the bitboard representation
const_assert!(WIDTH * (HEIGHT + 1) <= 64);
// alignment detection shifts by up to three diagonal steps
const_assert!(3 * (HEIGHT + 2) < 64);
const_assert!(WIDTH >= 1 && HEIGHT >= 1);
