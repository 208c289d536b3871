//! Bitboard representation of a Connect 4 position
//!
//! Columns are stored contiguously, `HEIGHT + 1` bits each: bit 0 is the
//! bottom cell and bit `HEIGHT` is an always-empty guard bit, so carries
//! produced by adding to a column never reach the next one.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::MoveError;
use crate::{HEIGHT, WIDTH};

pub(crate) mod static_masks {
    use crate::{HEIGHT, WIDTH};

    pub const fn bottom_mask() -> u64 {
        let mut mask = 0;
        let mut column = 0;
        while column < WIDTH {
            mask |= 1 << (column * (HEIGHT + 1));
            column += 1;
        }
        mask
    }
    pub const fn full_board_mask() -> u64 {
        bottom_mask() * ((1 << HEIGHT as u64) - 1)
    }
    // the usable cells and the guard bit of the first column
    pub const fn column_span() -> u64 {
        (1 << (HEIGHT + 1)) - 1
    }
}

/// The occupant of a single cell
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Cell {
    PlayerOne,
    PlayerTwo,
    Empty,
}

/// An immutable Connect 4 position
///
/// Stores the cells of the player to move and the cells of both players.
/// Equality and hashing go through [`Position::key`].
#[derive(Copy, Clone, Debug)]
pub struct Position {
    // mask of the tiles of the player to move
    current: u64,
    // mask of all tiles
    mask: u64,
}

impl Position {
    /// The empty board
    pub const fn new() -> Self {
        Self {
            current: 0,
            mask: 0,
        }
    }

    /// Builds a position from raw bit patterns, `current` being the tiles of the player to move
    pub fn from_masks(current: u64, mask: u64) -> Self {
        debug_assert_eq!(current & mask, current);
        debug_assert_eq!(mask & !static_masks::full_board_mask(), 0);
        Self { current, mask }
    }

    /// Plays a string of 1-based column digits, failing on the first move that cannot be played
    ///
    /// A move that would end the game is rejected with [`MoveError::GameOver`].
    pub fn from_moves<S: AsRef<str>>(moves: S) -> Result<Self, MoveError> {
        let mut position = Self::new();
        for column_char in moves.as_ref().chars() {
            let column = parse_column(column_char)?;
            position = position.play(column)?;
        }
        Ok(position)
    }

    /// Plays a string of 1-based column digits, silently stopping at the
    /// first move that is unparsable, out of range, full or game-ending
    pub fn play_sequence<S: AsRef<str>>(&self, moves: S) -> Self {
        let mut position = *self;
        for column_char in moves.as_ref().chars() {
            match parse_column(column_char).and_then(|column| position.play(column)) {
                Ok(next) => position = next,
                Err(_) => break,
            }
        }
        position
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn mask(&self) -> u64 {
        self.mask
    }

    pub fn opponent(&self) -> u64 {
        self.current ^ self.mask
    }

    /// The number of tiles placed so far
    pub fn moves(&self) -> usize {
        self.mask.count_ones() as usize
    }

    pub const fn top_mask(column: usize) -> u64 {
        1 << (column * (HEIGHT + 1) + (HEIGHT - 1))
    }

    pub const fn bottom_mask(column: usize) -> u64 {
        1 << (column * (HEIGHT + 1))
    }

    pub const fn column_mask(column: usize) -> u64 {
        ((1 << HEIGHT) - 1) << (column * (HEIGHT + 1))
    }

    pub fn can_play(&self, column: usize) -> bool {
        Self::top_mask(column) & self.mask == 0
    }

    /// The bit of the lowest empty cell of a column
    pub fn move_bit_for_column(&self, column: usize) -> u64 {
        (self.mask + Self::bottom_mask(column)) & Self::column_mask(column)
    }

    /// Plays a 0-based column, unlike the 1-based digits of
    /// [`Position::from_moves`]. Errors report the column 1-based.
    pub fn play(&self, column: usize) -> Result<Self, MoveError> {
        if column >= WIDTH {
            return Err(MoveError::InvalidColumn(column.saturating_add(1)));
        }
        if !self.can_play(column) {
            return Err(MoveError::ColumnFull(column + 1));
        }
        if self.is_winning_move(column) {
            return Err(MoveError::GameOver);
        }
        Ok(self.play_move(self.move_bit_for_column(column)))
    }

    /// Places a tile for the player to move on an already validated cell
    pub fn play_move(&self, move_bit: u64) -> Self {
        Self {
            // switch the current player
            current: self.current ^ self.mask,
            mask: self.mask | move_bit,
        }
    }

    /// All cells that can be played this turn
    pub fn possible(&self) -> u64 {
        (self.mask + static_masks::bottom_mask()) & static_masks::full_board_mask()
    }

    /// Empty cells that would complete an alignment of 4 for the player to
    /// move (`for_current`) or for the opponent
    pub fn winning_cells(&self, for_current: bool) -> u64 {
        let player = if for_current {
            self.current
        } else {
            self.opponent()
        };
        Self::compute_winning_cells(player, self.mask)
    }

    fn compute_winning_cells(player: u64, mask: u64) -> u64 {
        // vertical: the top ends of 3-alignments
        let mut r = (player << 1) & (player << 2) & (player << 3);

        // horizontal, diagonal / and diagonal \
        for &step in [HEIGHT + 1, HEIGHT, HEIGHT + 2].iter() {
            let mut p = (player << step) & (player << (2 * step));
            // right ends of 3-alignments
            r |= p & (player << (3 * step));
            // holes of the type O O _ O
            r |= p & (player >> step);

            p = (player >> step) & (player >> (2 * step));
            // left ends of 3-alignments
            r |= p & (player >> (3 * step));
            // holes of the type O _ O O
            r |= p & (player << step);
        }

        r & (static_masks::full_board_mask() ^ mask)
    }

    pub fn is_winning_move(&self, column: usize) -> bool {
        self.winning_cells(true) & self.possible() & Self::column_mask(column) != 0
    }

    pub fn can_win_next(&self) -> bool {
        self.winning_cells(true) & self.possible() != 0
    }

    /// Playable cells that don't give the opponent a win on their next move
    ///
    /// Must not be called when the player to move can win immediately.
    pub fn non_losing_moves(&self) -> u64 {
        debug_assert!(!self.can_win_next());
        let mut possible_moves = self.possible();
        let opponent_winning_cells = self.winning_cells(false);
        let forced_moves = possible_moves & opponent_winning_cells;

        if forced_moves != 0 {
            // if more than one forced move exists, you can't prevent the opponent winning
            if forced_moves & (forced_moves - 1) != 0 {
                return 0;
            }
            possible_moves = forced_moves;
        }
        // avoid playing below an opponent's winning cell
        possible_moves & !(opponent_winning_cells >> 1)
    }

    /// Number of winning cells the player to move would have after playing `move_bit`
    pub fn move_score(&self, move_bit: u64) -> i32 {
        Self::compute_winning_cells(self.current | move_bit, self.mask).count_ones() as i32
    }

    /// Key for the transposition table, unique for every reachable position
    pub fn key(&self) -> u64 {
        self.current + self.mask
    }

    /// Base 3 key shared by a position and its mirror image
    pub fn key3(&self) -> u128 {
        let forward = (0..WIDTH).fold(0, |key, column| self.partial_key3(key, column));
        let reverse = (0..WIDTH)
            .rev()
            .fold(0, |key, column| self.partial_key3(key, column));
        // drop the terminator of the last column
        forward.min(reverse) / 3
    }

    fn partial_key3(&self, mut key: u128, column: usize) -> u128 {
        let mut cell = Self::bottom_mask(column);
        while cell & self.mask != 0 {
            key *= 3;
            key += if cell & self.current != 0 { 1 } else { 2 };
            cell <<= 1;
        }
        // end of column
        key * 3
    }

    /// The position reflected left to right
    pub fn mirror(&self) -> Self {
        let mut current = 0;
        let mut mask = 0;
        for column in 0..WIDTH {
            let from = column * (HEIGHT + 1);
            let to = (WIDTH - 1 - column) * (HEIGHT + 1);
            current |= ((self.current >> from) & static_masks::column_span()) << to;
            mask |= ((self.mask >> from) & static_masks::column_span()) << to;
        }
        Self { current, mask }
    }

    /// Decodes the owner of a cell, rows counted from the bottom
    pub fn cell(&self, column: usize, row: usize) -> Cell {
        debug_assert!(column < WIDTH && row < HEIGHT);
        let bit = Self::bottom_mask(column) << row;
        if self.mask & bit == 0 {
            return Cell::Empty;
        }
        // player one is to move after an even number of moves
        let player_one_to_move = self.moves() % 2 == 0;
        if (self.current & bit != 0) == player_one_to_move {
            Cell::PlayerOne
        } else {
            Cell::PlayerTwo
        }
    }
}

fn parse_column(column_char: char) -> Result<usize, MoveError> {
    match column_char.to_digit(10).map(|c| c as usize) {
        Some(column @ 1..=WIDTH) => Ok(column - 1),
        Some(column) => Err(MoveError::InvalidColumn(column)),
        None => Err(MoveError::Parse(column_char)),
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Position {}

impl Hash for Position {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in (0..HEIGHT).rev() {
            for column in 0..WIDTH {
                let glyph = match self.cell(column, row) {
                    Cell::PlayerOne => 'o',
                    Cell::PlayerTwo => 'x',
                    Cell::Empty => '.',
                };
                write!(f, "{}", glyph)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
