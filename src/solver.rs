//! An agent to solve the game of Connect 4

use log::debug;
use rayon::prelude::*;
use static_assertions::const_assert;

use std::cmp::Ordering;
use std::sync::atomic::{self, AtomicBool};
use std::sync::Arc;

use crate::error::SolveError;
use crate::position::Position;
use crate::transposition_table::*;
use crate::{HEIGHT, WIDTH};

/// The number of tiles on a full board
pub const MAX_MOVES: usize = WIDTH * HEIGHT;
/// The minimum possible score of a position
pub const MIN_SCORE: i32 = -(MAX_MOVES as i32) / 2 + 3;
/// The maximum possible score of a postion
pub const MAX_SCORE: i32 = (MAX_MOVES as i32 + 1) / 2 - 3;

// encoded bounds must fit in a table entry
const_assert!(2 * MAX_SCORE - 2 * MIN_SCORE + 2 <= u8::MAX as i32);

/// The largest value a table entry can hold, a lower bound of `MAX_SCORE`
pub(crate) const MAX_ENCODED_BOUND: u8 = (2 * MAX_SCORE - 2 * MIN_SCORE + 2) as u8;

struct MoveSorter {
    size: usize,
    // move bitmap and score
    moves: [(u64, i32); WIDTH],
}

impl MoveSorter {
    pub fn new() -> Self {
        Self {
            size: 0,
            moves: [(0, 0); WIDTH],
        }
    }
    /// Inserts a move, keeping moves sorted by ascending score. Among equal
    /// scores, the move added last comes out first.
    pub fn push(&mut self, new_move: u64, score: i32) {
        let mut pos = self.size;
        self.size += 1;
        while pos != 0 && self.moves[pos - 1].1 > score {
            self.moves[pos] = self.moves[pos - 1];
            pos -= 1;
        }
        self.moves[pos] = (new_move, score);
    }
}
impl Iterator for MoveSorter {
    type Item = u64;

    fn next(&mut self) -> Option<Self::Item> {
        match self.size {
            0 => None,
            _ => {
                self.size -= 1;
                Some(self.moves[self.size].0)
            }
        }
    }
}

/// Returns the columns ordered from the middle outwards, as
/// the middle columns are often better moves
pub const fn move_order() -> [usize; WIDTH] {
    let mut move_order = [0; WIDTH];
    let mut i = 0;
    while i < WIDTH {
        let offset = (1 - 2 * (i as i32 % 2)) * (i as i32 + 1) / 2;
        move_order[i] = (WIDTH as i32 / 2 + offset) as usize;
        i += 1;
    }
    move_order
}

/// The score of a position where the player to move wins with their next tile
fn immediate_win_score(position: &Position) -> i32 {
    ((MAX_MOVES + 1 - position.moves()) / 2) as i32
}

// an offset of one keeps 0 free to mean an empty entry
fn encode_upper_bound(score: i32) -> u8 {
    (score - MIN_SCORE + 1) as u8
}

fn encode_lower_bound(score: i32) -> u8 {
    (score + MAX_SCORE - 2 * MIN_SCORE + 2) as u8
}

/// Converts a position score to a win distance in a single player's moves
pub fn win_distance(position: &Position, score: i32) -> usize {
    let moves = position.moves();
    match score.cmp(&0) {
        Ordering::Equal => MAX_MOVES - moves,
        Ordering::Greater => (MAX_MOVES / 2 + 1 - score as usize) - moves / 2,
        Ordering::Less => (MAX_MOVES / 2 + 1) - (-score as usize) - moves / 2,
    }
}

/// An agent to solve Connect 4 positions
///
/// # Notes
/// This agent uses a classical game tree search with various optimisations to
/// find the mathematically best move(s) in any position, thus 'solving' the game.
/// The transposition table is kept between calls, so re-using a `Solver` for
/// related positions is faster than creating a new one.
///
/// # Position Scoring
/// A position is scored by how far a forced win is from the end of the game for either player.
/// If the player to move wins with their final placed tile (their 21st tile in a 7x6 board)
/// the score is 1, or -1 if the the opponent wins with their final tile. Earlier wins
/// have scores further from 0, up to 18/-18, where a player wins with their 4th tile. A drawn position
/// has a score of 0
pub struct Solver<T = TranspositionTable> {
    /// The number of nodes searched by the last call (for diagnostics only)
    pub node_count: usize,
    transposition_table: T,
    stop: Option<Arc<AtomicBool>>,
    stopped: bool,
}

impl Solver<TranspositionTable> {
    /// Creates a new `Solver` with an empty transposition table
    pub fn new() -> Self {
        Self::with_transposition_table(TranspositionTable::new())
    }
}

impl Default for Solver<TranspositionTable> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ScoreCache> Solver<T> {
    /// Creates a new `Solver` with a given transposition table
    pub fn with_transposition_table(transposition_table: T) -> Self {
        Self {
            node_count: 0,
            transposition_table,
            stop: None,
            stopped: false,
        }
    }

    /// Makes searches abort with [`SolveError::Cancelled`] once `stop` is set
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn transposition_table(&self) -> &T {
        &self.transposition_table
    }

    pub fn transposition_table_mut(&mut self) -> &mut T {
        &mut self.transposition_table
    }

    pub fn into_transposition_table(self) -> T {
        self.transposition_table
    }

    /// Calculates the exact score of a position (see [Position Scoring])
    ///
    /// A `weak` solve only finds out who wins and returns -1, 0 or 1.
    ///
    /// # Panics
    /// If the position has more tiles than the board can hold.
    ///
    /// [Position Scoring]: #position-scoring
    pub fn solve(&mut self, position: &Position, weak: bool) -> Result<i32, SolveError> {
        self.node_count = 0;
        self.stopped = false;
        self.narrow(position, weak)
    }

    /// Scores every column from the point of view of the player to move,
    /// `None` for full columns
    pub fn analyze(
        &mut self,
        position: &Position,
        weak: bool,
    ) -> Result<[Option<i32>; WIDTH], SolveError> {
        self.node_count = 0;
        self.stopped = false;
        let mut scores = [None; WIDTH];
        for (column, score) in scores.iter_mut().enumerate() {
            *score = self.column_score(position, column, weak)?;
        }
        Ok(scores)
    }

    /// Finds the best column and its score, preferring central columns
    /// among equally scored moves. `None` if the board is full.
    pub fn best_move(
        &mut self,
        position: &Position,
        weak: bool,
    ) -> Result<Option<(usize, i32)>, SolveError> {
        let scores = self.analyze(position, weak)?;
        Ok(pick_best(&scores))
    }

    fn column_score(
        &mut self,
        position: &Position,
        column: usize,
        weak: bool,
    ) -> Result<Option<i32>, SolveError> {
        if !position.can_play(column) {
            return Ok(None);
        }
        if position.is_winning_move(column) {
            let score = immediate_win_score(position);
            return Ok(Some(if weak { score.signum() } else { score }));
        }
        let next = position.play_move(position.move_bit_for_column(column));
        // the score is flipped for the other player
        Ok(Some(-self.narrow(&next, weak)?))
    }

    fn check_stop(&mut self) -> bool {
        if let Some(stop) = &self.stop {
            if stop.load(atomic::Ordering::Relaxed) {
                self.stopped = true;
            }
        }
        self.stopped
    }

    /// Performs the iterative null-window search
    fn narrow(&mut self, position: &Position, weak: bool) -> Result<i32, SolveError> {
        assert!(
            position.moves() <= MAX_MOVES,
            "position has more tiles than the board"
        );

        if position.can_win_next() {
            let score = immediate_win_score(position);
            return Ok(if weak { score.signum() } else { score });
        }

        let mut min = -((MAX_MOVES - position.moves()) as i32) / 2;
        let mut max = immediate_win_score(position);
        if weak {
            min = min.max(-1);
            max = max.min(1);
        }

        while min < max {
            if self.check_stop() {
                return Err(SolveError::Cancelled);
            }

            let mut mid = min + (max - min) / 2;
            // tweak the search value for both negative and positive searches
            if mid <= 0 && min / 2 < mid {
                mid = min / 2
            } else if mid >= 0 && max / 2 > mid {
                mid = max / 2
            }

            debug!(
                "probing {} in [{}, {}], uncertainty: {}, nodes: {}",
                mid,
                min,
                max,
                max - min,
                self.node_count
            );

            // use a null-window to determine if the actual score is greater or less that mid
            let r = self.negamax(position, mid, mid + 1);
            if self.stopped {
                return Err(SolveError::Cancelled);
            }

            // r is not necessarily the exact true score, but its value indicates
            // whether the true score is above or below the search target
            if r <= mid {
                // actual score <= mid
                max = r
            } else {
                // actual score > mid
                min = r;
            }
        }

        Ok(if weak { min.signum() } else { min })
    }

    /// Performs game tree search
    ///
    /// Returns the score of the position if it lies inside `(alpha, beta)`,
    /// otherwise a bound on the side of the window it fell on.
    /// The player to move must not have a winning move.
    fn negamax(&mut self, position: &Position, mut alpha: i32, mut beta: i32) -> i32 {
        assert!(alpha < beta);
        debug_assert!(!position.can_win_next());
        self.node_count += 1;

        if self.check_stop() {
            return alpha;
        }

        // look for moves that don't give the opponent a next turn win
        let non_losing_moves = position.non_losing_moves();
        if non_losing_moves == 0 {
            return -((MAX_MOVES - position.moves()) as i32) / 2;
        }

        // nobody can complete an alignment with the last two tiles
        if position.moves() >= MAX_MOVES - 2 {
            return 0;
        }

        // lower bound of score, the opponent can't win on their next move
        let min = -((MAX_MOVES - 2 - position.moves()) as i32) / 2;
        if alpha < min {
            alpha = min;
            if alpha >= beta {
                return alpha;
            }
        }

        // upper bound of score, we can't win on this move
        let max = ((MAX_MOVES - 1 - position.moves()) / 2) as i32;
        if beta > max {
            beta = max;
            if alpha >= beta {
                return beta;
            }
        }

        // try to fetch the upper/lower bound of the score from the transposition table
        let key = position.key();
        let value = self.transposition_table.get(key) as i32;
        if value != 0 {
            // check if lower bound
            if value > MAX_SCORE - MIN_SCORE + 1 {
                let min = value + 2 * MIN_SCORE - MAX_SCORE - 2;
                if alpha < min {
                    alpha = min;
                    if alpha >= beta {
                        // prune the exploration
                        return alpha;
                    }
                }
            // else upper bound
            } else {
                let max = value + MIN_SCORE - 1;
                if beta > max {
                    beta = max;
                    if alpha >= beta {
                        // prune the exploration
                        return beta;
                    }
                }
            }
        }

        let mut moves = MoveSorter::new();
        // reversing move order to put edges first reduces the amount of sorting
        // as these moves are worse on average
        for &column in move_order().iter().rev() {
            let candidate = non_losing_moves & Position::column_mask(column);
            if candidate != 0 {
                moves.push(candidate, position.move_score(candidate));
            }
        }

        // search the next level of the tree
        for move_bitmap in moves {
            let next = position.play_move(move_bitmap);
            // the search window is flipped for the other player
            let score = -self.negamax(&next, -beta, -alpha);
            if self.stopped {
                return alpha;
            }
            // if a child node's score is better than beta, we can prune the tree
            // here because a perfect opponent will not pick this branch
            if score >= beta {
                // save a lower bound of the score
                self.transposition_table.set(key, encode_lower_bound(score));
                return score;
            }
            if score > alpha {
                alpha = score;
            }
        }

        // save an upper bound of the score
        self.transposition_table.set(key, encode_upper_bound(alpha));
        alpha
    }
}

impl Solver<SharedTranspositionTable> {
    /// Like [`Solver::analyze`], searching the columns on the rayon thread pool
    ///
    /// All workers share this solver's transposition table.
    pub fn par_analyze(
        &mut self,
        position: &Position,
        weak: bool,
    ) -> Result<[Option<i32>; WIDTH], SolveError> {
        let this = &*self;
        let results: Vec<(Result<Option<i32>, SolveError>, usize)> = (0..WIDTH)
            .into_par_iter()
            .map(|column| {
                let mut worker = this.fork();
                let score = worker.column_score(position, column, weak);
                (score, worker.node_count)
            })
            .collect();

        self.node_count = 0;
        let mut scores = [None; WIDTH];
        for (column, (score, nodes)) in results.into_iter().enumerate() {
            self.node_count += nodes;
            scores[column] = score?;
        }
        Ok(scores)
    }

    /// Like [`Solver::best_move`], searching the columns in parallel
    pub fn par_best_move(
        &mut self,
        position: &Position,
        weak: bool,
    ) -> Result<Option<(usize, i32)>, SolveError> {
        let scores = self.par_analyze(position, weak)?;
        Ok(pick_best(&scores))
    }

    fn fork(&self) -> Self {
        Self {
            node_count: 0,
            transposition_table: self.transposition_table.clone(),
            stop: self.stop.clone(),
            stopped: false,
        }
    }
}

fn pick_best(scores: &[Option<i32>; WIDTH]) -> Option<(usize, i32)> {
    let mut best: Option<(usize, i32)> = None;
    for &column in move_order().iter() {
        if let Some(score) = scores[column] {
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((column, score));
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorter_pops_highest_score_first() {
        let mut moves = MoveSorter::new();
        moves.push(0b001, 1);
        moves.push(0b010, 3);
        moves.push(0b100, 1);
        // ties come out in reverse insertion order
        assert_eq!(moves.collect::<Vec<_>>(), vec![0b010, 0b100, 0b001]);
    }

    #[test]
    fn bound_encoding_round_trips() {
        for score in MIN_SCORE..=MAX_SCORE {
            let upper = encode_upper_bound(score) as i32;
            let lower = encode_lower_bound(score) as i32;
            assert!(upper != 0 && upper <= MAX_SCORE - MIN_SCORE + 1);
            assert!(lower > MAX_SCORE - MIN_SCORE + 1);
            assert_eq!(upper + MIN_SCORE - 1, score);
            assert_eq!(lower + 2 * MIN_SCORE - MAX_SCORE - 2, score);
        }
    }
}
