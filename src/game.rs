use anyhow::Result;
use crossterm::{
    style::{style, Attribute, Color, PrintStyledContent},
    QueueableCommand,
};

use std::io::{stdout, Write};

use connect4_solver::{solver::MAX_MOVES, Cell, MoveError, Position, HEIGHT, WIDTH};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GameState {
    Playing,
    PlayerOneWin,
    PlayerTwoWin,
    Draw,
}

/// A game in progress, which unlike a bare [`Position`] may hold a finished board
pub struct Game {
    position: Position,
    pub moves: String,
    pub state: GameState,
}

impl Game {
    pub fn new() -> Self {
        Self {
            position: Position::new(),
            moves: String::new(),
            state: GameState::Playing,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn player_one(&self) -> bool {
        self.position.moves() % 2 == 0
    }

    pub fn play_checked(&mut self, column_one_indexed: usize) -> Result<GameState> {
        if self.state != GameState::Playing {
            return Err(MoveError::GameOver.into());
        }
        if column_one_indexed < 1 || column_one_indexed > WIDTH {
            return Err(MoveError::InvalidColumn(column_one_indexed).into());
        }
        let column = column_one_indexed - 1;
        if !self.position.can_play(column) {
            return Err(MoveError::ColumnFull(column_one_indexed).into());
        }

        let winning = self.position.is_winning_move(column);
        let player_one = self.player_one();
        self.position = self
            .position
            .play_move(self.position.move_bit_for_column(column));
        self.moves.push_str(&column_one_indexed.to_string());

        self.state = if winning {
            if player_one {
                GameState::PlayerOneWin
            } else {
                GameState::PlayerTwoWin
            }
        } else if self.position.moves() == MAX_MOVES {
            GameState::Draw
        } else {
            GameState::Playing
        };
        Ok(self.state)
    }

    pub fn display(&self) -> Result<()> {
        let mut stdout = stdout();

        let cols: String = (1..=WIDTH).map(|x| x.to_string()).collect();
        stdout.queue(PrintStyledContent(style(cols + "\n")))?;

        for row in (0..HEIGHT).rev() {
            for column in 0..WIDTH {
                stdout.queue(PrintStyledContent(
                    style("O")
                        .attribute(Attribute::Bold)
                        .on(Color::DarkBlue)
                        .with(match self.position.cell(column, row) {
                            Cell::PlayerOne => Color::Red,
                            Cell::PlayerTwo => Color::Yellow,
                            Cell::Empty => Color::DarkBlue,
                        }),
                ))?;
            }
            stdout.queue(PrintStyledContent(style("\n")))?;
        }
        stdout.flush()?;
        Ok(())
    }
}
