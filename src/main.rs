use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};

use std::cmp::Ordering;
use std::fs::File;
use std::io::{stdin, stdout, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::{atomic::AtomicBool, Arc};
use std::time::{Duration, Instant};

use connect4_solver::solver::{self, Solver};
use connect4_solver::{Position, SharedTranspositionTable, SolveError, TranspositionTable};

mod game;
use game::*;

#[derive(Parser, Debug)]
#[command(author, version, about = "Perfect play and analysis for Connect 4", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Solve a position given as a string of 1-based columns, e.g. 4453
    Solve {
        #[arg(default_value = "")]
        moves: String,
        /// Only find out who wins
        #[arg(long)]
        weak: bool,
        /// Transposition table snapshot to load before and save after solving
        #[arg(long)]
        table: Option<PathBuf>,
        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Score every column of a position
    Analyze {
        #[arg(default_value = "")]
        moves: String,
        #[arg(long)]
        weak: bool,
        /// Worker threads, 0 for one per core
        #[arg(long, default_value_t = 0)]
        threads: usize,
    },
    /// Play a game in the terminal
    Play {
        /// Player 1 is AI controlled
        #[arg(long)]
        ai_one: bool,
        /// Player 2 is AI controlled
        #[arg(long)]
        ai_two: bool,
    },
    /// Check the solver against a file of "<moves> <score>" lines
    Bench {
        file: PathBuf,
        #[arg(long)]
        weak: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Solve {
            moves,
            weak,
            table,
            timeout,
        } => solve(&moves, weak, table, timeout),
        Command::Analyze {
            moves,
            weak,
            threads,
        } => analyze(&moves, weak, threads),
        Command::Play { ai_one, ai_two } => play(ai_one, ai_two),
        Command::Bench { file, weak } => bench(file, weak),
    }
}

fn parse_position(moves: &str) -> Result<Position> {
    Position::from_moves(moves).with_context(|| format!("invalid move sequence '{}'", moves))
}

fn describe_score(position: &Position, score: i32) -> String {
    let win_distance = solver::win_distance(position, score);
    let move_string = if win_distance == 1 { "move" } else { "moves" };
    let player_one = position.moves() % 2 == 0;
    match score.cmp(&0) {
        Ordering::Greater => {
            let player = if player_one { 1 } else { 2 };
            format!(
                "Player {} can force a win in at most {} {}.",
                player, win_distance, move_string
            )
        }
        Ordering::Less => {
            let player = if player_one { 2 } else { 1 };
            format!(
                "Player {} can force a win in at most {} {}.",
                player, win_distance, move_string
            )
        }
        Ordering::Equal => {
            let player = if player_one { 1 } else { 2 };
            format!(
                "Player {} can at best force a draw, {} {} remaining",
                player, win_distance, move_string
            )
        }
    }
}

fn solve(moves: &str, weak: bool, table: Option<PathBuf>, timeout: Option<u64>) -> Result<()> {
    let position = parse_position(moves)?;
    print!("{}", position);

    let transposition_table = match &table {
        Some(path) if path.exists() => TranspositionTable::load(path)?,
        _ => TranspositionTable::new(),
    };
    let mut solver = Solver::with_transposition_table(transposition_table);

    if let Some(seconds) = timeout {
        let stop = Arc::new(AtomicBool::new(false));
        solver = solver.with_stop_flag(stop.clone());
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(seconds));
            stop.store(true, std::sync::atomic::Ordering::Relaxed);
        });
    }

    let start_time = Instant::now();
    // the best child's score is the position's score, a full board has no child
    let result = solver.best_move(&position, weak).and_then(|best_move| match best_move {
        Some((column, score)) => Ok((score, Some(column))),
        None => Ok((solver.solve(&position, weak)?, None)),
    });
    let (score, best_move) = match result {
        Ok(result) => result,
        Err(SolveError::Cancelled) => bail!("no result within {}s", timeout.unwrap_or(0)),
    };
    info!(
        "solved in {:.3}s",
        (Instant::now() - start_time).as_secs_f64()
    );

    if weak {
        let outcome = match score.cmp(&0) {
            Ordering::Greater => "win",
            Ordering::Less => "loss",
            Ordering::Equal => "draw",
        };
        println!("Score: {} ({} for the player to move)", score, outcome);
    } else {
        println!("Score: {}", score);
        println!("{}", describe_score(&position, score));
    }
    match best_move {
        Some(column) => println!("Best move: {}", column + 1),
        None => println!("Board is full"),
    }

    if let Some(path) = table {
        solver.into_transposition_table().save(path)?;
    }
    Ok(())
}

fn analyze(moves: &str, weak: bool, threads: usize) -> Result<()> {
    let position = parse_position(moves)?;
    print!("{}", position);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()?;
    let mut solver = Solver::with_transposition_table(SharedTranspositionTable::new());

    let start_time = Instant::now();
    let scores = pool.install(|| solver.par_analyze(&position, weak))?;
    let time = Instant::now() - start_time;

    let row: Vec<String> = scores
        .iter()
        .map(|score| match score {
            Some(score) => score.to_string(),
            None => "-".to_string(),
        })
        .collect();
    println!("{}", row.join(" "));
    println!(
        "{} positions in {:.3}s, kpos/s: {:.1}",
        solver.node_count,
        time.as_secs_f64(),
        solver.node_count as f64 / (1000.0 * time.as_secs_f64())
    );
    Ok(())
}

fn ask_yes_no(question: &str) -> Result<bool> {
    let stdin = stdin();
    loop {
        let mut buffer = String::new();
        print!("{} y/n: ", question);
        stdout().flush()?;
        stdin.read_line(&mut buffer)?;
        match buffer.to_lowercase().chars().next() {
            Some('y') => return Ok(true),
            Some('n') => return Ok(false),
            _ => println!("Unknown answer given"),
        }
    }
}

fn play(ai_one: bool, ai_two: bool) -> Result<()> {
    println!("Welcome to Connect 4\n");

    let ai_players = if ai_one || ai_two {
        (ai_one, ai_two)
    } else {
        (
            ask_yes_no("Is player 1 AI controlled?")?,
            ask_yes_no("Is player 2 AI controlled?")?,
        )
    };

    let mut game = Game::new();
    // keep the solver out here so the transposition table is re-used
    let mut solver = Solver::new();
    let stdin = stdin();

    loop {
        game.display()?;

        match game.state {
            GameState::Playing => {
                let next_move = if (game.player_one() && ai_players.0)
                    || (!game.player_one() && ai_players.1)
                {
                    println!("AI is thinking...");
                    stdout().flush()?;

                    // slow down play if both players are AI
                    if ai_players == (true, true) {
                        std::thread::sleep(Duration::new(3, 0));
                    }

                    let (best_move, score) = solver
                        .best_move(game.position(), false)?
                        .ok_or_else(|| anyhow!("no playable column"))?;
                    println!("{}", describe_score(game.position(), score));
                    println!("Best move: {}", best_move + 1);
                    best_move + 1
                } else {
                    print!("Move input > ");
                    stdout().flush()?;
                    let mut input_str = String::new();
                    stdin.read_line(&mut input_str)?;

                    match input_str.trim().parse::<usize>() {
                        Err(_) => {
                            println!("Invalid number: {}", input_str.trim());
                            continue;
                        }
                        Ok(column) => column,
                    }
                };

                if let Err(err) = game.play_checked(next_move) {
                    println!("{}", err);
                    // try the move again
                    continue;
                }
            }

            // end states
            GameState::PlayerOneWin => {
                println!("Player 1 wins!");
                break;
            }
            GameState::PlayerTwoWin => {
                println!("Player 2 wins!");
                break;
            }
            GameState::Draw => {
                println!("Draw!");
                break;
            }
        }
    }
    info!("game record: {}", game.moves);
    Ok(())
}

fn bench(path: PathBuf, weak: bool) -> Result<()> {
    let file = BufReader::new(
        File::open(&path).with_context(|| format!("could not open {}", path.display()))?,
    );
    let mut cases = vec![];
    for line in file.lines() {
        let line = line?;
        let mut test_data = line.split_whitespace();
        let moves = match test_data.next() {
            Some(moves) => moves.to_string(),
            // skip blank lines
            None => continue,
        };
        let score = test_data
            .next()
            .ok_or_else(|| anyhow!("invalid test data: {}", line))?
            .parse::<i32>()?;
        cases.push((moves, score));
    }

    let progress = ProgressBar::new(cases.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("Solving: {bar:40.cyan/blue} {pos}/{len} ~{eta} remaining")
            .progress_chars("█▓▒░  "),
    );

    let mut solver = Solver::new();
    let mut times = vec![];
    let mut posis = vec![];
    let mut failures = 0;
    for (moves, score) in cases.iter() {
        let position = parse_position(moves)?;
        solver.transposition_table_mut().clear();

        let start_time = Instant::now();
        let calc = solver.solve(&position, weak)?;
        let finish_time = Instant::now();

        let expected = if weak { score.signum() } else { *score };
        if calc != expected {
            warn!("{}: expected {}, calculated {}", moves, expected, calc);
            failures += 1;
        }
        times.push(finish_time - start_time);
        posis.push(solver.node_count);
        progress.inc(1);
    }
    progress.finish();

    if cases.is_empty() {
        bail!("no positions in {}", path.display());
    }
    println!(
        "Mean time: {:.6}ms, Mean no. of positions: {}, kpos/s: {}",
        (times.iter().sum::<Duration>() / times.len() as u32).as_secs_f64() * 1000.0,
        posis.iter().sum::<usize>() as f64 / posis.len() as f64,
        posis
            .iter()
            .zip(times.iter())
            .map(|(p, t)| *p as f64 / t.as_secs_f64())
            .sum::<f64>()
            / (1000.0 * posis.len() as f64)
    );
    if failures > 0 {
        bail!("{} of {} positions scored incorrectly", failures, cases.len());
    }
    Ok(())
}
