use connect4_solver::{Position, Solver, TranspositionTable, WIDTH};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

// random positions late enough in the game to solve in milliseconds
fn endgames(count: usize, moves: usize) -> Vec<Position> {
    let mut seed = 0x9e3779b97f4a7c15u64;
    let mut next = move || {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        (seed >> 33) as usize
    };
    let mut positions = Vec::with_capacity(count);
    while positions.len() < count {
        let mut position = Position::new();
        while position.moves() < moves {
            let candidates: Vec<usize> = (0..WIDTH)
                .filter(|&c| position.can_play(c) && !position.is_winning_move(c))
                .collect();
            if candidates.is_empty() {
                break;
            }
            let column = candidates[next() % candidates.len()];
            position = position.play_move(position.move_bit_for_column(column));
        }
        if position.moves() == moves {
            positions.push(position);
        }
    }
    positions
}

fn bench_position_ops(c: &mut Criterion) {
    let position = Position::from_moves("4453526").unwrap();
    c.bench_function("non_losing_moves", |b| {
        b.iter(|| black_box(black_box(&position).non_losing_moves()))
    });
    c.bench_function("move_scores", |b| {
        b.iter(|| {
            let p = black_box(&position);
            (0..WIDTH)
                .filter(|&column| p.can_play(column))
                .map(|column| p.move_score(p.move_bit_for_column(column)))
                .sum::<i32>()
        })
    });
}

fn bench_solve(c: &mut Criterion) {
    let positions = endgames(8, 28);
    let mut solver = Solver::with_transposition_table(TranspositionTable::with_capacity(1 << 20));
    c.bench_function("solve_endgames", |b| {
        b.iter(|| {
            for position in positions.iter() {
                solver.transposition_table_mut().clear();
                black_box(solver.solve(black_box(position), false).unwrap());
            }
        })
    });
}

criterion_group!(benches, bench_position_ops, bench_solve);
criterion_main!(benches);
