//! Interactive N-puzzle demo driver
//!
//! Reads a puzzle size N and a scramble complexity from standard input,
//! carves a block pool sized for that puzzle, solves, and prints the
//! solution path with the run's statistics.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use blockpool::utils::format_bytes;
use blockpool::MEGABYTE;
use npuzzle::{solve, Board, SolveOptions};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    let side = match prompt_number("Enter a value for N: ", &mut lines) {
        Some(side) if side >= 2 => side,
        _ => {
            eprintln!("N must be an integer of at least 2");
            return ExitCode::FAILURE;
        }
    };

    let Some(complexity) = prompt_number("Enter the initial complexity: ", &mut lines) else {
        eprintln!("complexity must be a non-negative integer");
        return ExitCode::FAILURE;
    };

    println!("Generating an N-puzzle with N = {side} and initial complexity = {complexity}\n");

    // One block per board; 64 MiB of spans bounds the search frontier.
    let pool = match npuzzle::solver::board_pool(side, 64 * MEGABYTE) {
        Ok(pool) => pool,
        Err(err) => {
            eprintln!("could not create the board pool: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut rng = rand::thread_rng();
    let start = match Board::scrambled(&pool, side, complexity, &mut rng) {
        Ok(board) => board,
        Err(err) => {
            eprintln!("could not build the starting board: {err}");
            return ExitCode::FAILURE;
        }
    };

    println!("Initial state:");
    println!("{start}");

    let options = SolveOptions {
        // Larger boards spend their time in the heuristic; fan the
        // successor work out and stress the pool from four threads.
        parallel_expand: side >= 4,
        ..SolveOptions::default()
    };

    let result = match solve(start, &options) {
        Ok(Some((path, report))) => {
            println!("Solution found! Now displaying solution path");
            println!("Path length: {}\n", report.path_len);

            for board in &path {
                println!("{board}");
            }

            println!("================ Run statistics ================");
            println!("Optimal solution path length: {}", report.path_len);
            println!("Unique configurations generated: {}", report.unique_states);
            println!(
                "Board memory consumed: {}",
                format_bytes(report.unique_states * pool.block_size())
            );
            println!("Coalescing allocations: {}", pool.coalesce_count());
            if let Some(stats) = pool.stats() {
                println!(
                    "Pool allocations: {} ({} failed)",
                    stats.total_allocs, stats.failed_allocs
                );
            }
            println!("Time spent: {:.3?}", report.elapsed);
            println!("================================================");
            ExitCode::SUCCESS
        }
        Ok(None) => {
            println!("No solution.");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("search aborted: {err}");
            ExitCode::FAILURE
        }
    };
    result
}

/// Prompts on stdout and parses the next stdin line as a number.
fn prompt_number(
    prompt: &str,
    lines: &mut impl Iterator<Item = io::Result<String>>,
) -> Option<usize> {
    print!("{prompt}");
    io::stdout().flush().ok()?;

    let line = lines.next()?.ok()?;
    line.trim().parse().ok()
}
