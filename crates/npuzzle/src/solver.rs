//! A* search over pool-backed boards
//!
//! The fringe is a binary min-heap ordered by travelled-plus-estimated cost;
//! configurations generated earlier win ties. Every configuration generated
//! so far is remembered in a hash set, so each board enters the fringe at
//! most once. Parent links index into a node arena and reconstruct the
//! solution path when the goal surfaces.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::thread;
use std::time::{Duration, Instant};

use blockpool::{AllocResult, MemoryPool};
use tracing::debug;

use crate::board::{Board, Move};

/// Knobs for one solve run.
#[derive(Debug, Clone, Copy)]
pub struct SolveOptions {
    /// Generate and score the four successors on scoped worker threads.
    ///
    /// Worth it once boards get big enough that the heuristic dominates;
    /// also a concurrency stress for the pool, which then sees allocations
    /// from four threads at once.
    pub parallel_expand: bool,

    /// Emit a progress event every this many expansions. Zero disables.
    pub progress_every: u64,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            parallel_expand: false,
            progress_every: 1000,
        }
    }
}

/// Counters describing a finished (or failed) search.
#[derive(Debug, Clone, Copy)]
pub struct SolveReport {
    /// States on the solution path, the start and goal included.
    pub path_len: usize,
    /// Fringe entries expanded.
    pub expanded: u64,
    /// Unique configurations generated over the whole search.
    pub unique_states: usize,
    /// Wall-clock time of the search.
    pub elapsed: Duration,
}

/// One generated configuration in the search arena.
struct Node<'p> {
    board: Board<'p>,
    travelled: u32,
    parent: Option<u32>,
}

/// Fringe entry. Orders the binary heap as a min-heap on total cost, oldest
/// entry first among equals.
#[derive(PartialEq, Eq)]
struct OpenEntry {
    total_cost: u32,
    seq: u64,
    node: u32,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .total_cost
            .cmp(&self.total_cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Runs A* from `start` and returns the solution path with its report, or
/// `None` when the configuration has no solution.
///
/// # Errors
///
/// Propagates pool exhaustion (or any other allocation failure) from
/// successor generation; an aborted search releases every board it created.
pub fn solve<'p>(
    start: Board<'p>,
    options: &SolveOptions,
) -> AllocResult<Option<(Vec<Board<'p>>, SolveReport)>> {
    let began = Instant::now();

    let start_cost = start.heuristic();
    let mut seen: HashSet<Box<[u16]>> = HashSet::new();
    seen.insert(start.key());

    let mut nodes = vec![Node {
        board: start,
        travelled: 0,
        parent: None,
    }];

    let mut open = BinaryHeap::new();
    open.push(OpenEntry {
        total_cost: start_cost,
        seq: 0,
        node: 0,
    });

    let mut seq = 1u64;
    let mut expanded = 0u64;

    while let Some(entry) = open.pop() {
        let idx = entry.node;

        if nodes[idx as usize].board.is_solved() {
            let elapsed = began.elapsed();
            let unique_states = nodes.len();
            let path = extract_path(nodes, idx);
            let report = SolveReport {
                path_len: path.len(),
                expanded,
                unique_states,
                elapsed,
            };
            return Ok(Some((path, report)));
        }

        expanded += 1;

        let travelled = nodes[idx as usize].travelled + 1;
        let successors = if options.parallel_expand {
            expand_parallel(&nodes[idx as usize].board)?
        } else {
            expand(&nodes[idx as usize].board)?
        };

        for (board, estimate) in successors {
            // A repeated configuration drops here, returning its span.
            if !seen.insert(board.key()) {
                continue;
            }

            let node = nodes.len() as u32;
            open.push(OpenEntry {
                total_cost: travelled + estimate,
                seq,
                node,
            });
            seq += 1;
            nodes.push(Node {
                board,
                travelled,
                parent: Some(idx),
            });
        }

        if options.progress_every > 0 && expanded % options.progress_every == 0 {
            debug!(
                expanded,
                unique = nodes.len(),
                fringe = open.len(),
                "search progress"
            );
        }
    }

    Ok(None)
}

/// Generates every legal successor with its heuristic estimate.
fn expand<'p>(board: &Board<'p>) -> AllocResult<Vec<(Board<'p>, u32)>> {
    let mut successors = Vec::with_capacity(Move::ALL.len());
    for mv in Move::ALL {
        if let Some(child) = board.moved(mv)? {
            let estimate = child.heuristic();
            successors.push((child, estimate));
        }
    }
    Ok(successors)
}

/// Like [`expand`], with one scoped worker thread per direction.
fn expand_parallel<'p>(board: &Board<'p>) -> AllocResult<Vec<(Board<'p>, u32)>> {
    let results = thread::scope(|scope| {
        let workers: Vec<_> = Move::ALL
            .into_iter()
            .map(|mv| {
                scope.spawn(move || -> AllocResult<Option<(Board<'p>, u32)>> {
                    let Some(child) = board.moved(mv)? else {
                        return Ok(None);
                    };
                    let estimate = child.heuristic();
                    Ok(Some((child, estimate)))
                })
            })
            .collect();

        workers
            .into_iter()
            .map(|worker| worker.join().expect("successor worker panicked"))
            .collect::<Vec<_>>()
    });

    let mut successors = Vec::with_capacity(Move::ALL.len());
    for result in results {
        if let Some(pair) = result? {
            successors.push(pair);
        }
    }
    Ok(successors)
}

/// Walks the parent links back from the goal and moves the path boards out
/// of the arena in start-to-goal order. Boards off the path drop here and
/// return their spans to the pool.
fn extract_path(nodes: Vec<Node<'_>>, goal: u32) -> Vec<Board<'_>> {
    let mut chain = Vec::new();
    let mut cursor = Some(goal);
    while let Some(idx) = cursor {
        chain.push(idx);
        cursor = nodes[idx as usize].parent;
    }
    chain.reverse();

    let mut slots: Vec<Option<Node<'_>>> = nodes.into_iter().map(Some).collect();
    chain
        .into_iter()
        .map(|idx| {
            slots[idx as usize]
                .take()
                .expect("path indices are distinct")
                .board
        })
        .collect()
}

/// Sizes a pool so one block holds one board of the given side length.
///
/// `capacity` bounds how many unique configurations a search can hold at
/// once; the driver picks it from the puzzle size.
pub fn board_pool(side: usize, capacity: usize) -> AllocResult<MemoryPool> {
    let config = blockpool::PoolConfig {
        track_stats: true,
        ..blockpool::PoolConfig::production()
    };
    MemoryPool::with_config(capacity, Board::tile_bytes(side), config)
}
