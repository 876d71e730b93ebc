//! # npuzzle
//!
//! An N-puzzle (sliding tile) solver built on A* search, bundled as a stress
//! workload for the [`blockpool`] suballocator: every search state's tile
//! array lives in a span allocated from a shared
//! [`MemoryPool`](blockpool::MemoryPool), so a single solve issues tens of
//! thousands to millions of pool allocations and releases.
//!
//! The search uses the Manhattan-distance heuristic strengthened with
//! generalized linear conflicts, a binary-heap fringe, and a hash-set of the
//! configurations generated so far.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

pub mod board;
pub mod solver;

pub use board::{Board, Move};
pub use solver::{solve, SolveOptions, SolveReport};
