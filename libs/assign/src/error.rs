//! Error types for the assignment solver.

use thiserror::Error;

/// Errors that can occur when building or solving a cost matrix.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssignError {
    /// A row passed to [`CostMatrix::from_rows`](crate::CostMatrix::from_rows)
    /// has a different length than the first row.
    #[error("ragged cost matrix: row {row} has {found} columns, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// A dual adjustment pushed an entry past `u64::MAX`.
    #[error("cost overflow during dual adjustment")]
    Overflow,

    /// The alternating path reached a starred zero with no primed partner.
    #[error("broken augmenting path at row {row}")]
    BrokenPath { row: usize },
}
