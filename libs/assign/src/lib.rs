//! # qbal-assign
//!
//! Minimum-cost assignment (Hungarian / Munkres) over dense integer cost
//! matrices.
//!
//! The balancer uses this to decide which queued jobs fill which queue slots
//! so that the fewest jobs change queue, but the solver knows nothing about
//! jobs or queues: it matches row indices to column indices.
//!
//! ## Example
//!
//! ```
//! use qbal_assign::{solve, CostMatrix};
//!
//! let costs = CostMatrix::from_rows(vec![
//!     vec![4, 1, 3],
//!     vec![2, 0, 5],
//!     vec![3, 2, 2],
//! ])
//! .unwrap();
//!
//! let assignment = solve(&costs).unwrap();
//! assert_eq!(assignment.total_cost(&costs), 5);
//! ```

mod error;
mod matrix;
mod munkres;

pub use error::AssignError;
pub use matrix::CostMatrix;
pub use munkres::{solve, Assignment};
