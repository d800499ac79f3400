//! Munkres (Hungarian) algorithm for the square assignment problem.
//!
//! The solver keeps the reduced cost matrix, a mark per entry (starred or
//! primed zero), and one cover flag per row and column. Starred zeros form
//! the current partial matching; primed zeros are candidates for the next
//! augmenting path.

use crate::error::AssignError;
use crate::matrix::CostMatrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    None,
    Star,
    Prime,
}

/// Result of solving an assignment problem.
///
/// Holds at most one column per row. Rows padded in by the solver are never
/// reported, so for a matrix with more rows than columns some rows stay
/// unassigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    col_for_row: Vec<Option<usize>>,
}

impl Assignment {
    /// Column assigned to `row`, if any.
    pub fn col_for_row(&self, row: usize) -> Option<usize> {
        self.col_for_row.get(row).copied().flatten()
    }

    /// Assigned `(row, col)` pairs in ascending row order.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.col_for_row
            .iter()
            .enumerate()
            .filter_map(|(r, c)| c.map(|c| (r, c)))
    }

    /// Number of assigned pairs.
    pub fn len(&self) -> usize {
        self.col_for_row.iter().filter(|c| c.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of the original costs of the assigned pairs.
    pub fn total_cost(&self, matrix: &CostMatrix) -> u64 {
        self.pairs().map(|(r, c)| matrix.get(r, c)).sum()
    }
}

/// Find a minimum-cost assignment of rows to columns.
///
/// Rectangular matrices are padded to square with zero-cost dummy entries;
/// pairs involving a dummy row or column are dropped from the result. The
/// returned assignment is optimal: no other one-to-one matching of the real
/// rows and columns has a lower total cost.
pub fn solve(matrix: &CostMatrix) -> Result<Assignment, AssignError> {
    if matrix.is_empty() {
        return Ok(Assignment {
            col_for_row: vec![None; matrix.rows()],
        });
    }

    let (n, cost) = matrix.padded_square();
    let mut state = Munkres::new(n, cost);
    state.run()?;

    let col_for_row = (0..matrix.rows())
        .map(|r| state.star_in_row(r).filter(|&c| c < matrix.cols()))
        .collect();

    Ok(Assignment { col_for_row })
}

struct Munkres {
    n: usize,
    cost: Vec<u64>,
    marks: Vec<Mark>,
    row_covered: Vec<bool>,
    col_covered: Vec<bool>,
}

impl Munkres {
    fn new(n: usize, cost: Vec<u64>) -> Self {
        Self {
            n,
            cost,
            marks: vec![Mark::None; n * n],
            row_covered: vec![false; n],
            col_covered: vec![false; n],
        }
    }

    fn at(&self, row: usize, col: usize) -> usize {
        row * self.n + col
    }

    fn run(&mut self) -> Result<(), AssignError> {
        self.reduce();
        self.star_independent_zeros();

        loop {
            if self.cover_starred_columns() == self.n {
                return Ok(());
            }

            let (row, col) = self.prime_until_uncovered_star()?;
            self.augment(row, col)?;
            self.clear_covers();
            self.erase_primes();
        }
    }

    /// Subtract each row's minimum from the row, then each column's minimum
    /// from the column.
    fn reduce(&mut self) {
        let n = self.n;
        for r in 0..n {
            let row = &mut self.cost[r * n..(r + 1) * n];
            let min = row.iter().copied().min().unwrap_or(0);
            row.iter_mut().for_each(|v| *v -= min);
        }
        for c in 0..n {
            let min = (0..n).map(|r| self.cost[r * n + c]).min().unwrap_or(0);
            for r in 0..n {
                self.cost[r * n + c] -= min;
            }
        }
    }

    /// Star a zero in each row whose row and column hold no star yet.
    fn star_independent_zeros(&mut self) {
        for r in 0..self.n {
            for c in 0..self.n {
                if self.cost[self.at(r, c)] == 0 && !self.row_covered[r] && !self.col_covered[c] {
                    let idx = self.at(r, c);
                    self.marks[idx] = Mark::Star;
                    self.row_covered[r] = true;
                    self.col_covered[c] = true;
                }
            }
        }
        self.clear_covers();
    }

    fn cover_starred_columns(&mut self) -> usize {
        let mut covered = 0;
        for c in 0..self.n {
            if self.star_in_col(c).is_some() {
                self.col_covered[c] = true;
                covered += 1;
            }
        }
        covered
    }

    /// Prime uncovered zeros until one is found whose row has no star.
    ///
    /// When a primed zero shares a row with a star, the row is covered and
    /// the star's column uncovered. When no uncovered zero remains the dual
    /// variables are adjusted, which always exposes a new one.
    fn prime_until_uncovered_star(&mut self) -> Result<(usize, usize), AssignError> {
        loop {
            let Some((r, c)) = self.find_uncovered_zero() else {
                self.adjust_by_min_uncovered()?;
                continue;
            };

            let idx = self.at(r, c);
            self.marks[idx] = Mark::Prime;

            match self.star_in_row(r) {
                Some(star_col) => {
                    self.row_covered[r] = true;
                    self.col_covered[star_col] = false;
                }
                None => return Ok((r, c)),
            }
        }
    }

    /// Flip stars and primes along the alternating path that starts at the
    /// primed zero `(row, col)`. This grows the matching by one.
    fn augment(&mut self, row: usize, col: usize) -> Result<(), AssignError> {
        let mut path = vec![(row, col)];

        loop {
            let (_, last_col) = path[path.len() - 1];
            let Some(star_row) = self.star_in_col(last_col) else {
                break;
            };
            path.push((star_row, last_col));

            let prime_col = self
                .prime_in_row(star_row)
                .ok_or(AssignError::BrokenPath { row: star_row })?;
            path.push((star_row, prime_col));
        }

        for (r, c) in path {
            let idx = self.at(r, c);
            self.marks[idx] = match self.marks[idx] {
                Mark::Star => Mark::None,
                Mark::Prime => Mark::Star,
                Mark::None => Mark::None,
            };
        }

        Ok(())
    }

    /// Add the smallest uncovered value to every covered row and subtract it
    /// from every uncovered column.
    fn adjust_by_min_uncovered(&mut self) -> Result<(), AssignError> {
        let n = self.n;
        let mut min = u64::MAX;
        for r in (0..n).filter(|&r| !self.row_covered[r]) {
            for c in (0..n).filter(|&c| !self.col_covered[c]) {
                min = min.min(self.cost[r * n + c]);
            }
        }

        for r in 0..n {
            for c in 0..n {
                let idx = r * n + c;
                if self.row_covered[r] {
                    self.cost[idx] = self.cost[idx]
                        .checked_add(min)
                        .ok_or(AssignError::Overflow)?;
                }
                if !self.col_covered[c] {
                    self.cost[idx] -= min;
                }
            }
        }

        Ok(())
    }

    fn find_uncovered_zero(&self) -> Option<(usize, usize)> {
        (0..self.n)
            .filter(|&r| !self.row_covered[r])
            .find_map(|r| {
                (0..self.n)
                    .find(|&c| !self.col_covered[c] && self.cost[self.at(r, c)] == 0)
                    .map(|c| (r, c))
            })
    }

    fn star_in_row(&self, row: usize) -> Option<usize> {
        (0..self.n).find(|&c| self.marks[self.at(row, c)] == Mark::Star)
    }

    fn star_in_col(&self, col: usize) -> Option<usize> {
        (0..self.n).find(|&r| self.marks[self.at(r, col)] == Mark::Star)
    }

    fn prime_in_row(&self, row: usize) -> Option<usize> {
        (0..self.n).find(|&c| self.marks[self.at(row, c)] == Mark::Prime)
    }

    fn clear_covers(&mut self) {
        self.row_covered.iter_mut().for_each(|v| *v = false);
        self.col_covered.iter_mut().for_each(|v| *v = false);
    }

    fn erase_primes(&mut self) {
        for mark in self.marks.iter_mut() {
            if *mark == Mark::Prime {
                *mark = Mark::None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn matrix(rows: Vec<Vec<u64>>) -> CostMatrix {
        CostMatrix::from_rows(rows).unwrap()
    }

    fn assert_permutation(assignment: &Assignment, n: usize) {
        let mut seen = vec![false; n];
        for (_, c) in assignment.pairs() {
            assert!(!seen[c], "column {c} assigned twice");
            seen[c] = true;
        }
        assert_eq!(assignment.len(), n);
    }

    #[rstest]
    #[case(vec![vec![4, 1, 3], vec![2, 0, 5], vec![3, 2, 2]], 5)]
    #[case(vec![vec![1, 2, 3], vec![2, 4, 6], vec![3, 6, 9]], 10)]
    #[case(vec![vec![9, 2, 7, 8], vec![6, 4, 3, 7], vec![5, 8, 1, 8], vec![7, 6, 9, 4]], 13)]
    #[case(vec![vec![0]], 0)]
    #[case(vec![vec![7, 7], vec![7, 7]], 14)]
    fn test_known_optimum(#[case] rows: Vec<Vec<u64>>, #[case] expected: u64) {
        let m = matrix(rows);
        let assignment = solve(&m).unwrap();
        assert_permutation(&assignment, m.rows());
        assert_eq!(assignment.total_cost(&m), expected);
    }

    #[test]
    fn test_zero_one_keeps_diagonal() {
        // Every row already has a zero in a distinct column.
        let m = matrix(vec![vec![1, 0, 1], vec![0, 1, 1], vec![1, 1, 0]]);
        let assignment = solve(&m).unwrap();
        assert_eq!(assignment.total_cost(&m), 0);
        assert_eq!(assignment.col_for_row(0), Some(1));
        assert_eq!(assignment.col_for_row(1), Some(0));
        assert_eq!(assignment.col_for_row(2), Some(2));
    }

    #[test]
    fn test_zero_one_forced_moves() {
        // Three rows want column group {0,1}; only two slots there.
        let m = matrix(vec![
            vec![0, 0, 1, 1],
            vec![0, 0, 1, 1],
            vec![0, 0, 1, 1],
            vec![1, 1, 0, 1],
        ]);
        let assignment = solve(&m).unwrap();
        assert_permutation(&assignment, 4);
        assert_eq!(assignment.total_cost(&m), 1);
    }

    #[test]
    fn test_wide_matrix_assigns_every_row() {
        let m = matrix(vec![vec![5, 1, 9], vec![2, 8, 3]]);
        let assignment = solve(&m).unwrap();
        assert_eq!(assignment.len(), 2);
        assert_eq!(assignment.col_for_row(0), Some(1));
        assert_eq!(assignment.col_for_row(1), Some(0));
        assert_eq!(assignment.total_cost(&m), 3);
    }

    #[test]
    fn test_tall_matrix_leaves_rows_unassigned() {
        let m = matrix(vec![vec![4], vec![1], vec![3]]);
        let assignment = solve(&m).unwrap();
        assert_eq!(assignment.len(), 1);
        assert_eq!(assignment.col_for_row(1), Some(0));
        assert_eq!(assignment.col_for_row(0), None);
    }

    #[test]
    fn test_empty_matrix() {
        let assignment = solve(&CostMatrix::new(0, 0, 0)).unwrap();
        assert!(assignment.is_empty());
        assert_eq!(assignment.col_for_row(0), None);
    }

    #[test]
    fn test_large_costs_reduce_cleanly() {
        let m = matrix(vec![vec![0, u64::MAX], vec![0, u64::MAX]]);
        let assignment = solve(&m).unwrap();
        assert_permutation(&assignment, 2);
        assert_eq!(assignment.total_cost(&m), u64::MAX);
    }
}
