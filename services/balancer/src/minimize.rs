//! Move minimization.
//!
//! The balancing engine fixes how many jobs each queue should hold. Which
//! concrete job fills which slot is an assignment problem: a job costs 0 in
//! a slot of its current queue and 1 anywhere else. Solving it optimally
//! keeps every job that can stay where it is.

use anyhow::{ensure, Context, Result};
use qbal_assign::{solve, CostMatrix};

use crate::balance::QueueRecord;
use crate::jobs::Job;

/// Final job placement for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    queues: Vec<(String, Vec<Job>)>,
}

impl Placement {
    /// Queues in configuration order with the jobs assigned to each.
    pub fn queues(&self) -> impl Iterator<Item = (&str, &[Job])> {
        self.queues
            .iter()
            .map(|(name, jobs)| (name.as_str(), jobs.as_slice()))
    }

    /// Jobs that must change queue, grouped by destination. Queues with
    /// nothing to receive are omitted.
    pub fn moves_by_queue(&self) -> Vec<(&str, Vec<&Job>)> {
        self.queues()
            .filter_map(|(name, jobs)| {
                let moving: Vec<&Job> = jobs.iter().filter(|j| !j.in_queue(name)).collect();
                (!moving.is_empty()).then_some((name, moving))
            })
            .collect()
    }

    /// Number of jobs that must change queue.
    pub fn move_count(&self) -> usize {
        self.queues()
            .map(|(name, jobs)| jobs.iter().filter(|j| !j.in_queue(name)).count())
            .sum()
    }
}

/// Assign the jobs in every `recv_jobs` list to queue slots so that each
/// queue keeps its target count and as few jobs as possible move.
pub fn minimize_moves(records: &[QueueRecord]) -> Result<Placement> {
    let jobs: Vec<&Job> = records.iter().flat_map(|r| r.recv_jobs.iter()).collect();
    let slots: Vec<usize> = records
        .iter()
        .enumerate()
        .flat_map(|(i, r)| std::iter::repeat_n(i, r.recv_jobs.len()))
        .collect();

    let n = jobs.len();
    let costs = CostMatrix::from_fn(n, n, |row, col| {
        u64::from(!jobs[row].in_queue(&records[slots[col]].name))
    });

    let assignment = solve(&costs).context("solving job placement")?;
    ensure!(
        assignment.len() == n,
        "incomplete placement: {} of {} jobs assigned",
        assignment.len(),
        n
    );

    let mut queues: Vec<(String, Vec<Job>)> = records
        .iter()
        .map(|r| (r.name.clone(), Vec::with_capacity(r.recv_jobs.len())))
        .collect();
    for (row, col) in assignment.pairs() {
        queues[slots[col]].1.push(jobs[row].clone());
    }

    Ok(Placement { queues })
}
