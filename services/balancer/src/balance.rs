//! Balancing engine.
//!
//! Decides, for every configured queue, which of the user's waiting jobs it
//! should hold after this cycle. The result is a target distribution: how
//! many and which jobs each queue receives. Choosing which concrete jobs
//! actually move is left to [`crate::minimize`].
//!
//! A cycle runs these passes in order:
//! 1. Recompute `pcpus` from running jobs and take live free CPUs.
//! 2. Collect waiting jobs and sort them by requested CPUs (ascending).
//! 3. First-fit: each queue, in configuration order, pulls every remaining
//!    job that fits its free CPUs, largest first.
//! 4. Group the rest by current queue and compute `target = rest / queues`.
//! 5. Queues above `target` donate the surplus; queues below pull from the
//!    donor pool.
//! 6. The remainder of the pool is dealt round-robin, one per queue. Queues
//!    that donated the most are visited first, so a queue holding
//!    `target + 1` jobs keeps them.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, info};

use crate::capacity::QueueCapacity;
use crate::jobs::Job;

/// Per-queue bookkeeping for one balancing cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRecord {
    pub name: String,
    /// Waiting jobs left in this queue after first-fit.
    pub queued_count: usize,
    /// Total CPUs minus CPUs held by running jobs.
    pub pcpus: i64,
    /// Live free CPUs, decremented as first-fit places jobs.
    pub available_ncpus: i64,
    /// Waiting jobs currently in this queue that first-fit did not take.
    pub waiting_jobs: Vec<Job>,
    /// Jobs this queue should hold, including ones already in place.
    pub recv_jobs: Vec<Job>,
}

impl QueueRecord {
    fn new(name: &str, capacity: Option<&QueueCapacity>) -> Self {
        let (total, available) = capacity
            .map(|c| (c.total_cpus, c.available_cpus))
            .unwrap_or((0, 0));

        Self {
            name: name.to_string(),
            queued_count: 0,
            pcpus: total,
            available_ncpus: available,
            waiting_jobs: Vec::new(),
            recv_jobs: Vec::new(),
        }
    }
}

/// Output of [`balance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalancePlan {
    /// One record per configured queue, in configuration order.
    pub records: Vec<QueueRecord>,
    /// Number of waiting jobs considered this cycle.
    pub considered: usize,
    /// Jobs placed by the first-fit pass.
    pub first_fit: usize,
    /// Per-queue share of the jobs first-fit did not place.
    pub target: usize,
}

impl BalancePlan {
    /// Total number of jobs across every `recv_jobs` list.
    pub fn received(&self) -> usize {
        self.records.iter().map(|r| r.recv_jobs.len()).sum()
    }
}

/// Compute the target distribution of waiting jobs across `queues`.
///
/// `jobs` should already be restricted to the operating user. Only queued
/// jobs sitting in one of `queues` are redistributed; running jobs only
/// reduce their queue's `pcpus`.
pub fn balance(
    queues: &[String],
    capacity: &HashMap<String, QueueCapacity>,
    jobs: &[Job],
) -> BalancePlan {
    let index: HashMap<&str, usize> = queues
        .iter()
        .enumerate()
        .map(|(i, q)| (q.as_str(), i))
        .collect();
    let queue_of = |job: &Job| job.queue.as_deref().and_then(|q| index.get(q).copied());

    let mut records: Vec<QueueRecord> = queues
        .iter()
        .map(|q| QueueRecord::new(q, capacity.get(q)))
        .collect();

    for job in jobs.iter().filter(|j| j.is_running()) {
        if let Some(i) = queue_of(job) {
            records[i].pcpus -= i64::from(job.ncpus);
        }
    }

    let mut waiting: Vec<Job> = jobs
        .iter()
        .filter(|j| j.is_queued() && queue_of(*j).is_some())
        .cloned()
        .collect();
    waiting.sort_by_key(|j| j.ncpus);
    let considered = waiting.len();

    info!(
        waiting = considered,
        queues = %queues.join(", "),
        "found waiting jobs"
    );

    if queues.is_empty() || waiting.is_empty() {
        return BalancePlan {
            records,
            considered,
            first_fit: 0,
            target: 0,
        };
    }

    let placed = first_fit(&mut records, &mut waiting);

    for job in waiting {
        if let Some(i) = queue_of(&job) {
            records[i].queued_count += 1;
            records[i].waiting_jobs.push(job);
        }
    }

    let remaining: usize = records.iter().map(|r| r.queued_count).sum();
    let target = remaining / records.len();
    equalize(&mut records, target);

    for record in &records {
        debug!(
            queue = %record.name,
            pcpus = record.pcpus,
            available_ncpus = record.available_ncpus,
            queued = record.queued_count,
            receive = record.recv_jobs.len(),
            "queue plan"
        );
    }

    BalancePlan {
        records,
        considered,
        first_fit: placed,
        target,
    }
}

/// Greedily place waiting jobs that can start right away.
///
/// `waiting` is sorted ascending by CPUs, so scanning from the back tries
/// the largest jobs first. Returns the number of jobs placed.
fn first_fit(records: &mut [QueueRecord], waiting: &mut Vec<Job>) -> usize {
    let mut placed = 0;

    for record in records.iter_mut() {
        for i in (0..waiting.len()).rev() {
            let ncpus = i64::from(waiting[i].ncpus);
            if ncpus <= record.available_ncpus {
                let job = waiting.remove(i);
                record.available_ncpus -= ncpus;
                record.recv_jobs.push(job);
                placed += 1;
            }
        }
    }

    placed
}

/// Bring every queue to `target` or `target + 1` waiting jobs.
fn equalize(records: &mut [QueueRecord], target: usize) {
    let mut pool = VecDeque::new();
    let mut donated = vec![0usize; records.len()];

    // Donors keep their smallest jobs and give up the rest.
    for (i, record) in records.iter_mut().enumerate() {
        let keep = record.queued_count.min(target);
        donated[i] = record.queued_count - keep;
        pool.extend(record.waiting_jobs[keep..].iter().cloned());
        record
            .recv_jobs
            .extend(record.waiting_jobs[..keep].iter().cloned());
    }

    for record in records.iter_mut() {
        let shortfall = target.saturating_sub(record.queued_count);
        let take = shortfall.min(pool.len());
        record.recv_jobs.extend(pool.drain(..take));
    }

    if pool.is_empty() {
        return;
    }

    // Largest donors first; stable sort keeps configuration order on ties.
    let mut order: Vec<usize> = (0..records.len()).collect();
    order.sort_by(|a, b| donated[*b].cmp(&donated[*a]));

    for (job, &i) in pool.into_iter().zip(order.iter().cycle()) {
        records[i].recv_jobs.push(job);
    }
}
