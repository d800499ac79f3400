//! End-to-end checks of the balance and minimize passes on in-memory
//! snapshots.

use std::collections::HashMap;

use proptest::prelude::*;
use qbal_balancer::{balance, minimize_moves, Job, JobState, QueueCapacity};

fn queued(id: &str, queue: &str, ncpus: u32) -> Job {
    Job {
        id: id.to_string(),
        name: format!("job-{id}"),
        owner: "alice@login01".to_string(),
        queue: Some(queue.to_string()),
        state: JobState::Queued,
        ncpus,
    }
}

fn capacity(entries: &[(&str, i64)]) -> HashMap<String, QueueCapacity> {
    entries
        .iter()
        .map(|(name, available)| {
            (
                name.to_string(),
                QueueCapacity {
                    name: name.to_string(),
                    total_cpus: 32,
                    available_cpus: *available,
                },
            )
        })
        .collect()
}

fn queues(names: &[&str]) -> Vec<String> {
    names.iter().map(|q| q.to_string()).collect()
}

/// Apply a placement: every job ends up tagged with its assigned queue.
fn apply(jobs: &[Job], moves: &[(String, String)]) -> Vec<Job> {
    jobs.iter()
        .map(|job| {
            let mut job = job.clone();
            if let Some((_, dest)) = moves.iter().find(|(id, _)| *id == job.id) {
                job.queue = Some(dest.clone());
            }
            job
        })
        .collect()
}

fn planned_moves(
    names: &[String],
    capacity: &HashMap<String, QueueCapacity>,
    jobs: &[Job],
) -> Vec<(String, String)> {
    let plan = balance(names, capacity, jobs);
    let placement = minimize_moves(&plan.records).unwrap();
    placement
        .moves_by_queue()
        .into_iter()
        .flat_map(|(dest, batch)| {
            batch
                .into_iter()
                .map(move |job| (job.id.clone(), dest.to_string()))
        })
        .collect()
}

#[test]
fn first_fit_absorbs_jobs_in_their_own_queue() {
    let names = queues(&["A", "B"]);
    let jobs = vec![queued("1", "A", 2), queued("2", "A", 2), queued("3", "A", 2)];
    let capacity = capacity(&[("A", 8), ("B", 0)]);

    let plan = balance(&names, &capacity, &jobs);
    assert_eq!(plan.first_fit, 3);
    assert_eq!(plan.records[0].recv_jobs.len(), 3);
    assert!(plan.records[1].recv_jobs.is_empty());

    assert!(planned_moves(&names, &capacity, &jobs).is_empty());
}

#[test]
fn saturated_queues_split_evenly_with_one_move() {
    let names = queues(&["A", "B"]);
    let jobs = vec![
        queued("1", "A", 1),
        queued("2", "A", 1),
        queued("3", "A", 1),
        queued("4", "B", 1),
    ];
    let capacity = capacity(&[("A", 0), ("B", 0)]);

    let plan = balance(&names, &capacity, &jobs);
    assert_eq!(plan.target, 2);

    let moves = planned_moves(&names, &capacity, &jobs);
    assert_eq!(moves.len(), 1);
    assert_eq!(moves[0].1, "B");
    assert!(["1", "2", "3"].contains(&moves[0].0.as_str()));
}

#[test]
fn second_cycle_after_moves_is_quiet() {
    let names = queues(&["A", "B", "C"]);
    let jobs: Vec<Job> = (0..7).map(|i| queued(&i.to_string(), "A", 1 + i % 3)).collect();
    let capacity = capacity(&[("A", 0), ("B", 0), ("C", 0)]);

    let moves = planned_moves(&names, &capacity, &jobs);
    assert!(!moves.is_empty());

    let moved = apply(&jobs, &moves);
    assert!(planned_moves(&names, &capacity, &moved).is_empty());
}

fn arb_jobs(queue_count: usize) -> impl Strategy<Value = Vec<Job>> {
    prop::collection::vec((0..queue_count + 1, 1u32..8, prop::bool::weighted(0.8)), 0..24).prop_map(
        move |specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (q, ncpus, is_queued))| {
                    // Index `queue_count` stands for a queue outside the set.
                    let queue = if q == queue_count {
                        "elsewhere".to_string()
                    } else {
                        format!("q{q}")
                    };
                    let mut job = queued(&i.to_string(), &queue, ncpus);
                    if !is_queued {
                        job.state = JobState::Running;
                    }
                    job
                })
                .collect()
        },
    )
}

fn names_for(count: usize) -> Vec<String> {
    (0..count).map(|q| format!("q{q}")).collect()
}

proptest! {
    #[test]
    fn prop_no_job_created_or_lost(
        jobs in arb_jobs(3),
        free in prop::collection::vec(-4i64..12, 3),
    ) {
        let names = names_for(3);
        let capacity: HashMap<String, QueueCapacity> = names
            .iter()
            .zip(&free)
            .map(|(n, f)| (n.clone(), QueueCapacity { name: n.clone(), total_cpus: 16, available_cpus: *f }))
            .collect();

        let plan = balance(&names, &capacity, &jobs);
        prop_assert_eq!(plan.received(), plan.considered);

        let mut ids: Vec<&str> = plan
            .records
            .iter()
            .flat_map(|r| r.recv_jobs.iter().map(|j| j.id.as_str()))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        prop_assert_eq!(ids.len(), plan.considered);

        let placement = minimize_moves(&plan.records).unwrap();
        for (record, (name, assigned)) in plan.records.iter().zip(placement.queues()) {
            prop_assert_eq!(record.name.as_str(), name);
            prop_assert_eq!(record.recv_jobs.len(), assigned.len());
        }
    }

    #[test]
    fn prop_first_fit_respects_free_cpus(
        jobs in arb_jobs(2),
        free in prop::collection::vec(-2i64..10, 2),
    ) {
        let names = names_for(2);
        let capacity: HashMap<String, QueueCapacity> = names
            .iter()
            .zip(&free)
            .map(|(n, f)| (n.clone(), QueueCapacity { name: n.clone(), total_cpus: 16, available_cpus: *f }))
            .collect();

        let plan = balance(&names, &capacity, &jobs);
        for (record, start) in plan.records.iter().zip(&free) {
            // Whatever first-fit took came out of this queue's free CPUs.
            prop_assert!(record.available_ncpus <= *start);
            if *start <= 0 {
                prop_assert_eq!(record.available_ncpus, *start);
            } else {
                prop_assert!(record.available_ncpus >= 0);
            }
        }
    }

    #[test]
    fn prop_saturated_counts_differ_by_at_most_one(jobs in arb_jobs(4)) {
        let names = names_for(4);
        let plan = balance(&names, &HashMap::new(), &jobs);
        let counts: Vec<usize> = plan.records.iter().map(|r| r.recv_jobs.len()).collect();
        let max = counts.iter().copied().max().unwrap_or(0);
        let min = counts.iter().copied().min().unwrap_or(0);
        prop_assert!(max - min <= 1, "counts {:?}", counts);
    }

    #[test]
    fn prop_balanced_state_is_stable(jobs in arb_jobs(3)) {
        let names = names_for(3);
        let capacity = HashMap::new();
        let moves = planned_moves(&names, &capacity, &jobs);
        let moved = apply(&jobs, &moves);
        prop_assert!(planned_moves(&names, &capacity, &moved).is_empty());
    }
}
