//! Balancing control loop.
//!
//! Each cycle collects queue capacity and the user's jobs, dispatches on the
//! configured strategy and, for `balance`, computes and executes the minimal
//! set of moves. Cycles are separated by a fixed sleep; an interrupt is only
//! observed while sleeping so a cycle is never cut short.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::balance::balance;
use crate::capacity::{collect_capacity, QueueCapacity};
use crate::config::{Config, Strategy};
use crate::jobs::{collect_jobs, Job};
use crate::minimize::minimize_moves;
use crate::mover::{move_jobs_to_queue, MoveReport};
use crate::tools::{PbsTools, ToolRunner};

/// What the loop should do after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Continue,
    Stop,
}

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Shutdown was requested while sleeping.
    Interrupted,
    /// The configured strategy cannot run.
    Stopped,
    /// `--once` finished its cycle.
    Finished,
}

/// The balancing daemon.
pub struct Daemon {
    config: Config,
    tools: PbsTools,
    runner: Arc<dyn ToolRunner>,
}

impl Daemon {
    pub fn new(config: Config, tools: PbsTools, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            config,
            tools,
            runner,
        }
    }

    /// Run cycles until shutdown, strategy stop, or a critical error.
    ///
    /// A critical error is logged here and returned.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<Exit> {
        info!(
            user = %self.config.user,
            queues = %self.config.queues.join(", "),
            interval_secs = self.config.interval.as_secs(),
            dry_run = self.config.dry_run,
            "starting balancing loop"
        );

        let mut cycle: u64 = 0;
        loop {
            cycle += 1;
            debug!(cycle, "starting cycle");

            match self.run_cycle().await {
                Ok(Dispatch::Continue) => {}
                Ok(Dispatch::Stop) => return Ok(Exit::Stopped),
                Err(e) => {
                    error!(critical = true, cycle, error = %format!("{e:#}"), "balancing cycle failed");
                    return Err(e);
                }
            }

            if self.config.once {
                info!("single cycle complete");
                return Ok(Exit::Finished);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = shutdown_requested(&mut shutdown) => {
                    info!("interrupted, stopping balancing loop");
                    return Ok(Exit::Interrupted);
                }
            }
        }
    }

    /// One collect, dispatch and move cycle.
    pub async fn run_cycle(&self) -> Result<Dispatch> {
        let runner = self.runner.as_ref();
        let capacity = collect_capacity(runner, &self.tools, &self.config.queues).await;
        let jobs = collect_jobs(runner, &self.tools, &self.config.user).await;

        match &self.config.strategy {
            Strategy::Balance => {
                self.balance_and_move(&capacity, &jobs).await?;
                Ok(Dispatch::Continue)
            }
            Strategy::Unsupported(name) => {
                warn!(scheduler = %name, "unsupported scheduler, stopping");
                Ok(Dispatch::Stop)
            }
        }
    }

    async fn balance_and_move(
        &self,
        capacity: &HashMap<String, QueueCapacity>,
        jobs: &[Job],
    ) -> Result<MoveReport> {
        let plan = balance(&self.config.queues, capacity, jobs);
        let placement = minimize_moves(&plan.records).context("minimizing job moves")?;

        let moves = placement.moves_by_queue();
        if moves.is_empty() {
            info!("no need for moving");
            return Ok(MoveReport::default());
        }

        let mut report = MoveReport::default();
        for (dest, batch) in moves {
            info!(queue = dest, count = batch.len(), "moving jobs to queue");
            let result = move_jobs_to_queue(
                self.runner.as_ref(),
                &self.tools,
                &batch,
                dest,
                self.config.dry_run,
            )
            .await;
            report.merge(result);
        }

        info!(
            moved = report.moved,
            failed = report.failed,
            skipped = report.skipped,
            "moves finished"
        );
        Ok(report)
    }
}

/// Resolve once the shutdown flag is set. Never resolves if the sender is
/// gone without setting it.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
