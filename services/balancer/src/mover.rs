//! Job mover.

use tracing::{error, info};

use crate::jobs::Job;
use crate::tools::{PbsTools, Tool, ToolRunner};

/// Outcome counts for a batch of moves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveReport {
    /// `qmove` succeeded.
    pub moved: usize,
    /// `qmove` could not be started or exited non-zero.
    pub failed: usize,
    /// Dry run: logged but not executed.
    pub skipped: usize,
}

impl MoveReport {
    pub fn merge(&mut self, other: MoveReport) {
        self.moved += other.moved;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }

    pub fn total(&self) -> usize {
        self.moved + self.failed + self.skipped
    }
}

/// Move each job to `dest` with one `qmove` call per job.
///
/// Nothing is executed when `dry_run` is set or `qmove` was not found; the
/// command that would have run is logged instead. A failed move is logged
/// and the batch continues.
pub async fn move_jobs_to_queue(
    runner: &dyn ToolRunner,
    tools: &PbsTools,
    jobs: &[&Job],
    dest: &str,
    dry_run: bool,
) -> MoveReport {
    let mut report = MoveReport::default();
    let qmove = tools.path(Tool::Qmove).filter(|_| !dry_run);

    for job in jobs {
        let args = [dest, job.id.as_str()];

        let Some(qmove) = qmove else {
            info!(command = %format!("{} {}", Tool::Qmove, args.join(" ")), "dry run");
            report.skipped += 1;
            continue;
        };

        match runner.run(qmove, &args).await {
            Ok(output) if output.is_success() => {
                info!(job_id = %job.id, from = ?job.queue, to = dest, "moved job");
                report.moved += 1;
            }
            Ok(output) => {
                error!(
                    job_id = %job.id,
                    status = ?output.status,
                    stdout = %output.stdout.trim(),
                    stderr = %output.stderr.trim(),
                    "failed to move job"
                );
                report.failed += 1;
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "failed to run qmove");
                report.failed += 1;
            }
        }
    }

    report
}
