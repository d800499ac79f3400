//! Job state collection from `qstat`.

use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::tools::{lenient_count, query_json, PbsTools, Tool, ToolError, ToolRunner};

/// Arguments for a full JSON job listing.
pub const QSTAT_ARGS: &[&str] = &["-f", "-F", "json"];

/// Scheduler state of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// `Q`: waiting to be scheduled.
    Queued,
    /// `R`: running.
    Running,
    /// Any other PBS state code (held, exiting, ...).
    Other(String),
}

impl JobState {
    pub fn from_code(code: &str) -> Self {
        match code {
            "Q" => JobState::Queued,
            "R" => JobState::Running,
            other => JobState::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            JobState::Queued => "Q",
            JobState::Running => "R",
            JobState::Other(code) => code,
        }
    }
}

/// Snapshot of one job as reported by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub queue: Option<String>,
    pub state: JobState,
    pub ncpus: u32,
}

impl Job {
    pub fn is_queued(&self) -> bool {
        self.state == JobState::Queued
    }

    pub fn is_running(&self) -> bool {
        self.state == JobState::Running
    }

    /// True if the job currently sits in `queue`.
    pub fn in_queue(&self, queue: &str) -> bool {
        self.queue.as_deref() == Some(queue)
    }
}

#[derive(Debug, Deserialize)]
struct JobListing {
    #[serde(rename = "Jobs", default)]
    jobs: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawJob {
    #[serde(rename = "Job_Name")]
    name: Option<String>,
    #[serde(rename = "Job_Owner")]
    owner: Option<String>,
    queue: Option<String>,
    job_state: Option<String>,
    #[serde(rename = "Resource_List")]
    resources: Option<RawResources>,
}

#[derive(Debug, Default, Deserialize)]
struct RawResources {
    #[serde(default, deserialize_with = "lenient_count")]
    ncpus: Option<i64>,
}

impl RawJob {
    fn into_job(self, id: String) -> Job {
        let ncpus = self
            .resources
            .and_then(|r| r.ncpus)
            .and_then(|n| u32::try_from(n).ok())
            .filter(|&n| n >= 1)
            .unwrap_or(1);

        Job {
            id,
            name: self.name.unwrap_or_else(|| "unknown".to_string()),
            owner: self.owner.unwrap_or_else(|| "unknown".to_string()),
            queue: self.queue,
            state: JobState::from_code(self.job_state.as_deref().unwrap_or("?")),
            ncpus,
        }
    }
}

/// Fetch the jobs owned by `user`, in the order `qstat` listed them.
///
/// Owner strings carry a `@host` suffix, so a job is kept when its owner
/// starts with `user`. Every failure mode yields an empty list.
pub async fn collect_jobs(runner: &dyn ToolRunner, tools: &PbsTools, user: &str) -> Vec<Job> {
    let listing: JobListing = match query_json(runner, tools, Tool::Qstat, QSTAT_ARGS).await {
        Ok(listing) => listing,
        Err(ToolError::NotFound(tool)) => {
            info!(tool = %tool, "skipping job listing, tool not available");
            return Vec::new();
        }
        Err(ToolError::Failed { stderr, status, .. }) => {
            warn!(status = %status, stderr = %stderr, "qstat failed");
            return Vec::new();
        }
        Err(e) => {
            error!(error = %e, "failed to list jobs");
            return Vec::new();
        }
    };

    let jobs = jobs_for_user(listing, user);
    debug!(user, count = jobs.len(), "collected jobs");
    jobs
}

fn jobs_for_user(listing: JobListing, user: &str) -> Vec<Job> {
    listing
        .jobs
        .into_iter()
        .filter_map(|(id, value)| match serde_json::from_value::<RawJob>(value) {
            Ok(raw) => Some(raw.into_job(id)),
            Err(e) => {
                warn!(job_id = %id, error = %e, "skipping malformed job entry");
                None
            }
        })
        .filter(|job| job.owner.starts_with(user))
        .collect()
}
