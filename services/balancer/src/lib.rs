//! qbal balancing daemon
//!
//! Spreads one user's queued PBS jobs across a set of queues so that none
//! sits idle while another holds a backlog, and moves as few jobs as
//! possible doing it.
//!
//! ## Architecture
//!
//! - **Tools**: resolves and runs `pbsnodes`, `qstat` and `qmove`
//! - **Capacity / Jobs**: collectors that turn tool JSON into snapshots
//! - **Balance**: computes the target job distribution per queue
//! - **Minimize**: picks which jobs fill which slots with fewest moves
//! - **Mover**: issues `qmove` per job, or logs it in dry-run mode
//! - **Daemon**: the periodic control loop

pub mod balance;
pub mod capacity;
pub mod config;
pub mod daemon;
pub mod jobs;
pub mod logging;
pub mod minimize;
pub mod mover;
pub mod tools;

pub use balance::{balance, BalancePlan, QueueRecord};
pub use capacity::{collect_capacity, QueueCapacity};
pub use config::{Cli, Config, LogLevel, Strategy};
pub use daemon::{Daemon, Dispatch, Exit};
pub use jobs::{collect_jobs, Job, JobState};
pub use minimize::{minimize_moves, Placement};
pub use mover::{move_jobs_to_queue, MoveReport};
pub use tools::{PbsTools, ProcessRunner, ScriptedRunner, Tool, ToolError, ToolOutput, ToolRunner};
