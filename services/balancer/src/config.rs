//! Configuration for the balancing daemon.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};

use crate::tools::ToolPaths;

/// qbald - periodically balances a user's queued jobs across PBS queues.
#[derive(Debug, Parser)]
#[command(name = "qbald")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// User whose jobs to balance. Defaults to the invoking user.
    #[arg(short, long, env = "QBAL_USER")]
    pub user: Option<String>,

    /// Queue to balance across. Repeat for each queue (-q q1 -q q2).
    #[arg(short = 'q', long = "queue", required = true)]
    pub queues: Vec<String>,

    /// Seconds between balancing cycles.
    #[arg(
        short = 't',
        long,
        env = "QBAL_INTERVAL",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval: u64,

    /// Scheduling strategy. Only `balance` is implemented.
    #[arg(short, long, env = "QBAL_SCHEDULER", default_value = "balance")]
    pub scheduler: String,

    /// Log level.
    #[arg(short = 'l', long = "log", env = "QBAL_LOG", value_enum, default_value_t = LogLevel::Info)]
    pub log: LogLevel,

    /// Emit JSON log lines instead of compact text.
    #[arg(long, env = "QBAL_LOG_JSON")]
    pub log_json: bool,

    /// Log intended moves without running qmove.
    #[arg(long, env = "QBAL_DRY_RUN")]
    pub dry_run: bool,

    /// Run a single cycle and exit.
    #[arg(long)]
    pub once: bool,

    /// Path to pbsnodes (default: search PATH).
    #[arg(long, env = "QBAL_PBSNODES")]
    pub pbsnodes: Option<PathBuf>,

    /// Path to qstat (default: search PATH).
    #[arg(long, env = "QBAL_QSTAT")]
    pub qstat: Option<PathBuf>,

    /// Path to qmove (default: search PATH).
    #[arg(long, env = "QBAL_QMOVE")]
    pub qmove: Option<PathBuf>,
}

/// Log verbosity accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    /// Only critical failures. These are logged at ERROR level.
    Critical,
}

impl LogLevel {
    /// `EnvFilter` directive for this level.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

/// Job distribution strategy selected at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Balance,
    /// Any name without an implementation; stops the daemon at dispatch.
    Unsupported(String),
}

impl Strategy {
    pub fn from_name(name: &str) -> Self {
        match name {
            "balance" => Strategy::Balance,
            other => Strategy::Unsupported(other.to_string()),
        }
    }
}

/// Daemon configuration, read-only after startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Owner prefix used to select jobs.
    pub user: String,

    /// Queues to balance, de-duplicated in the order given.
    pub queues: Vec<String>,

    /// Pause between cycles.
    pub interval: Duration,

    pub strategy: Strategy,

    pub log_level: LogLevel,

    pub log_json: bool,

    /// Never run qmove, only log.
    pub dry_run: bool,

    /// Stop after the first cycle.
    pub once: bool,

    /// Operator-supplied tool locations.
    pub tool_paths: ToolPaths,
}

impl Cli {
    /// Validate the parsed arguments and build the daemon configuration.
    pub fn into_config(self) -> Result<Config> {
        let user = match self.user.filter(|u| !u.trim().is_empty()) {
            Some(user) => user,
            None => current_user()?,
        };

        let mut queues: Vec<String> = Vec::with_capacity(self.queues.len());
        for queue in self.queues {
            let queue = queue.trim().to_string();
            if !queue.is_empty() && !queues.contains(&queue) {
                queues.push(queue);
            }
        }
        if queues.is_empty() {
            bail!("at least one non-empty queue name is required");
        }

        Ok(Config {
            user,
            queues,
            interval: Duration::from_secs(self.interval),
            strategy: Strategy::from_name(&self.scheduler),
            log_level: self.log,
            log_json: self.log_json,
            dry_run: self.dry_run,
            once: self.once,
            tool_paths: ToolPaths {
                pbsnodes: self.pbsnodes,
                qstat: self.qstat,
                qmove: self.qmove,
            },
        })
    }
}

/// Name of the invoking user from the environment.
fn current_user() -> Result<String> {
    ["USER", "LOGNAME", "USERNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|name| !name.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("cannot determine the current user; pass --user"))
}
