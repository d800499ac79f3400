//! PBS command-line tools.
//!
//! The daemon talks to the scheduler exclusively through three external
//! tools:
//! - `pbsnodes -a -F json` for node/queue topology
//! - `qstat -f -F json` for the job listing
//! - `qmove <queue> <job_id>` to move a queued job
//!
//! Tool locations are resolved once at startup into [`PbsTools`] and passed
//! explicitly to every collector and to the mover. Execution goes through the
//! [`ToolRunner`] trait so tests can script tool output.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};

use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, error, warn};

/// A PBS tool the daemon knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Pbsnodes,
    Qstat,
    Qmove,
}

impl Tool {
    /// Executable name searched on `PATH`.
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Pbsnodes => "pbsnodes",
            Tool::Qstat => "qstat",
            Tool::Qmove => "qmove",
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Explicit tool paths supplied by the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolPaths {
    pub pbsnodes: Option<PathBuf>,
    pub qstat: Option<PathBuf>,
    pub qmove: Option<PathBuf>,
}

/// Resolved tool locations. `None` means the tool is unavailable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PbsTools {
    pub pbsnodes: Option<PathBuf>,
    pub qstat: Option<PathBuf>,
    pub qmove: Option<PathBuf>,
}

impl PbsTools {
    /// Resolve every tool: an explicit path wins, otherwise search `PATH`.
    pub fn resolve(paths: &ToolPaths) -> Self {
        let pick = |explicit: &Option<PathBuf>, tool: Tool| match explicit {
            Some(path) => Some(path.clone()),
            None => find_on_path(tool.name()),
        };

        Self {
            pbsnodes: pick(&paths.pbsnodes, Tool::Pbsnodes),
            qstat: pick(&paths.qstat, Tool::Qstat),
            qmove: pick(&paths.qmove, Tool::Qmove),
        }
    }

    pub fn path(&self, tool: Tool) -> Option<&Path> {
        match tool {
            Tool::Pbsnodes => self.pbsnodes.as_deref(),
            Tool::Qstat => self.qstat.as_deref(),
            Tool::Qmove => self.qmove.as_deref(),
        }
    }

    pub fn is_available(&self, tool: Tool) -> bool {
        self.path(tool).is_some()
    }

    /// Log every tool that could not be resolved.
    pub fn log_missing(&self) {
        if !self.is_available(Tool::Qstat) {
            warn!(tool = %Tool::Qstat, "tool not found, job listing disabled");
        }
        if !self.is_available(Tool::Qmove) {
            warn!(tool = %Tool::Qmove, "tool not found, moves will only be logged");
        }
        if !self.is_available(Tool::Pbsnodes) {
            error!(tool = %Tool::Pbsnodes, "tool not found, queue capacity unknown");
        }
    }
}

/// Search `PATH` for an executable file called `name`.
pub fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Captured result of a finished tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Some(0)
    }

    fn status_text(&self) -> String {
        match self.status {
            Some(code) => code.to_string(),
            None => "signal".to_string(),
        }
    }
}

/// Tool errors. Callers absorb these into empty results.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool was not resolved at startup.
    #[error("{0} not available")]
    NotFound(Tool),

    /// The process could not be started.
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: Tool,
        #[source]
        source: std::io::Error,
    },

    /// The tool exited with a non-zero status.
    #[error("{tool} exited with status {status}: {stderr}")]
    Failed {
        tool: Tool,
        status: String,
        stdout: String,
        stderr: String,
    },

    /// The tool output was not valid JSON even after the numeric fixup.
    #[error("failed to parse {tool} output: {source}")]
    Parse {
        tool: Tool,
        #[source]
        source: serde_json::Error,
    },
}

/// Executes external tools.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run `program` with `args` to completion and capture its output.
    async fn run(&self, program: &Path, args: &[&str]) -> std::io::Result<ToolOutput>;
}

/// Runs tools as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, program: &Path, args: &[&str]) -> std::io::Result<ToolOutput> {
        let output = tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(ToolOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run a query tool and decode its JSON output.
pub async fn query_json<T: DeserializeOwned>(
    runner: &dyn ToolRunner,
    tools: &PbsTools,
    tool: Tool,
    args: &[&str],
) -> Result<T, ToolError> {
    let path = tools.path(tool).ok_or(ToolError::NotFound(tool))?;
    debug!(tool = %tool, path = %path.display(), args = ?args, "running tool");

    let output = runner
        .run(path, args)
        .await
        .map_err(|source| ToolError::Spawn { tool, source })?;

    if !output.is_success() {
        return Err(ToolError::Failed {
            tool,
            status: output.status_text(),
            stdout: output.stdout,
            stderr: output.stderr.trim().to_string(),
        });
    }

    serde_json::from_str(&fix_numeric_literals(&output.stdout))
        .map_err(|source| ToolError::Parse { tool, source })
}

static BARE_FRACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\[:,])(\s*)(-?)(\.\d+)").expect("valid regex"));

/// Insert the missing leading zero in numeric literals such as `.5` or
/// `-.25` that follow `[`, `:` or `,`.
///
/// PBS emits these in its JSON output; they are rejected by strict parsers.
/// Valid JSON is returned unchanged without allocating.
pub fn fix_numeric_literals(text: &str) -> Cow<'_, str> {
    BARE_FRACTION.replace_all(text, "${1}${2}${3}0${4}")
}

/// Deserialize a CPU count that PBS may report as an integer, a float, or a
/// numeric string. Anything else becomes `None`.
pub(crate) fn lenient_count<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }))
}

/// Scripted [`ToolRunner`] for tests and local development.
///
/// Responses are keyed by the program's file name (`qstat`, `qmove`, ...).
/// Programs without a response succeed with empty output. Every invocation
/// is recorded.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: HashMap<String, ToolOutput>,
    failing_args: HashSet<String>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to every call of `program` with `output`.
    pub fn respond(mut self, program: &str, output: ToolOutput) -> Self {
        self.responses.insert(program.to_string(), output);
        self
    }

    /// Fail any invocation that carries `arg` (for example a job id).
    pub fn fail_on_arg(mut self, arg: &str) -> Self {
        self.failing_args.insert(arg.to_string());
        self
    }

    /// Recorded invocations: program file name followed by its arguments.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Recorded invocations of a single program.
    pub fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|call| call.first().map(String::as_str) == Some(program))
            .collect()
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, program: &Path, args: &[&str]) -> std::io::Result<ToolOutput> {
        let name = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut call = vec![name.clone()];
        call.extend(args.iter().map(|a| a.to_string()));
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);

        if args.iter().any(|a| self.failing_args.contains(*a)) {
            return Ok(ToolOutput::failure(1, format!("{name}: scripted failure")));
        }

        Ok(self
            .responses
            .get(&name)
            .cloned()
            .unwrap_or_else(|| ToolOutput::success("")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(r#"{"a":.5}"#, r#"{"a":0.5}"#)]
    #[case(r#"{"a": -.25}"#, r#"{"a": -0.25}"#)]
    #[case(r#"[.1,.2]"#, r#"[0.1,0.2]"#)]
    #[case(r#"{"a":1,"b":-.5}"#, r#"{"a":1,"b":-0.5}"#)]
    fn test_fix_numeric_literals_repairs(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(fix_numeric_literals(input), expected);
        assert!(serde_json::from_str::<serde_json::Value>(&fix_numeric_literals(input)).is_ok());
    }

    #[rstest]
    #[case(r#"{"a":0.5,"b":[1,2.25],"c":"x.5"}"#)]
    #[case(r#"{"version":"1.2.3"}"#)]
    #[case("")]
    fn test_fix_numeric_literals_noop_on_valid(#[case] input: &str) {
        let fixed = fix_numeric_literals(input);
        assert!(matches!(fixed, Cow::Borrowed(_)));
        assert_eq!(fixed, input);
    }

    #[test]
    fn test_lenient_count() {
        #[derive(Deserialize)]
        struct Probe {
            #[serde(default, deserialize_with = "lenient_count")]
            n: Option<i64>,
        }

        let parse = |s: &str| serde_json::from_str::<Probe>(s).unwrap().n;
        assert_eq!(parse(r#"{"n":4}"#), Some(4));
        assert_eq!(parse(r#"{"n":"8"}"#), Some(8));
        assert_eq!(parse(r#"{"n":2.0}"#), Some(2));
        assert_eq!(parse(r#"{"n":"many"}"#), None);
        assert_eq!(parse(r#"{}"#), None);
    }

    #[test]
    fn test_resolve_prefers_explicit_path() {
        let paths = ToolPaths {
            qmove: Some(PathBuf::from("/opt/pbs/bin/qmove")),
            ..Default::default()
        };
        let tools = PbsTools::resolve(&paths);
        assert_eq!(tools.path(Tool::Qmove), Some(Path::new("/opt/pbs/bin/qmove")));
    }

    #[test]
    fn test_find_on_path_misses_unknown_tool() {
        assert!(find_on_path("qbal-no-such-tool-on-any-path").is_none());
    }

    #[tokio::test]
    async fn test_query_json_reports_missing_tool() {
        let runner = ScriptedRunner::new();
        let err = query_json::<serde_json::Value>(&runner, &PbsTools::default(), Tool::Qstat, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(Tool::Qstat)));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_query_json_reports_failure_and_parse_errors() {
        let tools = PbsTools {
            qstat: Some(PathBuf::from("/usr/bin/qstat")),
            pbsnodes: Some(PathBuf::from("/usr/bin/pbsnodes")),
            qmove: None,
        };
        let runner = ScriptedRunner::new()
            .respond("qstat", ToolOutput::failure(2, "qstat: server down\n"))
            .respond("pbsnodes", ToolOutput::success("not json"));

        let err = query_json::<serde_json::Value>(&runner, &tools, Tool::Qstat, &["-f"])
            .await
            .unwrap_err();
        match err {
            ToolError::Failed { status, stderr, .. } => {
                assert_eq!(status, "2");
                assert_eq!(stderr, "qstat: server down");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = query_json::<serde_json::Value>(&runner, &tools, Tool::Pbsnodes, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Parse { tool: Tool::Pbsnodes, .. }));
        assert_eq!(runner.calls_to("qstat"), vec![vec!["qstat", "-f"]]);
    }
}
