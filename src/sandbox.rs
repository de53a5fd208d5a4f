mod compile;
pub mod prepare;
pub mod process;
mod testing;
mod verdict;
pub mod workspace;

pub use compile::BuildOutcome;
pub use testing::outputs_match;
pub use workspace::Workspace;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::config::{ProblemConfig, SandboxConfig, ToolchainConfig};
use crate::error::{BuildFailure, Result, RunFailure, SandboxError};
use process::{ProcessError, run_with_deadline};
use verdict::Tally;

/// One input/expected-output pair
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub input: String,
    #[serde(rename = "expected", alias = "expected_output")]
    pub expected_output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Final classification of an evaluation
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Accepted,
    WrongAnswer,
    CompileError,
    RuntimeError,
}

/// Result of running the artifact against one test case
#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub success: bool,
    /// Standard output with surrounding whitespace trimmed
    pub observed_output: String,
    pub error_output: String,
    pub execution_time_ms: u64,
    /// Standard output went past `max_output_bytes` and was cut off
    pub output_truncated: bool,
}

/// The value handed back to the caller for every evaluation that was not an
/// infrastructure failure
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub status: Status,
    pub output: String,
    #[serde(rename = "error")]
    pub error_output: String,
    #[serde(rename = "execution_time")]
    pub execution_time_ms: u64,
    /// Not measured, always zero
    #[serde(rename = "memory_used")]
    pub memory_used_bytes: u64,
    pub tests_passed: u32,
    pub tests_total: u32,
    pub score: u8,
}

/// Parses the JSON array of test cases stored with a problem
pub fn parse_test_cases(test_cases_json: &str) -> Result<Vec<TestCase>> {
    Ok(serde_json::from_str(test_cases_json)?)
}

/// Compiles and runs untrusted submissions against test cases
///
/// A `Sandbox` holds no per-evaluation state: every call to [`Sandbox::evaluate`]
/// gets its own [`Workspace`] under the configured root, so one instance can be
/// shared between concurrent workers.
#[derive(Debug)]
pub struct Sandbox {
    config: SandboxConfig,
    toolchain: ToolchainConfig,
}

impl Sandbox {
    /// Creates the sandbox and makes sure the workspace root exists
    pub fn build(config: SandboxConfig, toolchain: ToolchainConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.workspace_root).map_err(|source| {
            SandboxError::Workspace {
                path: config.workspace_root.clone(),
                source,
            }
        })?;

        log::info!(
            "Sandbox for {} initialized under {}",
            toolchain.name,
            config.workspace_root.display()
        );
        Ok(Self { config, toolchain })
    }

    pub fn workspace_root(&self) -> &Path {
        &self.config.workspace_root
    }

    /// Evaluates a submission against a problem
    ///
    /// Malformed test-case JSON is an infrastructure error, not a verdict.
    pub async fn evaluate(&self, code: &str, problem: &ProblemConfig) -> Result<ExecutionResult> {
        let test_cases = parse_test_cases(&problem.test_cases)?;
        self.execute_code(code, &test_cases, problem.time_limit).await
    }

    /// Prepares, builds and runs `code` against `test_cases` in order
    pub async fn execute_code(
        &self,
        code: &str,
        test_cases: &[TestCase],
        time_limit: i64,
    ) -> Result<ExecutionResult> {
        let deadline = self.submission_timeout(time_limit);
        let build_deadline = self
            .config
            .compile_time_limit
            .map_or(deadline, Duration::from);

        // Removed on every return path, including `?` and unwinding
        let workspace = Workspace::create(&self.config.workspace_root)?;
        let source = prepare::prepare_source(code);
        workspace.write_file(&self.toolchain.file_name, &source)?;
        log::debug!(
            "Workspace {} ready, shape {:?}",
            workspace.path().display(),
            prepare::classify(code)
        );

        let mut tally = Tally::new(test_cases.len());
        let start = Instant::now();

        let artifact = match self.compile_source_code(&workspace, build_deadline).await? {
            BuildOutcome::Built(artifact) => artifact,
            BuildOutcome::Failed(failure) => {
                log::info!("Build failed in {}: {failure}", workspace.path().display());
                return Ok(tally.compile_error(&failure));
            }
        };

        self.run_test_cases(&artifact, &workspace, test_cases, deadline, &mut tally)
            .await;

        Ok(tally.finish(start.elapsed()))
    }

    /// Per-test deadline: the problem's limit, the default when unset, never
    /// above the configured ceiling
    pub fn submission_timeout(&self, time_limit: i64) -> Duration {
        let requested = if time_limit <= 0 {
            Duration::from(self.config.default_time_limit)
        } else {
            Duration::from_secs(time_limit as u64)
        };
        requested.min(Duration::from(self.config.max_time_limit))
    }

    /// Removes workspaces left behind by a previous process
    pub fn sweep_stale_workspaces(&self, max_age: Duration) -> Result<usize> {
        workspace::sweep_stale(&self.config.workspace_root, max_age)
    }
}
