use super::*;

impl Sandbox {
    /// Runs all test cases in order against the compiled artifact
    ///
    /// The first run failure aborts the remaining tests.
    pub(super) async fn run_test_cases(
        &self,
        artifact: &Path,
        workspace: &Workspace,
        test_cases: &[TestCase],
        deadline: Duration,
        tally: &mut Tally,
    ) {
        for (idx, case) in test_cases.iter().enumerate() {
            match self
                .run_single_test_case(artifact, workspace.path(), case, deadline)
                .await
            {
                Ok(outcome) => {
                    log::debug!(
                        "Test {} {} in {}ms",
                        idx + 1,
                        if outcome.success { "passed" } else { "failed" },
                        outcome.execution_time_ms
                    );
                    tally.record(idx, case, outcome);
                }
                Err(failure) => {
                    log::info!("Test {} aborted the evaluation: {failure}", idx + 1);
                    tally.abort(idx, &failure);
                    break;
                }
            }
        }
    }

    /// Runs the artifact once with the test's input and judges its output
    ///
    /// A non-zero exit status does not fail the test by itself, only the
    /// output comparison does.
    pub(super) async fn run_single_test_case(
        &self,
        artifact: &Path,
        work_dir: &Path,
        case: &TestCase,
        deadline: Duration,
    ) -> std::result::Result<TestOutcome, RunFailure> {
        let mut cmd = Command::new(artifact);
        cmd.current_dir(work_dir);

        let output = run_with_deadline(
            cmd,
            Some(case.input.as_bytes()),
            deadline,
            self.config.max_output_bytes,
        )
        .await
        .map_err(|e| match e {
            ProcessError::TimedOut(_) => RunFailure::TimedOut(deadline),
            ProcessError::Spawn(e) => RunFailure::Launch(e),
            ProcessError::Io(e) => RunFailure::Io(e),
        })?;

        if !output.status.success() {
            log::debug!("Program exited with {}", output.status);
        }

        let observed_output = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(TestOutcome {
            success: outputs_match(&observed_output, &case.expected_output),
            observed_output,
            error_output: String::from_utf8_lossy(&output.stderr).into_owned(),
            execution_time_ms: output.elapsed.as_millis() as u64,
            output_truncated: output.stdout_truncated,
        })
    }
}

/// Compares program output with the expected output
///
/// Leading and trailing whitespace is ignored on both sides; whitespace
/// inside the output is significant.
pub fn outputs_match(observed: &str, expected: &str) -> bool {
    observed.trim() == expected.trim()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    use crate::config::{SandboxConfig, ToolchainConfig};

    fn case(input: &str, expected: &str) -> TestCase {
        TestCase {
            input: input.to_string(),
            expected_output: expected.to_string(),
            name: None,
        }
    }

    /// A sandbox plus an executable shell script standing in for a build
    fn setup(script: &str) -> (Sandbox, Workspace, PathBuf, tempfile::TempDir) {
        let root = tempfile::tempdir().unwrap();
        let config = SandboxConfig {
            workspace_root: root.path().to_path_buf(),
            ..SandboxConfig::default()
        };
        let sandbox = Sandbox::build(config, ToolchainConfig::default()).unwrap();
        let workspace = Workspace::create(root.path()).unwrap();
        let source = workspace
            .write_file("program.sh", &format!("#!/bin/sh\n{script}\n"))
            .unwrap();

        // Copied by a child so no descriptor to the executable stays open in
        // this process while other tests fork
        let artifact = workspace.path().join("program");
        let status = std::process::Command::new("cp")
            .arg(&source)
            .arg(&artifact)
            .status()
            .unwrap();
        assert!(status.success());
        std::fs::set_permissions(&artifact, std::fs::Permissions::from_mode(0o755)).unwrap();
        (sandbox, workspace, artifact, root)
    }

    #[test]
    fn comparison_ignores_surrounding_whitespace_only() {
        assert!(outputs_match("3\n", " 3 "));
        assert!(outputs_match("\n\thello world\n\n", "hello world"));
        assert!(!outputs_match("34", "3 4"));
        assert!(!outputs_match("a\nb", "a b"));
        assert!(outputs_match("", "  \n"));
    }

    #[tokio::test]
    async fn matching_output_passes() {
        let (sandbox, workspace, artifact, _root) = setup("cat");
        let outcome = sandbox
            .run_single_test_case(&artifact, workspace.path(), &case("5\n", "5"), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.observed_output, "5");
        assert!(outcome.error_output.is_empty());
        assert!(!outcome.output_truncated);
    }

    #[tokio::test]
    async fn mismatching_output_fails() {
        let (sandbox, workspace, artifact, _root) = setup("cat");
        let outcome = sandbox
            .run_single_test_case(&artifact, workspace.path(), &case("5", "6"), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.observed_output, "5");
    }

    #[tokio::test]
    async fn non_zero_exit_with_right_output_passes() {
        let (sandbox, workspace, artifact, _root) = setup("echo 42; echo boom >&2; exit 7");
        let outcome = sandbox
            .run_single_test_case(&artifact, workspace.path(), &case("", "42"), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.error_output, "boom\n");
    }

    #[tokio::test]
    async fn program_runs_inside_workspace() {
        let (sandbox, workspace, artifact, _root) = setup("test -f program.sh && echo inside");
        let outcome = sandbox
            .run_single_test_case(&artifact, workspace.path(), &case("", "inside"), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn endless_program_times_out() {
        let (sandbox, workspace, artifact, _root) = setup("while :; do :; done");
        let result = sandbox
            .run_single_test_case(&artifact, workspace.path(), &case("", ""), Duration::from_millis(300))
            .await;

        match result {
            Err(failure @ RunFailure::TimedOut(_)) => {
                assert!(failure.to_string().starts_with("execution time limit exceeded"));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_artifact_fails_to_launch() {
        let (sandbox, workspace, _artifact, _root) = setup("true");
        let result = sandbox
            .run_single_test_case(
                &workspace.path().join("missing"),
                workspace.path(),
                &case("", ""),
                Duration::from_secs(5),
            )
            .await;
        assert!(matches!(result, Err(RunFailure::Launch(_))));
    }

    #[tokio::test]
    async fn first_timeout_stops_the_remaining_tests() {
        // Sleeps forever on input "hang", echoes everything else
        let (sandbox, workspace, artifact, _root) =
            setup("read line; if [ \"$line\" = hang ]; then sleep 30; fi; echo \"$line\"");
        let cases = [case("1", "1"), case("hang", ""), case("3", "3")];
        let mut tally = Tally::new(cases.len());

        sandbox
            .run_test_cases(&artifact, &workspace, &cases, Duration::from_millis(500), &mut tally)
            .await;
        let result = tally.finish(Duration::from_millis(1));

        assert_eq!(result.status, Status::RuntimeError);
        assert_eq!(result.tests_passed, 1);
        assert!(result.error_output.contains("Test 2"));
    }
}
