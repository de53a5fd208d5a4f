use std::time::Duration;

use crate::error::{BuildFailure, RunFailure};

use super::{ExecutionResult, Status, TestCase, TestOutcome};

/// Accumulates per-test outcomes into an [`ExecutionResult`]
#[derive(Debug)]
pub(super) struct Tally {
    tests_total: u32,
    tests_passed: u32,
    slowest_ms: u64,
    last_output: String,
    first_failure: Option<String>,
    aborted: Option<String>,
}

impl Tally {
    pub(super) fn new(tests_total: usize) -> Self {
        Self {
            tests_total: u32::try_from(tests_total).unwrap_or(u32::MAX),
            tests_passed: 0,
            slowest_ms: 0,
            last_output: String::new(),
            first_failure: None,
            aborted: None,
        }
    }

    pub(super) fn record(&mut self, index: usize, case: &TestCase, outcome: TestOutcome) {
        if outcome.success {
            self.tests_passed += 1;
        } else if self.first_failure.is_none() {
            let mut diff = format!(
                "Test {} failed:\nInput: {}\nExpected: {}\nGot: {}",
                index + 1,
                case.input,
                case.expected_output,
                outcome.observed_output
            );
            if outcome.output_truncated {
                diff.push_str("\n(output exceeded the capture limit and was truncated)");
            }
            self.first_failure = Some(diff);
        }
        self.slowest_ms = self.slowest_ms.max(outcome.execution_time_ms);
        self.last_output = outcome.observed_output;
    }

    /// Marks the evaluation as a runtime error; later records are not expected
    pub(super) fn abort(&mut self, index: usize, failure: &RunFailure) {
        self.aborted = Some(format!("Test {}: {failure}", index + 1));
    }

    /// Result for a submission that did not build
    pub(super) fn compile_error(self, failure: &BuildFailure) -> ExecutionResult {
        ExecutionResult {
            status: Status::CompileError,
            output: String::new(),
            error_output: failure.to_string(),
            execution_time_ms: 0,
            memory_used_bytes: 0,
            tests_passed: 0,
            tests_total: self.tests_total,
            score: 0,
        }
    }

    /// Final result; `elapsed` covers the build and every test run
    pub(super) fn finish(self, elapsed: Duration) -> ExecutionResult {
        log::debug!(
            "{}/{} tests passed, slowest {}ms",
            self.tests_passed,
            self.tests_total,
            self.slowest_ms
        );

        let (status, score, error_output) = match self.aborted {
            Some(reason) => (Status::RuntimeError, 0, reason),
            None if self.tests_passed == self.tests_total => {
                (Status::Accepted, 100, String::new())
            }
            None => (
                Status::WrongAnswer,
                percent_score(self.tests_passed, self.tests_total),
                self.first_failure.unwrap_or_default(),
            ),
        };

        ExecutionResult {
            status,
            output: self.last_output,
            error_output,
            execution_time_ms: elapsed.as_millis() as u64,
            memory_used_bytes: 0,
            tests_passed: self.tests_passed,
            tests_total: self.tests_total,
            score,
        }
    }
}

/// `floor(passed * 100 / total)`, full marks for an empty test set
fn percent_score(passed: u32, total: u32) -> u8 {
    if total == 0 {
        return 100;
    }
    (u64::from(passed) * 100 / u64::from(total)) as u8
}
