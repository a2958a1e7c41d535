use codebench_core::{ErrorKind, TestCase};

use crate::code_executor::SandboxExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestRunVerdict {
    pub passed: bool,
    pub error_kind: Option<ErrorKind>,
}

impl TestRunVerdict {
    pub const PASSED: Self = Self {
        passed: true,
        error_kind: None,
    };

    pub fn failed(kind: ErrorKind) -> Self {
        Self {
            passed: false,
            error_kind: Some(kind),
        }
    }
}

/// Outputs compare equal after trimming surrounding whitespace.
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    actual.trim() == expected.trim()
}

/// Run every test case in order, stopping at the first failure.
///
/// An empty test list passes.
pub async fn run_test_cases(
    executor: &SandboxExecutor,
    code: &str,
    tests: &[TestCase],
) -> TestRunVerdict {
    for (idx, test) in tests.iter().enumerate() {
        let output = executor.execute_one(code, &test.input).await;

        if let Some(kind) = output.error_kind.filter(|_| !output.success) {
            tracing::debug!("Test {} failed: {} ({:?})", idx, kind, output.duration);
            return TestRunVerdict::failed(kind);
        }

        if !outputs_match(&output.stdout, &test.expected_output) {
            tracing::debug!("Test {} wrong answer", idx);
            return TestRunVerdict::failed(ErrorKind::WrongAnswer);
        }
    }

    TestRunVerdict::PASSED
}
