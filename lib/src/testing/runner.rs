use core::ffi::c_int;

use super::TestResult;

/// Conversion from a test function's return value to a [`TestResult`].
///
/// Suites mix idiomatic `TestResult`-returning tests with older C-flavoured
/// ones that return `0` / `-1`.
pub trait IntoTestResult {
    fn into_test_result(self) -> TestResult;
}

impl IntoTestResult for TestResult {
    #[inline]
    fn into_test_result(self) -> TestResult {
        self
    }
}

impl IntoTestResult for c_int {
    #[inline]
    fn into_test_result(self) -> TestResult {
        if self == 0 {
            TestResult::Pass
        } else {
            TestResult::Fail
        }
    }
}

/// Run one test closure and log its verdict.
///
/// Failures have already logged their own diagnostics via the assertion
/// macros; this only adds the per-test PASS/FAIL line.
pub fn run_single_test<F, R>(name: &str, test: F) -> TestResult
where
    F: FnOnce() -> R,
    R: IntoTestResult,
{
    crate::klog_debug!("TEST: {}", name);
    let result = test().into_test_result();
    match result {
        TestResult::Pass => crate::klog_debug!("TEST PASS: {}", name),
        TestResult::Skipped => crate::klog_info!("TEST SKIP: {}", name),
        TestResult::Fail | TestResult::Panic => crate::klog_error!("TEST FAIL: {}", name),
    }
    result
}
