//! Deploy operations.

use crate::types::{ComponentSuccess, RequestStatus, TestFailure, TestLevel};
use serde::{Deserialize, Serialize};

/// Options for deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployOptions {
    /// Allow references to missing files in the zip.
    pub allow_missing_files: bool,
    /// Automatically update the package manifest.
    pub auto_update_package: bool,
    /// Validate only, don't actually deploy.
    pub check_only: bool,
    /// Ignore warnings during deployment.
    pub ignore_warnings: bool,
    /// Retrieve metadata after deploy.
    pub perform_retrieve: bool,
    /// Hard delete components (only in sandbox/DE orgs).
    pub purge_on_delete: bool,
    /// Rollback all changes if any component fails.
    pub rollback_on_error: bool,
    /// Run all Apex tests.
    pub run_all_tests: bool,
    /// Deploy as a single package.
    pub single_package: bool,
    /// Test level for deployment.
    pub test_level: Option<TestLevel>,
    /// Specific tests to run (when test_level is RunSpecifiedTests).
    pub run_tests: Vec<String>,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            allow_missing_files: false,
            auto_update_package: false,
            check_only: false,
            ignore_warnings: false,
            perform_retrieve: false,
            purge_on_delete: false,
            rollback_on_error: true,
            run_all_tests: false,
            single_package: true,
            test_level: None,
            run_tests: vec![],
        }
    }
}

impl DeployOptions {
    /// Validate the deployment without saving it (`checkOnly`).
    pub fn validate_only(mut self, check_only: bool) -> Self {
        self.check_only = check_only;
        self
    }

    pub fn with_ignore_warnings(mut self, ignore: bool) -> Self {
        self.ignore_warnings = ignore;
        self
    }

    pub fn with_rollback_on_error(mut self, rollback: bool) -> Self {
        self.rollback_on_error = rollback;
        self
    }

    pub fn with_purge_on_delete(mut self, purge: bool) -> Self {
        self.purge_on_delete = purge;
        self
    }

    /// Set the test level; specified tests are only sent for `RunSpecifiedTests`.
    pub fn with_tests(mut self, level: Option<TestLevel>, run_tests: Vec<String>) -> Self {
        self.test_level = level;
        self.run_tests = run_tests;
        self
    }
}

/// Result of a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployResult {
    /// Async process ID.
    pub id: String,
    /// Whether the operation is complete.
    pub done: bool,
    /// Current status.
    pub status: RequestStatus,
    /// Whether the deployment succeeded.
    pub success: bool,
    /// Whether this was a validation (`checkOnly`) deployment.
    pub check_only: bool,
    /// Error message if failed.
    pub error_message: Option<String>,
    /// Number of components deployed.
    pub number_components_deployed: u32,
    /// Number of components with errors.
    pub number_components_errors: u32,
    /// Total number of components.
    pub number_components_total: u32,
    /// Number of tests completed.
    pub number_tests_completed: u32,
    /// Number of tests with errors.
    pub number_tests_errors: u32,
    /// Total number of tests.
    pub number_tests_total: u32,
    /// Component failures.
    pub component_failures: Vec<ComponentFailure>,
    /// Component successes.
    pub component_successes: Vec<ComponentSuccess>,
    /// Test failures.
    pub test_failures: Vec<TestFailure>,
    /// State detail message.
    pub state_detail: Option<String>,
}

impl DeployResult {
    /// Component and test counters, present only while the deploy has work to report.
    pub fn progress(&self) -> Option<DeployProgress> {
        if self.number_components_total == 0 && self.number_tests_total == 0 {
            return None;
        }
        Some(DeployProgress {
            components_total: self.number_components_total,
            components_deployed: self.number_components_deployed,
            components_errored: self.number_components_errors,
            tests_total: self.number_tests_total,
            tests_completed: self.number_tests_completed,
            tests_errored: self.number_tests_errors,
        })
    }
}

/// Progress counters of a running deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployProgress {
    pub components_total: u32,
    pub components_deployed: u32,
    pub components_errored: u32,
    pub tests_total: u32,
    pub tests_completed: u32,
    pub tests_errored: u32,
}

/// A component failure in deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentFailure {
    pub component_type: Option<String>,
    pub file_name: Option<String>,
    pub full_name: Option<String>,
    pub line_number: Option<u32>,
    pub column_number: Option<u32>,
    pub problem: String,
    pub problem_type: String,
    pub created: bool,
    pub deleted: bool,
}

impl ComponentFailure {
    /// Warnings are reported through `componentFailures` but do not block the deploy.
    pub fn is_warning(&self) -> bool {
        self.problem_type.eq_ignore_ascii_case("Warning")
    }
}

/// Result of canceling a deployment.
///
/// Canceling is asynchronous: poll `check_deploy_status()` to see when the
/// deployment reaches `Canceled`, or a different terminal status if the
/// cancel lost the race with completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelDeployResult {
    /// The async process ID of the deployment being canceled.
    pub id: String,
    /// Whether the cancel operation has completed.
    pub done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_result() -> DeployResult {
        DeployResult {
            id: "0Af000000000001".to_string(),
            done: false,
            status: RequestStatus::InProgress,
            success: false,
            check_only: false,
            error_message: None,
            number_components_deployed: 0,
            number_components_errors: 0,
            number_components_total: 0,
            number_tests_completed: 0,
            number_tests_errors: 0,
            number_tests_total: 0,
            component_failures: vec![],
            component_successes: vec![],
            test_failures: vec![],
            state_detail: None,
        }
    }

    #[test]
    fn test_deploy_options_default() {
        let opts = DeployOptions::default();
        assert!(!opts.allow_missing_files);
        assert!(!opts.check_only);
        assert!(!opts.ignore_warnings);
        assert!(opts.rollback_on_error);
        assert!(opts.single_package);
    }

    #[test]
    fn test_deploy_options_builders() {
        let opts = DeployOptions::default()
            .validate_only(true)
            .with_rollback_on_error(false)
            .with_tests(
                Some(TestLevel::RunSpecifiedTests),
                vec!["FooTest".to_string()],
            );
        assert!(opts.check_only);
        assert!(!opts.rollback_on_error);
        assert_eq!(opts.test_level, Some(TestLevel::RunSpecifiedTests));
        assert_eq!(opts.run_tests, vec!["FooTest"]);
    }

    #[test]
    fn test_progress_absent_before_counters() {
        assert!(pending_result().progress().is_none());
    }

    #[test]
    fn test_progress_reports_counters() {
        let mut result = pending_result();
        result.number_components_total = 10;
        result.number_components_deployed = 4;
        result.number_components_errors = 1;

        let progress = result.progress().unwrap();
        assert_eq!(progress.components_total, 10);
        assert_eq!(progress.components_deployed, 4);
        assert_eq!(progress.components_errored, 1);
        assert_eq!(progress.tests_total, 0);
    }

    #[test]
    fn test_component_failure_warning() {
        let failure = ComponentFailure {
            component_type: Some("ApexClass".to_string()),
            file_name: None,
            full_name: Some("Foo".to_string()),
            line_number: None,
            column_number: None,
            problem: "No ApexClass named: Foo found".to_string(),
            problem_type: "Warning".to_string(),
            created: false,
            deleted: false,
        };
        assert!(failure.is_warning());
    }
}
