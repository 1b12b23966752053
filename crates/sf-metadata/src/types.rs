//! Common types for Metadata API.

use serde::{Deserialize, Serialize};

/// Default Metadata API version.
pub const DEFAULT_API_VERSION: &str = "62.0";

/// Status of an asynchronous deploy or retrieve request.
///
/// `SucceededPartial` is only reported for deployments run with
/// `rollbackOnError=false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    InProgress,
    Succeeded,
    SucceededPartial,
    Failed,
    Canceling,
    Canceled,
}

impl RequestStatus {
    /// Returns true once no further state change can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Succeeded
                | RequestStatus::SucceededPartial
                | RequestStatus::Failed
                | RequestStatus::Canceled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "Pending",
            RequestStatus::InProgress => "InProgress",
            RequestStatus::Succeeded => "Succeeded",
            RequestStatus::SucceededPartial => "SucceededPartial",
            RequestStatus::Failed => "Failed",
            RequestStatus::Canceling => "Canceling",
            RequestStatus::Canceled => "Canceled",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" | "Queued" => Ok(RequestStatus::Pending),
            "InProgress" => Ok(RequestStatus::InProgress),
            "Succeeded" => Ok(RequestStatus::Succeeded),
            "SucceededPartial" => Ok(RequestStatus::SucceededPartial),
            "Failed" => Ok(RequestStatus::Failed),
            "Canceling" => Ok(RequestStatus::Canceling),
            "Canceled" => Ok(RequestStatus::Canceled),
            _ => Err(format!("Unknown request status: {}", s)),
        }
    }
}

/// Test level for deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TestLevel {
    /// No tests run.
    NoTestRun,
    /// Run local tests only.
    #[default]
    RunLocalTests,
    /// Run all tests in org.
    RunAllTestsInOrg,
    /// Run specified tests.
    RunSpecifiedTests,
}

impl std::fmt::Display for TestLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestLevel::NoTestRun => write!(f, "NoTestRun"),
            TestLevel::RunLocalTests => write!(f, "RunLocalTests"),
            TestLevel::RunAllTestsInOrg => write!(f, "RunAllTestsInOrg"),
            TestLevel::RunSpecifiedTests => write!(f, "RunSpecifiedTests"),
        }
    }
}

impl std::str::FromStr for TestLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NoTestRun" => Ok(TestLevel::NoTestRun),
            "RunLocalTests" => Ok(TestLevel::RunLocalTests),
            "RunAllTestsInOrg" => Ok(TestLevel::RunAllTestsInOrg),
            "RunSpecifiedTests" => Ok(TestLevel::RunSpecifiedTests),
            _ => Err(format!("Unknown test level: {}", s)),
        }
    }
}

/// SOAP Fault from the Metadata API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoapFault {
    pub fault_code: String,
    pub fault_string: String,
}

impl std::fmt::Display for SoapFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SOAP Fault: {} - {}", self.fault_code, self.fault_string)
    }
}

impl std::error::Error for SoapFault {}

/// A component deployment success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSuccess {
    pub component_type: Option<String>,
    pub file_name: Option<String>,
    pub full_name: Option<String>,
    pub created: bool,
    pub changed: bool,
    pub deleted: bool,
}

/// A test failure during deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailure {
    pub name: Option<String>,
    pub method_name: Option<String>,
    pub message: Option<String>,
    pub stack_trace: Option<String>,
    pub namespace: Option<String>,
}

/// Properties of a file in a retrieve result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileProperties {
    pub created_by_id: String,
    pub created_by_name: String,
    pub created_date: String,
    pub file_name: String,
    pub full_name: String,
    pub id: String,
    pub last_modified_by_id: String,
    pub last_modified_by_name: String,
    pub last_modified_date: String,
    pub manageable_state: Option<String>,
    pub namespace_prefix: Option<String>,
    pub component_type: String,
}

/// A component returned by `listMetadata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataComponent {
    pub full_name: String,
    pub metadata_type: String,
    pub file_name: Option<String>,
    pub id: Option<String>,
    pub namespace_prefix: Option<String>,
    pub last_modified_by_name: Option<String>,
    pub last_modified_date: Option<String>,
    pub manageable_state: Option<String>,
}

/// Result of `describeMetadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescribeMetadataResult {
    pub metadata_objects: Vec<MetadataType>,
    pub organization_namespace: Option<String>,
    pub partial_save_allowed: bool,
    pub test_required: bool,
}

/// A metadata type as described by the org: its folder and file suffix
/// in metadata-API format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataType {
    pub xml_name: String,
    pub directory_name: Option<String>,
    pub suffix: Option<String>,
    pub meta_file: bool,
    pub in_folder: bool,
    pub child_xml_names: Vec<String>,
}
