//! Job handles for submitted deploy and retrieve operations.
//!
//! A handle owns the async process id assigned by the org. Status checks
//! are idempotent once the job is terminal: the first terminal payload is
//! cached and returned for every later check.

use async_trait::async_trait;
use busbar_sf_metadata::{DeployResult, RequestStatus, RetrieveResult};
use serde::{Deserialize, Serialize};

use crate::error::Result;

mod deploy;
mod retrieve;

pub use deploy::DeployJob;
pub use retrieve::RetrieveJob;

/// Which remote operation a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Deploy,
    Retrieve,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Deploy => f.write_str("deploy"),
            JobKind::Retrieve => f.write_str("retrieve"),
        }
    }
}

/// Status payload of a job, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    Deploy(DeployResult),
    Retrieve(RetrieveResult),
}

impl JobResult {
    pub fn id(&self) -> &str {
        match self {
            JobResult::Deploy(r) => &r.id,
            JobResult::Retrieve(r) => &r.id,
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            JobResult::Deploy(_) => JobKind::Deploy,
            JobResult::Retrieve(_) => JobKind::Retrieve,
        }
    }

    pub fn status(&self) -> RequestStatus {
        match self {
            JobResult::Deploy(r) => r.status,
            JobResult::Retrieve(r) => r.status,
        }
    }

    pub fn success(&self) -> bool {
        match self {
            JobResult::Deploy(r) => r.success,
            JobResult::Retrieve(r) => r.success,
        }
    }

    /// True once the org reports no further state change will happen.
    pub fn is_done(&self) -> bool {
        let done = match self {
            JobResult::Deploy(r) => r.done,
            JobResult::Retrieve(r) => r.done,
        };
        done || self.status().is_terminal()
    }

    pub fn as_deploy(&self) -> Option<&DeployResult> {
        match self {
            JobResult::Deploy(r) => Some(r),
            JobResult::Retrieve(_) => None,
        }
    }

    pub fn as_retrieve(&self) -> Option<&RetrieveResult> {
        match self {
            JobResult::Retrieve(r) => Some(r),
            JobResult::Deploy(_) => None,
        }
    }
}

/// A submitted remote operation.
///
/// `cancel` only requests cancellation; callers keep checking status until
/// a terminal payload arrives, which may be a completion that won the race.
#[async_trait]
pub trait JobHandle: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> JobKind;

    async fn check_status(&self) -> Result<JobResult>;

    async fn cancel(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{deploy_result, retrieve_result};

    #[test]
    fn test_job_result_accessors() {
        let result = JobResult::Deploy(deploy_result("0Af1", RequestStatus::InProgress, false));
        assert_eq!(result.id(), "0Af1");
        assert_eq!(result.kind(), JobKind::Deploy);
        assert!(!result.is_done());
        assert!(result.as_retrieve().is_none());
    }

    #[test]
    fn test_terminal_status_counts_as_done() {
        let mut retrieve = retrieve_result("09S1", RequestStatus::Failed, false);
        retrieve.done = false;
        assert!(JobResult::Retrieve(retrieve).is_done());
    }
}
