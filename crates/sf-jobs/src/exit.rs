//! Process exit codes.
//!
//! These values are documented for scripts and must not change.

use busbar_sf_metadata::RequestStatus;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_PARTIAL: i32 = 68;
pub const EXIT_IN_PROGRESS: i32 = 69;

/// Exit code for a job status.
pub fn exit_code_for_status(status: RequestStatus) -> i32 {
    match status {
        RequestStatus::Succeeded => EXIT_SUCCESS,
        RequestStatus::Failed | RequestStatus::Canceled => EXIT_FAILURE,
        RequestStatus::SucceededPartial => EXIT_PARTIAL,
        RequestStatus::Pending | RequestStatus::InProgress | RequestStatus::Canceling => {
            EXIT_IN_PROGRESS
        }
    }
}

/// Exit code for a reconciled job; a reconciled success always exits 0.
pub fn resolve_exit_code(status: RequestStatus, success: bool) -> i32 {
    if success {
        EXIT_SUCCESS
    } else {
        exit_code_for_status(status)
    }
}

/// Combine exit codes of sequentially run jobs.
pub fn aggregate_exit_code(codes: &[i32]) -> i32 {
    if codes.contains(&EXIT_IN_PROGRESS) {
        return EXIT_IN_PROGRESS;
    }
    if codes.iter().all(|c| *c == EXIT_SUCCESS) {
        return EXIT_SUCCESS;
    }
    if codes.iter().all(|c| *c == EXIT_FAILURE) {
        return EXIT_FAILURE;
    }
    EXIT_PARTIAL
}
