//! # busbar-sf-jobs
//!
//! Lifecycle of asynchronous deploy and retrieve jobs.
//!
//! ## Features
//!
//! - **Job handles** - Uniform `id` / `check_status` / `cancel` over deploys and retrieves
//! - **Polling** - Interval and timeout, async single check, Ctrl-C cancellation
//! - **Reconciliation** - Per-file outcomes and documented exit codes (0, 1, 68, 69)
//! - **Stash** - Job ids persisted between CLI invocations
//! - **Source tracking** - Conflict checks before a job, ledger updates after it
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use busbar_sf_jobs::{
//!     ComponentSet, DeployRequest, FileStash, NoopObserver, TypeRegistry, Wait, Workflow,
//! };
//! use busbar_sf_metadata::{DeployOptions, MetadataClient};
//!
//! let client = Arc::new(MetadataClient::from_parts(instance_url, access_token));
//! let stash = FileStash::new()?;
//! let set = ComponentSet::from_metadata_dir("mdapi", &TypeRegistry::default())?;
//!
//! let report = Workflow::new(client, &stash)
//!     .deploy(
//!         DeployRequest::components(set, DeployOptions::default()).with_wait(Wait::from_minutes(10)),
//!         &mut NoopObserver,
//!     )
//!     .await?;
//! std::process::exit(report.exit_code);
//! ```

mod component;
mod engine;
mod error;
pub mod exit;
mod job;
mod poll;
mod reconcile;
mod registry;
mod stash;
mod target;
mod tracking;
mod workflow;

#[cfg(test)]
mod testing;

pub use component::{ComponentSet, SourceComponent};
pub use engine::MetadataApi;
pub use error::{Error, ErrorKind, Result};
pub use job::{DeployJob, JobHandle, JobKind, JobResult, RetrieveJob};
pub use poll::{
    NoopObserver, PollObserver, PollOptions, PollOutcome, Poller, Wait, DEFAULT_FREQUENCY,
    DEFAULT_TIMEOUT,
};
pub use reconcile::{
    deploy_success, is_success, reconcile_deploy, reconcile_retrieve, sort_outcomes,
    ComponentState, FileOutcome, FAILED_WITHOUT_FILE_FAILURES_IS_SUCCESS,
};
pub use registry::{TypeDef, TypeRegistry};
pub use stash::{FileStash, StashCategory, StashEntry, StashStore, STASH_PATH_ENV};
pub use target::{RetrieveOutput, RetrieveTarget, DEFAULT_ZIP_FILE_NAME};
pub use tracking::{
    Conflict, FileLedger, LocalChanges, LocalTrackingUpdate, RemoteRecord, TrackingLedger,
    TrackingSynchronizer, TrackingUpdate,
};
pub use workflow::{
    DeploySource, DeployRequest, OperationReport, RetrieveJobRequest, Workflow,
};
