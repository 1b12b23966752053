//! End-to-end deploy and retrieve operations.
//!
//! A workflow chains the pieces of a job: conflict check, submission,
//! stash, polling, reconciliation, and the tracking update. Commands only
//! build requests and render the returned [`OperationReport`].

use std::path::PathBuf;
use std::sync::Arc;

use busbar_sf_metadata::{
    DeployOptions, DeployResult, RequestStatus, RetrieveRequest, RetrieveResult,
};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, info, instrument};

use crate::component::ComponentSet;
use crate::engine::MetadataApi;
use crate::error::{Error, ErrorKind, Result};
use crate::exit::{resolve_exit_code, EXIT_IN_PROGRESS};
use crate::job::{DeployJob, JobHandle, JobKind, JobResult, RetrieveJob};
use crate::poll::{PollObserver, PollOptions, PollOutcome, Poller, Wait};
use crate::reconcile::{deploy_success, is_success, reconcile_deploy, reconcile_retrieve, FileOutcome};
use crate::stash::{StashCategory, StashEntry, StashStore};
use crate::target::RetrieveTarget;
use crate::tracking::TrackingSynchronizer;

/// What a deploy sends.
#[derive(Debug, Clone)]
pub enum DeploySource {
    Components(ComponentSet),
    /// A prebuilt package zip; no per-component reconciliation or tracking.
    Zip(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub source: DeploySource,
    pub options: DeployOptions,
    pub wait: Wait,
    pub category: StashCategory,
    pub force_overwrite: bool,
}

impl DeployRequest {
    pub fn components(set: ComponentSet, options: DeployOptions) -> Self {
        Self {
            source: DeploySource::Components(set),
            options,
            wait: Wait::default(),
            category: StashCategory::MdapiDeploy,
            force_overwrite: false,
        }
    }

    pub fn zip(bytes: Vec<u8>, options: DeployOptions) -> Self {
        Self {
            source: DeploySource::Zip(bytes),
            ..Self::components(ComponentSet::default(), options)
        }
    }

    pub fn with_wait(mut self, wait: Wait) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_category(mut self, category: StashCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_force_overwrite(mut self, force: bool) -> Self {
        self.force_overwrite = force;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RetrieveJobRequest {
    /// Components to retrieve as an unpackaged manifest.
    pub components: Option<ComponentSet>,
    pub packages: Vec<String>,
    pub target: RetrieveTarget,
    pub single_package: bool,
    pub wait: Wait,
    pub force_overwrite: bool,
}

impl RetrieveJobRequest {
    pub fn new(target: RetrieveTarget) -> Self {
        Self {
            components: None,
            packages: Vec::new(),
            target,
            single_package: true,
            wait: Wait::default(),
            force_overwrite: false,
        }
    }

    pub fn with_components(mut self, components: ComponentSet) -> Self {
        self.components = Some(components);
        self
    }

    pub fn with_packages(mut self, packages: Vec<String>) -> Self {
        self.packages = packages;
        self
    }

    pub fn with_wait(mut self, wait: Wait) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_force_overwrite(mut self, force: bool) -> Self {
        self.force_overwrite = force;
        self
    }

    fn to_request(&self) -> RetrieveRequest {
        let manifest = self
            .components
            .as_ref()
            .map(ComponentSet::to_manifest)
            .filter(|m| !m.is_empty());
        RetrieveRequest {
            api_version: self.components.as_ref().map(|c| c.api_version.clone()),
            // package names need their own folders in the zip
            single_package: self.single_package && self.packages.is_empty(),
            unpackaged: manifest,
            package_names: self.packages.clone(),
        }
    }
}

/// Structured result of one operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationReport {
    pub job_id: String,
    pub kind: JobKind,
    pub status: RequestStatus,
    pub success: bool,
    pub timed_out: bool,
    pub exit_code: i32,
    pub outcomes: Vec<FileOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeployResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieve: Option<RetrieveResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_path: Option<PathBuf>,
    #[serde(skip)]
    pub tracking_updated: bool,
}

impl OperationReport {
    fn timed_out(result: JobResult) -> Self {
        info!(job_id = result.id(), status = %result.status(), "Job still running");
        let mut report = Self {
            job_id: result.id().to_string(),
            kind: result.kind(),
            status: result.status(),
            success: false,
            timed_out: true,
            exit_code: EXIT_IN_PROGRESS,
            outcomes: Vec::new(),
            deploy: None,
            retrieve: None,
            zip_path: None,
            tracking_updated: false,
        };
        match result {
            JobResult::Deploy(r) => report.deploy = Some(r),
            JobResult::Retrieve(r) => report.retrieve = Some(r),
        }
        report
    }
}

/// Runs deploy and retrieve jobs against one org.
pub struct Workflow<'a> {
    api: Arc<dyn MetadataApi>,
    stash: &'a dyn StashStore,
    tracking: Option<TrackingSynchronizer>,
    poller: Poller,
    interrupt: Option<Arc<Notify>>,
}

impl std::fmt::Debug for Workflow<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("tracking", &self.tracking.is_some())
            .field("poller", &self.poller)
            .finish_non_exhaustive()
    }
}

impl<'a> Workflow<'a> {
    pub fn new(api: Arc<dyn MetadataApi>, stash: &'a dyn StashStore) -> Self {
        Self {
            api,
            stash,
            tracking: None,
            poller: Poller::default(),
            interrupt: None,
        }
    }

    pub fn with_tracking(mut self, tracking: TrackingSynchronizer) -> Self {
        self.tracking = Some(tracking);
        self
    }

    pub fn with_poll_options(mut self, options: PollOptions) -> Self {
        self.poller = Poller::new(options);
        self
    }

    /// When notified during a synchronous wait, the job is asked to cancel.
    pub fn with_interrupt(mut self, interrupt: Arc<Notify>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    pub fn tracking(&self) -> Option<&TrackingSynchronizer> {
        self.tracking.as_ref()
    }

    /// Deploy components or a package zip and wait per `request.wait`.
    #[instrument(skip_all, fields(category = %request.category))]
    pub async fn deploy(
        &self,
        request: DeployRequest,
        observer: &mut dyn PollObserver,
    ) -> Result<OperationReport> {
        let DeployRequest {
            source,
            options,
            wait,
            category,
            force_overwrite,
        } = request;

        let (job, components) = match source {
            DeploySource::Components(set) => {
                if !force_overwrite {
                    if let Some(tracking) = &self.tracking {
                        tracking.check_conflicts(&set)?;
                    }
                }
                let job = DeployJob::submit(self.api.clone(), &set, &options).await?;
                (job, Some(set))
            }
            DeploySource::Zip(bytes) => {
                let job = DeployJob::submit_zip(self.api.clone(), &bytes, &options).await?;
                (job, None)
            }
        };
        let mut entry = StashEntry::job(job.id());
        // a tracked deploy can be committed by a later report
        if let (Some(_), Some(set), false) = (&self.tracking, &components, options.check_only) {
            entry = entry.with_components(set.iter().cloned().collect());
        }
        self.stash.set(category, &entry)?;

        let outcome = self.wait_for(&job, wait, observer).await?;
        self.finish_deploy(outcome, components.as_ref(), options.check_only)
    }

    /// Resume a deploy from `job_id` or the stash.
    ///
    /// With `components`, outcomes are reconciled against them and tracking
    /// is updated. Without them, the components stashed with the same job
    /// are used when there are any.
    #[instrument(skip(self, components, observer))]
    pub async fn deploy_report(
        &self,
        job_id: Option<&str>,
        category: StashCategory,
        components: Option<&ComponentSet>,
        wait: Wait,
        observer: &mut dyn PollObserver,
    ) -> Result<OperationReport> {
        let stashed = self.stash.get(category)?;
        let id = match (job_id, &stashed) {
            (Some(id), _) => id.to_string(),
            (None, Some(entry)) => {
                debug!(job_id = %entry.jobid, %category, "Using stashed job id");
                entry.jobid.clone()
            }
            (None, None) => return Err(Error::new(ErrorKind::MissingJobId(category.to_string()))),
        };
        let stashed_set = stashed
            .filter(|entry| entry.jobid == id && !entry.components.is_empty())
            .map(|entry| {
                let mut set = ComponentSet::new(self.api.api_version());
                for component in entry.components {
                    set.add(component);
                }
                set
            });

        let job = DeployJob::attach(self.api.clone(), id);
        let outcome = self.wait_for(&job, wait, observer).await?;
        self.finish_deploy(outcome, components.or(stashed_set.as_ref()), false)
    }

    /// Request cancellation of a deploy and keep polling to a terminal status.
    #[instrument(skip(self, observer))]
    pub async fn cancel_deploy(
        &self,
        job_id: Option<&str>,
        category: StashCategory,
        wait: Wait,
        observer: &mut dyn PollObserver,
    ) -> Result<OperationReport> {
        let id = self.resolve_job_id(job_id, category)?;
        let job = DeployJob::attach(self.api.clone(), id);
        if let Err(e) = job.cancel().await {
            observer.on_error(&e);
            return Err(e);
        }
        observer.on_cancel();
        let outcome = self.wait_for(&job, wait, observer).await?;
        self.finish_deploy(outcome, None, false)
    }

    /// Deploy a validated check-only job without re-running tests.
    #[instrument(skip(self, observer))]
    pub async fn quick_deploy(
        &self,
        validation_id: Option<&str>,
        wait: Wait,
        observer: &mut dyn PollObserver,
    ) -> Result<OperationReport> {
        let validation_id = self.resolve_job_id(validation_id, StashCategory::MdapiDeploy)?;
        let job = DeployJob::quick(self.api.clone(), &validation_id).await?;
        self.stash
            .set(StashCategory::MdapiDeploy, &StashEntry::job(job.id()))?;
        let outcome = self.wait_for(&job, wait, observer).await?;
        self.finish_deploy(outcome, None, false)
    }

    /// Retrieve components or packages into `request.target`.
    #[instrument(skip_all, fields(dir = %request.target.dir.display()))]
    pub async fn retrieve(
        &self,
        request: RetrieveJobRequest,
        observer: &mut dyn PollObserver,
    ) -> Result<OperationReport> {
        if let (Some(set), false, Some(tracking)) =
            (&request.components, request.force_overwrite, &self.tracking)
        {
            tracking.check_conflicts(set)?;
        }

        let job = RetrieveJob::submit(self.api.clone(), &request.to_request()).await?;
        self.stash.set(
            StashCategory::MdapiRetrieve,
            &request.target.to_stash_entry(job.id()),
        )?;

        let outcome = self.wait_for(&job, request.wait, observer).await?;
        self.finish_retrieve(outcome, &request.target, request.components.is_some())
    }

    /// Resume a retrieve from `job_id` or the stash.
    ///
    /// The output location comes from `target`, else from the stash entry
    /// of the same job.
    #[instrument(skip(self, target, observer))]
    pub async fn retrieve_report(
        &self,
        job_id: Option<&str>,
        target: Option<RetrieveTarget>,
        wait: Wait,
        observer: &mut dyn PollObserver,
    ) -> Result<OperationReport> {
        let stashed = self.stash.get(StashCategory::MdapiRetrieve)?;
        let id = match (job_id, &stashed) {
            (Some(id), _) => id.to_string(),
            (None, Some(entry)) => entry.jobid.clone(),
            (None, None) => {
                return Err(Error::new(ErrorKind::MissingJobId(
                    StashCategory::MdapiRetrieve.to_string(),
                )))
            }
        };
        let target = target
            .or_else(|| {
                stashed
                    .as_ref()
                    .filter(|entry| entry.jobid == id)
                    .and_then(RetrieveTarget::from_stash_entry)
            })
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidInput(format!(
                    "no target directory known for retrieve {}",
                    id
                )))
            })?;

        let job = RetrieveJob::attach(self.api.clone(), id);
        let outcome = self.wait_for(&job, wait, observer).await?;
        self.finish_retrieve(outcome, &target, false)
    }

    fn resolve_job_id(&self, explicit: Option<&str>, category: StashCategory) -> Result<String> {
        if let Some(id) = explicit {
            return Ok(id.to_string());
        }
        match self.stash.get(category)? {
            Some(entry) => {
                debug!(job_id = %entry.jobid, %category, "Using stashed job id");
                Ok(entry.jobid)
            }
            None => Err(Error::new(ErrorKind::MissingJobId(category.to_string()))),
        }
    }

    async fn wait_for(
        &self,
        job: &dyn JobHandle,
        wait: Wait,
        observer: &mut dyn PollObserver,
    ) -> Result<PollOutcome> {
        match &self.interrupt {
            Some(interrupt) => {
                self.poller
                    .poll_until_cancelled(job, wait, observer, interrupt.notified())
                    .await
            }
            None => self.poller.run(job, wait, observer).await,
        }
    }

    fn finish_deploy(
        &self,
        outcome: PollOutcome,
        components: Option<&ComponentSet>,
        check_only: bool,
    ) -> Result<OperationReport> {
        if outcome.is_timed_out() {
            return Ok(OperationReport::timed_out(outcome.into_result()));
        }
        let JobResult::Deploy(result) = outcome.into_result() else {
            return Err(Error::new(ErrorKind::MetadataApi(
                "deploy job returned a retrieve payload".to_string(),
            )));
        };

        let empty = ComponentSet::new(self.api.api_version());
        let outcomes = reconcile_deploy(&result, components.unwrap_or(&empty));
        let success = deploy_success(&result, &outcomes);

        let committed = matches!(
            result.status,
            RequestStatus::Succeeded | RequestStatus::SucceededPartial
        ) || success;
        let mut tracking_updated = false;
        if let (Some(tracking), Some(_)) = (&self.tracking, components) {
            if committed && !check_only && !result.check_only {
                tracking_updated = tracking.apply_outcomes(&outcomes, false)?;
            }
        }

        let exit_code = resolve_exit_code(result.status, success);
        info!(
            job_id = %result.id,
            status = %result.status,
            success,
            exit_code,
            "Deploy finished"
        );
        Ok(OperationReport {
            job_id: result.id.clone(),
            kind: JobKind::Deploy,
            status: result.status,
            success,
            timed_out: false,
            exit_code,
            outcomes,
            deploy: Some(result),
            retrieve: None,
            zip_path: None,
            tracking_updated,
        })
    }

    fn finish_retrieve(
        &self,
        outcome: PollOutcome,
        target: &RetrieveTarget,
        track: bool,
    ) -> Result<OperationReport> {
        if outcome.is_timed_out() {
            return Ok(OperationReport::timed_out(outcome.into_result()));
        }
        let JobResult::Retrieve(result) = outcome.into_result() else {
            return Err(Error::new(ErrorKind::MetadataApi(
                "retrieve job returned a deploy payload".to_string(),
            )));
        };

        let mut zip_path = None;
        let mut preexisting = Default::default();
        if let Some(zip) = result.zip_file.as_deref().filter(|z| !z.is_empty()) {
            let output = target.write(zip)?;
            zip_path = output.zip_path;
            preexisting = output.preexisting;
        }

        let outcomes = reconcile_retrieve(&result, Some(target), &preexisting);
        let success = is_success(result.status, &outcomes);

        let mut tracking_updated = false;
        if let (Some(tracking), true) = (&self.tracking, track && target.unzip) {
            if result.status == RequestStatus::Succeeded || success {
                tracking_updated = tracking.apply_outcomes(&outcomes, true)?;
            }
        }

        let exit_code = resolve_exit_code(result.status, success);
        info!(
            job_id = %result.id,
            status = %result.status,
            files = outcomes.len(),
            exit_code,
            "Retrieve finished"
        );
        Ok(OperationReport {
            job_id: result.id.clone(),
            kind: JobKind::Retrieve,
            status: result.status,
            success,
            timed_out: false,
            exit_code,
            outcomes,
            deploy: None,
            retrieve: Some(result),
            zip_path,
            tracking_updated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::SourceComponent;
    use crate::poll::NoopObserver;
    use crate::reconcile::ComponentState;
    use crate::stash::FileStash;
    use crate::testing::{deploy_result, retrieve_result, FakeApi};
    use crate::tracking::{Conflict, LocalTrackingUpdate, TrackingLedger};
    use busbar_sf_metadata::{ComponentFailure, FileProperties};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeLedger {
        conflicts: Vec<Conflict>,
        applied: Mutex<Vec<(usize, bool)>>,
    }

    impl TrackingLedger for FakeLedger {
        fn get_conflicts(&self, _components: &ComponentSet) -> Result<Vec<Conflict>> {
            Ok(self.conflicts.clone())
        }

        fn update_local_tracking(&self, _update: &LocalTrackingUpdate) -> Result<()> {
            Ok(())
        }

        fn update_remote_tracking(&self, outcomes: &[FileOutcome], is_retrieve: bool) -> Result<()> {
            self.applied
                .lock()
                .unwrap()
                .push((outcomes.len(), is_retrieve));
            Ok(())
        }
    }

    fn stash() -> (tempfile::TempDir, FileStash) {
        let dir = tempfile::tempdir().unwrap();
        let stash = FileStash::with_path(dir.path().join("stash.json"));
        (dir, stash)
    }

    fn two_classes() -> ComponentSet {
        let mut set = ComponentSet::new("62.0");
        set.add(SourceComponent::new("ApexClass", "Foo"));
        set.add(SourceComponent::new("ApexClass", "Bar"));
        set
    }

    #[tokio::test]
    async fn test_deploy_with_one_failure_exits_1() {
        let api = Arc::new(FakeApi::default());
        let mut failed = deploy_result("0Af000000000001", RequestStatus::Failed, true);
        failed.component_failures = vec![ComponentFailure {
            component_type: Some("ApexClass".to_string()),
            file_name: Some("classes/Foo.cls".to_string()),
            full_name: Some("Foo".to_string()),
            line_number: None,
            column_number: None,
            problem: "Invalid field".to_string(),
            problem_type: "Error".to_string(),
            created: false,
            deleted: false,
        }];
        api.push_deploy_status(failed);
        let ledger = Arc::new(FakeLedger::default());
        let (_dir, stash) = stash();

        let workflow = Workflow::new(api.clone(), &stash)
            .with_tracking(TrackingSynchronizer::new(ledger.clone()));
        let report = workflow
            .deploy(
                DeployRequest::components(two_classes(), DeployOptions::default()),
                &mut NoopObserver,
            )
            .await
            .unwrap();

        assert_eq!(report.exit_code, 1);
        assert!(!report.success);
        let states: Vec<_> = report
            .outcomes
            .iter()
            .map(|o| (o.full_name.as_str(), o.state))
            .collect();
        assert_eq!(
            states,
            vec![("Bar", ComponentState::Changed), ("Foo", ComponentState::Failed)]
        );
        // nothing committed for a failed run
        assert!(ledger.applied.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_async_deploy_stashes_and_exits_69() {
        let api = Arc::new(FakeApi::default());
        api.push_deploy_status(deploy_result("0Af000000000001", RequestStatus::InProgress, false));
        let (_dir, stash) = stash();

        let workflow = Workflow::new(api.clone(), &stash);
        let report = workflow
            .deploy(
                DeployRequest::components(two_classes(), DeployOptions::default())
                    .with_wait(Wait::Async),
                &mut NoopObserver,
            )
            .await
            .unwrap();

        assert!(report.timed_out);
        assert_eq!(report.exit_code, 69);
        assert_eq!(api.calls(), vec!["deploy", "checkDeployStatus"]);
        assert_eq!(
            stash.get(StashCategory::MdapiDeploy).unwrap(),
            Some(StashEntry::job("0Af000000000001"))
        );
    }

    #[tokio::test]
    async fn test_conflict_blocks_submission() {
        let api = Arc::new(FakeApi::default());
        let ledger = Arc::new(FakeLedger {
            conflicts: vec![Conflict {
                component_type: "ApexClass".to_string(),
                full_name: "Foo".to_string(),
                file_paths: vec!["classes/Foo.cls".to_string()],
            }],
            ..Default::default()
        });
        let (_dir, stash) = stash();
        let workflow =
            Workflow::new(api.clone(), &stash).with_tracking(TrackingSynchronizer::new(ledger));

        let err = workflow
            .deploy(
                DeployRequest::components(two_classes(), DeployOptions::default()),
                &mut NoopObserver,
            )
            .await
            .unwrap_err();
        assert_eq!(err.name(), "SourceConflictError");
        assert!(api.calls().is_empty());
        assert_eq!(stash.get(StashCategory::MdapiDeploy).unwrap(), None);

        // forced runs go ahead
        workflow
            .deploy(
                DeployRequest::components(two_classes(), DeployOptions::default())
                    .with_force_overwrite(true),
                &mut NoopObserver,
            )
            .await
            .unwrap();
        assert_eq!(api.calls()[0], "deploy");
    }

    #[tokio::test]
    async fn test_successful_deploy_updates_tracking() {
        let api = Arc::new(FakeApi::default());
        let ledger = Arc::new(FakeLedger::default());
        let (_dir, stash) = stash();
        let workflow = Workflow::new(api, &stash)
            .with_tracking(TrackingSynchronizer::new(ledger.clone()));

        let report = workflow
            .deploy(
                DeployRequest::components(two_classes(), DeployOptions::default()),
                &mut NoopObserver,
            )
            .await
            .unwrap();
        assert_eq!(report.exit_code, 0);
        assert!(report.tracking_updated);
        assert_eq!(*ledger.applied.lock().unwrap(), vec![(2, false)]);
    }

    #[tokio::test]
    async fn test_check_only_deploy_leaves_tracking() {
        let api = Arc::new(FakeApi::default());
        let ledger = Arc::new(FakeLedger::default());
        let (_dir, stash) = stash();
        let workflow = Workflow::new(api.clone(), &stash)
            .with_tracking(TrackingSynchronizer::new(ledger.clone()));

        let report = workflow
            .deploy(
                DeployRequest::components(
                    two_classes(),
                    DeployOptions::default().validate_only(true),
                ),
                &mut NoopObserver,
            )
            .await
            .unwrap();
        assert!(report.success);
        assert!(ledger.applied.lock().unwrap().is_empty());
        assert!(api.deploy_options()[0].check_only);
        assert!(stash
            .get(StashCategory::MdapiDeploy)
            .unwrap()
            .unwrap()
            .components
            .is_empty());
    }

    #[tokio::test]
    async fn test_failed_deploy_with_job_error_is_not_committed() {
        let api = Arc::new(FakeApi::default());
        let mut failed = deploy_result("0Af000000000001", RequestStatus::Failed, true);
        failed.error_message = Some("No package.xml found".to_string());
        api.push_deploy_status(failed);
        let ledger = Arc::new(FakeLedger::default());
        let (_dir, stash) = stash();
        let workflow = Workflow::new(api, &stash)
            .with_tracking(TrackingSynchronizer::new(ledger.clone()));

        let report = workflow
            .deploy(
                DeployRequest::components(two_classes(), DeployOptions::default()),
                &mut NoopObserver,
            )
            .await
            .unwrap();
        assert!(!report.success);
        assert_eq!(report.exit_code, 1);
        assert!(!report.tracking_updated);
        assert!(ledger.applied.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tracked_deploy_resumes_and_commits_from_stash() {
        let api = Arc::new(FakeApi::default());
        api.push_deploy_status(deploy_result("0Af000000000001", RequestStatus::InProgress, false));
        api.push_deploy_status(deploy_result("0Af000000000001", RequestStatus::Succeeded, true));
        let ledger = Arc::new(FakeLedger::default());
        let (_dir, stash) = stash();
        let workflow = Workflow::new(api.clone(), &stash)
            .with_tracking(TrackingSynchronizer::new(ledger.clone()));

        let report = workflow
            .deploy(
                DeployRequest::components(two_classes(), DeployOptions::default())
                    .with_category(StashCategory::SourceDeploy)
                    .with_wait(Wait::Async),
                &mut NoopObserver,
            )
            .await
            .unwrap();
        assert_eq!(report.exit_code, 69);
        assert!(ledger.applied.lock().unwrap().is_empty());
        let entry = stash.get(StashCategory::SourceDeploy).unwrap().unwrap();
        assert_eq!(entry.components.len(), 2);

        let report = workflow
            .deploy_report(None, StashCategory::SourceDeploy, None, Wait::Async, &mut NoopObserver)
            .await
            .unwrap();
        assert_eq!(report.job_id, "0Af000000000001");
        assert_eq!(report.exit_code, 0);
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.tracking_updated);
        assert_eq!(*ledger.applied.lock().unwrap(), vec![(2, false)]);
    }

    #[tokio::test]
    async fn test_report_without_id_or_stash_is_missing_job_id() {
        let api = Arc::new(FakeApi::default());
        let (_dir, stash) = stash();
        let workflow = Workflow::new(api, &stash);

        let err = workflow
            .deploy_report(None, StashCategory::MdapiDeploy, None, Wait::Async, &mut NoopObserver)
            .await
            .unwrap_err();
        assert_eq!(err.name(), "MissingJobId");
    }

    #[tokio::test]
    async fn test_report_resumes_from_stash() {
        let api = Arc::new(FakeApi::default());
        let (_dir, stash) = stash();
        stash
            .set(StashCategory::MdapiDeploy, &StashEntry::job("0AfSTASHED"))
            .unwrap();
        api.push_deploy_status(deploy_result("0AfSTASHED", RequestStatus::SucceededPartial, true));

        let workflow = Workflow::new(api, &stash);
        let report = workflow
            .deploy_report(None, StashCategory::MdapiDeploy, None, Wait::Async, &mut NoopObserver)
            .await
            .unwrap();
        assert_eq!(report.job_id, "0AfSTASHED");
        assert_eq!(report.exit_code, 68);
        assert!(!report.timed_out);
    }

    #[tokio::test]
    async fn test_cancel_deploy_polls_to_canceled() {
        let api = Arc::new(FakeApi::default());
        api.push_deploy_status(deploy_result("0Af1", RequestStatus::Canceling, false));
        api.push_deploy_status(deploy_result("0Af1", RequestStatus::Canceled, true));
        let (_dir, stash) = stash();

        let workflow = Workflow::new(api.clone(), &stash)
            .with_poll_options(PollOptions::default().with_frequency(std::time::Duration::from_millis(1)));
        let report = workflow
            .cancel_deploy(Some("0Af1"), StashCategory::MdapiDeploy, Wait::default(), &mut NoopObserver)
            .await
            .unwrap();
        assert_eq!(report.status, RequestStatus::Canceled);
        assert_eq!(report.exit_code, 1);
        assert_eq!(api.calls()[0], "cancelDeploy");
    }

    #[tokio::test]
    async fn test_quick_deploy_stashes_new_id() {
        let api = Arc::new(FakeApi::default());
        let (_dir, stash) = stash();
        let workflow = Workflow::new(api.clone(), &stash);

        let report = workflow
            .quick_deploy(Some("0AfVALID"), Wait::default(), &mut NoopObserver)
            .await
            .unwrap();
        assert_eq!(report.job_id, "0AfQUICK");
        assert_eq!(
            stash.get(StashCategory::MdapiDeploy).unwrap().unwrap().jobid,
            "0AfQUICK"
        );
    }

    #[tokio::test]
    async fn test_retrieve_stashes_target_and_writes_zip() {
        use base64::Engine;
        use std::io::Write;

        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        zip.start_file("classes/Foo.cls", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"public class Foo {}").unwrap();
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(zip.finish().unwrap().into_inner());

        let api = Arc::new(FakeApi::default());
        let mut done = retrieve_result("09S000000000001", RequestStatus::Succeeded, true);
        done.zip_file = Some(encoded);
        done.file_properties = vec![FileProperties {
            created_by_id: String::new(),
            created_by_name: String::new(),
            created_date: String::new(),
            file_name: "classes/Foo.cls".to_string(),
            full_name: "Foo".to_string(),
            id: String::new(),
            last_modified_by_id: String::new(),
            last_modified_by_name: String::new(),
            last_modified_date: String::new(),
            manageable_state: None,
            namespace_prefix: None,
            component_type: "ApexClass".to_string(),
        }];
        api.push_retrieve_status(done);

        let (dir, stash) = stash();
        let out = dir.path().join("out");
        let ledger = Arc::new(FakeLedger::default());
        let workflow = Workflow::new(api.clone(), &stash)
            .with_tracking(TrackingSynchronizer::new(ledger.clone()));

        let mut set = ComponentSet::new("62.0");
        set.add(SourceComponent::new("ApexClass", "Foo"));
        let report = workflow
            .retrieve(
                RetrieveJobRequest::new(RetrieveTarget::new(&out).with_unzip(true))
                    .with_components(set),
                &mut NoopObserver,
            )
            .await
            .unwrap();

        assert_eq!(report.exit_code, 0);
        assert_eq!(report.outcomes[0].state, ComponentState::Add);
        assert!(out.join("classes/Foo.cls").is_file());
        assert_eq!(*ledger.applied.lock().unwrap(), vec![(1, true)]);

        let entry = stash.get(StashCategory::MdapiRetrieve).unwrap().unwrap();
        assert_eq!(entry.jobid, "09S000000000001");
        assert_eq!(entry.unzip, Some(true));

        let request = &api.retrieve_requests()[0];
        assert!(request.single_package);
        assert_eq!(request.api_version.as_deref(), Some("62.0"));
    }

    #[tokio::test]
    async fn test_retrieve_report_uses_stashed_target() {
        let api = Arc::new(FakeApi::default());
        let (dir, stash) = stash();
        let target = RetrieveTarget::new(dir.path().join("out"));
        stash
            .set(StashCategory::MdapiRetrieve, &target.to_stash_entry("09S1"))
            .unwrap();
        api.push_retrieve_status(retrieve_result("09S1", RequestStatus::InProgress, false));

        let workflow = Workflow::new(api, &stash);
        let report = workflow
            .retrieve_report(None, None, Wait::Async, &mut NoopObserver)
            .await
            .unwrap();
        assert!(report.timed_out);
        assert_eq!(report.exit_code, 69);

        let err = workflow
            .retrieve_report(Some("09SOTHER"), None, Wait::Async, &mut NoopObserver)
            .await
            .unwrap_err();
        assert_eq!(err.name(), "InvalidInputError");
    }
}
