use std::sync::Arc;

use async_trait::async_trait;
use busbar_sf_metadata::{DeployOptions, DeployResult};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use super::{JobHandle, JobKind, JobResult};
use crate::component::ComponentSet;
use crate::engine::MetadataApi;
use crate::error::{Error, ErrorKind, Result};

/// Handle on a metadata deployment.
pub struct DeployJob {
    api: Arc<dyn MetadataApi>,
    id: String,
    terminal: OnceCell<DeployResult>,
}

impl std::fmt::Debug for DeployJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployJob")
            .field("id", &self.id)
            .field("terminal", &self.terminal.initialized())
            .finish()
    }
}

impl DeployJob {
    /// Zip a component set and start deploying it.
    ///
    /// Fails with `NoComponentsFound` before any remote call when the set is empty.
    pub async fn submit(
        api: Arc<dyn MetadataApi>,
        components: &ComponentSet,
        options: &DeployOptions,
    ) -> Result<Self> {
        components.require_non_empty()?;
        let package = components.to_zip()?;
        debug!(
            components = components.len(),
            zip_bytes = package.len(),
            "Built deploy package"
        );
        Self::submit_zip(api, &package, options).await
    }

    /// Start deploying an already built package zip.
    #[instrument(skip(api, package, options), fields(zip_bytes = package.len()))]
    pub async fn submit_zip(
        api: Arc<dyn MetadataApi>,
        package: &[u8],
        options: &DeployOptions,
    ) -> Result<Self> {
        let id = api.deploy(package, options).await?;
        info!(job_id = %id, check_only = options.check_only, "Deploy submitted");
        Ok(Self::attach(api, id))
    }

    /// Deploy a validated check-only job without re-running tests.
    #[instrument(skip(api))]
    pub async fn quick(api: Arc<dyn MetadataApi>, validation_id: &str) -> Result<Self> {
        let id = api.deploy_recent_validation(validation_id).await?;
        info!(job_id = %id, validation_id, "Quick deploy submitted");
        Ok(Self::attach(api, id))
    }

    /// Resume tracking a deploy submitted earlier.
    pub fn attach(api: Arc<dyn MetadataApi>, id: impl Into<String>) -> Self {
        Self {
            api,
            id: id.into(),
            terminal: OnceCell::new(),
        }
    }
}

#[async_trait]
impl JobHandle for DeployJob {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> JobKind {
        JobKind::Deploy
    }

    async fn check_status(&self) -> Result<JobResult> {
        if let Some(result) = self.terminal.get() {
            return Ok(JobResult::Deploy(result.clone()));
        }

        let result = self.api.check_deploy_status(&self.id, true).await?;
        let status = JobResult::Deploy(result);
        if status.is_done() {
            if let JobResult::Deploy(result) = &status {
                let _ = self.terminal.set(result.clone());
            }
        }
        Ok(status)
    }

    async fn cancel(&self) -> Result<()> {
        let ack = self.api.cancel_deploy(&self.id).await.map_err(|e| {
            Error::with_source(ErrorKind::CancelFailed(e.kind.to_string()), e)
        })?;
        info!(job_id = %ack.id, done = ack.done, "Deploy cancel requested");
        Ok(())
    }
}
