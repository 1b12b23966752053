use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use busbar_sf_metadata::{RequestStatus, RetrieveRequest, RetrieveResult};
use tokio::sync::OnceCell;
use tracing::{info, instrument};

use super::{JobHandle, JobKind, JobResult};
use crate::engine::MetadataApi;
use crate::error::{Error, ErrorKind, Result};

/// Handle on a metadata retrieval.
///
/// The Metadata API has no call to cancel a retrieve, so cancellation is
/// local: the next non-terminal status check resolves to `Canceled`. A
/// terminal payload seen first still wins.
pub struct RetrieveJob {
    api: Arc<dyn MetadataApi>,
    id: String,
    cancel_requested: AtomicBool,
    terminal: OnceCell<RetrieveResult>,
}

impl std::fmt::Debug for RetrieveJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrieveJob")
            .field("id", &self.id)
            .field("cancel_requested", &self.cancel_requested.load(Ordering::SeqCst))
            .field("terminal", &self.terminal.initialized())
            .finish()
    }
}

impl RetrieveJob {
    #[instrument(skip(api, request))]
    pub async fn submit(api: Arc<dyn MetadataApi>, request: &RetrieveRequest) -> Result<Self> {
        if request.is_empty() {
            return Err(Error::new(ErrorKind::NoComponentsFound(
                "nothing to retrieve".to_string(),
            )));
        }
        let id = api.retrieve(request).await?;
        info!(job_id = %id, packages = request.package_names.len(), "Retrieve submitted");
        Ok(Self::attach(api, id))
    }

    pub fn attach(api: Arc<dyn MetadataApi>, id: impl Into<String>) -> Self {
        Self {
            api,
            id: id.into(),
            cancel_requested: AtomicBool::new(false),
            terminal: OnceCell::new(),
        }
    }

    fn canceled_result(&self) -> RetrieveResult {
        RetrieveResult {
            id: self.id.clone(),
            done: true,
            status: RequestStatus::Canceled,
            success: false,
            error_message: Some("Retrieve canceled".to_string()),
            error_status_code: None,
            zip_file: None,
            file_properties: Vec::new(),
            messages: Vec::new(),
        }
    }
}

#[async_trait]
impl JobHandle for RetrieveJob {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> JobKind {
        JobKind::Retrieve
    }

    async fn check_status(&self) -> Result<JobResult> {
        if let Some(result) = self.terminal.get() {
            return Ok(JobResult::Retrieve(result.clone()));
        }

        let mut result = self.api.check_retrieve_status(&self.id, true).await?;
        let done = result.done || result.status.is_terminal();
        if !done && self.cancel_requested.load(Ordering::SeqCst) {
            result = self.canceled_result();
        }
        if result.done || result.status.is_terminal() {
            let _ = self.terminal.set(result.clone());
        }
        Ok(JobResult::Retrieve(result))
    }

    async fn cancel(&self) -> Result<()> {
        if self.terminal.initialized() {
            return Err(Error::new(ErrorKind::CancelFailed(format!(
                "retrieve {} already finished",
                self.id
            ))));
        }
        self.cancel_requested.store(true, Ordering::SeqCst);
        info!(job_id = %self.id, "Retrieve cancel requested");
        Ok(())
    }
}
