//! In-memory doubles shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use busbar_sf_metadata::{
    CancelDeployResult, DeployOptions, DeployResult, DescribeMetadataResult, ErrorKind,
    MetadataComponent, RequestStatus, Result, RetrieveRequest, RetrieveResult,
};

use crate::engine::MetadataApi;

pub(crate) fn deploy_result(id: &str, status: RequestStatus, done: bool) -> DeployResult {
    DeployResult {
        id: id.to_string(),
        done,
        status,
        success: matches!(status, RequestStatus::Succeeded | RequestStatus::SucceededPartial),
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

pub(crate) fn retrieve_result(id: &str, status: RequestStatus, done: bool) -> RetrieveResult {
    RetrieveResult {
        id: id.to_string(),
        done,
        status,
        success: status == RequestStatus::Succeeded,
        error_message: None,
        error_status_code: None,
        zip_file: None,
        file_properties: vec![],
        messages: vec![],
    }
}

/// Scripted metadata engine. Each status queue yields its entries in order
/// and then keeps repeating the last one.
#[derive(Default)]
pub(crate) struct FakeApi {
    calls: Mutex<Vec<String>>,
    deploy_statuses: Mutex<VecDeque<DeployResult>>,
    retrieve_statuses: Mutex<VecDeque<RetrieveResult>>,
    deployed_zips: Mutex<Vec<Vec<u8>>>,
    deploy_options: Mutex<Vec<DeployOptions>>,
    retrieve_requests: Mutex<Vec<RetrieveRequest>>,
    listings: Mutex<HashMap<String, Vec<MetadataComponent>>>,
    cancel_fault: Option<(String, String)>,
}

impl FakeApi {
    pub(crate) fn with_cancel_fault(mut self, code: &str, message: &str) -> Self {
        self.cancel_fault = Some((code.to_string(), message.to_string()));
        self
    }

    pub(crate) fn push_deploy_status(&self, result: DeployResult) {
        self.deploy_statuses.lock().unwrap().push_back(result);
    }

    pub(crate) fn push_retrieve_status(&self, result: RetrieveResult) {
        self.retrieve_statuses.lock().unwrap().push_back(result);
    }

    pub(crate) fn set_listing(&self, metadata_type: &str, components: Vec<MetadataComponent>) {
        self.listings
            .lock()
            .unwrap()
            .insert(metadata_type.to_string(), components);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn deployed_zips(&self) -> Vec<Vec<u8>> {
        self.deployed_zips.lock().unwrap().clone()
    }

    pub(crate) fn deploy_options(&self) -> Vec<DeployOptions> {
        self.deploy_options.lock().unwrap().clone()
    }

    pub(crate) fn retrieve_requests(&self) -> Vec<RetrieveRequest> {
        self.retrieve_requests.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn next<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl MetadataApi for FakeApi {
    fn api_version(&self) -> &str {
        "62.0"
    }

    async fn deploy(&self, package_zip: &[u8], options: &DeployOptions) -> Result<String> {
        self.record("deploy");
        self.deployed_zips.lock().unwrap().push(package_zip.to_vec());
        self.deploy_options.lock().unwrap().push(options.clone());
        Ok("0Af000000000001".to_string())
    }

    async fn check_deploy_status(&self, id: &str, _include_details: bool) -> Result<DeployResult> {
        self.record("checkDeployStatus");
        Ok(Self::next(&self.deploy_statuses)
            .unwrap_or_else(|| deploy_result(id, RequestStatus::Succeeded, true)))
    }

    async fn cancel_deploy(&self, id: &str) -> Result<CancelDeployResult> {
        self.record("cancelDeploy");
        if let Some((code, message)) = &self.cancel_fault {
            return Err(busbar_sf_metadata::Error::new(ErrorKind::SoapFault {
                code: code.clone(),
                message: message.clone(),
            }));
        }
        Ok(CancelDeployResult {
            id: id.to_string(),
            done: false,
        })
    }

    async fn deploy_recent_validation(&self, validation_id: &str) -> Result<String> {
        self.record(format!("deployRecentValidation:{}", validation_id));
        Ok("0AfQUICK".to_string())
    }

    async fn retrieve(&self, request: &RetrieveRequest) -> Result<String> {
        self.record("retrieve");
        self.retrieve_requests.lock().unwrap().push(request.clone());
        Ok("09S000000000001".to_string())
    }

    async fn check_retrieve_status(&self, id: &str, _include_zip: bool) -> Result<RetrieveResult> {
        self.record("checkRetrieveStatus");
        Ok(Self::next(&self.retrieve_statuses)
            .unwrap_or_else(|| retrieve_result(id, RequestStatus::Succeeded, true)))
    }

    async fn list_metadata(
        &self,
        metadata_type: &str,
        _folder: Option<&str>,
    ) -> Result<Vec<MetadataComponent>> {
        self.record(format!("listMetadata:{}", metadata_type));
        Ok(self
            .listings
            .lock()
            .unwrap()
            .get(metadata_type)
            .cloned()
            .unwrap_or_default())
    }

    async fn describe_metadata(&self) -> Result<DescribeMetadataResult> {
        self.record("describeMetadata");
        Ok(DescribeMetadataResult {
            metadata_objects: vec![],
            organization_namespace: None,
            partial_save_allowed: true,
            test_required: false,
        })
    }
}
