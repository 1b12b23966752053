//! The metadata engine seam.
//!
//! Everything in this crate talks to the org through [`MetadataApi`], so
//! tests can substitute an in-memory fake for the SOAP client.

use async_trait::async_trait;
use busbar_sf_metadata::{
    CancelDeployResult, DeployOptions, DeployResult, DescribeMetadataResult, MetadataClient,
    MetadataComponent, Result, RetrieveRequest, RetrieveResult,
};

/// Remote operations consumed by job handles and workflows.
#[async_trait]
pub trait MetadataApi: Send + Sync {
    /// API version used for manifests built on behalf of this engine.
    fn api_version(&self) -> &str;

    async fn deploy(&self, package_zip: &[u8], options: &DeployOptions) -> Result<String>;

    async fn check_deploy_status(&self, id: &str, include_details: bool) -> Result<DeployResult>;

    async fn cancel_deploy(&self, id: &str) -> Result<CancelDeployResult>;

    async fn deploy_recent_validation(&self, validation_id: &str) -> Result<String>;

    async fn retrieve(&self, request: &RetrieveRequest) -> Result<String>;

    async fn check_retrieve_status(&self, id: &str, include_zip: bool) -> Result<RetrieveResult>;

    async fn list_metadata(
        &self,
        metadata_type: &str,
        folder: Option<&str>,
    ) -> Result<Vec<MetadataComponent>>;

    async fn describe_metadata(&self) -> Result<DescribeMetadataResult>;
}

#[async_trait]
impl MetadataApi for MetadataClient {
    fn api_version(&self) -> &str {
        MetadataClient::api_version(self)
    }

    async fn deploy(&self, package_zip: &[u8], options: &DeployOptions) -> Result<String> {
        MetadataClient::deploy(self, package_zip, options).await
    }

    async fn check_deploy_status(&self, id: &str, include_details: bool) -> Result<DeployResult> {
        MetadataClient::check_deploy_status(self, id, include_details).await
    }

    async fn cancel_deploy(&self, id: &str) -> Result<CancelDeployResult> {
        MetadataClient::cancel_deploy(self, id).await
    }

    async fn deploy_recent_validation(&self, validation_id: &str) -> Result<String> {
        MetadataClient::deploy_recent_validation(self, validation_id).await
    }

    async fn retrieve(&self, request: &RetrieveRequest) -> Result<String> {
        MetadataClient::retrieve(self, request).await
    }

    async fn check_retrieve_status(&self, id: &str, include_zip: bool) -> Result<RetrieveResult> {
        MetadataClient::check_retrieve_status(self, id, include_zip).await
    }

    async fn list_metadata(
        &self,
        metadata_type: &str,
        folder: Option<&str>,
    ) -> Result<Vec<MetadataComponent>> {
        MetadataClient::list_metadata(self, metadata_type, folder).await
    }

    async fn describe_metadata(&self) -> Result<DescribeMetadataResult> {
        MetadataClient::describe_metadata(self).await
    }
}
