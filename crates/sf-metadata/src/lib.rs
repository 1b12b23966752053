//! # busbar-sf-metadata
//!
//! Salesforce Metadata API client for deploying and retrieving metadata.
//!
//! ## Features
//!
//! - **Deploy** - Start, check, cancel and quick-deploy metadata packages
//! - **Retrieve** - Retrieve unpackaged manifests or named packages
//! - **List Metadata** - List metadata components by type
//! - **Describe Metadata** - Get available metadata types
//!
//! Every operation is a single SOAP round trip. Waiting for an async
//! process to finish is left to the caller.
//!
//! ## Example
//!
//! ```rust,ignore
//! use busbar_sf_metadata::{DeployOptions, MetadataClient, PackageManifest, RetrieveRequest};
//!
//! let client = MetadataClient::from_parts(instance_url, access_token);
//!
//! let zip_bytes = std::fs::read("package.zip")?;
//! let async_id = client.deploy(&zip_bytes, &DeployOptions::default()).await?;
//! let status = client.check_deploy_status(&async_id, true).await?;
//! println!("Deploy status: {}", status.status);
//!
//! let manifest = PackageManifest::new("62.0").add_type("ApexClass", vec!["*".to_string()]);
//! let retrieve_id = client.retrieve(&RetrieveRequest::unpackaged(manifest)).await?;
//! ```

mod client;
mod deploy;
mod error;
mod retrieve;
mod types;
pub mod xml;

pub use client::MetadataClient;
pub use deploy::{CancelDeployResult, ComponentFailure, DeployOptions, DeployProgress, DeployResult};
pub use error::{Error, ErrorKind, Result};
pub use retrieve::{
    PackageManifest, PackageTypeMembers, RetrieveMessage, RetrieveRequest, RetrieveResult,
};
pub use types::{
    ComponentSuccess, DescribeMetadataResult, FileProperties, MetadataComponent, MetadataType,
    RequestStatus, SoapFault, TestFailure, TestLevel, DEFAULT_API_VERSION,
};
