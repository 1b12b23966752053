//! Response parsing for the SOAP operations.
//!
//! Scalars of a result are read after stripping its nested detail blocks so
//! an `<id>` or `<success>` inside a component entry never shadows the
//! top-level field.

use crate::deploy::{CancelDeployResult, ComponentFailure, DeployResult};
use crate::error::{Error, ErrorKind, Result};
use crate::retrieve::{RetrieveMessage, RetrieveResult};
use crate::types::{
    ComponentSuccess, DescribeMetadataResult, FileProperties, MetadataComponent, MetadataType,
    RequestStatus, SoapFault, TestFailure,
};
use crate::xml::{
    extract_blocks, extract_bool, extract_element, extract_elements, extract_u32, strip_blocks,
};

fn missing(field: &str) -> Error {
    Error::new(ErrorKind::InvalidResponse(format!("Missing {}", field)))
}

fn parse_status(xml: &str) -> RequestStatus {
    extract_element(xml, "status")
        .or_else(|| extract_element(xml, "state"))
        .and_then(|s| s.parse().ok())
        .unwrap_or(RequestStatus::Pending)
}

/// Parse a SOAP fault from the response.
pub(crate) fn parse_soap_fault(xml: &str) -> Option<SoapFault> {
    if !xml.contains("faultcode") {
        return None;
    }

    let fault_code = extract_element(xml, "faultcode")?;
    let fault_string =
        extract_element(xml, "faultstring").unwrap_or_else(|| "Unknown error".to_string());

    Some(SoapFault {
        fault_code,
        fault_string,
    })
}

/// Parse a `checkDeployStatus` result.
pub(crate) fn parse_deploy_result(xml: &str) -> Result<DeployResult> {
    let scalars = strip_blocks(xml, "details");

    let id = extract_element(&scalars, "id").ok_or_else(|| missing("id"))?;

    Ok(DeployResult {
        id,
        done: extract_bool(&scalars, "done"),
        status: parse_status(&scalars),
        success: extract_bool(&scalars, "success"),
        check_only: extract_bool(&scalars, "checkOnly"),
        error_message: extract_element(&scalars, "errorMessage"),
        number_components_deployed: extract_u32(&scalars, "numberComponentsDeployed"),
        number_components_errors: extract_u32(&scalars, "numberComponentErrors"),
        number_components_total: extract_u32(&scalars, "numberComponentsTotal"),
        number_tests_completed: extract_u32(&scalars, "numberTestsCompleted"),
        number_tests_errors: extract_u32(&scalars, "numberTestErrors"),
        number_tests_total: extract_u32(&scalars, "numberTestsTotal"),
        component_failures: parse_component_failures(xml),
        component_successes: parse_component_successes(xml),
        test_failures: parse_test_failures(xml),
        state_detail: extract_element(&scalars, "stateDetail"),
    })
}

pub(crate) fn parse_cancel_deploy_result(xml: &str) -> Result<CancelDeployResult> {
    Ok(CancelDeployResult {
        id: extract_element(xml, "id").ok_or_else(|| missing("id"))?,
        done: extract_bool(xml, "done"),
    })
}

pub(crate) fn parse_component_failures(xml: &str) -> Vec<ComponentFailure> {
    extract_blocks(xml, "componentFailures")
        .into_iter()
        .map(|block| ComponentFailure {
            component_type: extract_element(block, "componentType").filter(|s| !s.is_empty()),
            file_name: extract_element(block, "fileName"),
            full_name: extract_element(block, "fullName"),
            line_number: extract_element(block, "lineNumber").and_then(|s| s.parse().ok()),
            column_number: extract_element(block, "columnNumber").and_then(|s| s.parse().ok()),
            problem: extract_element(block, "problem")
                .unwrap_or_else(|| "Unknown problem".to_string()),
            problem_type: extract_element(block, "problemType")
                .unwrap_or_else(|| "Error".to_string()),
            created: extract_bool(block, "created"),
            deleted: extract_bool(block, "deleted"),
        })
        .collect()
}

pub(crate) fn parse_component_successes(xml: &str) -> Vec<ComponentSuccess> {
    extract_blocks(xml, "componentSuccesses")
        .into_iter()
        .map(|block| ComponentSuccess {
            component_type: extract_element(block, "componentType").filter(|s| !s.is_empty()),
            file_name: extract_element(block, "fileName"),
            full_name: extract_element(block, "fullName"),
            created: extract_bool(block, "created"),
            changed: extract_bool(block, "changed"),
            deleted: extract_bool(block, "deleted"),
        })
        .collect()
}

/// Parse Apex test failures from `runTestResult`.
pub(crate) fn parse_test_failures(xml: &str) -> Vec<TestFailure> {
    extract_blocks(xml, "failures")
        .into_iter()
        .map(|block| TestFailure {
            name: extract_element(block, "name"),
            method_name: extract_element(block, "methodName"),
            message: extract_element(block, "message"),
            stack_trace: extract_element(block, "stackTrace"),
            namespace: extract_element(block, "namespace"),
        })
        .collect()
}

/// Parse a `checkRetrieveStatus` (or `retrieve`) result.
pub(crate) fn parse_retrieve_result(xml: &str) -> Result<RetrieveResult> {
    let scalars = strip_blocks(&strip_blocks(xml, "fileProperties"), "messages");

    let id = extract_element(&scalars, "id").ok_or_else(|| missing("id"))?;

    Ok(RetrieveResult {
        id,
        done: extract_bool(&scalars, "done"),
        status: parse_status(&scalars),
        success: extract_bool(&scalars, "success"),
        error_message: extract_element(&scalars, "errorMessage"),
        error_status_code: extract_element(&scalars, "errorStatusCode"),
        zip_file: extract_element(&scalars, "zipFile").filter(|z| !z.is_empty()),
        file_properties: parse_file_properties(xml),
        messages: parse_retrieve_messages(xml),
    })
}

pub(crate) fn parse_file_properties(xml: &str) -> Vec<FileProperties> {
    extract_blocks(xml, "fileProperties")
        .into_iter()
        .filter_map(|block| {
            let file_name = extract_element(block, "fileName")?;
            let full_name = extract_element(block, "fullName")?;
            Some(FileProperties {
                created_by_id: extract_element(block, "createdById").unwrap_or_default(),
                created_by_name: extract_element(block, "createdByName").unwrap_or_default(),
                created_date: extract_element(block, "createdDate").unwrap_or_default(),
                file_name,
                full_name,
                id: extract_element(block, "id").unwrap_or_default(),
                last_modified_by_id: extract_element(block, "lastModifiedById")
                    .unwrap_or_default(),
                last_modified_by_name: extract_element(block, "lastModifiedByName")
                    .unwrap_or_default(),
                last_modified_date: extract_element(block, "lastModifiedDate")
                    .unwrap_or_default(),
                manageable_state: extract_element(block, "manageableState"),
                namespace_prefix: extract_element(block, "namespacePrefix"),
                component_type: extract_element(block, "type").unwrap_or_default(),
            })
        })
        .collect()
}

pub(crate) fn parse_retrieve_messages(xml: &str) -> Vec<RetrieveMessage> {
    extract_blocks(xml, "messages")
        .into_iter()
        .filter_map(|block| {
            Some(RetrieveMessage {
                file_name: extract_element(block, "fileName")?,
                problem: extract_element(block, "problem")?,
            })
        })
        .collect()
}

/// Parse `listMetadata` results; `metadata_type` fills entries without a `<type>`.
pub(crate) fn parse_list_metadata_result(xml: &str, metadata_type: &str) -> Vec<MetadataComponent> {
    extract_blocks(xml, "result")
        .into_iter()
        .filter_map(|block| {
            let full_name = extract_element(block, "fullName")?;
            Some(MetadataComponent {
                full_name,
                metadata_type: extract_element(block, "type")
                    .unwrap_or_else(|| metadata_type.to_string()),
                file_name: extract_element(block, "fileName"),
                id: extract_element(block, "id").filter(|s| !s.is_empty()),
                namespace_prefix: extract_element(block, "namespacePrefix")
                    .filter(|s| !s.is_empty()),
                last_modified_by_name: extract_element(block, "lastModifiedByName"),
                last_modified_date: extract_element(block, "lastModifiedDate"),
                manageable_state: extract_element(block, "manageableState"),
            })
        })
        .collect()
}

pub(crate) fn parse_describe_metadata_result(xml: &str) -> Result<DescribeMetadataResult> {
    if !xml.contains("describeMetadataResponse") && !xml.contains("<metadataObjects>") {
        return Err(Error::new(ErrorKind::InvalidResponse(
            "Not a describeMetadata response".to_string(),
        )));
    }

    let metadata_objects = extract_blocks(xml, "metadataObjects")
        .into_iter()
        .filter_map(|block| {
            Some(MetadataType {
                xml_name: extract_element(block, "xmlName")?,
                directory_name: extract_element(block, "directoryName"),
                suffix: extract_element(block, "suffix").filter(|s| !s.is_empty()),
                meta_file: extract_bool(block, "metaFile"),
                in_folder: extract_bool(block, "inFolder"),
                child_xml_names: extract_elements(block, "childXmlNames"),
            })
        })
        .collect();

    let scalars = strip_blocks(xml, "metadataObjects");
    Ok(DescribeMetadataResult {
        metadata_objects,
        organization_namespace: extract_element(&scalars, "organizationNamespace")
            .filter(|s| !s.is_empty()),
        partial_save_allowed: extract_bool(&scalars, "partialSaveAllowed"),
        test_required: extract_bool(&scalars, "testRequired"),
    })
}
