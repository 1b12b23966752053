use base64::{engine::general_purpose, Engine as _};
use tracing::instrument;

use super::xml_helpers::{parse_cancel_deploy_result, parse_deploy_result};
use crate::deploy::{CancelDeployResult, DeployOptions, DeployResult};
use crate::error::{Error, ErrorKind, Result};
use crate::types::TestLevel;
use crate::xml;

impl super::MetadataClient {
    /// Deploy a metadata package.
    ///
    /// The `package_zip` must be a properly structured zip file with metadata
    /// in the correct directory structure (e.g., `classes/MyClass.cls`).
    ///
    /// Returns the async process ID as soon as the request is queued; the
    /// call never waits for the deployment itself.
    #[instrument(skip(self, package_zip, options), fields(zip_bytes = package_zip.len()))]
    pub async fn deploy(&self, package_zip: &[u8], options: &DeployOptions) -> Result<String> {
        if package_zip.is_empty() {
            return Err(Error::new(ErrorKind::InvalidInput(
                "Deploy package zip is empty".to_string(),
            )));
        }

        let encoded_zip = general_purpose::STANDARD.encode(package_zip);

        let test_level_xml = options
            .test_level
            .map(|tl| format!("<testLevel>{}</testLevel>", tl))
            .unwrap_or_default();

        let run_tests_xml = if options.test_level == Some(TestLevel::RunSpecifiedTests) {
            options
                .run_tests
                .iter()
                .map(|t| format!("<runTests>{}</runTests>", xml::escape(t)))
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            String::new()
        };

        let body = format!(
            r#"<deploy xmlns="http://soap.sforce.com/2006/04/metadata">
      <ZipFile>{zip_file}</ZipFile>
      <DeployOptions>
        <allowMissingFiles>{allow_missing}</allowMissingFiles>
        <autoUpdatePackage>{auto_update}</autoUpdatePackage>
        <checkOnly>{check_only}</checkOnly>
        <ignoreWarnings>{ignore_warnings}</ignoreWarnings>
        <performRetrieve>{perform_retrieve}</performRetrieve>
        <purgeOnDelete>{purge_on_delete}</purgeOnDelete>
        <rollbackOnError>{rollback_on_error}</rollbackOnError>
        <runAllTests>{run_all_tests}</runAllTests>
        <singlePackage>{single_package}</singlePackage>
        {test_level}
        {run_tests}
      </DeployOptions>
    </deploy>"#,
            zip_file = encoded_zip,
            allow_missing = options.allow_missing_files,
            auto_update = options.auto_update_package,
            check_only = options.check_only,
            ignore_warnings = options.ignore_warnings,
            perform_retrieve = options.perform_retrieve,
            purge_on_delete = options.purge_on_delete,
            rollback_on_error = options.rollback_on_error,
            run_all_tests = options.run_all_tests,
            single_package = options.single_package,
            test_level = test_level_xml,
            run_tests = run_tests_xml,
        );

        let response_text = self.call("deploy", &body).await?;

        xml::extract_element(&response_text, "id").ok_or_else(|| {
            Error::new(ErrorKind::InvalidResponse(
                "No async process ID in deploy response".to_string(),
            ))
        })
    }

    /// Check the status of a deploy operation.
    #[instrument(skip(self))]
    pub async fn check_deploy_status(
        &self,
        async_process_id: &str,
        include_details: bool,
    ) -> Result<DeployResult> {
        let body = format!(
            r#"<checkDeployStatus xmlns="http://soap.sforce.com/2006/04/metadata">
      <asyncProcessId>{process_id}</asyncProcessId>
      <includeDetails>{include_details}</includeDetails>
    </checkDeployStatus>"#,
            process_id = xml::escape(async_process_id),
            include_details = include_details,
        );

        let response_text = self.call("checkDeployStatus", &body).await?;
        parse_deploy_result(&response_text)
    }

    /// Cancel an in-progress deployment.
    ///
    /// Cancellation is asynchronous: this returns once the request is
    /// accepted and the deployment must still be polled until it reaches a
    /// terminal status.
    #[instrument(skip(self))]
    pub async fn cancel_deploy(&self, async_process_id: &str) -> Result<CancelDeployResult> {
        let body = format!(
            r#"<cancelDeploy xmlns="http://soap.sforce.com/2006/04/metadata">
      <String>{process_id}</String>
    </cancelDeploy>"#,
            process_id = xml::escape(async_process_id),
        );

        let response_text = self.call("cancelDeploy", &body).await?;
        parse_cancel_deploy_result(&response_text)
    }

    /// Quick-deploy a recently validated deployment without re-running Apex tests.
    ///
    /// First deploy with `checkOnly=true` to validate and run tests. If validation
    /// succeeds, call this method with the validation deploy ID.
    #[instrument(skip(self))]
    pub async fn deploy_recent_validation(&self, validation_id: &str) -> Result<String> {
        let body = format!(
            r#"<deployRecentValidation xmlns="http://soap.sforce.com/2006/04/metadata">
      <validationId>{validation_id}</validationId>
    </deployRecentValidation>"#,
            validation_id = xml::escape(validation_id),
        );

        let response_text = self.call("deployRecentValidation", &body).await?;

        xml::extract_element(&response_text, "result")
            .or_else(|| xml::extract_element(&response_text, "id"))
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidResponse(
                    "No async process ID in deployRecentValidation response".to_string(),
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::super::MetadataClient;
    use crate::deploy::DeployOptions;
    use crate::error::ErrorKind;
    use crate::types::{RequestStatus, TestLevel};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn soap(result: &str, operation: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/"><soapenv:Body><{op}Response><result>{result}</result></{op}Response></soapenv:Body></soapenv:Envelope>"#,
            op = operation,
            result = result
        )
    }

    #[tokio::test]
    async fn test_deploy_returns_async_id() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/Soap/m/62.0"))
            .and(header("soapaction", "deploy"))
            .and(body_string_contains("<checkOnly>true</checkOnly>"))
            .and(body_string_contains("<runTests>FooTest</runTests>"))
            .respond_with(ResponseTemplate::new(200).set_body_string(soap(
                "<done>false</done><id>0Af000000000001</id><state>Queued</state>",
                "deploy",
            )))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = MetadataClient::from_parts(mock_server.uri(), "token");
        let options = DeployOptions::default()
            .validate_only(true)
            .with_tests(
                Some(TestLevel::RunSpecifiedTests),
                vec!["FooTest".to_string()],
            );
        let id = client.deploy(b"PK\x03\x04", &options).await.unwrap();
        assert_eq!(id, "0Af000000000001");
    }

    #[tokio::test]
    async fn test_deploy_rejects_empty_zip_without_calling_server() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = MetadataClient::from_parts(mock_server.uri(), "token");
        let err = client
            .deploy(&[], &DeployOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_deploy_soap_fault() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string(
                "<soapenv:Envelope><soapenv:Body><soapenv:Fault><faultcode>sf:INVALID_SESSION_ID</faultcode><faultstring>Invalid Session ID found in SessionHeader</faultstring></soapenv:Fault></soapenv:Body></soapenv:Envelope>",
            ))
            .mount(&mock_server)
            .await;

        let client = MetadataClient::from_parts(mock_server.uri(), "expired");
        let err = client
            .deploy(b"PK", &DeployOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.fault_code(), Some("sf:INVALID_SESSION_ID"));
    }

    #[tokio::test]
    async fn test_check_deploy_status_in_progress() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("soapaction", "checkDeployStatus"))
            .and(body_string_contains("<includeDetails>true</includeDetails>"))
            .respond_with(ResponseTemplate::new(200).set_body_string(soap(
                "<checkOnly>false</checkOnly><done>false</done><id>0Af1</id><numberComponentErrors>0</numberComponentErrors><numberComponentsDeployed>3</numberComponentsDeployed><numberComponentsTotal>7</numberComponentsTotal><status>InProgress</status><success>false</success>",
                "checkDeployStatus",
            )))
            .mount(&mock_server)
            .await;

        let client = MetadataClient::from_parts(mock_server.uri(), "token");
        let result = client.check_deploy_status("0Af1", true).await.unwrap();
        assert!(!result.done);
        assert_eq!(result.status, RequestStatus::InProgress);
        let progress = result.progress().unwrap();
        assert_eq!(progress.components_deployed, 3);
        assert_eq!(progress.components_total, 7);
    }

    #[tokio::test]
    async fn test_cancel_deploy() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("soapaction", "cancelDeploy"))
            .and(body_string_contains("<String>0Af1</String>"))
            .respond_with(ResponseTemplate::new(200).set_body_string(soap(
                "<done>false</done><id>0Af1</id>",
                "cancelDeploy",
            )))
            .mount(&mock_server)
            .await;

        let client = MetadataClient::from_parts(mock_server.uri(), "token");
        let result = client.cancel_deploy("0Af1").await.unwrap();
        assert_eq!(result.id, "0Af1");
        assert!(!result.done);
    }

    #[tokio::test]
    async fn test_deploy_recent_validation() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("soapaction", "deployRecentValidation"))
            .and(body_string_contains("<validationId>0Af9</validationId>"))
            .respond_with(ResponseTemplate::new(200).set_body_string(soap(
                "0Af10",
                "deployRecentValidation",
            )))
            .mount(&mock_server)
            .await;

        let client = MetadataClient::from_parts(mock_server.uri(), "token");
        let id = client.deploy_recent_validation("0Af9").await.unwrap();
        assert_eq!(id, "0Af10");
    }
}
