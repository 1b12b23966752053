use tracing::instrument;

use super::xml_helpers::parse_retrieve_result;
use crate::error::{Error, ErrorKind, Result};
use crate::retrieve::{RetrieveRequest, RetrieveResult};
use crate::xml;

impl super::MetadataClient {
    /// Start a retrieve operation.
    ///
    /// Use a `PackageManifest` to safely specify what to retrieve.
    /// All values are properly XML-escaped to prevent injection attacks.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use busbar_sf_metadata::{MetadataClient, PackageManifest, RetrieveRequest};
    ///
    /// let manifest = PackageManifest::new("62.0")
    ///     .add_type("ApexClass", vec!["*".to_string()])
    ///     .add_type("ApexTrigger", vec!["*".to_string()]);
    ///
    /// let async_id = client.retrieve(&RetrieveRequest::unpackaged(manifest)).await?;
    /// ```
    #[instrument(skip(self, request))]
    pub async fn retrieve(&self, request: &RetrieveRequest) -> Result<String> {
        if request.is_empty() {
            return Err(Error::new(ErrorKind::InvalidInput(
                "Retrieve request names no components or packages".to_string(),
            )));
        }

        let api_version = request
            .api_version
            .as_deref()
            .unwrap_or(self.api_version());

        let package_names_xml: String = request
            .package_names
            .iter()
            .map(|name| format!("<packageNames>{}</packageNames>", xml::escape(name)))
            .collect::<Vec<_>>()
            .join("\n        ");

        let unpackaged_xml = request
            .unpackaged
            .as_ref()
            .filter(|m| !m.is_empty())
            .map(|m| format!("<unpackaged>\n          {}\n        </unpackaged>", m.to_xml()))
            .unwrap_or_default();

        let body = format!(
            r#"<retrieve xmlns="http://soap.sforce.com/2006/04/metadata">
      <retrieveRequest>
        <apiVersion>{api_version}</apiVersion>
        {package_names}
        <singlePackage>{single_package}</singlePackage>
        {unpackaged}
      </retrieveRequest>
    </retrieve>"#,
            api_version = xml::escape(api_version),
            package_names = package_names_xml,
            single_package = request.single_package,
            unpackaged = unpackaged_xml,
        );

        let response_text = self.call("retrieve", &body).await?;

        xml::extract_element(&response_text, "id").ok_or_else(|| {
            Error::new(ErrorKind::InvalidResponse(
                "No async process ID in retrieve response".to_string(),
            ))
        })
    }

    /// Check the status of a retrieve operation.
    #[instrument(skip(self))]
    pub async fn check_retrieve_status(
        &self,
        async_process_id: &str,
        include_zip: bool,
    ) -> Result<RetrieveResult> {
        let body = format!(
            r#"<checkRetrieveStatus xmlns="http://soap.sforce.com/2006/04/metadata">
      <asyncProcessId>{process_id}</asyncProcessId>
      <includeZip>{include_zip}</includeZip>
    </checkRetrieveStatus>"#,
            process_id = xml::escape(async_process_id),
            include_zip = include_zip,
        );

        let response_text = self.call("checkRetrieveStatus", &body).await?;
        parse_retrieve_result(&response_text)
    }
}

#[cfg(test)]
mod tests {
    use super::super::MetadataClient;
    use crate::error::ErrorKind;
    use crate::retrieve::{PackageManifest, RetrieveRequest};
    use crate::types::RequestStatus;
    use wiremock::matchers::{body_string_contains, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_retrieve_unpackaged() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("soapaction", "retrieve"))
            .and(body_string_contains("<members>Foo</members>"))
            .and(body_string_contains("<name>ApexClass</name>"))
            .and(body_string_contains("<singlePackage>true</singlePackage>"))
            .and(body_string_contains("<apiVersion>60.0</apiVersion>"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<soapenv:Envelope><soapenv:Body><retrieveResponse><result><done>false</done><id>09S1</id><state>Queued</state></result></retrieveResponse></soapenv:Body></soapenv:Envelope>",
            ))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = MetadataClient::from_parts(mock_server.uri(), "token");
        let manifest = PackageManifest::new("60.0").add_type("ApexClass", vec!["Foo".to_string()]);
        let mut request = RetrieveRequest::unpackaged(manifest);
        request.api_version = Some("60.0".to_string());

        let id = client.retrieve(&request).await.unwrap();
        assert_eq!(id, "09S1");
    }

    #[tokio::test]
    async fn test_retrieve_packages() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("<packageNames>My &amp; Pkg</packageNames>"))
            .and(body_string_contains("<singlePackage>false</singlePackage>"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<retrieveResponse><result><id>09S2</id></result></retrieveResponse>",
            ))
            .mount(&mock_server)
            .await;

        let client = MetadataClient::from_parts(mock_server.uri(), "token");
        let request = RetrieveRequest::packages(vec!["My & Pkg".to_string()]);
        assert_eq!(client.retrieve(&request).await.unwrap(), "09S2");
    }

    #[tokio::test]
    async fn test_retrieve_rejects_empty_request() {
        let client = MetadataClient::from_parts("http://127.0.0.1:9", "token");
        let err = client
            .retrieve(&RetrieveRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_check_retrieve_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("soapaction", "checkRetrieveStatus"))
            .and(body_string_contains("<includeZip>true</includeZip>"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<checkRetrieveStatusResponse><result><done>true</done><id>09S1</id><status>Succeeded</status><success>true</success><zipFile>UEsFBgAAAAAAAAAAAAAAAAAAAAAAAA==</zipFile></result></checkRetrieveStatusResponse>",
            ))
            .mount(&mock_server)
            .await;

        let client = MetadataClient::from_parts(mock_server.uri(), "token");
        let result = client.check_retrieve_status("09S1", true).await.unwrap();
        assert!(result.done);
        assert_eq!(result.status, RequestStatus::Succeeded);
        assert!(result.zip_file.is_some());
    }
}
