//! Metadata API client.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::types::DEFAULT_API_VERSION;
use crate::xml;

mod deploy;
mod describe;
mod list;
mod retrieve;
mod xml_helpers;

/// SOAP Action header name.
static SOAP_ACTION_HEADER: HeaderName = HeaderName::from_static("soapaction");

/// Salesforce Metadata API client.
pub struct MetadataClient {
    instance_url: String,
    access_token: String,
    api_version: String,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for MetadataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataClient")
            .field("instance_url", &self.instance_url)
            .field("access_token", &"[REDACTED]")
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl MetadataClient {
    /// Create a new Metadata API client from instance URL and access token.
    pub fn from_parts(instance_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        let instance_url: String = instance_url.into();
        Self {
            instance_url: instance_url.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            http_client: reqwest::Client::new(),
        }
    }

    /// Set the API version.
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Set a custom HTTP client.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = client;
        self
    }

    /// The API version used for requests and retrieved packages.
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Get the Metadata API SOAP endpoint URL.
    pub(crate) fn metadata_url(&self) -> String {
        format!("{}/services/Soap/m/{}", self.instance_url, self.api_version)
    }

    /// Build common headers for SOAP requests.
    pub(crate) fn build_headers(&self, soap_action: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/xml;charset=UTF-8"),
        );
        headers.insert(
            SOAP_ACTION_HEADER.clone(),
            HeaderValue::from_str(soap_action).map_err(|e| {
                Error::with_source(ErrorKind::InvalidInput("Invalid SOAP action".to_string()), e)
            })?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.access_token)).map_err(|e| {
                Error::with_source(
                    ErrorKind::InvalidInput("Access token is not a valid header value".to_string()),
                    e,
                )
            })?,
        );
        Ok(headers)
    }

    /// Wrap an operation body in a SOAP envelope carrying the session header.
    pub(crate) fn envelope(&self, body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema">
  <soap:Header>
    <SessionHeader xmlns="http://soap.sforce.com/2006/04/metadata">
      <sessionId>{session_id}</sessionId>
    </SessionHeader>
  </soap:Header>
  <soap:Body>
    {body}
  </soap:Body>
</soap:Envelope>"#,
            session_id = xml::escape(&self.access_token),
            body = body,
        )
    }

    /// Send one SOAP call and return the response text, mapping faults to errors.
    pub(crate) async fn call(&self, soap_action: &str, body: &str) -> Result<String> {
        debug!(action = soap_action, "Metadata API call");

        let response = self
            .http_client
            .post(self.metadata_url())
            .headers(self.build_headers(soap_action)?)
            .body(self.envelope(body))
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if let Some(fault) = xml_helpers::parse_soap_fault(&response_text) {
            return Err(Error::with_source(
                ErrorKind::SoapFault {
                    code: fault.fault_code.clone(),
                    message: fault.fault_string.clone(),
                },
                fault,
            ));
        }

        if !status.is_success() {
            return Err(Error::new(ErrorKind::Http(format!(
                "{} returned HTTP {}",
                soap_action, status
            ))));
        }

        Ok(response_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = MetadataClient::from_parts("https://test.salesforce.com", "token123");
        assert_eq!(client.api_version(), DEFAULT_API_VERSION);
    }

    #[test]
    fn test_client_with_version() {
        let client = MetadataClient::from_parts("https://test.salesforce.com", "token123")
            .with_api_version("58.0");
        assert_eq!(client.api_version(), "58.0");
    }

    #[test]
    fn test_metadata_url_construction() {
        let client = MetadataClient::from_parts("https://na1.salesforce.com/", "token")
            .with_api_version("62.0");
        assert_eq!(
            client.metadata_url(),
            "https://na1.salesforce.com/services/Soap/m/62.0"
        );
    }

    #[test]
    fn test_build_headers() {
        let client = MetadataClient::from_parts("https://na1.salesforce.com", "token123");
        let headers = client.build_headers("deploy").unwrap();

        assert_eq!(
            headers.get("content-type").unwrap(),
            "text/xml;charset=UTF-8"
        );
        assert_eq!(headers.get("soapaction").unwrap(), "deploy");
        assert_eq!(headers.get("authorization").unwrap(), "Bearer token123");
    }

    #[test]
    fn test_build_headers_rejects_bad_token() {
        let client = MetadataClient::from_parts("https://na1.salesforce.com", "bad\ntoken");
        let err = client.build_headers("deploy").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidInput(_)));
    }

    #[test]
    fn test_debug_redacts_token() {
        let client = MetadataClient::from_parts("https://na1.salesforce.com", "secret-token");
        let debug = format!("{:?}", client);
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_envelope_escapes_session() {
        let client = MetadataClient::from_parts("https://na1.salesforce.com", "a<b");
        let envelope = client.envelope("<ping/>");
        assert!(envelope.contains("<sessionId>a&lt;b</sessionId>"));
        assert!(envelope.contains("<ping/>"));
    }
}
