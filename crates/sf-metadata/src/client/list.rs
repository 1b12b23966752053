use tracing::instrument;

use super::xml_helpers::parse_list_metadata_result;
use crate::error::Result;
use crate::types::MetadataComponent;
use crate::xml;

impl super::MetadataClient {
    /// List metadata components of a specific type.
    ///
    /// `folder` is required for folder-based types such as `Report` or `EmailTemplate`.
    #[instrument(skip(self))]
    pub async fn list_metadata(
        &self,
        metadata_type: &str,
        folder: Option<&str>,
    ) -> Result<Vec<MetadataComponent>> {
        let folder_xml = folder
            .map(|f| format!("\n        <folder>{}</folder>", xml::escape(f)))
            .unwrap_or_default();

        let body = format!(
            r#"<listMetadata xmlns="http://soap.sforce.com/2006/04/metadata">
      <queries>
        <type>{metadata_type}</type>{folder}
      </queries>
      <asOfVersion>{api_version}</asOfVersion>
    </listMetadata>"#,
            metadata_type = xml::escape(metadata_type),
            folder = folder_xml,
            api_version = xml::escape(self.api_version()),
        );

        let response_text = self.call("listMetadata", &body).await?;
        Ok(parse_list_metadata_result(&response_text, metadata_type))
    }
}
