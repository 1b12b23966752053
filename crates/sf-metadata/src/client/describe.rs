use tracing::instrument;

use super::xml_helpers::parse_describe_metadata_result;
use crate::error::Result;
use crate::types::DescribeMetadataResult;
use crate::xml;

impl super::MetadataClient {
    /// Describe all available metadata types.
    #[instrument(skip(self))]
    pub async fn describe_metadata(&self) -> Result<DescribeMetadataResult> {
        let body = format!(
            r#"<describeMetadata xmlns="http://soap.sforce.com/2006/04/metadata">
      <asOfVersion>{api_version}</asOfVersion>
    </describeMetadata>"#,
            api_version = xml::escape(self.api_version()),
        );

        let response_text = self.call("describeMetadata", &body).await?;
        parse_describe_metadata_result(&response_text)
    }

    /// Get a sorted list of all metadata type names, child types included.
    pub async fn list_metadata_types(&self) -> Result<Vec<String>> {
        let result = self.describe_metadata().await?;
        let mut types: Vec<String> = result
            .metadata_objects
            .into_iter()
            .flat_map(|obj| std::iter::once(obj.xml_name).chain(obj.child_xml_names))
            .collect();
        types.sort();
        types.dedup();
        Ok(types)
    }
}
