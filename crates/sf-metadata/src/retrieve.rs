//! Retrieve operations and package manifests.

use crate::error::{Error, ErrorKind, Result};
use crate::types::{FileProperties, RequestStatus};
use crate::xml;
use serde::{Deserialize, Serialize};

/// What to retrieve.
///
/// Either an unpackaged manifest, a list of package names, or both.
#[derive(Debug, Clone, Default)]
pub struct RetrieveRequest {
    /// API version for the retrieved files; defaults to the client's version.
    pub api_version: Option<String>,
    /// Place all files at the zip root instead of under `unpackaged/`.
    pub single_package: bool,
    pub unpackaged: Option<PackageManifest>,
    pub package_names: Vec<String>,
}

impl RetrieveRequest {
    /// Retrieve the components listed in `manifest` as a single package.
    pub fn unpackaged(manifest: PackageManifest) -> Self {
        Self {
            api_version: None,
            single_package: true,
            unpackaged: Some(manifest),
            package_names: Vec::new(),
        }
    }

    /// Retrieve whole packages by name.
    pub fn packages(names: Vec<String>) -> Self {
        Self {
            api_version: None,
            single_package: false,
            unpackaged: None,
            package_names: names,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.package_names.is_empty()
            && self.unpackaged.as_ref().map_or(true, |m| m.is_empty())
    }
}

/// Package manifest (package.xml).
///
/// Use this structured type to safely build package manifests without
/// risk of XML injection. All values are properly escaped when converted
/// to XML.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageManifest {
    pub types: Vec<PackageTypeMembers>,
    pub version: String,
}

impl PackageManifest {
    /// Create a new package manifest with the given API version.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            types: Vec::new(),
            version: version.into(),
        }
    }

    /// Add a metadata type with its members.
    pub fn add_type(mut self, name: impl Into<String>, members: Vec<String>) -> Self {
        self.add_members(name, members);
        self
    }

    /// Add members to a type, merging with an existing entry for that type.
    pub fn add_members(&mut self, name: impl Into<String>, members: Vec<String>) {
        let name = name.into();
        match self.types.iter_mut().find(|t| t.name == name) {
            Some(existing) => {
                for member in members {
                    if !existing.members.contains(&member) {
                        existing.members.push(member);
                    }
                }
            }
            None => self.types.push(PackageTypeMembers { name, members }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.types.iter().all(|t| t.members.is_empty())
    }

    /// Iterate `(type, member)` pairs.
    pub fn members(&self) -> impl Iterator<Item = (&str, &str)> {
        self.types.iter().flat_map(|t| {
            t.members
                .iter()
                .map(move |m| (t.name.as_str(), m.as_str()))
        })
    }

    /// Convert to XML elements for SOAP envelope.
    /// All values are properly XML-escaped to prevent injection.
    pub(crate) fn to_xml(&self) -> String {
        let mut xml_parts = Vec::new();

        for type_member in &self.types {
            let members_xml: String = type_member
                .members
                .iter()
                .map(|m| format!("<members>{}</members>", xml::escape(m)))
                .collect::<Vec<_>>()
                .join("\n          ");

            xml_parts.push(format!(
                "<types>\n          {}\n          <name>{}</name>\n        </types>",
                members_xml,
                xml::escape(&type_member.name)
            ));
        }

        xml_parts.push(format!("<version>{}</version>", xml::escape(&self.version)));

        xml_parts.join("\n        ")
    }

    /// Render a standalone `package.xml` document.
    pub fn to_package_xml(&self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Package xmlns=\"http://soap.sforce.com/2006/04/metadata\">\n        {}\n</Package>\n",
            self.to_xml()
        )
    }

    /// Parse a `package.xml` (or `destructiveChanges.xml`) document.
    pub fn from_xml(document: &str) -> Result<Self> {
        if !document.contains("<Package") {
            return Err(Error::new(ErrorKind::Parse(
                "Manifest has no <Package> root element".to_string(),
            )));
        }

        let mut manifest = PackageManifest::new(String::new());
        for block in xml::extract_blocks(document, "types") {
            let name = xml::extract_element(block, "name").ok_or_else(|| {
                Error::new(ErrorKind::Parse(
                    "Manifest <types> entry is missing <name>".to_string(),
                ))
            })?;
            manifest.add_members(name, xml::extract_elements(block, "members"));
        }

        let without_types = xml::strip_blocks(document, "types");
        manifest.version = xml::extract_element(&without_types, "version").unwrap_or_default();
        Ok(manifest)
    }
}

/// Type members in a package manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageTypeMembers {
    pub name: String,
    pub members: Vec<String>,
}

/// Result of a retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieveResult {
    /// Async process ID.
    pub id: String,
    /// Whether the operation is complete.
    pub done: bool,
    /// Current status.
    pub status: RequestStatus,
    /// Whether the retrieve succeeded.
    pub success: bool,
    /// Error message if failed.
    pub error_message: Option<String>,
    /// Error status code if failed.
    pub error_status_code: Option<String>,
    /// Base64-encoded zip file contents.
    #[serde(skip_serializing)]
    pub zip_file: Option<String>,
    /// File properties in the retrieved package.
    pub file_properties: Vec<FileProperties>,
    /// Retrieve messages (warnings/errors).
    pub messages: Vec<RetrieveMessage>,
}

/// A message from retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrieveMessage {
    pub file_name: String,
    pub problem: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_manifest_to_xml() {
        let manifest = PackageManifest::new("62.0")
            .add_type(
                "ApexClass",
                vec!["MyClass".to_string(), "OtherClass".to_string()],
            )
            .add_type("ApexTrigger", vec!["*".to_string()]);

        let xml = manifest.to_xml();
        assert!(xml.contains("<name>ApexClass</name>"));
        assert!(xml.contains("<members>MyClass</members>"));
        assert!(xml.contains("<members>OtherClass</members>"));
        assert!(xml.contains("<name>ApexTrigger</name>"));
        assert!(xml.contains("<members>*</members>"));
        assert!(xml.contains("<version>62.0</version>"));
    }

    #[test]
    fn test_package_manifest_escapes_xml_injection() {
        let manifest = PackageManifest::new("62.0").add_type(
            "ApexClass",
            vec!["</members><malicious>attack</malicious><members>".to_string()],
        );

        let xml = manifest.to_xml();
        assert!(xml.contains("&lt;/members&gt;"));
        assert!(!xml.contains("<malicious>"));
    }

    #[test]
    fn test_add_type_merges_members() {
        let manifest = PackageManifest::new("62.0")
            .add_type("ApexClass", vec!["A".to_string()])
            .add_type("ApexClass", vec!["A".to_string(), "B".to_string()]);
        assert_eq!(manifest.types.len(), 1);
        assert_eq!(manifest.types[0].members, vec!["A", "B"]);
    }

    #[test]
    fn test_parse_package_xml() {
        let document = r#"<?xml version="1.0" encoding="UTF-8"?>
<Package xmlns="http://soap.sforce.com/2006/04/metadata">
    <types>
        <members>Foo</members>
        <members>Bar</members>
        <name>ApexClass</name>
    </types>
    <types>
        <members>Account.Region__c</members>
        <name>CustomField</name>
    </types>
    <version>61.0</version>
</Package>"#;

        let manifest = PackageManifest::from_xml(document).unwrap();
        assert_eq!(manifest.version, "61.0");
        let members: Vec<_> = manifest.members().collect();
        assert_eq!(
            members,
            vec![
                ("ApexClass", "Foo"),
                ("ApexClass", "Bar"),
                ("CustomField", "Account.Region__c"),
            ]
        );
    }

    #[test]
    fn test_package_xml_round_trip_of_escaped_member() {
        let manifest = PackageManifest::new("62.0").add_type("Layout", vec!["A & B".to_string()]);
        let parsed = PackageManifest::from_xml(&manifest.to_package_xml()).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_parse_rejects_non_manifest() {
        let err = PackageManifest::from_xml("<Other/>").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Parse(_)));
    }

    #[test]
    fn test_retrieve_request_is_empty() {
        assert!(RetrieveRequest::default().is_empty());
        assert!(RetrieveRequest::unpackaged(PackageManifest::new("62.0")).is_empty());
        assert!(!RetrieveRequest::packages(vec!["MyPkg".to_string()]).is_empty());
    }
}
