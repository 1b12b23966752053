//! Component sets: the unit of work for one deploy or retrieve.

use std::collections::BTreeSet;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use busbar_sf_metadata::{PackageManifest, DEFAULT_API_VERSION};
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Error, ErrorKind, Result};
use crate::registry::TypeRegistry;

/// One metadata component and the local files that make it up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceComponent {
    #[serde(rename = "type")]
    pub component_type: String,
    pub full_name: String,
    /// Directory the `paths` are relative to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// Package-relative paths using `/` separators.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
    #[serde(default)]
    pub destructive: bool,
}

impl SourceComponent {
    pub fn new(component_type: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            component_type: component_type.into(),
            full_name: full_name.into(),
            root: None,
            paths: Vec::new(),
            destructive: false,
        }
    }

    /// Mark for deletion on the next deploy.
    pub fn destructive(mut self) -> Self {
        self.destructive = true;
        self
    }

    pub fn with_file(mut self, root: impl Into<PathBuf>, path: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self.paths.push(path.into());
        self
    }

    pub fn key(&self) -> (&str, &str) {
        (&self.component_type, &self.full_name)
    }

    /// Local files on disk, when the component has a root.
    pub fn absolute_paths(&self) -> Vec<PathBuf> {
        match &self.root {
            Some(root) => self.paths.iter().map(|p| root.join(p)).collect(),
            None => Vec::new(),
        }
    }
}

/// Resolved collection of components targeted by one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentSet {
    /// Directory the set was resolved from, if any.
    pub root: Option<PathBuf>,
    pub api_version: String,
    components: Vec<SourceComponent>,
}

impl ComponentSet {
    pub fn new(api_version: impl Into<String>) -> Self {
        Self {
            root: None,
            api_version: api_version.into(),
            components: Vec::new(),
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Add a component, merging files into an existing entry with the same key.
    pub fn add(&mut self, component: SourceComponent) {
        match self
            .components
            .iter_mut()
            .find(|c| c.key() == component.key())
        {
            Some(existing) => {
                if existing.root.is_none() {
                    existing.root = component.root;
                }
                for path in component.paths {
                    if !existing.paths.contains(&path) {
                        existing.paths.push(path);
                    }
                }
                existing.destructive |= component.destructive;
            }
            None => self.components.push(component),
        }
    }

    /// Merge every component of `other` into this set.
    pub fn extend(&mut self, other: ComponentSet) {
        for component in other.components {
            self.add(component);
        }
    }

    /// Resolve a metadata-API-format directory into components.
    ///
    /// `package.xml` and `destructiveChanges*.xml` are manifests, not
    /// components. Files the registry cannot place are skipped.
    pub fn from_metadata_dir(root: impl AsRef<Path>, registry: &TypeRegistry) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::new(ErrorKind::InvalidInput(format!(
                "{} is not a directory",
                root.display()
            ))));
        }

        let manifest_path = root.join("package.xml");
        let api_version = if manifest_path.is_file() {
            let manifest = PackageManifest::from_xml(&std::fs::read_to_string(&manifest_path)?)?;
            Some(manifest.version).filter(|v| !v.is_empty())
        } else {
            None
        };

        let mut set = Self::new(api_version.unwrap_or_else(|| DEFAULT_API_VERSION.to_string()));
        set.root = Some(root.to_path_buf());

        let mut skipped = 0usize;
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(relative) = relative_path(root, entry.path()) else {
                continue;
            };
            if is_manifest(&relative) || is_hidden(&relative) {
                continue;
            }
            match registry.classify(&relative) {
                Some((component_type, full_name)) => set.add(
                    SourceComponent::new(component_type, full_name).with_file(root, relative),
                ),
                None => skipped += 1,
            }
        }

        debug!(
            root = %root.display(),
            components = set.len(),
            skipped,
            "Resolved metadata directory"
        );
        Ok(set)
    }

    /// Components named by a manifest; wildcard members pass through as-is.
    pub fn from_manifest(manifest: &PackageManifest) -> Self {
        let version = if manifest.version.is_empty() {
            DEFAULT_API_VERSION
        } else {
            manifest.version.as_str()
        };
        let mut set = Self::new(version);
        for (component_type, member) in manifest.members() {
            set.add(SourceComponent::new(component_type, member));
        }
        set
    }

    /// Components from `Type:Name` strings, split on the first colon.
    pub fn from_members(members: &[String], api_version: impl Into<String>) -> Result<Self> {
        let mut set = Self::new(api_version);
        for member in members {
            match member.split_once(':') {
                Some((t, n)) if !t.trim().is_empty() && !n.trim().is_empty() => {
                    set.add(SourceComponent::new(t.trim(), n.trim()));
                }
                _ => {
                    return Err(Error::new(ErrorKind::InvalidInput(format!(
                        "expected Type:Name, got '{}'",
                        member
                    ))))
                }
            }
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Fail with `NoComponentsFound` when the set is empty.
    pub fn require_non_empty(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::new(ErrorKind::NoComponentsFound(
                "no source-backed components present in the package".to_string(),
            )));
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceComponent> {
        self.components.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SourceComponent> {
        self.components.iter_mut()
    }

    pub fn contains(&self, component_type: &str, full_name: &str) -> bool {
        self.get(component_type, full_name).is_some()
    }

    pub fn get(&self, component_type: &str, full_name: &str) -> Option<&SourceComponent> {
        self.components
            .iter()
            .find(|c| c.component_type == component_type && c.full_name == full_name)
    }

    pub fn has_destructive(&self) -> bool {
        self.components.iter().any(|c| c.destructive)
    }

    /// `package.xml` for the non-destructive components.
    pub fn to_manifest(&self) -> PackageManifest {
        self.manifest_where(|c| !c.destructive)
    }

    /// `destructiveChanges.xml` for the destructive components.
    pub fn destructive_manifest(&self) -> PackageManifest {
        self.manifest_where(|c| c.destructive)
    }

    fn manifest_where(&self, keep: impl Fn(&SourceComponent) -> bool) -> PackageManifest {
        let mut pairs: Vec<(&str, &str)> = self
            .components
            .iter()
            .filter(|c| keep(c))
            .map(|c| c.key())
            .collect();
        pairs.sort_unstable();

        let mut manifest = PackageManifest::new(self.api_version.clone());
        for (component_type, full_name) in pairs {
            manifest.add_members(component_type, vec![full_name.to_string()]);
        }
        manifest
    }

    /// Build a deployable zip: component files plus generated manifests.
    pub fn to_zip(&self) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file("package.xml", options)?;
        zip.write_all(self.to_manifest().to_package_xml().as_bytes())?;

        if self.has_destructive() {
            zip.start_file("destructiveChanges.xml", options)?;
            zip.write_all(self.destructive_manifest().to_package_xml().as_bytes())?;
        }

        let mut written = BTreeSet::new();
        for component in self.components.iter().filter(|c| !c.destructive) {
            let Some(root) = &component.root else {
                continue;
            };
            for path in &component.paths {
                if !written.insert(path.clone()) {
                    continue;
                }
                let bytes = std::fs::read(root.join(path))?;
                zip.start_file(path.as_str(), options)?;
                zip.write_all(&bytes)?;
            }
        }

        Ok(zip.finish()?.into_inner())
    }
}

/// `root`-relative path with `/` separators.
pub(crate) fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

fn is_manifest(relative: &str) -> bool {
    relative == "package.xml"
        || (!relative.contains('/')
            && relative.starts_with("destructiveChanges")
            && relative.ends_with(".xml"))
}

fn is_hidden(relative: &str) -> bool {
    relative.split('/').any(|segment| segment.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    fn zip_entries(bytes: &[u8]) -> Vec<String> {
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    #[test]
    fn test_from_metadata_dir_groups_files() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "package.xml",
            "<?xml version=\"1.0\"?><Package><version>60.0</version></Package>",
        );
        write(dir.path(), "classes/Foo.cls", "public class Foo {}");
        write(dir.path(), "classes/Foo.cls-meta.xml", "<ApexClass/>");
        write(dir.path(), "lwc/card/card.js", "export default class {}");
        write(dir.path(), "lwc/card/card.html", "<template></template>");
        write(dir.path(), "destructiveChangesPost.xml", "<Package/>");
        write(dir.path(), ".DS_Store", "");
        write(dir.path(), "unknown/thing.txt", "");

        let set = ComponentSet::from_metadata_dir(dir.path(), &TypeRegistry::default()).unwrap();
        assert_eq!(set.api_version, "60.0");
        assert_eq!(set.len(), 2);

        let class = set.get("ApexClass", "Foo").unwrap();
        assert_eq!(class.paths, vec!["classes/Foo.cls", "classes/Foo.cls-meta.xml"]);
        assert_eq!(
            set.get("LightningComponentBundle", "card").unwrap().paths.len(),
            2
        );
    }

    #[test]
    fn test_from_metadata_dir_rejects_missing_dir() {
        let err = ComponentSet::from_metadata_dir("/no/such/dir", &TypeRegistry::default())
            .unwrap_err();
        assert_eq!(err.name(), "InvalidInputError");
    }

    #[test]
    fn test_from_members() {
        let set = ComponentSet::from_members(
            &["ApexClass:Foo".to_string(), "CustomField:Account.X__c".to_string()],
            "62.0",
        )
        .unwrap();
        assert!(set.contains("ApexClass", "Foo"));
        assert!(set.contains("CustomField", "Account.X__c"));

        let err = ComponentSet::from_members(&["ApexClass".to_string()], "62.0").unwrap_err();
        assert_eq!(err.name(), "InvalidInputError");
    }

    #[test]
    fn test_from_manifest_defaults_version() {
        let manifest = PackageManifest::new("").add_type("ApexClass", vec!["*".to_string()]);
        let set = ComponentSet::from_manifest(&manifest);
        assert_eq!(set.api_version, DEFAULT_API_VERSION);
        assert!(set.contains("ApexClass", "*"));
    }

    #[test]
    fn test_add_merges_same_component() {
        let mut set = ComponentSet::new("62.0");
        set.add(SourceComponent::new("ApexClass", "Foo").with_file("/p", "classes/Foo.cls"));
        set.add(
            SourceComponent::new("ApexClass", "Foo").with_file("/p", "classes/Foo.cls-meta.xml"),
        );
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("ApexClass", "Foo").unwrap().paths.len(), 2);
    }

    #[test]
    fn test_require_non_empty() {
        let err = ComponentSet::new("62.0").require_non_empty().unwrap_err();
        assert_eq!(err.name(), "NoComponentsFound");
    }

    #[test]
    fn test_manifests_split_destructive() {
        let mut set = ComponentSet::new("62.0");
        set.add(SourceComponent::new("ApexClass", "Keep"));
        set.add(SourceComponent::new("ApexClass", "Gone").destructive());

        assert_eq!(set.to_manifest().types[0].members, vec!["Keep"]);
        assert_eq!(set.destructive_manifest().types[0].members, vec!["Gone"]);
    }

    #[test]
    fn test_to_zip_includes_files_and_manifests() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "classes/Foo.cls", "public class Foo {}");
        write(dir.path(), "classes/Foo.cls-meta.xml", "<ApexClass/>");

        let mut set =
            ComponentSet::from_metadata_dir(dir.path(), &TypeRegistry::default()).unwrap();
        set.add(SourceComponent::new("ApexClass", "Old").destructive());

        let bytes = set.to_zip().unwrap();
        assert_eq!(
            zip_entries(&bytes),
            vec![
                "classes/Foo.cls",
                "classes/Foo.cls-meta.xml",
                "destructiveChanges.xml",
                "package.xml"
            ]
        );

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut package = String::new();
        archive
            .by_name("package.xml")
            .unwrap()
            .read_to_string(&mut package)
            .unwrap();
        assert!(package.contains("<members>Foo</members>"));
        assert!(!package.contains("Old"));
    }
}
