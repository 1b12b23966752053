//! Metadata type registry: how metadata-API-format folders map to types.

use std::collections::BTreeMap;

use busbar_sf_metadata::DescribeMetadataResult;

/// How one metadata type is laid out on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    pub name: String,
    pub directory: String,
    /// File suffix without the dot; `None` for bundles and documents.
    pub suffix: Option<String>,
    pub meta_file: bool,
    pub in_folder: bool,
    /// Folder metadata type for `in_folder` types.
    pub folder_type: Option<String>,
    /// One component per subdirectory (LWC, Aura).
    pub bundle: bool,
}

impl TypeDef {
    fn file(name: &str, directory: &str, suffix: &str, meta_file: bool) -> Self {
        Self {
            name: name.to_string(),
            directory: directory.to_string(),
            suffix: Some(suffix.to_string()),
            meta_file,
            in_folder: false,
            folder_type: None,
            bundle: false,
        }
    }

    fn foldered(name: &str, directory: &str, suffix: Option<&str>, folder_type: &str) -> Self {
        Self {
            name: name.to_string(),
            directory: directory.to_string(),
            suffix: suffix.map(str::to_string),
            meta_file: suffix.is_none(),
            in_folder: true,
            folder_type: Some(folder_type.to_string()),
            bundle: false,
        }
    }

    fn bundle(name: &str, directory: &str) -> Self {
        Self {
            name: name.to_string(),
            directory: directory.to_string(),
            suffix: None,
            meta_file: false,
            in_folder: false,
            folder_type: None,
            bundle: true,
        }
    }
}

/// Lookup table from top-level directory to metadata type.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    by_directory: BTreeMap<String, TypeDef>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::from_types(vec![
            TypeDef::file("ApexClass", "classes", "cls", true),
            TypeDef::file("ApexTrigger", "triggers", "trigger", true),
            TypeDef::file("ApexPage", "pages", "page", true),
            TypeDef::file("ApexComponent", "components", "component", true),
            TypeDef::file("StaticResource", "staticresources", "resource", true),
            TypeDef::file("CustomObject", "objects", "object", false),
            TypeDef::file("CustomApplication", "applications", "app", false),
            TypeDef::file("CustomTab", "tabs", "tab", false),
            TypeDef::file("CustomLabels", "labels", "labels", false),
            TypeDef::file("CustomMetadata", "customMetadata", "md", false),
            TypeDef::file("Layout", "layouts", "layout", false),
            TypeDef::file("FlexiPage", "flexipages", "flexipage", false),
            TypeDef::file("Flow", "flows", "flow", false),
            TypeDef::file("Profile", "profiles", "profile", false),
            TypeDef::file("PermissionSet", "permissionsets", "permissionset", false),
            TypeDef::file("Workflow", "workflows", "workflow", false),
            TypeDef::file("ApprovalProcess", "approvalProcesses", "approvalProcess", false),
            TypeDef::file("RemoteSiteSetting", "remoteSiteSettings", "remoteSite", false),
            TypeDef::file("NamedCredential", "namedCredentials", "namedCredential", false),
            TypeDef::file("DataCategoryGroup", "datacategorygroups", "datacategorygroup", false),
            TypeDef::foldered("EmailTemplate", "email", Some("email"), "EmailFolder"),
            TypeDef::foldered("Report", "reports", Some("report"), "ReportFolder"),
            TypeDef::foldered("Dashboard", "dashboards", Some("dashboard"), "DashboardFolder"),
            TypeDef::foldered("Document", "documents", None, "DocumentFolder"),
            TypeDef::bundle("LightningComponentBundle", "lwc"),
            TypeDef::bundle("AuraDefinitionBundle", "aura"),
        ])
    }
}

impl TypeRegistry {
    pub fn from_types(types: Vec<TypeDef>) -> Self {
        Self {
            by_directory: types
                .into_iter()
                .map(|t| (t.directory.clone(), t))
                .collect(),
        }
    }

    /// Build the registry from an org's `describeMetadata` result.
    pub fn from_describe(describe: &DescribeMetadataResult) -> Self {
        let types = describe
            .metadata_objects
            .iter()
            .filter_map(|object| {
                let directory = object.directory_name.clone()?;
                let folder_type = object.in_folder.then(|| match object.xml_name.as_str() {
                    "EmailTemplate" => "EmailFolder".to_string(),
                    other => format!("{}Folder", other),
                });
                Some(TypeDef {
                    name: object.xml_name.clone(),
                    directory,
                    suffix: object.suffix.clone(),
                    meta_file: object.meta_file,
                    in_folder: object.in_folder,
                    folder_type,
                    bundle: object.suffix.is_none() && !object.in_folder,
                })
            })
            .collect();
        Self::from_types(types)
    }

    pub fn by_directory(&self, directory: &str) -> Option<&TypeDef> {
        self.by_directory.get(directory)
    }

    pub fn by_name(&self, name: &str) -> Option<&TypeDef> {
        self.by_directory.values().find(|t| t.name == name)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.by_directory.values()
    }

    /// Resolve a package-relative path (`classes/Foo.cls`) to `(type, full name)`.
    pub fn classify(&self, relative_path: &str) -> Option<(String, String)> {
        let mut segments = relative_path.split('/').filter(|s| !s.is_empty());
        let directory = segments.next()?;
        let rest: Vec<&str> = segments.collect();
        let def = self.by_directory(directory)?;
        let file_name = *rest.last()?;

        if def.bundle {
            let bundle_name = rest.first()?;
            if rest.len() < 2 {
                return None;
            }
            return Some((def.name.clone(), bundle_name.to_string()));
        }

        let content_name = file_name.strip_suffix("-meta.xml").unwrap_or(file_name);

        if def.in_folder {
            if rest.len() == 1 {
                // email/Folder-meta.xml describes the folder itself
                let folder_type = def.folder_type.clone()?;
                if content_name == file_name {
                    return None;
                }
                return Some((folder_type, content_name.to_string()));
            }
            let member = strip_suffix(content_name, def.suffix.as_deref());
            let folder = rest[..rest.len() - 1].join("/");
            return Some((def.name.clone(), format!("{}/{}", folder, member)));
        }

        if rest.len() != 1 {
            return None;
        }
        Some((
            def.name.clone(),
            strip_suffix(content_name, def.suffix.as_deref()).to_string(),
        ))
    }
}

fn strip_suffix<'a>(file_name: &'a str, suffix: Option<&str>) -> &'a str {
    match suffix {
        Some(suffix) => file_name
            .strip_suffix(suffix)
            .and_then(|s| s.strip_suffix('.'))
            .unwrap_or(file_name),
        None => file_name,
    }
}
