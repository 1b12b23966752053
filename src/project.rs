//! `sfdx-project.json`: package directories and project defaults.

use std::path::{Path, PathBuf};

use busbar_sf_jobs::{Error, ErrorKind, Result};
use serde::Deserialize;
use tracing::debug;

pub const PROJECT_FILE: &str = "sfdx-project.json";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDirectory {
    pub path: String,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectFile {
    #[serde(default)]
    package_directories: Vec<PackageDirectory>,
    source_api_version: Option<String>,
    #[serde(default)]
    push_package_directories_sequentially: bool,
}

/// A project rooted at the directory holding `sfdx-project.json`.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    package_directories: Vec<PackageDirectory>,
    pub source_api_version: Option<String>,
    pub push_sequentially: bool,
}

impl Project {
    /// Nearest project at or above `start`, if any.
    pub fn find(start: &Path) -> Result<Option<Self>> {
        let start = std::path::absolute(start)?;
        for dir in start.ancestors() {
            if dir.join(PROJECT_FILE).is_file() {
                return Self::load(dir).map(Some);
            }
        }
        Ok(None)
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(PROJECT_FILE);
        let contents = std::fs::read_to_string(&path)?;
        let file: ProjectFile = serde_json::from_str(&contents).map_err(|e| {
            Error::with_source(
                ErrorKind::InvalidInput(format!("cannot parse {}: {}", path.display(), e)),
                e,
            )
        })?;
        if file.package_directories.is_empty() {
            return Err(Error::new(ErrorKind::InvalidInput(format!(
                "{} declares no packageDirectories",
                path.display()
            ))));
        }
        debug!(root = %root.display(), "Loaded project");
        Ok(Self {
            root: std::path::absolute(root)?,
            package_directories: file.package_directories,
            source_api_version: file.source_api_version,
            push_sequentially: file.push_package_directories_sequentially,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute package directories in declaration order.
    pub fn package_dirs(&self) -> Vec<PathBuf> {
        self.package_directories
            .iter()
            .map(|d| self.root.join(&d.path))
            .collect()
    }

    /// The directory marked `default`, else the first one.
    pub fn default_package_dir(&self) -> PathBuf {
        let dir = self
            .package_directories
            .iter()
            .find(|d| d.default)
            .or_else(|| self.package_directories.first())
            .map(|d| d.path.as_str())
            .unwrap_or_default();
        self.root.join(dir)
    }
}
