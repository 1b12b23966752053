//! Durable job id stash shared across CLI invocations.
//!
//! The stash is one JSON document with a top-level key per operation
//! category. Categories this crate does not know about are preserved on
//! write. A file that cannot be parsed is moved aside, never discarded.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::component::SourceComponent;
use crate::error::{Error, ErrorKind, Result};

/// Environment variable overriding the stash location.
pub const STASH_PATH_ENV: &str = "SF_STASH_PATH";

/// Logical operation a stashed job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StashCategory {
    MdapiDeploy,
    MdapiRetrieve,
    SourceDeploy,
}

impl StashCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            StashCategory::MdapiDeploy => "MDAPI_DEPLOY",
            StashCategory::MdapiRetrieve => "MDAPI_RETRIEVE",
            StashCategory::SourceDeploy => "SOURCE_DEPLOY",
        }
    }
}

impl std::fmt::Display for StashCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value stored per category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StashEntry {
    pub jobid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrievetargetdir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zipfilename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unzip: Option<bool>,
    /// Components of a tracked deploy, so a later report can commit them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<SourceComponent>,
}

impl StashEntry {
    pub fn job(jobid: impl Into<String>) -> Self {
        Self {
            jobid: jobid.into(),
            retrievetargetdir: None,
            zipfilename: None,
            unzip: None,
            components: Vec::new(),
        }
    }

    pub fn with_components(mut self, components: Vec<SourceComponent>) -> Self {
        self.components = components;
        self
    }
}

/// Key-value persistence for in-flight job ids.
pub trait StashStore: Send + Sync {
    /// Last entry written for `category`, if any.
    fn get(&self, category: StashCategory) -> Result<Option<StashEntry>>;

    /// Overwrite the entry for `category`; durable when this returns.
    fn set(&self, category: StashCategory, entry: &StashEntry) -> Result<()>;
}

/// JSON file stash, by default at `~/.sf/stash.json`.
#[derive(Debug, Clone)]
pub struct FileStash {
    path: PathBuf,
}

impl FileStash {
    /// Stash at `$SF_STASH_PATH`, or `~/.sf/stash.json`.
    pub fn new() -> Result<Self> {
        if let Some(path) = std::env::var_os(STASH_PATH_ENV) {
            return Ok(Self::with_path(path));
        }
        let home = dirs::home_dir().ok_or_else(|| {
            Error::new(ErrorKind::Io(
                "cannot locate home directory for the stash".to_string(),
            ))
        })?;
        Ok(Self::with_path(home.join(".sf").join("stash.json")))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<BTreeMap<String, serde_json::Value>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        match serde_json::from_str(&contents) {
            Ok(document) => Ok(document),
            Err(e) => Err(self.quarantine(&e.to_string())?),
        }
    }

    /// Move the corrupt file aside and build the error to raise.
    fn quarantine(&self, reason: &str) -> Result<Error> {
        let quarantined = PathBuf::from(format!(
            "{}_corrupted_{}",
            self.path.display(),
            chrono::Utc::now().timestamp_millis()
        ));
        fs::rename(&self.path, &quarantined)?;
        warn!(
            path = %self.path.display(),
            quarantined = %quarantined.display(),
            reason,
            "Stash file is corrupt"
        );
        Ok(Error::new(ErrorKind::InvalidStashFile {
            path: self.path.clone(),
            quarantined,
        }))
    }
}

impl StashStore for FileStash {
    fn get(&self, category: StashCategory) -> Result<Option<StashEntry>> {
        let mut document = self.read_document()?;
        let Some(value) = document.remove(category.as_str()) else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => Err(self.quarantine(&format!("{}: {}", category, e))?),
        }
    }

    #[instrument(skip(self, entry), fields(jobid = %entry.jobid))]
    fn set(&self, category: StashCategory, entry: &StashEntry) -> Result<()> {
        let mut document = self.read_document()?;
        document.insert(category.as_str().to_string(), serde_json::to_value(entry)?);

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let mut file = tempfile::NamedTempFile::new_in(&dir)?;
        file.write_all(serde_json::to_string_pretty(&document)?.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&self.path)
            .map_err(|e| Error::with_source(ErrorKind::Io(e.to_string()), e.error))?;
        debug!(path = %self.path.display(), "Stash written");
        Ok(())
    }
}
