//! Where retrieved metadata lands on disk.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::Engine;
use tracing::{debug, instrument};

use crate::error::{Error, ErrorKind, Result};
use crate::stash::StashEntry;

pub const DEFAULT_ZIP_FILE_NAME: &str = "unpackaged.zip";

const UNPACKAGED_PREFIX: &str = "unpackaged";

/// Output location of a retrieve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveTarget {
    pub dir: PathBuf,
    pub zip_file_name: String,
    pub unzip: bool,
}

/// Files produced by [`RetrieveTarget::write`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrieveOutput {
    /// Zip left on disk; `None` once extracted.
    pub zip_path: Option<PathBuf>,
    pub extracted: Vec<PathBuf>,
    /// Extracted files that already existed before this retrieve.
    pub preexisting: BTreeSet<PathBuf>,
}

impl RetrieveTarget {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            zip_file_name: DEFAULT_ZIP_FILE_NAME.to_string(),
            unzip: false,
        }
    }

    pub fn with_zip_file_name(mut self, name: impl Into<String>) -> Self {
        self.zip_file_name = name.into();
        self
    }

    pub fn with_unzip(mut self, unzip: bool) -> Self {
        self.unzip = unzip;
        self
    }

    pub fn zip_path(&self) -> PathBuf {
        self.dir.join(&self.zip_file_name)
    }

    /// Local path of a zip entry named in a retrieve result.
    pub fn local_path(&self, file_name: &str) -> PathBuf {
        let trimmed = file_name
            .strip_prefix("unpackaged/")
            .unwrap_or(file_name);
        self.dir.join(trimmed)
    }

    /// Decode the retrieved zip and write it, extracting when `unzip` is set.
    #[instrument(skip(self, zip_base64), fields(dir = %self.dir.display()))]
    pub fn write(&self, zip_base64: &str) -> Result<RetrieveOutput> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(zip_base64.trim())
            .map_err(|e| Error::with_source(ErrorKind::Zip(format!("invalid base64 zip: {}", e)), e))?;

        fs::create_dir_all(&self.dir)?;
        let zip_path = self.zip_path();
        fs::write(&zip_path, &bytes)?;

        if !self.unzip {
            debug!(zip = %zip_path.display(), bytes = bytes.len(), "Wrote retrieved zip");
            return Ok(RetrieveOutput {
                zip_path: Some(zip_path),
                ..Default::default()
            });
        }

        let output = self.extract(&bytes)?;
        fs::remove_file(&zip_path)?;
        debug!(files = output.extracted.len(), "Extracted retrieved zip");
        Ok(output)
    }

    fn extract(&self, bytes: &[u8]) -> Result<RetrieveOutput> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        let mut output = RetrieveOutput::default();

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            let name = entry.enclosed_name().ok_or_else(|| {
                Error::new(ErrorKind::Zip(format!(
                    "zip entry '{}' escapes the target directory",
                    entry.name()
                )))
            })?;
            let relative = strip_unpackaged(&name);
            if relative.as_os_str().is_empty() {
                continue;
            }
            let destination = self.dir.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&destination)?;
                continue;
            }
            if destination.exists() {
                output.preexisting.insert(destination.clone());
            }
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = File::create(&destination)?;
            std::io::copy(&mut entry, &mut file)?;
            output.extracted.push(destination);
        }
        Ok(output)
    }

    pub fn to_stash_entry(&self, job_id: &str) -> StashEntry {
        StashEntry {
            jobid: job_id.to_string(),
            retrievetargetdir: Some(self.dir.display().to_string()),
            zipfilename: Some(self.zip_file_name.clone()),
            unzip: Some(self.unzip),
            components: Vec::new(),
        }
    }

    /// Rebuild a target from a stashed retrieve, if it recorded one.
    pub fn from_stash_entry(entry: &StashEntry) -> Option<Self> {
        let dir = entry.retrievetargetdir.as_ref()?;
        Some(Self {
            dir: PathBuf::from(dir),
            zip_file_name: entry
                .zipfilename
                .clone()
                .unwrap_or_else(|| DEFAULT_ZIP_FILE_NAME.to_string()),
            unzip: entry.unzip.unwrap_or(false),
        })
    }
}

fn strip_unpackaged(path: &Path) -> &Path {
    path.strip_prefix(UNPACKAGED_PREFIX).unwrap_or(path)
}
