use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use busbar_sf_metadata::MetadataComponent;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use super::{Conflict, LocalTrackingUpdate, TrackingLedger, TrackingUpdate};
use crate::component::{relative_path, ComponentSet};
use crate::error::{Error, ErrorKind, Result};
use crate::reconcile::{ComponentState, FileOutcome};

const LEDGER_DIR: &str = ".sf";
const LEDGER_FILE: &str = "tracking.json";

/// Revision state of one remote component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    #[serde(rename = "type")]
    pub component_type: String,
    pub full_name: String,
    pub revision: u64,
    pub synced_revision: u64,
    /// Last `lastModifiedDate` seen in the org.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
    /// The next marker change is our own write.
    #[serde(default)]
    pub expect_own_change: bool,
}

impl RemoteRecord {
    /// Changed in the org since we last synced it.
    pub fn is_pending(&self) -> bool {
        self.revision > self.synced_revision
    }
}

/// Project files that differ from the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalChanges {
    /// New or edited, project-relative.
    pub modified: Vec<String>,
    /// Tracked but gone from disk, project-relative.
    pub deleted: Vec<String>,
}

impl LocalChanges {
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerDocument {
    /// Project-relative path to SHA-256 hex digest.
    #[serde(default)]
    local: BTreeMap<String, String>,
    #[serde(default)]
    remote: BTreeMap<String, RemoteRecord>,
}

/// Tracking ledger stored at `<project>/.sf/tracking.json`.
///
/// Every write replaces the whole document through a temp file and rename,
/// so an interrupted run leaves the previous state intact.
#[derive(Debug)]
pub struct FileLedger {
    project_dir: PathBuf,
    path: PathBuf,
    document: Mutex<LedgerDocument>,
}

impl FileLedger {
    /// Load the ledger for `project_dir`, starting empty if none exists.
    pub fn open(project_dir: impl Into<PathBuf>) -> Result<Self> {
        let project_dir = project_dir.into();
        let path = project_dir.join(LEDGER_DIR).join(LEDGER_FILE);
        let document = if path.is_file() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents).map_err(|e| {
                Error::with_source(
                    ErrorKind::Tracking(format!("cannot parse {}: {}", path.display(), e)),
                    e,
                )
            })?
        } else {
            LedgerDocument::default()
        };
        Ok(Self {
            project_dir,
            path,
            document: Mutex::new(document),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Project-relative form of `path`; `None` outside the project.
    pub fn relative(&self, path: &Path) -> Option<String> {
        if path.is_absolute() {
            relative_path(&self.project_dir, path)
        } else {
            relative_path(Path::new(""), path)
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerDocument>> {
        self.document
            .lock()
            .map_err(|_| Error::new(ErrorKind::Tracking("ledger lock poisoned".to_string())))
    }

    fn save(&self, document: &LedgerDocument) -> Result<()> {
        let dir = self.project_dir.join(LEDGER_DIR);
        fs::create_dir_all(&dir)?;
        let mut file = tempfile::NamedTempFile::new_in(&dir)?;
        file.write_all(serde_json::to_string_pretty(document)?.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&self.path)
            .map_err(|e| Error::with_source(ErrorKind::Io(e.to_string()), e.error))?;
        debug!(path = %self.path.display(), "Ledger saved");
        Ok(())
    }

    fn hash_file(path: &Path) -> Result<String> {
        let bytes = fs::read(path)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Compare files under `dirs` (project-relative or absolute) to the ledger.
    #[instrument(skip(self))]
    pub fn local_changes(&self, dirs: &[PathBuf]) -> Result<LocalChanges> {
        let document = self.lock()?;
        let mut changes = LocalChanges::default();
        let mut on_disk = BTreeSet::new();
        let mut prefixes = Vec::new();

        for dir in dirs {
            let dir = if dir.is_absolute() {
                dir.clone()
            } else {
                self.project_dir.join(dir)
            };
            let Some(prefix) = self.relative(&dir) else {
                continue;
            };
            prefixes.push(format!("{}/", prefix));
            if !dir.is_dir() {
                continue;
            }

            for entry in WalkDir::new(&dir).sort_by_file_name() {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Some(relative) = self.relative(entry.path()) else {
                    continue;
                };
                if relative.split('/').any(|s| s.starts_with('.')) {
                    continue;
                }
                let hash = Self::hash_file(entry.path())?;
                if document.local.get(&relative) != Some(&hash) {
                    changes.modified.push(relative.clone());
                }
                on_disk.insert(relative);
            }
        }

        changes.deleted = document
            .local
            .keys()
            .filter(|tracked| prefixes.iter().any(|p| tracked.starts_with(p.as_str())))
            .filter(|tracked| !on_disk.contains(*tracked))
            .cloned()
            .collect();
        Ok(changes)
    }

    /// Fold a `listMetadata` listing into the remote revisions.
    ///
    /// Returns how many components are newly pending.
    #[instrument(skip_all, fields(components = components.len()))]
    pub fn observe_remote(&self, components: &[MetadataComponent]) -> Result<usize> {
        let mut document = self.lock()?;
        let mut updated = document.clone();
        let mut pending = 0;

        for component in components {
            let key = remote_key(&component.metadata_type, &component.full_name);
            let marker = component.last_modified_date.clone();
            match updated.remote.get_mut(&key) {
                None => {
                    updated.remote.insert(
                        key,
                        RemoteRecord {
                            component_type: component.metadata_type.clone(),
                            full_name: component.full_name.clone(),
                            revision: 1,
                            synced_revision: 0,
                            marker,
                            expect_own_change: false,
                        },
                    );
                    pending += 1;
                }
                Some(record) if record.marker != marker => {
                    record.marker = marker;
                    if record.expect_own_change {
                        record.expect_own_change = false;
                    } else {
                        record.revision += 1;
                        pending += 1;
                    }
                }
                Some(_) => {}
            }
        }

        self.save(&updated)?;
        *document = updated;
        debug!(pending, "Observed remote components");
        Ok(pending)
    }

    /// Components changed in the org since they were last synced.
    pub fn remote_changes(&self) -> Result<Vec<RemoteRecord>> {
        Ok(self
            .lock()?
            .remote
            .values()
            .filter(|r| r.is_pending())
            .cloned()
            .collect())
    }

    /// Metadata types with at least one remote record.
    pub fn remote_types(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .lock()?
            .remote
            .values()
            .map(|r| r.component_type.clone())
            .collect())
    }

    pub fn remote_record(&self, component_type: &str, full_name: &str) -> Result<Option<RemoteRecord>> {
        Ok(self
            .lock()?
            .remote
            .get(&remote_key(component_type, full_name))
            .cloned())
    }

    fn apply_local(&self, document: &mut LedgerDocument, update: &LocalTrackingUpdate) -> Result<()> {
        for file in &update.files {
            let Some(relative) = self.relative(file) else {
                debug!(file = %file.display(), "Skipping file outside project");
                continue;
            };
            let absolute = self.project_dir.join(&relative);
            if absolute.is_file() {
                document.local.insert(relative, Self::hash_file(&absolute)?);
            } else {
                document.local.remove(&relative);
            }
        }
        for file in &update.deleted_files {
            if let Some(relative) = self.relative(file) {
                document.local.remove(&relative);
            }
        }
        Ok(())
    }

    fn apply_remote(document: &mut LedgerDocument, outcomes: &[FileOutcome], is_retrieve: bool) {
        for outcome in outcomes.iter().filter(|o| !o.is_failed()) {
            let key = remote_key(&outcome.component_type, &outcome.full_name);
            if outcome.state == ComponentState::Deleted {
                document.remote.remove(&key);
                continue;
            }
            match document.remote.get_mut(&key) {
                Some(record) => {
                    record.synced_revision = record.revision;
                    record.expect_own_change = !is_retrieve;
                }
                None => {
                    document.remote.insert(
                        key,
                        RemoteRecord {
                            component_type: outcome.component_type.clone(),
                            full_name: outcome.full_name.clone(),
                            revision: 0,
                            synced_revision: 0,
                            marker: None,
                            expect_own_change: true,
                        },
                    );
                }
            }
        }
    }
}

fn remote_key(component_type: &str, full_name: &str) -> String {
    format!("{}:{}", component_type, full_name)
}

impl TrackingLedger for FileLedger {
    fn get_conflicts(&self, components: &ComponentSet) -> Result<Vec<Conflict>> {
        let document = self.lock()?;
        let mut conflicts = Vec::new();

        for component in components.iter() {
            let (component_type, full_name) = component.key();
            let remote_ahead = document
                .remote
                .get(&remote_key(component_type, full_name))
                .is_some_and(RemoteRecord::is_pending);
            if !remote_ahead {
                continue;
            }

            let mut file_paths = Vec::new();
            for path in component.absolute_paths() {
                let Some(relative) = self.relative(&path) else {
                    continue;
                };
                let Some(recorded) = document.local.get(&relative) else {
                    continue;
                };
                let current = if path.is_file() {
                    Some(Self::hash_file(&path)?)
                } else {
                    None
                };
                if current.as_ref() != Some(recorded) {
                    file_paths.push(relative);
                }
            }
            if !file_paths.is_empty() {
                conflicts.push(Conflict {
                    component_type: component_type.to_string(),
                    full_name: full_name.to_string(),
                    file_paths,
                });
            }
        }
        Ok(conflicts)
    }

    fn update_local_tracking(&self, update: &LocalTrackingUpdate) -> Result<()> {
        let mut document = self.lock()?;
        let mut updated = document.clone();
        self.apply_local(&mut updated, update)?;
        self.save(&updated)?;
        *document = updated;
        Ok(())
    }

    fn update_remote_tracking(&self, outcomes: &[FileOutcome], is_retrieve: bool) -> Result<()> {
        let mut document = self.lock()?;
        let mut updated = document.clone();
        Self::apply_remote(&mut updated, outcomes, is_retrieve);
        self.save(&updated)?;
        *document = updated;
        Ok(())
    }

    #[instrument(skip_all, fields(is_retrieve = update.is_retrieve))]
    fn apply(&self, update: &TrackingUpdate) -> Result<()> {
        let mut document = self.lock()?;
        let mut updated = document.clone();
        self.apply_local(&mut updated, &update.local)?;
        Self::apply_remote(&mut updated, &update.remote, update.is_retrieve);
        self.save(&updated)?;
        *document = updated;
        Ok(())
    }
}
