//! Source tracking: conflict checks before a job, ledger updates after it.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::component::ComponentSet;
use crate::error::{Error, ErrorKind, Result};
use crate::reconcile::{non_failed, ComponentState, FileOutcome};

mod file_ledger;

pub use file_ledger::{FileLedger, LocalChanges, RemoteRecord};

/// A component changed both locally and in the org since the last sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    #[serde(rename = "type")]
    pub component_type: String,
    pub full_name: String,
    pub file_paths: Vec<String>,
}

/// Local files now in sync, and files no longer tracked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalTrackingUpdate {
    pub files: Vec<PathBuf>,
    pub deleted_files: Vec<PathBuf>,
}

impl LocalTrackingUpdate {
    pub fn from_outcomes(outcomes: &[FileOutcome]) -> Self {
        let mut update = Self::default();
        for outcome in outcomes.iter().filter(|o| !o.is_failed()) {
            let paths = outcome
                .file_path
                .iter()
                .chain(outcome.other_paths.iter())
                .map(PathBuf::from);
            if outcome.state == ComponentState::Deleted {
                update.deleted_files.extend(paths);
            } else {
                update.files.extend(paths);
            }
        }
        update
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.deleted_files.is_empty()
    }
}

/// Both halves of a ledger update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingUpdate {
    pub local: LocalTrackingUpdate,
    pub remote: Vec<FileOutcome>,
    pub is_retrieve: bool,
}

/// Local and remote change state per component.
pub trait TrackingLedger: Send + Sync {
    /// Conflicts restricted to the components of `components`.
    fn get_conflicts(&self, components: &ComponentSet) -> Result<Vec<Conflict>>;

    fn update_local_tracking(&self, update: &LocalTrackingUpdate) -> Result<()>;

    fn update_remote_tracking(&self, outcomes: &[FileOutcome], is_retrieve: bool) -> Result<()>;

    /// Record both halves. Implementations should make this all-or-nothing.
    fn apply(&self, update: &TrackingUpdate) -> Result<()> {
        self.update_local_tracking(&update.local)?;
        self.update_remote_tracking(&update.remote, update.is_retrieve)
    }
}

/// Guards jobs against conflicts and commits their outcomes to the ledger.
#[derive(Clone)]
pub struct TrackingSynchronizer {
    ledger: Arc<dyn TrackingLedger>,
}

impl std::fmt::Debug for TrackingSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingSynchronizer").finish_non_exhaustive()
    }
}

impl TrackingSynchronizer {
    pub fn new(ledger: Arc<dyn TrackingLedger>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Arc<dyn TrackingLedger> {
        &self.ledger
    }

    /// Fail with `SourceConflict` when any component of `components` conflicts.
    #[instrument(skip_all, fields(components = components.len()))]
    pub fn check_conflicts(&self, components: &ComponentSet) -> Result<()> {
        let conflicts = self.ledger.get_conflicts(components)?;
        if conflicts.is_empty() {
            return Ok(());
        }
        warn!(count = conflicts.len(), "Source conflicts detected");
        Err(Error::new(ErrorKind::SourceConflict(conflicts)))
    }

    /// Commit the non-failed outcomes. Returns false, without touching the
    /// ledger, when there are none.
    #[instrument(skip(self, outcomes), fields(outcomes = outcomes.len()))]
    pub fn apply_outcomes(&self, outcomes: &[FileOutcome], is_retrieve: bool) -> Result<bool> {
        let synced = non_failed(outcomes);
        if synced.is_empty() {
            debug!("No successful outcomes, tracking unchanged");
            return Ok(false);
        }

        let update = TrackingUpdate {
            local: LocalTrackingUpdate::from_outcomes(&synced),
            remote: synced,
            is_retrieve,
        };
        self.ledger.apply(&update)?;
        info!(
            files = update.local.files.len(),
            deleted = update.local.deleted_files.len(),
            "Tracking updated"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::SourceComponent;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLedger {
        conflicts: Vec<Conflict>,
        writes: Mutex<Vec<String>>,
        seen: Mutex<Vec<TrackingUpdate>>,
    }

    impl TrackingLedger for RecordingLedger {
        fn get_conflicts(&self, components: &ComponentSet) -> Result<Vec<Conflict>> {
            Ok(self
                .conflicts
                .iter()
                .filter(|c| components.contains(&c.component_type, &c.full_name))
                .cloned()
                .collect())
        }

        fn update_local_tracking(&self, _update: &LocalTrackingUpdate) -> Result<()> {
            self.writes.lock().unwrap().push("local".to_string());
            Ok(())
        }

        fn update_remote_tracking(&self, _outcomes: &[FileOutcome], is_retrieve: bool) -> Result<()> {
            self.writes
                .lock()
                .unwrap()
                .push(format!("remote:{}", is_retrieve));
            Ok(())
        }

        fn apply(&self, update: &TrackingUpdate) -> Result<()> {
            self.seen.lock().unwrap().push(update.clone());
            self.update_local_tracking(&update.local)?;
            self.update_remote_tracking(&update.remote, update.is_retrieve)
        }
    }

    fn outcome(name: &str, state: ComponentState, path: &str) -> FileOutcome {
        serde_json::from_value(serde_json::json!({
            "fullName": name,
            "type": "ApexClass",
            "filePath": path,
            "state": state,
        }))
        .unwrap()
    }

    #[test]
    fn test_conflicts_restricted_to_unit_of_work() {
        let ledger = Arc::new(RecordingLedger {
            conflicts: vec![Conflict {
                component_type: "ApexClass".to_string(),
                full_name: "Foo".to_string(),
                file_paths: vec!["classes/Foo.cls".to_string()],
            }],
            ..Default::default()
        });
        let sync = TrackingSynchronizer::new(ledger);

        let mut other = ComponentSet::new("62.0");
        other.add(SourceComponent::new("ApexClass", "Bar"));
        sync.check_conflicts(&other).unwrap();

        let mut set = ComponentSet::new("62.0");
        set.add(SourceComponent::new("ApexClass", "Foo"));
        let err = sync.check_conflicts(&set).unwrap_err();
        assert_eq!(err.name(), "SourceConflictError");
        assert_eq!(err.data().unwrap()[0]["filePaths"][0], "classes/Foo.cls");
    }

    #[test]
    fn test_no_op_guard_skips_ledger() {
        let ledger = Arc::new(RecordingLedger::default());
        let sync = TrackingSynchronizer::new(ledger.clone());

        assert!(!sync.apply_outcomes(&[], false).unwrap());
        let failed = vec![outcome("Foo", ComponentState::Failed, "/p/Foo.cls")];
        assert!(!sync.apply_outcomes(&failed, false).unwrap());

        assert!(ledger.writes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_apply_splits_deleted_files() {
        let ledger = Arc::new(RecordingLedger::default());
        let sync = TrackingSynchronizer::new(ledger.clone());

        let outcomes = vec![
            outcome("Foo", ComponentState::Changed, "/p/Foo.cls"),
            outcome("Old", ComponentState::Deleted, "/p/Old.cls"),
            outcome("Bad", ComponentState::Failed, "/p/Bad.cls"),
        ];
        assert!(sync.apply_outcomes(&outcomes, true).unwrap());

        let seen = ledger.seen.lock().unwrap();
        assert_eq!(seen[0].local.files, vec![PathBuf::from("/p/Foo.cls")]);
        assert_eq!(seen[0].local.deleted_files, vec![PathBuf::from("/p/Old.cls")]);
        assert_eq!(seen[0].remote.len(), 2);
        assert_eq!(
            *ledger.writes.lock().unwrap(),
            vec!["local".to_string(), "remote:true".to_string()]
        );
    }
}
