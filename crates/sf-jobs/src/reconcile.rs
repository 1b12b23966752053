//! Turning a terminal status payload into per-file outcomes.
//!
//! The submitted component set is the primary source of truth: every
//! component in it yields exactly one outcome. The payload's component
//! lists only add entries for components the set does not know about.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::LazyLock;

use busbar_sf_metadata::{
    ComponentFailure, ComponentSuccess, DeployResult, RequestStatus, RetrieveResult,
};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::component::{ComponentSet, SourceComponent};
use crate::target::RetrieveTarget;

/// A `Failed` job whose file outcomes contain no failure counts as a
/// success. Older tooling reported runs whose only problems were warnings
/// about already-deleted components this way, and scripts depend on it.
pub const FAILED_WITHOUT_FILE_FAILURES_IS_SUCCESS: bool = true;

const UNKNOWN_PROBLEM: &str = "Unknown failure reported by the org";

/// Reconciled state of one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentState {
    Add,
    Changed,
    Deleted,
    Failed,
}

/// One reconciled, output-facing result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOutcome {
    pub full_name: String,
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Further files of the same component.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other_paths: Vec<String>,
    pub state: ComponentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_number: Option<u32>,
}

impl FileOutcome {
    fn new(component_type: &str, full_name: &str, state: ComponentState) -> Self {
        Self {
            full_name: full_name.to_string(),
            component_type: component_type.to_string(),
            file_path: None,
            other_paths: Vec::new(),
            state,
            error: None,
            line_number: None,
            column_number: None,
        }
    }

    fn failed(component_type: &str, full_name: &str, problem: &str) -> Self {
        let mut outcome = Self::new(component_type, full_name, ComponentState::Failed);
        outcome.error = Some(if problem.trim().is_empty() {
            UNKNOWN_PROBLEM.to_string()
        } else {
            problem.to_string()
        });
        outcome
    }

    fn with_paths(mut self, mut paths: Vec<String>) -> Self {
        if !paths.is_empty() {
            self.file_path = Some(paths.remove(0));
            self.other_paths = paths;
        }
        self
    }

    pub fn is_failed(&self) -> bool {
        self.state == ComponentState::Failed
    }

    fn key(&self) -> (String, String) {
        (self.component_type.clone(), self.full_name.clone())
    }
}

/// Per-file outcomes of a deploy.
pub fn reconcile_deploy(result: &DeployResult, submitted: &ComponentSet) -> Vec<FileOutcome> {
    let failures: Vec<&ComponentFailure> = result
        .component_failures
        .iter()
        .filter(|f| !f.is_warning())
        .collect();

    let mut outcomes: Vec<FileOutcome> = submitted
        .iter()
        .map(|component| outcome_for_component(component, &failures, &result.component_successes))
        .collect();
    let mut seen: BTreeSet<(String, String)> = outcomes.iter().map(FileOutcome::key).collect();

    for failure in &failures {
        let (component_type, full_name) = failure_key(failure);
        if !seen.insert((component_type.clone(), full_name.clone())) {
            continue;
        }
        let mut outcome = FileOutcome::failed(&component_type, &full_name, &failure.problem)
            .with_paths(failure.file_name.iter().cloned().collect());
        outcome.line_number = failure.line_number;
        outcome.column_number = failure.column_number;
        outcomes.push(outcome);
    }

    for success in &result.component_successes {
        if is_package_manifest(success) {
            continue;
        }
        let Some(component_type) = success.component_type.as_deref() else {
            continue;
        };
        let full_name = success_name(success);
        if !seen.insert((component_type.to_string(), full_name.clone())) {
            continue;
        }
        outcomes.push(
            FileOutcome::new(component_type, &full_name, success_state(success))
                .with_paths(success.file_name.iter().cloned().collect()),
        );
    }

    sort_outcomes(&mut outcomes);
    outcomes
}

fn outcome_for_component(
    component: &SourceComponent,
    failures: &[&ComponentFailure],
    successes: &[ComponentSuccess],
) -> FileOutcome {
    let paths: Vec<String> = match &component.root {
        Some(_) => component
            .absolute_paths()
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
        None => Vec::new(),
    };
    let (component_type, full_name) = component.key();

    let failure = failures.iter().find(|f| {
        let (t, n) = failure_key(f);
        t == component_type && n == full_name
    });
    if let Some(failure) = failure {
        let mut outcome =
            FileOutcome::failed(component_type, full_name, &failure.problem).with_paths(paths);
        outcome.line_number = failure.line_number;
        outcome.column_number = failure.column_number;
        return outcome;
    }

    let state = if component.destructive {
        ComponentState::Deleted
    } else {
        successes
            .iter()
            .find(|s| {
                s.component_type.as_deref() == Some(component_type)
                    && success_name(s) == full_name
            })
            .map(success_state)
            .unwrap_or(ComponentState::Changed)
    };
    FileOutcome::new(component_type, full_name, state).with_paths(paths)
}

fn failure_key(failure: &ComponentFailure) -> (String, String) {
    let component_type = failure.component_type.clone().unwrap_or_default();
    let full_name = failure
        .full_name
        .clone()
        .filter(|n| !n.is_empty())
        .or_else(|| failure.file_name.clone())
        .unwrap_or_default();
    (component_type, full_name)
}

fn success_name(success: &ComponentSuccess) -> String {
    success
        .full_name
        .clone()
        .filter(|n| !n.is_empty())
        .or_else(|| success.file_name.clone())
        .unwrap_or_default()
}

fn success_state(success: &ComponentSuccess) -> ComponentState {
    if success.deleted {
        ComponentState::Deleted
    } else if success.created {
        ComponentState::Add
    } else {
        ComponentState::Changed
    }
}

fn is_package_manifest(success: &ComponentSuccess) -> bool {
    let ends_with_manifest =
        |s: &Option<String>| s.as_deref().is_some_and(|v| v == "package.xml" || v.ends_with("/package.xml"));
    success.component_type.as_deref().map_or(true, str::is_empty)
        || ends_with_manifest(&success.full_name)
        || ends_with_manifest(&success.file_name)
}

/// Order by type, then path, then full name.
pub fn sort_outcomes(outcomes: &mut [FileOutcome]) {
    outcomes.sort_by(|a, b| {
        a.component_type
            .cmp(&b.component_type)
            .then_with(|| a.file_path.cmp(&b.file_path))
            .then_with(|| a.full_name.cmp(&b.full_name))
    });
}

/// Overall success of a reconciled job.
pub fn is_success(status: RequestStatus, outcomes: &[FileOutcome]) -> bool {
    match status {
        RequestStatus::Succeeded => true,
        RequestStatus::Failed if FAILED_WITHOUT_FILE_FAILURES_IS_SUCCESS => {
            !outcomes.is_empty() && outcomes.iter().all(|o| !o.is_failed())
        }
        _ => false,
    }
}

/// Overall success of a deploy.
///
/// Failing tests, component errors and a job-level error message always
/// fail the run, whatever the per-file outcomes say.
pub fn deploy_success(result: &DeployResult, outcomes: &[FileOutcome]) -> bool {
    if result.status == RequestStatus::Failed
        && (!result.test_failures.is_empty()
            || result.number_tests_errors > 0
            || unexplained_component_errors(result)
            || result.error_message.as_deref().is_some_and(|m| !m.trim().is_empty()))
    {
        return false;
    }
    is_success(result.status, outcomes)
}

/// Component errors counted by the org beyond the reported warnings.
fn unexplained_component_errors(result: &DeployResult) -> bool {
    let warnings = result
        .component_failures
        .iter()
        .filter(|f| f.is_warning())
        .count();
    result.number_components_errors as usize > warnings
}

static MISSING_ENTITY: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"Entity of type '(.+)' named '(.+)' cannot be found").ok()
});

/// Per-file outcomes of a retrieve.
///
/// `preexisting` holds extracted files that were already on disk, which
/// report as `Changed` instead of `Add`.
pub fn reconcile_retrieve(
    result: &RetrieveResult,
    target: Option<&RetrieveTarget>,
    preexisting: &BTreeSet<PathBuf>,
) -> Vec<FileOutcome> {
    let mut by_key: BTreeMap<(String, String), FileOutcome> = BTreeMap::new();

    for properties in &result.file_properties {
        if properties.file_name.ends_with("package.xml") {
            continue;
        }
        let local = target
            .filter(|t| t.unzip)
            .map(|t| t.local_path(&properties.file_name));
        let state = match &local {
            Some(path) if preexisting.contains(path) => ComponentState::Changed,
            Some(_) => ComponentState::Add,
            None => ComponentState::Changed,
        };
        let path = local
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| properties.file_name.clone());

        let key = (properties.component_type.clone(), properties.full_name.clone());
        match by_key.get_mut(&key) {
            Some(existing) => existing.other_paths.push(path),
            None => {
                let outcome = FileOutcome::new(&key.0, &key.1, state).with_paths(vec![path]);
                by_key.insert(key, outcome);
            }
        }
    }

    for message in &result.messages {
        let captures = MISSING_ENTITY
            .as_ref()
            .and_then(|re| re.captures(&message.problem));
        match captures {
            Some(captures) => {
                let component_type = &captures[1];
                let full_name = &captures[2];
                let key = (component_type.to_string(), full_name.to_string());
                by_key.insert(
                    key,
                    FileOutcome::failed(component_type, full_name, &message.problem)
                        .with_paths(vec![message.file_name.clone()]),
                );
            }
            None => warn!(file = %message.file_name, problem = %message.problem, "Retrieve warning"),
        }
    }

    let mut outcomes: Vec<FileOutcome> = by_key.into_values().collect();
    sort_outcomes(&mut outcomes);
    outcomes
}

/// Outcomes that should be committed to tracking.
pub fn non_failed(outcomes: &[FileOutcome]) -> Vec<FileOutcome> {
    outcomes.iter().filter(|o| !o.is_failed()).cloned().collect()
}
