use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use busbar_sf_jobs::{
    ComponentSet, DeployRequest, LocalChanges, LocalTrackingUpdate, OperationReport, Result,
    SourceComponent, StashCategory, TrackingLedger, TypeRegistry, Wait,
};
use busbar_sf_metadata::DeployOptions;
use tracing::{debug, info, warn};

use super::metadata::observe_remote;
use super::{CommandResult, Context};
use crate::cli::PushArgs;
use crate::output::ProgressReporter;
use crate::project::Project;

/// What one package directory contributes to a push.
#[derive(Debug)]
struct PackagePush {
    set: ComponentSet,
    /// Deleted files no registry type claims; dropped from tracking only.
    untracked: Vec<String>,
}

/// `dir`-relative form of a project-relative path, if it lies under `dir`.
fn under_dir(project_root: &Path, dir: &Path, project_relative: &str) -> Option<String> {
    let absolute = project_root.join(project_relative);
    let relative = absolute.strip_prefix(dir).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

/// Components of `dir` touched by `changes`.
fn collect_package(
    project: &Project,
    dir: &Path,
    changes: &LocalChanges,
    registry: &TypeRegistry,
    api_version: &str,
) -> Result<PackagePush> {
    let mut set = ComponentSet::new(api_version);
    set.root = Some(dir.to_path_buf());
    let mut untracked = Vec::new();

    let modified: BTreeSet<String> = changes
        .modified
        .iter()
        .filter_map(|p| under_dir(project.root(), dir, p))
        .collect();
    let local = if dir.is_dir() {
        ComponentSet::from_metadata_dir(dir, registry)?
    } else {
        ComponentSet::new(api_version)
    };
    for component in local.iter() {
        if component.paths.iter().any(|p| modified.contains(p)) {
            set.add(component.clone());
        }
    }

    for deleted in &changes.deleted {
        let Some(relative) = under_dir(project.root(), dir, deleted) else {
            continue;
        };
        match registry.classify(&relative) {
            // a deleted companion file of a component still on disk
            Some((t, n)) if local.contains(&t, &n) => {
                if let Some(component) = local.get(&t, &n) {
                    set.add(component.clone());
                }
            }
            Some((t, n)) => set.add(
                SourceComponent::new(t, n)
                    .with_file(dir.to_path_buf(), relative)
                    .destructive(),
            ),
            None => untracked.push(deleted.clone()),
        }
    }

    Ok(PackagePush { set, untracked })
}

fn stop_after(report: &OperationReport) -> bool {
    report.timed_out || !report.success
}

pub(super) async fn run(args: PushArgs, ctx: &Context) -> Result<CommandResult> {
    let project = ctx.require_project()?;
    let (workflow, ledger) = ctx.tracked_workflow(&project, args.wait.poll_options())?;
    let api_version = project
        .source_api_version
        .clone()
        .unwrap_or_else(|| ctx.api_version().to_string());

    let dirs: Vec<PathBuf> = project.package_dirs();
    let changes = ledger.local_changes(&dirs)?;
    if changes.is_empty() {
        info!("No local changes");
        return Ok(CommandResult::Sequence(Vec::new()));
    }
    debug!(
        modified = changes.modified.len(),
        deleted = changes.deleted.len(),
        "Local changes"
    );

    let registry = TypeRegistry::default();
    let mut packages = Vec::new();
    for dir in &dirs {
        packages.push(collect_package(&project, dir, &changes, &registry, &api_version)?);
    }

    let types: BTreeSet<String> = packages
        .iter()
        .flat_map(|p| p.set.iter().map(|c| c.component_type.clone()))
        .collect();
    observe_remote(ctx, &ledger, &types).await?;

    let untracked: Vec<PathBuf> = packages
        .iter()
        .flat_map(|p| p.untracked.iter().map(PathBuf::from))
        .collect();

    let sets: Vec<ComponentSet> = if project.push_sequentially {
        packages.into_iter().map(|p| p.set).collect()
    } else {
        let mut merged = ComponentSet::new(api_version.as_str());
        for package in packages {
            merged.extend(package.set);
        }
        vec![merged]
    };

    let mut reports = Vec::new();
    let mut progress = ProgressReporter::new(ctx.json);
    for set in sets.into_iter().filter(|s| !s.is_empty()) {
        let request = DeployRequest::components(
            set,
            DeployOptions::default().with_ignore_warnings(args.ignore_warnings),
        )
        .with_category(StashCategory::SourceDeploy)
        .with_force_overwrite(args.force_overwrite)
        .with_wait(args.wait.wait_or(Wait::default()));

        let report = workflow.deploy(request, &mut progress).await?;
        let stop = stop_after(&report);
        reports.push(report);
        if stop {
            warn!("Push stopped after an unsuccessful deploy");
            break;
        }
    }

    if !untracked.is_empty() {
        ledger.update_local_tracking(&LocalTrackingUpdate {
            files: Vec::new(),
            deleted_files: untracked,
        })?;
    }
    Ok(CommandResult::Sequence(reports))
}
