use std::path::Path;

use busbar_sf_jobs::{
    ComponentSet, ComponentState, DeployRequest, OperationReport, Result, StashCategory,
    TypeRegistry, Wait,
};
use busbar_sf_metadata::{DeployOptions, RequestStatus};
use tracing::{debug, info, warn};

use super::{CommandResult, Context};
use crate::cli::DeleteArgs;
use crate::output::ProgressReporter;
use crate::project::Project;

/// Attach the project's local files to each component being deleted.
fn attach_local_files(set: &mut ComponentSet, project: &Project) -> Result<()> {
    let registry = TypeRegistry::default();
    for dir in project.package_dirs() {
        if !dir.is_dir() {
            continue;
        }
        let local = ComponentSet::from_metadata_dir(&dir, &registry)?;
        for component in local.iter() {
            let (component_type, full_name) = component.key();
            let unattached = set
                .get(component_type, full_name)
                .is_some_and(|c| c.paths.is_empty());
            if unattached {
                set.add(component.clone().destructive());
            }
        }
    }
    Ok(())
}

/// Remove local files of components the org confirmed as deleted.
fn remove_deleted_files(report: &OperationReport) -> Result<usize> {
    let committed = report.success || report.status == RequestStatus::SucceededPartial;
    if report.timed_out || !committed {
        return Ok(0);
    }
    let mut removed = 0;
    for outcome in report
        .outcomes
        .iter()
        .filter(|o| o.state == ComponentState::Deleted)
    {
        for path in outcome.file_path.iter().chain(outcome.other_paths.iter()) {
            let path = Path::new(path);
            if path.is_file() {
                std::fs::remove_file(path)?;
                removed += 1;
            } else if path.is_dir() {
                std::fs::remove_dir_all(path)?;
                removed += 1;
            }
        }
    }
    Ok(removed)
}

pub(super) async fn run(args: DeleteArgs, ctx: &Context) -> Result<CommandResult> {
    let mut set = ComponentSet::from_members(&args.metadata, ctx.api_version())?;
    for component in set.iter_mut() {
        component.destructive = true;
    }

    let project = ctx.project()?;
    if let Some(project) = &project {
        attach_local_files(&mut set, project)?;
    } else {
        debug!("Not inside a project, deleting from the org only");
    }

    let request = DeployRequest::components(
        set,
        DeployOptions::default().validate_only(args.check_only),
    )
    .with_category(StashCategory::SourceDeploy)
    .with_force_overwrite(args.force_overwrite)
    .with_wait(args.wait.wait_or(Wait::default()));

    let mut progress = ProgressReporter::new(ctx.json);
    let report = match &project {
        Some(project) => {
            let (workflow, _) = ctx.tracked_workflow(project, args.wait.poll_options())?;
            workflow.deploy(request, &mut progress).await?
        }
        None => {
            ctx.workflow(args.wait.poll_options())
                .deploy(request, &mut progress)
                .await?
        }
    };

    if !args.check_only {
        match remove_deleted_files(&report) {
            Ok(removed) => info!(removed, "Removed deleted components locally"),
            Err(e) => warn!(error = %e, "Deleted in the org but local files remain"),
        }
    }
    Ok(CommandResult::Operation(report))
}
