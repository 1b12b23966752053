use std::collections::BTreeSet;

use busbar_sf_jobs::{
    ComponentSet, RemoteRecord, Result, RetrieveJobRequest, RetrieveTarget, SourceComponent,
    TypeRegistry, Wait,
};
use tracing::info;

use super::metadata::observe_remote;
use super::{CommandResult, Context};
use crate::cli::PullArgs;
use crate::output::ProgressReporter;
use crate::project::Project;

/// All components currently in the project's package directories.
fn local_components(project: &Project, api_version: &str) -> Result<ComponentSet> {
    let registry = TypeRegistry::default();
    let mut set = ComponentSet::new(api_version);
    for dir in project.package_dirs().iter().filter(|d| d.is_dir()) {
        set.extend(ComponentSet::from_metadata_dir(dir, &registry)?);
    }
    Ok(set)
}

/// Components to retrieve, carrying local files where they exist so
/// conflicts can be checked.
fn pull_set(remote: &[RemoteRecord], local: &ComponentSet, api_version: &str) -> ComponentSet {
    let mut set = ComponentSet::new(api_version);
    for record in remote {
        let component = local
            .get(&record.component_type, &record.full_name)
            .cloned()
            .unwrap_or_else(|| {
                SourceComponent::new(record.component_type.clone(), record.full_name.clone())
            });
        set.add(component);
    }
    set
}

pub(super) async fn run(args: PullArgs, ctx: &Context) -> Result<CommandResult> {
    let project = ctx.require_project()?;
    let (workflow, ledger) = ctx.tracked_workflow(&project, args.wait.poll_options())?;
    let api_version = project
        .source_api_version
        .clone()
        .unwrap_or_else(|| ctx.api_version().to_string());

    let local = local_components(&project, &api_version)?;
    let mut types: BTreeSet<String> = local.iter().map(|c| c.component_type.clone()).collect();
    types.extend(ledger.remote_types()?);
    observe_remote(ctx, &ledger, &types).await?;

    let remote = ledger.remote_changes()?;
    if remote.is_empty() {
        info!("No remote changes");
        return Ok(CommandResult::Sequence(Vec::new()));
    }

    let request = RetrieveJobRequest::new(
        RetrieveTarget::new(project.default_package_dir()).with_unzip(true),
    )
    .with_components(pull_set(&remote, &local, &api_version))
    .with_force_overwrite(args.force_overwrite)
    .with_wait(args.wait.wait_or(Wait::default()));

    let mut progress = ProgressReporter::new(ctx.json);
    let report = workflow.retrieve(request, &mut progress).await?;
    Ok(CommandResult::Operation(report))
}
