use busbar_sf_jobs::{
    ComponentSet, Error, ErrorKind, Result, RetrieveJobRequest, RetrieveTarget, Wait,
};
use busbar_sf_metadata::PackageManifest;

use super::{CommandResult, Context};
use crate::cli::{RetrieveReportArgs, RetrieveStartArgs};
use crate::output::ProgressReporter;

fn target(dir: std::path::PathBuf, zip_file_name: Option<String>, unzip: bool) -> RetrieveTarget {
    let target = RetrieveTarget::new(dir).with_unzip(unzip);
    match zip_file_name {
        Some(name) => target.with_zip_file_name(name),
        None => target,
    }
}

/// Components named by `--manifest` and `--metadata`, if any.
fn requested_components(args: &RetrieveStartArgs, api_version: &str) -> Result<Option<ComponentSet>> {
    let mut set: Option<ComponentSet> = None;
    if let Some(path) = &args.manifest {
        let manifest = PackageManifest::from_xml(&std::fs::read_to_string(path)?)?;
        set = Some(ComponentSet::from_manifest(&manifest));
    }
    if !args.metadata.is_empty() {
        let members = ComponentSet::from_members(&args.metadata, api_version)?;
        match set.as_mut() {
            Some(existing) => existing.extend(members),
            None => set = Some(members),
        }
    }
    Ok(set)
}

pub(super) async fn start(args: RetrieveStartArgs, ctx: &Context) -> Result<CommandResult> {
    let components = requested_components(&args, ctx.api_version())?;
    if components.is_none() && args.package_name.is_empty() {
        return Err(Error::new(ErrorKind::InvalidInput(
            "one of --manifest, --metadata or --package-name is required".to_string(),
        )));
    }

    let mut request = RetrieveJobRequest::new(target(
        args.target_dir.clone(),
        args.zip_file_name.clone(),
        args.unzip,
    ))
    .with_packages(args.package_name.clone())
    .with_wait(args.wait.wait_or(Wait::default()));
    if let Some(set) = components {
        request = request.with_components(set);
    }

    let mut progress = ProgressReporter::new(ctx.json);
    let report = ctx
        .workflow(args.wait.poll_options())
        .retrieve(request, &mut progress)
        .await?;
    Ok(CommandResult::Operation(report))
}

pub(super) async fn report(args: RetrieveReportArgs, ctx: &Context) -> Result<CommandResult> {
    let target = args
        .target_dir
        .clone()
        .map(|dir| target(dir, args.zip_file_name.clone(), args.unzip));

    let mut progress = ProgressReporter::new(ctx.json);
    let report = ctx
        .workflow(args.wait.poll_options())
        .retrieve_report(
            args.job_id.as_deref(),
            target,
            args.wait.wait_or(Wait::Async),
            &mut progress,
        )
        .await?;
    Ok(CommandResult::Operation(report))
}
