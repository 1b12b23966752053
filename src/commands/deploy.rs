use busbar_sf_jobs::{
    ComponentSet, DeployRequest, Error, ErrorKind, Result, StashCategory, TypeRegistry, Wait,
};
use busbar_sf_metadata::DeployOptions;
use tracing::debug;

use super::{CommandResult, Context};
use crate::cli::{DeployJobArgs, DeployStartArgs, JobArgs};
use crate::output::ProgressReporter;

fn options(args: &DeployStartArgs) -> DeployOptions {
    DeployOptions::default()
        .validate_only(args.check_only)
        .with_ignore_warnings(args.ignore_warnings)
        .with_rollback_on_error(!args.no_rollback)
        .with_purge_on_delete(args.purge_on_delete)
        .with_tests(args.test_level, args.run_tests.clone())
}

pub(super) async fn start(args: DeployStartArgs, ctx: &Context) -> Result<CommandResult> {
    let options = options(&args);
    let request = if let Some(dir) = &args.metadata_dir {
        let mut set = ComponentSet::from_metadata_dir(dir, &TypeRegistry::default())?;
        if !dir.join("package.xml").is_file() {
            set = set.with_api_version(ctx.api_version());
        }
        DeployRequest::components(set, options)
    } else {
        let zip = args.zip_file.as_ref().ok_or_else(|| {
            Error::new(ErrorKind::InvalidInput(
                "either --metadata-dir or --zip-file is required".to_string(),
            ))
        })?;
        debug!(zip = %zip.display(), "Deploying prebuilt zip");
        DeployRequest::zip(std::fs::read(zip)?, options)
    };
    let request = request.with_wait(args.wait.wait_or(Wait::default()));

    let mut progress = ProgressReporter::new(ctx.json);
    let report = ctx
        .workflow(args.wait.poll_options())
        .deploy(request, &mut progress)
        .await?;
    Ok(CommandResult::Operation(report))
}

fn category(args: &DeployJobArgs) -> StashCategory {
    if args.source {
        StashCategory::SourceDeploy
    } else {
        StashCategory::MdapiDeploy
    }
}

pub(super) async fn report(args: DeployJobArgs, ctx: &Context) -> Result<CommandResult> {
    let poll = args.job.wait.poll_options();
    // push and delete jobs commit to the project ledger once they finish
    let project = if args.source { ctx.project()? } else { None };
    let workflow = match project {
        Some(project) => ctx.tracked_workflow(&project, poll)?.0,
        None => ctx.workflow(poll),
    };
    let mut progress = ProgressReporter::new(ctx.json);
    let report = workflow
        .deploy_report(
            args.job.job_id.as_deref(),
            category(&args),
            None,
            args.job.wait.wait_or(Wait::Async),
            &mut progress,
        )
        .await?;
    Ok(CommandResult::Operation(report))
}

pub(super) async fn cancel(args: DeployJobArgs, ctx: &Context) -> Result<CommandResult> {
    let mut progress = ProgressReporter::new(ctx.json);
    let report = ctx
        .workflow(args.job.wait.poll_options())
        .cancel_deploy(
            args.job.job_id.as_deref(),
            category(&args),
            args.job.wait.wait_or(Wait::default()),
            &mut progress,
        )
        .await?;
    Ok(CommandResult::Operation(report))
}

pub(super) async fn quick(args: JobArgs, ctx: &Context) -> Result<CommandResult> {
    let mut progress = ProgressReporter::new(ctx.json);
    let report = ctx
        .workflow(args.wait.poll_options())
        .quick_deploy(
            args.job_id.as_deref(),
            args.wait.wait_or(Wait::default()),
            &mut progress,
        )
        .await?;
    Ok(CommandResult::Operation(report))
}
