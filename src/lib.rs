//! # busbar-sf-cli
//!
//! Deploy, retrieve and source-tracking commands for Salesforce metadata.
//!
//! The heavy lifting lives in the workspace crates:
//!
//! - **busbar-sf-metadata** - Metadata API SOAP client
//! - **busbar-sf-jobs** - Job polling, result reconciliation, stash and tracking
//!
//! This crate parses arguments, builds a [`commands::Context`] and renders
//! results. Exit codes follow [`busbar_sf_jobs::exit`].
//!
//! ## Security
//!
//! The access token is read from a flag or `SF_ACCESS_TOKEN`, is redacted in
//! `Debug` output of the client, and is never logged.

pub mod cli;
pub mod commands;
pub mod output;
pub mod project;

use std::io::Write;
use std::sync::Arc;

use busbar_sf_jobs::{exit::EXIT_FAILURE, Error, ErrorKind, FileStash, Result};
use busbar_sf_metadata::MetadataClient;
use tokio::sync::Notify;
use tracing::debug;

pub use busbar_sf_jobs as jobs;
pub use busbar_sf_metadata as metadata;

use crate::cli::Cli;
use crate::commands::{CommandResult, Context};

/// Build a context from connection flags and the default stash.
pub fn context_from_cli(cli: &Cli, interrupt: Arc<Notify>) -> Result<Context> {
    let instance_url = cli.instance_url.as_deref().filter(|s| !s.is_empty());
    let access_token = cli.access_token.as_deref().filter(|s| !s.is_empty());
    let (Some(instance_url), Some(access_token)) = (instance_url, access_token) else {
        return Err(Error::new(ErrorKind::InvalidInput(
            "--instance-url and --access-token (or SF_INSTANCE_URL and SF_ACCESS_TOKEN) are required"
                .to_string(),
        )));
    };

    let mut client = MetadataClient::from_parts(instance_url, access_token);
    if let Some(version) = &cli.api_version {
        client = client.with_api_version(version.as_str());
    }
    debug!(?client, "Metadata client ready");

    Ok(Context::new(Arc::new(client), Box::new(FileStash::new()?))
        .with_json(cli.json)
        .with_project_dir(cli.project_dir.clone())
        .with_interrupt(interrupt))
}

/// Run `cli` and return the process exit code.
pub async fn run(cli: Cli, interrupt: Arc<Notify>) -> i32 {
    let mut stdout = std::io::stdout();
    match context_from_cli(&cli, interrupt) {
        Ok(ctx) => execute(cli.command, &ctx, &mut stdout).await,
        Err(e) => report_error(&e, cli.json, &mut stdout),
    }
}

/// Dispatch one command against `ctx`, writing results to `out`.
pub async fn execute(command: cli::Command, ctx: &Context, out: &mut dyn Write) -> i32 {
    match commands::dispatch(command, ctx).await {
        Ok(result) => report_result(&result, ctx.json, out),
        Err(e) => report_error(&e, ctx.json, out),
    }
}

fn report_result(result: &CommandResult, json: bool, out: &mut dyn Write) -> i32 {
    let written = if json {
        writeln!(out, "{}", output::success_envelope(result))
    } else {
        output::render(result, out)
    };
    if let Err(e) = written {
        eprintln!("Error writing output: {}", e);
    }
    result.exit_code()
}

fn report_error(err: &Error, json: bool, out: &mut dyn Write) -> i32 {
    if json {
        if let Err(e) = writeln!(out, "{}", output::error_envelope(err)) {
            eprintln!("Error writing output: {}", e);
        }
    } else {
        eprintln!("Error ({}): {}", err.name(), err);
        if let ErrorKind::SourceConflict(conflicts) = &err.kind {
            for conflict in conflicts {
                eprintln!(
                    "  {}:{} {}",
                    conflict.component_type,
                    conflict.full_name,
                    conflict.file_paths.join(", ")
                );
            }
            eprintln!("Re-run with --force-overwrite to ignore conflicts.");
        }
    }
    EXIT_FAILURE
}
