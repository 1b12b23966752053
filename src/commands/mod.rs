//! Command implementations.
//!
//! Each command turns parsed arguments into a [`Workflow`] call (or a direct
//! engine call for the listing commands) and returns a [`CommandResult`].

use std::path::PathBuf;
use std::sync::Arc;

use busbar_sf_jobs::{
    exit::aggregate_exit_code, Error, ErrorKind, FileLedger, MetadataApi, OperationReport,
    PollOptions, Result, StashStore, TrackingSynchronizer, Workflow,
};
use busbar_sf_metadata::{DescribeMetadataResult, MetadataComponent};
use serde_json::Value;
use tokio::sync::Notify;

use crate::cli::{Command, DeployCommand, RetrieveCommand};
use crate::project::{Project, PROJECT_FILE};

mod delete;
mod deploy;
mod metadata;
mod pull;
mod push;
mod retrieve;

/// What a command produced.
#[derive(Debug, Clone)]
pub enum CommandResult {
    Operation(OperationReport),
    /// One report per job, e.g. a push over several package directories.
    Sequence(Vec<OperationReport>),
    Listing(Vec<MetadataComponent>),
    Describe(DescribeMetadataResult),
}

impl CommandResult {
    pub fn exit_code(&self) -> i32 {
        match self {
            CommandResult::Operation(report) => report.exit_code,
            CommandResult::Sequence(reports) => {
                let codes: Vec<i32> = reports.iter().map(|r| r.exit_code).collect();
                aggregate_exit_code(&codes)
            }
            CommandResult::Listing(_) | CommandResult::Describe(_) => 0,
        }
    }

    pub fn to_json(&self) -> Value {
        let value = match self {
            CommandResult::Operation(report) => serde_json::to_value(report),
            CommandResult::Sequence(reports) => serde_json::to_value(reports),
            CommandResult::Listing(components) => serde_json::to_value(components),
            CommandResult::Describe(describe) => serde_json::to_value(describe),
        };
        value.unwrap_or(Value::Null)
    }
}

/// Shared state for one invocation.
pub struct Context {
    pub api: Arc<dyn MetadataApi>,
    pub stash: Box<dyn StashStore>,
    pub json: bool,
    /// Explicit project root; otherwise the project is found from the cwd.
    pub project_dir: Option<PathBuf>,
    pub interrupt: Arc<Notify>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("api_version", &self.api.api_version())
            .field("json", &self.json)
            .field("project_dir", &self.project_dir)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(api: Arc<dyn MetadataApi>, stash: Box<dyn StashStore>) -> Self {
        Self {
            api,
            stash,
            json: false,
            project_dir: None,
            interrupt: Arc::new(Notify::new()),
        }
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn with_project_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.project_dir = dir;
        self
    }

    pub fn with_interrupt(mut self, interrupt: Arc<Notify>) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn api_version(&self) -> &str {
        self.api.api_version()
    }

    pub fn workflow(&self, poll: PollOptions) -> Workflow<'_> {
        Workflow::new(self.api.clone(), self.stash.as_ref())
            .with_poll_options(poll)
            .with_interrupt(self.interrupt.clone())
    }

    /// Project from `--project-dir` or the nearest `sfdx-project.json`.
    pub fn project(&self) -> Result<Option<Project>> {
        match &self.project_dir {
            Some(dir) if dir.join(PROJECT_FILE).is_file() => Project::load(dir).map(Some),
            Some(dir) => Err(Error::new(ErrorKind::InvalidInput(format!(
                "no {} in {}",
                PROJECT_FILE,
                dir.display()
            )))),
            None => Project::find(&std::env::current_dir()?),
        }
    }

    pub fn require_project(&self) -> Result<Project> {
        self.project()?.ok_or_else(|| {
            Error::new(ErrorKind::InvalidInput(
                "this command must run inside a project (sfdx-project.json not found)"
                    .to_string(),
            ))
        })
    }

    /// A workflow whose jobs are checked against and recorded in the
    /// project's ledger.
    pub fn tracked_workflow(
        &self,
        project: &Project,
        poll: PollOptions,
    ) -> Result<(Workflow<'_>, Arc<FileLedger>)> {
        let ledger = Arc::new(FileLedger::open(project.root())?);
        let workflow = self
            .workflow(poll)
            .with_tracking(TrackingSynchronizer::new(ledger.clone()));
        Ok((workflow, ledger))
    }
}

/// Run one parsed command.
pub async fn dispatch(command: Command, ctx: &Context) -> Result<CommandResult> {
    match command {
        Command::Deploy(DeployCommand::Start(args)) => deploy::start(args, ctx).await,
        Command::Deploy(DeployCommand::Report(args)) => deploy::report(args, ctx).await,
        Command::Deploy(DeployCommand::Cancel(args)) => deploy::cancel(args, ctx).await,
        Command::Deploy(DeployCommand::Quick(args)) => deploy::quick(args, ctx).await,
        Command::Retrieve(RetrieveCommand::Start(args)) => retrieve::start(args, ctx).await,
        Command::Retrieve(RetrieveCommand::Report(args)) => retrieve::report(args, ctx).await,
        Command::Delete(args) => delete::run(args, ctx).await,
        Command::Push(args) => push::run(args, ctx).await,
        Command::Pull(args) => pull::run(args, ctx).await,
        Command::ListMetadata(args) => metadata::list(args, ctx).await,
        Command::DescribeMetadata => metadata::describe(ctx).await,
    }
}
