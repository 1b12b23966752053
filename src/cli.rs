//! Command-line argument definitions using clap derive.

use std::path::PathBuf;
use std::time::Duration;

use busbar_sf_jobs::{PollOptions, Wait};
use busbar_sf_metadata::TestLevel;
use clap::{Args, Parser, Subcommand};

/// Deploy, retrieve and track Salesforce metadata
#[derive(Parser, Debug)]
#[command(name = "busbar-sf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Print the structured result as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Org instance URL
    #[arg(long, global = true, env = "SF_INSTANCE_URL")]
    pub instance_url: Option<String>,

    /// Session id or OAuth access token
    #[arg(long, global = true, env = "SF_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Metadata API version
    #[arg(long, global = true, env = "SF_API_VERSION")]
    pub api_version: Option<String>,

    /// Project root (defaults to the nearest directory with sfdx-project.json)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Deploy metadata-API-format source or a package zip
    #[command(subcommand)]
    Deploy(DeployCommand),

    /// Retrieve metadata into a directory
    #[command(subcommand)]
    Retrieve(RetrieveCommand),

    /// Delete components from the org (and the project, when inside one)
    Delete(DeleteArgs),

    /// Deploy local changes tracked since the last sync
    Push(PushArgs),

    /// Retrieve remote changes tracked since the last sync
    Pull(PullArgs),

    /// List components of one metadata type
    ListMetadata(ListMetadataArgs),

    /// Describe the metadata types the org supports
    DescribeMetadata,
}

#[derive(Subcommand, Debug)]
pub enum DeployCommand {
    /// Start a deploy
    Start(DeployStartArgs),
    /// Check or wait for a deploy started earlier
    Report(DeployJobArgs),
    /// Cancel a running deploy
    Cancel(DeployJobArgs),
    /// Deploy a validated check-only deploy without running tests again
    Quick(JobArgs),
}

#[derive(Subcommand, Debug)]
pub enum RetrieveCommand {
    /// Start a retrieve
    Start(RetrieveStartArgs),
    /// Check or wait for a retrieve started earlier
    Report(RetrieveReportArgs),
}

/// `--wait` and `--poll-interval`.
#[derive(Args, Debug, Clone, Default)]
pub struct WaitArgs {
    /// Minutes to wait; 0 returns after one status check, -1 uses the default
    #[arg(short, long, allow_negative_numbers = true, value_name = "MINUTES")]
    pub wait: Option<i64>,

    /// Milliseconds between status checks
    #[arg(long, value_name = "MS")]
    pub poll_interval: Option<u64>,
}

impl WaitArgs {
    /// The wait, falling back to `default` when `--wait` is omitted.
    pub fn wait_or(&self, default: Wait) -> Wait {
        self.wait.map(Wait::from_minutes).unwrap_or(default)
    }

    pub fn poll_options(&self) -> PollOptions {
        let options = PollOptions::default();
        match self.poll_interval {
            Some(ms) => options.with_frequency(Duration::from_millis(ms.max(1))),
            None => options,
        }
    }
}

#[derive(Args, Debug)]
pub struct DeployStartArgs {
    /// Directory in metadata API format
    #[arg(short = 'd', long, required_unless_present = "zip_file", conflicts_with = "zip_file")]
    pub metadata_dir: Option<PathBuf>,

    /// Prebuilt package zip
    #[arg(short = 'f', long)]
    pub zip_file: Option<PathBuf>,

    /// Validate without saving changes
    #[arg(short = 'c', long)]
    pub check_only: bool,

    /// Let warnings pass
    #[arg(short = 'g', long)]
    pub ignore_warnings: bool,

    /// Keep successful components when others fail
    #[arg(long)]
    pub no_rollback: bool,

    /// Delete components immediately instead of via the recycle bin
    #[arg(long)]
    pub purge_on_delete: bool,

    /// NoTestRun, RunLocalTests, RunAllTestsInOrg or RunSpecifiedTests
    #[arg(short = 'l', long)]
    pub test_level: Option<TestLevel>,

    /// Test classes for RunSpecifiedTests
    #[arg(short = 'r', long, value_delimiter = ',')]
    pub run_tests: Vec<String>,

    #[command(flatten)]
    pub wait: WaitArgs,
}

#[derive(Args, Debug)]
pub struct JobArgs {
    /// Job id; defaults to the last stashed deploy
    #[arg(short = 'i', long, alias = "jobid")]
    pub job_id: Option<String>,

    #[command(flatten)]
    pub wait: WaitArgs,
}

/// Job selection for `deploy report` and `deploy cancel`.
#[derive(Args, Debug)]
pub struct DeployJobArgs {
    #[command(flatten)]
    pub job: JobArgs,

    /// Use the last deploy started by push or delete
    #[arg(long)]
    pub source: bool,
}

#[derive(Args, Debug)]
pub struct RetrieveStartArgs {
    /// package.xml naming the components
    #[arg(short = 'x', long)]
    pub manifest: Option<PathBuf>,

    /// Components as Type:Name
    #[arg(short = 'm', long)]
    pub metadata: Vec<String>,

    /// Whole packages by name
    #[arg(short = 'p', long)]
    pub package_name: Vec<String>,

    /// Output directory
    #[arg(short = 't', long)]
    pub target_dir: PathBuf,

    /// Name of the zip written to the target directory
    #[arg(short = 'z', long)]
    pub zip_file_name: Option<String>,

    /// Extract the zip and delete it
    #[arg(long)]
    pub unzip: bool,

    #[command(flatten)]
    pub wait: WaitArgs,
}

#[derive(Args, Debug)]
pub struct RetrieveReportArgs {
    /// Job id; defaults to the last stashed retrieve
    #[arg(short = 'i', long, alias = "jobid")]
    pub job_id: Option<String>,

    /// Output directory; defaults to the stashed one
    #[arg(short = 't', long)]
    pub target_dir: Option<PathBuf>,

    #[arg(short = 'z', long, requires = "target_dir")]
    pub zip_file_name: Option<String>,

    #[arg(long, requires = "target_dir")]
    pub unzip: bool,

    #[command(flatten)]
    pub wait: WaitArgs,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Components as Type:Name
    #[arg(short = 'm', long, required = true)]
    pub metadata: Vec<String>,

    /// Validate the deletion without saving it
    #[arg(short = 'c', long)]
    pub check_only: bool,

    /// Delete even when the component changed in the org
    #[arg(short = 'f', long)]
    pub force_overwrite: bool,

    #[command(flatten)]
    pub wait: WaitArgs,
}

#[derive(Args, Debug)]
pub struct PushArgs {
    /// Deploy even when components changed in the org
    #[arg(short = 'f', long)]
    pub force_overwrite: bool,

    #[arg(short = 'g', long)]
    pub ignore_warnings: bool,

    #[command(flatten)]
    pub wait: WaitArgs,
}

#[derive(Args, Debug)]
pub struct PullArgs {
    /// Retrieve even when components changed locally
    #[arg(short = 'f', long)]
    pub force_overwrite: bool,

    #[command(flatten)]
    pub wait: WaitArgs,
}

#[derive(Args, Debug)]
pub struct ListMetadataArgs {
    /// Metadata type, e.g. ApexClass
    #[arg(short = 'm', long)]
    pub metadata_type: String,

    /// Folder for in-folder types (reports, documents, ...)
    #[arg(long)]
    pub folder: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_wait_flag_parsing() {
        let cli = Cli::try_parse_from(["busbar-sf", "deploy", "report", "--wait", "-1"]).unwrap();
        let Command::Deploy(DeployCommand::Report(args)) = cli.command else {
            panic!("wrong command");
        };
        assert_eq!(args.job.wait.wait_or(Wait::Async), Wait::default());
        assert!(!args.source);

        let cli = Cli::try_parse_from(["busbar-sf", "deploy", "report"]).unwrap();
        let Command::Deploy(DeployCommand::Report(args)) = cli.command else {
            panic!("wrong command");
        };
        assert_eq!(args.job.wait.wait_or(Wait::Async), Wait::Async);
    }

    #[test]
    fn test_deploy_start_needs_a_source() {
        assert!(Cli::try_parse_from(["busbar-sf", "deploy", "start"]).is_err());
        assert!(Cli::try_parse_from([
            "busbar-sf", "deploy", "start", "-d", "mdapi", "-f", "x.zip"
        ])
        .is_err());

        let cli = Cli::try_parse_from([
            "busbar-sf",
            "--json",
            "deploy",
            "start",
            "-d",
            "mdapi",
            "--test-level",
            "RunSpecifiedTests",
            "--run-tests",
            "A,B",
            "--poll-interval",
            "250",
        ])
        .unwrap();
        assert!(cli.json);
        let Command::Deploy(DeployCommand::Start(args)) = cli.command else {
            panic!("wrong command");
        };
        assert_eq!(args.test_level, Some(TestLevel::RunSpecifiedTests));
        assert_eq!(args.run_tests, vec!["A", "B"]);
        assert_eq!(
            args.wait.poll_options().frequency,
            Duration::from_millis(250)
        );
    }
}
