//! Rendering command results for humans and for `--json`.

use std::io::Write;

use busbar_sf_jobs::{
    exit::EXIT_FAILURE, ComponentState, Error, JobResult, OperationReport, PollObserver, Result,
};
use serde_json::{json, Value};

use crate::commands::CommandResult;

/// `{"status": <exit code>, "result": ...}`
pub fn success_envelope(result: &CommandResult) -> Value {
    json!({
        "status": result.exit_code(),
        "result": result.to_json(),
    })
}

/// `{"status": 1, "name": ..., "message": ..., "data": ...}`
pub fn error_envelope(err: &Error) -> Value {
    let mut envelope = json!({
        "status": EXIT_FAILURE,
        "name": err.name(),
        "message": err.to_string(),
    });
    if let Some(data) = err.data() {
        envelope["data"] = data;
    }
    envelope
}

/// Human-readable summary of `result`.
pub fn render(result: &CommandResult, out: &mut dyn Write) -> std::io::Result<()> {
    match result {
        CommandResult::Operation(report) => render_report(report, out),
        CommandResult::Sequence(reports) => {
            if reports.is_empty() {
                writeln!(out, "Nothing to sync.")?;
            }
            for report in reports {
                render_report(report, out)?;
            }
            Ok(())
        }
        CommandResult::Listing(components) => {
            for c in components {
                writeln!(
                    out,
                    "{}\t{}\t{}",
                    c.metadata_type,
                    c.full_name,
                    c.file_name.as_deref().unwrap_or("")
                )?;
            }
            Ok(())
        }
        CommandResult::Describe(describe) => {
            for t in &describe.metadata_objects {
                writeln!(
                    out,
                    "{}\t{}",
                    t.xml_name,
                    t.directory_name.as_deref().unwrap_or("")
                )?;
            }
            Ok(())
        }
    }
}

fn render_report(report: &OperationReport, out: &mut dyn Write) -> std::io::Result<()> {
    if report.timed_out {
        writeln!(
            out,
            "Job {} is still {}. Resume it with the report command and --job-id {}.",
            report.job_id, report.status, report.job_id
        )?;
        return Ok(());
    }

    writeln!(out, "Job {}: {}", report.job_id, report.status)?;
    for outcome in &report.outcomes {
        let path = outcome.file_path.as_deref().unwrap_or("");
        match outcome.state {
            ComponentState::Failed => writeln!(
                out,
                "  {:<8} {}:{} {}{}",
                "Failed",
                outcome.component_type,
                outcome.full_name,
                outcome.error.as_deref().unwrap_or(""),
                outcome
                    .line_number
                    .map(|l| format!(" (line {})", l))
                    .unwrap_or_default()
            )?,
            state => writeln!(
                out,
                "  {:<8} {}:{} {}",
                format!("{:?}", state),
                outcome.component_type,
                outcome.full_name,
                path
            )?,
        }
    }
    if let Some(zip) = &report.zip_path {
        writeln!(out, "Wrote {}", zip.display())?;
    }
    if let Some(deploy) = &report.deploy {
        if let Some(message) = &deploy.error_message {
            writeln!(out, "{}", message)?;
        }
    }
    Ok(())
}

/// Prints polling progress to stderr unless quiet.
#[derive(Debug, Default)]
pub struct ProgressReporter {
    quiet: bool,
    id_displayed: bool,
}

impl ProgressReporter {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            id_displayed: false,
        }
    }

    fn show_id(&mut self, status: &JobResult) {
        if !self.id_displayed {
            self.id_displayed = true;
            eprintln!("Job ID: {}", status.id());
        }
    }
}

impl PollObserver for ProgressReporter {
    fn on_update(&mut self, status: &JobResult) -> Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.show_id(status);
        match status {
            JobResult::Deploy(d) if d.number_components_total > 0 => eprintln!(
                "Status: {} ({}/{} components)",
                d.status, d.number_components_deployed, d.number_components_total
            ),
            other => eprintln!("Status: {}", other.status()),
        }
        Ok(())
    }

    fn on_finish(&mut self, status: &JobResult) -> Result<()> {
        if !self.quiet {
            self.show_id(status);
            eprintln!("Finished: {}", status.status());
        }
        Ok(())
    }

    fn on_cancel(&mut self) {
        if !self.quiet {
            eprintln!("Cancel requested.");
        }
    }

    fn on_error(&mut self, error: &Error) {
        if !self.quiet {
            eprintln!("Error: {}", error);
        }
    }
}
