//! Polling a job to completion.
//!
//! The poller is the only loop in a command: it checks status, sleeps
//! without blocking, and stops on a terminal payload or when the local
//! timeout elapses. A timeout never cancels the remote job.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::job::{JobHandle, JobResult};

/// Default interval between status checks.
pub const DEFAULT_FREQUENCY: Duration = Duration::from_secs(1);

/// Default local wait before giving up on a job.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(33 * 60);

/// Interval and timeout for a synchronous wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub frequency: Duration,
    pub timeout: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            frequency: DEFAULT_FREQUENCY,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PollOptions {
    pub fn with_frequency(mut self, frequency: Duration) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// How long a command waits for its job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Check status once and return.
    Async,
    /// Poll until terminal or until the duration elapses.
    Sync(Duration),
}

impl Default for Wait {
    fn default() -> Self {
        Wait::Sync(DEFAULT_TIMEOUT)
    }
}

impl Wait {
    /// Interpret a `--wait <minutes>` value: 0 is async, negative is the default.
    pub fn from_minutes(minutes: i64) -> Self {
        match minutes {
            0 => Wait::Async,
            m if m < 0 => Wait::default(),
            m => Wait::Sync(Duration::from_secs((m as u64).saturating_mul(60))),
        }
    }
}

/// How polling ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The job reached a terminal status.
    Complete(JobResult),
    /// The local wait ran out; carries the last status seen.
    TimedOut(JobResult),
}

impl PollOutcome {
    pub fn result(&self) -> &JobResult {
        match self {
            PollOutcome::Complete(r) | PollOutcome::TimedOut(r) => r,
        }
    }

    pub fn into_result(self) -> JobResult {
        match self {
            PollOutcome::Complete(r) | PollOutcome::TimedOut(r) => r,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, PollOutcome::TimedOut(_))
    }
}

/// Progress side channel.
///
/// Returning an error from `on_update` or `on_finish` aborts the poll.
pub trait PollObserver: Send {
    fn on_update(&mut self, _status: &JobResult) -> Result<()> {
        Ok(())
    }

    fn on_finish(&mut self, _status: &JobResult) -> Result<()> {
        Ok(())
    }

    fn on_cancel(&mut self) {}

    fn on_error(&mut self, _error: &Error) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl PollObserver for NoopObserver {}

/// Drives job handles to a terminal payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct Poller {
    options: PollOptions,
}

impl Poller {
    pub fn new(options: PollOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> PollOptions {
        self.options
    }

    /// Poll with the configured timeout.
    pub async fn poll(
        &self,
        job: &dyn JobHandle,
        observer: &mut dyn PollObserver,
    ) -> Result<PollOutcome> {
        let start = Instant::now();
        let PollOptions { frequency, timeout } = self.options;

        loop {
            let status = self.check(job, observer).await?;
            if status.is_done() {
                observer.on_finish(&status)?;
                return Ok(PollOutcome::Complete(status));
            }
            observer.on_update(&status)?;

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                info!(job_id = job.id(), status = %status.status(), "Timed out waiting for job");
                return Ok(PollOutcome::TimedOut(status));
            }
            sleep(frequency.min(timeout - elapsed)).await;
        }
    }

    /// Check status exactly once.
    pub async fn check_once(
        &self,
        job: &dyn JobHandle,
        observer: &mut dyn PollObserver,
    ) -> Result<PollOutcome> {
        let status = self.check(job, observer).await?;
        if status.is_done() {
            observer.on_finish(&status)?;
            Ok(PollOutcome::Complete(status))
        } else {
            observer.on_update(&status)?;
            Ok(PollOutcome::TimedOut(status))
        }
    }

    /// Wait according to `wait`.
    pub async fn run(
        &self,
        job: &dyn JobHandle,
        wait: Wait,
        observer: &mut dyn PollObserver,
    ) -> Result<PollOutcome> {
        match wait {
            Wait::Async => self.check_once(job, observer).await,
            Wait::Sync(timeout) => {
                Poller::new(self.options.with_timeout(timeout))
                    .poll(job, observer)
                    .await
            }
        }
    }

    /// Like [`Poller::run`], but when `interrupt` resolves first the job is
    /// asked to cancel and polling continues until a terminal status.
    pub async fn poll_until_cancelled<F>(
        &self,
        job: &dyn JobHandle,
        wait: Wait,
        observer: &mut dyn PollObserver,
        interrupt: F,
    ) -> Result<PollOutcome>
    where
        F: Future<Output = ()>,
    {
        if wait == Wait::Async {
            return self.check_once(job, observer).await;
        }

        {
            let polling = self.run(job, wait, observer);
            tokio::select! {
                outcome = polling => return outcome,
                _ = interrupt => {}
            }
        }

        info!(job_id = job.id(), "Interrupted, requesting cancel");
        observer.on_cancel();
        if let Err(e) = job.cancel().await {
            observer.on_error(&e);
            return Err(e);
        }
        self.run(job, wait, observer).await
    }

    async fn check(
        &self,
        job: &dyn JobHandle,
        observer: &mut dyn PollObserver,
    ) -> Result<JobResult> {
        match job.check_status().await {
            Ok(status) => {
                debug!(job_id = job.id(), status = %status.status(), "Status checked");
                Ok(status)
            }
            Err(e) => {
                observer.on_error(&e);
                Err(e)
            }
        }
    }
}
