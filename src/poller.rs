//! Job status poller.
//!
//! Polls the remote status endpoint on a fixed cadence until the job reaches
//! a terminal state, the tracked job changes, or the owner cancels. Progress
//! is published on a `watch` channel: a raw estimate from the stage markers
//! and a smoothed display value that creeps toward it on a short timer.

use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::api::FontApi;
use crate::config::ProgressConfig;
use crate::error::TypeforgeError;
use crate::scheduler::Ticker;
use crate::state_machine::{
    Job, JobSnapshot, JobState, JobTracker, ProgressEstimator, ProgressSmoother,
};

/// What observers see after every poll and every smoothing tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub job_id: String,
    pub state: JobState,
    pub raw: u8,
    pub displayed: u8,
    pub message: Option<String>,
}

impl ProgressSnapshot {
    fn initial(job_id: &str, start: u8) -> Self {
        Self {
            job_id: job_id.to_string(),
            state: JobState::Created,
            raw: start,
            displayed: start,
            message: None,
        }
    }
}

/// How a polling run ended without error.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    Completed(Job),
    Failed(Job),
    /// The owner cancelled the run.
    Cancelled,
    /// Another job became current while polling.
    Superseded,
}

pub struct JobPoller<'a, A: FontApi> {
    api: &'a A,
    tracker: JobTracker,
    interval: Duration,
    progress_config: ProgressConfig,
    progress: watch::Sender<ProgressSnapshot>,
}

impl<'a, A: FontApi> JobPoller<'a, A> {
    pub fn new(
        api: &'a A,
        tracker: JobTracker,
        interval: Duration,
        progress_config: ProgressConfig,
    ) -> Self {
        let start = progress_config.initial;
        let (progress, _rx) = watch::channel(ProgressSnapshot::initial("", start));
        Self {
            api,
            tracker,
            interval,
            progress_config,
            progress,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress.subscribe()
    }

    /// Poll `job_id` until it completes, fails, is superseded or `cancel`
    /// fires. The job must already be the tracker's current job.
    ///
    /// A remote rejection of the job id ends the run with
    /// [`TypeforgeError::Fatal`]; every other failure is retried next tick.
    pub async fn run(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome, TypeforgeError> {
        if !self.tracker.is_current(job_id) {
            return Ok(PollOutcome::Superseded);
        }

        let mut job = Job::new(job_id);
        let mut estimator = ProgressEstimator::new(self.progress_config.clone());
        let mut smoother =
            ProgressSmoother::new(estimator.raw(), self.progress_config.smoothing_step);
        let mut poll = Ticker::new(self.interval, cancel.clone());
        let mut smoothing = Ticker::delayed(self.progress_config.smoothing_interval(), cancel.clone());
        let mut job_changes = self.tracker.subscribe();

        self.progress
            .send_replace(ProgressSnapshot::initial(job_id, estimator.raw()));
        tracing::info!(job_id = %job_id, interval_ms = self.interval.as_millis() as u64, "polling job status");

        loop {
            tokio::select! {
                alive = poll.tick() => {
                    if !alive {
                        tracing::debug!(job_id = %job_id, "polling cancelled");
                        return Ok(PollOutcome::Cancelled);
                    }
                    if let Some(outcome) = self
                        .poll_once(&mut job, &mut estimator, &mut smoother, cancel)
                        .await?
                    {
                        return Ok(outcome);
                    }
                }
                alive = smoothing.tick() => {
                    if alive {
                        let displayed = smoother.tick(estimator.raw());
                        self.progress.send_if_modified(|p| {
                            let changed = p.displayed != displayed;
                            p.displayed = displayed;
                            changed
                        });
                    }
                }
                changed = job_changes.changed() => {
                    if changed.is_err() {
                        return Ok(PollOutcome::Cancelled);
                    }
                    if !self.tracker.is_current(job_id) {
                        tracing::debug!(job_id = %job_id, "job replaced, polling stopped");
                        return Ok(PollOutcome::Superseded);
                    }
                }
            }
        }
    }

    async fn poll_once(
        &self,
        job: &mut Job,
        estimator: &mut ProgressEstimator,
        smoother: &mut ProgressSmoother,
        cancel: &CancellationToken,
    ) -> Result<Option<PollOutcome>, TypeforgeError> {
        let result = self.api.job_status(&job.id).await;

        // The request is never aborted; a result for a job that is no longer
        // tracked is dropped here.
        if cancel.is_cancelled() {
            return Ok(Some(PollOutcome::Cancelled));
        }
        if !self.tracker.is_current(&job.id) {
            return Ok(Some(PollOutcome::Superseded));
        }

        let response = match result {
            Ok(response) => response,
            Err(err) if err.is_fatal() => {
                tracing::error!(job_id = %job.id, error = %err, "job rejected by server, polling stopped");
                return Err(err.into());
            }
            Err(err) => {
                tracing::warn!(job_id = %job.id, error = %err, "status poll failed, retrying next tick");
                return Ok(None);
            }
        };

        let snapshot = JobSnapshot::from(response);
        job.apply(&snapshot);
        let raw = estimator.observe(&snapshot);
        let displayed = if job.state == JobState::Completed {
            smoother.complete()
        } else {
            smoother.displayed()
        };

        self.progress.send_replace(ProgressSnapshot {
            job_id: job.id.clone(),
            state: job.state,
            raw,
            displayed,
            message: job.message.clone(),
        });

        match job.state {
            JobState::Completed => {
                tracing::info!(job_id = %job.id, "job completed");
                Ok(Some(PollOutcome::Completed(job.clone())))
            }
            JobState::Failed => {
                tracing::warn!(job_id = %job.id, message = ?job.message, "job failed");
                Ok(Some(PollOutcome::Failed(job.clone())))
            }
            state => {
                tracing::debug!(job_id = %job.id, %state, raw, "job in progress");
                Ok(None)
            }
        }
    }
}
