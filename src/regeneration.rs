//! Regeneration workflow: submit the selected characters, poll the job until
//! the partial re-generation ends, then refresh fonts and inventory.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::api::{FontApi, FontWeight};
use crate::assets::{AssetLoader, FontRegistry};
use crate::config::{ProgressConfig, TypeforgeConfig};
use crate::error::TypeforgeError;
use crate::inventory::{GlyphReconciler, ReconcileSource};
use crate::notify::Notifier;
use crate::scheduler::{Ticker, WallClockBudget, sleep_or_cancel};
use crate::state_machine::{
    JobState, JobTracker, RegenEvent, RegenState, StateMachine, SyntheticProgress, Transition,
};
use crate::store::MissingGlyphCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegenOutcome {
    Pending,
    Completed,
    Failed,
    TimedOut,
}

/// One regeneration round. Lives only for the duration of the workflow.
#[derive(Debug, Clone)]
pub struct RegenerationRequest {
    job_id: String,
    characters: Vec<char>,
    submitted_at: DateTime<Utc>,
    outcome: RegenOutcome,
}

impl RegenerationRequest {
    pub fn new(job_id: &str, characters: Vec<char>) -> Result<Self, TypeforgeError> {
        if job_id.trim().is_empty() {
            return Err(TypeforgeError::Validation("no job selected".into()));
        }
        if characters.is_empty() {
            return Err(TypeforgeError::Validation(
                "no characters selected for regeneration".into(),
            ));
        }
        Ok(Self {
            job_id: job_id.to_string(),
            characters,
            submitted_at: Utc::now(),
            outcome: RegenOutcome::Pending,
        })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn characters(&self) -> &[char] {
        &self.characters
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn outcome(&self) -> RegenOutcome {
        self.outcome
    }

    /// Record the terminal outcome. Only the first call has an effect.
    pub fn resolve(&mut self, outcome: RegenOutcome) -> bool {
        if self.outcome != RegenOutcome::Pending || outcome == RegenOutcome::Pending {
            return false;
        }
        self.outcome = outcome;
        true
    }
}

/// Result of a finished workflow. `Pending` means it was cancelled or the
/// job was replaced before an outcome was known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegenerationReport {
    pub job_id: String,
    pub characters: Vec<char>,
    pub outcome: RegenOutcome,
    pub elapsed: Duration,
}

impl RegenerationReport {
    /// Turn non-success outcomes into errors for callers that want `?`.
    pub fn into_result(self) -> Result<Self, TypeforgeError> {
        match self.outcome {
            RegenOutcome::Completed | RegenOutcome::Pending => Ok(self),
            RegenOutcome::TimedOut => Err(TypeforgeError::WorkflowTimeout {
                elapsed_secs: self.elapsed.as_secs(),
            }),
            RegenOutcome::Failed => Err(TypeforgeError::RegenerationFailed(self.job_id)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegenerationSettings {
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub settle_delay: Duration,
    pub primary_weight: FontWeight,
    pub progress: ProgressConfig,
}

impl From<&TypeforgeConfig> for RegenerationSettings {
    fn from(config: &TypeforgeConfig) -> Self {
        Self {
            poll_interval: config.regen_poll_interval(),
            timeout: config.regen_timeout(),
            settle_delay: config.settle_delay(),
            primary_weight: config.primary_weight,
            progress: config.progress.clone(),
        }
    }
}

impl Default for RegenerationSettings {
    fn default() -> Self {
        Self::from(&TypeforgeConfig::default())
    }
}

enum PollEnd {
    Terminal(RegenOutcome),
    Abandoned,
}

pub struct RegenerationCoordinator {
    machine: StateMachine,
    settings: RegenerationSettings,
    tracker: JobTracker,
    notifier: Notifier,
    progress: watch::Sender<u8>,
}

impl RegenerationCoordinator {
    pub fn new(settings: RegenerationSettings, tracker: JobTracker, notifier: Notifier) -> Self {
        let (progress, _rx) = watch::channel(0);
        Self {
            machine: StateMachine::new(),
            settings,
            tracker,
            notifier,
            progress,
        }
    }

    pub fn state(&self) -> RegenState {
        self.machine.state()
    }

    pub fn settings(&self) -> &RegenerationSettings {
        &self.settings
    }

    /// Weight reloaded first after a completed round.
    pub fn set_primary_weight(&mut self, weight: FontWeight) {
        self.settings.primary_weight = weight;
    }

    /// Regeneration progress, 0 when idle. Independent of the job poller.
    pub fn subscribe_progress(&self) -> watch::Receiver<u8> {
        self.progress.subscribe()
    }

    fn advance(&mut self, event: RegenEvent) -> Result<(), TypeforgeError> {
        let from = self.machine.state();
        match self.machine.next(event) {
            Transition::Next(to) => {
                tracing::debug!(%from, %to, ?event, "regeneration transition");
                Ok(())
            }
            Transition::Rejected { reason, .. } => Err(TypeforgeError::Validation(reason.into())),
        }
    }

    /// Run one regeneration round for the characters currently selected in
    /// `inventory`.
    ///
    /// Empty selections are rejected before any network call. Submission
    /// errors notify the user and return the error. Once submitted, the
    /// round always ends back in `Idle`.
    pub async fn run<A, C, R>(
        &mut self,
        api: &A,
        job_id: &str,
        inventory: &GlyphReconciler<C>,
        loader: &AssetLoader<R>,
        cancel: &CancellationToken,
    ) -> Result<RegenerationReport, TypeforgeError>
    where
        A: FontApi,
        C: MissingGlyphCache,
        R: FontRegistry,
    {
        let mut request = match RegenerationRequest::new(job_id, inventory.selected_characters()) {
            Ok(request) => request,
            Err(err) => {
                self.notifier.error("Nothing to regenerate", err.to_string());
                return Err(err);
            }
        };
        let count = request.characters().len();
        self.advance(RegenEvent::Submit { selected: count })?;

        match api.submit_regeneration(job_id, request.characters()).await {
            Ok(response) => {
                self.advance(RegenEvent::Accepted)?;
                let body = response
                    .message
                    .unwrap_or_else(|| format!("Regenerating {count} characters..."));
                self.notifier.info("Regeneration started", body);
                tracing::info!(job_id = %job_id, characters = count, "regeneration submitted");
            }
            Err(err) => {
                self.advance(RegenEvent::SubmitFailed)?;
                self.notifier.error("Regeneration failed", err.to_string());
                return Err(err.into());
            }
        }

        let budget = WallClockBudget::start(self.settings.timeout);
        let end = self.poll_until_terminal(api, job_id, &budget, cancel).await;

        let outcome = match end {
            PollEnd::Abandoned => {
                self.advance(RegenEvent::Abandoned)?;
                self.progress.send_replace(0);
                tracing::info!(job_id = %job_id, "regeneration abandoned");
                return Ok(RegenerationReport {
                    job_id: request.job_id().to_string(),
                    characters: request.characters().to_vec(),
                    outcome: request.outcome(),
                    elapsed: budget.elapsed(),
                });
            }
            PollEnd::Terminal(outcome) => outcome,
        };
        request.resolve(outcome);

        match outcome {
            RegenOutcome::Completed => {
                self.advance(RegenEvent::PollCompleted)?;
                self.progress.send_replace(100);
                match self
                    .apply_completion(api, job_id, inventory, loader, cancel)
                    .await
                {
                    Ok(()) => self.notifier.success(
                        "Regeneration complete",
                        format!("{count} characters regenerated"),
                    ),
                    Err(err) => self.notifier.warning("Regeneration issue", err.to_string()),
                }
            }
            RegenOutcome::TimedOut => {
                self.advance(RegenEvent::BudgetExhausted)?;
                self.notifier.error(
                    "Regeneration timed out",
                    format!(
                        "No result after {}s. Please try again.",
                        budget.elapsed().as_secs()
                    ),
                );
            }
            RegenOutcome::Failed | RegenOutcome::Pending => {
                self.advance(RegenEvent::PollFailed)?;
                self.notifier
                    .error("Regeneration failed", "The server could not regenerate the glyphs.");
            }
        }

        self.advance(RegenEvent::Finished)?;
        self.progress.send_replace(0);
        Ok(RegenerationReport {
            job_id: request.job_id().to_string(),
            characters: request.characters().to_vec(),
            outcome: request.outcome(),
            elapsed: budget.elapsed(),
        })
    }

    async fn poll_until_terminal<A: FontApi>(
        &self,
        api: &A,
        job_id: &str,
        budget: &WallClockBudget,
        cancel: &CancellationToken,
    ) -> PollEnd {
        let mut ticker = Ticker::new(self.settings.poll_interval, cancel.clone());
        let mut progress = SyntheticProgress::new(&self.settings.progress);
        self.progress.send_replace(progress.value());

        loop {
            if !ticker.tick().await {
                return PollEnd::Abandoned;
            }
            if budget.exhausted() {
                tracing::warn!(job_id = %job_id, elapsed_s = budget.elapsed().as_secs(), "regeneration timed out");
                return PollEnd::Terminal(RegenOutcome::TimedOut);
            }

            let result = api.job_status(job_id).await;
            if cancel.is_cancelled() || !self.tracker.is_current(job_id) {
                return PollEnd::Abandoned;
            }

            match result {
                Ok(status) => match JobState::from_remote(&status.status) {
                    JobState::Completed => return PollEnd::Terminal(RegenOutcome::Completed),
                    JobState::Failed => return PollEnd::Terminal(RegenOutcome::Failed),
                    state => tracing::debug!(job_id = %job_id, %state, "regeneration in progress"),
                },
                Err(err) if err.is_fatal() => {
                    tracing::error!(job_id = %job_id, error = %err, "job rejected during regeneration");
                    return PollEnd::Terminal(RegenOutcome::Failed);
                }
                Err(err) => {
                    tracing::warn!(job_id = %job_id, error = %err, "regeneration poll failed, retrying");
                }
            }
            self.progress.send_replace(progress.tick());
        }
    }

    /// Post-completion sequence: fresh fonts, baseline inventory, then a
    /// remote reconciliation once the server has settled.
    async fn apply_completion<A, C, R>(
        &self,
        api: &A,
        job_id: &str,
        inventory: &GlyphReconciler<C>,
        loader: &AssetLoader<R>,
        cancel: &CancellationToken,
    ) -> Result<(), TypeforgeError>
    where
        A: FontApi,
        C: MissingGlyphCache,
        R: FontRegistry,
    {
        // A failed eviction must not stop the reload: the remote fetch below
        // overwrites the cached set anyway.
        let evicted = inventory.invalidate(job_id);
        if let Err(err) = &evicted {
            tracing::warn!(job_id = %job_id, error = %err, "could not evict cached missing glyphs");
        }
        loader.reload();
        inventory.reset_to_baseline();

        let (report, source) = tokio::join!(
            loader.load_all(api, self.settings.primary_weight),
            async {
                if sleep_or_cancel(self.settings.settle_delay, cancel).await {
                    Some(inventory.refresh(api, job_id).await)
                } else {
                    None
                }
            }
        );

        if let Some(source) = source
            && source != ReconcileSource::Remote
        {
            tracing::warn!(job_id = %job_id, ?source, "inventory not refreshed from server after regeneration");
        }
        tracing::info!(
            job_id = %job_id,
            weights = report.results.len(),
            primary_loaded = report.primary_loaded(),
            "regeneration applied"
        );
        evicted.map_err(TypeforgeError::from)
    }
}
