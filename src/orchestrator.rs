use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::api::{FontApi, FontWeight, JobSource};
use crate::assets::{AssetLoader, FontHandle, LoadPriority, LoadReport, MemoryRegistry};
use crate::config::TypeforgeConfig;
use crate::error::TypeforgeError;
use crate::inventory::{GlyphReconciler, Inventory, ReconcileSource};
use crate::notify::Notifier;
use crate::poller::{JobPoller, PollOutcome};
use crate::regeneration::{RegenerationCoordinator, RegenerationReport, RegenerationSettings};
use crate::state_machine::JobTracker;
use crate::store::LocalStore;

/// Outcome of the external checkout flow, as reported by its redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutOutcome {
    Success,
    Cancel,
}

impl FromStr for CheckoutOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "success" => Ok(CheckoutOutcome::Success),
            "cancel" => Ok(CheckoutOutcome::Cancel),
            other => Err(format!("invalid checkout outcome '{other}': use success or cancel")),
        }
    }
}

impl fmt::Display for CheckoutOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckoutOutcome::Success => write!(f, "success"),
            CheckoutOutcome::Cancel => write!(f, "cancel"),
        }
    }
}

/// Result of opening a finished job: which weights loaded and where the
/// inventory came from.
#[derive(Debug, Clone)]
pub struct OpenedJob {
    pub job_id: String,
    pub fonts: LoadReport,
    pub inventory_source: ReconcileSource,
}

/// Drives the poller, inventory, loader and regeneration workflow for a
/// single active job.
pub struct Orchestrator<A: FontApi> {
    api: A,
    config: TypeforgeConfig,
    store: Arc<LocalStore>,
    tracker: JobTracker,
    notifier: Notifier,
    inventory: GlyphReconciler<Arc<LocalStore>>,
    loader: AssetLoader<MemoryRegistry>,
    regeneration: RegenerationCoordinator,
    weight: FontWeight,
}

impl<A: FontApi> Orchestrator<A> {
    pub fn new(api: A, config: TypeforgeConfig, store: Arc<LocalStore>, notifier: Notifier) -> Self {
        let tracker = JobTracker::new();
        let inventory = GlyphReconciler::new(config.alphabet(), Arc::clone(&store));
        let loader = AssetLoader::new(
            MemoryRegistry::default(),
            config.font_format,
            config.primary_retry(),
            notifier.clone(),
        );
        let regeneration = RegenerationCoordinator::new(
            RegenerationSettings::from(&config),
            tracker.clone(),
            notifier.clone(),
        );
        let weight = config.primary_weight;
        Self {
            api,
            config,
            store,
            tracker,
            notifier,
            inventory,
            loader,
            regeneration,
            weight,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn config(&self) -> &TypeforgeConfig {
        &self.config
    }

    pub fn loader(&self) -> &AssetLoader<MemoryRegistry> {
        &self.loader
    }

    pub fn regeneration(&self) -> &RegenerationCoordinator {
        &self.regeneration
    }

    pub fn current_job(&self) -> Option<String> {
        self.tracker.current()
    }

    fn require_job(&self) -> Result<String, TypeforgeError> {
        self.tracker.current().ok_or(TypeforgeError::NoJob)
    }

    /// Make `job_id` the active job. Fonts and inventory of the previous job
    /// are dropped, and any loop still running for it stops at its next check.
    pub fn select_job(&mut self, job_id: &str) -> Result<(), TypeforgeError> {
        let job_id = job_id.trim();
        if job_id.is_empty() {
            return Err(TypeforgeError::Validation("job id must not be empty".into()));
        }
        if self.tracker.is_current(job_id) {
            return Ok(());
        }

        self.tracker.track(job_id);
        self.loader.set_job(Some(job_id));
        self.inventory.reset_to_baseline();
        if let Err(err) = self.store.set_last_job_id(Some(job_id)) {
            tracing::warn!(job_id = %job_id, error = %err, "could not persist last job");
        }
        tracing::info!(job_id = %job_id, "job selected");
        Ok(())
    }

    /// Re-select the job recorded by a previous session, if any.
    pub fn resume_last_job(&mut self) -> Result<Option<String>, TypeforgeError> {
        match self.store.last_job_id() {
            Some(job_id) => {
                self.select_job(&job_id)?;
                Ok(Some(job_id))
            }
            None => Ok(None),
        }
    }

    /// Submit a new generation job and make it the active one.
    pub async fn create_job(&mut self, source: JobSource) -> Result<String, TypeforgeError> {
        match &source {
            JobSource::Prompt(prompt) if prompt.trim().is_empty() => {
                return Err(TypeforgeError::Validation("prompt must not be empty".into()));
            }
            JobSource::Image { bytes, .. } if bytes.is_empty() => {
                return Err(TypeforgeError::Validation("image file is empty".into()));
            }
            _ => {}
        }

        let job_id = self.api.create_job(source).await?;
        self.select_job(&job_id)?;
        self.notifier
            .info("Generation started", format!("Job {job_id} submitted"));
        Ok(job_id)
    }

    /// A poller bound to this orchestrator's job tracker.
    pub fn poller(&self) -> JobPoller<'_, A> {
        JobPoller::new(
            &self.api,
            self.tracker.clone(),
            self.config.poll_interval(),
            self.config.progress.clone(),
        )
    }

    /// Poll the active job until it finishes.
    pub async fn watch_job(&self, cancel: &CancellationToken) -> Result<PollOutcome, TypeforgeError> {
        let job_id = self.require_job()?;
        self.poller().run(&job_id, cancel).await
    }

    /// Reconcile the inventory and load every weight of the active job.
    pub async fn open_job(&self) -> Result<OpenedJob, TypeforgeError> {
        let job_id = self.require_job()?;
        let inventory_source = self.inventory.refresh(&self.api, &job_id).await;
        let fonts = self.loader.load_all(&self.api, self.weight).await;
        Ok(OpenedJob {
            job_id,
            fonts,
            inventory_source,
        })
    }

    /// Reconcile the inventory of the active job without touching fonts.
    pub async fn refresh_inventory(&self) -> Result<ReconcileSource, TypeforgeError> {
        let job_id = self.require_job()?;
        Ok(self.inventory.refresh(&self.api, &job_id).await)
    }

    pub fn weight(&self) -> FontWeight {
        self.weight
    }

    /// Select the preview weight, loading it on demand. Returns the face to
    /// render with, which may be a neighbouring weight.
    pub async fn set_weight(&mut self, weight: FontWeight) -> FontHandle {
        self.weight = weight;
        self.regeneration.set_primary_weight(weight);
        self.loader
            .ensure_weight_loaded(&self.api, weight, LoadPriority::Primary)
            .await;
        self.loader.resolve_family(weight)
    }

    pub fn inventory(&self) -> Inventory {
        self.inventory.snapshot()
    }

    pub fn subscribe_inventory(&self) -> watch::Receiver<Inventory> {
        self.inventory.subscribe()
    }

    pub fn toggle_selected(&self, c: char) -> bool {
        self.inventory.toggle_selected(c)
    }

    pub fn toggle_flag(&self, c: char) -> bool {
        self.inventory.toggle_flag(c)
    }

    /// Regenerate the characters currently selected in the inventory.
    pub async fn regenerate(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<RegenerationReport, TypeforgeError> {
        let job_id = self.require_job()?;
        self.regeneration
            .run(&self.api, &job_id, &self.inventory, &self.loader, cancel)
            .await
    }

    /// Consume the checkout redirect. Only `success` grants the entitlement.
    pub fn record_checkout(
        &self,
        job_id: &str,
        outcome: CheckoutOutcome,
    ) -> Result<(), TypeforgeError> {
        match outcome {
            CheckoutOutcome::Success => {
                self.store.set_entitled(job_id, true)?;
                self.notifier
                    .success("Purchase complete", "Premium downloads unlocked");
            }
            CheckoutOutcome::Cancel => {
                self.notifier
                    .info("Checkout cancelled", "Your font is still available for preview");
            }
        }
        tracing::info!(job_id = %job_id, %outcome, "checkout recorded");
        Ok(())
    }

    pub fn is_entitled(&self, job_id: &str) -> bool {
        self.store.is_entitled(job_id)
    }

    /// Stop tracking the active job and release its fonts.
    pub fn close(&self) {
        self.tracker.clear();
        self.loader.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regeneration::RegenOutcome;
    use crate::test_support::ScriptedApi;
    use std::time::Duration;

    fn orchestrator(api: ScriptedApi) -> Orchestrator<ScriptedApi> {
        let config = TypeforgeConfig {
            regen_timeout_secs: 30,
            ..TypeforgeConfig::default()
        };
        Orchestrator::new(
            api,
            config,
            Arc::new(LocalStore::in_memory()),
            Notifier::silent(),
        )
    }

    #[test]
    fn checkout_outcome_parsing() {
        assert_eq!("success".parse::<CheckoutOutcome>(), Ok(CheckoutOutcome::Success));
        assert_eq!("CANCEL".parse::<CheckoutOutcome>(), Ok(CheckoutOutcome::Cancel));
        assert!("refund".parse::<CheckoutOutcome>().is_err());
    }

    #[tokio::test]
    async fn create_job_selects_and_persists_it() {
        let mut orch = orchestrator(ScriptedApi::new());
        let id = orch
            .create_job(JobSource::Prompt("a playful serif".into()))
            .await
            .unwrap();
        assert_eq!(id, "job-1");
        assert_eq!(orch.current_job().as_deref(), Some("job-1"));
        assert_eq!(orch.store.last_job_id().as_deref(), Some("job-1"));
        assert_eq!(orch.loader().job_id().as_deref(), Some("job-1"));
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_before_network() {
        let mut orch = orchestrator(ScriptedApi::new());
        let err = orch
            .create_job(JobSource::Prompt("   ".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, TypeforgeError::Validation(_)));
        assert!(orch.api().calls().is_empty());
    }

    #[tokio::test]
    async fn operations_without_job_fail() {
        let mut orch = orchestrator(ScriptedApi::new());
        assert!(matches!(orch.open_job().await, Err(TypeforgeError::NoJob)));
        assert!(matches!(
            orch.regenerate(&CancellationToken::new()).await,
            Err(TypeforgeError::NoJob)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn watch_then_open_job() {
        let api = ScriptedApi::new()
            .with_status(ScriptedApi::processing(&["base-image"]))
            .with_status(ScriptedApi::completed())
            .with_missing(&["Q", "7", "é"]);
        let mut orch = orchestrator(api);
        orch.select_job("job-1").unwrap();

        let outcome = orch.watch_job(&CancellationToken::new()).await.unwrap();
        assert!(matches!(outcome, PollOutcome::Completed(_)));

        let opened = orch.open_job().await.unwrap();
        assert_eq!(opened.inventory_source, ReconcileSource::Remote);
        assert!(opened.fonts.primary_loaded());
        assert_eq!(orch.loader().loaded_count(), 9);

        let inventory = orch.inventory();
        assert_eq!(inventory.len(), 72);
        assert_eq!(inventory.selected_characters(), vec!['Q', '7', 'é']);
    }

    #[tokio::test]
    async fn selecting_another_job_resets_fonts_and_inventory() {
        let api = ScriptedApi::new()
            .with_status(ScriptedApi::completed())
            .with_missing(&["Q"]);
        let mut orch = orchestrator(api);
        orch.select_job("job-1").unwrap();
        orch.open_job().await.unwrap();
        assert_eq!(orch.inventory().missing().len(), 1);

        orch.select_job("job-2").unwrap();
        assert_eq!(orch.loader().loaded_count(), 0);
        assert!(orch.inventory().missing().is_empty());
        assert!(orch.loader().with_registry(|r| r.is_empty()));
    }

    #[tokio::test]
    async fn set_weight_loads_on_demand() {
        let mut orch = orchestrator(ScriptedApi::new());
        orch.select_job("job-1").unwrap();
        let handle = orch.set_weight(FontWeight::BOLD).await;
        assert_eq!(handle.family(), "GeneratedFont-700");
        assert_eq!(orch.weight(), FontWeight::BOLD);
    }

    #[tokio::test(start_paused = true)]
    async fn regenerate_selected_characters() {
        let api = ScriptedApi::new()
            .with_status(ScriptedApi::completed())
            .with_missing(&["Q"]);
        let mut orch = orchestrator(api);
        orch.select_job("job-1").unwrap();
        orch.open_job().await.unwrap();
        assert!(orch.toggle_flag('g'));

        orch.api().set_statuses(vec![
            ScriptedApi::processing(&[]),
            ScriptedApi::completed(),
        ]);
        let report = orch.regenerate(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.outcome, RegenOutcome::Completed);
        assert_eq!(report.characters, vec!['Q', 'g']);
        assert!(report.elapsed >= Duration::from_secs(3));
        assert_eq!(orch.api().count("submit:job-1:Qg"), 1);
    }

    #[test]
    fn checkout_success_grants_entitlement() {
        let orch = orchestrator(ScriptedApi::new());
        orch.record_checkout("job-1", CheckoutOutcome::Cancel).unwrap();
        assert!(!orch.is_entitled("job-1"));
        orch.record_checkout("job-1", CheckoutOutcome::Success).unwrap();
        assert!(orch.is_entitled("job-1"));
        assert!(!orch.is_entitled("job-2"));
    }

    #[test]
    fn resume_last_job_from_store() {
        let store = Arc::new(LocalStore::in_memory());
        store.set_last_job_id(Some("job-9")).unwrap();
        let mut orch = Orchestrator::new(
            ScriptedApi::new(),
            TypeforgeConfig::default(),
            store,
            Notifier::silent(),
        );
        assert_eq!(orch.resume_last_job().unwrap().as_deref(), Some("job-9"));
        assert_eq!(orch.current_job().as_deref(), Some("job-9"));
    }

    #[test]
    fn close_clears_tracking() {
        let mut orch = orchestrator(ScriptedApi::new());
        orch.select_job("job-1").unwrap();
        orch.close();
        assert_eq!(orch.current_job(), None);
    }
}
