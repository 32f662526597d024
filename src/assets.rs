//! Multi-weight font loader.
//!
//! Nine weight slots (100..900) each hold a load state. The primary weight is
//! retried a bounded number of times; the others get one silent attempt.
//! Loaded faces are registered with a [`FontRegistry`] and can be torn down
//! and reloaded with a fresh cache-busting token.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::api::{FontApi, FontFormat, FontWeight};
use crate::error::TypeforgeError;
use crate::notify::Notifier;
use crate::state_machine::RetryConfig;

/// Family used when no weight is loaded.
pub const DEFAULT_FAMILY: &str = "GeneratedFont";

/// Value-type reference to a registered face.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FontHandle {
    family: String,
    weight: Option<FontWeight>,
}

impl FontHandle {
    pub fn for_weight(weight: FontWeight) -> Self {
        Self {
            family: format!("{DEFAULT_FAMILY}-{weight}"),
            weight: Some(weight),
        }
    }

    /// The designated default face.
    pub fn fallback() -> Self {
        Self {
            family: DEFAULT_FAMILY.to_string(),
            weight: None,
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn weight(&self) -> Option<FontWeight> {
        self.weight
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontSignature {
    Woff2,
    Woff,
    OpenType,
    TrueType,
}

/// Identify a font container by its magic bytes.
pub fn sniff_font(bytes: &[u8]) -> Option<FontSignature> {
    match bytes.get(..4)? {
        b"wOF2" => Some(FontSignature::Woff2),
        b"wOFF" => Some(FontSignature::Woff),
        b"OTTO" => Some(FontSignature::OpenType),
        [0x00, 0x01, 0x00, 0x00] | b"true" => Some(FontSignature::TrueType),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    NotRequested,
    Loading,
    Loaded(FontHandle),
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadResult {
    AlreadyLoaded,
    Loaded,
    /// Another call is already loading this weight.
    InFlight,
    /// A teardown or reload happened while loading; the bytes were dropped.
    Superseded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPriority {
    /// Retried, and a final failure is reported to the user.
    Primary,
    /// One attempt, failures only logged.
    Background,
}

/// Where loaded faces are made available to the renderer.
pub trait FontRegistry {
    fn register(&mut self, handle: &FontHandle, bytes: Vec<u8>);
    /// Returns whether the handle was registered.
    fn unregister(&mut self, handle: &FontHandle) -> bool;
}

/// Registry that keeps face bytes in memory, keyed by family.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    faces: BTreeMap<String, Vec<u8>>,
}

impl MemoryRegistry {
    pub fn contains(&self, family: &str) -> bool {
        self.faces.contains_key(family)
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

impl FontRegistry for MemoryRegistry {
    fn register(&mut self, handle: &FontHandle, bytes: Vec<u8>) {
        self.faces.insert(handle.family().to_string(), bytes);
    }

    fn unregister(&mut self, handle: &FontHandle) -> bool {
        self.faces.remove(handle.family()).is_some()
    }
}

/// Point-in-time copy of the loader state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderSnapshot {
    pub job_id: Option<String>,
    pub cache_token: String,
    pub slots: [LoadState; 9],
}

impl LoaderSnapshot {
    pub fn state(&self, weight: FontWeight) -> &LoadState {
        &self.slots[weight.index()]
    }

    pub fn loaded_weights(&self) -> Vec<FontWeight> {
        FontWeight::ALL
            .into_iter()
            .filter(|w| matches!(self.slots[w.index()], LoadState::Loaded(_)))
            .collect()
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded_weights().len()
    }
}

/// Outcome of [`AssetLoader::load_all`], primary weight first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub primary: FontWeight,
    pub results: Vec<(FontWeight, LoadResult)>,
}

impl LoadReport {
    pub fn result(&self, weight: FontWeight) -> Option<LoadResult> {
        self.results
            .iter()
            .find(|(w, _)| *w == weight)
            .map(|(_, r)| *r)
    }

    pub fn primary_loaded(&self) -> bool {
        matches!(
            self.result(self.primary),
            Some(LoadResult::Loaded | LoadResult::AlreadyLoaded)
        )
    }
}

struct LoaderInner<R> {
    registry: R,
    slots: [LoadState; 9],
    registered: Vec<FontHandle>,
    generation: u64,
    cache_token: String,
    job_id: Option<String>,
}

pub struct AssetLoader<R: FontRegistry> {
    inner: Mutex<LoaderInner<R>>,
    format: FontFormat,
    retry: RetryConfig,
    notifier: Notifier,
}

fn new_cache_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl<R: FontRegistry> AssetLoader<R> {
    pub fn new(registry: R, format: FontFormat, retry: RetryConfig, notifier: Notifier) -> Self {
        Self {
            inner: Mutex::new(LoaderInner {
                registry,
                slots: Default::default(),
                registered: Vec::new(),
                generation: 0,
                cache_token: new_cache_token(),
                job_id: None,
            }),
            format,
            retry,
            notifier,
        }
    }

    pub fn format(&self) -> FontFormat {
        self.format
    }

    fn lock(&self) -> MutexGuard<'_, LoaderInner<R>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Switch to another job. Everything loaded for the previous job is
    /// torn down first.
    pub fn set_job(&self, job_id: Option<&str>) {
        self.teardown();
        let mut inner = self.lock();
        inner.job_id = job_id.map(str::to_string);
        inner.cache_token = new_cache_token();
    }

    pub fn job_id(&self) -> Option<String> {
        self.lock().job_id.clone()
    }

    pub fn cache_token(&self) -> String {
        self.lock().cache_token.clone()
    }

    pub fn snapshot(&self) -> LoaderSnapshot {
        let inner = self.lock();
        LoaderSnapshot {
            job_id: inner.job_id.clone(),
            cache_token: inner.cache_token.clone(),
            slots: inner.slots.clone(),
        }
    }

    pub fn loaded_count(&self) -> usize {
        self.lock()
            .slots
            .iter()
            .filter(|s| matches!(s, LoadState::Loaded(_)))
            .count()
    }

    pub fn with_registry<T>(&self, f: impl FnOnce(&R) -> T) -> T {
        f(&self.lock().registry)
    }

    /// Load one weight unless it is loaded or already loading.
    pub async fn ensure_weight_loaded<A: FontApi>(
        &self,
        api: &A,
        weight: FontWeight,
        priority: LoadPriority,
    ) -> LoadResult {
        let (job_id, token, generation) = {
            let mut inner = self.lock();
            match inner.slots[weight.index()] {
                LoadState::Loaded(_) => return LoadResult::AlreadyLoaded,
                LoadState::Loading => return LoadResult::InFlight,
                LoadState::NotRequested | LoadState::Failed => {}
            }
            let Some(job_id) = inner.job_id.clone() else {
                tracing::debug!(weight = %weight, "no job selected, skipping font load");
                return LoadResult::Failed;
            };
            inner.slots[weight.index()] = LoadState::Loading;
            (job_id, inner.cache_token.clone(), inner.generation)
        };

        let attempts = match priority {
            LoadPriority::Primary => self.retry.attempts(),
            LoadPriority::Background => 1,
        };

        let mut last_error = None;
        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.retry.delay()).await;
                if self.lock().generation != generation {
                    tracing::debug!(weight = %weight, "loader reset during retry backoff");
                    return LoadResult::Superseded;
                }
            }
            match self.fetch(api, &job_id, weight, &token).await {
                Ok(bytes) => return self.finish(weight, generation, Some(bytes)),
                Err(err) => {
                    tracing::debug!(job_id = %job_id, weight = %weight, attempt, error = %err, "font load attempt failed");
                    last_error = Some(err);
                }
            }
        }

        let result = self.finish(weight, generation, None);
        if result == LoadResult::Failed {
            let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
            match priority {
                LoadPriority::Primary => {
                    tracing::warn!(job_id = %job_id, weight = %weight, attempts, "primary weight failed to load");
                    self.notifier.warning(
                        "Font loading issue",
                        format!("Weight {weight} could not be loaded after {attempts} attempts: {reason}"),
                    );
                }
                LoadPriority::Background => {
                    tracing::debug!(job_id = %job_id, weight = %weight, reason = %reason, "weight not available");
                }
            }
        }
        result
    }

    async fn fetch<A: FontApi>(
        &self,
        api: &A,
        job_id: &str,
        weight: FontWeight,
        token: &str,
    ) -> Result<Vec<u8>, TypeforgeError> {
        let bytes = api.download_font(job_id, weight, self.format, token).await?;
        if sniff_font(&bytes).is_none() {
            return Err(TypeforgeError::AssetLoad {
                weight,
                reason: "response is not a font file".into(),
            });
        }
        Ok(bytes)
    }

    fn finish(&self, weight: FontWeight, generation: u64, bytes: Option<Vec<u8>>) -> LoadResult {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.generation != generation {
            tracing::debug!(weight = %weight, "discarding font loaded before reset");
            return LoadResult::Superseded;
        }
        match bytes {
            Some(bytes) => {
                let handle = FontHandle::for_weight(weight);
                inner.registry.register(&handle, bytes);
                inner.registered.push(handle.clone());
                inner.slots[weight.index()] = LoadState::Loaded(handle);
                tracing::debug!(weight = %weight, "font weight loaded");
                LoadResult::Loaded
            }
            None => {
                inner.slots[weight.index()] = LoadState::Failed;
                LoadResult::Failed
            }
        }
    }

    /// Primary weight first, then every other weight in ascending order.
    pub async fn load_all<A: FontApi>(&self, api: &A, primary: FontWeight) -> LoadReport {
        let mut results = Vec::with_capacity(FontWeight::ALL.len());
        let first = self
            .ensure_weight_loaded(api, primary, LoadPriority::Primary)
            .await;
        results.push((primary, first));

        if first != LoadResult::Superseded {
            for weight in FontWeight::ALL.into_iter().filter(|w| *w != primary) {
                let result = self
                    .ensure_weight_loaded(api, weight, LoadPriority::Background)
                    .await;
                results.push((weight, result));
                if result == LoadResult::Superseded {
                    break;
                }
            }
        }

        let report = LoadReport { primary, results };
        tracing::info!(loaded = self.loaded_count(), total = FontWeight::ALL.len(), "font weights loaded");
        report
    }

    /// Exact weight if loaded, else the nearest loaded one (ties go to the
    /// lighter weight), else the default family.
    pub fn resolve_family(&self, target: FontWeight) -> FontHandle {
        let inner = self.lock();
        if let LoadState::Loaded(handle) = &inner.slots[target.index()] {
            return handle.clone();
        }
        FontWeight::ALL
            .iter()
            .filter_map(|w| match &inner.slots[w.index()] {
                LoadState::Loaded(handle) => Some((w.distance(target), handle)),
                _ => None,
            })
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, handle)| handle.clone())
            .unwrap_or_else(FontHandle::fallback)
    }

    /// Unregister every face this loader registered and reset all slots.
    /// Safe to call any number of times.
    pub fn teardown(&self) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        for handle in inner.registered.drain(..) {
            inner.registry.unregister(&handle);
        }
        inner.slots = Default::default();
        inner.generation += 1;
    }

    /// Teardown plus a fresh cache-busting token. Returns the new token.
    pub fn reload(&self) -> String {
        self.teardown();
        let token = new_cache_token();
        self.lock().cache_token = token.clone();
        tracing::debug!(token = %token, "font loader reset");
        token
    }
}

impl<R: FontRegistry> Drop for AssetLoader<R> {
    fn drop(&mut self) {
        self.teardown();
    }
}
