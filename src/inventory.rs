//! Glyph inventory: which characters of the base alphabet the generated font
//! covers, which ones the user flagged as badly drawn, and which ones are
//! selected for regeneration.
//!
//! [`reconcile`] is a pure function of the alphabet and the server's
//! missing-glyph set. [`GlyphReconciler`] adds the remote fetch, the cache
//! fallback and user toggles, and publishes every change as a snapshot.

use std::collections::BTreeSet;

use serde::Serialize;
use tokio::sync::watch;

use crate::api::{ApiError, FontApi};
use crate::store::{MissingGlyphCache, StoreError};

/// Default base alphabet: A–Z, a–z, 0–9 and common punctuation.
pub const DEFAULT_ALPHABET: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789.,!?@#$%&";

/// Ordered, duplicate-free set of characters the font is expected to cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    chars: Vec<char>,
}

impl Alphabet {
    /// Keeps the first occurrence of each character.
    pub fn new(chars: impl IntoIterator<Item = char>) -> Self {
        let mut seen = BTreeSet::new();
        let chars = chars.into_iter().filter(|c| seen.insert(*c)).collect();
        Self { chars }
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn contains(&self, c: char) -> bool {
        self.chars.contains(&c)
    }
}

impl Default for Alphabet {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHABET.chars())
    }
}

/// Canonical code-point id: upper-case hex, at least four digits.
pub fn code_point_id(c: char) -> String {
    format!("{:04X}", u32::from(c))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlyphRecord {
    pub character: char,
    pub code_point: String,
    pub is_available: bool,
    pub flagged: bool,
    pub selected: bool,
}

impl GlyphRecord {
    fn available(character: char) -> Self {
        Self {
            character,
            code_point: code_point_id(character),
            is_available: true,
            flagged: false,
            selected: false,
        }
    }

    fn missing(character: char) -> Self {
        Self {
            character,
            code_point: code_point_id(character),
            is_available: false,
            flagged: false,
            selected: true,
        }
    }
}

/// Immutable view of the glyph records, in alphabet order followed by
/// extra missing characters in code-point order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Inventory {
    records: Vec<GlyphRecord>,
}

impl Inventory {
    /// Every base character available, nothing flagged or selected.
    pub fn baseline(alphabet: &Alphabet) -> Self {
        reconcile(alphabet, &BTreeSet::new())
    }

    pub fn records(&self) -> &[GlyphRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, c: char) -> Option<&GlyphRecord> {
        self.records.iter().find(|r| r.character == c)
    }

    pub fn missing(&self) -> Vec<&GlyphRecord> {
        self.records.iter().filter(|r| !r.is_available).collect()
    }

    pub fn flagged(&self) -> Vec<&GlyphRecord> {
        self.records
            .iter()
            .filter(|r| r.flagged && r.is_available)
            .collect()
    }

    /// Available and not flagged.
    pub fn regular(&self) -> Vec<&GlyphRecord> {
        self.records
            .iter()
            .filter(|r| r.is_available && !r.flagged)
            .collect()
    }

    /// Missing or flagged.
    pub fn to_regenerate(&self) -> Vec<&GlyphRecord> {
        self.records
            .iter()
            .filter(|r| !r.is_available || r.flagged)
            .collect()
    }

    pub fn selected_count(&self) -> usize {
        self.records.iter().filter(|r| r.selected).count()
    }

    pub fn selected_characters(&self) -> Vec<char> {
        self.records
            .iter()
            .filter(|r| r.selected)
            .map(|r| r.character)
            .collect()
    }

    /// Distinct characters of `text` that are missing or flagged, in order
    /// of first appearance.
    pub fn problem_characters_in(&self, text: &str) -> Vec<char> {
        let mut seen = BTreeSet::new();
        text.chars()
            .filter(|c| seen.insert(*c))
            .filter(|c| {
                self.get(*c)
                    .is_some_and(|r| !r.is_available || r.flagged)
            })
            .collect()
    }

    /// Flips `selected` on one record. Returns `false` for unknown characters.
    pub fn toggle_selected(&mut self, c: char) -> bool {
        match self.records.iter_mut().find(|r| r.character == c) {
            Some(record) => {
                record.selected = !record.selected;
                true
            }
            None => false,
        }
    }

    /// Flips `flagged` on an available record and mirrors it into
    /// `selected`. Unavailable or unknown characters are left alone.
    pub fn toggle_flag(&mut self, c: char) -> bool {
        match self
            .records
            .iter_mut()
            .find(|r| r.character == c && r.is_available)
        {
            Some(record) => {
                record.flagged = !record.flagged;
                record.selected = record.flagged;
                true
            }
            None => false,
        }
    }
}

/// Build the inventory for `alphabet` given the server's missing set.
///
/// Total and idempotent: the same inputs always give the same records, and
/// no character appears twice.
pub fn reconcile(alphabet: &Alphabet, missing: &BTreeSet<char>) -> Inventory {
    let mut records: Vec<GlyphRecord> = alphabet
        .chars()
        .iter()
        .map(|&c| {
            if missing.contains(&c) {
                GlyphRecord::missing(c)
            } else {
                GlyphRecord::available(c)
            }
        })
        .collect();

    // BTreeSet iterates in code-point order.
    records.extend(
        missing
            .iter()
            .filter(|c| !alphabet.contains(**c))
            .map(|&c| GlyphRecord::missing(c)),
    );

    Inventory { records }
}

/// Turn the server's list of strings into a character set. Each entry is
/// expected to be a single character; longer entries contribute every char.
pub fn parse_missing(raw: &[String]) -> BTreeSet<char> {
    let mut missing = BTreeSet::new();
    for entry in raw {
        let mut chars = entry.chars();
        match (chars.next(), chars.next()) {
            (None, _) => {}
            (Some(c), None) => {
                missing.insert(c);
            }
            (Some(_), Some(_)) => {
                tracing::debug!(entry = %entry, "multi-character missing glyph entry");
                missing.extend(entry.chars());
            }
        }
    }
    missing
}

/// Fetch the missing set from the server. An empty set is returned while the
/// server has not published the `missing-glyphs` marker yet.
pub async fn fetch_missing<A: FontApi>(api: &A, job_id: &str) -> Result<BTreeSet<char>, ApiError> {
    let status = api.job_status(job_id).await?;
    if !status.has_missing_glyphs() {
        return Ok(BTreeSet::new());
    }
    let raw = api.missing_glyphs(job_id).await?;
    Ok(parse_missing(&raw))
}

/// Where the last reconciliation took its missing set from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileSource {
    Remote,
    Cache,
    /// Neither remote nor cache: treated as nothing missing.
    Default,
}

/// Owns the live inventory of the current job and its missing-glyph cache.
pub struct GlyphReconciler<C: MissingGlyphCache> {
    alphabet: Alphabet,
    cache: C,
    inventory: watch::Sender<Inventory>,
}

impl<C: MissingGlyphCache> GlyphReconciler<C> {
    pub fn new(alphabet: Alphabet, cache: C) -> Self {
        let (inventory, _rx) = watch::channel(Inventory::baseline(&alphabet));
        Self {
            alphabet,
            cache,
            inventory,
        }
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn snapshot(&self) -> Inventory {
        self.inventory.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Inventory> {
        self.inventory.subscribe()
    }

    /// Replace the whole inventory from a missing set.
    pub fn apply_missing(&self, missing: &BTreeSet<char>) {
        self.inventory
            .send_replace(reconcile(&self.alphabet, missing));
    }

    /// Reconcile against the server, falling back to the cache and then to
    /// "nothing missing". A successful fetch overwrites the cache.
    pub async fn refresh<A: FontApi>(&self, api: &A, job_id: &str) -> ReconcileSource {
        match fetch_missing(api, job_id).await {
            Ok(missing) => {
                if let Err(err) = self.cache.put(job_id, &missing) {
                    tracing::warn!(job_id = %job_id, error = %err, "failed to cache missing glyphs");
                }
                tracing::info!(job_id = %job_id, missing = missing.len(), "inventory reconciled");
                self.apply_missing(&missing);
                ReconcileSource::Remote
            }
            Err(err) => {
                tracing::warn!(job_id = %job_id, error = %err, "missing-glyph fetch failed, using cache");
                match self.cache.get(job_id) {
                    Ok(Some(missing)) => {
                        self.apply_missing(&missing);
                        ReconcileSource::Cache
                    }
                    Ok(None) => {
                        self.apply_missing(&BTreeSet::new());
                        ReconcileSource::Default
                    }
                    Err(err) => {
                        tracing::warn!(job_id = %job_id, error = %err, "cache read failed");
                        self.apply_missing(&BTreeSet::new());
                        ReconcileSource::Default
                    }
                }
            }
        }
    }

    /// Drop the cached missing set so the next refresh cannot serve it.
    pub fn invalidate(&self, job_id: &str) -> Result<(), StoreError> {
        self.cache.evict(job_id)
    }

    pub fn reset_to_baseline(&self) {
        self.inventory
            .send_replace(Inventory::baseline(&self.alphabet));
    }

    pub fn toggle_selected(&self, c: char) -> bool {
        self.inventory.send_if_modified(|inv| inv.toggle_selected(c))
    }

    pub fn toggle_flag(&self, c: char) -> bool {
        self.inventory.send_if_modified(|inv| inv.toggle_flag(c))
    }

    pub fn selected_characters(&self) -> Vec<char> {
        self.inventory.borrow().selected_characters()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalStore;
    use crate::test_support::{Failure, ScriptedApi};

    fn set(chars: &[char]) -> BTreeSet<char> {
        chars.iter().copied().collect()
    }

    fn sixty_four() -> Alphabet {
        // A–Z, a–z, 0–9 and two punctuation marks.
        Alphabet::new(DEFAULT_ALPHABET.chars().take(64))
    }

    #[test]
    fn default_alphabet_has_71_characters() {
        assert_eq!(Alphabet::default().len(), 71);
    }

    #[test]
    fn alphabet_dedupes() {
        let alphabet = Alphabet::new("ABBA".chars());
        assert_eq!(alphabet.chars(), &['A', 'B']);
    }

    #[test]
    fn code_point_ids_are_padded_upper_hex() {
        assert_eq!(code_point_id('Q'), "0051");
        assert_eq!(code_point_id('é'), "00E9");
        assert_eq!(code_point_id('😀'), "1F600");
    }

    #[test]
    fn missing_q_and_7_in_64_char_alphabet() {
        let alphabet = sixty_four();
        assert_eq!(alphabet.len(), 64);

        let inventory = reconcile(&alphabet, &set(&['Q', '7']));
        assert_eq!(inventory.len(), 64);

        let missing = inventory.missing();
        assert_eq!(missing.len(), 2);
        assert!(missing.iter().all(|r| r.selected && !r.is_available));
        assert_eq!(inventory.selected_count(), 2);
        assert_eq!(inventory.selected_characters(), vec!['Q', '7']);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let alphabet = Alphabet::default();
        let missing = set(&['Q', 'é', '€']);
        assert_eq!(reconcile(&alphabet, &missing), reconcile(&alphabet, &missing));
    }

    #[test]
    fn extras_are_appended_in_code_point_order_without_duplicates() {
        let alphabet = Alphabet::new("ABC".chars());
        let inventory = reconcile(&alphabet, &set(&['€', 'B', 'é']));
        let chars: Vec<char> = inventory.records().iter().map(|r| r.character).collect();
        assert_eq!(chars, vec!['A', 'B', 'C', 'é', '€']);

        let ids: BTreeSet<&str> = inventory
            .records()
            .iter()
            .map(|r| r.code_point.as_str())
            .collect();
        assert_eq!(ids.len(), inventory.len());
    }

    #[test]
    fn toggle_flag_round_trip() {
        let mut inventory = Inventory::baseline(&Alphabet::default());
        assert!(inventory.toggle_flag('g'));
        let record = inventory.get('g').unwrap();
        assert!(record.flagged && record.selected);

        assert!(inventory.toggle_flag('g'));
        let record = inventory.get('g').unwrap();
        assert!(!record.flagged && !record.selected);
    }

    #[test]
    fn toggle_flag_ignores_unavailable() {
        let mut inventory = reconcile(&Alphabet::default(), &set(&['Q']));
        assert!(!inventory.toggle_flag('Q'));
        let record = inventory.get('Q').unwrap();
        assert!(!record.flagged);
        assert!(record.selected);
    }

    #[test]
    fn toggle_selected_touches_one_record() {
        let mut inventory = reconcile(&Alphabet::default(), &set(&['Q']));
        let before = inventory.clone();
        assert!(inventory.toggle_selected('Q'));
        let changed: Vec<_> = before
            .records()
            .iter()
            .zip(inventory.records())
            .filter(|(a, b)| a != b)
            .collect();
        assert_eq!(changed.len(), 1);
        assert!(!inventory.get('Q').unwrap().selected);
        assert!(!inventory.toggle_selected('~'));
    }

    #[test]
    fn views_partition_records() {
        let mut inventory = reconcile(&Alphabet::new("ABCD".chars()), &set(&['A']));
        inventory.toggle_flag('B');
        assert_eq!(inventory.missing().len(), 1);
        assert_eq!(inventory.flagged().len(), 1);
        assert_eq!(inventory.regular().len(), 2);
        assert_eq!(inventory.to_regenerate().len(), 2);
        assert_eq!(inventory.problem_characters_in("BAD CAB"), vec!['B', 'A']);
    }

    #[test]
    fn parse_missing_handles_odd_entries() {
        let raw = vec!["Q".to_string(), String::new(), "xy".to_string(), "Q".to_string()];
        assert_eq!(parse_missing(&raw), set(&['Q', 'x', 'y']));
    }

    #[tokio::test]
    async fn refresh_uses_remote_and_overwrites_cache() {
        let api = ScriptedApi::new()
            .with_status(ScriptedApi::completed())
            .with_missing(&["Q", "7"]);
        let reconciler = GlyphReconciler::new(Alphabet::default(), LocalStore::in_memory());

        let source = reconciler.refresh(&api, "job-1").await;
        assert_eq!(source, ReconcileSource::Remote);
        assert_eq!(reconciler.snapshot().missing().len(), 2);

        let cached = MissingGlyphCache::get(&reconciler.cache, "job-1").unwrap();
        assert_eq!(cached, Some(set(&['Q', '7'])));
    }

    #[tokio::test]
    async fn refresh_skips_list_until_marker_is_present() {
        let api = ScriptedApi::new()
            .with_status(ScriptedApi::processing(&["base-image"]))
            .with_missing(&["Q"]);
        let reconciler = GlyphReconciler::new(Alphabet::default(), LocalStore::in_memory());

        assert_eq!(reconciler.refresh(&api, "job-1").await, ReconcileSource::Remote);
        assert!(reconciler.snapshot().missing().is_empty());
        assert_eq!(api.count("missing:"), 0);
    }

    #[tokio::test]
    async fn refresh_falls_back_to_cache_then_default() {
        let api = ScriptedApi::new().with_status_failure(Failure::Transient);
        let store = LocalStore::in_memory();
        store.put("job-1", &set(&['&'])).unwrap();
        let reconciler = GlyphReconciler::new(Alphabet::default(), store);

        assert_eq!(reconciler.refresh(&api, "job-1").await, ReconcileSource::Cache);
        assert_eq!(reconciler.selected_characters(), vec!['&']);

        assert_eq!(reconciler.refresh(&api, "job-2").await, ReconcileSource::Default);
        assert!(reconciler.snapshot().missing().is_empty());
        assert_eq!(reconciler.snapshot().len(), 71);
    }

    #[tokio::test]
    async fn failed_list_fetch_keeps_cached_set() {
        let api = ScriptedApi::new()
            .with_status(ScriptedApi::completed())
            .with_missing_failure(Failure::Transient);
        let store = LocalStore::in_memory();
        store.put("job-1", &set(&['Q', '7'])).unwrap();
        let reconciler = GlyphReconciler::new(Alphabet::default(), store);

        assert_eq!(reconciler.refresh(&api, "job-1").await, ReconcileSource::Cache);
        assert_eq!(api.count("status:job-1"), 1);
        assert_eq!(api.count("missing:job-1"), 1);
        assert_eq!(reconciler.selected_characters(), vec!['Q', '7']);
        let cached = MissingGlyphCache::get(&reconciler.cache, "job-1").unwrap();
        assert_eq!(cached, Some(set(&['Q', '7'])));
    }

    #[tokio::test]
    async fn subscribers_see_toggles_and_resets() {
        let reconciler = GlyphReconciler::new(Alphabet::default(), LocalStore::in_memory());
        let mut rx = reconciler.subscribe();

        assert!(reconciler.toggle_flag('a'));
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().get('a').unwrap().flagged);

        assert!(!reconciler.toggle_flag('~'));
        assert!(!rx.has_changed().unwrap());

        reconciler.apply_missing(&set(&['Z']));
        reconciler.reset_to_baseline();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Inventory::baseline(&Alphabet::default()));
    }
}
