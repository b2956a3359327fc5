//! Progressive, cancelable annotation of open documents.
//!
//! Per document the pipeline runs
//! `Idle → Fetching → RenderedWithoutMessages → FetchingMessages → RenderedWithMessages`,
//! with `Aborted` reachable whenever the result is no longer wanted.
//!
//! 1. Attribution comes from the cache or from one shared fetch per document
//!    (blame + base content), which populates the cache.
//! 2. The working copy is correlated against the base version if they differ.
//! 3. Decorations are applied immediately with whatever messages are cached.
//! 4. Missing messages are fetched in one background batch; the result is
//!    applied only if the document is still enabled, still the active target,
//!    and no newer render request has superseded it.
//!
//! Collaborator failures never escape: they are classified, surfaced once per
//! document when actionable, and leave the document without decorations.

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::annotate::cache::{AttributionCache, CacheStats, DocumentKey, MessageCache};
use crate::annotate::color::ThemeKind;
use crate::annotate::correlate::{LineMapping, MappingCache};
use crate::annotate::debounce::Debouncer;
use crate::annotate::inflight::{InFlight, SharedTask};
use crate::annotate::render::{RenderInput, RenderingEngine};
use crate::config::AnnotationConfig;
use crate::error::{ErrorKind, VcsError};
use crate::git::{VersionControl, BASE_REVISION};
use crate::models::{Attribution, DecorationSet, Notice, RenderPhase};

/// Consecutive internal failures before the user is told.
const REPEATED_FAILURE_THRESHOLD: u32 = 3;

/// Message batches one enrichment pass may join or start.
const MAX_BATCH_ATTEMPTS: usize = 3;

/// Editor-side rendering primitives.
pub trait DecorationHost: Send + Sync {
    /// Replace all decorations of `document`.
    fn apply(&self, document: &str, decorations: DecorationSet);

    fn clear(&self, document: &str);

    fn notify(&self, notice: Notice);
}

type FetchResult = Result<Arc<Attribution>, VcsError>;
type MessageResult = Result<usize, VcsError>;

#[derive(Debug)]
struct DocumentState {
    phase: RenderPhase,
    disabled: bool,
    /// Restamped by every render request, clear, and disable
    generation: u64,
    /// Restamped by invalidate; a fetch may only fill the cache under the
    /// epoch it started with
    epoch: u64,
    notified: HashSet<ErrorKind>,
    large_file_warned: bool,
    internal_failures: u32,
}

impl DocumentState {
    fn new(epoch: u64) -> Self {
        Self {
            phase: RenderPhase::Idle,
            disabled: false,
            generation: 0,
            epoch,
            notified: HashSet::new(),
            large_file_warned: false,
            internal_failures: 0,
        }
    }

    /// Nothing here that a fresh state would not reproduce.
    fn is_disposable(&self) -> bool {
        !self.disabled
            && !self.large_file_warned
            && self.notified.is_empty()
            && self.internal_failures == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnotatorStats {
    pub attribution: CacheStats,
    pub messages: CacheStats,
    pub in_flight_fetches: usize,
    pub in_flight_message_batches: usize,
    pub compiled_templates: usize,
    pub cached_mappings: usize,
    pub tracked_documents: usize,
}

/// Inputs of one render request that the enrichment pass reuses.
struct RenderContext {
    document: String,
    key: DocumentKey,
    generation: u64,
    attribution: Arc<Attribution>,
    mapping: Option<Arc<LineMapping>>,
    revisions: Vec<String>,
    cursor_line: Option<usize>,
}

pub struct Annotator {
    vcs: Arc<dyn VersionControl>,
    host: Arc<dyn DecorationHost>,
    config: RwLock<Arc<AnnotationConfig>>,
    attribution: AttributionCache,
    messages: MessageCache,
    fetches: InFlight<FetchResult>,
    message_fetches: InFlight<MessageResult>,
    mappings: MappingCache,
    engine: RenderingEngine,
    debouncer: Debouncer,
    documents: Mutex<HashMap<String, DocumentState>>,
    active: Mutex<Option<String>>,
    /// Source of generation and epoch values; never repeats
    stamps: AtomicU64,
}

impl Annotator {
    /// Cache capacities are fixed here; later config updates do not resize them.
    pub fn new(
        vcs: Arc<dyn VersionControl>,
        host: Arc<dyn DecorationHost>,
        config: AnnotationConfig,
        theme: ThemeKind,
    ) -> Arc<Self> {
        Arc::new(Self {
            vcs,
            host,
            attribution: AttributionCache::new(config.attribution_cache_capacity),
            messages: MessageCache::new(config.message_cache_capacity),
            config: RwLock::new(Arc::new(config)),
            fetches: InFlight::new(),
            message_fetches: InFlight::new(),
            mappings: MappingCache::new(),
            engine: RenderingEngine::new(theme),
            debouncer: Debouncer::new(),
            documents: Mutex::new(HashMap::new()),
            active: Mutex::new(None),
            stamps: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> Arc<AnnotationConfig> {
        Arc::clone(&self.config.read())
    }

    /// Annotate `document` given its current contents.
    ///
    /// Returns once the immediate pass is applied (or skipped); message
    /// enrichment continues in the background.
    pub async fn render_request(self: &Arc<Self>, document: &str, working: &[String], cursor_line: Option<usize>) {
        let outcome = AssertUnwindSafe(self.run_render(document, working, cursor_line))
            .catch_unwind()
            .await;

        if outcome.is_err() {
            self.handle_failure(document, VcsError::Internal("render pipeline panicked".to_string()));
        }
    }

    /// Debounced `render_request`: only the last request in a burst runs.
    pub fn schedule_render(self: &Arc<Self>, document: &str, working: Vec<String>, cursor_line: Option<usize>) {
        let this = Arc::clone(self);
        let doc = document.to_string();
        let delay = self.config().debounce();
        self.debouncer.schedule(document, delay, async move {
            this.render_request(&doc, &working, cursor_line).await;
        });
    }

    /// Document opened in the editor; renders only when auto-trigger is on.
    pub async fn open_document(self: &Arc<Self>, document: &str, working: &[String]) -> bool {
        if !self.config().auto_trigger_on_open {
            return false;
        }
        self.render_request(document, working, None).await;
        true
    }

    /// Remove decorations and supersede any pending work for `document`.
    pub fn clear(&self, document: &str) {
        self.debouncer.cancel(document);
        let generation = self.stamp();
        self.with_state(document, |state| {
            state.generation = generation;
            state.phase = RenderPhase::Idle;
        });
        self.host.clear(document);
        self.release_state(document);
    }

    /// Forget everything cached for `document` (save, close, refresh).
    ///
    /// A fetch already in flight keeps running but can no longer fill the
    /// cache or render.
    pub fn invalidate(&self, document: &str) {
        let key = DocumentKey::new(document);
        self.debouncer.cancel(document);

        let epoch = self.stamp();
        {
            let mut documents = self.documents.lock();
            let state = documents
                .entry(document.to_string())
                .or_insert_with(|| DocumentState::new(epoch));
            state.epoch = epoch;
            state.notified.clear();
            state.large_file_warned = false;
            state.internal_failures = 0;
            // Under the same lock as the epoch check in `store_attribution`.
            self.attribution.invalidate(&key);
        }

        self.drop_dependents(&key);
        tracing::debug!("Invalidated {}", key);
    }

    pub fn set_enabled(&self, document: &str, enabled: bool) {
        let generation = self.stamp();
        self.with_state(document, |state| {
            state.disabled = !enabled;
            if !enabled {
                state.generation = generation;
                state.phase = match state.phase {
                    RenderPhase::Fetching | RenderPhase::FetchingMessages => RenderPhase::Aborted,
                    _ => RenderPhase::Idle,
                };
            }
        });

        if !enabled {
            self.debouncer.cancel(document);
            self.host.clear(document);
        }
        tracing::debug!("Annotation for {} {}", document, if enabled { "enabled" } else { "disabled" });
    }

    /// Flip annotation for `document`, returning the new state.
    pub fn toggle(&self, document: &str) -> bool {
        let enabled = self.is_disabled(document);
        self.set_enabled(document, enabled);
        enabled
    }

    pub fn is_disabled(&self, document: &str) -> bool {
        self.documents.lock().get(document).is_some_and(|s| s.disabled)
    }

    pub fn set_active(&self, document: Option<&str>) {
        *self.active.lock() = document.map(str::to_string);
    }

    pub fn active(&self) -> Option<String> {
        self.active.lock().clone()
    }

    pub fn set_theme(&self, theme: ThemeKind) {
        self.engine.set_theme(theme);
    }

    pub fn theme(&self) -> ThemeKind {
        self.engine.theme()
    }

    /// Swap in a new configuration; compiled templates, colors, and mappings
    /// are dropped.
    pub fn update_config(&self, config: AnnotationConfig) -> crate::error::Result<()> {
        config.validate()?;
        let enabled = config.enabled;
        *self.config.write() = Arc::new(config);
        self.engine.reset();
        self.mappings.clear();

        if !enabled {
            let documents: Vec<String> = self.documents.lock().keys().cloned().collect();
            for document in documents {
                self.clear(&document);
            }
        }
        tracing::info!("Annotation config updated");
        Ok(())
    }

    pub fn phase(&self, document: &str) -> RenderPhase {
        self.documents.lock().get(document).map(|s| s.phase).unwrap_or_default()
    }

    pub fn stats(&self) -> AnnotatorStats {
        AnnotatorStats {
            attribution: self.attribution.stats(),
            messages: self.messages.stats(),
            in_flight_fetches: self.fetches.len(),
            in_flight_message_batches: self.message_fetches.len(),
            compiled_templates: self.engine.templates().len(),
            cached_mappings: self.mappings.len(),
            tracked_documents: self.documents.lock().len(),
        }
    }

    async fn run_render(self: &Arc<Self>, document: &str, working: &[String], cursor_line: Option<usize>) {
        let config = self.config();
        if !config.enabled || self.is_disabled(document) {
            return;
        }

        self.set_active(Some(document));
        let generation = self.stamp();
        let epoch = self.with_state(document, |state| {
            state.generation = generation;
            state.epoch
        });

        if working.len() > config.large_file.line_threshold {
            self.handle_large_file(document, working.len(), &config);
            return;
        }

        let key = DocumentKey::new(document);
        let attribution = match self.attribution.get(&key) {
            Some(cached) => cached,
            None => {
                self.set_phase(document, RenderPhase::Fetching);
                match self.fetch_attribution(document, &key, epoch).await {
                    Ok(fetched) if self.epoch_matches(document, epoch) => fetched,
                    Ok(_) => {
                        if self.is_current(document, generation) {
                            self.set_phase(document, RenderPhase::Idle);
                        }
                        return;
                    }
                    Err(err) => {
                        if self.is_current(document, generation) {
                            self.handle_failure(document, err);
                        }
                        return;
                    }
                }
            }
        };

        // Disabled, cleared, or superseded while the fetch was running.
        if !self.is_current(document, generation) {
            if self.is_disabled(document) {
                self.set_phase(document, RenderPhase::Aborted);
            }
            return;
        }

        let mapping = if attribution.base_lines.as_slice() == working {
            None
        } else {
            Some(self.mappings.get_or_compute(key.as_str(), &attribution.base_lines, working))
        };

        let revisions = rendered_revisions(&attribution, mapping.as_deref());
        let wants_messages = config.wants_messages();
        let missing = if wants_messages {
            self.messages.missing(&revisions)
        } else {
            Vec::new()
        };
        let complete = wants_messages && missing.is_empty();

        let context = RenderContext {
            document: document.to_string(),
            key,
            generation,
            attribution,
            mapping,
            revisions,
            cursor_line,
        };

        self.apply(&config, &context, complete);
        self.with_state(document, |state| {
            state.phase = if complete {
                RenderPhase::RenderedWithMessages
            } else {
                RenderPhase::RenderedWithoutMessages
            };
            state.notified.clear();
            state.internal_failures = 0;
        });

        if !wants_messages || complete {
            return;
        }
        if context.revisions.len() > config.max_enrichment_revisions {
            tracing::debug!(
                "Skipping message enrichment for {}: {} revisions",
                document,
                context.revisions.len()
            );
            return;
        }

        self.set_phase(document, RenderPhase::FetchingMessages);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let document = context.document.clone();
            let outcome = AssertUnwindSafe(Arc::clone(&this).enrich(context, missing)).catch_unwind().await;
            if outcome.is_err() {
                this.handle_failure(&document, VcsError::Internal("message enrichment panicked".to_string()));
            }
        });
    }

    /// Join or start the single attribution fetch for `key`.
    async fn fetch_attribution(self: &Arc<Self>, document: &str, key: &DocumentKey, epoch: u64) -> FetchResult {
        let this = Arc::clone(self);
        let doc = document.to_string();
        let cache_key = key.clone();

        let (task, started) = self.fetches.join_or_start(key.as_str(), move || async move {
            let start = std::time::Instant::now();
            this.vcs.info(&doc).await?;
            let (lines, content) =
                tokio::try_join!(this.vcs.blame(&doc), this.vcs.show(&doc, BASE_REVISION))?;

            let base_lines: Vec<String> = content.lines().map(str::to_string).collect();
            if let Some(bad) = lines
                .iter()
                .find(|l| l.line_number == 0 || l.line_number > base_lines.len())
            {
                return Err(VcsError::Unparseable(format!(
                    "blame line {} outside {} base lines of {}",
                    bad.line_number,
                    base_lines.len(),
                    doc
                )));
            }

            let attribution = Arc::new(Attribution::new(lines, base_lines));
            this.store_attribution(&doc, cache_key, epoch, Arc::clone(&attribution));
            tracing::info!(
                "Fetched attribution for {} ({} lines) in {:?}",
                doc,
                attribution.lines.len(),
                start.elapsed()
            );
            Ok::<_, VcsError>(attribution)
        });

        if !started {
            tracing::debug!("Attached to in-flight attribution fetch for {}", document);
        }
        task.await
    }

    async fn enrich(self: Arc<Self>, context: RenderContext, missing: Vec<String>) {
        let document = context.document.as_str();
        let mut pending = missing;
        let mut outcome = Ok(());

        for attempt in 1..=MAX_BATCH_ATTEMPTS {
            let (task, started) = self.message_batch(&context.key, pending.clone());
            if let Err(err) = task.await {
                outcome = Err(err);
                break;
            }
            if started || attempt == MAX_BATCH_ATTEMPTS {
                break;
            }
            // Joined a batch started for another revision set.
            pending = self.messages.missing(&pending);
            if pending.is_empty() {
                break;
            }
        }

        match outcome {
            Ok(()) => {
                // Checked now that the batch has resolved, not before.
                if !self.is_current(document, context.generation) || !self.is_active(document) {
                    tracing::debug!("Discarding message enrichment for {}", document);
                    if self.is_current(document, context.generation) || self.is_disabled(document) {
                        self.set_phase(document, RenderPhase::Aborted);
                    }
                    return;
                }

                let config = self.config();
                self.apply(&config, &context, true);
                self.set_phase(document, RenderPhase::RenderedWithMessages);
            }
            Err(err) => {
                tracing::warn!("Commit message fetch failed for {}: {}", document, err);
                if self.is_current(document, context.generation) {
                    self.set_phase(document, RenderPhase::RenderedWithoutMessages);
                    if matches!(err.kind(), ErrorKind::AuthRequired | ErrorKind::NetworkUnavailable) {
                        self.notify_once(document, &err);
                    }
                }
            }
        }
    }

    /// Join or start the message batch for `key`; fetched messages land in
    /// the message cache.
    fn message_batch(self: &Arc<Self>, key: &DocumentKey, revisions: Vec<String>) -> (SharedTask<MessageResult>, bool) {
        let this = Arc::clone(self);
        self.message_fetches.join_or_start(key.as_str(), move || async move {
            let start = std::time::Instant::now();
            let fetched = this.vcs.log_batch(&revisions).await?;
            this.messages.put_many(&fetched);
            tracing::info!(
                "Fetched {} of {} commit messages in {:?}",
                fetched.len(),
                revisions.len(),
                start.elapsed()
            );
            Ok::<_, VcsError>(fetched.len())
        })
    }

    fn apply(&self, config: &AnnotationConfig, context: &RenderContext, with_messages: bool) {
        let messages = if config.wants_messages() {
            self.messages.resolve(&context.revisions)
        } else {
            HashMap::new()
        };

        let decorations = self.engine.render(
            config,
            &RenderInput {
                document: &context.document,
                attribution: &context.attribution,
                mapping: context.mapping.as_deref(),
                messages: &messages,
                cursor_line: context.cursor_line,
                with_messages,
            },
        );
        self.host.apply(&context.document, decorations);
    }

    fn handle_failure(&self, document: &str, err: VcsError) {
        self.host.clear(document);
        self.set_phase(document, RenderPhase::Idle);

        match err.kind() {
            ErrorKind::NotVersioned => {
                tracing::debug!("{} is not under version control", document);
            }
            ErrorKind::AuthRequired | ErrorKind::NetworkUnavailable => {
                tracing::warn!("Annotation failed for {}: {}", document, err);
                self.notify_once(document, &err);
            }
            ErrorKind::Unparseable => {
                tracing::warn!("Discarding unparseable attribution for {}: {}", document, err);
            }
            ErrorKind::Internal => {
                tracing::error!("Annotation failed for {}: {}", document, err);
                let failures = self.with_state(document, |state| {
                    state.internal_failures += 1;
                    state.internal_failures
                });
                if failures == REPEATED_FAILURE_THRESHOLD {
                    self.host.notify(Notice::RepeatedFailure {
                        document: document.to_string(),
                        failures,
                    });
                }
            }
        }
    }

    fn handle_large_file(&self, document: &str, line_count: usize, config: &AnnotationConfig) {
        tracing::debug!(
            "Not annotating {}: {} lines exceeds {}",
            document,
            line_count,
            config.large_file.line_threshold
        );

        self.host.clear(document);
        let first_time = self.with_state(document, |state| {
            state.phase = RenderPhase::Idle;
            !std::mem::replace(&mut state.large_file_warned, true)
        });
        if config.large_file.warn && first_time {
            self.host.notify(Notice::LargeFile {
                document: document.to_string(),
                line_count,
                threshold: config.large_file.line_threshold,
            });
        }
    }

    fn notify_once(&self, document: &str, err: &VcsError) {
        let first_time = self.with_state(document, |state| state.notified.insert(err.kind()));
        if first_time {
            self.host.notify(Notice::FetchFailed {
                document: document.to_string(),
                error: err.kind(),
                message: err.to_string(),
                hint: err.hint().map(str::to_string),
            });
        }
    }

    /// Cache a fetched attribution unless the document was invalidated since
    /// the fetch started.
    fn store_attribution(&self, document: &str, key: DocumentKey, epoch: u64, attribution: Arc<Attribution>) {
        let evicted = {
            let documents = self.documents.lock();
            if !documents.get(document).is_some_and(|s| s.epoch == epoch) {
                tracing::debug!("Not caching attribution for {}: invalidated mid-fetch", document);
                return;
            }
            self.attribution.put(key, attribution)
        };

        if let Some(evicted) = evicted {
            self.drop_dependents(&evicted);
            self.release_state(evicted.path());
        }
    }

    /// Drop the per-document state when it is idle bookkeeping only.
    fn release_state(&self, document: &str) {
        if self.is_active(document) {
            return;
        }
        let mut documents = self.documents.lock();
        if documents.get(document).is_some_and(DocumentState::is_disposable) {
            documents.remove(document);
        }
    }

    /// Drop everything keyed by a document that left the attribution cache.
    fn drop_dependents(&self, key: &DocumentKey) {
        self.fetches.forget(key.as_str());
        self.message_fetches.forget(key.as_str());
        self.mappings.invalidate(key.as_str());
        self.engine.forget_document(key.path());
    }

    fn is_current(&self, document: &str, generation: u64) -> bool {
        self.documents
            .lock()
            .get(document)
            .is_some_and(|s| !s.disabled && s.generation == generation)
    }

    fn epoch_matches(&self, document: &str, epoch: u64) -> bool {
        self.documents.lock().get(document).is_some_and(|s| s.epoch == epoch)
    }

    fn is_active(&self, document: &str) -> bool {
        self.active.lock().as_deref() == Some(document)
    }

    fn set_phase(&self, document: &str, phase: RenderPhase) {
        self.with_state(document, |state| state.phase = phase);
    }

    fn stamp(&self) -> u64 {
        self.stamps.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn with_state<T>(&self, document: &str, f: impl FnOnce(&mut DocumentState) -> T) -> T {
        let mut documents = self.documents.lock();
        f(documents
            .entry(document.to_string())
            .or_insert_with(|| DocumentState::new(self.stamp())))
    }
}

/// Distinct revisions of the lines that survive into the working copy.
fn rendered_revisions(attribution: &Attribution, mapping: Option<&LineMapping>) -> Vec<String> {
    let Some(mapping) = mapping else {
        return attribution.distinct_revisions();
    };

    let mut seen = HashSet::new();
    attribution
        .lines
        .iter()
        .filter(|l| mapping.get(l.line_number).is_some())
        .filter_map(|l| l.revision.as_deref())
        .filter(|rev| seen.insert(*rev))
        .map(str::to_string)
        .collect()
}
