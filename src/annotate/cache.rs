//! Bounded in-memory caches for attribution and commit messages.
//!
//! - `AttributionCache`: one `Attribution` per document, strict LRU. Every
//!   read or write stamps the access-order index under the same lock as the
//!   data map, so the two can never disagree about which documents exist.
//! - `MessageCache`: revision → message. Messages never change once
//!   committed, so recency is tracked only by insertion order and eviction
//!   drops the oldest quarter in one sweep.
//!
//! Both are shared across documents behind a single coarse lock each; cache
//! sizes are tens to hundreds of entries.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use crate::models::{Attribution, CommitMessage};

/// Bump to orphan every entry keyed under an older layout.
pub const CACHE_KEY_VERSION: u32 = 1;

pub const DEFAULT_ATTRIBUTION_CAPACITY: usize = 20;
pub const DEFAULT_MESSAGE_CAPACITY: usize = 500;

/// Fraction of the message cache dropped per eviction sweep.
const MESSAGE_EVICTION_FRACTION: f64 = 0.25;

/// Versioned cache identity of a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey(String);

impl DocumentKey {
    pub fn new(path: &str) -> Self {
        Self(format!("v{}:{}", CACHE_KEY_VERSION, path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The document path without the version prefix.
    pub fn path(&self) -> &str {
        self.0.split_once(':').map_or(self.0.as_str(), |(_, path)| path)
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct AttributionCacheEntry {
    pub document_key: DocumentKey,
    pub attribution: Arc<Attribution>,
    pub fetched_at_ordinal: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Default)]
struct AttributionState {
    entries: HashMap<DocumentKey, AttributionCacheEntry>,
    /// documentKey → last access ordinal; same key set as `entries`
    access_order: HashMap<DocumentKey, u64>,
    clock: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl AttributionState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn remove(&mut self, key: &DocumentKey) -> bool {
        let had_entry = self.entries.remove(key).is_some();
        let had_index = self.access_order.remove(key).is_some();
        debug_assert_eq!(had_entry, had_index, "access order out of sync for {}", key);
        had_entry
    }

    fn evict_one(&mut self, capacity: usize) -> Option<DocumentKey> {
        if self.entries.len() <= capacity {
            return None;
        }

        // Ties cannot happen (the clock is strictly increasing), but order by
        // key as well so the victim never depends on map iteration order.
        let victim = self
            .access_order
            .iter()
            .min_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
            .map(|(key, _)| key.clone())?;

        self.remove(&victim);
        self.evictions += 1;
        Some(victim)
    }
}

pub struct AttributionCache {
    capacity: usize,
    state: Mutex<AttributionState>,
}

impl AttributionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(AttributionState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached attribution for `key`; a hit refreshes its access time.
    pub fn get(&self, key: &DocumentKey) -> Option<Arc<Attribution>> {
        let mut state = self.state.lock();
        let now = state.tick();

        let found = state.entries.get(key).map(|e| Arc::clone(&e.attribution));
        if found.is_some() {
            state.access_order.insert(key.clone(), now);
            state.hits += 1;
        } else {
            state.misses += 1;
        }
        found
    }

    /// Insert or replace, then evict at most one entry if over capacity.
    /// Returns the evicted key so dependent bookkeeping can be dropped.
    pub fn put(&self, key: DocumentKey, attribution: Arc<Attribution>) -> Option<DocumentKey> {
        let mut state = self.state.lock();
        let now = state.tick();

        state.entries.insert(
            key.clone(),
            AttributionCacheEntry {
                document_key: key.clone(),
                attribution,
                fetched_at_ordinal: now,
            },
        );
        state.access_order.insert(key, now);

        let evicted = state.evict_one(self.capacity);
        if let Some(victim) = &evicted {
            tracing::debug!("Evicted attribution for {} ({} cached)", victim, state.entries.len());
        }
        evicted
    }

    pub fn evict_if_over_capacity(&self) -> Option<DocumentKey> {
        self.state.lock().evict_one(self.capacity)
    }

    /// Drop the entry regardless of capacity (save, close, refresh).
    pub fn invalidate(&self, key: &DocumentKey) -> bool {
        self.state.lock().remove(key)
    }

    /// Whether `key` is cached, without touching its access time.
    pub fn contains(&self, key: &DocumentKey) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    pub fn entry(&self, key: &DocumentKey) -> Option<AttributionCacheEntry> {
        self.state.lock().entries.get(key).cloned()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.access_order.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.entries.len(),
            capacity: self.capacity,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }
}

impl Default for AttributionCache {
    fn default() -> Self {
        Self::new(DEFAULT_ATTRIBUTION_CAPACITY)
    }
}

#[derive(Default)]
struct MessageState {
    messages: HashMap<String, String>,
    /// Insertion order, oldest first; same key set as `messages`
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

pub struct MessageCache {
    capacity: usize,
    state: Mutex<MessageState>,
}

impl MessageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(MessageState::default()),
        }
    }

    pub fn get(&self, revision: &str) -> Option<String> {
        let mut state = self.state.lock();
        let found = state.messages.get(revision).cloned();
        if found.is_some() {
            state.hits += 1;
        } else {
            state.misses += 1;
        }
        found
    }

    pub fn put(&self, revision: &str, message: &str) {
        let mut state = self.state.lock();
        Self::insert_locked(&mut state, revision, message);
        Self::evict_locked(&mut state, self.capacity);
    }

    /// Insert a fetched batch under one lock, evicting once at the end.
    pub fn put_many(&self, messages: &[CommitMessage]) {
        let mut state = self.state.lock();
        for message in messages {
            Self::insert_locked(&mut state, &message.revision, &message.msg);
            Self::evict_locked(&mut state, self.capacity);
        }
    }

    /// Drop the oldest quarter (rounded up) when over capacity.
    pub fn evict_if_over_capacity(&self) -> usize {
        let mut state = self.state.lock();
        Self::evict_locked(&mut state, self.capacity)
    }

    /// Revisions from `revisions` with no cached message, in input order.
    pub fn missing(&self, revisions: &[String]) -> Vec<String> {
        let state = self.state.lock();
        revisions
            .iter()
            .filter(|r| !state.messages.contains_key(r.as_str()))
            .cloned()
            .collect()
    }

    /// Cached messages for the given revisions.
    pub fn resolve(&self, revisions: &[String]) -> HashMap<String, String> {
        let state = self.state.lock();
        revisions
            .iter()
            .filter_map(|r| state.messages.get(r).map(|m| (r.clone(), m.clone())))
            .collect()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.messages.clear();
        state.order.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.messages.len(),
            capacity: self.capacity,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }

    fn insert_locked(state: &mut MessageState, revision: &str, message: &str) {
        if state
            .messages
            .insert(revision.to_string(), message.to_string())
            .is_none()
        {
            state.order.push_back(revision.to_string());
        }
    }

    fn evict_locked(state: &mut MessageState, capacity: usize) -> usize {
        let size = state.messages.len();
        if size <= capacity {
            return 0;
        }

        let count = (size as f64 * MESSAGE_EVICTION_FRACTION).ceil() as usize;
        for revision in state.order.drain(..count.min(size)) {
            state.messages.remove(&revision);
        }
        state.evictions += count as u64;
        tracing::debug!("Evicted {} commit messages ({} remain)", count, state.messages.len());
        count
    }
}

impl Default for MessageCache {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_CAPACITY)
    }
}
