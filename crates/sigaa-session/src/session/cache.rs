// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! Page cache: memoize successful responses by request identity.
//!
//! ## Expiry
//!
//! Entries live for the configured TTL. Expiry is lazy: an expired entry is
//! dropped when it is looked up, or when room is needed.
//!
//! ## LRU eviction
//!
//! When the cache exceeds `max_entries`, expired entries are evicted first,
//! otherwise the least-recently-accessed one.

use super::lock;
use super::page::Page;
use super::request::RequestKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Cache entry with metadata.
struct CacheEntry {
    page: Arc<Page>,
    /// When the entry was cached.
    cached_at: Instant,
    ttl: Duration,
    /// When the entry was last accessed (for LRU).
    last_accessed: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() >= self.ttl
    }

    fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }
}

/// In-memory page cache shared by every request of a session.
pub struct PageCache {
    index: Mutex<HashMap<RequestKey, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl PageCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            index: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Whether `page` is eligible: status 200, textual body, and a request
    /// without a binary payload.
    pub fn is_cacheable(page: &Page) -> bool {
        page.status() == 200 && page.is_textual() && page.request().body_is_text()
    }

    /// Store `page` under its originating request. Ineligible pages are ignored.
    pub fn store_page(&self, page: Arc<Page>) {
        if !Self::is_cacheable(&page) {
            return;
        }
        let key = page.request().clone();
        let mut index = lock(&self.index);
        if index.len() >= self.max_entries && !index.contains_key(&key) {
            evict(&mut index);
        }
        let now = Instant::now();
        index.insert(
            key,
            CacheEntry {
                page,
                cached_at: now,
                ttl: self.ttl,
                last_accessed: now,
            },
        );
    }

    /// Fresh page cached for `key`, if any. Returns the same `Arc` on every
    /// hit until the entry expires.
    pub fn get_page(&self, key: &RequestKey) -> Option<Arc<Page>> {
        let mut index = lock(&self.index);
        let entry = index.get_mut(key)?;
        if entry.is_expired() {
            index.remove(key);
            return None;
        }
        entry.touch();
        Some(Arc::clone(&entry.page))
    }

    /// Remove the page cached for `key`.
    pub fn invalidate(&self, key: &RequestKey) {
        lock(&self.index).remove(key);
    }

    /// Drop every cached page.
    pub fn clear_cache_page(&self) {
        lock(&self.index).clear();
    }

    /// Number of cached pages (including expired).
    pub fn len(&self) -> usize {
        lock(&self.index).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.index).is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

fn evict(index: &mut HashMap<RequestKey, CacheEntry>) {
    let before = index.len();
    index.retain(|_, entry| !entry.is_expired());
    if index.len() < before {
        return;
    }

    if let Some(lru) = index
        .iter()
        .min_by_key(|(_, entry)| entry.last_accessed)
        .map(|(key, _)| key.clone())
    {
        tracing::debug!("evicting LRU page: {lru}");
        index.remove(&lru);
    }
}
