// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cache control
//!
//! Entries live in a sharded map. Every check-then-act on a key runs under that key's shard
//! lock, so two replies for the same key never both insert, while unrelated keys proceed in
//! parallel. There is no global lock.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::cache_key::CacheKey;
use super::packet_wrapper::{CachedResult, PacketWrapper};
use crate::config::CacheConfig;
use crate::protocol::GlobalId;
use crate::query::Query;

/// What happened to a reply offered to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Inserted,
    Updated,
    /// Coverage was incomplete; nothing stored
    RejectedIncomplete,
    /// Caching disabled, or the query asked not to be cached
    Bypassed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub updates: u64,
    pub rejected_incomplete: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl CacheStatistics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,
    updates: AtomicU64,
    rejected_incomplete: AtomicU64,
    evictions: AtomicU64,
}

#[derive(Debug)]
struct CacheSlot {
    /// Readers get a snapshot; writers copy on write under the shard lock
    wrapper: Arc<PacketWrapper>,
    created_at: Instant,
    last_access: Instant,
}

impl CacheSlot {
    fn new(wrapper: PacketWrapper) -> Self {
        let now = Instant::now();
        Self {
            wrapper: Arc::new(wrapper),
            created_at: now,
            last_access: now,
        }
    }
}

#[derive(Debug)]
pub struct CacheControl {
    config: CacheConfig,
    entries: DashMap<CacheKey, CacheSlot>,
    counters: Counters,
}

impl CacheControl {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            counters: Counters::default(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(CacheConfig::disabled())
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn applies_to(&self, query: &Query) -> bool {
        self.config.enabled && !query.no_cache()
    }

    fn is_expired(&self, slot: &CacheSlot) -> bool {
        slot.created_at.elapsed() > self.config.time_to_live
    }

    /// Snapshot of the entry for `key`; absence is not an error
    pub fn lookup(&self, key: &CacheKey, query: &Query) -> Option<Arc<PacketWrapper>> {
        if !self.applies_to(query) {
            return None;
        }

        let found = match self.entries.get_mut(key) {
            Some(mut slot) if !self.is_expired(&slot) => {
                slot.last_access = Instant::now();
                Some(Arc::clone(&slot.wrapper))
            }
            Some(_) => None,
            None => None,
        };

        match found {
            Some(wrapper) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                log::debug!("Cache hit for {:?}", key);
                Some(wrapper)
            }
            None => {
                if self
                    .entries
                    .remove_if(key, |_, slot| self.is_expired(slot))
                    .is_some()
                {
                    log::debug!("Dropped expired cache entry {:?}", key);
                }
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Inserts a new entry for `key` when none exists and the reply has full coverage.
    ///
    /// Returns true if an entry was created.
    pub fn cache(
        &self,
        key: &CacheKey,
        query: &Query,
        result: CachedResult,
        distribution_key: Option<u32>,
    ) -> bool {
        if !self.applies_to(query) {
            return false;
        }
        if !result.coverage_full() {
            self.reject_incomplete(key);
            return false;
        }
        self.make_room(key);

        let inserted = match self.entries.entry(key.clone()) {
            Entry::Occupied(_) => {
                log::debug!("Cache entry for {:?} already exists, not inserting", key);
                false
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheSlot::new(PacketWrapper::new(
                    key.clone(),
                    result,
                    distribution_key,
                )));
                self.counters.insertions.fetch_add(1, Ordering::Relaxed);
                log::debug!("Cached first-phase result for {:?}", key);
                true
            }
        };
        if inserted {
            self.enforce_capacity(key);
        }
        inserted
    }

    /// Merges `result` into the existing entry for `key`.
    ///
    /// Returns false when there is no entry or the reply is incomplete.
    pub fn update_cache_entry(&self, key: &CacheKey, query: &Query, result: CachedResult) -> bool {
        if !self.applies_to(query) {
            return false;
        }
        if !result.coverage_full() {
            self.reject_incomplete(key);
            return false;
        }
        match self.entries.get_mut(key) {
            Some(mut slot) => {
                Arc::make_mut(&mut slot.wrapper).add_result(result);
                slot.last_access = Instant::now();
                self.counters.updates.fetch_add(1, Ordering::Relaxed);
                log::debug!("Updated cache entry {:?}", key);
                true
            }
            None => false,
        }
    }

    /// Insert-or-update as one step under the key's lock
    pub fn cache_or_update(
        &self,
        key: &CacheKey,
        query: &Query,
        result: CachedResult,
        distribution_key: Option<u32>,
    ) -> CacheOutcome {
        if !self.applies_to(query) {
            return CacheOutcome::Bypassed;
        }
        if !result.coverage_full() {
            self.reject_incomplete(key);
            return CacheOutcome::RejectedIncomplete;
        }
        self.make_room(key);

        let outcome = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                Arc::make_mut(&mut slot.wrapper).add_result(result);
                slot.last_access = Instant::now();
                self.counters.updates.fetch_add(1, Ordering::Relaxed);
                log::debug!("Updated cache entry {:?}", key);
                CacheOutcome::Updated
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheSlot::new(PacketWrapper::new(
                    key.clone(),
                    result,
                    distribution_key,
                )));
                self.counters.insertions.fetch_add(1, Ordering::Relaxed);
                log::debug!("Cached first-phase result for {:?}", key);
                CacheOutcome::Inserted
            }
        };
        if outcome == CacheOutcome::Inserted {
            self.enforce_capacity(key);
        }
        outcome
    }

    /// Stores summaries on an existing entry; returns how many were stored
    pub fn add_docsums<I>(&self, key: &CacheKey, query: &Query, summary_class: &str, docsums: I) -> usize
    where
        I: IntoIterator<Item = (GlobalId, Vec<u8>)>,
    {
        if !self.applies_to(query) {
            return 0;
        }
        match self.entries.get_mut(key) {
            Some(mut slot) => {
                let wrapper = Arc::make_mut(&mut slot.wrapper);
                let mut stored = 0;
                for (gid, data) in docsums {
                    wrapper.add_docsum(gid, summary_class, data);
                    stored += 1;
                }
                stored
            }
            None => 0,
        }
    }

    fn reject_incomplete(&self, key: &CacheKey) {
        self.counters
            .rejected_incomplete
            .fetch_add(1, Ordering::Relaxed);
        log::debug!("Not caching {:?}: incomplete coverage", key);
    }

    /// Frees a slot for `key` if the cache is full. Must not run while holding an entry lock.
    fn make_room(&self, key: &CacheKey) {
        if self.entries.len() < self.config.max_entries || self.entries.contains_key(key) {
            return;
        }

        let before = self.entries.len();
        self.entries.retain(|_, slot| !self.is_expired(slot));
        let expired = before.saturating_sub(self.entries.len());
        self.counters
            .evictions
            .fetch_add(expired as u64, Ordering::Relaxed);

        if self.entries.len() >= self.config.max_entries {
            self.evict_oldest(key);
        }
    }

    /// Concurrent inserts of new keys can each pass `make_room` before any of them lands.
    /// Every inserter trims back to `max_entries` after releasing its entry lock, so the
    /// limit holds once no insert is in flight.
    fn enforce_capacity(&self, inserted: &CacheKey) {
        while self.entries.len() > self.config.max_entries {
            if !self.evict_oldest(inserted) {
                break;
            }
        }
    }

    /// Removes the oldest entry other than `keep`; false when there is none
    fn evict_oldest(&self, keep: &CacheKey) -> bool {
        let oldest = self
            .entries
            .iter()
            .filter(|slot| slot.key() != keep)
            .min_by_key(|slot| slot.created_at)
            .map(|slot| slot.key().clone());
        let Some(oldest) = oldest else {
            return false;
        };
        if self.entries.remove(&oldest).is_some() {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            log::debug!("Evicted oldest cache entry {:?}", oldest);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn statistics(&self) -> CacheStatistics {
        CacheStatistics {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            insertions: self.counters.insertions.load(Ordering::Relaxed),
            updates: self.counters.updates.load(Ordering::Relaxed),
            rejected_incomplete: self.counters.rejected_incomplete.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::packet_wrapper::CachedDocument;
    use crate::coverage::{Coverage, DegradedReasons};
    use std::time::Duration;

    fn full_result(offset: u32) -> CachedResult {
        CachedResult {
            offset,
            total_hits: 100,
            max_rank: 1.0,
            coverage: Some(Coverage::with_nodes(10, 10, 1)),
            documents: vec![CachedDocument {
                gid: GlobalId([offset as u8; 12]),
                relevance: 1.0,
                distribution_key: 0,
                sort_data: None,
            }],
        }
    }

    fn degraded_result() -> CachedResult {
        CachedResult {
            coverage: Some(
                Coverage::with_nodes(10, 10, 1).set_degraded(DegradedReasons::MATCH_PHASE),
            ),
            ..full_result(0)
        }
    }

    fn key(tree: &str) -> (CacheKey, Query) {
        let query = Query::new(tree);
        (CacheKey::from_query(&query), query)
    }

    #[test]
    fn test_insert_then_update() {
        let cache = CacheControl::new(CacheConfig::default());
        let (key, query) = key("a");

        assert!(cache.lookup(&key, &query).is_none());
        assert!(cache.cache(&key, &query, full_result(0), Some(3)));
        assert!(!cache.cache(&key, &query, full_result(0), Some(3)));
        assert!(cache.update_cache_entry(&key, &query, full_result(1)));

        let wrapper = cache.lookup(&key, &query).unwrap();
        assert_eq!(wrapper.result_count(), 2);
        assert_eq!(wrapper.distribution_key(), Some(3));

        let stats = cache.statistics();
        assert_eq!(stats.insertions, 1);
        assert_eq!(stats.updates, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_incomplete_coverage_never_stored() {
        let cache = CacheControl::new(CacheConfig::default());
        let (key, query) = key("a");

        assert!(!cache.cache(&key, &query, degraded_result(), None));
        assert_eq!(
            cache.cache_or_update(&key, &query, degraded_result(), None),
            CacheOutcome::RejectedIncomplete
        );
        assert!(cache.is_empty());

        cache.cache(&key, &query, full_result(0), None);
        assert!(!cache.update_cache_entry(&key, &query, degraded_result()));
        assert_eq!(cache.lookup(&key, &query).unwrap().result_count(), 1);
        assert_eq!(cache.statistics().rejected_incomplete, 3);
    }

    #[test]
    fn test_no_cache_bypasses() {
        let cache = CacheControl::new(CacheConfig::default());
        let (key, mut query) = key("a");
        query.set_no_cache(true);
        assert_eq!(
            cache.cache_or_update(&key, &query, full_result(0), None),
            CacheOutcome::Bypassed
        );
        assert!(cache.is_empty());

        let disabled = CacheControl::disabled();
        let (key, query) = self::key("a");
        assert!(!disabled.cache(&key, &query, full_result(0), None));
        assert!(disabled.lookup(&key, &query).is_none());
    }

    #[test]
    fn test_expired_entries_dropped_on_lookup() {
        let cache = CacheControl::new(CacheConfig {
            time_to_live: Duration::from_millis(1),
            ..Default::default()
        });
        let (key, query) = key("a");
        cache.cache(&key, &query, full_result(0), None);
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.lookup(&key, &query).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_full_cache_evicts_oldest() {
        let cache = CacheControl::new(CacheConfig {
            max_entries: 2,
            ..Default::default()
        });
        let (first, query) = key("first");
        cache.cache(&first, &query, full_result(0), None);
        std::thread::sleep(Duration::from_millis(2));
        let (second, _) = key("second");
        cache.cache(&second, &query, full_result(0), None);
        let (third, _) = key("third");
        cache.cache(&third, &query, full_result(0), None);

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup(&first, &query).is_none());
        assert!(cache.lookup(&third, &query).is_some());
        assert_eq!(cache.statistics().evictions, 1);
    }

    #[test]
    fn test_docsums_need_an_entry() {
        let cache = CacheControl::new(CacheConfig::default());
        let (key, query) = key("a");
        let gid = GlobalId([1; 12]);
        assert_eq!(cache.add_docsums(&key, &query, "default", vec![(gid, b"{}".to_vec())]), 0);

        cache.cache(&key, &query, full_result(0), None);
        assert_eq!(cache.add_docsums(&key, &query, "default", vec![(gid, b"{}".to_vec())]), 1);
        assert!(cache
            .lookup(&key, &query)
            .unwrap()
            .docsum(&gid, "default")
            .is_some());
    }
}
