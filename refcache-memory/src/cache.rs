// Copyright 2025 refcache Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    borrow::Cow,
    fmt::Debug,
    hash::Hash,
    ops::Deref,
    sync::Arc,
    time::Instant,
};

use hashbrown::Equivalent;
use parking_lot::Mutex;
use refcache_common::{
    code::{Key, Value},
    event::{Event, EventListener},
    metrics::{model::Metrics, registry::noop::NoopMetricsRegistry, RegistryOps},
    params::{MemoryCacheParams, ParamsSupplier},
    scope::Scope,
    strict_assert, strict_assert_eq,
    trim::{SuggestedTrimStrategy, TrimStrategy, TrimType},
};

use crate::{
    error::{Error, Result},
    ghost::{LfuGhostList, MfuGhostList},
    map::CountingLruMap,
    partition::{AdaptivePartition, Segment, DEFAULT_ADAPTIVE_RATE_PROMIL, DEFAULT_LFU_FRACTION_PROMIL},
    record::{EntryStateObserver, Record},
    reference::ValueRef,
};

/// Size of a value, in the same unit as the size limits of [`MemoryCacheParams`].
pub trait Weighter<V>: Fn(&V) -> usize + Send + Sync + 'static {}
impl<V, T> Weighter<V> for T where T: Fn(&V) -> usize + Send + Sync + 'static {}

type Minted<K, V> = (Arc<Record<K, V>>, ValueRef<V>);

/// Side effects collected under the cache lock and settled after it is released.
struct Garbages<K, V>
where
    K: Key,
    V: Value,
{
    listening: bool,
    leaves: Vec<(Event, Arc<Record<K, V>>, ValueRef<V>)>,
    releases: Vec<ValueRef<V>>,
    exclusivity: Vec<(Arc<Record<K, V>>, bool)>,
}

impl<K, V> Garbages<K, V>
where
    K: Key,
    V: Value,
{
    fn new(listening: bool) -> Self {
        Self {
            listening,
            leaves: vec![],
            releases: vec![],
            exclusivity: vec![],
        }
    }

    /// Report the record leaving the cache and close the cache's reference if nobody else needs it.
    fn discard(&mut self, event: Event, record: &Arc<Record<K, V>>) {
        if self.listening {
            if let Some(value) = record.value() {
                self.leaves.push((event, record.clone(), value));
            }
        }
        self.release(record);
    }

    fn release(&mut self, record: &Arc<Record<K, V>>) {
        if let Some(value) = record.take_releasable() {
            self.releases.push(value);
        }
    }

    fn exclusivity(&mut self, record: Arc<Record<K, V>>, is_exclusive: bool) {
        self.exclusivity.push((record, is_exclusive));
    }

    fn settle(self, listener: Option<&Arc<dyn EventListener<Key = K, Value = V>>>, metrics: &Metrics) {
        if let Some(listener) = listener {
            for (event, record, value) in self.leaves {
                listener.on_leave(event, record.key(), &value);
            }
        }

        // Deallocate data out of the lock critical section.
        if !self.releases.is_empty() {
            metrics.memory_release.increase(self.releases.len() as u64);
            drop(self.releases);
        }

        for (record, is_exclusive) in self.exclusivity {
            record.notify_exclusivity(is_exclusive);
        }
    }
}

pub(crate) struct CacheState<K, V>
where
    K: Key,
    V: Value,
{
    pub(crate) cached: CountingLruMap<K, Arc<Record<K, V>>>,
    pub(crate) lfu: CountingLruMap<K, Arc<Record<K, V>>>,
    pub(crate) mfu: CountingLruMap<K, Arc<Record<K, V>>>,
    pub(crate) lfu_ghosts: LfuGhostList<K>,
    pub(crate) mfu_ghosts: MfuGhostList<K>,
    pub(crate) partition: AdaptivePartition,
    pub(crate) params: MemoryCacheParams,
    last_params_check: Instant,
    frequently_used_threshold: u32,
    metrics: Arc<Metrics>,
}

impl<K, V> CacheState<K, V>
where
    K: Key,
    V: Value,
{
    pub(crate) fn in_use_count(&self) -> usize {
        let exclusive = self.lfu.count() + self.mfu.count();
        strict_assert!(self.cached.count() >= exclusive);
        self.cached.count() - exclusive
    }

    pub(crate) fn in_use_size(&self) -> usize {
        let exclusive = self.lfu.size() + self.mfu.size();
        strict_assert!(self.cached.size() >= exclusive);
        self.cached.size() - exclusive
    }

    fn can_admit(&self, weight: usize) -> bool {
        weight <= self.params.max_cache_entry_size
            && self.in_use_count() < self.params.max_cache_entries
            && self
                .in_use_size()
                .checked_add(weight)
                .is_some_and(|size| size <= self.params.max_cache_size)
    }

    fn remove_from_exclusives<Q>(&mut self, key: &Q) -> Option<Arc<Record<K, V>>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let lfu = self.lfu.remove(key);
        let mfu = self.mfu.remove(key);
        assert!(lfu.is_none() || mfu.is_none(), "key found in both exclusive segments");
        let record = lfu.or(mfu)?;
        record.set_segment(None);
        Some(record)
    }

    fn maybe_add_to_exclusives(&mut self, record: &Arc<Record<K, V>>) -> bool {
        if record.is_orphan() || record.client_count() > 0 {
            return false;
        }
        let segment = if record.access_count() > self.frequently_used_threshold {
            Segment::Mfu
        } else {
            Segment::Lfu
        };
        let map = match segment {
            Segment::Lfu => &mut self.lfu,
            Segment::Mfu => &mut self.mfu,
        };
        map.put(record.key().clone(), record.clone(), record.weight());
        record.set_segment(Some(segment));
        true
    }

    fn mint(&self, record: &Arc<Record<K, V>>) -> Option<ValueRef<V>> {
        let value = record.value()?;
        record.inc_clients();
        record.inc_access();
        Some(value)
    }

    fn report_usage(&self) {
        self.metrics.memory_usage.absolute(self.cached.size() as u64);
    }

    /// Returns `true` if the params are due for a refresh, and claims the refresh for the caller.
    fn claim_params_check(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_params_check) < self.params.params_check_interval {
            return false;
        }
        self.last_params_check = now;
        true
    }

    fn cache(
        &mut self,
        key: K,
        value: ValueRef<V>,
        weight: usize,
        observer: Option<Arc<dyn EntryStateObserver<K>>>,
        garbages: &mut Garbages<K, V>,
    ) -> Option<Minted<K, V>> {
        if let Some(exclusive) = self.remove_from_exclusives(&key) {
            garbages.exclusivity(exclusive, false);
        }

        if let Some(old) = self.cached.remove(&key) {
            old.set_orphan();
            garbages.discard(Event::Replace, &old);
            self.metrics.memory_replace.increase(1);
        }

        if !self.can_admit(weight) {
            tracing::trace!(
                "[cache]: reject (key: {:?}, weight: {}), in use: {} entries, {} bytes",
                key,
                weight,
                self.in_use_count(),
                self.in_use_size()
            );
            garbages.releases.push(value);
            self.report_usage();
            return None;
        }

        // Restore the access count of a recent LFU victim. The ghost stays.
        let access_count = self.lfu_ghosts.get(&key).unwrap_or(0);
        let record = Arc::new(Record::new(key.clone(), value, weight, access_count, observer));
        self.cached.put(key, record.clone(), weight);
        self.metrics.memory_insert.increase(1);
        self.report_usage();

        let value = self.mint(&record)?;
        Some((record, value))
    }

    fn get<Q>(&mut self, key: &Q, garbages: &mut Garbages<K, V>) -> Option<Minted<K, V>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        if let Some(exclusive) = self.remove_from_exclusives(key) {
            garbages.exclusivity(exclusive, false);
        }

        match self.cached.get(key).cloned() {
            Some(record) => {
                self.metrics.memory_hit.increase(1);
                let value = self.mint(&record)?;
                Some((record, value))
            }
            None => {
                self.metrics.memory_miss.increase(1);
                self.partition.on_miss(key, &mut self.lfu_ghosts, &self.mfu_ghosts);
                self.metrics
                    .memory_lfu_fraction
                    .absolute(self.partition.lfu_fraction_promil() as u64);
                None
            }
        }
    }

    fn probe<Q>(&mut self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let Some(record) = self.remove_from_exclusives(key) else {
            return false;
        };
        record.inc_access();
        let readded = self.maybe_add_to_exclusives(&record);
        strict_assert!(readded);
        self.metrics.memory_probe.increase(1);
        true
    }

    fn reuse<Q>(&mut self, key: &Q, garbages: &mut Garbages<K, V>) -> Option<ValueRef<V>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let exclusive = self.remove_from_exclusives(key)?;
        let record = self.cached.remove(key);
        strict_assert!(record.as_ref().is_some_and(|record| Arc::ptr_eq(record, &exclusive)));
        assert_eq!(exclusive.client_count(), 0, "reuse of a client-held entry");

        exclusive.set_orphan();
        if garbages.listening {
            if let Some(value) = exclusive.value() {
                garbages.leaves.push((Event::Remove, exclusive.clone(), value));
            }
        }
        let value = exclusive.take_value();
        garbages.exclusivity(exclusive, false);

        self.metrics.memory_reuse.increase(1);
        self.report_usage();
        value
    }

    fn release_client(&mut self, record: &Arc<Record<K, V>>, garbages: &mut Garbages<K, V>) {
        record.dec_clients();
        if self.maybe_add_to_exclusives(record) {
            garbages.exclusivity(record.clone(), true);
        }
        garbages.release(record);
    }

    fn remove_all(&mut self, predicate: impl Fn(&K) -> bool, garbages: &mut Garbages<K, V>) -> usize {
        for (_, record) in self.lfu.remove_all(&predicate) {
            record.set_segment(None);
            garbages.exclusivity(record, false);
        }
        for (_, record) in self.mfu.remove_all(&predicate) {
            record.set_segment(None);
            garbages.exclusivity(record, false);
        }

        let removed = self.cached.remove_all(&predicate);
        for (_, record) in removed.iter() {
            record.set_orphan();
            garbages.discard(Event::Remove, record);
        }
        self.metrics.memory_remove.increase(removed.len() as u64);
        self.report_usage();
        removed.len()
    }

    fn clear(&mut self, garbages: &mut Garbages<K, V>) {
        for (_, record) in self.lfu.clear().into_iter().chain(self.mfu.clear()) {
            record.set_segment(None);
            garbages.exclusivity(record, false);
        }

        let cleared = self.cached.clear();
        for (_, record) in cleared.iter() {
            record.set_orphan();
            garbages.discard(Event::Clear, record);
        }
        self.metrics.memory_remove.increase(cleared.len() as u64);
        self.report_usage();
    }

    fn trim(&mut self, ratio: f64, garbages: &mut Garbages<K, V>) {
        let target_cache_size = (self.cached.size() as f64 * (1.0 - ratio)) as usize;
        let target_queue_size = target_cache_size.saturating_sub(self.in_use_size());
        let mfu_size = self.mfu.size();

        // MFU is kept as is and LFU takes the cut. A target below the MFU size is taken from MFU alone.
        let (lfu_target, mfu_target) = if target_queue_size < mfu_size {
            (usize::MAX, target_queue_size)
        } else {
            (target_queue_size - mfu_size, mfu_size)
        };

        tracing::debug!(
            "[cache]: trim (ratio: {}), cache: {} => {} bytes, lfu target: {}, mfu target: {}",
            ratio,
            self.cached.size(),
            target_cache_size,
            lfu_target,
            mfu_target
        );

        self.trim_exclusives(Segment::Lfu, usize::MAX, lfu_target, garbages);
        self.trim_exclusives(Segment::Mfu, usize::MAX, mfu_target, garbages);
        self.report_usage();
    }

    fn evict(&mut self, garbages: &mut Garbages<K, V>) {
        let max_count = self
            .params
            .max_eviction_queue_entries
            .min(self.params.max_cache_entries.saturating_sub(self.in_use_count()));
        let max_size = self
            .params
            .max_eviction_queue_size
            .min(self.params.max_cache_size.saturating_sub(self.in_use_size()));
        let budget = self.partition.split(max_count, max_size);

        self.trim_exclusives(Segment::Lfu, budget.lfu_count, budget.lfu_size, garbages);
        self.trim_exclusives(Segment::Mfu, budget.mfu_count, budget.mfu_size, garbages);
        self.report_usage();
    }

    /// Evict the oldest entries of `segment` until it fits in both limits.
    fn trim_exclusives(&mut self, segment: Segment, count: usize, size: usize, garbages: &mut Garbages<K, V>) {
        let map = match segment {
            Segment::Lfu => &mut self.lfu,
            Segment::Mfu => &mut self.mfu,
        };

        while map.count() > count || map.size() > size {
            let Some((key, record)) = map.pop_first() else {
                break;
            };
            strict_assert_eq!(record.client_count(), 0);
            record.set_segment(None);

            match segment {
                Segment::Lfu => self.lfu_ghosts.add(key.clone(), record.access_count()),
                Segment::Mfu => self.mfu_ghosts.add(key.clone()),
            }

            let cached = self.cached.remove(&key);
            strict_assert!(cached.as_ref().is_some_and(|cached| Arc::ptr_eq(cached, &record)));

            tracing::trace!("[cache]: evict (key: {:?}) from {:?}", key, segment);

            record.set_orphan();
            garbages.discard(Event::Evict, &record);
            garbages.exclusivity(record, false);
            self.metrics.memory_evict.increase(1);
        }
    }
}

pub(crate) struct CacheInner<K, V>
where
    K: Key,
    V: Value,
{
    pub(crate) state: Mutex<CacheState<K, V>>,
    weighter: Arc<dyn Weighter<V>>,
    trim_strategy: Arc<dyn TrimStrategy>,
    params_supplier: Arc<dyn ParamsSupplier>,
    event_listener: Option<Arc<dyn EventListener<Key = K, Value = V>>>,
    metrics: Arc<Metrics>,
    name: Cow<'static, str>,
}

impl<K, V> CacheInner<K, V>
where
    K: Key,
    V: Value,
{
    fn garbages(&self) -> Garbages<K, V> {
        Garbages::new(self.event_listener.is_some())
    }

    fn settle(&self, garbages: Garbages<K, V>) {
        garbages.settle(self.event_listener.as_ref(), &self.metrics);
    }

    fn maybe_update_params(&self) {
        let stale = self
            .state
            .lock()
            .with(|mut state| state.claim_params_check(Instant::now()));
        if !stale {
            return;
        }

        // Query the supplier out of the lock critical section.
        let params = self.params_supplier.get();
        tracing::debug!("[cache]: refresh params of cache {}: {:?}", self.name, params);
        self.state.lock().params = params;
    }

    fn maybe_evict(&self) {
        let mut garbages = self.garbages();
        self.state.lock().with(|mut state| state.evict(&mut garbages));
        self.settle(garbages);
    }

    fn release_client(&self, record: &Arc<Record<K, V>>) {
        let mut garbages = self.garbages();
        self.state
            .lock()
            .with(|mut state| state.release_client(record, &mut garbages));
        self.settle(garbages);
        self.maybe_update_params();
        self.maybe_evict();
    }

    fn clear(&self) {
        let mut garbages = self.garbages();
        self.state.lock().with(|mut state| state.clear(&mut garbages));
        self.settle(garbages);
    }
}

impl<K, V> Drop for CacheInner<K, V>
where
    K: Key,
    V: Value,
{
    fn drop(&mut self) {
        self.clear();
    }
}

/// Adaptive, reference-counted in-memory cache.
///
/// Every cached entry is either shared, when at least one [`CacheEntry`] handle is alive, or exclusive, when the
/// cache is its only holder. Exclusive entries wait for eviction in one of two LRU segments: LFU for entries accessed
/// at most `frequently_used_threshold` times, and MFU for the others. The eviction queue budget is split between the
/// two segments by a fraction that adapts on misses of recently evicted keys.
///
/// Values are released and observers are notified out of the lock critical section.
pub struct Cache<K, V>
where
    K: Key,
    V: Value,
{
    pub(crate) inner: Arc<CacheInner<K, V>>,
}

impl<K, V> Clone for Cache<K, V>
where
    K: Key,
    V: Value,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> Debug for Cache<K, V>
where
    K: Key,
    V: Value,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.report())
    }
}

impl<K, V> Cache<K, V>
where
    K: Key,
    V: Value,
{
    /// Cache `value` under `key`, replacing any entry cached under the same key.
    ///
    /// Returns a client handle to the new entry, or `None` if the value does not fit the in-use limits. A rejected
    /// value is closed.
    pub fn cache(&self, key: K, value: ValueRef<V>) -> Option<CacheEntry<K, V>> {
        self.cache_inner(key, value, None)
    }

    /// Like [`Cache::cache`], and report the exclusivity changes of the new entry to `observer`.
    pub fn cache_with_observer(
        &self,
        key: K,
        value: ValueRef<V>,
        observer: Arc<dyn EntryStateObserver<K>>,
    ) -> Option<CacheEntry<K, V>> {
        self.cache_inner(key, value, Some(observer))
    }

    fn cache_inner(
        &self,
        key: K,
        value: ValueRef<V>,
        observer: Option<Arc<dyn EntryStateObserver<K>>>,
    ) -> Option<CacheEntry<K, V>> {
        self.inner.maybe_update_params();

        let weight = (self.inner.weighter)(&value);
        let mut garbages = self.inner.garbages();
        let minted = self
            .inner
            .state
            .lock()
            .with(|mut state| state.cache(key, value, weight, observer, &mut garbages));
        self.inner.settle(garbages);

        self.inner.maybe_evict();

        minted.map(|(record, value)| CacheEntry {
            inner: self.inner.clone(),
            record,
            value,
        })
    }

    /// Get a client handle to the entry of `key`.
    ///
    /// A miss feeds the adaptive partition.
    pub fn get<Q>(&self, key: &Q) -> Option<CacheEntry<K, V>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let mut garbages = self.inner.garbages();
        let minted = self.inner.state.lock().with(|mut state| state.get(key, &mut garbages));
        self.inner.settle(garbages);

        self.inner.maybe_update_params();
        self.inner.maybe_evict();

        minted.map(|(record, value)| CacheEntry {
            inner: self.inner.clone(),
            record,
            value,
        })
    }

    /// Count an access to the exclusive entry of `key` without handing out a client handle.
    ///
    /// The entry moves to the newest position of its segment, or to MFU if the access makes it frequently used.
    /// Returns `false` if `key` has no exclusive entry.
    pub fn probe<Q>(&self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.inner.state.lock().with(|mut state| state.probe(key))
    }

    /// Take the value of the exclusive entry of `key` out of the cache.
    ///
    /// The caller receives the cache's own reference. Returns `None` if `key` has no exclusive entry.
    pub fn reuse<Q>(&self, key: &Q) -> Option<ValueRef<V>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let mut garbages = self.inner.garbages();
        let value = self.inner.state.lock().with(|mut state| state.reuse(key, &mut garbages));
        self.inner.settle(garbages);
        value
    }

    /// Remove all entries whose key matches `predicate`.
    ///
    /// Values of entries still held by clients are released when the last client handle is dropped. Returns the
    /// count of removed entries.
    pub fn remove_all(&self, predicate: impl Fn(&K) -> bool) -> usize {
        let mut garbages = self.inner.garbages();
        let removed = self
            .inner
            .state
            .lock()
            .with(|mut state| state.remove_all(predicate, &mut garbages));
        self.inner.settle(garbages);

        self.inner.maybe_update_params();
        self.inner.maybe_evict();
        removed
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.inner.clear();
        self.inner.maybe_update_params();
    }

    /// Returns `true` if an entry is cached under `key`.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.inner.state.lock().cached.contains(key)
    }

    /// Returns `true` if any cached key matches `predicate`.
    pub fn contains_matching(&self, predicate: impl Fn(&K) -> bool) -> bool {
        self.inner.state.lock().cached.keys().any(predicate)
    }

    /// Evict exclusive entries in response to memory pressure.
    ///
    /// The trim strategy maps `trim_type` to the share of the cache size to drop. Entries held by clients are never
    /// evicted.
    pub fn trim(&self, trim_type: TrimType) {
        let ratio = self.inner.trim_strategy.trim_ratio(trim_type);
        let ratio = if (0.0..=1.0).contains(&ratio) {
            ratio
        } else {
            let clamped = if ratio > 1.0 { 1.0 } else { 0.0 };
            tracing::warn!(
                "[cache]: trim ratio {} of {:?} out of [0, 1], clamp to {}",
                ratio,
                trim_type,
                clamped
            );
            clamped
        };

        self.inner.metrics.memory_trim.increase(1);

        let mut garbages = self.inner.garbages();
        self.inner
            .state
            .lock()
            .with(|mut state| state.trim(ratio, &mut garbages));
        self.inner.settle(garbages);

        self.inner.maybe_update_params();
        self.inner.maybe_evict();
    }

    /// Count of all cached entries.
    pub fn count(&self) -> usize {
        self.inner.state.lock().cached.count()
    }

    /// Total size of all cached entries.
    pub fn size(&self) -> usize {
        self.inner.state.lock().cached.size()
    }

    /// Count of the entries held by clients.
    pub fn in_use_count(&self) -> usize {
        self.inner.state.lock().in_use_count()
    }

    /// Total size of the entries held by clients.
    pub fn in_use_size(&self) -> usize {
        self.inner.state.lock().in_use_size()
    }

    /// Count of the exclusive entries.
    pub fn eviction_queue_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .with(|state| state.lfu.count() + state.mfu.count())
    }

    /// Total size of the exclusive entries.
    pub fn eviction_queue_size(&self) -> usize {
        self.inner.state.lock().with(|state| state.lfu.size() + state.mfu.size())
    }

    /// Current LFU share of the eviction queue budget, in promille.
    pub fn lfu_fraction_promil(&self) -> u32 {
        self.inner.state.lock().partition.lfu_fraction_promil()
    }

    /// Capacity params in effect.
    pub fn params(&self) -> MemoryCacheParams {
        self.inner.state.lock().params
    }

    /// Name of the cache, used as the metrics label.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// One-line summary of the cache content.
    pub fn report(&self) -> String {
        self.inner.state.lock().with(|state| {
            format!(
                "CountingMemoryCache {{ cached_entries_count: {}, exclusive_entries_count: {} }}",
                state.cached.count(),
                state.lfu.count() + state.mfu.count()
            )
        })
    }
}

/// Client handle to a cached entry.
///
/// The entry stays out of the eviction queue while any handle is alive. Cloning adds a client without counting an
/// access, and dropping the last handle makes the entry exclusive again (or releases it, if it was removed from the
/// cache in the meantime).
pub struct CacheEntry<K, V>
where
    K: Key,
    V: Value,
{
    inner: Arc<CacheInner<K, V>>,
    record: Arc<Record<K, V>>,
    value: ValueRef<V>,
}

impl<K, V> Debug for CacheEntry<K, V>
where
    K: Key,
    V: Value,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry").field("record", &self.record).finish()
    }
}

impl<K, V> Drop for CacheEntry<K, V>
where
    K: Key,
    V: Value,
{
    fn drop(&mut self) {
        self.inner.release_client(&self.record);
    }
}

impl<K, V> Clone for CacheEntry<K, V>
where
    K: Key,
    V: Value,
{
    fn clone(&self) -> Self {
        self.inner.state.lock().with(|_| self.record.inc_clients());
        Self {
            inner: self.inner.clone(),
            record: self.record.clone(),
            value: self.value.clone(),
        }
    }
}

impl<K, V> Deref for CacheEntry<K, V>
where
    K: Key,
    V: Value,
{
    type Target = V;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<K, V> CacheEntry<K, V>
where
    K: Key,
    V: Value,
{
    /// Key of the entry.
    pub fn key(&self) -> &K {
        self.record.key()
    }

    /// Value of the entry.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Weight of the entry.
    pub fn weight(&self) -> usize {
        self.record.weight()
    }

    /// Count of the client handles of the entry, this one included.
    pub fn client_count(&self) -> u32 {
        self.record.client_count()
    }

    /// Count of the accesses of the entry.
    pub fn access_count(&self) -> u32 {
        self.record.access_count()
    }

    /// Returns `true` if the entry is no longer tracked by the cache.
    pub fn is_orphan(&self) -> bool {
        self.record.is_orphan()
    }
}

/// Builder of [`Cache`].
pub struct CacheBuilder<K, V>
where
    K: Key,
    V: Value,
{
    name: Cow<'static, str>,
    params_supplier: Option<Arc<dyn ParamsSupplier>>,
    weighter: Arc<dyn Weighter<V>>,
    trim_strategy: Arc<dyn TrimStrategy>,
    adaptive_rate_promil: u32,
    frequently_used_threshold: u32,
    ghost_list_max_size: usize,
    lfu_fraction_promil: u32,
    event_listener: Option<Arc<dyn EventListener<Key = K, Value = V>>>,
    registry: Box<dyn RegistryOps>,
}

impl<K, V> Default for CacheBuilder<K, V>
where
    K: Key,
    V: Value,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> CacheBuilder<K, V>
where
    K: Key,
    V: Value,
{
    /// Create a builder with the default tunables. The params supplier must be set before building.
    pub fn new() -> Self {
        Self {
            name: "refcache".into(),
            params_supplier: None,
            weighter: Arc::new(|_: &V| 1usize),
            trim_strategy: Arc::new(SuggestedTrimStrategy),
            adaptive_rate_promil: DEFAULT_ADAPTIVE_RATE_PROMIL,
            frequently_used_threshold: 1,
            ghost_list_max_size: 100,
            lfu_fraction_promil: DEFAULT_LFU_FRACTION_PROMIL,
            event_listener: None,
            registry: Box::new(NoopMetricsRegistry),
        }
    }

    /// Set the name of the cache. The name is used as the metrics label.
    ///
    /// The default value is "refcache".
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the supplier of the capacity params. Required.
    ///
    /// The supplier is polled again once the `params_check_interval` of the last params has elapsed.
    pub fn with_params_supplier(mut self, params_supplier: impl ParamsSupplier) -> Self {
        self.params_supplier = Some(Arc::new(params_supplier));
        self
    }

    /// Set the weighter of the values.
    ///
    /// The default weighter weighs every value as 1.
    pub fn with_weighter(mut self, weighter: impl Weighter<V>) -> Self {
        self.weighter = Arc::new(weighter);
        self
    }

    /// Set the strategy mapping a trim signal to the share of the cache to drop.
    pub fn with_trim_strategy(mut self, trim_strategy: impl TrimStrategy) -> Self {
        self.trim_strategy = Arc::new(trim_strategy);
        self
    }

    /// Set the step of each adjustment of the LFU fraction, in (0, 1000) promille.
    ///
    /// The default value is 10.
    pub fn with_adaptive_rate_promil(mut self, adaptive_rate_promil: u32) -> Self {
        self.adaptive_rate_promil = adaptive_rate_promil;
        self
    }

    /// Set the access count above which a released entry is queued in the MFU segment.
    ///
    /// The default value is 1.
    pub fn with_frequently_used_threshold(mut self, frequently_used_threshold: u32) -> Self {
        self.frequently_used_threshold = frequently_used_threshold;
        self
    }

    /// Set the capacity of each ghost list. 0 disables the adaptation of the LFU fraction.
    ///
    /// The default value is 100.
    pub fn with_ghost_list_max_size(mut self, ghost_list_max_size: usize) -> Self {
        self.ghost_list_max_size = ghost_list_max_size;
        self
    }

    /// Set the initial LFU share of the eviction queue, in [100, 900] promille.
    ///
    /// The default value is 500.
    pub fn with_lfu_fraction_promil(mut self, lfu_fraction_promil: u32) -> Self {
        self.lfu_fraction_promil = lfu_fraction_promil;
        self
    }

    /// Set the listener of entries leaving the cache.
    pub fn with_event_listener(mut self, event_listener: Arc<dyn EventListener<Key = K, Value = V>>) -> Self {
        self.event_listener = Some(event_listener);
        self
    }

    /// Set the metrics registry.
    ///
    /// The default registry drops all metrics.
    pub fn with_metrics_registry(mut self, registry: impl RegistryOps) -> Self {
        self.registry = Box::new(registry);
        self
    }

    /// Build the cache.
    pub fn build(self) -> Result<Cache<K, V>> {
        let params_supplier = self
            .params_supplier
            .ok_or_else(|| Error::ConfigError("params supplier must be set".to_string()))?;
        let params = params_supplier.get();

        let metrics = Arc::new(Metrics::new(self.name.clone(), self.registry.as_ref()));
        let partition = AdaptivePartition::new(self.lfu_fraction_promil, self.adaptive_rate_promil);
        metrics
            .memory_lfu_fraction
            .absolute(partition.lfu_fraction_promil() as u64);

        tracing::debug!(
            "[cache]: create cache {} (lfu: {}, rate: {}, threshold: {}, ghosts: {}) with params: {:?}",
            self.name,
            partition.lfu_fraction_promil(),
            partition.adaptive_rate_promil(),
            self.frequently_used_threshold,
            self.ghost_list_max_size,
            params
        );

        let state = CacheState {
            cached: CountingLruMap::new(),
            lfu: CountingLruMap::new(),
            mfu: CountingLruMap::new(),
            lfu_ghosts: LfuGhostList::new(self.ghost_list_max_size),
            mfu_ghosts: MfuGhostList::new(self.ghost_list_max_size),
            partition,
            params,
            last_params_check: Instant::now(),
            frequently_used_threshold: self.frequently_used_threshold,
            metrics: metrics.clone(),
        };

        let inner = CacheInner {
            state: Mutex::new(state),
            weighter: self.weighter,
            trim_strategy: self.trim_strategy,
            params_supplier,
            event_listener: self.event_listener,
            metrics,
            name: self.name,
        };

        Ok(Cache { inner: Arc::new(inner) })
    }
}
