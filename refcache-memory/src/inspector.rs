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

//! Read-only snapshots of the cache content.

use std::{fmt::Debug, sync::Arc};

use refcache_common::{
    code::{Key, Value},
    params::MemoryCacheParams,
    scope::Scope,
};

use crate::{cache::Cache, map::CountingLruMap, record::Record, reference::ValueRef};

/// An entry captured by [`Cache::inspect`].
///
/// The snapshot holds its own reference to the value, so the value outlives its eviction until the snapshot is
/// dropped.
pub struct SnapshotEntry<K, V>
where
    K: Key,
    V: Value,
{
    /// Key of the entry.
    pub key: K,
    /// Reference to the value of the entry.
    pub value: ValueRef<V>,
    /// Weight of the entry.
    pub weight: usize,
    /// Count of the client handles at capture time.
    pub client_count: u32,
    /// Count of the accesses at capture time.
    pub access_count: u32,
}

impl<K, V> Debug for SnapshotEntry<K, V>
where
    K: Key,
    V: Value,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotEntry")
            .field("key", &self.key)
            .field("weight", &self.weight)
            .field("client_count", &self.client_count)
            .field("access_count", &self.access_count)
            .finish()
    }
}

/// Consistent view of the cache, captured under a single lock critical section.
///
/// Entry lists are ordered from the oldest to the newest.
#[derive(Debug)]
pub struct CacheSnapshot<K, V>
where
    K: Key,
    V: Value,
{
    /// Capacity params in effect.
    pub params: MemoryCacheParams,
    /// LFU share of the eviction queue budget, in promille.
    pub lfu_fraction_promil: u32,
    /// Count of all cached entries.
    pub count: usize,
    /// Total size of all cached entries.
    pub size: usize,
    /// Count of the exclusive entries.
    pub eviction_queue_count: usize,
    /// Total size of the exclusive entries.
    pub eviction_queue_size: usize,
    /// Entries held by at least one client.
    pub shared_entries: Vec<SnapshotEntry<K, V>>,
    /// Exclusive entries queued in the LFU segment.
    pub lfu_exclusive_entries: Vec<SnapshotEntry<K, V>>,
    /// Exclusive entries queued in the MFU segment.
    pub mfu_exclusive_entries: Vec<SnapshotEntry<K, V>>,
}

fn capture<K, V>(
    map: &CountingLruMap<K, Arc<Record<K, V>>>,
    filter: impl Fn(&Record<K, V>) -> bool,
) -> Vec<SnapshotEntry<K, V>>
where
    K: Key,
    V: Value,
{
    map.iter()
        .filter(|(_, record)| filter(record))
        .filter_map(|(key, record)| {
            record.value().map(|value| SnapshotEntry {
                key: key.clone(),
                value,
                weight: record.weight(),
                client_count: record.client_count(),
                access_count: record.access_count(),
            })
        })
        .collect()
}

impl<K, V> Cache<K, V>
where
    K: Key,
    V: Value,
{
    /// Capture the content of the cache without touching its state.
    pub fn inspect(&self) -> CacheSnapshot<K, V> {
        self.inner.state.lock().with(|state| CacheSnapshot {
            params: state.params,
            lfu_fraction_promil: state.partition.lfu_fraction_promil(),
            count: state.cached.count(),
            size: state.cached.size(),
            eviction_queue_count: state.lfu.count() + state.mfu.count(),
            eviction_queue_size: state.lfu.size() + state.mfu.size(),
            shared_entries: capture(&state.cached, |record| record.segment().is_none()),
            lfu_exclusive_entries: capture(&state.lfu, |_| true),
            mfu_exclusive_entries: capture(&state.mfu, |_| true),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use itertools::Itertools;

    use super::*;
    use crate::{cache::CacheBuilder, test_utils::Recorder};

    fn keys(entries: &[SnapshotEntry<u64, usize>]) -> Vec<u64> {
        entries.iter().map(|entry| entry.key).collect_vec()
    }

    fn cache_for_test() -> Cache<u64, usize> {
        CacheBuilder::new()
            .with_params_supplier(MemoryCacheParams {
                max_cache_size: 1000,
                max_cache_entries: 10,
                max_eviction_queue_size: 1000,
                max_eviction_queue_entries: 10,
                max_cache_entry_size: 1000,
                params_check_interval: Duration::from_secs(60),
            })
            .with_weighter(|v: &usize| *v)
            .build()
            .unwrap()
    }

    #[test]
    fn test_inspect_empty() {
        let snapshot = cache_for_test().inspect();
        assert_eq!((snapshot.count, snapshot.size), (0, 0));
        assert_eq!(snapshot.lfu_fraction_promil, 500);
        assert!(snapshot.shared_entries.is_empty());
        assert!(snapshot.lfu_exclusive_entries.is_empty());
        assert!(snapshot.mfu_exclusive_entries.is_empty());
    }

    #[test]
    fn test_inspect_partitions_entries() {
        let recorder = Recorder::default();
        let cache = cache_for_test();

        let e1 = cache.cache(1, recorder.value(10)).unwrap();
        let _e1b = e1.clone();
        drop(cache.cache(2, recorder.value(20)).unwrap());
        let e3 = cache.cache(3, recorder.value(30)).unwrap();
        drop(cache.get(&3u64).unwrap());
        drop(e3);

        let snapshot = cache.inspect();
        assert_eq!((snapshot.count, snapshot.size), (3, 60));
        assert_eq!((snapshot.eviction_queue_count, snapshot.eviction_queue_size), (2, 50));
        assert_eq!(keys(&snapshot.shared_entries), vec![1]);
        assert_eq!(keys(&snapshot.lfu_exclusive_entries), vec![2]);
        assert_eq!(keys(&snapshot.mfu_exclusive_entries), vec![3]);

        let shared = &snapshot.shared_entries[0];
        assert_eq!(*shared.value, 10);
        assert_eq!(shared.weight, 10);
        assert_eq!(shared.client_count, 2);
        assert_eq!(shared.access_count, 1);
        assert_eq!(snapshot.mfu_exclusive_entries[0].access_count, 2);
        assert_eq!(snapshot.mfu_exclusive_entries[0].client_count, 0);
    }

    #[test]
    fn test_inspect_does_not_touch_state() {
        let recorder = Recorder::default();
        let cache = cache_for_test();
        for i in 0..3u64 {
            drop(cache.cache(i, recorder.value(10)).unwrap());
        }
        let order = cache.inner.state.lock().lfu.keys().copied().collect_vec();

        let snapshot = cache.inspect();
        assert_eq!(keys(&snapshot.lfu_exclusive_entries), order);
        assert_eq!(cache.inner.state.lock().lfu.keys().copied().collect_vec(), order);
        assert_eq!(cache.eviction_queue_count(), 3);
        assert!(snapshot.lfu_exclusive_entries.iter().all(|entry| entry.access_count == 1));
    }

    #[test]
    fn test_snapshot_keeps_values_alive() {
        let recorder = Recorder::default();
        let cache = cache_for_test();
        drop(cache.cache(1, recorder.value(10)).unwrap());

        let snapshot = cache.inspect();
        cache.clear();
        assert!(recorder.released().is_empty());

        drop(snapshot);
        assert_eq!(recorder.released(), vec![10]);
    }
}
