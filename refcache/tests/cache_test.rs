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

//! Behavior tests for the adaptive cache through the public API.

use std::{collections::HashSet, sync::Arc, time::Duration};

use itertools::Itertools;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use parking_lot::Mutex;
use refcache::{
    Cache, CacheBuilder, CacheEntry, Event, EventListener, FixedTrimStrategy, MemoryCacheParams, TrimType, ValueRef,
};
use refcache_memory::test_utils::{EventRecorder, Recorder};

fn params(max_cache_size: usize, max_cache_entries: usize, max_cache_entry_size: usize) -> MemoryCacheParams {
    MemoryCacheParams {
        max_cache_size,
        max_cache_entries,
        max_eviction_queue_size: max_cache_size,
        max_eviction_queue_entries: max_cache_entries,
        max_cache_entry_size,
        params_check_interval: MemoryCacheParams::DEFAULT_CHECK_INTERVAL,
    }
}

fn weighted(params: MemoryCacheParams) -> CacheBuilder<&'static str, usize> {
    CacheBuilder::new()
        .with_params_supplier(params)
        .with_weighter(|v: &usize| *v)
}

#[test_log::test]
fn test_basic_cache_and_evict() {
    let recorder = Recorder::default();
    let cache = weighted(params(1000, 2, 1000)).build().unwrap();

    drop(cache.cache("a", recorder.value(100)).unwrap());
    assert_eq!(cache.eviction_queue_count(), 1);
    drop(cache.cache("b", recorder.value(100)).unwrap());
    let c = cache.cache("c", recorder.value(100)).unwrap();

    assert!(!cache.contains("a"));
    assert!(cache.contains("c"));
    assert!(recorder.released().contains(&100));
    assert_eq!(*c, 100);
}

#[test]
fn test_admission_rejection() {
    let recorder = Recorder::default();
    let cache = weighted(params(1000, 10, 50)).build().unwrap();

    assert!(cache.cache("big", recorder.value(100)).is_none());
    assert!(!cache.contains("big"));
    assert_eq!(cache.count(), 0);
    assert_eq!(recorder.released(), vec![100]);
}

#[test]
fn test_trim_takes_small_cut_from_mfu() {
    let recorder = Recorder::default();
    let cache = weighted(params(1000, 10, 1000))
        .with_trim_strategy(FixedTrimStrategy(0.5))
        .build()
        .unwrap();

    drop(cache.cache("a", recorder.value(10)).unwrap());
    for key in ["b", "c"] {
        let first = cache.cache(key, recorder.value(40)).unwrap();
        drop(cache.get(key).unwrap());
        drop(first);
    }
    let before = cache.inspect();
    assert_eq!(before.lfu_exclusive_entries.len(), 1);
    assert_eq!(before.mfu_exclusive_entries.len(), 2);
    drop(before);

    cache.trim(TrimType::CloseToHeapLimit);

    let after = cache.inspect();
    assert_eq!(after.lfu_exclusive_entries.len(), 1);
    assert_eq!(after.mfu_exclusive_entries.len(), 1);
    assert_eq!(after.mfu_exclusive_entries[0].key, "c");
    assert_eq!(recorder.released(), vec![40]);
}

#[test]
fn test_fraction_increases_on_lfu_ghost_hit() {
    let recorder = Recorder::default();
    let cache = weighted(params(1000, 1, 1000))
        .with_lfu_fraction_promil(500)
        .with_adaptive_rate_promil(10)
        .with_ghost_list_max_size(5)
        .build()
        .unwrap();

    drop(cache.cache("x", recorder.value(1)).unwrap());
    let _y = cache.cache("y", recorder.value(1)).unwrap();
    assert!(!cache.contains("x"));

    assert!(cache.get("x").is_none());
    assert_eq!(cache.lfu_fraction_promil(), 510);
}

#[test]
fn test_ghost_list_disabled_keeps_fraction() {
    let recorder = Recorder::default();
    let cache = weighted(params(1000, 1, 1000))
        .with_ghost_list_max_size(0)
        .build()
        .unwrap();

    drop(cache.cache("x", recorder.value(1)).unwrap());
    let _y = cache.cache("y", recorder.value(1)).unwrap();
    for _ in 0..10 {
        assert!(cache.get("x").is_none());
    }
    assert_eq!(cache.lfu_fraction_promil(), 500);
}

#[test]
fn test_value_outlives_replacement_while_held() {
    let recorder = Recorder::default();
    let cache = weighted(params(1000, 10, 1000)).build().unwrap();

    let old = cache.cache("k", recorder.value(1)).unwrap();
    let new = cache.cache("k", recorder.value(2)).unwrap();
    assert!(old.is_orphan());
    assert!(!new.is_orphan());
    assert_eq!((*old, *new), (1, 2));
    assert!(recorder.released().is_empty());

    let again = old.clone();
    drop(old);
    assert!(recorder.released().is_empty());
    drop(again);
    assert_eq!(recorder.released(), vec![1]);
}

#[derive(Debug, Default)]
struct LeaveCounter {
    evicted: Mutex<Vec<&'static str>>,
}

impl EventListener for LeaveCounter {
    type Key = &'static str;
    type Value = usize;

    fn on_leave(&self, reason: Event, key: &Self::Key, _: &Self::Value) {
        if reason == Event::Evict {
            self.evicted.lock().push(*key);
        }
    }
}

#[test]
fn test_eviction_order_is_oldest_first() {
    let recorder = Recorder::default();
    let listener = Arc::new(LeaveCounter::default());
    let cache = weighted(params(1000, 6, 1000))
        .with_frequently_used_threshold(10)
        .with_event_listener(listener.clone())
        .build()
        .unwrap();

    for key in ["a", "b", "c"] {
        drop(cache.cache(key, recorder.value(1)).unwrap());
    }
    // Probing moves "a" to the newest position.
    assert!(cache.probe("a"));
    for key in ["d", "e", "f"] {
        drop(cache.cache(key, recorder.value(1)).unwrap());
    }

    assert_eq!(*listener.evicted.lock(), vec!["b", "c", "a"]);
    assert_eq!(
        cache.inspect().lfu_exclusive_entries.iter().map(|entry| entry.key).collect_vec(),
        vec!["d", "e", "f"]
    );
}

#[test]
fn test_events_through_prelude() {
    let recorder = Recorder::default();
    let events = EventRecorder::default();
    let cache = weighted(params(1000, 10, 1000))
        .with_event_listener(Arc::new(events.clone()))
        .build()
        .unwrap();

    drop(cache.cache("a", recorder.value(1)).unwrap());
    drop(cache.cache("a", recorder.value(2)).unwrap());
    assert_eq!(cache.remove_all(|key| *key == "a"), 1);
    assert_eq!(events.dump(), vec![(Event::Replace, "a", 1), (Event::Remove, "a", 2)]);
}

type CacheSlot = Arc<Mutex<Option<Cache<&'static str, usize>>>>;

fn slot_cache(slot: &CacheSlot) -> Option<Cache<&'static str, usize>> {
    slot.lock().clone()
}

#[test_log::test]
fn test_reentrant_releaser_and_observer() {
    let slot = CacheSlot::default();
    let released = Arc::new(Mutex::new(vec![]));
    let observed = Arc::new(Mutex::new(vec![]));

    let cache = weighted(params(1000, 2, 1000)).build().unwrap();
    *slot.lock() = Some(cache.clone());

    let value = |v: usize| {
        let slot = slot.clone();
        let released = released.clone();
        ValueRef::new(v, move |v: usize| {
            if let Some(cache) = slot_cache(&slot) {
                assert!(cache.get("missing").is_none());
                released.lock().push((v, cache.count()));
            }
        })
    };
    let observer = {
        let slot = slot.clone();
        let observed = observed.clone();
        Arc::new(move |key: &&'static str, is_exclusive: bool| {
            if let Some(cache) = slot_cache(&slot) {
                observed.lock().push((*key, is_exclusive, cache.contains(key)));
            }
        })
    };

    drop(cache.cache_with_observer("a", value(1), observer.clone()).unwrap());
    drop(cache.cache_with_observer("b", value(2), observer.clone()).unwrap());
    let c = cache.cache_with_observer("c", value(3), observer).unwrap();
    assert_eq!(released.lock().iter().copied().sorted().collect_vec(), vec![(1, 1), (2, 1)]);

    assert_eq!(cache.remove_all(|_| true), 1);
    assert!(released.lock().iter().all(|(v, _)| *v != 3));
    drop(c);

    assert_eq!(
        released.lock().iter().copied().sorted().collect_vec(),
        vec![(1, 1), (2, 1), (3, 0)]
    );
    let observed = observed.lock().clone();
    for key in ["a", "b"] {
        assert!(observed.contains(&(key, true, true)));
        assert!(observed.contains(&(key, false, false)));
    }
    assert!(observed.iter().all(|(key, _, _)| *key != "c"));

    let cache = slot.lock().take();
    drop(cache);
}

/// Model of the values a test has handed to the cache.
#[derive(Default)]
struct Ledger {
    next: u64,
    created: HashSet<u64>,
}

impl Ledger {
    fn next(&mut self) -> u64 {
        self.next += 1;
        self.created.insert(self.next);
        self.next
    }
}

#[test_log::test]
fn test_random_operations_keep_invariants() {
    const KEYS: u64 = 16;

    let recorder = Recorder::default();
    let params = MemoryCacheParams {
        max_cache_size: 64,
        max_cache_entries: 8,
        max_eviction_queue_size: 32,
        max_eviction_queue_entries: 6,
        max_cache_entry_size: 16,
        params_check_interval: Duration::ZERO,
    };
    let cache: Cache<u64, u64> = CacheBuilder::new()
        .with_params_supplier(params)
        .with_weighter(|v: &u64| (*v % 20) as usize + 1)
        .with_trim_strategy(FixedTrimStrategy(0.3))
        .with_adaptive_rate_promil(50)
        .with_ghost_list_max_size(4)
        .build()
        .unwrap();

    let mut rng = SmallRng::seed_from_u64(0x5eed);
    let mut ledger = Ledger::default();
    let mut held: Vec<CacheEntry<u64, u64>> = vec![];

    for _ in 0..5000 {
        let key = rng.random_range(0..KEYS);
        match rng.random_range(0..100) {
            0..30 => {
                let value = ledger.next();
                if let Some(entry) = cache.cache(key, recorder.value(value)) {
                    held.push(entry);
                }
            }
            30..60 => {
                if let Some(entry) = cache.get(&key) {
                    held.push(entry);
                }
            }
            60..65 => {
                cache.probe(&key);
            }
            65..70 => {
                let exclusive = cache
                    .inspect()
                    .lfu_exclusive_entries
                    .iter()
                    .chain(cache.inspect().mfu_exclusive_entries.iter())
                    .any(|entry| entry.key == key);
                let reused = cache.reuse(&key);
                assert_eq!(reused.is_some(), exclusive);
                if let Some(value) = reused {
                    assert_eq!(value.ref_count(), 1);
                    value.close();
                }
            }
            70..72 => {
                cache.remove_all(|k| *k == key);
            }
            72..74 => cache.trim(TrimType::LowInBackground),
            74..75 => {
                if let Some(entry) = held.first().cloned() {
                    held.push(entry);
                }
            }
            _ => {
                if !held.is_empty() {
                    let index = rng.random_range(0..held.len());
                    held.swap_remove(index);
                }
            }
        }

        assert!(cache.in_use_count() <= params.max_cache_entries);
        assert!(cache.in_use_size() <= params.max_cache_size);
        assert!(cache.eviction_queue_count() <= params.max_eviction_queue_entries);
        assert!(cache.eviction_queue_size() <= params.max_eviction_queue_size);
        assert!((100..=900).contains(&cache.lfu_fraction_promil()));

        let released = recorder.released();
        for entry in held.iter() {
            assert!(!released.contains(entry.value()), "held value {} released", entry.value());
        }
    }

    drop(held);
    cache.clear();
    assert_eq!(cache.count(), 0);

    let released = recorder.released();
    assert_eq!(released.len(), ledger.created.len(), "every value released exactly once");
    assert_eq!(released.into_iter().collect::<HashSet<_>>(), ledger.created);
}
