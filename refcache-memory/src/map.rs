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

use std::{collections::BTreeMap, fmt::Debug, hash::Hash};

use ahash::RandomState;
use hashbrown::{Equivalent, HashMap};
use refcache_common::{code::Key, strict_assert, strict_assert_eq};

struct Slot<T> {
    seq: u64,
    weight: usize,
    value: T,
}

/// Key-unique map that remembers insertion order and the total weight of its values.
///
/// Iteration and [`CountingLruMap::pop_first`] go from the oldest to the newest insertion. Putting an existing key
/// again moves it to the newest position.
///
/// The weight of each value is recorded at insertion and subtracted on removal, so the total never has to be
/// recomputed.
pub struct CountingLruMap<K, T> {
    slots: HashMap<K, Slot<T>, RandomState>,
    order: BTreeMap<u64, K>,
    seq: u64,
    size: usize,
}

impl<K, T> Default for CountingLruMap<K, T> {
    fn default() -> Self {
        Self {
            slots: HashMap::with_hasher(RandomState::default()),
            order: BTreeMap::new(),
            seq: 0,
            size: 0,
        }
    }
}

impl<K, T> Debug for CountingLruMap<K, T>
where
    K: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingLruMap")
            .field("keys", &self.order.values().collect::<Vec<_>>())
            .field("size", &self.size)
            .finish()
    }
}

impl<K, T> CountingLruMap<K, T>
where
    K: Key,
{
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count of the entries.
    pub fn count(&self) -> usize {
        self.slots.len()
    }

    /// Total weight of the entries.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns `true` if the map holds no entry.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The oldest key.
    pub fn first_key(&self) -> Option<&K> {
        self.order.first_key_value().map(|(_, key)| key)
    }

    /// Keys from the oldest to the newest.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.order.values()
    }

    /// Entries from the oldest to the newest.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &T)> + '_ {
        self.order
            .values()
            .filter_map(|key| self.slots.get_key_value(key).map(|(key, slot)| (key, &slot.value)))
    }

    /// Entries whose key matches `predicate`, from the oldest to the newest.
    pub fn matching(&self, predicate: impl Fn(&K) -> bool) -> Vec<(&K, &T)> {
        self.iter().filter(|(key, _)| predicate(key)).collect()
    }

    /// Get the value of `key`. The order is not affected.
    pub fn get<Q>(&self, key: &Q) -> Option<&T>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.slots.get(key).map(|slot| &slot.value)
    }

    /// Returns `true` if `key` is in the map. The order is not affected.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.slots.contains_key(key)
    }

    /// Insert `value` with its `weight` as the newest entry.
    ///
    /// Returns the previous value of `key`, whose weight is no longer accounted.
    pub fn put(&mut self, key: K, value: T, weight: usize) -> Option<T> {
        let old = self.remove(&key);

        let seq = self.seq;
        self.seq += 1;
        self.order.insert(seq, key.clone());
        self.slots.insert(key, Slot { seq, weight, value });
        self.size += weight;

        old
    }

    /// Remove `key` from the map.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<T>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let slot = self.slots.remove(key)?;
        let ordered = self.order.remove(&slot.seq);
        strict_assert!(ordered.is_some());
        Some(self.account_removal(slot))
    }

    /// Remove `key` from the map, returning the stored key with the value.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, T)>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let (key, slot) = self.slots.remove_entry(key)?;
        let ordered = self.order.remove(&slot.seq);
        strict_assert!(ordered.is_some());
        Some((key, self.account_removal(slot)))
    }

    /// Remove the oldest entry.
    pub fn pop_first(&mut self) -> Option<(K, T)> {
        let (_, key) = self.order.pop_first()?;
        let slot = self.slots.remove(&key);
        strict_assert!(slot.is_some());
        slot.map(|slot| (key, self.account_removal(slot)))
    }

    /// Remove the entries whose key matches `predicate`, returned from the oldest to the newest.
    pub fn remove_all(&mut self, predicate: impl Fn(&K) -> bool) -> Vec<(K, T)> {
        let keys = self.order.values().filter(|key| predicate(key)).cloned().collect::<Vec<_>>();
        keys.into_iter()
            .filter_map(|key| self.remove(&key).map(|value| (key, value)))
            .collect()
    }

    /// Remove all entries, returned from the oldest to the newest.
    pub fn clear(&mut self) -> Vec<(K, T)> {
        let order = std::mem::take(&mut self.order);
        let mut slots = std::mem::replace(&mut self.slots, HashMap::with_hasher(RandomState::default()));
        self.size = 0;
        let drained = order
            .into_values()
            .filter_map(|key| slots.remove(&key).map(|slot| (key, slot.value)))
            .collect::<Vec<_>>();
        strict_assert!(slots.is_empty());
        drained
    }

    fn account_removal(&mut self, slot: Slot<T>) -> T {
        strict_assert!(self.size >= slot.weight);
        self.size -= slot.weight;
        if self.slots.is_empty() {
            strict_assert_eq!(self.size, 0);
        }
        slot.value
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;

    fn map_for_test() -> CountingLruMap<&'static str, usize> {
        let mut map = CountingLruMap::new();
        map.put("key1", 110, 110);
        map.put("key2", 120, 120);
        map.put("key3", 130, 130);
        map
    }

    fn assert_order(map: &CountingLruMap<&'static str, usize>, keys: &[&str], values: &[usize]) {
        assert_eq!(map.keys().copied().collect_vec(), keys);
        assert_eq!(map.iter().map(|(_, v)| *v).collect_vec(), values);
    }

    #[test]
    fn test_initial_state() {
        let map = CountingLruMap::<&'static str, usize>::new();
        assert_eq!(map.count(), 0);
        assert_eq!(map.size(), 0);
        assert!(map.first_key().is_none());
    }

    #[test]
    fn test_put() {
        let map = map_for_test();
        assert_eq!(map.count(), 3);
        assert_eq!(map.size(), 360);
        assert_order(&map, &["key1", "key2", "key3"], &[110, 120, 130]);
    }

    #[test]
    fn test_put_same_key_twice() {
        let mut map = map_for_test();
        assert_eq!(map.put("key2", 150, 150), Some(120));
        assert_eq!(map.count(), 3);
        assert_eq!(map.size(), 390);
        assert_order(&map, &["key1", "key3", "key2"], &[110, 130, 150]);
    }

    #[test]
    fn test_get_and_contains_keep_order() {
        let map = map_for_test();
        assert_eq!(map.get("key2"), Some(&120));
        assert_eq!(map.get("key4"), None);
        assert!(map.contains("key1"));
        assert!(!map.contains("key4"));
        assert_eq!(map.size(), 360);
        assert_order(&map, &["key1", "key2", "key3"], &[110, 120, 130]);
    }

    #[test]
    fn test_remove() {
        let mut map = map_for_test();
        assert_eq!(map.remove("key2"), Some(120));
        assert_eq!(map.size(), 240);
        assert_order(&map, &["key1", "key3"], &[110, 130]);

        assert_eq!(map.remove("key4"), None);
        assert_eq!(map.size(), 240);

        assert_eq!(map.remove_entry("key1"), Some(("key1", 110)));
        assert_eq!(map.size(), 130);
        map.put("key1", 110, 110);

        assert_order(&map, &["key3", "key1"], &[130, 110]);
        assert_eq!(map.remove("key3"), Some(130));
        assert_eq!(map.remove("key1"), Some(110));
        assert_eq!(map.count(), 0);
        assert_eq!(map.size(), 0);
    }

    #[test]
    fn test_pop_first() {
        let mut map = map_for_test();
        assert_eq!(map.first_key(), Some(&"key1"));
        assert_eq!(map.pop_first(), Some(("key1", 110)));
        assert_eq!(map.first_key(), Some(&"key2"));
        assert_eq!(map.size(), 250);
    }

    #[test]
    fn test_remove_all() {
        let mut map = map_for_test();
        map.put("key4", 140, 140);
        let removed = map.remove_all(|key| *key == "key2" || *key == "key3");
        assert_eq!(removed, vec![("key2", 120), ("key3", 130)]);
        assert_eq!(map.size(), 250);
        assert_order(&map, &["key1", "key4"], &[110, 140]);
    }

    #[test]
    fn test_matching() {
        let map = map_for_test();
        let matched = map.matching(|key| key.ends_with('1') || key.ends_with('3'));
        assert_eq!(matched, vec![(&"key1", &110), (&"key3", &130)]);
        assert!(map.matching(|key| key.is_empty()).is_empty());
    }

    #[test]
    fn test_clear() {
        let mut map = map_for_test();
        let cleared = map.clear();
        assert_eq!(cleared, vec![("key1", 110), ("key2", 120), ("key3", 130)]);
        assert_eq!(map.count(), 0);
        assert_eq!(map.size(), 0);

        map.put("key5", 150, 150);
        assert_order(&map, &["key5"], &[150]);
    }

    #[test]
    fn test_weight_independent_of_value() {
        let mut map = CountingLruMap::new();
        map.put("ghost", (), 0);
        map.put("heavy", (), 4096);
        assert_eq!(map.size(), 4096);
        map.remove("heavy");
        assert_eq!(map.size(), 0);
        assert_eq!(map.count(), 1);
    }
}
