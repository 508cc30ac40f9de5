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

use std::hash::Hash;

use hashbrown::Equivalent;
use refcache_common::code::Key;

use crate::map::CountingLruMap;

/// Bounded list of keys recently evicted from the LFU segment, with the access count each one had.
///
/// A hit on the list means the LFU segment was too small to keep the key around.
#[derive(Debug)]
pub struct LfuGhostList<K> {
    entries: CountingLruMap<K, u32>,
    capacity: usize,
}

impl<K> LfuGhostList<K>
where
    K: Key,
{
    /// Create a ghost list holding at most `capacity` keys.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: CountingLruMap::new(),
            capacity,
        }
    }

    /// Remember `key` as the newest ghost with its access count, forgetting the oldest ghost if full.
    pub fn add(&mut self, key: K, access_count: u32) {
        if self.capacity == 0 {
            return;
        }
        self.entries.put(key, access_count, 0);
        while self.entries.count() > self.capacity {
            self.entries.pop_first();
        }
    }

    /// Bump the remembered access count of `key` and move it to the newest position.
    ///
    /// Returns `false` if `key` is not a ghost.
    pub fn touch<Q>(&mut self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        match self.entries.remove_entry(key) {
            Some((key, count)) => {
                self.entries.put(key, count.saturating_add(1), 0);
                true
            }
            None => false,
        }
    }

    /// Remembered access count of `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<u32>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.entries.get(key).copied()
    }

    /// Returns `true` if `key` is a ghost.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.entries.contains(key)
    }

    /// Ghost keys from the oldest to the newest.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.entries.keys()
    }

    /// Count of the ghosts.
    pub fn len(&self) -> usize {
        self.entries.count()
    }

    /// Returns `true` if there is no ghost.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Max count of the ghosts.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Bounded list of keys recently evicted from the MFU segment.
#[derive(Debug)]
pub struct MfuGhostList<K> {
    entries: CountingLruMap<K, ()>,
    capacity: usize,
}

impl<K> MfuGhostList<K>
where
    K: Key,
{
    /// Create a ghost list holding at most `capacity` keys.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: CountingLruMap::new(),
            capacity,
        }
    }

    /// Remember `key` as the newest ghost, forgetting the oldest ghost if full.
    pub fn add(&mut self, key: K) {
        if self.capacity == 0 {
            return;
        }
        self.entries.put(key, (), 0);
        while self.entries.count() > self.capacity {
            self.entries.pop_first();
        }
    }

    /// Returns `true` if `key` is a ghost.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.entries.contains(key)
    }

    /// Ghost keys from the oldest to the newest.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.entries.keys()
    }

    /// Count of the ghosts.
    pub fn len(&self) -> usize {
        self.entries.count()
    }

    /// Returns `true` if there is no ghost.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Max count of the ghosts.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;

    #[test]
    fn test_lfu_ghost_bounded() {
        let mut ghosts = LfuGhostList::new(2);
        ghosts.add(1u64, 1);
        ghosts.add(2, 4);
        ghosts.add(3, 2);
        assert_eq!(ghosts.len(), 2);
        assert!(!ghosts.contains(&1u64));
        assert_eq!(ghosts.get(&2u64), Some(4));
        assert_eq!(ghosts.keys().copied().collect_vec(), vec![2, 3]);
    }

    #[test]
    fn test_lfu_ghost_readd_moves_to_newest() {
        let mut ghosts = LfuGhostList::new(2);
        ghosts.add(1u64, 1);
        ghosts.add(2, 1);
        ghosts.add(1, 5);
        assert_eq!(ghosts.len(), 2);
        assert_eq!(ghosts.get(&1u64), Some(5));

        ghosts.add(3, 1);
        assert!(!ghosts.contains(&2u64));
        assert_eq!(ghosts.keys().copied().collect_vec(), vec![1, 3]);
    }

    #[test]
    fn test_lfu_ghost_touch() {
        let mut ghosts = LfuGhostList::new(2);
        ghosts.add(1u64, 1);
        ghosts.add(2, 1);

        assert!(ghosts.touch(&1u64));
        assert_eq!(ghosts.get(&1u64), Some(2));
        assert_eq!(ghosts.keys().copied().collect_vec(), vec![2, 1]);

        assert!(!ghosts.touch(&3u64));
        assert_eq!(ghosts.len(), 2);
    }

    #[test]
    fn test_mfu_ghost_bounded() {
        let mut ghosts = MfuGhostList::new(2);
        ghosts.add("a");
        ghosts.add("b");
        ghosts.add("c");
        assert!(!ghosts.contains("a"));
        assert!(ghosts.contains("b"));
        assert!(ghosts.contains("c"));
    }

    #[test]
    fn test_zero_capacity() {
        let mut lfu = LfuGhostList::new(0);
        lfu.add(1u64, 1);
        assert!(lfu.is_empty());
        assert!(!lfu.touch(&1u64));

        let mut mfu = MfuGhostList::new(0);
        mfu.add(1u64);
        assert!(mfu.is_empty());
    }
}
