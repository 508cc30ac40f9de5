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
    fmt::Debug,
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Arc,
    },
};

use bitflags::bitflags;
use parking_lot::Mutex;
use refcache_common::code::{Key, Value};

use crate::{partition::Segment, reference::ValueRef};

/// Observer of the exclusivity of a cached entry.
///
/// An entry is exclusive when the cache is its only holder and it is queued for eviction. The observer is invoked
/// after the cache lock is released.
pub trait EntryStateObserver<K>: Send + Sync + 'static {
    /// Called when the entry enters (`true`) or leaves (`false`) an eviction queue.
    fn on_exclusivity_changed(&self, key: &K, is_exclusive: bool);
}

impl<K, F> EntryStateObserver<K> for F
where
    F: Fn(&K, bool) + Send + Sync + 'static,
{
    fn on_exclusivity_changed(&self, key: &K, is_exclusive: bool) {
        self(key, is_exclusive)
    }
}

bitflags! {
    /// State flags of a [`Record`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct Flags: u64 {
        /// No longer owned by the cached map.
        const ORPHAN = 0b00000001;
        /// Queued in the LFU exclusive segment.
        const IN_LFU = 0b00000010;
        /// Queued in the MFU exclusive segment.
        const IN_MFU = 0b00000100;
    }
}

/// [`Record`] holds the bookkeeping of a cached entry.
///
/// Counters and flags are only mutated under the cache lock. They are atomics so that snapshots and handles can read
/// them without it.
pub struct Record<K, V>
where
    K: Key,
    V: Value,
{
    key: K,
    weight: usize,
    value: Mutex<Option<ValueRef<V>>>,
    clients: AtomicU32,
    accesses: AtomicU32,
    flags: AtomicU64,
    observer: Option<Arc<dyn EntryStateObserver<K>>>,
}

impl<K, V> Debug for Record<K, V>
where
    K: Key,
    V: Value,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("key", &self.key)
            .field("weight", &self.weight)
            .field("clients", &self.client_count())
            .field("accesses", &self.access_count())
            .field("flags", &Flags::from_bits_truncate(self.flags.load(Ordering::Acquire)))
            .finish()
    }
}

impl<K, V> Record<K, V>
where
    K: Key,
    V: Value,
{
    /// Create a record owning the cache's reference to `value`.
    pub fn new(
        key: K,
        value: ValueRef<V>,
        weight: usize,
        access_count: u32,
        observer: Option<Arc<dyn EntryStateObserver<K>>>,
    ) -> Self {
        Self {
            key,
            weight,
            value: Mutex::new(Some(value)),
            clients: AtomicU32::new(0),
            accesses: AtomicU32::new(access_count),
            flags: AtomicU64::new(0),
            observer,
        }
    }

    /// Get the record key.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Get the record weight.
    pub fn weight(&self) -> usize {
        self.weight
    }

    /// Get a new reference to the value, if the cache still owns it.
    pub fn value(&self) -> Option<ValueRef<V>> {
        self.value.lock().clone()
    }

    /// Take the cache's reference to the value.
    pub fn take_value(&self) -> Option<ValueRef<V>> {
        self.value.lock().take()
    }

    /// Take the cache's reference to the value if the record is an orphan with no client left.
    pub fn take_releasable(&self) -> Option<ValueRef<V>> {
        if self.is_orphan() && self.client_count() == 0 {
            self.take_value()
        } else {
            None
        }
    }

    /// Count of the client handles.
    pub fn client_count(&self) -> u32 {
        self.clients.load(Ordering::Acquire)
    }

    /// Count of the accesses, seeded from the ghost list on creation.
    pub fn access_count(&self) -> u32 {
        self.accesses.load(Ordering::Acquire)
    }

    /// Increase the client count.
    ///
    /// This function returns the new client count after the op.
    pub fn inc_clients(&self) -> u32 {
        let old = self.clients.fetch_add(1, Ordering::SeqCst);
        tracing::trace!("[record]: inc record (key: {:?}) clients: {} => {}", self.key, old, old + 1);
        old + 1
    }

    /// Decrease the client count.
    ///
    /// This function returns the new client count after the op.
    pub fn dec_clients(&self) -> u32 {
        let old = self.clients.fetch_sub(1, Ordering::SeqCst);
        assert!(old > 0, "client count underflow of {:?}", self.key);
        tracing::trace!(
            "[record]: dec record (key: {:?}) clients: {} => {}",
            self.key,
            old,
            old.wrapping_sub(1)
        );
        old.wrapping_sub(1)
    }

    /// Increase the access count.
    ///
    /// This function returns the new access count after the op.
    pub fn inc_access(&self) -> u32 {
        let old = self
            .accesses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |accesses| Some(accesses.saturating_add(1)))
            .unwrap_or_else(|accesses| accesses);
        let new = old.saturating_add(1);
        tracing::trace!("[record]: inc record (key: {:?}) accesses: {} => {}", self.key, old, new);
        new
    }

    /// Mark the record as no longer owned by the cache's maps.
    ///
    /// # Panics
    ///
    /// Panics if the record is already an orphan.
    pub fn set_orphan(&self) {
        let old = self.flags.fetch_or(Flags::ORPHAN.bits(), Ordering::AcqRel);
        assert!(old & Flags::ORPHAN.bits() == 0, "record {:?} orphaned twice", self.key);
    }

    /// Get the orphan flag.
    pub fn is_orphan(&self) -> bool {
        self.get_flags(Flags::ORPHAN)
    }

    /// Set the exclusive segment the record is queued in.
    pub fn set_segment(&self, segment: Option<Segment>) {
        self.set_flags(Flags::IN_LFU, segment == Some(Segment::Lfu));
        self.set_flags(Flags::IN_MFU, segment == Some(Segment::Mfu));
    }

    /// Get the exclusive segment the record is queued in.
    pub fn segment(&self) -> Option<Segment> {
        if self.get_flags(Flags::IN_LFU) {
            Some(Segment::Lfu)
        } else if self.get_flags(Flags::IN_MFU) {
            Some(Segment::Mfu)
        } else {
            None
        }
    }

    /// Notify the observer, if any, about an exclusivity change.
    pub fn notify_exclusivity(&self, is_exclusive: bool) {
        if let Some(observer) = self.observer.as_ref() {
            observer.on_exclusivity_changed(&self.key, is_exclusive);
        }
    }

    fn set_flags(&self, flags: Flags, val: bool) {
        match val {
            true => self.flags.fetch_or(flags.bits(), Ordering::Release),
            false => self.flags.fetch_and(!flags.bits(), Ordering::Release),
        };
    }

    fn get_flags(&self, flags: Flags) -> bool {
        self.flags.load(Ordering::Acquire) & flags.bits() == flags.bits()
    }
}
