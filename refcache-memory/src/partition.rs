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

use crate::ghost::{LfuGhostList, MfuGhostList};

/// Denominator of all promille values.
pub const TOTAL_PROMIL: u32 = 1000;
/// Lowest legal LFU fraction.
pub const MIN_FRACTION_PROMIL: u32 = 100;
/// Highest legal LFU fraction.
pub const MAX_FRACTION_PROMIL: u32 = 900;
/// LFU fraction used when none or an illegal one is configured.
pub const DEFAULT_LFU_FRACTION_PROMIL: u32 = 500;
/// Adaptive rate used when none or an illegal one is configured.
pub const DEFAULT_ADAPTIVE_RATE_PROMIL: u32 = 10;

/// Exclusive segment of the eviction queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Entries accessed at most `frequently_used_threshold` times.
    Lfu,
    /// Entries accessed more often than `frequently_used_threshold` times.
    Mfu,
}

/// Outcome of a miss on the partition fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FractionUpdate {
    /// The key was an LFU ghost and the LFU share grew.
    Increased,
    /// The key was an MFU ghost and the LFU share shrank.
    Decreased,
    /// No adjustment.
    Unchanged,
}

/// Limits of each exclusive segment for one eviction round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionBudget {
    /// Max entry count of the LFU segment.
    pub lfu_count: usize,
    /// Max size of the LFU segment.
    pub lfu_size: usize,
    /// Max entry count of the MFU segment.
    pub mfu_count: usize,
    /// Max size of the MFU segment.
    pub mfu_size: usize,
}

/// Adaptive split of the eviction queue budget between the LFU and the MFU segments.
///
/// A miss on a key recently evicted from LFU means LFU was too small, so its share grows by the adaptive rate. A miss
/// on a recent MFU victim shrinks it. The share always stays within
/// [`MIN_FRACTION_PROMIL`, `MAX_FRACTION_PROMIL`].
#[derive(Debug, Clone)]
pub struct AdaptivePartition {
    lfu_fraction_promil: u32,
    adaptive_rate_promil: u32,
}

impl AdaptivePartition {
    /// Create a partition. Illegal values are replaced by the defaults.
    pub fn new(lfu_fraction_promil: u32, adaptive_rate_promil: u32) -> Self {
        let lfu_fraction_promil = if (MIN_FRACTION_PROMIL..=MAX_FRACTION_PROMIL).contains(&lfu_fraction_promil) {
            lfu_fraction_promil
        } else {
            tracing::warn!(
                "[partition]: lfu fraction {} promil out of [{}, {}], use default {}",
                lfu_fraction_promil,
                MIN_FRACTION_PROMIL,
                MAX_FRACTION_PROMIL,
                DEFAULT_LFU_FRACTION_PROMIL
            );
            DEFAULT_LFU_FRACTION_PROMIL
        };
        let adaptive_rate_promil = if adaptive_rate_promil > 0 && adaptive_rate_promil < TOTAL_PROMIL {
            adaptive_rate_promil
        } else {
            tracing::warn!(
                "[partition]: adaptive rate {} promil out of (0, {}), use default {}",
                adaptive_rate_promil,
                TOTAL_PROMIL,
                DEFAULT_ADAPTIVE_RATE_PROMIL
            );
            DEFAULT_ADAPTIVE_RATE_PROMIL
        };
        Self {
            lfu_fraction_promil,
            adaptive_rate_promil,
        }
    }

    /// Current LFU share of the eviction queue.
    pub fn lfu_fraction_promil(&self) -> u32 {
        self.lfu_fraction_promil
    }

    /// Step of each adjustment.
    pub fn adaptive_rate_promil(&self) -> u32 {
        self.adaptive_rate_promil
    }

    /// Adjust the fraction after a lookup miss on `key`.
    ///
    /// An LFU ghost is touched whether or not the fraction can still grow.
    pub fn on_miss<K, Q>(
        &mut self,
        key: &Q,
        lfu_ghosts: &mut LfuGhostList<K>,
        mfu_ghosts: &MfuGhostList<K>,
    ) -> FractionUpdate
    where
        K: Key,
        Q: Hash + Equivalent<K> + ?Sized,
    {
        if lfu_ghosts.contains(key) {
            let update = if self.lfu_fraction_promil + self.adaptive_rate_promil <= MAX_FRACTION_PROMIL {
                self.lfu_fraction_promil += self.adaptive_rate_promil;
                FractionUpdate::Increased
            } else {
                FractionUpdate::Unchanged
            };
            lfu_ghosts.touch(key);
            tracing::trace!(
                "[partition]: lfu ghost hit, fraction: {} promil ({:?})",
                self.lfu_fraction_promil,
                update
            );
            return update;
        }

        if self.lfu_fraction_promil >= MIN_FRACTION_PROMIL + self.adaptive_rate_promil && mfu_ghosts.contains(key) {
            self.lfu_fraction_promil -= self.adaptive_rate_promil;
            tracing::trace!("[partition]: mfu ghost hit, fraction: {} promil", self.lfu_fraction_promil);
            return FractionUpdate::Decreased;
        }

        FractionUpdate::Unchanged
    }

    /// Split the free eviction queue budget: LFU gets its promille share, MFU the rest.
    pub fn split(&self, count: usize, size: usize) -> EvictionBudget {
        let lfu_count = share(count, self.lfu_fraction_promil);
        let lfu_size = share(size, self.lfu_fraction_promil);
        EvictionBudget {
            lfu_count,
            lfu_size,
            mfu_count: count - lfu_count,
            mfu_size: size - lfu_size,
        }
    }
}

fn share(total: usize, promil: u32) -> usize {
    (total as u128 * promil as u128 / TOTAL_PROMIL as u128) as usize
}
