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

use std::borrow::Cow;

use super::{BoxedCounter, BoxedGauge, RegistryOps};

/// Metrics of one cache instance.
///
/// All counters share the `refcache_memory_op_total` vector and are told apart by the `op` label.
#[derive(Debug)]
pub struct Metrics {
    /// New entries admitted by `cache`.
    pub memory_insert: BoxedCounter,
    /// Entries orphaned because the same key was cached again.
    pub memory_replace: BoxedCounter,
    /// Lookups that returned a client handle.
    pub memory_hit: BoxedCounter,
    /// Lookups that found nothing.
    pub memory_miss: BoxedCounter,
    /// Probes of exclusive entries.
    pub memory_probe: BoxedCounter,
    /// Values moved out of the cache by `reuse`.
    pub memory_reuse: BoxedCounter,
    /// Entries dropped by `remove_all` or `clear`.
    pub memory_remove: BoxedCounter,
    /// Exclusive entries evicted by the budget or by a trim.
    pub memory_evict: BoxedCounter,
    /// Cache-side value references closed.
    pub memory_release: BoxedCounter,
    /// Trim requests.
    pub memory_trim: BoxedCounter,

    /// Bytes tracked by the cache, in-use and exclusive entries alike.
    pub memory_usage: BoxedGauge,
    /// Current LFU share of the eviction queue budget, in promille.
    pub memory_lfu_fraction: BoxedGauge,
}

impl Metrics {
    /// Create a new metric with the given name.
    pub fn new(name: impl Into<Cow<'static, str>>, registry: &dyn RegistryOps) -> Self {
        let name = name.into();

        let op_total = registry.register_counter_vec(
            "refcache_memory_op_total".into(),
            "refcache in-memory cache operations".into(),
            &["name", "op"],
        );
        let usage = registry.register_gauge_vec(
            "refcache_memory_usage".into(),
            "refcache in-memory cache usage in bytes".into(),
            &["name"],
        );
        let lfu_fraction = registry.register_gauge_vec(
            "refcache_memory_lfu_fraction".into(),
            "refcache in-memory cache lfu fraction in promille".into(),
            &["name"],
        );

        let op = |op: &'static str| op_total.counter(&[name.clone(), op.into()]);

        Self {
            memory_insert: op("insert"),
            memory_replace: op("replace"),
            memory_hit: op("hit"),
            memory_miss: op("miss"),
            memory_probe: op("probe"),
            memory_reuse: op("reuse"),
            memory_remove: op("remove"),
            memory_evict: op("evict"),
            memory_release: op("release"),
            memory_trim: op("trim"),
            memory_usage: usage.gauge(&[name.clone()]),
            memory_lfu_fraction: lfu_fraction.gauge(&[name.clone()]),
        }
    }
}
