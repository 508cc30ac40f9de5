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

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Capacity constraints of the cache.
///
/// "Eviction queue" refers to the exclusive entries, the ones no client holds and which may be evicted at any time.
/// Sizes are measured by the cache weighter, in whatever unit it reports (usually bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryCacheParams {
    /// Max total size of all cached entries.
    pub max_cache_size: usize,
    /// Max count of all cached entries.
    pub max_cache_entries: usize,
    /// Max total size of the exclusive entries.
    pub max_eviction_queue_size: usize,
    /// Max count of the exclusive entries.
    pub max_eviction_queue_entries: usize,
    /// Max size of a single entry. Larger values are never admitted.
    pub max_cache_entry_size: usize,
    /// Minimal interval between two polls of the params supplier.
    pub params_check_interval: Duration,
}

impl MemoryCacheParams {
    /// Default interval between two polls of the params supplier.
    pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);
}

/// Supplier of the capacity constraints.
///
/// The cache polls the supplier instead of being pushed new params. It is never called while the cache lock is held.
pub trait ParamsSupplier: Send + Sync + 'static {
    /// Get the current capacity constraints.
    fn get(&self) -> MemoryCacheParams;
}

impl<F> ParamsSupplier for F
where
    F: Fn() -> MemoryCacheParams + Send + Sync + 'static,
{
    fn get(&self) -> MemoryCacheParams {
        self()
    }
}

impl ParamsSupplier for MemoryCacheParams {
    fn get(&self) -> MemoryCacheParams {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> MemoryCacheParams {
        MemoryCacheParams {
            max_cache_size: 1200,
            max_cache_entries: 4,
            max_eviction_queue_size: 1100,
            max_eviction_queue_entries: 4,
            max_cache_entry_size: 1000,
            params_check_interval: MemoryCacheParams::DEFAULT_CHECK_INTERVAL,
        }
    }

    #[test]
    fn test_suppliers() {
        let fixed: Box<dyn ParamsSupplier> = Box::new(params());
        assert_eq!(fixed.get(), params());

        let dynamic: Box<dyn ParamsSupplier> = Box::new(|| MemoryCacheParams {
            max_cache_size: 300,
            ..params()
        });
        assert_eq!(dynamic.get().max_cache_size, 300);
        assert_eq!(dynamic.get().max_cache_entries, 4);
    }

    #[test]
    fn test_params_serde() {
        let json = serde_json::to_string(&params()).unwrap();
        let decoded: MemoryCacheParams = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, params());
    }
}
