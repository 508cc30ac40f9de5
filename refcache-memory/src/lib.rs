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

//! This crate provides an adaptive, reference-counted in-memory cache.
//!
//! Cached values are shared through [`ValueRef`] handles. An entry is pinned while any client holds a
//! [`CacheEntry`] and becomes evictable once the last one is dropped. Evictable entries are split between an LFU and
//! an MFU segment, whose share of the eviction budget adapts to misses on recently evicted keys.

mod cache;
mod error;
mod ghost;
mod inspector;
mod map;
mod partition;
mod prelude;
mod record;
mod reference;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use prelude::*;
