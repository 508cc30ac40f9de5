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

//! Utilities for testing.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;
use refcache_common::{
    code::{Key, Value},
    event::{Event, EventListener},
    params::{MemoryCacheParams, ParamsSupplier},
    trim::{TrimStrategy, TrimType},
};

use crate::{record::EntryStateObserver, reference::ValueRef};

/// Records every value released through the references it creates.
#[derive(Debug)]
pub struct Recorder<V> {
    released: Arc<Mutex<Vec<V>>>,
}

impl<V> Clone for Recorder<V> {
    fn clone(&self) -> Self {
        Self {
            released: self.released.clone(),
        }
    }
}

impl<V> Default for Recorder<V> {
    fn default() -> Self {
        Self {
            released: Default::default(),
        }
    }
}

impl<V> Recorder<V>
where
    V: Value,
{
    /// Wrap `value` with a releaser that records it.
    pub fn value(&self, value: V) -> ValueRef<V> {
        let released = self.released.clone();
        ValueRef::new(value, move |value: V| released.lock().push(value))
    }

    /// Released values, in release order.
    pub fn released(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.released.lock().clone()
    }

    /// Count of the released values.
    pub fn count(&self) -> usize {
        self.released.lock().len()
    }
}

/// Params supplier whose params can be switched at runtime. Counts the polls.
#[derive(Debug, Clone)]
pub struct SwitchableParams {
    params: Arc<Mutex<MemoryCacheParams>>,
    calls: Arc<AtomicUsize>,
}

impl SwitchableParams {
    /// Create a supplier of `params`.
    pub fn new(params: MemoryCacheParams) -> Self {
        Self {
            params: Arc::new(Mutex::new(params)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Supply `params` from now on.
    pub fn set(&self, params: MemoryCacheParams) {
        *self.params.lock() = params;
    }

    /// Count of the polls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl ParamsSupplier for SwitchableParams {
    fn get(&self) -> MemoryCacheParams {
        self.calls.fetch_add(1, Ordering::Relaxed);
        *self.params.lock()
    }
}

/// Trim strategy whose ratio can be switched at runtime.
#[derive(Debug, Clone)]
pub struct SwitchableTrimStrategy {
    ratio: Arc<Mutex<f64>>,
}

impl SwitchableTrimStrategy {
    /// Create a strategy answering `ratio` to every trim type.
    pub fn new(ratio: f64) -> Self {
        Self {
            ratio: Arc::new(Mutex::new(ratio)),
        }
    }

    /// Answer `ratio` from now on.
    pub fn set(&self, ratio: f64) {
        *self.ratio.lock() = ratio;
    }
}

impl TrimStrategy for SwitchableTrimStrategy {
    fn trim_ratio(&self, _: TrimType) -> f64 {
        *self.ratio.lock()
    }
}

/// Records exclusivity changes of entries.
#[derive(Debug)]
pub struct ExclusivityRecorder<K> {
    changes: Arc<Mutex<Vec<(K, bool)>>>,
}

impl<K> Clone for ExclusivityRecorder<K> {
    fn clone(&self) -> Self {
        Self {
            changes: self.changes.clone(),
        }
    }
}

impl<K> Default for ExclusivityRecorder<K> {
    fn default() -> Self {
        Self {
            changes: Default::default(),
        }
    }
}

impl<K> ExclusivityRecorder<K>
where
    K: Key,
{
    /// Observer that records into this recorder.
    pub fn observer(&self) -> Arc<dyn EntryStateObserver<K>> {
        let changes = self.changes.clone();
        Arc::new(move |key: &K, is_exclusive: bool| changes.lock().push((key.clone(), is_exclusive)))
    }

    /// Recorded changes, in notification order.
    pub fn dump(&self) -> Vec<(K, bool)> {
        self.changes.lock().clone()
    }
}

/// Event listener recording every leaving entry.
#[derive(Debug)]
pub struct EventRecorder<K, V> {
    events: Arc<Mutex<Vec<(Event, K, V)>>>,
}

impl<K, V> Clone for EventRecorder<K, V> {
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
        }
    }
}

impl<K, V> Default for EventRecorder<K, V> {
    fn default() -> Self {
        Self {
            events: Default::default(),
        }
    }
}

impl<K, V> EventRecorder<K, V>
where
    K: Key,
    V: Value + Clone,
{
    /// Recorded events, in notification order.
    pub fn dump(&self) -> Vec<(Event, K, V)> {
        self.events.lock().clone()
    }
}

impl<K, V> EventListener for EventRecorder<K, V>
where
    K: Key,
    V: Value + Clone,
{
    type Key = K;
    type Value = V;

    fn on_leave(&self, reason: Event, key: &Self::Key, value: &Self::Value) {
        self.events.lock().push((reason, key.clone(), value.clone()));
    }
}
