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

use std::{fmt::Debug, mem::ManuallyDrop, ops::Deref, sync::Arc};

use refcache_common::code::Value;

/// Releases the resource behind a value once the last [`ValueRef`] to it is closed.
pub trait Releaser<V>: Send + Sync + 'static {
    /// Release the value.
    fn release(&self, value: V);
}

impl<V, F> Releaser<V> for F
where
    F: Fn(V) + Send + Sync + 'static,
{
    fn release(&self, value: V) {
        self(value)
    }
}

struct Shared<V>
where
    V: Value,
{
    value: ManuallyDrop<V>,
    releaser: Option<Arc<dyn Releaser<V>>>,
}

impl<V> Drop for Shared<V>
where
    V: Value,
{
    fn drop(&mut self) {
        // SAFETY: `value` is taken exactly once, here, and never accessed again.
        let value = unsafe { ManuallyDrop::take(&mut self.value) };
        match self.releaser.as_ref() {
            Some(releaser) => releaser.release(value),
            None => drop(value),
        }
    }
}

/// Shared, reference-counted handle to a value.
///
/// Cloning adds a reference and closing (or dropping) removes one. The releaser runs exactly once, on the thread
/// that closes the last reference.
pub struct ValueRef<V>
where
    V: Value,
{
    shared: Arc<Shared<V>>,
}

impl<V> ValueRef<V>
where
    V: Value,
{
    /// Wrap `value` with a releaser that is called once the last reference is closed.
    pub fn new(value: V, releaser: impl Releaser<V>) -> Self {
        Self::with_releaser(value, Arc::new(releaser))
    }

    /// Wrap `value` with a releaser shared by many values.
    pub fn with_releaser(value: V, releaser: Arc<dyn Releaser<V>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                value: ManuallyDrop::new(value),
                releaser: Some(releaser),
            }),
        }
    }

    /// Wrap `value` without a releaser. The value is simply dropped with its last reference.
    pub fn unmanaged(value: V) -> Self {
        Self {
            shared: Arc::new(Shared {
                value: ManuallyDrop::new(value),
                releaser: None,
            }),
        }
    }

    /// Get the value.
    pub fn value(&self) -> &V {
        &self.shared.value
    }

    /// Count of the open references to the value, this one included.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.shared)
    }

    /// Close this reference.
    ///
    /// Releases the value if this is the last open reference.
    pub fn close(self) {
        drop(self)
    }

    /// Returns `true` if both references point to the same value.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.shared, &other.shared)
    }
}

impl<V> Clone for ValueRef<V>
where
    V: Value,
{
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<V> Deref for ValueRef<V>
where
    V: Value,
{
    type Target = V;

    fn deref(&self) -> &Self::Target {
        self.value()
    }
}

impl<V> Debug for ValueRef<V>
where
    V: Value + Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueRef")
            .field("value", self.value())
            .field("refs", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::test_utils::Recorder;

    fn is_send_sync_static<T: Send + Sync + 'static>() {}

    #[test]
    fn test_send_sync_static() {
        is_send_sync_static::<ValueRef<()>>();
        is_send_sync_static::<ValueRef<Vec<u8>>>();
    }

    #[test]
    fn test_release_once_on_last_close() {
        let recorder = Recorder::default();
        let r1 = recorder.value(42usize);
        let r2 = r1.clone();
        let r3 = r2.clone();
        assert_eq!(r1.ref_count(), 3);
        assert!(ValueRef::ptr_eq(&r1, &r3));

        r1.close();
        r3.close();
        assert!(recorder.released().is_empty());
        assert_eq!(*r2, 42);

        r2.close();
        assert_eq!(recorder.released(), vec![42]);
    }

    #[test]
    fn test_closure_releaser() {
        let releases = Arc::new(AtomicUsize::new(0));
        let r = {
            let releases = releases.clone();
            ValueRef::new(vec![1u8, 2, 3], move |v: Vec<u8>| {
                releases.fetch_add(v.len(), Ordering::Relaxed);
            })
        };
        drop(r.clone());
        assert_eq!(releases.load(Ordering::Relaxed), 0);
        drop(r);
        assert_eq!(releases.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_unmanaged() {
        let r = ValueRef::unmanaged(String::from("value"));
        assert_eq!(r.len(), 5);
        assert_eq!(r.ref_count(), 1);
        r.close();
    }
}
