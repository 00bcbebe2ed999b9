//! Bounded in-process metadata cache.
//!
//! Saves re-reading metadata files for ids touched repeatedly by the same
//! process. Once the cache grows past its capacity the oldest tenth of the
//! entries (by insertion) is dropped. Correctness never depends on a hit:
//! writes and deletes through the owning store keep it coherent, and other
//! processes may still make it stale.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tagfile_core::Metadata;

#[derive(Debug, Default)]
struct Inner {
    order: VecDeque<String>,
    entries: HashMap<String, Metadata>,
}

/// Insertion-ordered, size-bounded map of id to metadata.
#[derive(Debug)]
pub struct MetadataCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl MetadataCache {
    /// Create a cache holding at most `capacity` entries (0 disables it).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn get(&self, id: &str) -> Option<Metadata> {
        let inner = self.inner.lock().ok()?;
        inner.entries.get(id).cloned()
    }

    pub fn insert(&self, id: &str, metadata: Metadata) {
        if self.capacity == 0 {
            return;
        }
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };

        if inner.entries.insert(id.to_string(), metadata).is_none() {
            inner.order.push_back(id.to_string());
        }

        if inner.entries.len() > self.capacity {
            let evict = (self.capacity / 10).max(1);
            for _ in 0..evict {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.entries.remove(&oldest);
                }
            }
        }
    }

    pub fn invalidate(&self, id: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            if inner.entries.remove(id).is_some() {
                inner.order.retain(|cached| cached != id);
            }
        }
    }

    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.entries.clear();
            inner.order.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
