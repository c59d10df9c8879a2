//! A byte-bounded in-memory [`Store`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;

use super::{Info, Store, Stored};

/// Stores entries in memory under a total byte budget.
///
/// When a new entry does not fit, the oldest *inserted* entries are evicted
/// until it does. Reads do not refresh an entry's age, so this is insertion
/// order replacement rather than true LRU. Content larger than the whole
/// budget is never stored.
#[derive(Debug)]
pub struct MemoryStore {
    max_bytes: usize,
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    used_bytes: usize,
    next_seq: u64,
    entries: HashMap<String, Entry>,
    order: BTreeMap<u64, String>,
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    info: Info,
    content: Bytes,
}

impl Inner {
    fn remove(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            self.order.remove(&entry.seq);
            self.used_bytes -= entry.content.len();
        }
    }

    fn evict_oldest(&mut self) -> bool {
        match self.order.pop_first() {
            Some((_, key)) => {
                if let Some(entry) = self.entries.remove(&key) {
                    self.used_bytes -= entry.content.len();
                }
                true
            }
            None => false,
        }
    }
}

impl MemoryStore {
    /// Creates a store holding at most `max_bytes` of content.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// The byte budget.
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Bytes of content currently held.
    pub fn used_bytes(&self) -> usize {
        self.lock().map_or(0, |inner| inner.used_bytes)
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |inner| inner.entries.len())
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Option<MutexGuard<'_, Inner>> {
        self.inner.lock().ok()
    }
}

impl Store for MemoryStore {
    fn set(&self, key: &str, info: Info, content: Bytes) {
        if content.len() > self.max_bytes {
            return;
        }
        let Some(mut inner) = self.lock() else {
            return;
        };

        inner.remove(key);
        while self.max_bytes - inner.used_bytes < content.len() {
            if !inner.evict_oldest() {
                break;
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.used_bytes += content.len();
        inner.order.insert(seq, key.to_string());
        inner.entries.insert(key.to_string(), Entry { seq, info, content });
    }

    fn get(&self, key: &str) -> Option<Stored> {
        let inner = self.lock()?;
        inner.entries.get(key).map(|entry| Stored {
            info: entry.info.clone(),
            content: entry.content.clone(),
        })
    }

    fn delete(&self, key: &str) {
        if let Some(mut inner) = self.lock() {
            inner.remove(key);
        }
    }
}
