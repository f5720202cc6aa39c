//! Bounded memo table with least-recently-used eviction.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};

pub(crate) struct Memo<K, V> {
    capacity: usize,
    inner: Mutex<MemoInner<K, V>>,
}

struct MemoInner<K, V> {
    values: HashMap<K, V>,
    /// Least recently used first.
    recency: VecDeque<K>,
}

impl<K, V> Memo<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(MemoInner {
                values: HashMap::new(),
                recency: VecDeque::new(),
            }),
        }
    }

    /// Return the memoized value for `key`, computing it with `compute` on a miss.
    ///
    /// `compute` runs without the lock held.
    pub(crate) fn get_or_insert_with(&self, key: K, compute: impl FnOnce() -> V) -> V {
        if self.capacity == 0 {
            return compute();
        }

        if let Some(value) = self.lock().touch(&key) {
            tracing::trace!("memo hit");
            return value;
        }

        tracing::trace!("memo miss");
        let value = compute();

        let mut inner = self.lock();
        if !inner.values.contains_key(&key) {
            if inner.values.len() >= self.capacity {
                if let Some(evicted) = inner.recency.pop_front() {
                    inner.values.remove(&evicted);
                }
            }
            inner.recency.push_back(key.clone());
            inner.values.insert(key, value.clone());
        }
        value
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().values.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoInner<K, V>> {
        // Every critical section leaves the table consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> MemoInner<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn touch(&mut self, key: &K) -> Option<V> {
        let value = self.values.get(key)?.clone();
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            if let Some(k) = self.recency.remove(pos) {
                self.recency.push_back(k);
            }
        }
        Some(value)
    }
}
