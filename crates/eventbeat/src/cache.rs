//! Bounded LRU cache for per-source lookup values.
//!
//! Each source keeps one of these for session data split presentations. The
//! cache is owned by a single worker, so it needs no locking.

use std::collections::HashMap;
use std::hash::Hash;

/// Default capacity. The number of distinct session parameter combinations
/// in a single event log is small; raise `lookup_cache_capacity` if the
/// miss counter keeps growing.
pub const DEFAULT_CAPACITY: usize = 64;

/// Null link in the intrusive list.
const NIL: usize = usize::MAX;

struct Node<K, V> {
    key: K,
    value: V,
    prev: usize,
    next: usize,
}

/// Hit/miss/eviction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Fixed-capacity least-recently-used cache.
///
/// Entries live in a slab; a doubly-linked list threaded through the slab
/// tracks recency (head = most recent, tail = next to evict). Slots are
/// reused on eviction, so the slab never grows past `capacity`.
pub struct LookupCache<K, V> {
    index: HashMap<K, usize>,
    slab: Vec<Node<K, V>>,
    head: usize,
    tail: usize,
    capacity: usize,
    stats: CacheStats,
}

impl<K: Hash + Eq + Clone, V> LookupCache<K, V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            index: HashMap::with_capacity(capacity),
            slab: Vec::with_capacity(capacity),
            head: NIL,
            tail: NIL,
            capacity,
            stats: CacheStats::default(),
        }
    }

    /// Look up a key, promoting it to most-recently-used on hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let Some(&slot) = self.index.get(key) else {
            self.stats.misses += 1;
            return None;
        };
        self.stats.hits += 1;
        if slot != self.head {
            self.detach(slot);
            self.push_front(slot);
        }
        Some(&self.slab[slot].value)
    }

    /// Insert or replace a value. Returns the evicted entry if the cache was full.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&slot) = self.index.get(&key) {
            self.slab[slot].value = value;
            if slot != self.head {
                self.detach(slot);
                self.push_front(slot);
            }
            return None;
        }

        let node = Node {
            key: key.clone(),
            value,
            prev: NIL,
            next: NIL,
        };

        let (slot, evicted) = if self.slab.len() >= self.capacity {
            let victim = self.tail;
            self.detach(victim);
            let old = std::mem::replace(&mut self.slab[victim], node);
            self.index.remove(&old.key);
            self.stats.evictions += 1;
            (victim, Some((old.key, old.value)))
        } else {
            self.slab.push(node);
            (self.slab.len() - 1, None)
        };

        self.index.insert(key, slot);
        self.push_front(slot);
        evicted
    }

    /// Check for a key without touching recency or counters.
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn detach(&mut self, slot: usize) {
        let (prev, next) = (self.slab[slot].prev, self.slab[slot].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.slab[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.slab[next].prev = prev;
        }
        self.slab[slot].prev = NIL;
        self.slab[slot].next = NIL;
    }

    fn push_front(&mut self, slot: usize) {
        self.slab[slot].prev = NIL;
        self.slab[slot].next = self.head;
        if self.head != NIL {
            self.slab[self.head].prev = slot;
        }
        self.head = slot;
        if self.tail == NIL {
            self.tail = slot;
        }
    }
}
