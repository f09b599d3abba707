//! Sharded concurrent dictionary.
//!
//! A fixed table of shards, each an independent `HashMap` behind its own
//! reader-writer lock. The shard for a key is `fnv32(key) & (shards - 1)`.
//! The total entry count lives in an atomic so `len()` never touches a lock;
//! it is a snapshot, not a transactional observation.

use crate::hash::{fnv32, spread};
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

const MIN_SHARDS: usize = 16;

fn compute_capacity(requested: usize) -> usize {
    if requested <= MIN_SHARDS {
        MIN_SHARDS
    } else {
        requested.next_power_of_two()
    }
}

struct Shard<V> {
    map: RwLock<HashMap<String, V>>,
}

impl<V> Shard<V> {
    fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }

    /// First key the map iterator yields, if any. Iteration order is
    /// arbitrary but stays the same until the map is mutated, so repeated
    /// draws from one shard repeat the same key. Only with-replacement
    /// sampling, where duplicates are fine, may use this.
    fn any_key(&self) -> Option<String> {
        self.map.read().keys().next().cloned()
    }
}

pub struct ConcurrentDict<V> {
    table: Vec<Shard<V>>,
    count: AtomicI64,
}

impl<V: Clone> ConcurrentDict<V> {
    /// Create a dictionary with at least `shard_count` shards, rounded up to
    /// the next power of two and never below 16.
    pub fn new(shard_count: usize) -> Self {
        let shards = compute_capacity(shard_count);
        Self {
            table: (0..shards).map(|_| Shard::new()).collect(),
            count: AtomicI64::new(0),
        }
    }

    fn shard(&self, key: &str) -> &Shard<V> {
        &self.table[spread(fnv32(key), self.table.len())]
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.shard(key).map.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.shard(key).map.read().contains_key(key)
    }

    /// Insert or update. Returns 1 when a new key was inserted, 0 on update.
    pub fn put(&self, key: &str, value: V) -> i32 {
        let mut map = self.shard(key).map.write();
        if map.insert(key.to_string(), value).is_some() {
            0
        } else {
            self.count.fetch_add(1, Ordering::Relaxed);
            1
        }
    }

    /// Insert only when the key is absent. Returns 1 when inserted.
    pub fn put_if_absent(&self, key: &str, value: V) -> i32 {
        let mut map = self.shard(key).map.write();
        if map.contains_key(key) {
            return 0;
        }
        map.insert(key.to_string(), value);
        self.count.fetch_add(1, Ordering::Relaxed);
        1
    }

    /// Update only when the key is present. Returns 1 when updated.
    pub fn put_if_exists(&self, key: &str, value: V) -> i32 {
        let mut map = self.shard(key).map.write();
        match map.get_mut(key) {
            Some(slot) => {
                *slot = value;
                1
            }
            None => 0,
        }
    }

    /// Delete. Returns 1 when the key was present.
    pub fn remove(&self, key: &str) -> i32 {
        let mut map = self.shard(key).map.write();
        if map.remove(key).is_some() {
            self.count.fetch_sub(1, Ordering::Relaxed);
            1
        } else {
            0
        }
    }

    /// Visit entries shard by shard, holding each shard's read lock only for
    /// that shard's traversal. Stops as soon as the callback returns false.
    /// There is no cross-shard snapshot; consistency is per shard.
    pub fn for_each(&self, mut f: impl FnMut(&str, &V) -> bool) {
        for shard in &self.table {
            let map = shard.map.read();
            for (key, value) in map.iter() {
                if !f(key, value) {
                    return;
                }
            }
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.len());
        self.for_each(|key, _| {
            keys.push(key.to_string());
            true
        });
        keys
    }

    /// Sample `limit` keys with replacement. When the dictionary holds no
    /// more than `limit` keys, every key is returned instead.
    pub fn random_keys(&self, limit: usize) -> Vec<String> {
        if limit >= self.len() {
            return self.keys();
        }
        let mut rng = rand::thread_rng();
        let mut result = Vec::with_capacity(limit);
        while result.len() < limit {
            if self.is_empty() {
                break;
            }
            let shard = &self.table[rng.gen_range(0..self.table.len())];
            if let Some(key) = shard.any_key() {
                result.push(key);
            }
        }
        result
    }

    /// Sample `limit` distinct keys. When the dictionary holds no more than
    /// `limit` keys, every key is returned. Works on a per-shard snapshot of
    /// the key set, so one pass bounds the work regardless of `limit`.
    pub fn random_distinct_keys(&self, limit: usize) -> Vec<String> {
        let mut keys = self.keys();
        if limit >= keys.len() {
            return keys;
        }
        let mut rng = rand::thread_rng();
        let (picked, _) = keys.partial_shuffle(&mut rng, limit);
        picked.to_vec()
    }

    /// Drop every entry. Each shard is emptied under its own write lock;
    /// concurrent writers may land entries in already-cleared shards, so the
    /// count afterwards is best-effort, exactly like `len()`.
    pub fn clear(&self) {
        for shard in &self.table {
            shard.map.write().clear();
        }
        self.count.store(0, Ordering::Relaxed);
    }
}
