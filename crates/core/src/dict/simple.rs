//! Single-map dictionary with the same surface as [`ConcurrentDict`], for use
//! where access is already serialized by the owner (stored set values, for
//! example). One uncontended mutex instead of shard striping.

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct SimpleDict<V> {
    map: Mutex<HashMap<String, V>>,
}

impl<V: Clone> SimpleDict<V> {
    pub fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.map.lock().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.lock().contains_key(key)
    }

    pub fn put(&self, key: &str, value: V) -> i32 {
        match self.map.lock().insert(key.to_string(), value) {
            Some(_) => 0,
            None => 1,
        }
    }

    pub fn put_if_absent(&self, key: &str, value: V) -> i32 {
        let mut map = self.map.lock();
        if map.contains_key(key) {
            return 0;
        }
        map.insert(key.to_string(), value);
        1
    }

    pub fn put_if_exists(&self, key: &str, value: V) -> i32 {
        match self.map.lock().get_mut(key) {
            Some(slot) => {
                *slot = value;
                1
            }
            None => 0,
        }
    }

    pub fn remove(&self, key: &str) -> i32 {
        match self.map.lock().remove(key) {
            Some(_) => 1,
            None => 0,
        }
    }

    pub fn for_each(&self, mut f: impl FnMut(&str, &V) -> bool) {
        let map = self.map.lock();
        for (key, value) in map.iter() {
            if !f(key, value) {
                return;
            }
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.map.lock().keys().cloned().collect()
    }

    pub fn random_keys(&self, limit: usize) -> Vec<String> {
        let keys = self.keys();
        if limit >= keys.len() {
            return keys;
        }
        let mut rng = rand::thread_rng();
        (0..limit)
            .map(|_| keys[rng.gen_range(0..keys.len())].clone())
            .collect()
    }

    pub fn random_distinct_keys(&self, limit: usize) -> Vec<String> {
        let mut keys = self.keys();
        if limit >= keys.len() {
            return keys;
        }
        let mut rng = rand::thread_rng();
        let (picked, _) = keys.partial_shuffle(&mut rng, limit);
        picked.to_vec()
    }

    pub fn clear(&self) {
        self.map.lock().clear();
    }
}

impl<V: Clone> Clone for SimpleDict<V> {
    fn clone(&self) -> Self {
        Self {
            map: Mutex::new(self.map.lock().clone()),
        }
    }
}
