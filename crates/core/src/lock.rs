//! Multi-key lock table.
//!
//! Some commands touch several keys and must hold every one of them at once
//! (MSETNX, EXEC batches). A fixed table of reader-writer locks is indexed by
//! key hash; acquiring a set of keys always walks the distinct stripe indices
//! in ascending order, which rules out lock-order cycles between concurrent
//! multi-key callers. Release happens in descending order when the returned
//! guard drops.
//!
//! There are no try-locks and no timeouts; every acquisition blocks until it
//! succeeds.

use crate::hash::{fnv32, spread};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::{BTreeSet, HashSet};

pub const DEFAULT_TABLE_SIZE: usize = 1024;

pub struct KeyLocks {
    table: Vec<RwLock<()>>,
}

enum StripeGuard<'a> {
    Read(#[allow(dead_code)] RwLockReadGuard<'a, ()>),
    Write(#[allow(dead_code)] RwLockWriteGuard<'a, ()>),
}

/// Holds a set of stripe locks. Dropping releases them in descending stripe
/// order, the inverse of acquisition.
pub struct RwLocksGuard<'a> {
    guards: Vec<StripeGuard<'a>>,
}

impl Drop for RwLocksGuard<'_> {
    fn drop(&mut self) {
        while self.guards.pop().is_some() {}
    }
}

impl KeyLocks {
    /// Table with `size` stripes, rounded up to a power of two.
    pub fn new(size: usize) -> Self {
        let size = size.next_power_of_two().max(1);
        Self {
            table: (0..size).map(|_| RwLock::new(())).collect(),
        }
    }

    fn index(&self, key: &str) -> usize {
        spread(fnv32(key), self.table.len())
    }

    /// Exclusive lock on a single key's stripe.
    pub fn lock(&self, key: &str) -> RwLockWriteGuard<'_, ()> {
        self.table[self.index(key)].write()
    }

    /// Shared lock on a single key's stripe.
    pub fn rlock(&self, key: &str) -> RwLockReadGuard<'_, ()> {
        self.table[self.index(key)].read()
    }

    /// Distinct stripe indices for a key set, ascending. Different keys may
    /// share a stripe, hence the set.
    fn lock_indices<'k>(&self, keys: impl IntoIterator<Item = &'k String>) -> BTreeSet<usize> {
        keys.into_iter().map(|k| self.index(k)).collect()
    }

    /// Acquire every stripe covering `write_keys` and `read_keys`, in global
    /// ascending stripe order. A stripe hit by any write key is taken
    /// exclusively, otherwise shared.
    pub fn rw_locks<'a>(&'a self, write_keys: &[String], read_keys: &[String]) -> RwLocksGuard<'a> {
        let indices = self.lock_indices(write_keys.iter().chain(read_keys.iter()));
        let write_indices: HashSet<usize> = write_keys.iter().map(|k| self.index(k)).collect();
        let mut guards = Vec::with_capacity(indices.len());
        for index in indices {
            let stripe = &self.table[index];
            if write_indices.contains(&index) {
                guards.push(StripeGuard::Write(stripe.write()));
            } else {
                guards.push(StripeGuard::Read(stripe.read()));
            }
        }
        RwLocksGuard { guards }
    }
}

impl Default for KeyLocks {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE_SIZE)
    }
}
