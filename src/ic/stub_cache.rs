//! The megamorphic stub cache
//!
//! A bounded table shared by every megamorphic site, mapping (name, receiver shape,
//! operation kind) to the monomorphic stub compiled for that combination. When the table
//! is full an arbitrary entry is evicted; the victim is picked by a seeded generator so
//! runs are reproducible.

use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap as HashMap;

use super::state::IcKind;
use super::stub::Stub;
use crate::heap::{Name, ShapeId};

const EVICTION_SEED: u64 = 0x5eed_cace;

/// Counters describing stub cache traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StubCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
}

#[derive(Debug)]
pub struct StubCache {
    entries: HashMap<(Name, ShapeId, IcKind), Rc<Stub>>,
    capacity: usize,
    rng: StdRng,
    stats: StubCacheStats,
}

impl StubCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::default(),
            capacity: capacity.max(1),
            rng: StdRng::seed_from_u64(EVICTION_SEED),
            stats: StubCacheStats::default(),
        }
    }

    /// Insert or replace the stub for `(name, shape)`
    pub fn set(&mut self, name: Name, shape: ShapeId, stub: Rc<Stub>) {
        let key = (name, shape, stub.kind());
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_one();
        }
        self.entries.insert(key, stub);
        self.stats.insertions += 1;
    }

    /// Probe for the stub of `kind` compiled for `(name, shape)`
    pub fn get(&mut self, name: Name, shape: ShapeId, kind: IcKind) -> Option<Rc<Stub>> {
        match self.entries.get(&(name, shape, kind)) {
            Some(stub) => {
                self.stats.hits += 1;
                Some(Rc::clone(stub))
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    fn evict_one(&mut self) {
        let victim_index = self.rng.gen_range(0..self.entries.len());
        if let Some(victim) = self.entries.keys().nth(victim_index).copied() {
            self.entries.remove(&victim);
            self.stats.evictions += 1;
        }
    }

    /// Drop every entry keyed on `shape`; returns how many were removed
    pub fn evict_shape(&mut self, shape: ShapeId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|&(_, s, _), _| s != shape);
        let removed = before - self.entries.len();
        self.stats.evictions += removed as u64;
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> StubCacheStats {
        self.stats
    }
}
