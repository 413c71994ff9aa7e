//! Bounded byte-key → byte-value lookup cache.
//!
//! Open addressing with linear probing over a table whose size is the next power of two
//! at or above the requested capacity. The table never grows: once occupancy passes the
//! load-factor threshold the entries with the smallest insertion sequence numbers are
//! evicted. Deletion uses backward shifting, so probe chains never contain tombstones.
//!
//! A reserved marker value ([`NOT_FOUND`]) memoizes negative lookups against the
//! authoritative store behind the cache.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;

pub const DEFAULT_LOAD_FACTOR: f64 = 0.75;

/// Reserved value marking a key known to be absent from the backing store.
pub const NOT_FOUND: &[u8] = b"\x00\xffstreamweave-etl:not-found\xff\x00";

/// A cache shared by several workers (for example all copies of one step).
pub type SharedCacheIndex = Arc<Mutex<CacheIndex>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
  Hit(&'a [u8]),
  /// The key was cached with the not-found marker.
  KnownAbsent,
  Miss,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
  pub hits: u64,
  pub misses: u64,
  pub inserts: u64,
  pub evictions: u64,
}

#[derive(Debug, Clone)]
struct Entry {
  hash: u64,
  seq: u64,
  key: Box<[u8]>,
  value: Box<[u8]>,
}

pub struct CacheIndex {
  slots: Vec<Option<Entry>>,
  mask: usize,
  len: usize,
  threshold: usize,
  next_seq: u64,
  /// `(seq, hash)` in insertion order; entries whose seq no longer matches are stale.
  order: VecDeque<(u64, u64)>,
  hits: Cell<u64>,
  misses: Cell<u64>,
  inserts: u64,
  evictions: u64,
}

fn hash_key(key: &[u8]) -> u64 {
  xxh3_64(key)
}

impl CacheIndex {
  /// Cache with the default load factor. The table size is `capacity_hint` rounded up to a
  /// power of two (at least 1).
  pub fn new(capacity_hint: usize) -> Self {
    Self::with_load_factor(capacity_hint, DEFAULT_LOAD_FACTOR)
  }

  /// `load_factor` is clamped to `(0, 1]`; the threshold is at least one entry.
  pub fn with_load_factor(capacity_hint: usize, load_factor: f64) -> Self {
    let size = capacity_hint.max(1).next_power_of_two();
    let load_factor = if load_factor.is_finite() && load_factor > 0.0 {
      load_factor.min(1.0)
    } else {
      DEFAULT_LOAD_FACTOR
    };
    let threshold = ((size as f64 * load_factor).floor() as usize).clamp(1, size);
    let mut slots = Vec::with_capacity(size);
    slots.resize_with(size, || None);
    Self {
      slots,
      mask: size - 1,
      len: 0,
      threshold,
      next_seq: 0,
      order: VecDeque::with_capacity(threshold + 1),
      hits: Cell::new(0),
      misses: Cell::new(0),
      inserts: 0,
      evictions: 0,
    }
  }

  /// Wraps the cache for sharing between workers.
  pub fn shared(self) -> SharedCacheIndex {
    Arc::new(Mutex::new(self))
  }

  /// Table capacity (a power of two).
  pub fn size(&self) -> usize {
    self.slots.len()
  }

  /// Maximum number of live entries.
  pub fn threshold(&self) -> usize {
    self.threshold
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn stats(&self) -> CacheStats {
    CacheStats {
      hits: self.hits.get(),
      misses: self.misses.get(),
      inserts: self.inserts,
      evictions: self.evictions,
    }
  }

  fn home(&self, hash: u64) -> usize {
    (hash as usize) & self.mask
  }

  fn find(&self, hash: u64, key: &[u8]) -> Option<usize> {
    let mut idx = self.home(hash);
    for _ in 0..self.slots.len() {
      match &self.slots[idx] {
        None => return None,
        Some(e) if e.hash == hash && *e.key == *key => return Some(idx),
        Some(_) => idx = (idx + 1) & self.mask,
      }
    }
    None
  }

  fn find_seq(&self, hash: u64, seq: u64) -> Option<usize> {
    let mut idx = self.home(hash);
    for _ in 0..self.slots.len() {
      match &self.slots[idx] {
        None => return None,
        Some(e) if e.seq == seq => return Some(idx),
        Some(_) => idx = (idx + 1) & self.mask,
      }
    }
    None
  }

  /// Value stored for `key`. The not-found marker is returned as is; use
  /// [`Self::lookup`] to tell it apart.
  pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
    match self.find(hash_key(key), key) {
      Some(idx) => {
        self.hits.set(self.hits.get() + 1);
        self.slots[idx].as_ref().map(|e| &*e.value)
      }
      None => {
        self.misses.set(self.misses.get() + 1);
        None
      }
    }
  }

  pub fn lookup(&self, key: &[u8]) -> Lookup<'_> {
    match self.get(key) {
      Some(v) if v == NOT_FOUND => Lookup::KnownAbsent,
      Some(v) => Lookup::Hit(v),
      None => Lookup::Miss,
    }
  }

  pub fn contains_key(&self, key: &[u8]) -> bool {
    self.find(hash_key(key), key).is_some()
  }

  /// Inserts or overwrites. An overwrite takes a fresh sequence number.
  pub fn put(&mut self, key: &[u8], value: &[u8]) {
    let hash = hash_key(key);
    let seq = self.next_seq;
    self.next_seq += 1;

    if let Some(idx) = self.find(hash, key) {
      if let Some(e) = self.slots[idx].as_mut() {
        e.value = value.into();
        e.seq = seq;
      }
      self.order.push_back((seq, hash));
      self.compact_order();
      return;
    }

    // A full table has no free slot to probe into, so make room first.
    if self.len == self.slots.len() {
      self.evict_oldest();
    }
    let mut idx = self.home(hash);
    while self.slots[idx].is_some() {
      idx = (idx + 1) & self.mask;
    }
    self.slots[idx] = Some(Entry {
      hash,
      seq,
      key: key.into(),
      value: value.into(),
    });
    self.len += 1;
    self.inserts += 1;
    self.order.push_back((seq, hash));

    while self.len > self.threshold {
      if !self.evict_oldest() {
        break;
      }
    }
    self.compact_order();
  }

  /// Memoizes that `key` is absent from the backing store.
  pub fn put_not_found(&mut self, key: &[u8]) {
    self.put(key, NOT_FOUND);
  }

  pub fn remove(&mut self, key: &[u8]) -> Option<Box<[u8]>> {
    let idx = self.find(hash_key(key), key)?;
    self.remove_at(idx).map(|e| e.value)
  }

  pub fn clear(&mut self) {
    for slot in &mut self.slots {
      *slot = None;
    }
    self.order.clear();
    self.len = 0;
  }

  fn evict_oldest(&mut self) -> bool {
    while let Some((seq, hash)) = self.order.pop_front() {
      if let Some(idx) = self.find_seq(hash, seq) {
        self.remove_at(idx);
        self.evictions += 1;
        return true;
      }
    }
    false
  }

  fn remove_at(&mut self, idx: usize) -> Option<Entry> {
    let removed = self.slots[idx].take()?;
    self.len -= 1;
    let mut hole = idx;
    let mut next = (idx + 1) & self.mask;
    loop {
      let Some(home) = self.slots[next].as_ref().map(|e| self.home(e.hash)) else {
        break;
      };
      // The entry at `next` may fill the hole when the hole lies on its probe path.
      let dist_next = next.wrapping_sub(home) & self.mask;
      let dist_hole = hole.wrapping_sub(home) & self.mask;
      if dist_hole < dist_next {
        self.slots[hole] = self.slots[next].take();
        hole = next;
      }
      next = (next + 1) & self.mask;
    }
    Some(removed)
  }

  fn compact_order(&mut self) {
    if self.order.len() <= 2 * self.slots.len() + 16 {
      return;
    }
    let mut live: Vec<(u64, u64)> = self
      .slots
      .iter()
      .flatten()
      .map(|e| (e.seq, e.hash))
      .collect();
    live.sort_unstable_by_key(|(seq, _)| *seq);
    self.order = live.into();
  }
}

impl fmt::Debug for CacheIndex {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheIndex")
      .field("size", &self.slots.len())
      .field("len", &self.len)
      .field("threshold", &self.threshold)
      .field("stats", &self.stats())
      .finish()
  }
}
