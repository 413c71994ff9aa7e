//! Tests for `CacheIndex`.

use crate::cache_index::{CacheIndex, Lookup, NOT_FOUND};
use proptest::prelude::*;
use std::collections::VecDeque;

fn key(i: u32) -> Vec<u8> {
  format!("key-{}", i).into_bytes()
}

#[test]
fn sizing_rounds_up_to_power_of_two() {
  for (hint, size) in [(0, 1), (1, 1), (2, 2), (3, 4), (12, 16), (99, 128), (1024, 1024)] {
    assert_eq!(CacheIndex::new(hint).size(), size, "hint {}", hint);
  }
}

#[test]
fn threshold_follows_load_factor() {
  assert_eq!(CacheIndex::new(16).threshold(), 12);
  assert_eq!(CacheIndex::new(1).threshold(), 1);
  assert_eq!(CacheIndex::with_load_factor(8, 1.0).threshold(), 8);
  assert_eq!(CacheIndex::with_load_factor(8, -3.0).threshold(), 6);
}

#[test]
fn roundtrip_and_absent_keys() {
  let mut c = CacheIndex::new(64);
  c.put(b"alpha", b"1");
  c.put(b"beta", b"2");
  assert_eq!(c.get(b"alpha"), Some(&b"1"[..]));
  assert_eq!(c.get(b"beta"), Some(&b"2"[..]));
  assert_eq!(c.get(b"gamma"), None);
  assert_eq!(c.len(), 2);
}

#[test]
fn keys_compare_bytewise() {
  let mut c = CacheIndex::new(8);
  c.put(&[1, 2, 3], b"a");
  assert_eq!(c.get(&[1, 2, 3]), Some(&b"a"[..]));
  assert_eq!(c.get(&[1, 2]), None);
  assert_eq!(c.get(&[1, 2, 3, 0]), None);
}

#[test]
fn overwrite_keeps_single_entry() {
  let mut c = CacheIndex::new(8);
  c.put(b"k", b"old");
  c.put(b"k", b"new");
  assert_eq!(c.len(), 1);
  assert_eq!(c.get(b"k"), Some(&b"new"[..]));
}

#[test]
fn eviction_removes_oldest_first() {
  // size 4, threshold 3
  let mut c = CacheIndex::new(4);
  for i in 0..4 {
    c.put(&key(i), b"v");
  }
  assert_eq!(c.len(), 3);
  assert!(!c.contains_key(&key(0)));
  for i in 1..4 {
    assert!(c.contains_key(&key(i)), "key {} should survive", i);
  }
  c.put(&key(4), b"v");
  assert!(!c.contains_key(&key(1)));
  assert_eq!(c.stats().evictions, 2);
}

#[test]
fn eviction_order_is_insertion_order_not_access_order() {
  let mut c = CacheIndex::new(4);
  for i in 0..3 {
    c.put(&key(i), b"v");
  }
  // Reading key 0 does not protect it.
  assert!(c.get(&key(0)).is_some());
  c.put(&key(3), b"v");
  assert!(!c.contains_key(&key(0)));
}

#[test]
fn overwrite_refreshes_sequence() {
  let mut c = CacheIndex::new(4);
  for i in 0..3 {
    c.put(&key(i), b"v");
  }
  c.put(&key(0), b"w");
  c.put(&key(3), b"v");
  assert!(c.contains_key(&key(0)));
  assert!(!c.contains_key(&key(1)));
}

#[test]
fn single_slot_table_keeps_latest() {
  let mut c = CacheIndex::new(1);
  c.put(b"a", b"1");
  c.put(b"b", b"2");
  assert_eq!(c.len(), 1);
  assert_eq!(c.get(b"a"), None);
  assert_eq!(c.get(b"b"), Some(&b"2"[..]));
}

#[test]
fn full_load_factor_never_overflows() {
  let mut c = CacheIndex::with_load_factor(8, 1.0);
  for i in 0..100 {
    c.put(&key(i), b"v");
    assert!(c.len() <= 8);
  }
  for i in 92..100 {
    assert!(c.contains_key(&key(i)));
  }
}

#[test]
fn not_found_marker_lookup() {
  let mut c = CacheIndex::new(8);
  c.put_not_found(b"missing");
  c.put(b"present", b"42");
  assert_eq!(c.lookup(b"missing"), Lookup::KnownAbsent);
  assert_eq!(c.lookup(b"present"), Lookup::Hit(b"42"));
  assert_eq!(c.lookup(b"other"), Lookup::Miss);
  assert_eq!(c.get(b"missing"), Some(NOT_FOUND));
}

#[test]
fn remove_keeps_probe_chains_intact() {
  let mut c = CacheIndex::with_load_factor(64, 1.0);
  for i in 0u32..48 {
    c.put(&key(i), &i.to_be_bytes());
  }
  for i in (0u32..48).step_by(3) {
    assert!(c.remove(&key(i)).is_some());
  }
  assert!(c.remove(&key(0)).is_none());
  for i in 0u32..48 {
    let expected = if i % 3 == 0 { None } else { Some(i.to_be_bytes().to_vec()) };
    assert_eq!(c.get(&key(i)).map(<[u8]>::to_vec), expected, "key {}", i);
  }
  assert_eq!(c.len(), 32);
}

#[test]
fn clear_empties_the_table() {
  let mut c = CacheIndex::new(8);
  c.put(b"a", b"1");
  c.clear();
  assert!(c.is_empty());
  assert_eq!(c.get(b"a"), None);
  c.put(b"b", b"2");
  assert_eq!(c.len(), 1);
}

#[test]
fn stats_count_hits_and_misses() {
  let mut c = CacheIndex::new(8);
  c.put(b"a", b"1");
  c.get(b"a");
  c.get(b"a");
  c.get(b"b");
  let s = c.stats();
  assert_eq!((s.hits, s.misses, s.inserts), (2, 1, 1));
}

#[test]
fn shared_cache_serializes_access() {
  let shared = CacheIndex::new(16).shared();
  let handles: Vec<_> = (0..4)
    .map(|t| {
      let shared = shared.clone();
      std::thread::spawn(move || {
        for i in 0..50u32 {
          shared.lock().put(&key(t * 1000 + i), b"v");
        }
      })
    })
    .collect();
  for h in handles {
    h.join().unwrap();
  }
  let c = shared.lock();
  assert_eq!(c.len(), c.threshold());
}

proptest! {
  /// The cache behaves like a FIFO-bounded map: same contents as a model that drops the
  /// oldest insertion whenever it holds more than `threshold` keys.
  #[test]
  fn matches_fifo_model(
    hint in 1usize..32,
    ops in prop::collection::vec((0u32..40, any::<u8>()), 1..300),
  ) {
    let mut cache = CacheIndex::new(hint);
    let threshold = cache.threshold();
    let mut model: VecDeque<(u32, u8)> = VecDeque::new();
    for (k, v) in ops {
      cache.put(&key(k), &[v]);
      model.retain(|(mk, _)| *mk != k);
      model.push_back((k, v));
      while model.len() > threshold {
        model.pop_front();
      }
      prop_assert!(cache.len() <= threshold);
      prop_assert_eq!(cache.len(), model.len());
    }
    for k in 0..40u32 {
      let expected = model.iter().find(|(mk, _)| *mk == k).map(|(_, v)| vec![*v]);
      prop_assert_eq!(cache.get(&key(k)).map(<[u8]>::to_vec), expected);
    }
  }
}
