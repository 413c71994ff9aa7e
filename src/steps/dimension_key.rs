//! Surrogate-key lookup: a [`CacheIndex`] in front of an authoritative [`KeyStore`].
//!
//! Key fields of each input row are encoded with [`encode_key`] and looked up in the cache
//! first. On a miss the store is asked and the answer cached, negative answers included.
//! The surrogate key is appended to the row as an integer field. A key the store does not
//! know, with no default, is a per-row error routed to the error output.

use crate::cache_index::{CacheIndex, CacheStats, Lookup, SharedCacheIndex};
use crate::error::StepError;
use crate::row_codec::{encode_key, encode_values};
use crate::step::{Step, StepContext, decode_config};
use crate::step_io::StepIo;
use crate::types::{FieldMeta, NodeRecord, Row, RowErrorCause, Schema, Value, ValueType};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, instrument};

/// Error code of rows whose key has no surrogate.
pub const KEY_NOT_FOUND_CODE: &str = "DK001";

/// Authoritative key → surrogate mapping behind the cache. Keys are encoded key fields.
#[async_trait]
pub trait KeyStore: Send + Sync {
  async fn lookup(&self, key: &[u8]) -> Result<Option<i64>, StepError>;

  /// Returns the surrogate of `key`, allocating one if needed.
  async fn insert(&self, key: &[u8]) -> Result<i64, StepError>;
}

/// Shared-resource wrapper naming the store of one group.
#[derive(Clone)]
pub struct KeyStoreHandle {
  store: Arc<dyn KeyStore>,
}

impl KeyStoreHandle {
  pub fn new(store: Arc<dyn KeyStore>) -> Self {
    Self { store }
  }

  pub fn store(&self) -> &Arc<dyn KeyStore> {
    &self.store
  }
}

impl fmt::Debug for KeyStoreHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("KeyStoreHandle")
  }
}

/// Name under which the store of `group` lives in [`crate::SharedResources`].
pub fn keystore_resource_name(group: &str) -> String {
  format!("keystore:{}", group)
}

struct MemoryState {
  keys: HashMap<Vec<u8>, i64>,
  next_key: i64,
}

/// In-memory [`KeyStore`]; surrogates are allocated from 1 upwards.
pub struct MemoryKeyStore {
  state: Mutex<MemoryState>,
  lookups: AtomicU64,
}

impl Default for MemoryKeyStore {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryKeyStore {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(MemoryState {
        keys: HashMap::new(),
        next_key: 1,
      }),
      lookups: AtomicU64::new(0),
    }
  }

  /// Preloads `key` (the key field values, in key order) with `surrogate`.
  pub fn with_key(self, key: &[Value], surrogate: i64) -> Self {
    {
      let mut state = self.state.lock();
      state.keys.insert(encode_values(key).to_vec(), surrogate);
      state.next_key = state.next_key.max(surrogate + 1);
    }
    self
  }

  pub fn len(&self) -> usize {
    self.state.lock().keys.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Lookups served so far; cache hits never reach the store.
  pub fn lookups(&self) -> u64 {
    self.lookups.load(Ordering::Relaxed)
  }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
  async fn lookup(&self, key: &[u8]) -> Result<Option<i64>, StepError> {
    self.lookups.fetch_add(1, Ordering::Relaxed);
    Ok(self.state.lock().keys.get(key).copied())
  }

  async fn insert(&self, key: &[u8]) -> Result<i64, StepError> {
    let mut state = self.state.lock();
    if let Some(existing) = state.keys.get(key) {
      return Ok(*existing);
    }
    let surrogate = state.next_key;
    state.next_key += 1;
    state.keys.insert(key.to_vec(), surrogate);
    Ok(surrogate)
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupMode {
  #[default]
  Lookup,
  /// Allocate a surrogate for unknown keys.
  LookupOrInsert,
}

fn default_output_field() -> String {
  "technical_key".to_string()
}

fn default_cache_size() -> usize {
  5000
}

fn default_store() -> String {
  "default".to_string()
}

fn yes() -> bool {
  true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DimensionKeyConfig {
  /// Input fields forming the natural key.
  pub keys: Vec<String>,
  #[serde(default = "default_output_field")]
  pub output_field: String,
  /// Cache capacity hint; 0 disables the cache.
  #[serde(default = "default_cache_size")]
  pub cache_size: usize,
  /// Key store group in the shared resources. A group with no registered store gets an
  /// in-memory one.
  #[serde(default = "default_store")]
  pub store: String,
  #[serde(default)]
  pub mode: LookupMode,
  /// Surrogate used for unknown keys instead of rejecting the row.
  #[serde(default)]
  pub default_key: Option<i64>,
  /// All copies of the step share one cache.
  #[serde(default)]
  pub shared_cache: bool,
  /// Remember keys the store does not know.
  #[serde(default = "yes")]
  pub cache_negative: bool,
}

enum CacheHandle {
  Disabled,
  Owned(CacheIndex),
  Shared(SharedCacheIndex),
}

enum Cached {
  Hit(i64),
  Absent,
  Miss,
}

fn classify(lookup: Lookup<'_>) -> Cached {
  match lookup {
    Lookup::Hit(bytes) => match <[u8; 8]>::try_from(bytes) {
      Ok(raw) => Cached::Hit(i64::from_be_bytes(raw)),
      Err(_) => Cached::Miss,
    },
    Lookup::KnownAbsent => Cached::Absent,
    Lookup::Miss => Cached::Miss,
  }
}

impl CacheHandle {
  fn get(&self, key: &[u8]) -> Cached {
    match self {
      CacheHandle::Disabled => Cached::Miss,
      CacheHandle::Owned(cache) => classify(cache.lookup(key)),
      CacheHandle::Shared(cache) => classify(cache.lock().lookup(key)),
    }
  }

  fn put(&mut self, key: &[u8], surrogate: i64) {
    let value = surrogate.to_be_bytes();
    match self {
      CacheHandle::Disabled => {}
      CacheHandle::Owned(cache) => cache.put(key, &value),
      CacheHandle::Shared(cache) => cache.lock().put(key, &value),
    }
  }

  fn put_not_found(&mut self, key: &[u8]) {
    match self {
      CacheHandle::Disabled => {}
      CacheHandle::Owned(cache) => cache.put_not_found(key),
      CacheHandle::Shared(cache) => cache.lock().put_not_found(key),
    }
  }

  fn stats(&self) -> Option<CacheStats> {
    match self {
      CacheHandle::Disabled => None,
      CacheHandle::Owned(cache) => Some(cache.stats()),
      CacheHandle::Shared(cache) => Some(cache.lock().stats()),
    }
  }
}

pub struct DimensionKeyStep {
  config: DimensionKeyConfig,
  cache: CacheHandle,
  store: Option<Arc<dyn KeyStore>>,
  key_indexes: Option<Vec<usize>>,
}

impl DimensionKeyStep {
  pub const TYPE: &'static str = "dimension_key";

  pub fn from_node(node: &NodeRecord) -> Result<Self, StepError> {
    Self::new(decode_config(node)?)
  }

  pub fn new(config: DimensionKeyConfig) -> Result<Self, StepError> {
    if config.keys.is_empty() {
      return Err(StepError::config("at least one key field is required"));
    }
    Ok(Self {
      config,
      cache: CacheHandle::Disabled,
      store: None,
      key_indexes: None,
    })
  }

  pub fn cache_stats(&self) -> Option<CacheStats> {
    self.cache.stats()
  }

  /// Resolves key positions and the output schema from the first input schema.
  fn prepare(&mut self, io: &mut StepIo) -> Result<Vec<usize>, StepError> {
    if let Some(indexes) = &self.key_indexes {
      return Ok(indexes.clone());
    }
    let input = io.input_schema().cloned().ok_or_else(|| {
      StepError::SchemaMismatch("dimension key lookup needs a typed input".to_string())
    })?;
    let indexes = input
      .indexes_of(&self.config.keys)
      .map_err(StepError::SchemaMismatch)?;
    let output: Schema =
      input.extended(&[FieldMeta::new(&self.config.output_field, ValueType::Integer)]);
    io.set_output_schema(output);
    self.key_indexes = Some(indexes.clone());
    Ok(indexes)
  }

  async fn resolve(
    &mut self,
    store: &dyn KeyStore,
    key: &[u8],
    io: &StepIo,
  ) -> Result<Option<i64>, StepError> {
    match self.cache.get(key) {
      Cached::Hit(surrogate) => return Ok(Some(surrogate)),
      Cached::Absent if self.config.mode == LookupMode::Lookup => return Ok(None),
      Cached::Absent | Cached::Miss => {}
    }
    io.counters().add_input(1);
    match store.lookup(key).await? {
      Some(surrogate) => {
        self.cache.put(key, surrogate);
        Ok(Some(surrogate))
      }
      None if self.config.mode == LookupMode::LookupOrInsert => {
        let surrogate = store.insert(key).await?;
        io.counters().add_output(1);
        self.cache.put(key, surrogate);
        Ok(Some(surrogate))
      }
      None => {
        if self.config.cache_negative {
          self.cache.put_not_found(key);
        }
        Ok(None)
      }
    }
  }
}

fn describe_key(row: &Row, indexes: &[usize]) -> String {
  indexes
    .iter()
    .filter_map(|&i| row.get(i))
    .map(|v| v.to_string())
    .collect::<Vec<_>>()
    .join(", ")
}

#[async_trait]
impl Step for DimensionKeyStep {
  #[instrument(level = "trace", skip(self, ctx), fields(step = %ctx.step_name()))]
  async fn init(&mut self, ctx: &StepContext) -> Result<(), StepError> {
    let handle = ctx.resources().get_or_try_insert_with(
      &keystore_resource_name(&self.config.store),
      || Ok(KeyStoreHandle::new(Arc::new(MemoryKeyStore::new()))),
    )?;
    self.store = Some(handle.store().clone());
    self.cache = match self.config.cache_size {
      0 => CacheHandle::Disabled,
      size if self.config.shared_cache => {
        let name = format!("cache:{}", ctx.step_name());
        CacheHandle::Shared(
          ctx
            .resources()
            .get_or_try_insert_with(&name, || Ok(Mutex::new(CacheIndex::new(size))))?,
        )
      }
      size => CacheHandle::Owned(CacheIndex::new(size)),
    };
    debug!(store = %self.config.store, cache_size = self.config.cache_size, "dimension key lookup ready");
    Ok(())
  }

  async fn process_one_iteration(&mut self, io: &mut StepIo) -> Result<bool, StepError> {
    let Some(row) = io.get_row().await? else {
      return Ok(false);
    };
    let store = self
      .store
      .clone()
      .ok_or_else(|| StepError::failed("key store not initialized"))?;
    let indexes = self.prepare(io)?;
    let key = encode_key(&row, &indexes)?;
    let surrogate = match self.resolve(store.as_ref(), &key, io).await? {
      Some(surrogate) => surrogate,
      None => match self.config.default_key {
        Some(default) => default,
        None => {
          let cause = RowErrorCause::new(format!(
            "no surrogate key for ({})",
            describe_key(&row, &indexes)
          ))
          .with_fields(self.config.keys.join(","))
          .with_code(KEY_NOT_FOUND_CODE);
          io.put_error(row, cause).await?;
          return Ok(true);
        }
      },
    };
    io.put_row(row.extended([Value::Integer(surrogate)])).await?;
    Ok(true)
  }

  async fn dispose(&mut self, ctx: &StepContext) {
    if let Some(stats) = self.cache.stats() {
      debug!(
        step = %ctx.step_name(),
        hits = stats.hits,
        misses = stats.misses,
        evictions = stats.evictions,
        "dimension key cache statistics"
      );
    }
  }
}
