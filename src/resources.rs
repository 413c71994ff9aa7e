//! Per-pipeline registry of named shared objects: connection groups, shared caches.
//!
//! Every step context of one pipeline holds a clone of the same [`SharedResources`]; the
//! first step to ask for a name creates the object, the others get the same `Arc`.

use crate::error::StepError;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type Slot = Arc<dyn Any + Send + Sync>;

#[derive(Clone, Default)]
pub struct SharedResources {
  inner: Arc<Mutex<HashMap<String, Slot>>>,
}

impl SharedResources {
  pub fn new() -> Self {
    Self::default()
  }

  /// Stores `value` under `name`, replacing any previous object.
  pub fn insert<T: Any + Send + Sync>(&self, name: impl Into<String>, value: T) -> Arc<T> {
    let value = Arc::new(value);
    self.inner.lock().insert(name.into(), value.clone());
    value
  }

  pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
    self.inner.lock().get(name).cloned()?.downcast::<T>().ok()
  }

  /// Returns the object under `name`, creating it with `create` if absent. The lock is held
  /// while `create` runs, so two copies racing for one connection group create it once.
  pub fn get_or_try_insert_with<T, F>(&self, name: &str, create: F) -> Result<Arc<T>, StepError>
  where
    T: Any + Send + Sync,
    F: FnOnce() -> Result<T, StepError>,
  {
    let mut map = self.inner.lock();
    if let Some(existing) = map.get(name) {
      return existing.clone().downcast::<T>().map_err(|_| {
        StepError::config(format!(
          "shared resource '{}' exists with a different type than {}",
          name,
          std::any::type_name::<T>()
        ))
      });
    }
    debug!(resource = name, "creating shared resource");
    let value = Arc::new(create()?);
    map.insert(name.to_string(), value.clone());
    Ok(value)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.inner.lock().contains_key(name)
  }

  pub fn names(&self) -> Vec<String> {
    let mut names: Vec<String> = self.inner.lock().keys().cloned().collect();
    names.sort();
    names
  }
}

impl fmt::Debug for SharedResources {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SharedResources")
      .field("names", &self.names())
      .finish()
  }
}
