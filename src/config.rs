//! Engine configuration.
//!
//! Defaults come from [`EngineConfig::default`], a graph description may embed its own
//! settings, the CLI overrides those, and `STREAMWEAVE_ETL_*` environment variables
//! override everything.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Rows buffered per channel unless configured otherwise.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;
pub const DEFAULT_ERROR_CHANNEL_CAPACITY: usize = 10_000;

pub const ENV_CHANNEL_CAPACITY: &str = "STREAMWEAVE_ETL_CHANNEL_CAPACITY";
pub const ENV_ERROR_CHANNEL_CAPACITY: &str = "STREAMWEAVE_ETL_ERROR_CHANNEL_CAPACITY";
pub const ENV_ERROR_PUT_TIMEOUT_MS: &str = "STREAMWEAVE_ETL_ERROR_PUT_TIMEOUT_MS";
pub const ENV_FAILURE_POLICY: &str = "STREAMWEAVE_ETL_FAILURE_POLICY";
pub const ENV_SAFE_MODE: &str = "STREAMWEAVE_ETL_SAFE_MODE";

/// What the scheduler does when a worker enters ERROR.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
  /// Stop every worker immediately.
  #[default]
  Abort,
  /// Stop only the failed worker's downstream; unrelated branches run to completion.
  IsolateBranch,
}

impl fmt::Display for FailurePolicy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FailurePolicy::Abort => write!(f, "abort"),
      FailurePolicy::IsolateBranch => write!(f, "isolate_branch"),
    }
  }
}

impl FromStr for FailurePolicy {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim() {
      "abort" => Ok(FailurePolicy::Abort),
      "isolate_branch" | "isolate" => Ok(FailurePolicy::IsolateBranch),
      other => Err(format!("unknown failure policy '{}'", other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub channel_capacity: usize,
  pub error_channel_capacity: usize,
  /// How long a rejected row may wait for room on a full error channel. 0 = fail at once.
  pub error_put_timeout_ms: u64,
  pub failure_policy: FailurePolicy,
  /// Check row arity and types on every put, and input schema compatibility on fan-in.
  pub safe_mode: bool,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      channel_capacity: DEFAULT_CHANNEL_CAPACITY,
      error_channel_capacity: DEFAULT_ERROR_CHANNEL_CAPACITY,
      error_put_timeout_ms: 0,
      failure_policy: FailurePolicy::Abort,
      safe_mode: false,
    }
  }
}

impl EngineConfig {
  pub fn error_put_timeout(&self) -> Duration {
    Duration::from_millis(self.error_put_timeout_ms)
  }

  pub fn validate(&self) -> Result<(), String> {
    if self.channel_capacity == 0 {
      return Err("channel_capacity must be at least 1".to_string());
    }
    if self.error_channel_capacity == 0 {
      return Err("error_channel_capacity must be at least 1".to_string());
    }
    Ok(())
  }

  /// Sets one setting by name, as found in DOT `graph [...]` attributes.
  pub fn set(&mut self, key: &str, value: &str) -> Result<bool, String> {
    let bad = |e: String| format!("invalid value '{}' for {}: {}", value, key, e);
    match key {
      "channel_capacity" => {
        self.channel_capacity = value
          .trim()
          .parse::<usize>()
          .map_err(|e| bad(e.to_string()))?
      }
      "error_channel_capacity" => {
        self.error_channel_capacity = value
          .trim()
          .parse::<usize>()
          .map_err(|e| bad(e.to_string()))?
      }
      "error_put_timeout_ms" => {
        self.error_put_timeout_ms = value
          .trim()
          .parse::<u64>()
          .map_err(|e| bad(e.to_string()))?
      }
      "failure_policy" => self.failure_policy = value.parse::<FailurePolicy>().map_err(bad)?,
      "safe_mode" => {
        self.safe_mode = parse_bool(value).ok_or_else(|| bad("expected a boolean".to_string()))?
      }
      _ => return Ok(false),
    }
    Ok(true)
  }

  /// Applies `STREAMWEAVE_ETL_*` overrides from the process environment.
  pub fn apply_env(&mut self) -> Result<(), String> {
    self.apply_env_from(|k| std::env::var(k).ok())
  }

  pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), String>
  where
    F: Fn(&str) -> Option<String>,
  {
    let pairs = [
      (ENV_CHANNEL_CAPACITY, "channel_capacity"),
      (ENV_ERROR_CHANNEL_CAPACITY, "error_channel_capacity"),
      (ENV_ERROR_PUT_TIMEOUT_MS, "error_put_timeout_ms"),
      (ENV_FAILURE_POLICY, "failure_policy"),
      (ENV_SAFE_MODE, "safe_mode"),
    ];
    for (var, key) in pairs {
      if let Some(value) = lookup(var) {
        self.set(key, &value).map_err(|e| format!("{}: {}", var, e))?;
      }
    }
    Ok(())
  }
}

pub(crate) fn parse_bool(s: &str) -> Option<bool> {
  match s.trim().to_ascii_lowercase().as_str() {
    "true" | "1" | "yes" | "y" => Some(true),
    "false" | "0" | "no" | "n" => Some(false),
    _ => None,
  }
}
