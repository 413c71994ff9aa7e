//! How rows spread over edges and over the copies of a target step.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Policy of one edge across the copies of its target step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum Distribution {
  #[default]
  RoundRobin,
  CopyToAll,
  /// Rows with equal values in `fields` always reach the same copy.
  Keyed { fields: Vec<String> },
}

impl Distribution {
  /// Parses the DOT form: `round_robin`, `copy_to_all`, or `keyed` with `keys="a,b"`.
  pub fn parse(policy: &str, keys: Option<&str>) -> Result<Distribution, String> {
    match policy.trim() {
      "round_robin" => Ok(Distribution::RoundRobin),
      "copy_to_all" | "copy" => Ok(Distribution::CopyToAll),
      "keyed" => {
        let fields: Vec<String> = keys
          .unwrap_or_default()
          .split(',')
          .map(|k| k.trim().to_string())
          .filter(|k| !k.is_empty())
          .collect();
        if fields.is_empty() {
          return Err("keyed distribution needs keys=\"field,...\"".to_string());
        }
        Ok(Distribution::Keyed { fields })
      }
      other => Err(format!("unknown distribution '{}'", other)),
    }
  }
}

impl fmt::Display for Distribution {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Distribution::RoundRobin => write!(f, "round_robin"),
      Distribution::CopyToAll => write!(f, "copy_to_all"),
      Distribution::Keyed { fields } => write!(f, "keyed({})", fields.join(",")),
    }
  }
}

/// Node-level choice across outgoing edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanOut {
  /// Every edge receives every row.
  #[default]
  Copy,
  /// Rows rotate across edges.
  Distribute,
}

impl FromStr for FanOut {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim() {
      "copy" => Ok(FanOut::Copy),
      "distribute" => Ok(FanOut::Distribute),
      other => Err(format!("unknown fan_out '{}'", other)),
    }
  }
}
