//! Static pipeline description: nodes, directed edges, engine settings.

use super::{Distribution, FanOut};
use crate::config::EngineConfig;
use crate::error::GraphError;
use serde::{Deserialize, Serialize};

fn default_name() -> String {
  "pipeline".to_string()
}

fn one() -> usize {
  1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDescription {
  #[serde(default = "default_name")]
  pub name: String,
  #[serde(default)]
  pub engine: EngineConfig,
  pub nodes: Vec<NodeRecord>,
  #[serde(default)]
  pub edges: Vec<EdgeRecord>,
}

/// A step instance: its type name, JSON config and number of parallel copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
  pub id: String,
  #[serde(rename = "type")]
  pub step_type: String,
  #[serde(default)]
  pub config: serde_json::Value,
  #[serde(default = "one")]
  pub copies: usize,
  #[serde(default)]
  pub fan_out: FanOut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
  pub from: String,
  pub to: String,
  #[serde(default)]
  pub distribution: Distribution,
  /// Carries the rejected rows of `from` instead of its regular output.
  #[serde(default)]
  pub error: bool,
}

impl GraphDescription {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      engine: EngineConfig::default(),
      nodes: Vec::new(),
      edges: Vec::new(),
    }
  }

  pub fn with_node(mut self, node: NodeRecord) -> Self {
    self.nodes.push(node);
    self
  }

  pub fn with_edge(mut self, edge: EdgeRecord) -> Self {
    self.edges.push(edge);
    self
  }

  pub fn with_engine(mut self, engine: EngineConfig) -> Self {
    self.engine = engine;
    self
  }

  pub fn node(&self, id: &str) -> Option<&NodeRecord> {
    self.nodes.iter().find(|n| n.id == id)
  }

  pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a EdgeRecord> + 'a {
    self.edges.iter().filter(move |e| e.from == id)
  }

  pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a EdgeRecord> + 'a {
    self.edges.iter().filter(move |e| e.to == id)
  }

  pub fn from_json_str(s: &str) -> Result<Self, GraphError> {
    serde_json::from_str(s).map_err(|e| GraphError::Parse(e.to_string()))
  }

  pub fn to_json_string(&self) -> Result<String, GraphError> {
    serde_json::to_string_pretty(self).map_err(|e| GraphError::Parse(e.to_string()))
  }
}

impl NodeRecord {
  pub fn new(id: impl Into<String>, step_type: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      step_type: step_type.into(),
      config: serde_json::Value::Null,
      copies: 1,
      fan_out: FanOut::Copy,
    }
  }

  pub fn with_config(mut self, config: serde_json::Value) -> Self {
    self.config = config;
    self
  }

  pub fn with_copies(mut self, copies: usize) -> Self {
    self.copies = copies;
    self
  }

  pub fn with_fan_out(mut self, fan_out: FanOut) -> Self {
    self.fan_out = fan_out;
    self
  }
}

impl EdgeRecord {
  pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
    Self {
      from: from.into(),
      to: to.into(),
      distribution: Distribution::RoundRobin,
      error: false,
    }
  }

  pub fn error(from: impl Into<String>, to: impl Into<String>) -> Self {
    Self {
      error: true,
      ..Self::new(from, to)
    }
  }

  pub fn with_distribution(mut self, distribution: Distribution) -> Self {
    self.distribution = distribution;
    self
  }
}
