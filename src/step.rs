//! Step contract, per-worker context, and the registry mapping step types to factories.

use crate::control::PipelineHandle;
use crate::error::{GraphError, StepError};
use crate::resources::SharedResources;
use crate::step_io::StepIo;
use crate::types::NodeRecord;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Business logic of one worker.
///
/// The worker calls [`Step::init`] once before any row flows, then
/// [`Step::process_one_iteration`] until it returns `Ok(false)` or an error, and finally
/// [`Step::dispose`] exactly once on every exit path (including a failed init).
#[async_trait]
pub trait Step: Send {
  /// One-time setup. An error aborts the whole pipeline before it starts.
  async fn init(&mut self, ctx: &StepContext) -> Result<(), StepError> {
    let _ = ctx;
    Ok(())
  }

  /// Consumes at most one logical unit of input and produces zero or more rows.
  /// Returns `Ok(false)` when the step has no more work.
  async fn process_one_iteration(&mut self, io: &mut StepIo) -> Result<bool, StepError>;

  /// Releases resources. Outputs are already marked done when this runs.
  async fn dispose(&mut self, ctx: &StepContext) {
    let _ = ctx;
  }
}

/// Identity of one worker and the pipeline-wide objects it may use.
#[derive(Clone)]
pub struct StepContext {
  /// Node id from the graph description.
  step_name: String,
  step_type: String,
  /// Zero-based copy number.
  copy: usize,
  /// Total copies of this node.
  copies: usize,
  resources: SharedResources,
  pipeline: PipelineHandle,
}

impl StepContext {
  pub(crate) fn new(
    node: &NodeRecord,
    copy: usize,
    resources: SharedResources,
    pipeline: PipelineHandle,
  ) -> Self {
    Self {
      step_name: node.id.clone(),
      step_type: node.step_type.clone(),
      copy,
      copies: node.copies,
      resources,
      pipeline,
    }
  }

  pub fn step_name(&self) -> &str {
    &self.step_name
  }

  pub fn step_type(&self) -> &str {
    &self.step_type
  }

  pub fn copy(&self) -> usize {
    self.copy
  }

  pub fn copies(&self) -> usize {
    self.copies
  }

  pub fn resources(&self) -> &SharedResources {
    &self.resources
  }

  /// Control surface of the running pipeline, for steps that stop it themselves.
  pub fn pipeline(&self) -> &PipelineHandle {
    &self.pipeline
  }

  pub fn run_id(&self) -> Uuid {
    self.pipeline.run_id()
  }
}

impl fmt::Debug for StepContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StepContext")
      .field("step_name", &self.step_name)
      .field("step_type", &self.step_type)
      .field("copy", &self.copy)
      .field("copies", &self.copies)
      .finish()
  }
}

/// Builds one step instance per copy from the node description.
pub type StepFactory = Arc<dyn Fn(&NodeRecord) -> Result<Box<dyn Step>, StepError> + Send + Sync>;

/// Decodes a node's JSON config into the step's typed config. A missing config decodes
/// from `{}`.
pub fn decode_config<T: DeserializeOwned>(node: &NodeRecord) -> Result<T, StepError> {
  let value = if node.config.is_null() {
    serde_json::Value::Object(serde_json::Map::new())
  } else {
    node.config.clone()
  };
  serde_json::from_value(value).map_err(|e| StepError::config(e.to_string()))
}

/// Step type name → factory. Built once and passed to the compiler.
#[derive(Clone, Default)]
pub struct StepRegistry {
  factories: HashMap<String, StepFactory>,
}

impl StepRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registry holding every built-in step.
  pub fn with_builtin() -> Self {
    let mut registry = Self::new();
    crate::steps::register_builtin(&mut registry);
    registry
  }

  pub fn register<F>(&mut self, step_type: impl Into<String>, factory: F) -> &mut Self
  where
    F: Fn(&NodeRecord) -> Result<Box<dyn Step>, StepError> + Send + Sync + 'static,
  {
    self.factories.insert(step_type.into(), Arc::new(factory));
    self
  }

  pub fn contains(&self, step_type: &str) -> bool {
    self.factories.contains_key(step_type)
  }

  pub fn step_types(&self) -> Vec<&str> {
    let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
    types.sort_unstable();
    types
  }

  /// Creates a step for `node`, mapping factory errors to build errors.
  pub fn create(&self, node: &NodeRecord) -> Result<Box<dyn Step>, GraphError> {
    let factory = self
      .factories
      .get(&node.step_type)
      .ok_or_else(|| GraphError::UnknownStepType {
        node: node.id.clone(),
        step_type: node.step_type.clone(),
      })?;
    factory(node).map_err(|e| GraphError::InvalidNode {
      node: node.id.clone(),
      message: e.to_string(),
    })
  }
}

impl fmt::Debug for StepRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StepRegistry")
      .field("step_types", &self.step_types())
      .finish()
  }
}
