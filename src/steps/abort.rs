//! Stops the pipeline once more than `row_threshold` rows arrived.
//!
//! With no input rows the step finishes normally, unless `abort_on_empty_input` is set.
//! A row with no values still counts.

use crate::error::StepError;
use crate::step::{Step, decode_config};
use crate::step_io::StepIo;
use crate::types::NodeRecord;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortMode {
  /// Fail the step and stop every worker.
  #[default]
  AbortWithError,
  /// Stop every worker without recording an error.
  Abort,
  /// Request a safe stop and keep passing rows through while the pipeline drains.
  SafeStop,
}

fn default_message() -> String {
  "pipeline aborted by abort step".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AbortConfig {
  /// Rows passed through before the step triggers.
  #[serde(default)]
  pub row_threshold: u64,
  #[serde(default)]
  pub abort_on_empty_input: bool,
  #[serde(default)]
  pub mode: AbortMode,
  #[serde(default = "default_message")]
  pub message: String,
}

impl Default for AbortConfig {
  fn default() -> Self {
    Self {
      row_threshold: 0,
      abort_on_empty_input: false,
      mode: AbortMode::AbortWithError,
      message: default_message(),
    }
  }
}

pub struct AbortStep {
  config: AbortConfig,
  rows: u64,
  triggered: bool,
}

impl AbortStep {
  pub const TYPE: &'static str = "abort";

  pub fn from_node(node: &NodeRecord) -> Result<Self, StepError> {
    Ok(Self::new(decode_config(node)?))
  }

  pub fn new(config: AbortConfig) -> Self {
    Self {
      config,
      rows: 0,
      triggered: false,
    }
  }

  fn trigger(&mut self, io: &StepIo) -> Result<(), StepError> {
    self.triggered = true;
    let pipeline = io.context().pipeline();
    match self.config.mode {
      AbortMode::AbortWithError => {
        warn!(step = %io.context().step_name(), rows = self.rows, "{}", self.config.message);
        pipeline.stop_all();
        Err(StepError::failed(self.config.message.clone()))
      }
      AbortMode::Abort => {
        info!(step = %io.context().step_name(), rows = self.rows, "{}", self.config.message);
        pipeline.stop_all();
        Err(StepError::Aborted)
      }
      AbortMode::SafeStop => {
        info!(step = %io.context().step_name(), rows = self.rows, "{}", self.config.message);
        pipeline.safe_stop();
        Ok(())
      }
    }
  }
}

#[async_trait]
impl Step for AbortStep {
  async fn process_one_iteration(&mut self, io: &mut StepIo) -> Result<bool, StepError> {
    let Some(row) = io.get_row().await? else {
      if self.rows == 0 && self.config.abort_on_empty_input && !self.triggered {
        self.trigger(io)?;
      }
      return Ok(false);
    };
    self.rows += 1;
    if !self.triggered && self.rows > self.config.row_threshold {
      self.trigger(io)?;
    }
    io.put_row(row).await?;
    Ok(true)
  }
}
