//! Pass-through step that sleeps before forwarding each row.

use crate::error::StepError;
use crate::step::{Step, decode_config};
use crate::step_io::StepIo;
use crate::types::NodeRecord;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

fn default_delay_ms() -> u64 {
  1000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayConfig {
  #[serde(default = "default_delay_ms")]
  pub delay_ms: u64,
}

impl Default for DelayConfig {
  fn default() -> Self {
    Self {
      delay_ms: default_delay_ms(),
    }
  }
}

pub struct DelayStep {
  delay: Duration,
}

impl DelayStep {
  pub const TYPE: &'static str = "delay";

  pub fn from_node(node: &NodeRecord) -> Result<Self, StepError> {
    let config: DelayConfig = decode_config(node)?;
    Ok(Self::new(Duration::from_millis(config.delay_ms)))
  }

  pub fn new(delay: Duration) -> Self {
    Self { delay }
  }
}

#[async_trait]
impl Step for DelayStep {
  async fn process_one_iteration(&mut self, io: &mut StepIo) -> Result<bool, StepError> {
    let Some(row) = io.get_row().await? else {
      return Ok(false);
    };
    io.sleep(self.delay).await?;
    io.put_row(row).await?;
    Ok(true)
  }
}
